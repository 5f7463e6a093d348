//! Trait abstraction for virtual output devices to enable testing

use std::collections::HashMap;
use std::io;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, Key, RelativeAxisType};
use tracing::info;

use super::OutputEvent;

/// Name prefix of every virtual device we create.
pub const DEVICE_NAME_PREFIX: &str = "remapper";

/// Standard output device names.
pub const KEYBOARD: &str = "keyboard";
pub const MOUSE: &str = "mouse";
pub const GAMEPAD: &str = "gamepad";
pub const KEYBOARD_MOUSE: &str = "keyboard + mouse";

/// A writable virtual device
pub trait VirtualOutput: Send {
    /// Write one event followed by a sync report
    fn emit(&mut self, event: &OutputEvent) -> io::Result<()>;
}

impl VirtualOutput for VirtualDevice {
    fn emit(&mut self, event: &OutputEvent) -> io::Result<()> {
        // evdev terminates the batch with SYN_REPORT
        VirtualDevice::emit(self, &[event.to_evdev()])
    }
}

fn keyboard_keys() -> AttributeSet<Key> {
    let mut keys = AttributeSet::<Key>::new();
    for code in 1u16..=248 {
        keys.insert(Key::new(code));
    }
    keys
}

fn mouse_buttons() -> AttributeSet<Key> {
    let mut keys = AttributeSet::<Key>::new();
    for key in [
        Key::BTN_LEFT,
        Key::BTN_RIGHT,
        Key::BTN_MIDDLE,
        Key::BTN_SIDE,
        Key::BTN_EXTRA,
        Key::BTN_FORWARD,
        Key::BTN_BACK,
        Key::BTN_TASK,
    ] {
        keys.insert(key);
    }
    keys
}

fn gamepad_buttons() -> AttributeSet<Key> {
    let mut keys = AttributeSet::<Key>::new();
    for code in Key::BTN_SOUTH.code()..=Key::BTN_THUMBR.code() {
        keys.insert(Key::new(code));
    }
    keys
}

fn pointer_axes() -> AttributeSet<RelativeAxisType> {
    let mut axes = AttributeSet::<RelativeAxisType>::new();
    for axis in [
        RelativeAxisType::REL_X,
        RelativeAxisType::REL_Y,
        RelativeAxisType::REL_WHEEL,
        RelativeAxisType::REL_HWHEEL,
        RelativeAxisType::REL_WHEEL_HI_RES,
        RelativeAxisType::REL_HWHEEL_HI_RES,
    ] {
        axes.insert(axis);
    }
    axes
}

fn build(
    name: &str,
    keys: &AttributeSet<Key>,
    axes: Option<&AttributeSet<RelativeAxisType>>,
) -> io::Result<VirtualDevice> {
    let full_name = format!("{DEVICE_NAME_PREFIX} {name}");
    let mut builder = VirtualDeviceBuilder::new()?.name(&full_name).with_keys(keys)?;
    if let Some(axes) = axes {
        builder = builder.with_relative_axes(axes)?;
    }
    let device = builder.build()?;
    info!("Created virtual output device \"{}\"", full_name);
    Ok(device)
}

/// Create the standard set of named virtual devices.
///
/// Requires write access to `/dev/uinput`.
///
/// # Errors
///
/// Returns the first uinput error.
pub fn create_default_outputs() -> io::Result<HashMap<String, Box<dyn VirtualOutput>>> {
    let axes = pointer_axes();

    let mut combined_keys = keyboard_keys();
    for key in mouse_buttons().iter() {
        combined_keys.insert(key);
    }

    let mut outputs: HashMap<String, Box<dyn VirtualOutput>> = HashMap::new();
    outputs.insert(KEYBOARD.to_string(), Box::new(build(KEYBOARD, &keyboard_keys(), None)?));
    outputs.insert(MOUSE.to_string(), Box::new(build(MOUSE, &mouse_buttons(), Some(&axes))?));
    outputs.insert(GAMEPAD.to_string(), Box::new(build(GAMEPAD, &gamepad_buttons(), None)?));
    outputs.insert(
        KEYBOARD_MOUSE.to_string(),
        Box::new(build(KEYBOARD_MOUSE, &combined_keys, Some(&axes))?),
    );
    Ok(outputs)
}
