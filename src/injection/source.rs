//! Trait abstraction for physical input devices to enable testing
//!
//! [`EvdevSource`] opens a `/dev/input/event*` node, grabs it so the rest of
//! the system no longer sees its events, and reads through evdev's tokio
//! event stream.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use evdev::{Device, EventStream};
use tracing::{debug, info};

use crate::error::{RemapError, Result};
use crate::event::InputEvent;
use crate::handlers::axis_transform::AxisRange;

/// Capability queries handlers may make about the device an event came from
#[cfg_attr(test, mockall::automock)]
pub trait SourceDevice {
    /// Range the device reports for an absolute axis
    fn abs_range(&self, code: u16) -> Option<AxisRange>;
}

/// A device events can be read from
#[async_trait]
pub trait EventSource: SourceDevice + Send {
    /// Identity used in logs and as the origin of events
    fn name(&self) -> &str;

    /// Wait for the next event
    async fn next_event(&mut self) -> io::Result<InputEvent>;
}

/// Grabbed evdev device
pub struct EvdevSource {
    stream: EventStream,
    path: Arc<str>,
    ranges: HashMap<u16, AxisRange>,
}

impl EvdevSource {
    /// Open and grab the device at `path`
    ///
    /// # Errors
    ///
    /// - `Io`: the device does not exist, permission is denied, or another
    ///   process holds the grab
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use remapper::injection::source::EvdevSource;
    ///
    /// let source = EvdevSource::open("/dev/input/event5")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let device = Device::open(path)?;
        Self::from_device(device, &path.to_string_lossy())
    }

    /// Find the first device whose name is `name`, then open and grab it
    ///
    /// Devices are scanned in path order so the choice is deterministic when
    /// several identical devices are connected.
    ///
    /// # Errors
    ///
    /// - `DeviceNotFound`: no readable device has that name
    /// - `Io`: `/dev/input` cannot be read or the grab fails
    pub fn find(name: &str) -> Result<Self> {
        let mut entries: Vec<_> = std::fs::read_dir("/dev/input")?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.path());

        for entry in entries {
            let path = entry.path();
            let is_event_node = path
                .file_name()
                .map_or(false, |f| f.to_string_lossy().starts_with("event"));
            if !is_event_node {
                continue;
            }

            match Device::open(&path) {
                Ok(device) => {
                    debug!("Found input device: {} ({:?})", path.display(), device.name());
                    if device.name() == Some(name) {
                        return Self::from_device(device, &path.to_string_lossy());
                    }
                }
                Err(e) => {
                    // Permission denied or other errors - skip device
                    debug!("Could not open {}: {}", path.display(), e);
                }
            }
        }

        Err(RemapError::DeviceNotFound(name.to_string()))
    }

    fn from_device(mut device: Device, path: &str) -> Result<Self> {
        let mut ranges = HashMap::new();
        if let Some(axes) = device.supported_absolute_axes() {
            let state = device.get_abs_state()?;
            for axis in axes.iter() {
                let info = state[usize::from(axis.0)];
                ranges.insert(axis.0, AxisRange::new(info.minimum, info.maximum));
            }
        }

        device.grab()?;
        info!(
            "Grabbed input device {} ({})",
            path,
            device.name().unwrap_or("unnamed")
        );

        Ok(Self {
            stream: device.into_event_stream()?,
            path: Arc::from(path),
            ranges,
        })
    }
}

impl SourceDevice for EvdevSource {
    fn abs_range(&self, code: u16) -> Option<AxisRange> {
        self.ranges.get(&code).copied()
    }
}

#[async_trait]
impl EventSource for EvdevSource {
    fn name(&self) -> &str {
        &self.path
    }

    async fn next_event(&mut self) -> io::Result<InputEvent> {
        let event = self.stream.next_event().await?;
        Ok(InputEvent::from_evdev(&event, self.path.clone()))
    }
}
