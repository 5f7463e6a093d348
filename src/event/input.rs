//! # Input Events
//!
//! Immutable event values read from a physical device.
//!
//! ## Event Types
//!
//! | Type | evdev | Value |
//! |------|-------|-------|
//! | Key/Button | EV_KEY | 0 = release, 1 = press, 2 = autorepeat |
//! | Relative | EV_REL | signed delta |
//! | Absolute | EV_ABS | signed sample within the device's range |
//!
//! Codes follow the Linux input-event numbering and are kept as raw `u16`.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use evdev::EventType;

use super::combination::Descriptor;

/// evdev type number for key and button events.
pub const EV_KEY: u16 = EventType::KEY.0;
/// evdev type number for relative motion events.
pub const EV_REL: u16 = EventType::RELATIVE.0;
/// evdev type number for absolute axis events.
pub const EV_ABS: u16 = EventType::ABSOLUTE.0;

/// Key value for autorepeat.
const KEY_REPEAT: i32 = 2;

/// `(type, code)` pair identifying one physical signal, regardless of value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputKey {
    pub ev_type: u16,
    pub code: u16,
}

impl InputKey {
    #[must_use]
    pub const fn new(ev_type: u16, code: u16) -> Self {
        Self { ev_type, code }
    }
}

impl fmt::Display for InputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ev_type {
            EV_KEY => write!(f, "{:?}", evdev::Key::new(self.code)),
            EV_ABS => write!(f, "{:?}", evdev::AbsoluteAxisType(self.code)),
            EV_REL => write!(f, "{:?}", evdev::RelativeAxisType(self.code)),
            _ => write!(f, "({}, {})", self.ev_type, self.code),
        }
    }
}

/// Small set of out-of-band flags carried by an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventActions {
    bits: u8,
}

impl EventActions {
    /// No actions.
    pub const NONE: Self = Self { bits: 0 };
    /// The axis returned to rest; any continuous effect driven by it must stop.
    pub const RECENTER: Self = Self { bits: 1 };

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.bits & other.bits == other.bits && other.bits != 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }
}

/// A single hardware event.
///
/// Fields are private so an event cannot change after construction. Derived
/// events are built with the `with_*` methods.
///
/// # Examples
///
/// ```
/// use remapper::event::{EventActions, InputEvent};
///
/// let event = InputEvent::abs(evdev::AbsoluteAxisType::ABS_X.0, -300);
/// assert_eq!(event.descriptor().sign, -1);
///
/// let recenter = event.with_actions(EventActions::RECENTER);
/// assert!(recenter.is_recenter());
/// assert!(!event.is_recenter());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    ev_type: u16,
    code: u16,
    value: i32,
    origin: Option<Arc<str>>,
    timestamp: SystemTime,
    actions: EventActions,
}

impl InputEvent {
    /// Creates an event stamped with the current time and no origin.
    #[must_use]
    pub fn new(ev_type: u16, code: u16, value: i32) -> Self {
        Self {
            ev_type,
            code,
            value,
            origin: None,
            timestamp: SystemTime::now(),
            actions: EventActions::NONE,
        }
    }

    /// Key or button event.
    #[must_use]
    pub fn key(code: u16, value: i32) -> Self {
        Self::new(EV_KEY, code, value)
    }

    /// Absolute axis event.
    #[must_use]
    pub fn abs(code: u16, value: i32) -> Self {
        Self::new(EV_ABS, code, value)
    }

    /// Relative motion event.
    #[must_use]
    pub fn rel(code: u16, value: i32) -> Self {
        Self::new(EV_REL, code, value)
    }

    /// Wraps an evdev event read from the device identified by `origin`.
    #[must_use]
    pub fn from_evdev(event: &evdev::InputEvent, origin: Arc<str>) -> Self {
        Self {
            ev_type: event.event_type().0,
            code: event.code(),
            value: event.value(),
            origin: Some(origin),
            timestamp: event.timestamp(),
            actions: EventActions::NONE,
        }
    }

    #[must_use]
    pub fn ev_type(&self) -> u16 {
        self.ev_type
    }

    #[must_use]
    pub fn code(&self) -> u16 {
        self.code
    }

    #[must_use]
    pub fn value(&self) -> i32 {
        self.value
    }

    /// Identity of the device the event was read from, if any.
    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    #[must_use]
    pub fn input_key(&self) -> InputKey {
        InputKey::new(self.ev_type, self.code)
    }

    /// Normalizes the event to a `(type, code, sign)` descriptor.
    ///
    /// Keys give sign 1 while pressed (press or autorepeat) and 0 on release.
    /// Axes give the signum of their value.
    #[must_use]
    pub fn descriptor(&self) -> Descriptor {
        let sign = if self.ev_type == EV_KEY {
            i8::from(self.value != 0)
        } else {
            self.value.signum() as i8
        };
        Descriptor::new(self.ev_type, self.code, sign)
    }

    #[must_use]
    pub fn is_key_repeat(&self) -> bool {
        self.ev_type == EV_KEY && self.value == KEY_REPEAT
    }

    #[must_use]
    pub fn is_recenter(&self) -> bool {
        self.actions.contains(EventActions::RECENTER)
    }

    #[must_use]
    pub fn with_value(&self, value: i32) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_actions(&self, actions: EventActions) -> Self {
        Self {
            actions: self.actions.union(actions),
            ..self.clone()
        }
    }

    /// Same sample, re-addressed to another `(type, code)`.
    #[must_use]
    pub fn with_input_key(&self, key: InputKey) -> Self {
        Self {
            ev_type: key.ev_type,
            code: key.code,
            ..self.clone()
        }
    }

    /// Converts back to an evdev event, e.g. for forwarding.
    #[must_use]
    pub fn to_evdev(&self) -> evdev::InputEvent {
        evdev::InputEvent::new(EventType(self.ev_type), self.code, self.value)
    }
}
