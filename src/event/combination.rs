//! # Triggers
//!
//! A trigger (combination) is an ordered list of descriptors whose last
//! element is the one that "closes" the chord.
//!
//! Two triggers are equal when they contain the same descriptors as a
//! multiset and end on the same descriptor. `Ctrl + Shift + A` and
//! `Shift + Ctrl + A` are the same trigger; `Ctrl + A` and `A + Ctrl` are not.
//!
//! ```
//! use std::str::FromStr;
//! use remapper::event::{Descriptor, Trigger};
//!
//! let ctrl = Descriptor::from_str("KEY_LEFTCTRL").unwrap();
//! let shift = Descriptor::from_str("KEY_LEFTSHIFT").unwrap();
//! let a = Descriptor::from_str("KEY_A").unwrap();
//!
//! let one = Trigger::new(vec![ctrl, shift, a]).unwrap();
//! let two = Trigger::new(vec![shift, ctrl, a]).unwrap();
//! let three = Trigger::new(vec![ctrl, a, shift]).unwrap();
//! assert_eq!(one, two);
//! assert_ne!(one, three);
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use evdev::{AbsoluteAxisType, Key, RelativeAxisType};

use super::input::{InputKey, EV_ABS, EV_KEY, EV_REL};
use crate::error::{RemapError, Result};

/// Normalized `(type, code, sign)` view of one physical signal and direction.
///
/// For keys the sign is 1 (pressed). For axes it is the direction of
/// deflection, or 0 when the trigger uses the whole analog axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Descriptor {
    pub ev_type: u16,
    pub code: u16,
    pub sign: i8,
}

impl Descriptor {
    #[must_use]
    pub const fn new(ev_type: u16, code: u16, sign: i8) -> Self {
        Self {
            ev_type,
            code,
            sign,
        }
    }

    /// A pressed key or button.
    #[must_use]
    pub const fn key(code: u16) -> Self {
        Self::new(EV_KEY, code, 1)
    }

    /// A whole absolute axis, used as an analog input.
    #[must_use]
    pub const fn axis(code: u16) -> Self {
        Self::new(EV_ABS, code, 0)
    }

    #[must_use]
    pub fn input_key(&self) -> InputKey {
        InputKey::new(self.ev_type, self.code)
    }

    /// True for an absolute axis used as a continuous input.
    #[must_use]
    pub fn is_analog_axis(&self) -> bool {
        self.ev_type == EV_ABS && self.sign == 0
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.input_key())?;
        match (self.ev_type, self.sign) {
            (EV_KEY, _) => Ok(()),
            (_, s) if s > 0 => write!(f, "+"),
            (_, s) if s < 0 => write!(f, "-"),
            _ => Ok(()),
        }
    }
}

impl FromStr for Descriptor {
    type Err = RemapError;

    /// Parses `KEY_A`, `BTN_SOUTH`, `ABS_X` (whole axis), `ABS_HAT0X-`,
    /// `ABS_HAT0X+` or `REL_WHEEL+`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (name, sign) = match s.strip_suffix('+') {
            Some(name) => (name, Some(1)),
            None => match s.strip_suffix('-') {
                Some(name) => (name, Some(-1)),
                None => (s, None),
            },
        };

        if let Ok(key) = Key::from_str(name) {
            if sign.is_some() {
                return Err(RemapError::UnknownSymbol(s.to_string()));
            }
            return Ok(Self::key(key.code()));
        }
        if let Ok(axis) = AbsoluteAxisType::from_str(name) {
            return Ok(Self::new(EV_ABS, axis.0, sign.unwrap_or(0)));
        }
        if let Ok(axis) = RelativeAxisType::from_str(name) {
            return Ok(Self::new(EV_REL, axis.0, sign.unwrap_or(1)));
        }
        Err(RemapError::UnknownSymbol(s.to_string()))
    }
}

/// Ordered, non-empty list of descriptors that fires one mapping.
#[derive(Debug, Clone)]
pub struct Trigger {
    descriptors: Vec<Descriptor>,
}

impl Trigger {
    /// Creates a trigger. The last descriptor is the terminal one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMapping` for an empty list.
    pub fn new(descriptors: Vec<Descriptor>) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(RemapError::InvalidMapping(
                "trigger must contain at least one input".to_string(),
            ));
        }
        Ok(Self { descriptors })
    }

    /// Trigger made of one descriptor.
    #[must_use]
    pub fn single(descriptor: Descriptor) -> Self {
        Self {
            descriptors: vec![descriptor],
        }
    }

    /// Parses a list of symbolic names such as `["KEY_LEFTCTRL", "KEY_A"]`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSymbol` for names evdev does not know, or
    /// `InvalidMapping` for an empty list.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let descriptors = names
            .iter()
            .map(|name| Descriptor::from_str(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(descriptors)
    }

    /// The descriptor that closes the chord.
    #[must_use]
    pub fn terminal(&self) -> Descriptor {
        // non-empty by construction
        self.descriptors[self.descriptors.len() - 1]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    #[must_use]
    pub fn contains_key(&self, key: InputKey) -> bool {
        self.descriptors.iter().any(|d| d.input_key() == key)
    }

    /// Distinct `(type, code)` pairs, in trigger order.
    #[must_use]
    pub fn input_keys(&self) -> Vec<InputKey> {
        let mut keys = Vec::with_capacity(self.descriptors.len());
        for key in self.descriptors.iter().map(Descriptor::input_key) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// The whole-axis descriptor of an analog trigger, if there is one.
    #[must_use]
    pub fn analog_axis(&self) -> Option<InputKey> {
        self.descriptors
            .iter()
            .find(|d| d.is_analog_axis())
            .map(Descriptor::input_key)
    }

    /// Every descriptor except the analog axis.
    #[must_use]
    pub fn digital_part(&self) -> Vec<Descriptor> {
        self.descriptors
            .iter()
            .filter(|d| !d.is_analog_axis())
            .copied()
            .collect()
    }

    fn sorted(&self) -> Vec<Descriptor> {
        let mut sorted = self.descriptors.clone();
        sorted.sort_unstable();
        sorted
    }
}

impl PartialEq for Trigger {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.terminal() == other.terminal()
            && self.sorted() == other.sorted()
    }
}

impl Eq for Trigger {}

impl Hash for Trigger {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.terminal().hash(state);
        self.sorted().hash(state);
    }
}

impl From<Descriptor> for Trigger {
    fn from(descriptor: Descriptor) -> Self {
        Self::single(descriptor)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, descriptor) in self.descriptors.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{descriptor}")?;
        }
        Ok(())
    }
}
