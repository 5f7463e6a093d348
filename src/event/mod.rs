//! # Event Module
//!
//! Value types for raw hardware events and the triggers built from them.
//!
//! This module handles:
//! - Wrapping evdev samples with origin, timestamp and out-of-band actions
//! - Normalizing events to `(type, code, sign)` descriptors
//! - Trigger equivalence (same multiset, same terminal descriptor)

pub mod combination;
pub mod input;

pub use combination::{Descriptor, Trigger};
pub use input::{EventActions, InputEvent, InputKey};
