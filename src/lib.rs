//! # Remapper Library
//!
//! Remap keyboard, mouse and gamepad input on Linux.
//!
//! Physical devices are grabbed through evdev, their events run through a
//! graph of mapping handlers, and the result is written to virtual uinput
//! devices. Analog sticks and triggers can drive pointer motion and
//! scrolling at a fixed rate.

pub mod config;
pub mod error;
pub mod event;
pub mod handlers;
pub mod injection;
pub mod output;
