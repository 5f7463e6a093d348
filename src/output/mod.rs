//! # Output Module
//!
//! Serializes synthetic events onto named virtual devices.
//!
//! This module handles:
//! - Owning every virtual device write handle in a single actor task
//! - Accepting write requests from any handler over an unbounded channel
//! - Rejecting writes to unknown device names
//! - Converting computed float values into event values without overflow
//!
//! A request is one event; it is written together with its sync report in a
//! single `emit`, so writes from different handlers never interleave.

pub mod device;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use evdev::EventType;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{RemapError, Result};
use crate::event::input::{EV_KEY, EV_REL};
use device::VirtualOutput;

/// One synthetic event for a virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputEvent {
    pub ev_type: u16,
    pub code: u16,
    pub value: i32,
}

impl OutputEvent {
    #[must_use]
    pub const fn new(ev_type: u16, code: u16, value: i32) -> Self {
        Self {
            ev_type,
            code,
            value,
        }
    }

    #[must_use]
    pub const fn key(code: u16, value: i32) -> Self {
        Self::new(EV_KEY, code, value)
    }

    #[must_use]
    pub const fn rel(code: u16, value: i32) -> Self {
        Self::new(EV_REL, code, value)
    }

    /// Builds an event from a computed value that has already been truncated.
    ///
    /// # Errors
    ///
    /// Returns `Overflow` if the value is not finite or does not fit in `i32`.
    pub fn from_f64(ev_type: u16, code: u16, value: f64) -> Result<Self> {
        if !value.is_finite() || value > f64::from(i32::MAX) || value < f64::from(i32::MIN) {
            return Err(RemapError::Overflow {
                ev_type,
                code,
                value,
            });
        }
        Ok(Self::new(ev_type, code, value as i32))
    }

    #[must_use]
    pub fn to_evdev(&self) -> evdev::InputEvent {
        evdev::InputEvent::new(EventType(self.ev_type), self.code, self.value)
    }
}

#[derive(Debug)]
struct WriteRequest {
    target: String,
    event: OutputEvent,
}

/// Actor that exclusively owns the virtual devices.
pub struct OutputMultiplexer {
    devices: HashMap<String, Box<dyn VirtualOutput>>,
    requests: mpsc::UnboundedReceiver<WriteRequest>,
}

impl fmt::Debug for OutputMultiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputMultiplexer")
            .field("devices", &self.devices.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl OutputMultiplexer {
    /// Creates the actor and the handle used to talk to it.
    ///
    /// The actor does nothing until [`OutputMultiplexer::run`] is polled.
    #[must_use]
    pub fn new(devices: HashMap<String, Box<dyn VirtualOutput>>) -> (Self, OutputHandle) {
        let (sender, requests) = mpsc::unbounded_channel();
        let targets: HashSet<String> = devices.keys().cloned().collect();
        let handle = OutputHandle {
            sender,
            targets: Arc::new(targets),
        };
        (Self { devices, requests }, handle)
    }

    /// Creates the actor and spawns it on the current runtime.
    #[must_use]
    pub fn spawn(devices: HashMap<String, Box<dyn VirtualOutput>>) -> (OutputHandle, JoinHandle<()>) {
        let (multiplexer, handle) = Self::new(devices);
        (handle, tokio::spawn(multiplexer.run()))
    }

    /// Delivers requests until every handle is dropped.
    pub async fn run(mut self) {
        while let Some(request) = self.requests.recv().await {
            self.deliver(&request);
        }
        debug!("Output multiplexer stopped, all writers gone");
    }

    fn deliver(&mut self, request: &WriteRequest) {
        let Some(device) = self.devices.get_mut(&request.target) else {
            // handles check names before sending
            error!("Dropping event for unknown output \"{}\"", request.target);
            return;
        };

        if let Err(e) = device.emit(&request.event) {
            warn!(
                "Failed to write ({}, {}, {}) to \"{}\": {}",
                request.event.ev_type, request.event.code, request.event.value, request.target, e
            );
        }
    }
}

/// Cloneable writer side of the multiplexer.
///
/// Writing never waits: requests are queued for the actor.
#[derive(Clone)]
pub struct OutputHandle {
    sender: mpsc::UnboundedSender<WriteRequest>,
    targets: Arc<HashSet<String>>,
}

impl fmt::Debug for OutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputHandle")
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

impl OutputHandle {
    /// Queues one event for the named virtual device.
    ///
    /// # Errors
    ///
    /// - `UnknownTarget` if no device is registered under `target`
    /// - `OutputClosed` if the multiplexer task has ended
    pub fn write(&self, target: &str, event: OutputEvent) -> Result<()> {
        if !self.targets.contains(target) {
            return Err(RemapError::UnknownTarget(target.to_string()));
        }
        self.sender
            .send(WriteRequest {
                target: target.to_string(),
                event,
            })
            .map_err(|_| RemapError::OutputClosed)
    }

    #[must_use]
    pub fn has_target(&self, target: &str) -> bool {
        self.targets.contains(target)
    }
}
