//! Key output: press and release a fixed key while the trigger is held.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use super::{MappingHandler, WrapperKind};
use crate::config::Mapping;
use crate::error::{RemapError, Result};
use crate::event::{InputEvent, Trigger};
use crate::injection::source::SourceDevice;
use crate::output::{OutputEvent, OutputHandle};

/// Emits one key on the mapping's target device.
#[derive(Debug)]
pub struct KeyHandler {
    mapping: Arc<Mapping>,
    trigger: Trigger,
    key: u16,
    /// Set while the output key is down, so it can be released on reset.
    held: Option<OutputHandle>,
}

impl KeyHandler {
    /// # Errors
    ///
    /// Returns `InvalidMapping` if the trigger ends on a whole analog axis,
    /// which has no pressed state.
    pub fn new(mapping: Arc<Mapping>, trigger: Trigger, key: u16) -> Result<Self> {
        if trigger.terminal().is_analog_axis() {
            return Err(RemapError::InvalidMapping(format!(
                "key output needs a direction on {}, e.g. {}+",
                trigger.terminal(),
                trigger.terminal()
            )));
        }
        Ok(Self {
            mapping,
            trigger,
            key,
            held: None,
        })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.held.is_some()
    }

    fn write(&self, output: &OutputHandle, value: i32) {
        if let Err(e) = output.write(&self.mapping.target, OutputEvent::key(self.key, value)) {
            error!("Failed to write key for {}: {}", self.trigger, e);
        }
    }
}

impl MappingHandler for KeyHandler {
    fn notify(
        &mut self,
        event: &InputEvent,
        _source: &dyn SourceDevice,
        output: &OutputHandle,
        suppress: bool,
    ) -> bool {
        let terminal = self.trigger.terminal();
        if event.input_key() != terminal.input_key() {
            return false;
        }

        if event.descriptor() == terminal {
            if suppress {
                return false;
            }
            if self.held.is_none() {
                debug!("{} pressed", self.trigger);
                self.write(output, 1);
                self.held = Some(output.clone());
            } else if event.is_key_repeat() {
                self.write(output, 2);
            }
            return true;
        }

        // release, or an axis moving to the other side
        match self.held.take() {
            Some(_) => {
                debug!("{} released", self.trigger);
                self.write(output, 0);
                true
            }
            None => false,
        }
    }

    fn reset(&mut self) {
        if let Some(output) = self.held.take() {
            self.write(&output, 0);
        }
    }

    fn trigger(&self) -> Option<&Trigger> {
        Some(&self.trigger)
    }

    fn wrap_with(&self) -> HashMap<Trigger, WrapperKind> {
        if self.needs_wrapping() {
            HashMap::from([(self.trigger.clone(), WrapperKind::Combination)])
        } else {
            HashMap::new()
        }
    }
}

impl Drop for KeyHandler {
    fn drop(&mut self) {
        self.reset();
    }
}
