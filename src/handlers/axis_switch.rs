//! Gates one analog handler on a digital chord, e.g. `BTN_TL + ABS_RY`
//! scrolls only while the left bumper is held.

use std::collections::HashSet;

use tracing::debug;

use super::MappingHandler;
use crate::error::{RemapError, Result};
use crate::event::{Descriptor, EventActions, InputEvent, InputKey, Trigger};
use crate::injection::source::SourceDevice;
use crate::output::OutputHandle;

#[derive(Debug)]
pub struct AxisSwitchHandler {
    trigger: Trigger,
    axis: InputKey,
    chord: Vec<Descriptor>,
    held: HashSet<Descriptor>,
    engaged: bool,
    last_axis: Option<InputEvent>,
    child: Option<Box<dyn MappingHandler>>,
}

impl AxisSwitchHandler {
    /// # Errors
    ///
    /// Returns `HandlerInvariant` if the trigger has no analog axis or no
    /// digital part.
    pub fn new(trigger: Trigger) -> Result<Self> {
        let axis = trigger.analog_axis().ok_or_else(|| {
            RemapError::HandlerInvariant(format!("axis switch for {} without an analog axis", trigger))
        })?;
        let chord = trigger.digital_part();
        if chord.is_empty() {
            return Err(RemapError::HandlerInvariant(format!(
                "axis switch for {} without keys to hold",
                trigger
            )));
        }

        Ok(Self {
            trigger,
            axis,
            chord,
            held: HashSet::new(),
            engaged: false,
            last_axis: None,
            child: None,
        })
    }

    #[must_use]
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    fn recenter_event(&self) -> InputEvent {
        self.last_axis
            .as_ref()
            .map_or_else(
                || InputEvent::new(self.axis.ev_type, self.axis.code, 0),
                |last| last.with_value(0),
            )
            .with_actions(EventActions::RECENTER)
    }
}

impl MappingHandler for AxisSwitchHandler {
    fn notify(
        &mut self,
        event: &InputEvent,
        source: &dyn SourceDevice,
        output: &OutputHandle,
        suppress: bool,
    ) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        if event.input_key() == self.axis {
            self.last_axis = Some(event.clone());
            return self.engaged && child.notify(event, source, output, suppress);
        }

        let key = event.input_key();
        if !self.chord.iter().any(|d| d.input_key() == key) {
            return false;
        }
        self.held.retain(|d| d.input_key() != key);
        let current = event.descriptor();
        if self.chord.contains(&current) {
            self.held.insert(current);
        }

        let engaged = self.chord.iter().all(|d| self.held.contains(d));
        if engaged && !self.engaged {
            debug!("Axis switch {} engaged", self.trigger);
            self.engaged = true;
            if let Some(last) = self.last_axis.clone() {
                child.notify(&last, source, output, suppress);
            }
        } else if !engaged && self.engaged {
            debug!("Axis switch {} released", self.trigger);
            self.engaged = false;
            let recenter = self.recenter_event();
            if let Some(child) = self.child.as_mut() {
                child.notify(&recenter, source, output, suppress);
            }
        }

        // the chord keys themselves keep flowing
        false
    }

    fn reset(&mut self) {
        self.held.clear();
        self.engaged = false;
        self.last_axis = None;
        if let Some(child) = self.child.as_mut() {
            child.reset();
        }
    }

    fn trigger(&self) -> Option<&Trigger> {
        Some(&self.trigger)
    }

    fn needs_wrapping(&self) -> bool {
        false
    }

    fn set_sub_handler(&mut self, handler: Box<dyn MappingHandler>) -> Result<()> {
        if self.child.is_some() {
            return Err(RemapError::HandlerInvariant(format!(
                "axis switch for {} already has a sub handler",
                self.trigger
            )));
        }
        self.child = Some(handler);
        Ok(())
    }
}
