//! Chord wrapper shared by every multi-key mapping of one device.
//!
//! Tracks which descriptors are held, in press order. When a press
//! completes a child's trigger the child is activated and sees the terminal
//! event; releasing any part of the chord releases the child again.
//!
//! Leading chord keys are not handled, so they reach the forward target as
//! presses. They are released there before the child fires, otherwise
//! `Ctrl + A -> B` would come out as `Ctrl + B`.

use std::fmt;

use tracing::{debug, warn};

use super::MappingHandler;
use crate::error::{RemapError, Result};
use crate::event::input::EV_KEY;
use crate::event::{Descriptor, InputEvent, InputKey, Trigger};
use crate::injection::source::SourceDevice;
use crate::output::{OutputEvent, OutputHandle};

struct Child {
    handler: Box<dyn MappingHandler>,
    trigger: Trigger,
    active: bool,
}

impl fmt::Debug for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Child")
            .field("trigger", &self.trigger.to_string())
            .field("active", &self.active)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct CombinationHandler {
    /// Children, longest trigger first.
    children: Vec<Child>,
    held: Vec<Descriptor>,
    /// Held keys nobody handled, so they were passed to `forward`.
    passed: Vec<Descriptor>,
    forward: Option<String>,
}

impl CombinationHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptors currently held, oldest first.
    #[must_use]
    pub fn held(&self) -> &[Descriptor] {
        &self.held
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether the held descriptors, reduced to the ones in `trigger`,
    /// form that trigger.
    fn completes(&self, trigger: &Trigger) -> bool {
        let relevant: Vec<Descriptor> = self
            .held
            .iter()
            .filter(|d| trigger.iter().any(|t| t == *d))
            .copied()
            .collect();
        Trigger::new(relevant).map_or(false, |held| &held == trigger)
    }

    /// Releases the leading keys of `trigger` that were passed through.
    fn release_passed(&mut self, index: usize, output: &OutputHandle) {
        let Some(target) = &self.forward else {
            return;
        };
        let trigger = &self.children[index].trigger;
        let terminal = trigger.terminal();
        for descriptor in trigger.iter().filter(|d| **d != terminal) {
            let Some(position) = self.passed.iter().position(|d| d == descriptor) else {
                continue;
            };
            self.passed.remove(position);
            if let Err(e) = output.write(target, OutputEvent::key(descriptor.code, 0)) {
                warn!("Failed to release {} on {}: {}", descriptor, target, e);
            }
        }
    }

    /// Releases every active child whose trigger contains `released`.
    /// Returns whether one of them ended on this key.
    fn release(
        &mut self,
        released: Descriptor,
        event: &InputEvent,
        source: &dyn SourceDevice,
        output: &OutputHandle,
        suppress: bool,
    ) -> bool {
        let mut handled = false;
        for child in self.children.iter_mut().filter(|c| c.active) {
            if !child.trigger.iter().any(|d| *d == released) {
                continue;
            }
            let terminal = child.trigger.terminal();
            let release = event.with_input_key(terminal.input_key()).with_value(0);
            child.handler.notify(&release, source, output, suppress);
            child.active = false;
            debug!("Released {}", child.trigger);
            if terminal == released {
                handled = true;
            }
        }
        handled
    }
}

impl MappingHandler for CombinationHandler {
    fn notify(
        &mut self,
        event: &InputEvent,
        source: &dyn SourceDevice,
        output: &OutputHandle,
        suppress: bool,
    ) -> bool {
        let key = event.input_key();
        if !self.children.iter().any(|c| c.trigger.contains_key(key)) {
            return false;
        }

        let current = event.descriptor();
        let mut handled = false;

        // a key release, or an axis leaving a direction it held
        let released: Vec<Descriptor> = self
            .held
            .iter()
            .filter(|d| d.input_key() == key && d.sign != current.sign)
            .copied()
            .collect();
        self.held.retain(|d| !released.contains(d));
        self.passed.retain(|d| !released.contains(d));
        for descriptor in released {
            handled |= self.release(descriptor, event, source, output, suppress);
        }

        if current.sign == 0 {
            return handled;
        }
        if !self.held.contains(&current) {
            self.held.push(current);
        }

        let Some(index) = self
            .children
            .iter()
            .position(|c| c.trigger.terminal() == current && self.completes(&c.trigger))
        else {
            if !suppress && current.ev_type == EV_KEY && !self.passed.contains(&current) {
                self.passed.push(current);
            }
            return handled;
        };

        if self.children[index].active {
            // autorepeat of an active chord
            self.children[index].handler.notify(event, source, output, suppress);
            return true;
        }
        if suppress {
            return handled;
        }

        self.release_passed(index, output);
        let child = &mut self.children[index];
        debug!("Combination {} triggered", child.trigger);
        child.active = true;
        child.handler.notify(event, source, output, false);
        true
    }

    fn reset(&mut self) {
        self.held.clear();
        self.passed.clear();
        for child in &mut self.children {
            child.handler.reset();
            child.active = false;
        }
    }

    fn trigger(&self) -> Option<&Trigger> {
        None
    }

    fn needs_wrapping(&self) -> bool {
        false
    }

    fn set_sub_handler(&mut self, handler: Box<dyn MappingHandler>) -> Result<()> {
        let trigger = handler
            .trigger()
            .cloned()
            .ok_or_else(|| RemapError::HandlerInvariant(format!("{:?} has no trigger to combine", handler)))?;

        self.children.push(Child {
            handler,
            trigger,
            active: false,
        });
        self.children.sort_by_key(|c| std::cmp::Reverse(c.trigger.len()));
        Ok(())
    }

    fn input_keys(&self) -> Vec<InputKey> {
        let mut keys = Vec::new();
        for key in self.children.iter().flat_map(|c| c.trigger.input_keys()) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    fn priority(&self) -> usize {
        self.children.first().map_or(0, |c| c.trigger.len())
    }

    fn set_forward_target(&mut self, target: &str) {
        self.forward = Some(target.to_string());
    }
}
