//! # Mapping Handlers
//!
//! Every mapping becomes a handler: a small state machine that reacts to
//! input events and writes synthetic output.
//!
//! ## Graph
//!
//! ```text
//! HandlerGraph
//!   ├─ CombinationHandler ── KeyHandler (Ctrl + A -> B)
//!   │                     └─ MacroHandler (Ctrl + Shift + M -> ...)
//!   ├─ AxisSwitchHandler ─── AbsToRelHandler (BTN_TL + ABS_RX -> REL_WHEEL)
//!   ├─ AbsToRelHandler (ABS_X -> REL_X)
//!   └─ KeyHandler (BTN_SOUTH -> KEY_SPACE)
//! ```
//!
//! Events are routed by `(type, code)` to the handlers that listen to them,
//! longest trigger first. The first handler that reports an event as handled
//! consumes it; the rest are still notified with `suppress = true` so their
//! held-key bookkeeping stays correct.

pub mod abs_to_rel;
pub mod axis_switch;
pub mod axis_transform;
pub mod combination;
pub mod key;
pub mod macros;
pub mod parser;

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;

use crate::error::{RemapError, Result};
use crate::event::{InputEvent, InputKey, Trigger};
use crate::injection::source::SourceDevice;
use crate::output::OutputHandle;

pub use abs_to_rel::AbsToRelHandler;
pub use axis_switch::AxisSwitchHandler;
pub use combination::CombinationHandler;
pub use key::KeyHandler;
pub use macros::MacroHandler;
pub use parser::{build_graph, RejectedMapping};

/// Wrapper a multi-descriptor handler has to be placed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperKind {
    /// Digital chord; shared by every chord mapping of a device.
    Combination,
    /// Digital chord gating one analog axis.
    AxisSwitch,
}

/// Uniform contract of every node in the handler graph.
pub trait MappingHandler: Send + fmt::Debug {
    /// Reacts to one event. Returns whether the event was handled.
    ///
    /// Must not block. With `suppress` set only bookkeeping is updated and
    /// outputs already held active are released, nothing new is emitted.
    fn notify(
        &mut self,
        event: &InputEvent,
        source: &dyn SourceDevice,
        output: &OutputHandle,
        suppress: bool,
    ) -> bool;

    /// Returns to idle and cancels any running effect.
    fn reset(&mut self);

    /// The trigger this handler fires on. Wrappers holding several
    /// children have none.
    fn trigger(&self) -> Option<&Trigger>;

    fn needs_wrapping(&self) -> bool {
        self.trigger().map_or(false, |t| t.len() > 1)
    }

    fn wrap_with(&self) -> HashMap<Trigger, WrapperKind> {
        HashMap::new()
    }

    /// Attaches a child. Only wrappers accept children.
    ///
    /// # Errors
    ///
    /// Returns `HandlerInvariant` when the handler cannot take this child.
    fn set_sub_handler(&mut self, handler: Box<dyn MappingHandler>) -> Result<()> {
        Err(RemapError::HandlerInvariant(format!(
            "{:?} cannot hold sub handler {:?}",
            self, handler
        )))
    }

    /// `(type, code)` pairs this handler wants to see.
    fn input_keys(&self) -> Vec<InputKey> {
        self.trigger().map(Trigger::input_keys).unwrap_or_default()
    }

    /// Dispatch order; higher goes first.
    fn priority(&self) -> usize {
        self.trigger().map_or(0, Trigger::len)
    }

    /// Output device that receives unhandled events. Handlers that let
    /// presses through use it to release them again.
    fn set_forward_target(&mut self, _target: &str) {}
}

/// Top-level handlers of one device, indexed by the inputs they listen to.
pub struct HandlerGraph {
    handlers: Vec<Box<dyn MappingHandler>>,
    routes: HashMap<InputKey, Vec<usize>>,
    rejected: Vec<RejectedMapping>,
    output: OutputHandle,
}

impl fmt::Debug for HandlerGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerGraph")
            .field("handlers", &self.handlers)
            .field("rejected", &self.rejected)
            .finish_non_exhaustive()
    }
}

impl HandlerGraph {
    #[must_use]
    pub fn new(
        handlers: Vec<Box<dyn MappingHandler>>,
        rejected: Vec<RejectedMapping>,
        output: OutputHandle,
    ) -> Self {
        let mut routes: HashMap<InputKey, Vec<usize>> = HashMap::new();
        for (index, handler) in handlers.iter().enumerate() {
            for key in handler.input_keys() {
                routes.entry(key).or_default().push(index);
            }
        }
        for indices in routes.values_mut() {
            // stable: equal priorities keep configuration order
            indices.sort_by_key(|&i| Reverse(handlers[i].priority()));
        }

        Self {
            handlers,
            routes,
            rejected,
            output,
        }
    }

    /// Delivers one event. Returns whether any handler consumed it.
    pub fn notify(&mut self, event: &InputEvent, source: &dyn SourceDevice) -> bool {
        let Some(indices) = self.routes.get(&event.input_key()) else {
            return false;
        };

        let mut handled = false;
        for &index in indices {
            if self.handlers[index].notify(event, source, &self.output, handled) {
                handled = true;
            }
        }
        handled
    }

    /// Tells every handler where unhandled events are forwarded.
    pub fn set_forward_target(&mut self, target: &str) {
        for handler in &mut self.handlers {
            handler.set_forward_target(target);
        }
    }

    /// Resets every handler, releasing held keys and stopping motion.
    pub fn reset(&mut self) {
        for handler in &mut self.handlers {
            handler.reset();
        }
    }

    /// Mappings that were not installed, with the reason.
    #[must_use]
    pub fn rejected(&self) -> &[RejectedMapping] {
        &self.rejected
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    #[must_use]
    pub fn listens_to(&self, key: InputKey) -> bool {
        self.routes.contains_key(&key)
    }
}
