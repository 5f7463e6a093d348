//! Builds the handler graph of one device from its mappings.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use evdev::Key;
use tracing::{debug, warn};

use super::{
    AbsToRelHandler, AxisSwitchHandler, CombinationHandler, HandlerGraph, KeyHandler, MacroHandler,
    MappingHandler, WrapperKind,
};
use crate::config::Mapping;
use crate::error::{RemapError, Result};
use crate::event::Trigger;
use crate::output::OutputHandle;

/// A mapping that was not installed, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedMapping {
    pub trigger: String,
    pub reason: String,
}

impl fmt::Display for RejectedMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.trigger, self.reason)
    }
}

/// Creates the leaf handler for one mapping.
fn build_leaf(mapping: &Arc<Mapping>, trigger: Trigger, output: &OutputHandle) -> Result<Box<dyn MappingHandler>> {
    if !output.has_target(&mapping.target) {
        return Err(RemapError::UnknownTarget(mapping.target.clone()));
    }

    let symbol = mapping.output.trim();
    if symbol.contains('(') {
        return Ok(Box::new(MacroHandler::new(mapping.clone(), trigger)?));
    }
    if let Ok(key) = Key::from_str(symbol) {
        return Ok(Box::new(KeyHandler::new(mapping.clone(), trigger, key.code())?));
    }
    if mapping.output_rel_code().is_some() {
        return Ok(Box::new(AbsToRelHandler::new(mapping.clone(), trigger)?));
    }
    Err(RemapError::UnknownSymbol(symbol.to_string()))
}

/// Key for the duplicate check. An analog chord is gated on its digital
/// part, so where the axis sits in it does not matter.
fn uniqueness_key(trigger: &Trigger) -> Trigger {
    match trigger.iter().find(|d| d.is_analog_axis()) {
        Some(&axis) if trigger.len() > 1 => {
            let mut descriptors = trigger.digital_part();
            descriptors.push(axis);
            Trigger::new(descriptors).unwrap_or_else(|_| trigger.clone())
        }
        _ => trigger.clone(),
    }
}

/// Turns a device's mappings into a handler graph.
///
/// A mapping that fails validation, names an unknown symbol or device, or
/// repeats an earlier trigger is recorded in [`HandlerGraph::rejected`] and
/// skipped. Chord mappings share one [`CombinationHandler`]; every analog
/// chord gets its own [`AxisSwitchHandler`].
///
/// # Errors
///
/// Returns `HandlerInvariant` if the handlers cannot be assembled. This is
/// never caused by configuration alone.
pub fn build_graph(mappings: &[Arc<Mapping>], output: &OutputHandle) -> Result<HandlerGraph> {
    let mut rejected = Vec::new();
    let mut seen: HashSet<Trigger> = HashSet::new();
    let mut leaves: Vec<Box<dyn MappingHandler>> = Vec::new();

    for mapping in mappings {
        let built = mapping
            .validate()
            .and_then(|()| mapping.parse_trigger())
            .and_then(|trigger| {
                let key = uniqueness_key(&trigger);
                if seen.contains(&key) {
                    return Err(RemapError::InvalidMapping(format!(
                        "trigger {} is already mapped",
                        trigger
                    )));
                }
                let leaf = build_leaf(mapping, trigger, output)?;
                seen.insert(key);
                Ok(leaf)
            });

        match built {
            Ok(leaf) => leaves.push(leaf),
            Err(e) if e.is_mapping_error() => {
                let rejection = RejectedMapping {
                    trigger: mapping.trigger.join(" + "),
                    reason: e.to_string(),
                };
                warn!("Skipping mapping {}", rejection);
                rejected.push(rejection);
            }
            Err(e) => return Err(e),
        }
    }

    let mut combination: Option<CombinationHandler> = None;
    let mut handlers: Vec<Box<dyn MappingHandler>> = Vec::new();

    for leaf in leaves {
        if !leaf.needs_wrapping() {
            handlers.push(leaf);
            continue;
        }

        let wrappers = leaf.wrap_with();
        let mut wrappers = wrappers.into_iter();
        let (Some((trigger, kind)), None) = (wrappers.next(), wrappers.next()) else {
            return Err(RemapError::HandlerInvariant(format!(
                "{:?} must name exactly one wrapper",
                leaf
            )));
        };

        match kind {
            WrapperKind::Combination => {
                combination
                    .get_or_insert_with(CombinationHandler::new)
                    .set_sub_handler(leaf)?;
            }
            WrapperKind::AxisSwitch => {
                let mut switch = AxisSwitchHandler::new(trigger)?;
                switch.set_sub_handler(leaf)?;
                handlers.push(Box::new(switch));
            }
        }
    }

    if let Some(combination) = combination {
        debug!("Combination wrapper holds {} chords", combination.len());
        handlers.push(Box::new(combination));
    }

    Ok(HandlerGraph::new(handlers, rejected, output.clone()))
}
