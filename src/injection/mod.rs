//! # Injection Module
//!
//! Per-device event loop.
//!
//! This module handles:
//! - Building the handler graph for one source device
//! - Reading events in arrival order and delivering them to the graph
//! - Forwarding unhandled key and relative events to a passthrough device
//! - Releasing everything the handlers hold when the loop ends
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use remapper::config::Config;
//! use remapper::injection::{source::EvdevSource, Injector};
//! use remapper::output::{device, OutputMultiplexer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("remapper.toml")?;
//! let mappings: Vec<_> = config.mappings.into_iter().map(Arc::new).collect();
//! let (output, _task) = OutputMultiplexer::spawn(device::create_default_outputs()?);
//! let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);
//!
//! let mut source = EvdevSource::open("/dev/input/event5")?;
//! let injector = Injector::new("/dev/input/event5", mappings, output, None)?;
//! injector.run(&mut source, stop_rx).await?;
//! # Ok(())
//! # }
//! ```

pub mod source;

use std::io;
use std::sync::Arc;

use evdev::EventType;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Mapping;
use crate::error::{RemapError, Result};
use crate::event::input::{EV_KEY, EV_REL};
use crate::event::InputEvent;
use crate::handlers::{build_graph, HandlerGraph};
use crate::output::{OutputEvent, OutputHandle};
use source::{EventSource, SourceDevice};

const EV_SYN: u16 = EventType::SYNCHRONIZATION.0;
const EV_MSC: u16 = EventType::MISC.0;

/// Outcome of waiting on the stop signal and the device at once.
enum Step {
    Stop,
    Event(io::Result<InputEvent>),
}

/// Remaps the events of one grabbed source device.
#[derive(Debug)]
pub struct Injector {
    device: String,
    mappings: Vec<Arc<Mapping>>,
    output: OutputHandle,
    forward_target: Option<String>,
}

impl Injector {
    /// # Errors
    ///
    /// Returns `UnknownTarget` if `forward_target` names no output device.
    pub fn new(
        device: impl Into<String>,
        mappings: Vec<Arc<Mapping>>,
        output: OutputHandle,
        forward_target: Option<String>,
    ) -> Result<Self> {
        if let Some(target) = &forward_target {
            if !output.has_target(target) {
                return Err(RemapError::UnknownTarget(target.clone()));
            }
        }

        Ok(Self {
            device: device.into(),
            mappings,
            output,
            forward_target,
        })
    }

    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Runs until `stop` turns true or the device fails.
    ///
    /// Every handler is reset on the way out, so no key stays pressed and no
    /// motion keeps running.
    ///
    /// # Errors
    ///
    /// - `DeviceLost` if reading from the source fails
    /// - `HandlerInvariant` if the handler graph cannot be assembled
    pub async fn run<S: EventSource>(&self, source: &mut S, mut stop: watch::Receiver<bool>) -> Result<()> {
        let mut graph = build_graph(&self.mappings, &self.output)?;
        if let Some(target) = &self.forward_target {
            graph.set_forward_target(target);
        }
        for rejected in graph.rejected() {
            warn!("{}: mapping {} not installed", self.device, rejected);
        }
        info!(
            "Injecting {} with {} handlers ({} mappings rejected)",
            self.device,
            graph.len(),
            graph.rejected().len()
        );

        loop {
            if *stop.borrow() {
                break;
            }

            let step = tokio::select! {
                biased;
                changed = stop.changed() => match changed {
                    Ok(()) => continue,
                    // sender gone, nobody can stop us any more
                    Err(_) => Step::Stop,
                },
                event = source.next_event() => Step::Event(event),
            };

            match step {
                Step::Stop => break,
                Step::Event(Ok(event)) => self.dispatch(&mut graph, &event, &*source),
                Step::Event(Err(e)) => {
                    graph.reset();
                    return Err(RemapError::DeviceLost {
                        device: self.device.clone(),
                        source: e,
                    });
                }
            }
        }

        info!("Stopping injection for {}", self.device);
        graph.reset();
        Ok(())
    }

    fn dispatch(&self, graph: &mut HandlerGraph, event: &InputEvent, source: &dyn SourceDevice) {
        if matches!(event.ev_type(), EV_SYN | EV_MSC) {
            return;
        }
        if graph.notify(event, source) {
            return;
        }

        let Some(target) = &self.forward_target else {
            return;
        };
        if matches!(event.ev_type(), EV_KEY | EV_REL) {
            let forwarded = OutputEvent::new(event.ev_type(), event.code(), event.value());
            if let Err(e) = self.output.write(target, forwarded) {
                warn!("Failed to forward event from {}: {}", self.device, e);
            }
        } else {
            debug!("Dropping unhandled event ({}, {})", event.ev_type(), event.code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::source::mocks::ScriptedSource;
    use super::*;
    use crate::output::device::mocks::RecordingOutput;
    use crate::output::device::VirtualOutput;
    use crate::output::OutputMultiplexer;
    use evdev::{AbsoluteAxisType, Key, RelativeAxisType};
    use std::collections::HashMap;

    struct Rig {
        keyboard: RecordingOutput,
        mouse: RecordingOutput,
        handle: OutputHandle,
    }

    fn rig() -> Rig {
        let keyboard = RecordingOutput::new();
        let mouse = RecordingOutput::new();
        let mut devices: HashMap<String, Box<dyn VirtualOutput>> = HashMap::new();
        devices.insert("keyboard".into(), Box::new(keyboard.clone()));
        devices.insert("mouse".into(), Box::new(mouse.clone()));
        let (handle, _task) = OutputMultiplexer::spawn(devices);
        Rig {
            keyboard,
            mouse,
            handle,
        }
    }

    /// Single-key mappings as `(trigger, target, output)`.
    fn mappings(list: &[(&str, &str, &str)]) -> Vec<Arc<Mapping>> {
        list.iter()
            .map(|(trigger, target, output)| Arc::new(Mapping::new(&[*trigger], target, output)))
            .collect()
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    /// Runs the injector over the whole script, then stops it.
    async fn run_script(injector: &Injector, source: &mut ScriptedSource) -> Result<()> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (result, ()) = tokio::join!(injector.run(source, stop_rx), async {
            settle().await;
            stop_tx.send(true).unwrap();
        });
        settle().await;
        result
    }

    fn key(k: Key, value: i32) -> InputEvent {
        InputEvent::key(k.code(), value)
    }

    fn syn() -> InputEvent {
        InputEvent::new(EV_SYN, 0, 0)
    }

    #[tokio::test]
    async fn test_mapped_key_is_not_forwarded() {
        let rig = rig();
        let injector = Injector::new(
            "test",
            mappings(&[("KEY_A", "keyboard", "KEY_B")]),
            rig.handle.clone(),
            Some("keyboard".into()),
        )
        .unwrap();
        let mut source = ScriptedSource::new(vec![key(Key::KEY_A, 1), syn(), key(Key::KEY_A, 0), syn()]);

        run_script(&injector, &mut source).await.unwrap();

        assert_eq!(rig.keyboard.values(EV_KEY, Key::KEY_B.code()), vec![1, 0]);
        assert!(rig.keyboard.values(EV_KEY, Key::KEY_A.code()).is_empty());
    }

    #[tokio::test]
    async fn test_forwarded_modifier_released_when_chord_fires() {
        let rig = rig();
        let chord = Arc::new(Mapping::new(&["KEY_LEFTCTRL", "KEY_A"], "keyboard", "KEY_B"));
        let injector = Injector::new("test", vec![chord], rig.handle.clone(), Some("keyboard".into())).unwrap();
        let mut source = ScriptedSource::new(vec![
            key(Key::KEY_LEFTCTRL, 1),
            syn(),
            key(Key::KEY_A, 1),
            syn(),
            key(Key::KEY_A, 0),
        ]);

        run_script(&injector, &mut source).await.unwrap();

        // Ctrl goes up before B goes down, so the result is a plain B
        assert_eq!(
            rig.keyboard.events(),
            vec![
                OutputEvent::key(Key::KEY_LEFTCTRL.code(), 1),
                OutputEvent::key(Key::KEY_LEFTCTRL.code(), 0),
                OutputEvent::key(Key::KEY_B.code(), 1),
                OutputEvent::key(Key::KEY_B.code(), 0),
            ]
        );
    }

    #[tokio::test]
    async fn test_unhandled_events_are_forwarded() {
        let rig = rig();
        let injector = Injector::new("test", vec![], rig.handle.clone(), Some("mouse".into())).unwrap();
        let rel_x = RelativeAxisType::REL_X.0;
        let mut source = ScriptedSource::new(vec![
            key(Key::BTN_LEFT, 1),
            InputEvent::rel(rel_x, 4),
            syn(),
            InputEvent::abs(AbsoluteAxisType::ABS_X.0, 100),
            key(Key::BTN_LEFT, 0),
        ]);

        run_script(&injector, &mut source).await.unwrap();

        // order is preserved, sync and absolute events are not forwarded
        let events = rig.mouse.events();
        assert_eq!(
            events,
            vec![
                OutputEvent::key(Key::BTN_LEFT.code(), 1),
                OutputEvent::rel(rel_x, 4),
                OutputEvent::key(Key::BTN_LEFT.code(), 0),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_forward_target_drops_unhandled() {
        let rig = rig();
        let injector = Injector::new("test", vec![], rig.handle.clone(), None).unwrap();
        let mut source = ScriptedSource::new(vec![key(Key::KEY_Q, 1)]);

        run_script(&injector, &mut source).await.unwrap();
        assert!(rig.keyboard.events().is_empty());
        assert!(rig.mouse.events().is_empty());
    }

    #[tokio::test]
    async fn test_stop_releases_held_keys() {
        let rig = rig();
        let injector = Injector::new(
            "test",
            mappings(&[("KEY_A", "keyboard", "KEY_B")]),
            rig.handle.clone(),
            None,
        )
        .unwrap();
        let mut source = ScriptedSource::new(vec![key(Key::KEY_A, 1)]);

        run_script(&injector, &mut source).await.unwrap();
        assert_eq!(rig.keyboard.values(EV_KEY, Key::KEY_B.code()), vec![1, 0]);
    }

    #[tokio::test]
    async fn test_read_error_is_device_lost() {
        let rig = rig();
        let injector = Injector::new(
            "/dev/input/event9",
            mappings(&[("KEY_A", "keyboard", "KEY_B")]),
            rig.handle.clone(),
            None,
        )
        .unwrap();
        let mut source = ScriptedSource::new(vec![key(Key::KEY_A, 1)]).then_fail(io::ErrorKind::NotFound);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let result = injector.run(&mut source, stop_rx).await;
        settle().await;

        assert!(matches!(result, Err(RemapError::DeviceLost { ref device, .. }) if device == "/dev/input/event9"));
        assert_eq!(rig.keyboard.values(EV_KEY, Key::KEY_B.code()), vec![1, 0]);
    }

    #[tokio::test]
    async fn test_already_stopped() {
        let rig = rig();
        let injector = Injector::new("test", vec![], rig.handle.clone(), Some("keyboard".into())).unwrap();
        let mut source = ScriptedSource::new(vec![key(Key::KEY_Q, 1)]);
        let (_stop_tx, stop_rx) = watch::channel(true);

        injector.run(&mut source, stop_rx).await.unwrap();
        settle().await;
        assert!(rig.keyboard.events().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_stop_sender_ends_loop() {
        let rig = rig();
        let injector = Injector::new("test", vec![], rig.handle.clone(), None).unwrap();
        let mut source = ScriptedSource::new(vec![]);
        let (stop_tx, stop_rx) = watch::channel(false);
        drop(stop_tx);

        assert!(injector.run(&mut source, stop_rx).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_forward_target() {
        let rig = rig();
        let result = Injector::new("test", vec![], rig.handle.clone(), Some("joystick".into()));
        assert!(matches!(result, Err(RemapError::UnknownTarget(_))));
    }

    #[tokio::test]
    async fn test_rejected_mappings_do_not_stop_the_loop() {
        let rig = rig();
        let injector = Injector::new(
            "test",
            mappings(&[
                ("KEY_A", "keyboard", "KEY_DOES_NOT_EXIST"),
                ("KEY_C", "keyboard", "KEY_D"),
            ]),
            rig.handle.clone(),
            None,
        )
        .unwrap();
        let mut source = ScriptedSource::new(vec![key(Key::KEY_C, 1), key(Key::KEY_C, 0)]);

        run_script(&injector, &mut source).await.unwrap();
        assert_eq!(rig.keyboard.values(EV_KEY, Key::KEY_D.code()), vec![1, 0]);
    }
}
