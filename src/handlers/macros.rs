//! # Macros
//!
//! A macro is a chain of steps joined by `.`:
//!
//! | Step | Effect |
//! |------|--------|
//! | `tap(KEY_A)` | press and release a key |
//! | `wait(20)` | pause for 20 ms |
//!
//! ```
//! use remapper::handlers::macros::Macro;
//!
//! let m: Macro = "tap(KEY_A).wait(20).tap(KEY_B)".parse().unwrap();
//! assert_eq!(m.steps().len(), 3);
//! assert!("tap(KEY_A".parse::<Macro>().is_err());
//! ```

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use evdev::Key;
use tracing::{debug, error};

use super::{MappingHandler, WrapperKind};
use crate::config::Mapping;
use crate::error::{RemapError, Result};
use crate::event::{InputEvent, Trigger};
use crate::injection::source::SourceDevice;
use crate::output::{OutputEvent, OutputHandle};

/// Longest pause a single `wait` step may request.
const MAX_WAIT_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroStep {
    Tap(u16),
    Wait(Duration),
}

/// Parsed macro program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    steps: Vec<MacroStep>,
}

impl Macro {
    #[must_use]
    pub fn steps(&self) -> &[MacroStep] {
        &self.steps
    }
}

impl FromStr for Macro {
    type Err = RemapError;

    fn from_str(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RemapError::MacroSyntax("empty macro".to_string()));
        }

        let steps = text
            .split('.')
            .map(|step| parse_step(step.trim()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { steps })
    }
}

fn parse_step(step: &str) -> Result<MacroStep> {
    let syntax = |reason: &str| RemapError::MacroSyntax(format!("\"{}\": {}", step, reason));

    let (name, rest) = step.split_once('(').ok_or_else(|| syntax("expected name(argument)"))?;
    let argument = rest.strip_suffix(')').ok_or_else(|| syntax("missing closing parenthesis"))?.trim();
    if argument.is_empty() {
        return Err(syntax("missing argument"));
    }

    match name.trim() {
        "tap" => {
            let key = Key::from_str(argument).map_err(|_| RemapError::UnknownSymbol(argument.to_string()))?;
            Ok(MacroStep::Tap(key.code()))
        }
        "wait" => {
            let ms: u64 = argument.parse().map_err(|_| syntax("wait takes milliseconds"))?;
            if ms > MAX_WAIT_MS {
                return Err(syntax("wait is too long"));
            }
            Ok(MacroStep::Wait(Duration::from_millis(ms)))
        }
        other => Err(syntax(&format!("unknown step \"{}\"", other))),
    }
}

/// Flags shared between the handler and its playback task.
#[derive(Debug, Default)]
struct Playback {
    running: AtomicBool,
    stop: AtomicBool,
}

/// Plays a macro when the trigger is pressed.
#[derive(Debug)]
pub struct MacroHandler {
    mapping: Arc<Mapping>,
    trigger: Trigger,
    program: Arc<Macro>,
    playback: Arc<Playback>,
}

impl MacroHandler {
    /// # Errors
    ///
    /// Returns `MacroSyntax` or `UnknownSymbol` if the mapping's output does
    /// not parse.
    pub fn new(mapping: Arc<Mapping>, trigger: Trigger) -> Result<Self> {
        let program: Macro = mapping.output.parse()?;
        Ok(Self {
            mapping,
            trigger,
            program: Arc::new(program),
            playback: Arc::default(),
        })
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.playback.running.load(Ordering::SeqCst)
    }

    fn start(&self, output: &OutputHandle) {
        if self
            .playback
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Macro for {} already running", self.trigger);
            return;
        }
        self.playback.stop.store(false, Ordering::SeqCst);

        tokio::spawn(play(
            self.program.clone(),
            self.playback.clone(),
            self.mapping.target.clone(),
            output.clone(),
        ));
    }
}

async fn play(program: Arc<Macro>, playback: Arc<Playback>, target: String, output: OutputHandle) {
    for step in program.steps() {
        if playback.stop.load(Ordering::SeqCst) {
            debug!("Macro cancelled");
            break;
        }
        match *step {
            MacroStep::Tap(code) => {
                let written = output
                    .write(&target, OutputEvent::key(code, 1))
                    .and_then(|()| output.write(&target, OutputEvent::key(code, 0)));
                if let Err(e) = written {
                    error!("Macro write failed: {}", e);
                    break;
                }
            }
            MacroStep::Wait(duration) => tokio::time::sleep(duration).await,
        }
    }
    playback.running.store(false, Ordering::SeqCst);
}

impl MappingHandler for MacroHandler {
    fn notify(
        &mut self,
        event: &InputEvent,
        _source: &dyn SourceDevice,
        output: &OutputHandle,
        suppress: bool,
    ) -> bool {
        let terminal = self.trigger.terminal();
        if event.input_key() != terminal.input_key() || suppress {
            return false;
        }

        if event.descriptor() == terminal && !event.is_key_repeat() {
            self.start(output);
        }
        // repeats and releases of our own key are swallowed too
        true
    }

    fn reset(&mut self) {
        self.playback.stop.store(true, Ordering::SeqCst);
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

impl Drop for MacroHandler {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::input::EV_KEY;
    use crate::injection::source::MockSourceDevice;
    use crate::output::device::mocks::RecordingOutput;
    use crate::output::device::VirtualOutput;
    use crate::output::OutputMultiplexer;

    fn setup() -> (RecordingOutput, OutputHandle) {
        let keyboard = RecordingOutput::new();
        let mut devices: HashMap<String, Box<dyn VirtualOutput>> = HashMap::new();
        devices.insert("keyboard".into(), Box::new(keyboard.clone()));
        let (handle, _task) = OutputMultiplexer::spawn(devices);
        (keyboard, handle)
    }

    fn handler(output: &str) -> MacroHandler {
        let mapping = Arc::new(Mapping::new(&["KEY_F1"], "keyboard", output));
        MacroHandler::new(mapping, Trigger::parse(&["KEY_F1"]).unwrap()).unwrap()
    }

    // ==================== Parser Tests ====================

    #[test]
    fn test_parse_steps() {
        let m: Macro = "tap(KEY_A).wait(20).tap(KEY_B)".parse().unwrap();
        assert_eq!(
            m.steps(),
            &[
                MacroStep::Tap(Key::KEY_A.code()),
                MacroStep::Wait(Duration::from_millis(20)),
                MacroStep::Tap(Key::KEY_B.code()),
            ]
        );
    }

    #[test]
    fn test_parse_whitespace() {
        let m: Macro = " tap( KEY_A ) . wait(5) ".parse().unwrap();
        assert_eq!(m.steps().len(), 2);
    }

    #[test]
    fn test_parse_errors() {
        for text in ["", "tap", "tap(KEY_A", "tap()", "wait(x)", "hold(KEY_A)", "wait(999999)"] {
            assert!(
                matches!(text.parse::<Macro>(), Err(RemapError::MacroSyntax(_))),
                "{text:?} should be a syntax error"
            );
        }
    }

    #[test]
    fn test_parse_unknown_key() {
        assert!(matches!(
            "tap(KEY_NOPE)".parse::<Macro>(),
            Err(RemapError::UnknownSymbol(_))
        ));
    }

    // ==================== Playback Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_plays_on_press() {
        let (keyboard, handle) = setup();
        let source = MockSourceDevice::new();
        let mut h = handler("tap(KEY_A).wait(20).tap(KEY_B)");

        assert!(h.notify(&InputEvent::key(Key::KEY_F1.code(), 1), &source, &handle, false));
        assert!(h.is_running());
        assert!(h.notify(&InputEvent::key(Key::KEY_F1.code(), 0), &source, &handle, false));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!h.is_running());
        assert_eq!(keyboard.values(EV_KEY, Key::KEY_A.code()), vec![1, 0]);
        assert_eq!(keyboard.values(EV_KEY, Key::KEY_B.code()), vec![1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_run_at_a_time() {
        let (keyboard, handle) = setup();
        let source = MockSourceDevice::new();
        let mut h = handler("tap(KEY_A).wait(100)");

        let press = InputEvent::key(Key::KEY_F1.code(), 1);
        let release = press.with_value(0);
        for _ in 0..3 {
            h.notify(&press, &source, &handle, false);
            h.notify(&release, &source, &handle, false);
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(keyboard.values(EV_KEY, Key::KEY_A.code()), vec![1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_between_steps() {
        let (keyboard, handle) = setup();
        let mut h = handler("tap(KEY_A).wait(100).tap(KEY_B)");

        h.notify(&InputEvent::key(Key::KEY_F1.code(), 1), &MockSourceDevice::new(), &handle, false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.reset();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!h.is_running());
        assert_eq!(keyboard.values(EV_KEY, Key::KEY_A.code()), vec![1, 0]);
        assert!(keyboard.values(EV_KEY, Key::KEY_B.code()).is_empty());
    }

    #[tokio::test]
    async fn test_suppressed_does_not_play() {
        let (_keyboard, handle) = setup();
        let mut h = handler("tap(KEY_A)");
        assert!(!h.notify(&InputEvent::key(Key::KEY_F1.code(), 1), &MockSourceDevice::new(), &handle, true));
        assert!(!h.is_running());
    }
}
