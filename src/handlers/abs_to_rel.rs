//! # Absolute to Relative
//!
//! Turns the deflection of an analog axis into a steady stream of relative
//! motion: a stick moves the pointer, a trigger scrolls.
//!
//! ## Operation
//!
//! Each axis sample sets a target rate (`transformed value * speed`, in
//! output units per tick). A background task then emits that rate at the
//! configured frequency until the axis returns to rest or is recentered.
//!
//! Output is integral, so each channel keeps the fractional part of every
//! tick and carries it into the next one. Over `N` ticks the emitted sum is
//! within one unit of `rate * N`.
//!
//! ## Wheels
//!
//! Wheel output is written to both the classic and the hi-res axis, 120
//! hi-res units per wheel notch, each with its own remainder.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use evdev::RelativeAxisType;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::axis_transform::{AxisMode, Transformation};
use super::{MappingHandler, WrapperKind};
use crate::config::Mapping;
use crate::error::{RemapError, Result};
use crate::event::input::EV_REL;
use crate::event::{InputEvent, InputKey, Trigger};
use crate::injection::source::SourceDevice;
use crate::output::{OutputEvent, OutputHandle};

/// Hi-res units per wheel notch.
const WHEEL_HI_RES_RATIO: f64 = 120.0;

/// Accumulates fractional output across ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Integrator {
    remainder: f64,
}

impl Integrator {
    /// Adds one tick's worth of `rate` and returns the whole part to emit.
    ///
    /// The remainder keeps the sign of the total, so negative rates do not
    /// drift either.
    ///
    /// ```
    /// use remapper::handlers::abs_to_rel::Integrator;
    ///
    /// let mut i = Integrator::default();
    /// let emitted: f64 = (0..10).map(|_| i.step(0.25)).sum();
    /// assert_eq!(emitted, 2.0);
    /// ```
    pub fn step(&mut self, rate: f64) -> f64 {
        let total = rate + self.remainder;
        if !total.is_finite() {
            self.remainder = 0.0;
            return total;
        }
        let value = total.trunc();
        self.remainder = total - value;
        value
    }

    #[must_use]
    pub fn remainder(&self) -> f64 {
        self.remainder
    }
}

/// One relative axis written by the loop, scaled by `weight`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Channel {
    code: u16,
    weight: f64,
}

/// Channels for an output code. Wheels write the classic and hi-res pair.
fn channels_for(code: u16) -> Vec<Channel> {
    let pair = |low: RelativeAxisType, high: RelativeAxisType, low_weight: f64, high_weight: f64| {
        vec![
            Channel {
                code: low.0,
                weight: low_weight,
            },
            Channel {
                code: high.0,
                weight: high_weight,
            },
        ]
    };

    match RelativeAxisType(code) {
        RelativeAxisType::REL_WHEEL => pair(
            RelativeAxisType::REL_WHEEL,
            RelativeAxisType::REL_WHEEL_HI_RES,
            1.0,
            WHEEL_HI_RES_RATIO,
        ),
        RelativeAxisType::REL_WHEEL_HI_RES => pair(
            RelativeAxisType::REL_WHEEL,
            RelativeAxisType::REL_WHEEL_HI_RES,
            1.0 / WHEEL_HI_RES_RATIO,
            1.0,
        ),
        RelativeAxisType::REL_HWHEEL => pair(
            RelativeAxisType::REL_HWHEEL,
            RelativeAxisType::REL_HWHEEL_HI_RES,
            1.0,
            WHEEL_HI_RES_RATIO,
        ),
        RelativeAxisType::REL_HWHEEL_HI_RES => pair(
            RelativeAxisType::REL_HWHEEL,
            RelativeAxisType::REL_HWHEEL_HI_RES,
            1.0 / WHEEL_HI_RES_RATIO,
            1.0,
        ),
        _ => vec![Channel { code, weight: 1.0 }],
    }
}

/// State shared between the handler and its loop task.
#[derive(Debug, Default)]
struct MotionState {
    /// Target rate as `f64` bits.
    rate: AtomicU64,
    stop: AtomicBool,
    running: AtomicBool,
}

impl MotionState {
    fn rate(&self) -> f64 {
        f64::from_bits(self.rate.load(Ordering::SeqCst))
    }

    fn set_rate(&self, rate: f64) {
        self.rate.store(rate.to_bits(), Ordering::SeqCst);
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Claims the right to run the loop. Only one caller wins.
    fn claim(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// The axis range is read from the device on the first sample only.
#[derive(Debug, Clone, Copy)]
enum TransformState {
    Unbound,
    Bound(Transformation),
}

/// Handler for an analog axis mapped to relative motion.
#[derive(Debug)]
pub struct AbsToRelHandler {
    mapping: Arc<Mapping>,
    trigger: Trigger,
    axis: InputKey,
    channels: Arc<[Channel]>,
    period: Duration,
    speed: f64,
    transform: TransformState,
    motion: Arc<MotionState>,
}

impl AbsToRelHandler {
    /// # Errors
    ///
    /// - `InvalidMapping` if the trigger has no whole analog axis or the
    ///   update rate is zero
    /// - `UnknownSymbol` if the output is not a relative axis
    pub fn new(mapping: Arc<Mapping>, trigger: Trigger) -> Result<Self> {
        let axis = trigger.analog_axis().ok_or_else(|| {
            RemapError::InvalidMapping(format!(
                "relative output {} needs a whole analog axis in {}",
                mapping.output, trigger
            ))
        })?;
        let code = mapping
            .output_rel_code()
            .ok_or_else(|| RemapError::UnknownSymbol(mapping.output.clone()))?;
        if mapping.rel_rate() == 0 {
            return Err(RemapError::InvalidMapping("rel rate must be greater than 0".to_string()));
        }

        let period = Duration::from_secs_f64(1.0 / f64::from(mapping.rel_rate()));
        let speed = mapping.rel_speed();

        Ok(Self {
            mapping,
            trigger,
            axis,
            channels: channels_for(code).into(),
            period,
            speed,
            transform: TransformState::Unbound,
            motion: Arc::default(),
        })
    }

    /// Whether a motion loop is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.motion.running.load(Ordering::SeqCst)
    }

    fn bind(&mut self, source: &dyn SourceDevice) -> Option<Transformation> {
        if let TransformState::Bound(transform) = self.transform {
            return Some(transform);
        }

        let Some(range) = source.abs_range(self.axis.code) else {
            warn!("Source reports no range for {}, ignoring {}", self.axis, self.trigger);
            return None;
        };
        let transform = Transformation::new(
            range,
            AxisMode::for_axis(self.axis.code),
            self.mapping.transform_params(),
        );
        debug!("{} bound to range {}..{}", self.axis, range.min, range.max);
        self.transform = TransformState::Bound(transform);
        Some(transform)
    }

    fn start(&self, output: &OutputHandle) {
        self.motion.stop.store(false, Ordering::SeqCst);
        if !self.motion.claim() {
            return;
        }

        debug!("Starting motion loop for {}", self.trigger);
        tokio::spawn(run_motion(
            self.motion.clone(),
            self.channels.clone(),
            self.mapping.target.clone(),
            output.clone(),
            self.period,
        ));
    }
}

async fn run_motion(
    motion: Arc<MotionState>,
    channels: Arc<[Channel]>,
    target: String,
    output: OutputHandle,
    period: Duration,
) {
    let mut integrators = vec![Integrator::default(); channels.len()];

    loop {
        while !motion.stop.load(Ordering::SeqCst) {
            let started = Instant::now();
            let rate = motion.rate();

            for (channel, integrator) in channels.iter().zip(integrators.iter_mut()) {
                let value = integrator.step(rate * channel.weight);
                if value == 0.0 {
                    continue;
                }
                let written = OutputEvent::from_f64(EV_REL, channel.code, value)
                    .and_then(|event| output.write(&target, event));
                match written {
                    Ok(()) => {}
                    Err(RemapError::OutputClosed) => {
                        error!("Output closed, stopping motion on {}", target);
                        motion.request_stop();
                    }
                    Err(e) => error!("{}", e),
                }
            }

            tokio::time::sleep(period.saturating_sub(started.elapsed())).await;
        }

        motion.running.store(false, Ordering::SeqCst);
        // a sample may have withdrawn the stop after the check above
        if motion.stop.load(Ordering::SeqCst) || !motion.claim() {
            break;
        }
    }
    debug!("Motion loop on {} stopped", target);
}

impl MappingHandler for AbsToRelHandler {
    fn notify(
        &mut self,
        event: &InputEvent,
        source: &dyn SourceDevice,
        output: &OutputHandle,
        suppress: bool,
    ) -> bool {
        if event.input_key() != self.axis {
            return false;
        }

        if event.is_recenter() {
            self.motion.request_stop();
            return true;
        }
        if suppress {
            // another handler owns the axis now
            self.motion.request_stop();
            return false;
        }

        let Some(transform) = self.bind(source) else {
            return false;
        };
        let rate = transform.apply(event.value()) * self.speed;
        if rate == 0.0 {
            self.motion.request_stop();
            return true;
        }

        self.motion.set_rate(rate);
        self.start(output);
        true
    }

    fn reset(&mut self) {
        self.motion.request_stop();
    }

    fn trigger(&self) -> Option<&Trigger> {
        Some(&self.trigger)
    }

    fn wrap_with(&self) -> HashMap<Trigger, WrapperKind> {
        if self.needs_wrapping() {
            HashMap::from([(self.trigger.clone(), WrapperKind::AxisSwitch)])
        } else {
            HashMap::new()
        }
    }

    fn input_keys(&self) -> Vec<InputKey> {
        vec![self.axis]
    }
}

impl Drop for AbsToRelHandler {
    fn drop(&mut self) {
        self.motion.request_stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventActions;
    use crate::handlers::axis_transform::AxisRange;
    use crate::injection::source::MockSourceDevice;
    use crate::output::device::mocks::RecordingOutput;
    use crate::output::device::VirtualOutput;
    use crate::output::OutputMultiplexer;
    use evdev::AbsoluteAxisType;

    const ABS_X: u16 = AbsoluteAxisType::ABS_X.0;
    const REL_X: u16 = RelativeAxisType::REL_X.0;
    const REL_WHEEL: u16 = RelativeAxisType::REL_WHEEL.0;
    const REL_WHEEL_HI_RES: u16 = RelativeAxisType::REL_WHEEL_HI_RES.0;

    fn stick_source() -> MockSourceDevice {
        let mut source = MockSourceDevice::new();
        source
            .expect_abs_range()
            .returning(|_| Some(AxisRange::new(-32768, 32767)));
        source
    }

    fn mouse() -> (RecordingOutput, OutputHandle) {
        let mouse = RecordingOutput::new();
        let mut devices: HashMap<String, Box<dyn VirtualOutput>> = HashMap::new();
        devices.insert("mouse".into(), Box::new(mouse.clone()));
        let (handle, _task) = OutputMultiplexer::spawn(devices);
        (mouse, handle)
    }

    fn handler(mapping: Mapping) -> AbsToRelHandler {
        let trigger = mapping.parse_trigger().unwrap();
        AbsToRelHandler::new(Arc::new(mapping), trigger).unwrap()
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    // ==================== Integrator Tests ====================

    #[test]
    fn test_integrator_no_drift_positive() {
        let mut i = Integrator::default();
        let sum: f64 = (0..100).map(|_| i.step(2.7)).sum();
        assert!((sum - 270.0).abs() <= 1.0, "sum was {sum}");
    }

    #[test]
    fn test_integrator_no_drift_negative() {
        let mut i = Integrator::default();
        let sum: f64 = (0..100).map(|_| i.step(-2.7)).sum();
        assert!((sum + 270.0).abs() <= 1.0, "sum was {sum}");
        assert!(i.remainder() <= 0.0);
    }

    #[test]
    fn test_integrator_small_rate() {
        let mut i = Integrator::default();
        let values: Vec<f64> = (0..4).map(|_| i.step(0.5)).collect();
        assert_eq!(values, vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_integrator_recovers_from_non_finite() {
        let mut i = Integrator::default();
        i.step(0.5);
        assert!(i.step(f64::INFINITY).is_infinite());
        assert_eq!(i.remainder(), 0.0);
        assert_eq!(i.step(1.0), 1.0);
    }

    // ==================== Channel Tests ====================

    #[test]
    fn test_pointer_single_channel() {
        assert_eq!(channels_for(REL_X), vec![Channel { code: REL_X, weight: 1.0 }]);
    }

    #[test]
    fn test_wheel_weights() {
        let low_res = channels_for(REL_WHEEL);
        assert_eq!(low_res[0], Channel { code: REL_WHEEL, weight: 1.0 });
        assert_eq!(low_res[1], Channel { code: REL_WHEEL_HI_RES, weight: 120.0 });

        let hi_res = channels_for(REL_WHEEL_HI_RES);
        assert!((hi_res[0].weight - 1.0 / 120.0).abs() < 1e-12);
        assert_eq!(hi_res[1].weight, 1.0);

        let horizontal = channels_for(RelativeAxisType::REL_HWHEEL.0);
        assert_eq!(horizontal[1].code, RelativeAxisType::REL_HWHEEL_HI_RES.0);
    }

    // ==================== Construction Tests ====================

    #[test]
    fn test_requires_analog_axis() {
        let mapping = Arc::new(Mapping::new(&["KEY_A"], "mouse", "REL_X"));
        let trigger = mapping.parse_trigger().unwrap();
        assert!(matches!(
            AbsToRelHandler::new(mapping, trigger),
            Err(RemapError::InvalidMapping(_))
        ));
    }

    #[test]
    fn test_wraps_with_axis_switch() {
        let h = handler(Mapping::new(&["BTN_TL", "ABS_X"], "mouse", "REL_X"));
        assert_eq!(h.wrap_with().values().next(), Some(&WrapperKind::AxisSwitch));
        assert_eq!(h.input_keys(), vec![InputKey::new(crate::event::input::EV_ABS, ABS_X)]);
        assert!(handler(Mapping::new(&["ABS_X"], "mouse", "REL_X")).wrap_with().is_empty());
    }

    // ==================== Loop Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_average_rate() {
        let (mouse, handle) = mouse();
        let mut mapping = Mapping::new(&["ABS_X"], "mouse", "REL_X");
        mapping.deadzone = 0.1;
        mapping.rel_xy_speed = 1000.0;
        mapping.rel_xy_rate = 60;
        let mut h = handler(mapping);

        assert!(h.notify(&InputEvent::abs(ABS_X, 16384), &stick_source(), &handle, false));
        assert!(h.is_running());
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.reset();
        settle().await;

        let values = mouse.values(EV_REL, REL_X);
        assert!((55..=62).contains(&values.len()), "{} ticks", values.len());

        // (16384.5 / 32767.5 - 0.1) / 0.9 of full speed
        let expected = ((16384.5 / 32767.5) - 0.1) / 0.9 * 1000.0;
        let average = f64::from(values.iter().sum::<i32>()) / values.len() as f64;
        assert!(
            (average - expected).abs() / expected < 0.02,
            "average {average}, expected {expected}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_deflection() {
        let (mouse, handle) = mouse();
        let mut h = handler(Mapping::new(&["ABS_X"], "mouse", "REL_X"));

        h.notify(&InputEvent::abs(ABS_X, -32768), &stick_source(), &handle, false);
        tokio::time::sleep(Duration::from_millis(500)).await;
        h.reset();
        settle().await;

        let values = mouse.values(EV_REL, REL_X);
        assert!(!values.is_empty());
        assert!(values.iter().all(|v| *v == -30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_centered_axis_emits_nothing() {
        let (mouse, handle) = mouse();
        let mut h = handler(Mapping::new(&["ABS_X"], "mouse", "REL_X"));

        // inside the deadzone
        assert!(h.notify(&InputEvent::abs(ABS_X, 1000), &stick_source(), &handle, false));
        assert!(!h.is_running());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(mouse.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_return_to_center_stops_loop() {
        let (mouse, handle) = mouse();
        let source = stick_source();
        let mut h = handler(Mapping::new(&["ABS_X"], "mouse", "REL_X"));

        h.notify(&InputEvent::abs(ABS_X, 32767), &source, &handle, false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.notify(&InputEvent::abs(ABS_X, 0), &source, &handle, false));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!h.is_running());

        let count = mouse.values(EV_REL, REL_X).len();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(mouse.values(EV_REL, REL_X).len(), count);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recenter_stops_within_one_tick() {
        let (mouse, handle) = mouse();
        let source = stick_source();
        let mut h = handler(Mapping::new(&["ABS_X"], "mouse", "REL_X"));

        let deflected = InputEvent::abs(ABS_X, 30000);
        h.notify(&deflected, &source, &handle, false);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let recenter = deflected.with_actions(EventActions::RECENTER);
        assert!(h.notify(&recenter, &source, &handle, false));
        let count = mouse.values(EV_REL, REL_X).len();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!h.is_running());
        assert!(mouse.values(EV_REL, REL_X).len() <= count + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continued_deflection_keeps_single_loop() {
        let (mouse, handle) = mouse();
        let source = stick_source();
        let mut h = handler(Mapping::new(&["ABS_X"], "mouse", "REL_X"));

        for value in [20000, 25000, 30000, 32767] {
            h.notify(&InputEvent::abs(ABS_X, value), &source, &handle, false);
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;
        h.reset();
        settle().await;

        // one loop at 60 Hz, not four
        let values = mouse.values(EV_REL, REL_X);
        assert!(values.len() <= 62, "{} ticks", values.len());
        assert!(values.iter().all(|v| *v == 30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wheel_writes_both_resolutions() {
        let (mouse, handle) = mouse();
        let mut mapping = Mapping::new(&["ABS_X"], "mouse", "REL_WHEEL");
        mapping.deadzone = 0.0;
        mapping.rel_wheel_speed = 0.5;
        let mut h = handler(mapping);

        h.notify(&InputEvent::abs(ABS_X, 32767), &stick_source(), &handle, false);
        tokio::time::sleep(Duration::from_millis(500)).await;
        h.reset();
        settle().await;

        let low: i32 = mouse.values(EV_REL, REL_WHEEL).iter().sum();
        let high: i32 = mouse.values(EV_REL, REL_WHEEL_HI_RES).iter().sum();
        assert!(low > 0);
        assert!(
            (f64::from(high) - 120.0 * f64::from(low)).abs() <= 120.0,
            "low {low}, high {high}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hi_res_wheel_output() {
        let (mouse, handle) = mouse();
        let mut mapping = Mapping::new(&["ABS_X"], "mouse", "REL_WHEEL_HI_RES");
        mapping.deadzone = 0.0;
        mapping.rel_wheel_speed = 60.0;
        let mut h = handler(mapping);

        h.notify(&InputEvent::abs(ABS_X, 32767), &stick_source(), &handle, false);
        tokio::time::sleep(Duration::from_millis(500)).await;
        h.reset();
        settle().await;

        let high = mouse.values(EV_REL, REL_WHEEL_HI_RES);
        assert!(high.iter().all(|v| *v == 60));
        let low: i32 = mouse.values(EV_REL, REL_WHEEL).iter().sum();
        assert!((f64::from(high.iter().sum::<i32>()) / 120.0 - f64::from(low)).abs() <= 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_is_contained() {
        let (mouse, handle) = mouse();
        let mut mapping = Mapping::new(&["ABS_X"], "mouse", "REL_X");
        mapping.gain = 1e12;
        let mut h = handler(mapping);

        h.notify(&InputEvent::abs(ABS_X, 32767), &stick_source(), &handle, false);
        tokio::time::sleep(Duration::from_millis(200)).await;

        // every tick overflowed, nothing was written, the loop survives
        assert!(h.is_running());
        assert!(mouse.events().is_empty());
        h.reset();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_recovers_after_overflow() {
        let (mouse, handle) = mouse();
        let source = stick_source();
        let mut h = handler(Mapping::new(&["ABS_X"], "mouse", "REL_X"));

        h.notify(&InputEvent::abs(ABS_X, 32767), &source, &handle, false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.motion.set_rate(1e12);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let before = mouse.values(EV_REL, REL_X).len();
        assert!(before > 0);
        assert!(h.is_running());

        // same loop, a normal deflection again
        h.notify(&InputEvent::abs(ABS_X, -32768), &source, &handle, false);
        tokio::time::sleep(Duration::from_millis(200)).await;
        h.reset();
        settle().await;

        let values = mouse.values(EV_REL, REL_X);
        assert!(values.iter().all(|v| v.abs() == 30), "{values:?}");
        let after = &values[before..];
        assert!(after.len() >= 10, "{} ticks after overflow", after.len());
        assert!(after.iter().all(|v| *v == -30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressed_sample_stops_running_loop() {
        let (mouse, handle) = mouse();
        let source = stick_source();
        let mut h = handler(Mapping::new(&["ABS_X"], "mouse", "REL_X"));

        h.notify(&InputEvent::abs(ABS_X, 32767), &source, &handle, false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!h.notify(&InputEvent::abs(ABS_X, 32767), &source, &handle, true));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!h.is_running());

        let count = mouse.values(EV_REL, REL_X).len();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(mouse.values(EV_REL, REL_X).len(), count);
    }

    #[tokio::test]
    async fn test_range_queried_once() {
        let (_mouse, handle) = mouse();
        let mut source = MockSourceDevice::new();
        source
            .expect_abs_range()
            .times(1)
            .returning(|_| Some(AxisRange::new(-32768, 32767)));
        let mut h = handler(Mapping::new(&["ABS_X"], "mouse", "REL_X"));

        for value in [0, 100, 0] {
            h.notify(&InputEvent::abs(ABS_X, value), &source, &handle, false);
        }
    }

    #[tokio::test]
    async fn test_missing_range_is_not_handled() {
        let (_mouse, handle) = mouse();
        let mut source = MockSourceDevice::new();
        source.expect_abs_range().returning(|_| None);
        let mut h = handler(Mapping::new(&["ABS_X"], "mouse", "REL_X"));

        assert!(!h.notify(&InputEvent::abs(ABS_X, 32767), &source, &handle, false));
        assert!(!h.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_loop() {
        let (mouse, handle) = mouse();
        let mut h = handler(Mapping::new(&["ABS_X"], "mouse", "REL_X"));
        h.notify(&InputEvent::abs(ABS_X, 32767), &stick_source(), &handle, false);
        let motion = h.motion.clone();
        tokio::time::sleep(Duration::from_millis(100)).await;

        drop(h);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!motion.running.load(Ordering::SeqCst));
        let count = mouse.events().len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(mouse.events().len(), count);
    }

    #[tokio::test]
    async fn test_suppressed_sample_is_ignored_but_recenter_is_not() {
        let (_mouse, handle) = mouse();
        let mut h = handler(Mapping::new(&["ABS_X"], "mouse", "REL_X"));
        let source = MockSourceDevice::new();

        assert!(!h.notify(&InputEvent::abs(ABS_X, 32767), &source, &handle, true));
        assert!(!h.is_running());
        let recenter = InputEvent::abs(ABS_X, 0).with_actions(EventActions::RECENTER);
        assert!(h.notify(&recenter, &source, &handle, true));
    }
}
