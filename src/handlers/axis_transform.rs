//! # Axis Transformation
//!
//! Shapes a raw analog sample into a signed magnitude before it is scaled to
//! an output speed.
//!
//! ## Pipeline
//!
//! 1. **Normalize** the raw value against the range the device reports for
//!    the axis: `[-1, 1]` around the midpoint, or `[0, 1]` from the minimum
//!    for one-directional axes (gas, brake, throttle, pressure, distance).
//! 2. **Deadzone**: values within the deadzone map to 0, the remaining range
//!    is rescaled to reach 1 again at full deflection.
//! 3. **Expo**: `output = (1 - expo) * input + expo * input³` for positive
//!    expo. Negative expo uses the inverse of that curve, which makes the
//!    centre more sensitive instead of less.
//! 4. **Gain**: linear factor.
//!
//! ## Usage
//!
//! ```
//! use remapper::handlers::axis_transform::{AxisMode, AxisRange, TransformParams, Transformation};
//!
//! let params = TransformParams { deadzone: 0.1, expo: 0.0, gain: 1.0 };
//! let t = Transformation::new(AxisRange::new(-32768, 32767), AxisMode::Bidirectional, params);
//!
//! // Near centre (within deadzone)
//! assert_eq!(t.apply(1000), 0.0);
//!
//! // Full deflection in both directions
//! assert!((t.apply(32767) - 1.0).abs() < 0.001);
//! assert!((t.apply(-32768) + 1.0).abs() < 0.001);
//! ```

use evdev::AbsoluteAxisType;

/// Minimum and maximum the device reports for one absolute axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub min: i32,
    pub max: i32,
}

impl AxisRange {
    #[must_use]
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }
}

/// Whether an axis rests in the middle of its range or at its minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisMode {
    /// Sticks, hats, wheels: rest position is the midpoint.
    Bidirectional,
    /// Pedals and analog triggers: rest position is the minimum.
    Unidirectional,
}

impl AxisMode {
    /// Picks the mode for an absolute axis code.
    #[must_use]
    pub fn for_axis(code: u16) -> Self {
        match AbsoluteAxisType(code) {
            AbsoluteAxisType::ABS_GAS
            | AbsoluteAxisType::ABS_BRAKE
            | AbsoluteAxisType::ABS_THROTTLE
            | AbsoluteAxisType::ABS_PRESSURE
            | AbsoluteAxisType::ABS_DISTANCE => AxisMode::Unidirectional,
            _ => AxisMode::Bidirectional,
        }
    }
}

/// Response-shaping parameters taken from a mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    /// Deadzone as a fraction of full deflection (0.0 to <1.0).
    pub deadzone: f64,
    /// Curve factor (-1.0 to 1.0). 0.0 = linear.
    pub expo: f64,
    /// Linear factor applied last.
    pub gain: f64,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            deadzone: 0.1,
            expo: 0.0,
            gain: 1.0,
        }
    }
}

/// Largest deadzone that still leaves a usable range.
const MAX_DEADZONE: f64 = 0.99;

/// Pure transform from a raw axis sample to a signed magnitude.
///
/// Built once per handler because querying the device for the axis range
/// is expensive. Output lies in `[-gain, gain]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transformation {
    range: AxisRange,
    mode: AxisMode,
    deadzone: f64,
    expo: f64,
    gain: f64,
}

impl Transformation {
    /// Creates a transformation for one axis.
    ///
    /// Deadzone is clamped to `0.0..=0.99` and expo to `-1.0..=1.0`.
    #[must_use]
    pub fn new(range: AxisRange, mode: AxisMode, params: TransformParams) -> Self {
        Self {
            range,
            mode,
            deadzone: params.deadzone.clamp(0.0, MAX_DEADZONE),
            expo: params.expo.clamp(-1.0, 1.0),
            gain: params.gain,
        }
    }

    #[must_use]
    pub fn deadzone(&self) -> f64 {
        self.deadzone
    }

    #[must_use]
    pub fn expo(&self) -> f64 {
        self.expo
    }

    /// Applies the whole pipeline to a raw sample.
    #[must_use]
    pub fn apply(&self, raw: i32) -> f64 {
        let normalized = self.normalize(raw);
        let sign = normalized.signum();
        let shaped = self.apply_expo(self.apply_deadzone(normalized.abs()));
        sign * shaped * self.gain
    }

    /// Maps the raw value into `[-1, 1]` or `[0, 1]`.
    fn normalize(&self, raw: i32) -> f64 {
        let min = f64::from(self.range.min);
        let max = f64::from(self.range.max);
        let span = max - min;
        if span <= 0.0 {
            return 0.0;
        }

        let raw = f64::from(raw);
        match self.mode {
            AxisMode::Bidirectional => {
                let half = span / 2.0;
                ((raw - (min + half)) / half).clamp(-1.0, 1.0)
            }
            AxisMode::Unidirectional => ((raw - min) / span).clamp(0.0, 1.0),
        }
    }

    /// Maps values within deadzone to 0, and scales remaining range to 0..1.
    #[inline]
    fn apply_deadzone(&self, abs_input: f64) -> f64 {
        if abs_input <= self.deadzone {
            0.0
        } else {
            (abs_input - self.deadzone) / (1.0 - self.deadzone)
        }
    }

    /// Applies the response curve to a value in range 0..1.
    #[inline]
    fn apply_expo(&self, input: f64) -> f64 {
        if self.expo == 0.0 {
            input
        } else if self.expo > 0.0 {
            (1.0 - self.expo) * input + self.expo * input * input * input
        } else {
            inverse_cubic(input, -self.expo)
        }
    }
}

/// Solves `k * y³ + (1 - k) * y = x` for `y`.
///
/// The cubic is strictly increasing for `k` in `(0, 1]`, so there is exactly
/// one real root; Cardano's formula gives it directly.
fn inverse_cubic(x: f64, k: f64) -> f64 {
    if k >= 1.0 {
        return x.cbrt();
    }
    let p = (1.0 - k) / k;
    let q = -x / k;
    let root = ((q / 2.0).powi(2) + (p / 3.0).powi(3)).sqrt();
    (-q / 2.0 + root).cbrt() + (-q / 2.0 - root).cbrt()
}
