//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! ```toml
//! [injection]
//! forward_target = "keyboard + mouse"
//!
//! [[devices]]
//! path = "/dev/input/event5"
//!
//! [[mappings]]
//! trigger = ["KEY_LEFTCTRL", "KEY_A"]
//! target = "keyboard"
//! output = "KEY_B"
//!
//! [[mappings]]
//! trigger = ["ABS_X"]
//! target = "mouse"
//! output = "REL_X"
//! rel_xy_speed = 40.0
//! ```

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use evdev::RelativeAxisType;

use crate::error::{RemapError, Result};
use crate::event::Trigger;
use crate::handlers::axis_transform::TransformParams;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub injection: InjectionConfig,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    #[serde(default)]
    pub mappings: Vec<Mapping>,
}

/// Injection-wide settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InjectionConfig {
    /// Virtual device that receives events no mapping handled.
    #[serde(default)]
    pub forward_target: Option<String>,
}

/// One physical source device, by path or by name
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeviceConfig {
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub name: String,
}

/// One trigger and the effect it produces.
///
/// Handlers keep a shared read-only reference for their whole lifetime.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Mapping {
    /// Symbolic inputs, terminal input last (e.g. `["KEY_LEFTCTRL", "KEY_A"]`).
    pub trigger: Vec<String>,

    /// Name of the virtual output device.
    #[serde(default = "default_target")]
    pub target: String,

    /// Output key (`KEY_B`), relative axis (`REL_X`) or macro (`tap(KEY_A).wait(20)`).
    pub output: String,

    #[serde(default = "default_deadzone")]
    pub deadzone: f64,

    #[serde(default = "default_gain")]
    pub gain: f64,

    #[serde(default = "default_expo")]
    pub expo: f64,

    /// Pointer update frequency in Hz.
    #[serde(default = "default_rel_rate")]
    pub rel_xy_rate: u32,

    /// Wheel update frequency in Hz.
    #[serde(default = "default_rel_rate")]
    pub rel_wheel_rate: u32,

    /// Pointer units per tick at full deflection.
    #[serde(default = "default_rel_xy_speed")]
    pub rel_xy_speed: f64,

    /// Wheel ticks per tick at full deflection.
    #[serde(default = "default_rel_wheel_speed")]
    pub rel_wheel_speed: f64,
}

// Default value functions
fn default_target() -> String { "keyboard".to_string() }

fn default_deadzone() -> f64 { 0.1 }
fn default_gain() -> f64 { 1.0 }
fn default_expo() -> f64 { 0.0 }

fn default_rel_rate() -> u32 { 60 }
fn default_rel_xy_speed() -> f64 { 30.0 }
fn default_rel_wheel_speed() -> f64 { 1.0 }

/// Highest update frequency accepted for relative output.
const MAX_REL_RATE: u32 = 1000;

impl Mapping {
    /// Creates a mapping with default transform, rate and speed parameters.
    ///
    /// # Examples
    ///
    /// ```
    /// use remapper::config::Mapping;
    ///
    /// let mapping = Mapping::new(&["ABS_Y"], "mouse", "REL_WHEEL");
    /// assert!(mapping.is_wheel_output());
    /// assert_eq!(mapping.rel_wheel_rate, 60);
    /// ```
    #[must_use]
    pub fn new(trigger: &[&str], target: &str, output: &str) -> Self {
        Self {
            trigger: trigger.iter().map(|s| (*s).to_string()).collect(),
            target: target.to_string(),
            output: output.to_string(),
            deadzone: default_deadzone(),
            gain: default_gain(),
            expo: default_expo(),
            rel_xy_rate: default_rel_rate(),
            rel_wheel_rate: default_rel_rate(),
            rel_xy_speed: default_rel_xy_speed(),
            rel_wheel_speed: default_rel_wheel_speed(),
        }
    }

    /// Parses the symbolic trigger.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSymbol` or `InvalidMapping`.
    pub fn parse_trigger(&self) -> Result<Trigger> {
        Trigger::parse(&self.trigger)
    }

    /// Relative axis code of the output, if the output is a relative axis.
    #[must_use]
    pub fn output_rel_code(&self) -> Option<u16> {
        RelativeAxisType::from_str(self.output.trim()).ok().map(|axis| axis.0)
    }

    /// Whether the output is one of the (hi-res) wheel axes.
    #[must_use]
    pub fn is_wheel_output(&self) -> bool {
        matches!(
            self.output_rel_code().map(RelativeAxisType),
            Some(
                RelativeAxisType::REL_WHEEL
                    | RelativeAxisType::REL_HWHEEL
                    | RelativeAxisType::REL_WHEEL_HI_RES
                    | RelativeAxisType::REL_HWHEEL_HI_RES
            )
        )
    }

    #[must_use]
    pub fn transform_params(&self) -> TransformParams {
        TransformParams {
            deadzone: self.deadzone,
            expo: self.expo,
            gain: self.gain,
        }
    }

    /// Update frequency for this mapping's relative output.
    #[must_use]
    pub fn rel_rate(&self) -> u32 {
        if self.is_wheel_output() {
            self.rel_wheel_rate
        } else {
            self.rel_xy_rate
        }
    }

    /// Output units per tick at full deflection.
    #[must_use]
    pub fn rel_speed(&self) -> f64 {
        if self.is_wheel_output() {
            self.rel_wheel_speed
        } else {
            self.rel_xy_speed
        }
    }

    /// Validate mapping values
    ///
    /// # Errors
    ///
    /// Returns `InvalidMapping` if any value is out of its valid range
    pub fn validate(&self) -> Result<()> {
        if self.trigger.is_empty() {
            return Err(RemapError::InvalidMapping("trigger cannot be empty".to_string()));
        }

        if self.target.is_empty() {
            return Err(RemapError::InvalidMapping("target cannot be empty".to_string()));
        }

        if self.output.trim().is_empty() {
            return Err(RemapError::InvalidMapping("output cannot be empty".to_string()));
        }

        if !(0.0..1.0).contains(&self.deadzone) {
            return Err(RemapError::InvalidMapping(
                "deadzone must be at least 0.0 and below 1.0".to_string(),
            ));
        }

        if !(-1.0..=1.0).contains(&self.expo) {
            return Err(RemapError::InvalidMapping(
                "expo must be between -1.0 and 1.0".to_string(),
            ));
        }

        if !self.gain.is_finite() {
            return Err(RemapError::InvalidMapping("gain must be a finite number".to_string()));
        }

        for (name, value) in [("rel_xy_rate", self.rel_xy_rate), ("rel_wheel_rate", self.rel_wheel_rate)] {
            if value == 0 || value > MAX_REL_RATE {
                return Err(RemapError::InvalidMapping(format!(
                    "{} must be between 1 and {}",
                    name, MAX_REL_RATE
                )));
            }
        }

        for (name, value) in [("rel_xy_speed", self.rel_xy_speed), ("rel_wheel_speed", self.rel_wheel_speed)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(RemapError::InvalidMapping(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// Individual mappings are validated later, when the handler graph is
    /// built, so one bad mapping does not prevent the others from loading.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use remapper::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        contents.parse()
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        for device in &self.devices {
            if device.path.is_empty() && device.name.is_empty() {
                return Err(RemapError::Config(toml::de::Error::custom(
                    "each device needs a path or a name",
                )));
            }
        }

        if let Some(target) = &self.injection.forward_target {
            if target.is_empty() {
                return Err(RemapError::Config(toml::de::Error::custom(
                    "forward_target cannot be empty when set",
                )));
            }
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = RemapError;

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }
}
