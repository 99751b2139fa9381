//! Configuration loading for pullcord
//!
//! The distance bands and speed gates were tuned by hand against recorded
//! bus trips. They live here rather than as literals so a recorded-trip
//! corpus can be replayed against alternative settings.

use crate::error::{NavError, PullcordError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration, usually read from `pullcord.toml`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PullcordConfig {
    #[serde(default)]
    pub proximity: ProximityConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
}

impl PullcordConfig {
    /// Load configuration from a TOML file. Missing sections and keys fall
    /// back to their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: PullcordConfig = toml::from_str(&contents)?;
        config
            .proximity
            .validate()
            .map_err(|e| PullcordError::Config(e.to_string()))?;
        Ok(config)
    }
}

/// Thresholds for the get-ready gate and the stop-reached ladder.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct ProximityConfig {
    /// Distance to the before stop under which "get ready" fires (meters, default: 250)
    #[serde(default = "default_get_ready_radius")]
    pub get_ready_radius_m: f64,

    /// Outer edge of the outer band (meters, default: 100)
    #[serde(default = "default_outer_band")]
    pub outer_band_m: f64,

    /// Boundary between the outer and mid bands (meters, default: 50)
    #[serde(default = "default_mid_band")]
    pub mid_band_m: f64,

    /// Boundary between the mid and inner bands (meters, default: 20)
    #[serde(default = "default_inner_band")]
    pub inner_band_m: f64,

    /// Speed above which the vehicle is treated as driving through (m/s, default: 15)
    #[serde(default = "default_pass_through_speed")]
    pub pass_through_speed_mps: f32,

    /// Speed below which the vehicle is treated as dwelling at the stop (m/s, default: 10)
    #[serde(default = "default_dwell_speed")]
    pub dwell_speed_mps: f32,

    /// Distance past the inner band a departing fix must reach before the
    /// mid-departure crossing counts (meters, default: 5, 0 = exact band edge)
    #[serde(default = "default_departure_margin")]
    pub departure_margin_m: f64,

    /// When set, the inner-band pass-through only fires if the before and
    /// target stops are closer than this (meters, default: unset)
    #[serde(default)]
    pub fast_pass_max_leg_m: Option<f64>,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            get_ready_radius_m: default_get_ready_radius(),
            outer_band_m: default_outer_band(),
            mid_band_m: default_mid_band(),
            inner_band_m: default_inner_band(),
            pass_through_speed_mps: default_pass_through_speed(),
            dwell_speed_mps: default_dwell_speed(),
            departure_margin_m: default_departure_margin(),
            fast_pass_max_leg_m: None,
        }
    }
}

impl ProximityConfig {
    /// Reject band layouts the ladder cannot work with.
    pub fn validate(&self) -> std::result::Result<(), NavError> {
        let finite_positive = |v: f64| v.is_finite() && v > 0.0;

        if !finite_positive(self.inner_band_m)
            || !finite_positive(self.mid_band_m)
            || !finite_positive(self.outer_band_m)
            || !finite_positive(self.get_ready_radius_m)
        {
            return Err(NavError::InvalidConfig(
                "band distances and get-ready radius must be positive".to_string(),
            ));
        }
        if !(self.inner_band_m < self.mid_band_m && self.mid_band_m < self.outer_band_m) {
            return Err(NavError::InvalidConfig(format!(
                "bands must ascend: inner {} < mid {} < outer {}",
                self.inner_band_m, self.mid_band_m, self.outer_band_m
            )));
        }
        if !self.departure_margin_m.is_finite()
            || self.departure_margin_m < 0.0
            || self.inner_band_m + self.departure_margin_m >= self.mid_band_m
        {
            return Err(NavError::InvalidConfig(format!(
                "departure margin {} must be non-negative and leave room inside the mid band",
                self.departure_margin_m
            )));
        }
        if !(self.dwell_speed_mps.is_finite()
            && self.pass_through_speed_mps.is_finite()
            && self.dwell_speed_mps <= self.pass_through_speed_mps)
        {
            return Err(NavError::InvalidConfig(format!(
                "dwell speed {} must not exceed pass-through speed {}",
                self.dwell_speed_mps, self.pass_through_speed_mps
            )));
        }
        if let Some(leg) = self.fast_pass_max_leg_m {
            if !finite_positive(leg) {
                return Err(NavError::InvalidConfig(
                    "fast_pass_max_leg_m must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Settings for the fix-processing task.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Bounded command queue length (default: 64)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Acknowledge "get ready" on the rider's behalf (default: false)
    #[serde(default)]
    pub auto_confirm: bool,

    /// Drop repeated and out-of-order fixes before they reach the engine (default: true)
    #[serde(default = "default_drop_duplicates")]
    pub drop_duplicates: bool,

    /// Emit a telemetry event for every accepted fix (default: false)
    #[serde(default)]
    pub telemetry: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            auto_confirm: false,
            drop_duplicates: default_drop_duplicates(),
            telemetry: false,
        }
    }
}

/// Settings for writing recorded trips.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct RecordingConfig {
    /// Only fixes this close to the before stop are written (meters, default: 350)
    #[serde(default = "default_recording_radius")]
    pub recording_radius_m: f64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            recording_radius_m: default_recording_radius(),
        }
    }
}

// Default value functions
fn default_get_ready_radius() -> f64 {
    250.0
}
fn default_outer_band() -> f64 {
    100.0
}
fn default_mid_band() -> f64 {
    50.0
}
fn default_inner_band() -> f64 {
    20.0
}
/// ~34 mph
fn default_pass_through_speed() -> f32 {
    15.0
}
/// ~22 mph
fn default_dwell_speed() -> f32 {
    10.0
}
fn default_departure_margin() -> f64 {
    5.0
}
fn default_channel_capacity() -> usize {
    64
}
fn default_drop_duplicates() -> bool {
    true
}
fn default_recording_radius() -> f64 {
    default_get_ready_radius() + 100.0
}
