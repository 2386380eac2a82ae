//! Run-wide simulation configuration.

use crate::agent::Sensor;
use crate::vehicle::acceleration::LongitudinalModel;
use crate::vehicle::lane_change::LaneChangeModel;
use crate::vehicle::VehicleKind;
use crate::{SimError, SimResult};

/// What to do when two vehicles in the same lane overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CrashPolicy {
    /// Abort the step with [SimError::Crash].
    Terminate,
    /// Stop both vehicles in place and keep them stopped.
    #[default]
    Freeze,
}

/// The configuration of a simulation run. Loaded once before the run starts.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimulationConfig {
    /// Seed of the random number generator used for measurement noise.
    pub seed: u64,
    /// How crashes found by the consistency check are resolved.
    pub crash_policy: CrashPolicy,
    /// Whether to look for overlapping vehicles after every position update.
    pub check_consistency: bool,
    /// Whether accelerations are computed from each vehicle's perception
    /// rather than from the lane containers.
    pub use_perception: bool,
    /// How far ahead vehicles look for traffic lights, in m.
    pub traffic_light_lookahead: f64,
    /// The minimum time between two lane changes of one vehicle, in s.
    pub lane_change_delay: f64,
    /// Above this speed (m/s) vehicles will not pass slower vehicles on their left.
    pub no_overtaking_on_right_speed: Option<f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            crash_policy: CrashPolicy::Freeze,
            check_consistency: true,
            use_perception: false,
            traffic_light_lookahead: 200.0,
            lane_change_delay: 3.0,
            no_overtaking_on_right_speed: None,
        }
    }
}

impl SimulationConfig {
    /// Checks that the configuration values make sense.
    pub fn validate(&self) -> SimResult<()> {
        if !(self.traffic_light_lookahead >= 0.0) {
            return Err(SimError::Config(format!(
                "traffic light lookahead must be non-negative, got {}",
                self.traffic_light_lookahead
            )));
        }
        if !(self.lane_change_delay >= 0.0) {
            return Err(SimError::Config(format!(
                "lane change delay must be non-negative, got {}",
                self.lane_change_delay
            )));
        }
        if let Some(speed) = self.no_overtaking_on_right_speed {
            if !(speed >= 0.0) {
                return Err(SimError::Config(format!(
                    "critical overtaking speed must be non-negative, got {speed}"
                )));
            }
        }
        Ok(())
    }

    /// Parses and validates a configuration from JSON.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> SimResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| SimError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// The configuration of one type of vehicle.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VehiclePrototype {
    pub label: String,
    pub kind: VehicleKind,
    /// The vehicle length in m.
    pub length: f64,
    /// The vehicle width in m.
    pub width: f64,
    /// The largest deceleration the vehicle can apply, in m/s<sup>2</sup>.
    pub max_deceleration: f64,
    pub model: LongitudinalModel,
    pub lane_change: Option<LaneChangeModel>,
    pub sensors: Vec<Sensor>,
}

impl Default for VehiclePrototype {
    fn default() -> Self {
        Self {
            label: "car".into(),
            kind: VehicleKind::Car,
            length: 5.0,
            width: 2.0,
            max_deceleration: 9.0,
            model: LongitudinalModel::default(),
            lane_change: Some(LaneChangeModel::default()),
            sensors: vec![],
        }
    }
}

impl VehiclePrototype {
    /// A standing obstacle of the given length.
    pub fn obstacle(length: f64) -> Self {
        Self {
            label: "obstacle".into(),
            kind: VehicleKind::Obstacle,
            length,
            lane_change: None,
            ..Default::default()
        }
    }

    /// Checks that the prototype describes a physical vehicle.
    pub fn validate(&self) -> SimResult<()> {
        if !(self.length > 0.0) {
            return Err(SimError::Config(format!(
                "vehicle '{}' must have a positive length, got {}",
                self.label, self.length
            )));
        }
        if !(self.max_deceleration > 0.0) {
            return Err(SimError::Config(format!(
                "vehicle '{}' must have a positive maximum deceleration, got {}",
                self.label, self.max_deceleration
            )));
        }
        Ok(())
    }

    /// Parses and validates a prototype from JSON.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> SimResult<Self> {
        let prototype: Self =
            serde_json::from_str(json).map_err(|err| SimError::Config(err.to_string()))?;
        prototype.validate()?;
        Ok(prototype)
    }
}
