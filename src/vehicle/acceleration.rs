//! Longitudinal (car-following) acceleration models.

/// The smallest net gap handed to a model, in m.
const TINY_GAP: f64 = 0.01;

/// The length of one cell of the Nagel-Schreckenberg automaton, in m.
pub const NSM_CELL_LENGTH: f64 = 7.5;

/// The update period of the Nagel-Schreckenberg automaton, in s.
const NSM_UPDATE_TIME: f64 = 1.0;

/// Location-dependent corrections to a model's parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalConditions {
    /// Multiplies the time headway / reaction time.
    pub alpha_t: f64,
    /// Multiplies the desired speed.
    pub alpha_v0: f64,
    /// An upper bound on the desired speed in m/s.
    pub speed_limit: f64,
}

impl LocalConditions {
    /// No corrections and no speed limit.
    pub const NEUTRAL: Self = Self {
        alpha_t: 1.0,
        alpha_v0: 1.0,
        speed_limit: f64::INFINITY,
    };

    fn desired_speed(&self, v0: f64) -> f64 {
        f64::min(self.alpha_v0 * v0, self.speed_limit)
    }
}

impl Default for LocalConditions {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// A car-following model mapping the situation ahead of a vehicle to an acceleration.
pub trait AccelerationModel {
    /// The speed the vehicle approaches on a free road, in m/s.
    fn desired_speed(&self) -> f64;

    /// Computes the acceleration in m/s<sup>2</sup>.
    ///
    /// # Arguments
    /// * `gap` - The net distance to the leader in m, infinite on a free road.
    /// * `speed` - The vehicle's speed in m/s.
    /// * `speed_diff` - The approach rate, own speed minus the leader's speed, in m/s.
    /// * `conditions` - Corrections applying at the vehicle's location.
    fn calc_acc(&self, gap: f64, speed: f64, speed_diff: f64, conditions: &LocalConditions) -> f64;

    /// Computes the acceleration without any local corrections.
    fn accelerate(&self, gap: f64, speed: f64, speed_diff: f64) -> f64 {
        self.calc_acc(gap, speed, speed_diff, &LocalConditions::NEUTRAL)
    }
}

/// The parameters of the intelligent driver model.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IdmParams {
    /// The desired speed in m/s.
    pub desired_speed: f64,
    /// The desired time gap to the vehicle ahead in s.
    pub time_headway: f64,
    /// The bumper-to-bumper distance kept at standstill in m.
    pub min_gap: f64,
    /// The maximum acceleration in m/s<sup>2</sup>.
    pub max_acceleration: f64,
    /// The comfortable deceleration in m/s<sup>2</sup>.
    pub comf_deceleration: f64,
    /// The acceleration exponent.
    pub delta: f64,
}

impl Default for IdmParams {
    fn default() -> Self {
        Self {
            desired_speed: 33.3,
            time_headway: 1.5,
            min_gap: 2.0,
            max_acceleration: 1.0,
            comf_deceleration: 1.5,
            delta: 4.0,
        }
    }
}

/// The parameters of the Krauss collision-avoidance model.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KraussParams {
    /// The desired speed in m/s.
    pub desired_speed: f64,
    /// The reaction time in s.
    pub reaction_time: f64,
    /// The bumper-to-bumper distance kept at standstill in m.
    pub min_gap: f64,
    /// The maximum acceleration in m/s<sup>2</sup>.
    pub max_acceleration: f64,
    /// The comfortable deceleration in m/s<sup>2</sup>.
    pub comf_deceleration: f64,
    /// The dawdling parameter in `[0, 1]`.
    pub epsilon: f64,
}

impl Default for KraussParams {
    fn default() -> Self {
        Self {
            desired_speed: 33.3,
            reaction_time: 1.0,
            min_gap: 2.0,
            max_acceleration: 1.0,
            comf_deceleration: 1.5,
            epsilon: 0.4,
        }
    }
}

/// The parameters of the Nagel-Schreckenberg cellular automaton.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NsmParams {
    /// The desired speed in m/s, rounded to whole cells per update.
    pub desired_speed: f64,
    /// The probability of slowing down by one cell, applied as its expectation.
    pub p_slowdown: f64,
}

impl Default for NsmParams {
    fn default() -> Self {
        Self {
            desired_speed: 37.5,
            p_slowdown: 0.25,
        }
    }
}

/// The longitudinal model attached to a vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LongitudinalModel {
    Idm(IdmParams),
    Krauss(KraussParams),
    Nsm(NsmParams),
}

impl Default for LongitudinalModel {
    fn default() -> Self {
        Self::Idm(IdmParams::default())
    }
}

impl LongitudinalModel {
    /// The deceleration the model regards as comfortable, in m/s<sup>2</sup>.
    pub fn comf_deceleration(&self) -> f64 {
        match self {
            Self::Idm(params) => params.comf_deceleration,
            Self::Krauss(params) => params.comf_deceleration,
            Self::Nsm(_) => NSM_CELL_LENGTH / NSM_UPDATE_TIME,
        }
    }
}

impl AccelerationModel for LongitudinalModel {
    fn desired_speed(&self) -> f64 {
        match self {
            Self::Idm(params) => params.desired_speed,
            Self::Krauss(params) => params.desired_speed,
            Self::Nsm(params) => params.desired_speed,
        }
    }

    fn calc_acc(&self, gap: f64, speed: f64, speed_diff: f64, conditions: &LocalConditions) -> f64 {
        let gap = f64::max(gap, TINY_GAP);
        match self {
            Self::Idm(params) => idm(params, gap, speed, speed_diff, conditions),
            Self::Krauss(params) => krauss(params, gap, speed, speed_diff, conditions),
            Self::Nsm(params) => nsm(params, gap, speed, conditions),
        }
    }
}

/// Computes an acceleration using the intelligent driver model.
fn idm(p: &IdmParams, gap: f64, speed: f64, speed_diff: f64, cond: &LocalConditions) -> f64 {
    let v0 = cond.desired_speed(p.desired_speed);
    let headway = cond.alpha_t * p.time_headway;
    let a = p.max_acceleration;

    let free = if v0 > 0.0 {
        (speed / v0).powf(p.delta)
    } else {
        1.0
    };
    let factor = 1.0 / (2.0 * (a * p.comf_deceleration).sqrt());
    let s_star = p.min_gap + f64::max(0.0, speed * headway + speed * speed_diff * factor);
    let term = s_star / gap;
    a * (1.0 - free - term * term)
}

/// Computes an acceleration using the Krauss model with the mean of the dawdling range.
fn krauss(p: &KraussParams, gap: f64, speed: f64, speed_diff: f64, cond: &LocalConditions) -> f64 {
    let v0 = cond.desired_speed(p.desired_speed);
    let t = cond.alpha_t * p.reaction_time;
    let b = p.comf_deceleration;
    let lead_speed = f64::max(speed - speed_diff, 0.0);

    let bt = b * t;
    let s = f64::max(gap - p.min_gap, 0.0);
    let v_safe = -bt + (bt * bt + lead_speed * lead_speed + 2.0 * b * s).sqrt();
    let v_upper = v_safe.min(speed + p.max_acceleration * t).min(v0);
    let v_lower = f64::min(
        (1.0 - p.epsilon) * v_upper + p.epsilon * f64::max(0.0, speed - bt),
        v_upper,
    );
    let v_new = 0.5 * (v_lower + v_upper);
    (v_new - speed) / t
}

/// Computes an acceleration using the Nagel-Schreckenberg automaton.
fn nsm(p: &NsmParams, gap: f64, speed: f64, cond: &LocalConditions) -> f64 {
    let v0_cells = (cond.desired_speed(p.desired_speed) / NSM_CELL_LENGTH).round();
    let v_cells = speed / NSM_CELL_LENGTH;
    let gap_cells = (gap / NSM_CELL_LENGTH).floor();

    let v_new = f64::max((v_cells + 1.0).min(v0_cells).min(gap_cells) - p.p_slowdown, 0.0);
    (v_new * NSM_CELL_LENGTH - speed) / NSM_UPDATE_TIME
}
