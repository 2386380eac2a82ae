//! Position-dependent properties of a road segment.

use crate::util::{interpolate, Interval};
use itertools::Itertools;

/// Acceleration due to gravity in m/s<sup>2</sup>.
pub const GRAVITY: f64 = 9.81;

/// Sorts `(position, value)` pairs by position.
fn by_position(entries: impl IntoIterator<Item = (f64, f64)>) -> Vec<(f64, f64)> {
    entries
        .into_iter()
        .sorted_by(|a, b| a.0.total_cmp(&b.0))
        .collect()
}

/// The value of the last entry at or before `pos`.
fn step_value(entries: &[(f64, f64)], pos: f64) -> Option<f64> {
    let idx = entries.partition_point(|(x, _)| *x <= pos);
    idx.checked_sub(1).map(|idx| entries[idx].1)
}

/// Speed limits along a road segment. Each limit holds until the next one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpeedLimits {
    limits: Vec<(f64, f64)>,
}

impl SpeedLimits {
    /// Creates speed limits from `(position, limit)` pairs in m and m/s.
    pub fn new(limits: impl IntoIterator<Item = (f64, f64)>) -> Self {
        Self {
            limits: by_position(limits),
        }
    }

    /// The speed limit at `pos`, infinite before the first limit.
    pub fn limit_at(&self, pos: f64) -> f64 {
        step_value(&self.limits, pos).unwrap_or(f64::INFINITY)
    }
}

/// Road gradients along a road segment. Each gradient holds until the next one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Slopes {
    gradients: Vec<(f64, f64)>,
}

impl Slopes {
    /// Creates slopes from `(position, gradient)` pairs; a gradient of 0.05 is a 5% climb.
    pub fn new(gradients: impl IntoIterator<Item = (f64, f64)>) -> Self {
        Self {
            gradients: by_position(gradients),
        }
    }

    pub fn gradient_at(&self, pos: f64) -> f64 {
        step_value(&self.gradients, pos).unwrap_or(0.0)
    }
}

/// What a message sign tells passing vehicles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SignAction {
    /// Caps the desired speed at the given speed in m/s.
    SpeedAdvice(f64),
    /// Asks vehicles to move to the given lane.
    TargetLane(usize),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MessageSign {
    /// The stretch of road over which the sign applies, in m.
    pub range: Interval<f64>,
    pub action: SignAction,
}

/// Variable message signs along a road segment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariableMessageSigns {
    signs: Vec<MessageSign>,
}

impl VariableMessageSigns {
    pub fn new(signs: Vec<MessageSign>) -> Self {
        Self { signs }
    }

    pub fn signs(&self) -> &[MessageSign] {
        &self.signs
    }

    pub fn signs_mut(&mut self) -> &mut Vec<MessageSign> {
        &mut self.signs
    }

    /// The signs applying at `pos`.
    pub fn active_at(&self, pos: f64) -> impl Iterator<Item = &MessageSign> {
        self.signs.iter().filter(move |sign| sign.range.contains(pos))
    }
}

/// Piecewise-linear correction factors modelling a local capacity drop.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowConservingBottlenecks {
    alpha_t: Vec<(f64, f64)>,
    alpha_v0: Vec<(f64, f64)>,
}

impl FlowConservingBottlenecks {
    /// Creates bottlenecks from `(position, factor)` profiles for the time
    /// headway and the desired speed.
    pub fn new(
        alpha_t: impl IntoIterator<Item = (f64, f64)>,
        alpha_v0: impl IntoIterator<Item = (f64, f64)>,
    ) -> Self {
        Self {
            alpha_t: by_position(alpha_t),
            alpha_v0: by_position(alpha_v0),
        }
    }

    pub fn alpha_t(&self, pos: f64) -> f64 {
        interpolate(&self.alpha_t, pos).unwrap_or(1.0)
    }

    pub fn alpha_v0(&self, pos: f64) -> f64 {
        interpolate(&self.alpha_v0, pos).unwrap_or(1.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn speed_limit_holds_until_next() {
        let limits = SpeedLimits::new([(100.0, 20.0), (0.0, 30.0)]);
        assert_approx_eq!(limits.limit_at(0.0), 30.0);
        assert_approx_eq!(limits.limit_at(99.0), 30.0);
        assert_approx_eq!(limits.limit_at(100.0), 20.0);
        assert!(SpeedLimits::new([(10.0, 5.0)]).limit_at(5.0).is_infinite());
    }

    #[test]
    fn slopes_default_to_flat() {
        let slopes = Slopes::new([(50.0, 0.04)]);
        assert_approx_eq!(slopes.gradient_at(10.0), 0.0);
        assert_approx_eq!(slopes.gradient_at(60.0), 0.04);
    }

    #[test]
    fn bottleneck_factors_interpolate() {
        let bottlenecks = FlowConservingBottlenecks::new([(100.0, 1.0), (200.0, 1.4)], Vec::new());
        assert_approx_eq!(bottlenecks.alpha_t(150.0), 1.2);
        assert_approx_eq!(bottlenecks.alpha_t(500.0), 1.4);
        assert_approx_eq!(bottlenecks.alpha_v0(150.0), 1.0);
    }

    #[test]
    fn signs_apply_in_range() {
        let signs = VariableMessageSigns::new(vec![MessageSign {
            range: Interval::new(100.0, 200.0),
            action: SignAction::SpeedAdvice(15.0),
        }]);
        assert_eq!(signs.active_at(150.0).count(), 1);
        assert_eq!(signs.active_at(250.0).count(), 0);
    }
}
