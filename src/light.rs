use crate::TrafficLightId;

/// The state of a traffic light.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LightState {
    Red,
    Amber,
    Green,
}

/// One phase of a fixed-time signal plan.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LightPhase {
    pub state: LightState,
    /// The duration of the phase in s.
    pub duration: f64,
}

impl LightPhase {
    pub fn new(state: LightState, duration: f64) -> Self {
        Self { state, duration }
    }
}

/// A traffic light cycling through a fixed sequence of phases.
#[derive(Clone, Debug)]
pub struct TrafficLight {
    /// The phases of one cycle.
    phases: Vec<LightPhase>,
    /// The index of the current phase.
    current: usize,
    /// The time since the current phase was entered, in s.
    since: f64,
}

/// The position of a traffic light on a road segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrafficLightLocation {
    pub light: TrafficLightId,
    /// The position of the stop line along the segment, in m.
    pub position: f64,
}

impl TrafficLight {
    /// Creates a traffic light starting at the first of the given phases.
    pub fn new(phases: Vec<LightPhase>) -> Self {
        assert!(!phases.is_empty(), "a traffic light needs at least one phase");
        assert!(
            phases.iter().all(|phase| phase.duration > 0.0),
            "traffic light phases must have a positive duration"
        );
        Self {
            phases,
            current: 0,
            since: 0.0,
        }
    }

    /// Creates a traffic light that always shows the same state.
    pub fn fixed(state: LightState) -> Self {
        Self::new(vec![LightPhase::new(state, f64::INFINITY)])
    }

    /// A green-amber-red cycle.
    pub fn cycle(green: f64, amber: f64, red: f64) -> Self {
        Self::new(vec![
            LightPhase::new(LightState::Green, green),
            LightPhase::new(LightState::Amber, amber),
            LightPhase::new(LightState::Red, red),
        ])
    }

    /// The current state.
    pub fn state(&self) -> LightState {
        self.phases[self.current].state
    }

    /// The time until the current phase ends, in s.
    pub fn time_remaining(&self) -> f64 {
        self.phases[self.current].duration - self.since
    }

    /// Advances the traffic light timing by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        self.since += dt;
        while self.since >= self.phases[self.current].duration {
            self.since -= self.phases[self.current].duration;
            self.current = (self.current + 1) % self.phases.len();
        }
    }

    /// Restarts the cycle at the first phase.
    pub fn reset(&mut self) {
        self.current = 0;
        self.since = 0.0;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn cycles_through_phases() {
        let mut light = TrafficLight::cycle(10.0, 3.0, 20.0);
        assert_eq!(light.state(), LightState::Green);
        light.step(9.5);
        assert_eq!(light.state(), LightState::Green);
        light.step(1.0);
        assert_eq!(light.state(), LightState::Amber);
        assert_approx_eq!(light.time_remaining(), 2.5);
        light.step(3.0);
        assert_eq!(light.state(), LightState::Red);
        light.step(20.0);
        assert_eq!(light.state(), LightState::Green);
    }

    #[test]
    fn fixed_light_never_changes() {
        let mut light = TrafficLight::fixed(LightState::Red);
        light.step(1e6);
        assert_eq!(light.state(), LightState::Red);
    }
}
