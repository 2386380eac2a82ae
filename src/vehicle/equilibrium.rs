//! Equilibrium speed-density relation of an acceleration model.

use super::acceleration::AccelerationModel;
use log::warn;

/// The number of density steps in the table, including zero density. Step `i`
/// is at density `i / TABLE_SIZE` of bumper-to-bumper, so the densest entry
/// still leaves a small gap.
const TABLE_SIZE: usize = 51;

/// The relaxation steps per table entry.
const ITERATIONS: usize = 100;

/// The bounds of the relaxation time step, in s.
const DT_MIN: f64 = 0.01;
const DT_MAX: f64 = 2.0;

/// A table of equilibrium speed against density for one model and vehicle length,
/// found by letting a vehicle relax towards steady state at each density.
#[derive(Clone, Debug, PartialEq)]
pub struct EquilibriumTable {
    /// The equilibrium speed in m/s for each density step.
    speeds: Vec<f64>,
    /// The bumper-to-bumper density in veh/m.
    rho_max: f64,
    /// The maximum flow in veh/s.
    q_max: f64,
    /// The density at maximum flow in veh/m.
    rho_q_max: f64,
}

impl EquilibriumTable {
    /// Builds the table for the model and vehicle length in m.
    pub fn new(model: &impl AccelerationModel, vehicle_length: f64) -> Self {
        assert!(vehicle_length > 0.0, "vehicle length must be positive");
        let v0 = model.desired_speed();
        let rho_max = 1.0 / vehicle_length;

        let mut speeds = Vec::with_capacity(TABLE_SIZE);
        speeds.push(v0);
        let mut speed = v0;
        for idx in 1..TABLE_SIZE {
            let rho = rho_max * idx as f64 / TABLE_SIZE as f64;
            let gap = 1.0 / rho - 1.0 / rho_max;
            for _ in 0..ITERATIONS {
                let acc = model.accelerate(gap, speed, 0.0);
                let dt = if v0 > 0.0 {
                    (DT_MAX * speed / v0 + DT_MIN).clamp(DT_MIN, DT_MAX)
                } else {
                    DT_MIN
                };
                speed = f64::max(speed + dt * acc, 0.0);
            }
            speeds.push(speed);
        }

        let mut table = Self {
            speeds,
            rho_max,
            q_max: 0.0,
            rho_q_max: 0.0,
        };
        table.calc_max_flow();
        if !table.is_monotonic() {
            warn!("equilibrium speed is not monotonic in density; capacity figures are unreliable");
        }
        table
    }

    fn calc_max_flow(&mut self) {
        for (idx, speed) in self.speeds.iter().enumerate() {
            let rho = self.density(idx);
            let flow = rho * speed;
            if flow > self.q_max {
                self.q_max = flow;
                self.rho_q_max = rho;
            }
        }
    }

    fn density(&self, idx: usize) -> f64 {
        self.rho_max * idx as f64 / self.speeds.len() as f64
    }

    /// The equilibrium speeds, indexed by density step.
    pub fn speeds(&self) -> &[f64] {
        &self.speeds
    }

    /// The equilibrium speed at the given density in veh/m, linearly interpolated.
    /// Densities beyond the last step get the last speed.
    pub fn speed(&self, rho: f64) -> f64 {
        let last = self.speeds.len() - 1;
        let x = (rho / self.rho_max * self.speeds.len() as f64).clamp(0.0, last as f64);
        let idx = (x.floor() as usize).min(last - 1);
        let t = x - idx as f64;
        self.speeds[idx] + t * (self.speeds[idx + 1] - self.speeds[idx])
    }

    /// The equilibrium speed for the given net gap in m.
    pub fn speed_for_gap(&self, gap: f64) -> f64 {
        if gap.is_infinite() {
            return self.speeds[0];
        }
        let rho = 1.0 / (f64::max(gap, 0.0) + 1.0 / self.rho_max);
        self.speed(rho)
    }

    /// The bumper-to-bumper density in veh/m.
    pub fn max_density(&self) -> f64 {
        self.rho_max
    }

    /// The maximum equilibrium flow in veh/s.
    pub fn max_flow(&self) -> f64 {
        self.q_max
    }

    /// The density at which the maximum flow occurs, in veh/m.
    pub fn density_at_max_flow(&self) -> f64 {
        self.rho_q_max
    }

    /// The net gap between vehicles at maximum flow, in m.
    pub fn net_gap_at_max_flow(&self) -> f64 {
        if self.rho_q_max > 0.0 {
            1.0 / self.rho_q_max - 1.0 / self.rho_max
        } else {
            f64::INFINITY
        }
    }

    /// Whether the speed never increases with density.
    pub fn is_monotonic(&self) -> bool {
        self.speeds.windows(2).all(|pair| pair[1] <= pair[0] + 1e-9)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vehicle::acceleration::{IdmParams, KraussParams, LongitudinalModel, NsmParams};
    use assert_approx_eq::assert_approx_eq;

    fn models() -> [LongitudinalModel; 3] {
        [
            LongitudinalModel::Idm(IdmParams::default()),
            LongitudinalModel::Krauss(KraussParams::default()),
            LongitudinalModel::Nsm(NsmParams::default()),
        ]
    }

    #[test]
    fn zero_density_is_free_flow() {
        for model in models() {
            let table = EquilibriumTable::new(&model, 5.0);
            assert_eq!(table.speeds().len(), TABLE_SIZE);
            assert_approx_eq!(table.speeds()[0], model.desired_speed());
            assert!(table.speeds().iter().all(|v| *v >= 0.0));
        }
    }

    #[test]
    fn idm_table_is_monotonic() {
        let table = EquilibriumTable::new(&LongitudinalModel::Idm(IdmParams::default()), 5.0);
        assert!(table.is_monotonic());
        assert_approx_eq!(*table.speeds().last().unwrap(), 0.0);
        assert_approx_eq!(table.max_density(), 0.2);
    }

    #[test]
    fn idm_capacity_is_plausible() {
        let table = EquilibriumTable::new(&LongitudinalModel::Idm(IdmParams::default()), 5.0);
        let q_max = 3600.0 * table.max_flow();
        assert!(q_max > 1500.0 && q_max < 2500.0, "q_max = {q_max}");
        assert!(table.density_at_max_flow() > 0.0);
        assert!(table.net_gap_at_max_flow() > 0.0);
    }

    #[test]
    fn speed_interpolates() {
        let table = EquilibriumTable::new(&LongitudinalModel::Idm(IdmParams::default()), 5.0);
        assert_approx_eq!(table.speed(0.0), table.speeds()[0]);
        let half = 0.5 * (table.speeds()[1] + table.speeds()[2]);
        assert_approx_eq!(table.speed(1.5 * table.max_density() / TABLE_SIZE as f64), half);
        assert_approx_eq!(table.speed(1.0), 0.0);
        assert_approx_eq!(table.speed_for_gap(f64::INFINITY), table.speeds()[0]);
    }

    #[test]
    fn densest_entry_keeps_a_gap() {
        let table = EquilibriumTable::new(&LongitudinalModel::Idm(IdmParams::default()), 5.0);
        let densest = table.density(TABLE_SIZE - 1);
        assert!(densest < table.max_density());
        assert_approx_eq!(1.0 / densest - 5.0, 0.1);
        assert!(table.density_at_max_flow() < densest);
    }
}
