//! Discretionary and mandatory lane changes (MOBIL).

use crate::Vehicle;

/// The lane bias applied when a vehicle must leave its lane, in m/s<sup>2</sup>.
pub const MANDATORY_BIAS: f64 = 10.0;

/// The parameters of the MOBIL lane-changing model.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LaneChangeModel {
    /// The weight given to the acceleration changes of other vehicles.
    pub politeness: f64,
    /// The acceleration advantage needed to change lanes, in m/s<sup>2</sup>.
    pub threshold: f64,
    /// The largest deceleration the change may impose on anyone, in m/s<sup>2</sup>.
    pub safe_deceleration: f64,
    /// The smallest net gap accepted in the target lane, in m.
    pub min_gap: f64,
    /// The incentive toward a desired lane, in m/s<sup>2</sup>.
    pub bias: f64,
}

impl Default for LaneChangeModel {
    fn default() -> Self {
        Self {
            politeness: 0.1,
            threshold: 0.2,
            safe_deceleration: 4.0,
            min_gap: 2.0,
            bias: 0.3,
        }
    }
}

/// The vehicles around a lane-changing vehicle before and after the change.
#[derive(Clone, Copy, Debug, Default)]
pub struct Neighbours<'a> {
    pub old_leader: Option<&'a Vehicle>,
    pub old_follower: Option<&'a Vehicle>,
    pub new_leader: Option<&'a Vehicle>,
    pub new_follower: Option<&'a Vehicle>,
}

impl LaneChangeModel {
    /// Checks that changing lanes leaves safe gaps and decelerations.
    pub fn is_safe(&self, me: &Vehicle, n: &Neighbours) -> bool {
        if let Some(leader) = n.new_leader {
            if me.net_distance(leader) < self.min_gap {
                return false;
            }
        }
        if let Some(follower) = n.new_follower {
            if follower.net_distance(me) < self.min_gap {
                return false;
            }
            if follower.acc_behind(Some(me)) < -self.safe_deceleration {
                return false;
            }
        }
        me.acc_behind(n.new_leader) >= -self.safe_deceleration
    }

    /// The advantage of changing lanes, or `None` if the change is unsafe or
    /// not worthwhile. `lane_bias` pushes toward (positive) or away from
    /// (negative) the target lane.
    pub fn incentive(&self, me: &Vehicle, n: &Neighbours, lane_bias: f64) -> Option<f64> {
        if !self.is_safe(me, n) {
            return None;
        }

        let own = me.acc_behind(n.new_leader) - me.acc_behind(n.old_leader);
        let new_follower = n.new_follower.map_or(0.0, |veh| {
            veh.acc_behind(Some(me)) - veh.acc_behind(n.new_leader)
        });
        let old_follower = n.old_follower.map_or(0.0, |veh| {
            veh.acc_behind(n.old_leader) - veh.acc_behind(Some(me))
        });

        let incentive =
            own + self.politeness * (new_follower + old_follower) - self.threshold + lane_bias;
        (incentive > 0.0).then_some(incentive)
    }
}
