use crate::{RoadSegmentId, RsuId, Vehicle, VehicleId};

/// Something an agent sensed during the current tick.
#[derive(Clone, Debug, PartialEq)]
pub enum Perception {
    /// Another vehicle, seen by radar.
    Vehicle(SensedVehicle),
    /// A noisy measurement of the agent's own state.
    Measurement(Measurement),
    /// A road side unit whose broadcast was heard.
    Infrastructure(SensedInfrastructure),
    /// Aggregated traffic state, measured by infrastructure.
    Traffic(TrafficMeasurement),
}

/// Another vehicle as seen at a point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensedVehicle {
    pub id: VehicleId,
    pub segment: RoadSegmentId,
    pub lane: usize,
    /// The front position in m.
    pub position: f64,
    pub speed: f64,
    pub length: f64,
    pub time: f64,
}

impl SensedVehicle {
    pub(crate) fn of(vehicle: &Vehicle, time: f64) -> Self {
        Self {
            id: vehicle.id(),
            segment: vehicle.segment(),
            lane: vehicle.lane(),
            position: vehicle.pos_front(),
            speed: vehicle.speed(),
            length: vehicle.length(),
            time,
        }
    }

    /// The rear position in m.
    pub fn pos_rear(&self) -> f64 {
        self.position - self.length
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    pub position: f64,
    pub speed: f64,
    pub time: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensedInfrastructure {
    pub rsu: RsuId,
    pub segment: RoadSegmentId,
    pub position: f64,
    /// The distance from the vehicle to the unit along the road, in m.
    pub distance: f64,
    /// The iteration in which the heard broadcast was published.
    pub broadcast_iteration: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrafficMeasurement {
    /// The number of vehicles in the measured area.
    pub count: usize,
    /// The mean speed of those vehicles in m/s, if any were present.
    pub mean_speed: Option<f64>,
    pub time: f64,
}

impl TrafficMeasurement {
    pub(crate) fn from_vehicles<'a>(vehicles: impl Iterator<Item = &'a Vehicle>, time: f64) -> Self {
        let (count, sum) = vehicles
            .filter(|veh| !veh.is_obstacle())
            .fold((0, 0.0), |(count, sum), veh| (count + 1, sum + veh.speed()));
        Self {
            count,
            mean_speed: (count > 0).then(|| sum / count as f64),
            time,
        }
    }
}

/// The agent's own state, attached after all sensors ran.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OwnState {
    pub lane: usize,
    pub position: f64,
    pub speed: f64,
    pub acc: f64,
    pub time: f64,
}

/// What an agent knows about its surroundings during one tick.
#[derive(Clone, Debug, Default)]
pub struct AgentPerception {
    objects: Vec<Perception>,
    own: Option<OwnState>,
    immediate_leader: Option<SensedVehicle>,
}

impl AgentPerception {
    /// Forgets everything sensed in the previous tick.
    pub fn reset(&mut self) {
        self.objects.clear();
        self.own = None;
        self.immediate_leader = None;
    }

    pub fn push(&mut self, perception: Perception) {
        self.objects.push(perception);
    }

    pub fn objects(&self) -> &[Perception] {
        &self.objects
    }

    pub fn own(&self) -> Option<&OwnState> {
        self.own.as_ref()
    }

    pub fn set_own(&mut self, own: OwnState) {
        self.own = Some(own);
    }

    /// The leader as communicated by the leader itself.
    pub fn immediate_leader(&self) -> Option<&SensedVehicle> {
        self.immediate_leader.as_ref()
    }

    pub fn set_immediate_leader(&mut self, leader: SensedVehicle) {
        self.immediate_leader = Some(leader);
    }

    pub fn sensed_vehicles(&self) -> impl Iterator<Item = &SensedVehicle> {
        self.objects.iter().filter_map(|obj| match obj {
            Perception::Vehicle(veh) => Some(veh),
            _ => None,
        })
    }

    /// The most recent measurement of the agent's own state.
    pub fn measurement(&self) -> Option<&Measurement> {
        self.objects.iter().rev().find_map(|obj| match obj {
            Perception::Measurement(m) => Some(m),
            _ => None,
        })
    }

    pub fn infrastructure(&self) -> impl Iterator<Item = &SensedInfrastructure> {
        self.objects.iter().filter_map(|obj| match obj {
            Perception::Infrastructure(infra) => Some(infra),
            _ => None,
        })
    }

    pub fn traffic(&self) -> impl Iterator<Item = &TrafficMeasurement> {
        self.objects.iter().filter_map(|obj| match obj {
            Perception::Traffic(traffic) => Some(traffic),
            _ => None,
        })
    }

    /// The closest vehicle ahead in the given lane: the immediate leader if one
    /// was communicated, otherwise the nearest sensed vehicle.
    pub fn leader(&self, lane: usize, position: f64) -> Option<SensedVehicle> {
        if let Some(leader) = self.immediate_leader {
            return Some(leader);
        }
        self.sensed_vehicles()
            .filter(|veh| veh.lane == lane && veh.position > position)
            .min_by(|a, b| a.position.total_cmp(&b.position))
            .copied()
    }
}
