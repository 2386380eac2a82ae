use super::perception::{
    AgentPerception, Measurement, Perception, SensedVehicle, TrafficMeasurement,
};
use crate::lane::LaneSegment;
use crate::Vehicle;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// A sensor carried by a vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Sensor {
    /// Sees other vehicles on the same road segment within `range` m.
    Radar { range: f64 },
    /// Measures the vehicle's own position and speed with gaussian noise.
    Gps { noise_std: f64 },
    /// Hears messages from agents within `range` m.
    Communication { range: f64 },
}

impl Sensor {
    /// Runs the sensor during the perception phase.
    pub(crate) fn perceive(
        &self,
        vehicle: &Vehicle,
        lanes: &[LaneSegment],
        time: f64,
        rng: &mut impl Rng,
        perception: &mut AgentPerception,
    ) {
        match *self {
            Sensor::Radar { range } => {
                let sensed = lanes
                    .iter()
                    .flat_map(|lane| lane.iter())
                    .filter(|other| other.id() != vehicle.id())
                    .filter(|other| (other.pos_front() - vehicle.pos_front()).abs() <= range)
                    .map(|other| Perception::Vehicle(SensedVehicle::of(other, time)));
                for obj in sensed {
                    perception.push(obj);
                }
            }
            Sensor::Gps { noise_std } => {
                let (dx, dv) = match Normal::new(0.0, noise_std) {
                    Ok(noise) => (noise.sample(rng), noise.sample(rng)),
                    Err(_) => (0.0, 0.0),
                };
                perception.push(Perception::Measurement(Measurement {
                    position: vehicle.pos_front() + dx,
                    speed: f64::max(vehicle.speed() + dv, 0.0),
                    time,
                }));
            }
            Sensor::Communication { .. } => {}
        }
    }

    /// The listening range, for sensors used in the communication phase.
    pub fn communication_range(&self) -> Option<f64> {
        match *self {
            Sensor::Communication { range } => Some(range),
            _ => None,
        }
    }
}

/// A sensor carried by a road side unit.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RsuSensor {
    /// Counts vehicles and their speeds within `range` m of the unit.
    LoopDetector { range: f64 },
    /// Observes the traffic state of the whole road segment.
    Controller,
    /// Collects messages sent by vehicles within `range` m.
    Device { range: f64 },
    /// Publishes the unit's outgoing messages.
    Broadcaster,
}

impl RsuSensor {
    /// Runs the sensor during the perception phase. The communication
    /// sensors do nothing here.
    pub(crate) fn perceive(
        &self,
        position: f64,
        lanes: &[LaneSegment],
        time: f64,
        perception: &mut AgentPerception,
    ) {
        let vehicles = lanes.iter().flat_map(|lane| lane.iter());
        let measurement = match *self {
            RsuSensor::LoopDetector { range } => TrafficMeasurement::from_vehicles(
                vehicles.filter(|veh| (veh.pos_front() - position).abs() <= range),
                time,
            ),
            RsuSensor::Controller => TrafficMeasurement::from_vehicles(vehicles, time),
            RsuSensor::Device { .. } | RsuSensor::Broadcaster => return,
        };
        perception.push(Perception::Traffic(measurement));
    }
}
