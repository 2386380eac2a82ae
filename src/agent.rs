//! Perception, communication and decision making of vehicles and road side units.

pub use behavior::{BeaconBehavior, Behavior};
pub use message::{AgentId, AgentMessage, Message, MessageKind, Performative};
pub use perception::{
    AgentPerception, Measurement, OwnState, Perception, SensedInfrastructure, SensedVehicle,
    TrafficMeasurement,
};
pub use rsu::{Broadcast, RoadSideUnit};
pub use sensor::{RsuSensor, Sensor};

mod behavior;
mod message;
mod perception;
mod rsu;
mod sensor;
