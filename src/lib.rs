//! A lane-based microscopic traffic simulation.
//!
//! Vehicles live in the lanes of directed road segments. Every [Simulation::step]
//! runs a fixed sequence of phases over the whole network: perception,
//! communication, decisions, accelerations, lane changes, integration and
//! the boundary flows.

pub use agent::{
    AgentId, AgentMessage, AgentPerception, BeaconBehavior, Behavior, Broadcast, Message,
    MessageKind, Perception, Performative, RoadSideUnit, RsuSensor, SensedInfrastructure,
    SensedVehicle, Sensor,
};
pub use config::{CrashPolicy, SimulationConfig, VehiclePrototype};
pub use error::{CrashReport, SimError, SimResult};
pub use ids::{IdRegistry, RsuId, VehicleId};
pub use lane::{LaneRef, LaneSegment, LaneType, OutFlow};
pub use light::{LightPhase, LightState, TrafficLight, TrafficLightLocation};
pub use road::{RoadSegment, RoadSegmentAttributes};
pub use simulation::Simulation;
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use util::Interval;
pub use vehicle::{Vehicle, VehicleKind};

pub mod agent;
mod config;
mod error;
mod ids;
mod lane;
mod light;
pub mod road;
mod simulation;
mod util;
pub mod vehicle;

new_key_type! {
    /// Unique ID of a [RoadSegment].
    pub struct RoadSegmentId;
    /// Unique ID of a [TrafficLight].
    pub struct TrafficLightId;
}

/// The road segments of a network.
pub type SegmentSet = SlotMap<RoadSegmentId, RoadSegment>;
/// The traffic lights of a network.
pub type LightSet = SlotMap<TrafficLightId, TrafficLight>;
