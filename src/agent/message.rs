use crate::{RoadSegmentId, RsuId, VehicleId};
use std::fmt;

/// The sender of a [Message].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgentId {
    Vehicle(VehicleId),
    Rsu(RsuId),
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vehicle(id) => write!(f, "vehicle {id}"),
            Self::Rsu(id) => write!(f, "rsu {id}"),
        }
    }
}

/// A message exchanged between vehicles and road side units.
///
/// The routing fields locate the sender at the time of sending; the payload
/// is opaque to the simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub sender: AgentId,
    /// The road segment the sender was on.
    pub segment: RoadSegmentId,
    /// The lane the sender was in.
    pub lane: usize,
    /// The sender's front position along the segment, in m.
    pub position: f64,
    /// The simulation time the message was sent at, in s.
    pub time: f64,
    /// How long the message stays relevant, in s.
    pub lifetime: f64,
    pub kind: MessageKind,
}

/// The payload of a [Message].
#[derive(Clone, Debug, PartialEq)]
pub enum MessageKind {
    /// The sender's own kinematic state.
    Measure { speed: f64, acc: f64, length: f64 },
    /// A speed recommendation from the infrastructure, in m/s.
    Advisory { speed: f64 },
    /// A free-form message between agents.
    Agent(AgentMessage),
}

/// A speech act between agents.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentMessage {
    pub subject: String,
    pub performative: Performative,
    pub content: serde_json::Map<String, serde_json::Value>,
}

/// The intent of an [AgentMessage].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Performative {
    Inform,
    Request,
    Agree,
    Refuse,
}

impl Message {
    /// Whether the message is past its lifetime at time `now`.
    pub fn is_outdated(&self, now: f64) -> bool {
        now - self.time > self.lifetime
    }

    /// The sending vehicle, if a vehicle sent the message.
    pub fn vehicle_sender(&self) -> Option<VehicleId> {
        match self.sender {
            AgentId::Vehicle(id) => Some(id),
            AgentId::Rsu(_) => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use slotmap::KeyData;

    #[test]
    fn message_goes_out_of_date() {
        let msg = Message {
            sender: AgentId::Rsu(RsuId(1)),
            segment: RoadSegmentId::from(KeyData::from_ffi(1)),
            lane: 0,
            position: 10.0,
            time: 5.0,
            lifetime: 1.0,
            kind: MessageKind::Advisory { speed: 10.0 },
        };
        assert!(!msg.is_outdated(5.5));
        assert!(!msg.is_outdated(6.0));
        assert!(msg.is_outdated(6.25));
        assert_eq!(msg.vehicle_sender(), None);
    }
}
