use super::message::{AgentId, Message, MessageKind};
use super::perception::AgentPerception;
use super::sensor::RsuSensor;
use crate::lane::LaneSegment;
use crate::{RoadSegmentId, RsuId};
use log::trace;
use smallvec::SmallVec;

/// The default speed below which a unit considers its area congested, in m/s.
const CONGESTION_SPEED: f64 = 10.0;

/// The default speed advised upstream of a congestion, in m/s.
const ADVISORY_SPEED: f64 = 15.0;

/// The default lifetime of advisories, in s.
const ADVISORY_LIFETIME: f64 = 2.0;

/// Messages published by a road side unit in one iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct Broadcast {
    pub iteration: u64,
    pub messages: Vec<Message>,
}

/// A stationary infrastructure agent attached to a road segment.
#[derive(Clone, Debug)]
pub struct RoadSideUnit {
    id: RsuId,
    segment: RoadSegmentId,
    /// The position along the segment in m.
    position: f64,
    sensors: SmallVec<[RsuSensor; 4]>,
    perception: AgentPerception,
    pending: Vec<Message>,
    inbox: Vec<Message>,
    outbox: Vec<Message>,
    broadcast: Option<Broadcast>,
    congestion_speed: f64,
    advisory_speed: f64,
    advisory_lifetime: f64,
}

impl RoadSideUnit {
    pub(crate) fn new(
        id: RsuId,
        segment: RoadSegmentId,
        position: f64,
        sensors: &[RsuSensor],
    ) -> Self {
        Self {
            id,
            segment,
            position,
            sensors: sensors.iter().copied().collect(),
            perception: AgentPerception::default(),
            pending: vec![],
            inbox: vec![],
            outbox: vec![],
            broadcast: None,
            congestion_speed: CONGESTION_SPEED,
            advisory_speed: ADVISORY_SPEED,
            advisory_lifetime: ADVISORY_LIFETIME,
        }
    }

    pub fn id(&self) -> RsuId {
        self.id
    }

    pub fn segment(&self) -> RoadSegmentId {
        self.segment
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn sensors(&self) -> &[RsuSensor] {
        &self.sensors
    }

    pub fn perception(&self) -> &AgentPerception {
        &self.perception
    }

    /// The messages received in the current tick.
    pub fn inbox(&self) -> &[Message] {
        &self.inbox
    }

    /// The messages to be broadcast in the next communication phase.
    pub fn outbox(&self) -> &[Message] {
        &self.outbox
    }

    /// The most recently published broadcast.
    pub fn broadcast(&self) -> Option<&Broadcast> {
        self.broadcast.as_ref()
    }

    /// Sets the speed below which the unit advises `advisory_speed` to
    /// approaching vehicles.
    pub fn set_advisory(&mut self, congestion_speed: f64, advisory_speed: f64) {
        self.congestion_speed = congestion_speed;
        self.advisory_speed = advisory_speed;
    }

    /// Measures traffic with the loop detector and controller sensors.
    pub(crate) fn compute_perception(&mut self, lanes: &[LaneSegment], time: f64) {
        self.perception.reset();
        for sensor in &self.sensors {
            sensor.perceive(self.position, lanes, time, &mut self.perception);
        }
    }

    /// Gathers vehicles' messages and publishes the outbox.
    pub(crate) fn communicate(&mut self, lanes: &[LaneSegment], iteration: u64) {
        for sensor in &self.sensors {
            match *sensor {
                RsuSensor::Device { range } => {
                    let heard = lanes
                        .iter()
                        .flat_map(|lane| lane.iter())
                        .filter(|veh| (veh.pos_front() - self.position).abs() <= range)
                        .flat_map(|veh| veh.outbox().iter().cloned());
                    self.pending.extend(heard);
                }
                RsuSensor::Broadcaster => {
                    self.broadcast = Some(Broadcast {
                        iteration,
                        messages: self.outbox.clone(),
                    });
                }
                RsuSensor::LoopDetector { .. } | RsuSensor::Controller => {}
            }
        }
    }

    /// Moves received messages into the inbox, dropping outdated ones.
    pub(crate) fn handle_messages(&mut self, time: f64) {
        self.inbox.clear();
        self.inbox
            .extend(self.pending.drain(..).filter(|msg| !msg.is_outdated(time)));
    }

    /// Advises a lower speed when the measured traffic is congested.
    pub(crate) fn make_decision(&mut self, time: f64) {
        self.outbox.clear();
        let congested = self
            .perception
            .traffic()
            .filter_map(|traffic| traffic.mean_speed)
            .any(|speed| speed < self.congestion_speed);
        if congested {
            trace!("rsu {} advises {} m/s", self.id, self.advisory_speed);
            self.outbox.push(Message {
                sender: AgentId::Rsu(self.id),
                segment: self.segment,
                lane: 0,
                position: self.position,
                time,
                lifetime: self.advisory_lifetime,
                kind: MessageKind::Advisory {
                    speed: self.advisory_speed,
                },
            });
        }
    }

    /// Clears all per-run state.
    pub(crate) fn reset(&mut self) {
        self.perception.reset();
        self.pending.clear();
        self.inbox.clear();
        self.outbox.clear();
        self.broadcast = None;
    }
}
