use super::message::MessageKind;
use super::perception::SensedVehicle;
use crate::Vehicle;
use std::fmt::Debug;

/// Higher-level vehicle logic invoked by the simulation at fixed points in each tick.
pub trait Behavior: Debug {
    /// Called after the vehicle's inbox is filled and its front vehicle is known.
    fn handle_messages(&mut self, _vehicle: &mut Vehicle, _time: f64) {}

    /// Called in the decision phase, before accelerations are computed.
    fn make_decision(&mut self, _vehicle: &mut Vehicle, _time: f64) {}
}

/// Periodically beacons the vehicle's state, learns its leader from the
/// leader's beacons and follows infrastructure speed advice.
#[derive(Clone, Copy, Debug)]
pub struct BeaconBehavior {
    /// The lifetime of sent beacons in s.
    pub lifetime: f64,
}

impl Default for BeaconBehavior {
    fn default() -> Self {
        Self { lifetime: 1.0 }
    }
}

impl Behavior for BeaconBehavior {
    fn handle_messages(&mut self, vehicle: &mut Vehicle, time: f64) {
        let front = vehicle.front_vehicle_id();
        let mut leader = None;
        let mut advisory: Option<f64> = None;

        for msg in vehicle.inbox() {
            match (&msg.kind, msg.vehicle_sender()) {
                (MessageKind::Measure { speed, length, .. }, Some(sender))
                    if Some(sender) == front =>
                {
                    // extrapolate to the current time
                    let position = msg.position + speed * (time - msg.time);
                    leader = Some(SensedVehicle {
                        id: sender,
                        segment: msg.segment,
                        lane: msg.lane,
                        position,
                        speed: *speed,
                        length: *length,
                        time,
                    });
                }
                (MessageKind::Advisory { speed }, _) => {
                    advisory = Some(advisory.map_or(*speed, |adv| adv.min(*speed)));
                }
                _ => {}
            }
        }

        if let Some(leader) = leader {
            vehicle.perception_mut().set_immediate_leader(leader);
        }
        vehicle.set_advisory_speed(advisory);
    }

    fn make_decision(&mut self, vehicle: &mut Vehicle, time: f64) {
        let (position, speed) = match vehicle.perception().measurement() {
            Some(m) => (m.position, m.speed),
            None => (vehicle.pos_front(), vehicle.speed()),
        };
        let kind = MessageKind::Measure {
            speed,
            acc: vehicle.acc(),
            length: vehicle.length(),
        };
        let mut msg = vehicle.message(kind, time, self.lifetime);
        msg.position = position;
        vehicle.send(msg);
    }
}
