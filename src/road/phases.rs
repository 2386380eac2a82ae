//! The per-segment phases of a simulation tick.
//!
//! Each phase runs over every segment of the network before the next phase
//! starts, which is what lets vehicles near a segment boundary react to
//! neighbours on the next segment.

use super::modifiers::{SignAction, GRAVITY};
use super::RoadSegment;
use crate::agent::{OwnState, Perception, SensedInfrastructure};
use crate::lane::{LaneRef, LaneSegment, LaneType};
use crate::vehicle::acceleration::LocalConditions;
use crate::vehicle::lane_change::{LaneChangeModel, Neighbours, MANDATORY_BIAS};
use crate::{IdRegistry, LightSet, LightState, SegmentSet, SimulationConfig, Vehicle};
use log::{debug, trace};
use rand::Rng;
use smallvec::SmallVec;

impl RoadSegment {
    /// Applies speed limits, slopes and message signs to the vehicles.
    pub fn update_road_conditions(&mut self) {
        let last_lane = self.lanes.len() - 1;
        let limits = self.speed_limits.as_ref();
        let slopes = self.slopes.as_ref();
        let signs = self.message_signs.as_ref();
        for veh in self.lanes.iter_mut().flat_map(LaneSegment::iter_mut) {
            let pos = veh.pos_front();
            veh.set_road_conditions(
                limits.map_or(f64::INFINITY, |limits| limits.limit_at(pos)),
                slopes.map_or(0.0, |slopes| slopes.gradient_at(pos)),
            );
            let mut sign_speed: Option<f64> = None;
            let mut sign_lane: Option<usize> = None;
            for sign in signs.into_iter().flat_map(|signs| signs.active_at(pos)) {
                match sign.action {
                    SignAction::SpeedAdvice(speed) => {
                        sign_speed = Some(sign_speed.map_or(speed, |s| s.min(speed)));
                    }
                    SignAction::TargetLane(lane) => sign_lane = Some(lane.min(last_lane)),
                }
            }
            veh.set_sign_speed(sign_speed);
            veh.set_sign_lane(sign_lane);
        }
    }

    /// Runs the sensors of vehicles and road side units.
    pub fn compute_perception(&mut self, time: f64, rng: &mut impl Rng) {
        let lanes = &self.lanes;
        for veh in lanes.iter().flat_map(LaneSegment::iter) {
            let mut perception = veh.perception_mut();
            perception.reset();
            for sensor in veh.sensors() {
                sensor.perceive(veh, lanes, time, &mut *rng, &mut perception);
            }
            perception.set_own(OwnState {
                lane: veh.lane(),
                position: veh.pos_front(),
                speed: veh.speed(),
                acc: veh.acc(),
                time,
            });
        }
        for rsu in &mut self.rsus {
            rsu.compute_perception(lanes, time);
        }
    }

    /// Lets the road side units collect messages and publish their broadcasts.
    /// Runs on every segment before any vehicle communication.
    pub fn compute_infrastructure_communication(&mut self, iteration: u64) {
        let lanes = &self.lanes;
        for rsu in &mut self.rsus {
            rsu.communicate(lanes, iteration);
        }
    }

    /// Lets vehicles hear nearby vehicles and the broadcasts of road side
    /// units on this and the downstream segments.
    pub fn compute_vehicle_communication(&self, segments: &SegmentSet) {
        let downstream: SmallVec<[&RoadSegment; 4]> = self
            .downstream_segments()
            .into_iter()
            .filter_map(|id| segments.get(id))
            .collect();

        for veh in self.iter_vehicles() {
            let Some(range) = veh.communication_range() else {
                continue;
            };
            let pos = veh.pos_front();

            veh.hear(
                self.iter_vehicles()
                    .filter(|other| other.id() != veh.id())
                    .filter(|other| (other.pos_front() - pos).abs() <= range)
                    .flat_map(|other| other.outbox().iter().cloned()),
            );

            let rsus = self
                .rsus
                .iter()
                .map(|rsu| (rsu, rsu.position() - pos))
                .chain(downstream.iter().flat_map(|segment| {
                    segment
                        .rsus
                        .iter()
                        .map(move |rsu| (rsu, self.length - pos + rsu.position()))
                }));
            for (rsu, distance) in rsus {
                if distance.abs() > range {
                    continue;
                }
                let Some(broadcast) = rsu.broadcast() else {
                    continue;
                };
                veh.hear(broadcast.messages.iter().cloned());
                veh.perception_mut()
                    .push(Perception::Infrastructure(SensedInfrastructure {
                        rsu: rsu.id(),
                        segment: rsu.segment(),
                        position: rsu.position(),
                        distance,
                        broadcast_iteration: broadcast.iteration,
                    }));
            }
        }
    }

    /// Delivers heard messages and lets behaviours and road side units react.
    pub fn handle_communication(&mut self, time: f64) {
        for lane in &mut self.lanes {
            let mut front = None;
            for veh in lane.iter_mut() {
                veh.deliver_messages(time);
                veh.set_front_vehicle_id(front);
                front = Some(veh.id());
                if let Some(mut behavior) = veh.take_behavior() {
                    behavior.handle_messages(veh, time);
                    veh.set_behavior(Some(behavior));
                }
            }
        }
        for rsu in &mut self.rsus {
            rsu.handle_messages(time);
        }
    }

    /// Lets behaviours and road side units decide what to send next.
    pub fn make_decisions(&mut self, time: f64) {
        for rsu in &mut self.rsus {
            rsu.make_decision(time);
        }
        for veh in self.lanes.iter_mut().flat_map(LaneSegment::iter_mut) {
            veh.clear_outbox();
            if let Some(mut behavior) = veh.take_behavior() {
                behavior.make_decision(veh, time);
                veh.set_behavior(Some(behavior));
            }
        }
    }

    /// Calculates the acceleration of every vehicle on the segment.
    pub fn update_vehicle_accelerations(
        &self,
        segments: &SegmentSet,
        lights: &LightSet,
        config: &SimulationConfig,
    ) {
        for (lane_idx, lane) in self.lanes.iter().enumerate() {
            let left = lane_idx.checked_sub(1).map(|idx| &self.lanes[idx]);
            let downstream = downstream_leader(lane, self.length, segments);

            for (idx, veh) in lane.iter().enumerate() {
                if veh.is_stationary() {
                    veh.set_acc(0.0, 0.0);
                    continue;
                }
                let pos = veh.pos_front();
                let conditions = veh.conditions(self.alpha_t(pos), self.alpha_v0(pos));

                let mut acc = if config.use_perception {
                    acc_from_perception(veh, &conditions)
                } else {
                    match lane.front_vehicle(idx) {
                        Some(leader) => {
                            veh.calc_acc(veh.net_distance(leader), leader.speed(), &conditions)
                        }
                        None => match downstream {
                            Some((leader, offset)) => veh.calc_acc(
                                offset + leader.pos_rear() - pos,
                                leader.speed(),
                                &conditions,
                            ),
                            None => veh.calc_acc(f64::INFINITY, veh.speed(), &conditions),
                        },
                    }
                };

                // no overtaking on the right above the critical speed
                if let (Some(critical), Some(left)) = (config.no_overtaking_on_right_speed, left) {
                    if veh.speed() > critical {
                        if let Some(leader) = left.front_vehicle_at(pos) {
                            let gap = veh.net_distance(leader);
                            acc = acc.min(veh.calc_acc(gap, leader.speed(), &conditions));
                        }
                    }
                }

                let light = self.next_downstream_traffic_light(
                    pos,
                    lane_idx,
                    config.traffic_light_lookahead,
                    segments,
                );
                if let Some((location, distance)) = light {
                    let must_stop = match lights.get(location.light).map(|light| light.state()) {
                        Some(LightState::Red) => true,
                        Some(LightState::Amber) => veh.can_stop_within(distance),
                        Some(LightState::Green) | None => false,
                    };
                    if must_stop {
                        acc = acc.min(veh.calc_acc(distance, 0.0, &conditions));
                    }
                }

                veh.set_acc(acc, acc - GRAVITY * veh.slope());
            }
        }
    }

    /// Moves vehicles into neighbouring lanes where that improves their situation.
    pub fn make_lane_changes(&mut self, config: &SimulationConfig) {
        if self.lanes.len() < 2 {
            return;
        }
        for lane_idx in 0..self.lanes.len() {
            let mut idx = 0;
            while idx < self.lanes[lane_idx].len() {
                match self.lane_change_target(lane_idx, idx, config.lane_change_delay) {
                    Some(target) => {
                        let mut veh = self.lanes[lane_idx].remove(idx);
                        trace!(
                            "vehicle {} changes from lane {lane_idx} to {target} at {:.1} m",
                            veh.id(),
                            veh.pos_front()
                        );
                        veh.set_lane(target);
                        self.lanes[target].add_vehicle(veh);
                    }
                    None => idx += 1,
                }
            }
        }
    }

    /// The lane the vehicle at `idx` wants to change to, if any.
    fn lane_change_target(&self, lane_idx: usize, idx: usize, delay: f64) -> Option<usize> {
        let lane = &self.lanes[lane_idx];
        let me = lane.get(idx)?;
        let model = me.lane_change_model()?;
        if !me.may_change_lane(delay) {
            return None;
        }
        let leaving_entrance = lane.lane_type() == LaneType::Entrance;
        let pos = me.pos_front();

        [lane_idx.checked_sub(1), Some(lane_idx + 1)]
            .into_iter()
            .flatten()
            .filter_map(|target| self.lanes.get(target).map(|lane| (target, lane)))
            .filter(|(_, target_lane)| target_lane.lane_type() != LaneType::Entrance)
            .filter_map(|(target, target_lane)| {
                let neighbours = Neighbours {
                    old_leader: lane.front_vehicle(idx),
                    old_follower: lane.rear_vehicle(idx),
                    new_leader: target_lane.front_vehicle_at(pos),
                    new_follower: target_lane.rear_vehicle_at(pos),
                };
                let bias = lane_bias(me, model, lane_idx, target, leaving_entrance);
                model
                    .incentive(me, &neighbours, bias)
                    .map(|incentive| (target, incentive))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(target, _)| target)
    }

    /// Integrates the motion of every vehicle.
    pub fn update_vehicle_positions_and_speeds(&mut self, dt: f64) {
        for veh in self.lanes.iter_mut().flat_map(LaneSegment::iter_mut) {
            veh.update_position_and_speed(dt);
        }
    }

    /// Re-sorts lanes whose vehicles passed one another.
    pub fn restore_lane_order(&mut self) {
        for lane in &mut self.lanes {
            lane.restore_order();
        }
    }

    /// Removes vehicles past the end of the segment. Those on lanes with a
    /// downstream link are returned, already placed in the frame of the
    /// downstream segment; the rest go to the sink.
    pub fn out_flow(&mut self, dt: f64, time: f64) -> Vec<(Vehicle, LaneRef)> {
        let mut transfers = vec![];
        for lane in &mut self.lanes {
            let out = lane.out_flow(self.length, self.sink.as_mut(), time);
            if out.consumed > 0 {
                debug!(
                    "{} vehicles leave the network from road {} lane {}",
                    out.consumed,
                    self.user_id,
                    lane.lane()
                );
            }
            if let Some(target) = lane.sink() {
                for mut veh in out.transfers {
                    veh.enter_segment(target.segment, target.lane, self.length);
                    transfers.push((veh, target));
                }
            }
        }
        if let Some(sink) = &mut self.sink {
            sink.time_step(dt);
        }
        transfers
    }

    /// Lets the source and the on-ramp enter new vehicles.
    /// Returns the number of vehicles entered.
    pub fn in_flow(&mut self, dt: f64, time: f64, ids: &mut IdRegistry) -> usize {
        let mut entered = 0;
        if let Some(source) = &mut self.source {
            entered += source.time_step(dt, time, self.id, &mut self.lanes, ids);
        }
        if let Some(ramp) = &mut self.ramp {
            entered += ramp.time_step(dt, time, self.id, &mut self.lanes, ids);
        }
        entered
    }

    pub fn update_detectors(&mut self, dt: f64) {
        if let Some(detectors) = &mut self.detectors {
            detectors.time_step(dt, &self.lanes);
        }
    }
}

/// The last vehicle on the lane fed by `lane`, with the offset of that
/// lane's frame relative to this one.
fn downstream_leader<'a>(
    lane: &LaneSegment,
    length: f64,
    segments: &'a SegmentSet,
) -> Option<(&'a Vehicle, f64)> {
    let sink = lane.sink()?;
    let leader = segments.get(sink.segment)?.lanes.get(sink.lane)?.last()?;
    Some((leader, length))
}

/// The acceleration toward the leader the vehicle perceives.
fn acc_from_perception(veh: &Vehicle, conditions: &LocalConditions) -> f64 {
    let leader = veh.perception().leader(veh.lane(), veh.pos_front());
    match leader {
        Some(leader) => veh.calc_acc(leader.pos_rear() - veh.pos_front(), leader.speed, conditions),
        None => veh.calc_acc(f64::INFINITY, veh.speed(), conditions),
    }
}

/// The bias toward `to`, given the vehicle's desired lane.
fn lane_bias(
    me: &Vehicle,
    model: &LaneChangeModel,
    from: usize,
    to: usize,
    leaving_entrance: bool,
) -> f64 {
    if leaving_entrance {
        return MANDATORY_BIAS;
    }
    match me.target_lane() {
        Some(desired) if desired.abs_diff(to) < desired.abs_diff(from) => model.bias,
        Some(desired) if desired.abs_diff(to) > desired.abs_diff(from) => -model.bias,
        _ => 0.0,
    }
}
