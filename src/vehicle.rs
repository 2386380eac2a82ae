use self::acceleration::{AccelerationModel, LocalConditions, LongitudinalModel};
use self::lane_change::LaneChangeModel;
use crate::agent::{AgentId, AgentPerception, Behavior, Message, MessageKind, Sensor};
use crate::{RoadSegmentId, VehicleId, VehiclePrototype};
use smallvec::SmallVec;
use std::cell::{Cell, Ref, RefCell, RefMut};

pub mod acceleration;
pub mod equilibrium;
pub mod lane_change;

/// A vehicle is considered stopped below this speed, in m/s.
const STOPPED_SPEED: f64 = 0.1;

/// The kind of a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VehicleKind {
    #[default]
    Car,
    Truck,
    /// A standing object blocking a lane.
    Obstacle,
}

/// A simulated vehicle.
#[derive(Debug)]
pub struct Vehicle {
    /// The vehicle's ID
    id: VehicleId,
    /// The label of the prototype the vehicle was created from.
    label: String,
    kind: VehicleKind,
    /// The vehicle's length in m.
    length: f64,
    /// The vehicle's width in m.
    width: f64,
    /// The largest deceleration the vehicle can apply, in m/s<sup>2</sup>.
    max_decel: f64,
    /// The car-following model, absent for obstacles.
    model: Option<LongitudinalModel>,
    /// The lane-changing model, if the vehicle changes lanes.
    lane_change: Option<LaneChangeModel>,
    sensors: SmallVec<[Sensor; 3]>,
    /// The road segment the vehicle is on.
    segment: RoadSegmentId,
    /// The lane index, 0 being the leftmost lane.
    lane: usize,
    /// The front position along the segment in m.
    pos: f64,
    /// The front position before the last position update in m.
    pos_old: f64,
    /// The speed in m/s.
    speed: f64,
    /// The acceleration applied in the next position update, in m/s<sup>2</sup>.
    acc: Cell<f64>,
    /// The acceleration as computed by the model, before slopes and limits.
    acc_model: Cell<f64>,
    /// The time since the last lane change in s.
    since_lane_change: f64,
    /// The lane the vehicle wants to be in.
    target_lane: Option<usize>,
    /// The lane asked for by a message sign the vehicle is passing.
    sign_lane: Option<usize>,
    /// The speed limit at the vehicle's position in m/s.
    speed_limit: f64,
    /// The road gradient at the vehicle's position.
    slope: f64,
    /// A speed advised by a message sign the vehicle is passing.
    sign_speed: Option<f64>,
    /// A speed advised by the infrastructure.
    advisory_speed: Option<f64>,
    /// Multiplies the model's desired speed.
    desired_speed_factor: f64,
    perception: RefCell<AgentPerception>,
    /// Messages heard in the communication phase, not yet delivered.
    pending: RefCell<Vec<Message>>,
    inbox: Vec<Message>,
    outbox: Vec<Message>,
    /// The vehicle directly ahead in the same lane.
    front_vehicle_id: Option<VehicleId>,
    behavior: Option<Box<dyn Behavior>>,
    /// Whether the vehicle is held at standstill.
    frozen: bool,
    /// The simulation time the vehicle was created at, in s.
    creation_time: f64,
    /// The distance travelled since creation in m.
    distance: f64,
}

impl Vehicle {
    /// Creates a new vehicle from a prototype.
    pub(crate) fn new(
        id: VehicleId,
        prototype: &VehiclePrototype,
        segment: RoadSegmentId,
        lane: usize,
        pos: f64,
        speed: f64,
        time: f64,
    ) -> Self {
        let is_obstacle = prototype.kind == VehicleKind::Obstacle;
        Self {
            id,
            label: prototype.label.clone(),
            kind: prototype.kind,
            length: prototype.length,
            width: prototype.width,
            max_decel: prototype.max_deceleration,
            model: (!is_obstacle).then_some(prototype.model),
            lane_change: prototype.lane_change.filter(|_| !is_obstacle),
            sensors: prototype.sensors.iter().copied().collect(),
            segment,
            lane,
            pos,
            pos_old: pos,
            speed: if is_obstacle { 0.0 } else { speed },
            acc: Cell::new(0.0),
            acc_model: Cell::new(0.0),
            since_lane_change: f64::INFINITY,
            target_lane: None,
            sign_lane: None,
            speed_limit: f64::INFINITY,
            slope: 0.0,
            sign_speed: None,
            advisory_speed: None,
            desired_speed_factor: 1.0,
            perception: RefCell::new(AgentPerception::default()),
            pending: RefCell::new(vec![]),
            inbox: vec![],
            outbox: vec![],
            front_vehicle_id: None,
            behavior: None,
            frozen: false,
            creation_time: time,
            distance: 0.0,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> VehicleKind {
        self.kind
    }

    pub fn is_obstacle(&self) -> bool {
        self.kind == VehicleKind::Obstacle
    }

    /// The vehicle's length in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The vehicle's width in m.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// The ID of the road segment the vehicle is on.
    pub fn segment(&self) -> RoadSegmentId {
        self.segment
    }

    /// The lane index, 0 being the leftmost lane.
    pub fn lane(&self) -> usize {
        self.lane
    }

    /// The longitudinal position of the front of the vehicle in m.
    pub fn pos_front(&self) -> f64 {
        self.pos
    }

    /// The longitudinal position of the rear of the vehicle in m.
    pub fn pos_rear(&self) -> f64 {
        self.pos - self.length
    }

    /// The front position before the last position update in m.
    pub fn pos_old(&self) -> f64 {
        self.pos_old
    }

    /// The vehicle's speed in m/s.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// The acceleration applied in the last position update, in m/s<sup>2</sup>.
    pub fn acc(&self) -> f64 {
        self.acc.get()
    }

    /// The acceleration computed by the car-following model, in m/s<sup>2</sup>.
    pub fn acc_model(&self) -> f64 {
        self.acc_model.get()
    }

    /// Whether the vehicle is stopped.
    pub fn has_stopped(&self) -> bool {
        self.speed < STOPPED_SPEED
    }

    pub fn model(&self) -> Option<&LongitudinalModel> {
        self.model.as_ref()
    }

    pub fn lane_change_model(&self) -> Option<&LaneChangeModel> {
        self.lane_change.as_ref()
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    /// The largest communication range among the vehicle's sensors.
    pub fn communication_range(&self) -> Option<f64> {
        self.sensors
            .iter()
            .filter_map(Sensor::communication_range)
            .reduce(f64::max)
    }

    /// The lane the vehicle wants to be in. A message sign in range takes
    /// precedence over the lane set with [Self::set_target_lane].
    pub fn target_lane(&self) -> Option<usize> {
        self.sign_lane.or(self.target_lane)
    }

    /// Sets the lane the vehicle will try to change into.
    pub fn set_target_lane(&mut self, lane: Option<usize>) {
        self.target_lane = lane;
    }

    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn advisory_speed(&self) -> Option<f64> {
        self.advisory_speed
    }

    /// Sets a speed recommended by the infrastructure, capping the desired speed.
    pub fn set_advisory_speed(&mut self, speed: Option<f64>) {
        self.advisory_speed = speed;
    }

    pub fn desired_speed_factor(&self) -> f64 {
        self.desired_speed_factor
    }

    pub(crate) fn set_desired_speed_factor(&mut self, factor: f64) {
        self.desired_speed_factor = factor;
    }

    /// The vehicle's perception of the current tick.
    pub fn perception(&self) -> Ref<'_, AgentPerception> {
        self.perception.borrow()
    }

    pub fn perception_mut(&self) -> RefMut<'_, AgentPerception> {
        self.perception.borrow_mut()
    }

    /// The messages delivered in the current tick.
    pub fn inbox(&self) -> &[Message] {
        &self.inbox
    }

    /// The messages to be heard by others in the next communication phase.
    pub fn outbox(&self) -> &[Message] {
        &self.outbox
    }

    /// Queues a message for the next communication phase.
    pub fn send(&mut self, message: Message) {
        self.outbox.push(message);
    }

    /// Creates a message stamped with the vehicle's current location.
    pub fn message(&self, kind: MessageKind, time: f64, lifetime: f64) -> Message {
        Message {
            sender: AgentId::Vehicle(self.id),
            segment: self.segment,
            lane: self.lane,
            position: self.pos,
            time,
            lifetime,
            kind,
        }
    }

    /// The vehicle directly ahead in the same lane, as of the last communication phase.
    pub fn front_vehicle_id(&self) -> Option<VehicleId> {
        self.front_vehicle_id
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn creation_time(&self) -> f64 {
        self.creation_time
    }

    /// The distance travelled since creation in m.
    pub fn distance_travelled(&self) -> f64 {
        self.distance
    }

    /// The net distance from this vehicle's front to the rear of `leader`.
    pub fn net_distance(&self, leader: &Vehicle) -> f64 {
        leader.pos_rear() - self.pos
    }

    /// The local conditions for the model, given bottleneck corrections.
    pub(crate) fn conditions(&self, alpha_t: f64, alpha_v0: f64) -> LocalConditions {
        let limit = [self.sign_speed, self.advisory_speed]
            .into_iter()
            .flatten()
            .fold(self.speed_limit, f64::min);
        LocalConditions {
            alpha_t,
            alpha_v0: alpha_v0 * self.desired_speed_factor,
            speed_limit: limit,
        }
    }

    /// The model acceleration toward a leader `gap` m ahead moving at `lead_speed`.
    pub(crate) fn calc_acc(&self, gap: f64, lead_speed: f64, conditions: &LocalConditions) -> f64 {
        match &self.model {
            Some(model) => model.calc_acc(gap, self.speed, self.speed - lead_speed, conditions),
            None => 0.0,
        }
    }

    /// The model acceleration behind the given leader, or on a free road.
    pub fn acc_behind(&self, leader: Option<&Vehicle>) -> f64 {
        let conditions = self.conditions(1.0, 1.0);
        match leader {
            Some(leader) => self.calc_acc(self.net_distance(leader), leader.speed, &conditions),
            None => self.calc_acc(f64::INFINITY, self.speed, &conditions),
        }
    }

    /// Whether the vehicle can comfortably stop within `distance` m.
    pub(crate) fn can_stop_within(&self, distance: f64) -> bool {
        let decel = self.model.map_or(self.max_decel, |m| m.comf_deceleration());
        decel > 0.0 && self.speed * self.speed / (2.0 * decel) < distance
    }

    /// Sets the acceleration to apply, bounded by the maximum deceleration.
    pub(crate) fn set_acc(&self, acc_model: f64, acc: f64) {
        self.acc_model.set(acc_model);
        self.acc.set(f64::max(acc, -self.max_decel));
    }

    /// Obstacles and frozen vehicles don't move.
    pub(crate) fn is_stationary(&self) -> bool {
        self.is_obstacle() || self.frozen
    }

    pub(crate) fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
        if frozen {
            self.speed = 0.0;
            self.acc.set(0.0);
            self.acc_model.set(0.0);
        }
    }

    pub(crate) fn set_road_conditions(&mut self, speed_limit: f64, slope: f64) {
        self.speed_limit = speed_limit;
        self.slope = slope;
    }

    pub(crate) fn set_sign_speed(&mut self, speed: Option<f64>) {
        self.sign_speed = speed;
    }

    pub(crate) fn set_sign_lane(&mut self, lane: Option<usize>) {
        self.sign_lane = lane;
    }

    /// Moves the vehicle into another lane of the same segment.
    pub(crate) fn set_lane(&mut self, lane: usize) {
        self.lane = lane;
        self.since_lane_change = 0.0;
    }

    /// Whether enough time passed since the last lane change. A vehicle
    /// changes lanes at most once per step, whatever the delay.
    pub(crate) fn may_change_lane(&self, delay: f64) -> bool {
        self.since_lane_change > 0.0 && self.since_lane_change >= delay && !self.is_stationary()
    }

    /// Moves the vehicle onto a downstream segment, `offset` m before its current frame.
    pub(crate) fn enter_segment(&mut self, segment: RoadSegmentId, lane: usize, offset: f64) {
        self.segment = segment;
        self.lane = lane;
        self.pos -= offset;
        self.pos_old -= offset;
    }

    pub(crate) fn set_behavior(&mut self, behavior: Option<Box<dyn Behavior>>) {
        self.behavior = behavior;
    }

    pub(crate) fn take_behavior(&mut self) -> Option<Box<dyn Behavior>> {
        self.behavior.take()
    }

    pub(crate) fn set_front_vehicle_id(&mut self, id: Option<VehicleId>) {
        self.front_vehicle_id = id;
    }

    /// Queues messages heard in the communication phase.
    pub(crate) fn hear(&self, messages: impl IntoIterator<Item = Message>) {
        self.pending.borrow_mut().extend(messages);
    }

    /// Moves heard messages into the inbox, dropping outdated ones.
    pub(crate) fn deliver_messages(&mut self, time: f64) {
        self.inbox.clear();
        let pending = self.pending.get_mut();
        self.inbox
            .extend(pending.drain(..).filter(|msg| !msg.is_outdated(time)));
    }

    pub(crate) fn clear_outbox(&mut self) {
        self.outbox.clear();
    }

    /// Integrates the vehicle's speed and position over `dt` seconds.
    pub(crate) fn update_position_and_speed(&mut self, dt: f64) {
        self.pos_old = self.pos;
        self.since_lane_change += dt;
        if self.is_stationary() {
            self.speed = 0.0;
            self.acc.set(0.0);
            return;
        }

        let acc = self.acc.get();
        if self.speed + acc * dt < 0.0 {
            // stops within the time step
            self.pos -= 0.5 * self.speed * self.speed / acc;
            self.speed = 0.0;
        } else {
            self.pos += self.speed * dt + 0.5 * acc * dt * dt;
            self.speed += acc * dt;
        }
        self.distance += self.pos - self.pos_old;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use slotmap::KeyData;

    fn vehicle(pos: f64, speed: f64) -> Vehicle {
        let segment = RoadSegmentId::from(KeyData::from_ffi(1));
        Vehicle::new(
            VehicleId(1),
            &VehiclePrototype::default(),
            segment,
            0,
            pos,
            speed,
            0.0,
        )
    }

    #[test]
    fn integrates_constant_acceleration() {
        let mut veh = vehicle(10.0, 10.0);
        veh.set_acc(1.0, 1.0);
        veh.update_position_and_speed(1.0);
        assert_approx_eq!(veh.pos_front(), 20.5);
        assert_approx_eq!(veh.speed(), 11.0);
        assert_approx_eq!(veh.pos_old(), 10.0);
        assert_approx_eq!(veh.distance_travelled(), 10.5);
    }

    #[test]
    fn stops_within_time_step() {
        let mut veh = vehicle(0.0, 2.0);
        veh.set_acc(-4.0, -4.0);
        veh.update_position_and_speed(1.0);
        assert_approx_eq!(veh.speed(), 0.0);
        assert_approx_eq!(veh.pos_front(), 0.5);
    }

    #[test]
    fn deceleration_is_limited() {
        let veh = vehicle(0.0, 20.0);
        veh.set_acc(-50.0, -50.0);
        assert_approx_eq!(veh.acc(), -VehiclePrototype::default().max_deceleration);
        assert_approx_eq!(veh.acc_model(), -50.0);
    }

    #[test]
    fn frozen_vehicle_stays_put() {
        let mut veh = vehicle(5.0, 10.0);
        veh.set_acc(1.0, 1.0);
        veh.set_frozen(true);
        veh.update_position_and_speed(1.0);
        assert_approx_eq!(veh.pos_front(), 5.0);
        assert_approx_eq!(veh.speed(), 0.0);
        assert_approx_eq!(veh.acc(), 0.0);
    }

    #[test]
    fn speed_caps_lower_desired_speed() {
        let mut veh = vehicle(0.0, 20.0);
        veh.set_road_conditions(30.0, 0.0);
        veh.set_sign_speed(Some(25.0));
        veh.set_advisory_speed(Some(20.0));
        let conditions = veh.conditions(1.0, 1.0);
        assert_approx_eq!(conditions.speed_limit, 20.0);
        assert_approx_eq!(veh.acc_behind(None), 0.0);
    }
}
