use self::boundary::{SimpleRamp, TrafficSink, TrafficSource};
use self::detector::LoopDetectors;
use self::modifiers::{FlowConservingBottlenecks, Slopes, SpeedLimits, VariableMessageSigns};
use crate::agent::RoadSideUnit;
use crate::lane::{LaneSegment, LaneType};
use crate::light::TrafficLightLocation;
use crate::{
    CrashPolicy, CrashReport, RoadSegmentId, RsuId, SegmentSet, SimError, SimResult, Vehicle,
    VehicleId,
};
use log::{error, info};
use smallvec::SmallVec;

pub mod boundary;
pub mod detector;
pub mod modifiers;
mod phases;

/// The mean speed reported for an empty road segment, in m/s.
pub const FREE_SPEED: f64 = 1000.0 / 3.6;

/// The number of vehicles either side of a crash included in the crash log.
const CRASH_CONTEXT: usize = 8;

/// The attributes of a road segment.
#[derive(Clone, Copy, Debug)]
pub struct RoadSegmentAttributes<'a> {
    /// The ID used by the network definition, if any.
    pub user_id: Option<&'a str>,
    /// The length in m.
    pub length: f64,
    /// The number of lanes.
    pub lane_count: usize,
}

/// A directed, lane-partitioned stretch of road.
#[derive(Debug)]
pub struct RoadSegment {
    id: RoadSegmentId,
    user_id: String,
    /// The length in m.
    length: f64,
    /// The lanes, 0 being the leftmost.
    lanes: Vec<LaneSegment>,
    source: Option<TrafficSource>,
    ramp: Option<SimpleRamp>,
    sink: Option<TrafficSink>,
    /// Ordered by strictly increasing position.
    lights: Vec<TrafficLightLocation>,
    speed_limits: Option<SpeedLimits>,
    slopes: Option<Slopes>,
    message_signs: Option<VariableMessageSigns>,
    bottlenecks: Option<FlowConservingBottlenecks>,
    detectors: Option<LoopDetectors>,
    rsus: Vec<RoadSideUnit>,
}

impl RoadSegment {
    /// Creates a new road segment.
    pub(crate) fn new(id: RoadSegmentId, attributes: &RoadSegmentAttributes) -> Self {
        assert!(
            attributes.length > 0.0,
            "road segment length must be positive, got {}",
            attributes.length
        );
        assert!(attributes.lane_count > 0, "road segment needs at least one lane");
        let user_id = attributes
            .user_id
            .map_or_else(|| format!("{:?}", id), str::to_owned);
        Self {
            id,
            user_id,
            length: attributes.length,
            lanes: (0..attributes.lane_count)
                .map(|lane| LaneSegment::new(id, lane))
                .collect(),
            source: None,
            ramp: None,
            sink: None,
            lights: vec![],
            speed_limits: None,
            slopes: None,
            message_signs: None,
            bottlenecks: None,
            detectors: None,
            rsus: vec![],
        }
    }

    pub fn id(&self) -> RoadSegmentId {
        self.id
    }

    /// The ID given by the network definition.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Gets the length of the road segment in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn lanes(&self) -> &[LaneSegment] {
        &self.lanes
    }

    /// Gets a lane. Panics if the lane doesn't exist.
    pub fn lane(&self, lane: usize) -> &LaneSegment {
        &self.lanes[lane]
    }

    pub(crate) fn lane_mut(&mut self, lane: usize) -> &mut LaneSegment {
        &mut self.lanes[lane]
    }

    pub fn set_lane_type(&mut self, lane: usize, lane_type: LaneType) {
        self.lanes[lane].set_lane_type(lane_type);
    }

    pub fn source(&self) -> Option<&TrafficSource> {
        self.source.as_ref()
    }

    pub fn set_source(&mut self, source: Option<TrafficSource>) {
        if source.is_some() {
            info!("traffic source attached to road {}", self.user_id);
        }
        self.source = source;
    }

    pub fn ramp(&self) -> Option<&SimpleRamp> {
        self.ramp.as_ref()
    }

    pub fn set_ramp(&mut self, ramp: Option<SimpleRamp>) {
        if let Some(ramp) = &ramp {
            assert!(
                ramp.lane() < self.lanes.len(),
                "ramp lane {} out of range",
                ramp.lane()
            );
            info!("on-ramp attached to road {}", self.user_id);
        }
        self.ramp = ramp;
    }

    pub fn sink(&self) -> Option<&TrafficSink> {
        self.sink.as_ref()
    }

    pub fn set_sink(&mut self, sink: Option<TrafficSink>) {
        if sink.is_some() {
            info!("traffic sink attached to road {}", self.user_id);
        }
        self.sink = sink;
    }

    pub fn speed_limits(&self) -> Option<&SpeedLimits> {
        self.speed_limits.as_ref()
    }

    pub fn set_speed_limits(&mut self, speed_limits: Option<SpeedLimits>) {
        self.speed_limits = speed_limits;
    }

    pub fn slopes(&self) -> Option<&Slopes> {
        self.slopes.as_ref()
    }

    pub fn set_slopes(&mut self, slopes: Option<Slopes>) {
        self.slopes = slopes;
    }

    pub fn message_signs(&self) -> Option<&VariableMessageSigns> {
        self.message_signs.as_ref()
    }

    pub fn message_signs_mut(&mut self) -> Option<&mut VariableMessageSigns> {
        self.message_signs.as_mut()
    }

    pub fn set_message_signs(&mut self, signs: Option<VariableMessageSigns>) {
        self.message_signs = signs;
    }

    pub fn bottlenecks(&self) -> Option<&FlowConservingBottlenecks> {
        self.bottlenecks.as_ref()
    }

    pub fn set_bottlenecks(&mut self, bottlenecks: Option<FlowConservingBottlenecks>) {
        self.bottlenecks = bottlenecks;
    }

    pub fn detectors(&self) -> Option<&LoopDetectors> {
        self.detectors.as_ref()
    }

    pub fn set_detectors(&mut self, detectors: Option<LoopDetectors>) {
        self.detectors = detectors;
    }

    /// The traffic lights on the segment, ordered by position.
    pub fn traffic_light_locations(&self) -> &[TrafficLightLocation] {
        &self.lights
    }

    /// Adds a traffic light. Positions must lie on the segment and be unique.
    pub(crate) fn add_traffic_light_location(&mut self, location: TrafficLightLocation) {
        assert!(
            (0.0..=self.length).contains(&location.position),
            "traffic light at {} outside road {} of length {}",
            location.position,
            self.user_id,
            self.length
        );
        let idx = self
            .lights
            .partition_point(|loc| loc.position < location.position);
        assert!(
            self.lights
                .get(idx)
                .map_or(true, |loc| loc.position != location.position),
            "two traffic lights at {} on road {}",
            location.position,
            self.user_id
        );
        self.lights.insert(idx, location);
    }

    pub fn road_side_units(&self) -> &[RoadSideUnit] {
        &self.rsus
    }

    pub fn road_side_unit(&self, id: RsuId) -> Option<&RoadSideUnit> {
        self.rsus.iter().find(|rsu| rsu.id() == id)
    }

    pub fn road_side_unit_mut(&mut self, id: RsuId) -> Option<&mut RoadSideUnit> {
        self.rsus.iter_mut().find(|rsu| rsu.id() == id)
    }

    pub(crate) fn add_road_side_unit(&mut self, rsu: RoadSideUnit) {
        info!("road side unit {} attached to road {}", rsu.id(), self.user_id);
        self.rsus.push(rsu);
    }

    /// Iterates over all vehicles on the segment, lane by lane.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.lanes.iter().flat_map(|lane| lane.iter())
    }

    pub(crate) fn iter_vehicles_mut(&mut self) -> impl Iterator<Item = &mut Vehicle> {
        self.lanes.iter_mut().flat_map(LaneSegment::iter_mut)
    }

    /// Finds a vehicle's lane and index within the lane.
    pub(crate) fn find_vehicle(&self, id: VehicleId) -> Option<(usize, usize)> {
        self.lanes
            .iter()
            .enumerate()
            .find_map(|(lane_idx, lane)| lane.index_of(id).map(|idx| (lane_idx, idx)))
    }

    /// Adds a vehicle to the lane it belongs to.
    pub(crate) fn accept_vehicle(&mut self, vehicle: Vehicle) {
        let lane = vehicle.lane();
        self.lanes[lane].add_vehicle(vehicle);
    }

    /// The distinct segments fed by this segment's lanes.
    pub(crate) fn downstream_segments(&self) -> SmallVec<[RoadSegmentId; 4]> {
        let mut ids = SmallVec::new();
        for sink in self.lanes.iter().filter_map(LaneSegment::sink) {
            if sink.segment != self.id && !ids.contains(&sink.segment) {
                ids.push(sink.segment);
            }
        }
        ids
    }

    /// The correction factor of the time headway at `pos`.
    pub fn alpha_t(&self, pos: f64) -> f64 {
        self.bottlenecks.as_ref().map_or(1.0, |b| b.alpha_t(pos))
    }

    /// The correction factor of the desired speed at `pos`.
    pub fn alpha_v0(&self, pos: f64) -> f64 {
        self.bottlenecks.as_ref().map_or(1.0, |b| b.alpha_v0(pos))
    }

    /// The number of vehicles on the segment, obstacles included.
    pub fn vehicle_count(&self) -> usize {
        self.lanes.iter().map(LaneSegment::len).sum()
    }

    pub fn stopped_vehicle_count(&self) -> usize {
        self.lanes.iter().map(LaneSegment::stopped_count).sum()
    }

    pub fn obstacle_count(&self) -> usize {
        self.lanes.iter().map(LaneSegment::obstacle_count).sum()
    }

    /// The mean speed of the vehicles on the segment in m/s,
    /// or [FREE_SPEED] if there are none.
    pub fn mean_speed(&self) -> f64 {
        let (count, sum) = self
            .iter_vehicles()
            .filter(|veh| !veh.is_obstacle())
            .fold((0usize, 0.0), |(count, sum), veh| (count + 1, sum + veh.speed()));
        if count > 0 {
            sum / count as f64
        } else {
            FREE_SPEED
        }
    }

    /// The time needed to traverse the segment at the current mean speed, in s.
    pub fn instantaneous_travel_time(&self) -> f64 {
        self.length / self.mean_speed()
    }

    /// The distance travelled by the vehicles currently on the segment, in m.
    pub fn total_vehicle_travel_distance(&self) -> f64 {
        self.iter_vehicles()
            .filter(|veh| !veh.is_obstacle())
            .map(Vehicle::distance_travelled)
            .sum()
    }

    /// The capacity of the segment in veh/h, from the equilibrium table of
    /// the vehicles its source generates.
    pub fn capacity(&self) -> Option<f64> {
        self.source
            .as_ref()
            .map(|source| 3600.0 * source.table().max_flow() * self.lanes.len() as f64)
    }

    /// Finds the next traffic light at or downstream of `position` in `lane`,
    /// following the lane's downstream links, within `max_look_ahead` m.
    /// Returns the light and the distance to it.
    pub fn next_downstream_traffic_light(
        &self,
        position: f64,
        lane: usize,
        max_look_ahead: f64,
        segments: &SegmentSet,
    ) -> Option<(TrafficLightLocation, f64)> {
        let mut segment = self;
        let mut lane = lane;
        let mut position = position;
        let mut distance = 0.0;
        loop {
            if let Some(location) = segment.lights.iter().find(|loc| loc.position >= position) {
                let distance = distance + location.position - position;
                return (distance <= max_look_ahead).then_some((*location, distance));
            }
            distance += segment.length - position;
            if distance > max_look_ahead {
                return None;
            }
            let sink = segment.lanes.get(lane)?.sink()?;
            segment = segments.get(sink.segment)?;
            lane = sink.lane.min(segment.lane_count() - 1);
            position = 0.0;
        }
    }

    /// Looks for vehicles overlapping their leader and resolves them by `policy`.
    /// Obstacles are never the offending follower.
    pub fn check_for_inconsistencies(
        &mut self,
        time: f64,
        iteration: u64,
        policy: CrashPolicy,
    ) -> SimResult<()> {
        for lane_idx in 0..self.lanes.len() {
            for idx in 1..self.lanes[lane_idx].len() {
                let lane = &self.lanes[lane_idx];
                let (Some(leader), Some(follower)) = (lane.get(idx - 1), lane.get(idx)) else {
                    continue;
                };
                if follower.is_obstacle() {
                    continue;
                }
                if leader.is_frozen() && follower.is_frozen() {
                    continue;
                }
                let net_distance = follower.net_distance(leader);
                if net_distance >= 0.0 {
                    continue;
                }

                let report = CrashReport {
                    segment: self.id,
                    user_id: self.user_id.clone(),
                    lane: lane_idx,
                    follower: follower.id(),
                    follower_position: follower.pos_front(),
                    leader: leader.id(),
                    leader_position: leader.pos_front(),
                    net_distance,
                    time,
                    iteration,
                };
                self.log_crash(&report, idx);

                match policy {
                    CrashPolicy::Terminate => return Err(SimError::Crash(Box::new(report))),
                    CrashPolicy::Freeze => {
                        let lane = &mut self.lanes[lane_idx];
                        for idx in [idx - 1, idx] {
                            if let Some(vehicle) = lane.get_mut(idx) {
                                vehicle.set_frozen(true);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Logs a crash along with the vehicles around it.
    fn log_crash(&self, report: &CrashReport, idx: usize) {
        let lane = &self.lanes[report.lane];
        error!("#########################################################");
        error!("{report}");
        let from = idx.saturating_sub(CRASH_CONTEXT);
        let to = usize::min(idx + CRASH_CONTEXT, lane.len() - 1);
        for (i, veh) in lane.iter().enumerate().take(to + 1).skip(from) {
            error!(
                "veh={}, pos={:6.2}, speed={:4.2}, acc_model={:4.3}, acc={:4.3}, length={:3.1}, lane={}, id={}",
                i,
                veh.pos_front(),
                veh.speed(),
                veh.acc_model(),
                veh.acc(),
                veh.length(),
                veh.lane(),
                veh.id()
            );
        }
        error!("#########################################################");
    }

    /// Removes all vehicles and clears per-run state.
    pub(crate) fn reset(&mut self) {
        for lane in &mut self.lanes {
            lane.clear();
        }
        if let Some(source) = &mut self.source {
            source.reset();
        }
        if let Some(ramp) = &mut self.ramp {
            ramp.reset();
        }
        if let Some(sink) = &mut self.sink {
            sink.reset();
        }
        if let Some(detectors) = &mut self.detectors {
            detectors.reset();
        }
        for rsu in &mut self.rsus {
            rsu.reset();
        }
    }
}
