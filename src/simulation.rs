use crate::agent::{Behavior, RoadSideUnit, RsuSensor};
use crate::config::{SimulationConfig, VehiclePrototype};
use crate::lane::LaneRef;
use crate::light::{TrafficLight, TrafficLightLocation};
use crate::road::{RoadSegment, RoadSegmentAttributes, FREE_SPEED};
use crate::{
    IdRegistry, LightSet, RoadSegmentId, RsuId, SegmentSet, SimError, SimResult, TrafficLightId,
    Vehicle, VehicleId,
};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// A traffic simulation.
#[derive(Debug)]
pub struct Simulation {
    /// The road segments in the network.
    segments: SegmentSet,
    /// The traffic lights.
    lights: LightSet,
    /// Hands out vehicle and road side unit IDs.
    ids: IdRegistry,
    config: SimulationConfig,
    /// Drives measurement noise.
    rng: StdRng,
    /// The simulation time in s.
    time: f64,
    /// The number of completed steps.
    iteration: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::from_valid_config(SimulationConfig::default())
    }
}

impl Simulation {
    /// Creates a new simulation with the default configuration.
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a new simulation, checking the configuration first.
    pub fn with_config(config: SimulationConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: SimulationConfig) -> Self {
        Self {
            segments: SegmentSet::default(),
            lights: LightSet::default(),
            ids: IdRegistry::new(),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            time: 0.0,
            iteration: 0,
        }
    }

    /// Adds a road segment to the network.
    pub fn add_road_segment(&mut self, attributes: &RoadSegmentAttributes) -> RoadSegmentId {
        let id = self
            .segments
            .insert_with_key(|id| RoadSegment::new(id, attributes));
        info!(
            "road {} added: {:.1} m, {} lanes",
            self.segments[id].user_id(),
            attributes.length,
            attributes.lane_count
        );
        id
    }

    /// Specifies that the end of the `from` lane feeds the start of the `to` lane.
    pub fn connect_lanes(&mut self, from: LaneRef, to: LaneRef) {
        assert!(
            to.lane < self.segments[to.segment].lane_count(),
            "lane {} doesn't exist on the downstream road",
            to.lane
        );
        assert!(
            from.lane < self.segments[from.segment].lane_count(),
            "lane {} doesn't exist on the upstream road",
            from.lane
        );
        self.segments[from.segment].lane_mut(from.lane).set_sink(to);
        self.segments[to.segment].lane_mut(to.lane).set_source(from);
    }

    /// Adds a traffic light to the simulation.
    pub fn add_traffic_light(&mut self, light: TrafficLight) -> TrafficLightId {
        self.lights.insert(light)
    }

    /// Places a traffic light's stop line on a road segment.
    pub fn add_traffic_light_location(
        &mut self,
        segment: RoadSegmentId,
        light: TrafficLightId,
        position: f64,
    ) {
        assert!(self.lights.contains_key(light), "unknown traffic light");
        self.segments[segment].add_traffic_light_location(TrafficLightLocation { light, position });
    }

    /// Adds a vehicle to the simulation.
    pub fn add_vehicle(
        &mut self,
        segment: RoadSegmentId,
        lane: usize,
        prototype: &VehiclePrototype,
        pos: f64,
        speed: f64,
    ) -> VehicleId {
        let road = &mut self.segments[segment];
        assert!(
            lane < road.lane_count(),
            "lane {lane} out of range on road {}",
            road.user_id()
        );
        let id = self.ids.next_vehicle_id();
        let vehicle = Vehicle::new(id, prototype, segment, lane, pos, speed, self.time);
        debug!("vehicle {id} added on road {} lane {lane} at {pos:.1} m", road.user_id());
        road.lane_mut(lane).add_vehicle(vehicle);
        id
    }

    /// Adds a standing obstacle of the given length.
    pub fn add_obstacle(
        &mut self,
        segment: RoadSegmentId,
        lane: usize,
        pos: f64,
        length: f64,
    ) -> VehicleId {
        self.add_vehicle(segment, lane, &VehiclePrototype::obstacle(length), pos, 0.0)
    }

    /// Adds a road side unit at `position` on a road segment.
    pub fn add_road_side_unit(
        &mut self,
        segment: RoadSegmentId,
        position: f64,
        sensors: &[RsuSensor],
    ) -> RsuId {
        let road = &mut self.segments[segment];
        assert!(
            (0.0..=road.length()).contains(&position),
            "road side unit at {position} outside road {}",
            road.user_id()
        );
        let id = self.ids.next_rsu_id();
        road.add_road_side_unit(RoadSideUnit::new(id, segment, position, sensors));
        id
    }

    /// Removes a vehicle from the simulation.
    pub fn remove_vehicle(&mut self, id: VehicleId) -> Option<Vehicle> {
        self.segments.values_mut().find_map(|segment| {
            let (lane, _) = segment.find_vehicle(id)?;
            segment.lane_mut(lane).remove_vehicle(id)
        })
    }

    /// Sets the `frozen` attribute of a vehicle. A frozen vehicle stops at once
    /// and stays put until it is no longer frozen.
    /// Returns false if there's no such vehicle.
    pub fn set_vehicle_frozen(&mut self, id: VehicleId, frozen: bool) -> bool {
        match self.vehicle_mut(id) {
            Some(vehicle) => {
                vehicle.set_frozen(frozen);
                true
            }
            None => false,
        }
    }

    /// Attaches a behaviour hook to a vehicle. Returns false if there's no such vehicle.
    pub fn set_vehicle_behavior(&mut self, id: VehicleId, behavior: Box<dyn Behavior>) -> bool {
        match self.vehicle_mut(id) {
            Some(vehicle) => {
                vehicle.set_behavior(Some(behavior));
                true
            }
            None => false,
        }
    }

    /// Randomly assigns a desired speed factor to each vehicle,
    /// which is sampled from a normal distribution with a mean of 1 (no adjustment)
    /// and standard deviation of `stddev`.
    pub fn randomise_desired_speeds(&mut self, stddev: f64) -> SimResult<()> {
        let distr = Normal::new(1.0, stddev)
            .map_err(|err| SimError::Config(format!("invalid standard deviation {stddev}: {err}")))?;
        for segment in self.segments.values_mut() {
            for vehicle in segment.iter_vehicles_mut() {
                let factor = distr.sample(&mut self.rng).clamp(0.75, 1.25);
                vehicle.set_desired_speed_factor(factor);
            }
        }
        Ok(())
    }

    /// Advances the simulation by `dt` seconds.
    ///
    /// Every phase runs on all road segments before the next phase starts.
    pub fn step(&mut self, dt: f64) -> SimResult<()> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(SimError::InvalidTimeStep(dt));
        }
        let time = self.time;
        let iteration = self.iteration;

        self.update_lights(dt);
        for segment in self.segments.values_mut() {
            segment.update_road_conditions();
        }

        for segment in self.segments.values_mut() {
            segment.compute_perception(time, &mut self.rng);
        }
        self.compute_communication(iteration);
        for segment in self.segments.values_mut() {
            segment.handle_communication(time);
        }
        for segment in self.segments.values_mut() {
            segment.make_decisions(time);
        }
        for segment in self.segments.values() {
            segment.update_vehicle_accelerations(&self.segments, &self.lights, &self.config);
        }
        for segment in self.segments.values_mut() {
            segment.make_lane_changes(&self.config);
        }
        for segment in self.segments.values_mut() {
            segment.update_vehicle_positions_and_speeds(dt);
        }
        if self.config.check_consistency {
            for segment in self.segments.values_mut() {
                segment.check_for_inconsistencies(time, iteration, self.config.crash_policy)?;
            }
        }
        for segment in self.segments.values_mut() {
            segment.restore_lane_order();
        }

        self.advance_vehicles(dt, time);
        for segment in self.segments.values_mut() {
            segment.in_flow(dt, time, &mut self.ids);
        }
        for segment in self.segments.values_mut() {
            segment.update_detectors(dt);
        }

        self.time += dt;
        self.iteration += 1;
        Ok(())
    }

    /// Updates the traffic lights.
    fn update_lights(&mut self, dt: f64) {
        for light in self.lights.values_mut() {
            light.step(dt);
        }
    }

    /// Runs every road side unit before any vehicle listens, so vehicles only
    /// ever hear broadcasts completed in this step.
    fn compute_communication(&mut self, iteration: u64) {
        for segment in self.segments.values_mut() {
            segment.compute_infrastructure_communication(iteration);
        }
        for segment in self.segments.values() {
            segment.compute_vehicle_communication(&self.segments);
        }
    }

    /// Moves vehicles past the end of their segment onto the downstream
    /// lane, or out of the simulation.
    fn advance_vehicles(&mut self, dt: f64, time: f64) {
        let mut advanced = vec![];
        for segment in self.segments.values_mut() {
            advanced.extend(segment.out_flow(dt, time));
        }
        for (vehicle, target) in advanced {
            match self.segments.get_mut(target.segment) {
                Some(segment) => segment.accept_vehicle(vehicle),
                None => debug!("vehicle {} dropped: downstream road is gone", vehicle.id()),
            }
        }
    }

    /// Gets the current simulation time in s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Gets the number of completed steps.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn ids(&self) -> &IdRegistry {
        &self.ids
    }

    /// Returns an iterator over all the road segments in the simulation.
    pub fn iter_segments(&self) -> impl Iterator<Item = &RoadSegment> {
        self.segments.values()
    }

    /// The road segments, as needed by [RoadSegment::next_downstream_traffic_light].
    pub fn segments(&self) -> &SegmentSet {
        &self.segments
    }

    /// Gets a reference to the road segment with the given ID.
    pub fn segment(&self, id: RoadSegmentId) -> &RoadSegment {
        &self.segments[id]
    }

    /// Gets a mutable reference to the road segment with the given ID,
    /// for attaching boundaries and modifiers.
    pub fn segment_mut(&mut self, id: RoadSegmentId) -> &mut RoadSegment {
        &mut self.segments[id]
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.segments.values().flat_map(RoadSegment::iter_vehicles)
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.segments.values().find_map(|segment| {
            let (lane, idx) = segment.find_vehicle(id)?;
            segment.lane(lane).get(idx)
        })
    }

    /// Gets a mutable reference to the vehicle with the given ID.
    pub fn vehicle_mut(&mut self, id: VehicleId) -> Option<&mut Vehicle> {
        self.segments.values_mut().find_map(|segment| {
            let (lane, idx) = segment.find_vehicle(id)?;
            segment.lane_mut(lane).get_mut(idx)
        })
    }

    /// Returns an iterator over all the traffic lights in the simulation.
    pub fn iter_lights(&self) -> impl Iterator<Item = (TrafficLightId, &TrafficLight)> {
        self.lights.iter()
    }

    pub fn light(&self, id: TrafficLightId) -> Option<&TrafficLight> {
        self.lights.get(id)
    }

    pub fn road_side_unit(&self, id: RsuId) -> Option<&RoadSideUnit> {
        self.segments
            .values()
            .find_map(|segment| segment.road_side_unit(id))
    }

    pub fn road_side_unit_mut(&mut self, id: RsuId) -> Option<&mut RoadSideUnit> {
        self.segments
            .values_mut()
            .find_map(|segment| segment.road_side_unit_mut(id))
    }

    /// The number of vehicles in the network, obstacles included.
    pub fn vehicle_count(&self) -> usize {
        self.segments.values().map(RoadSegment::vehicle_count).sum()
    }

    /// The mean speed of all moving traffic in m/s, or [FREE_SPEED] if there is none.
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

    /// Removes every vehicle and restarts the clock, keeping the network.
    pub fn reset(&mut self) {
        for segment in self.segments.values_mut() {
            segment.reset();
        }
        for light in self.lights.values_mut() {
            light.reset();
        }
        self.ids.reset_vehicles();
        self.rng = StdRng::seed_from_u64(self.config.seed);
        self.time = 0.0;
        self.iteration = 0;
        info!("simulation reset");
    }
}
