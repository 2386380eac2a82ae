//! Vehicles entering and leaving the network at the ends of road segments.

use super::detector::AGGREGATION_INTERVAL;
use crate::agent::Behavior;
use crate::lane::LaneSegment;
use crate::util::{interpolate, rotated_range, Interval};
use crate::vehicle::equilibrium::EquilibriumTable;
use crate::{IdRegistry, RoadSegmentId, Vehicle, VehicleId, VehiclePrototype};
use itertools::Itertools;
use log::debug;

/// Creates the behavior of a vehicle entering the network.
pub type BehaviorFactory = fn(VehicleId) -> Box<dyn Behavior>;

/// Sorts an inflow time series and converts it from veh/h to veh/s.
fn inflow_series(inflow: impl IntoIterator<Item = (f64, f64)>) -> Vec<(f64, f64)> {
    inflow
        .into_iter()
        .map(|(time, flow)| (time, flow / 3600.0))
        .sorted_by(|a, b| a.0.total_cmp(&b.0))
        .collect()
}

/// Creates a vehicle and its behavior.
#[allow(clippy::too_many_arguments)]
fn spawn(
    prototype: &VehiclePrototype,
    behavior: Option<BehaviorFactory>,
    ids: &mut IdRegistry,
    segment: RoadSegmentId,
    lane: usize,
    pos: f64,
    speed: f64,
    time: f64,
) -> Vehicle {
    let id = ids.next_vehicle_id();
    let mut vehicle = Vehicle::new(id, prototype, segment, lane, pos, speed, time);
    vehicle.set_behavior(behavior.map(|factory| factory(id)));
    vehicle
}

/// Generates vehicles at the upstream end of a road segment.
#[derive(Clone, Debug)]
pub struct TrafficSource {
    prototype: VehiclePrototype,
    table: EquilibriumTable,
    /// `(time, flow)` pairs in s and veh/s.
    inflow: Vec<(f64, f64)>,
    /// The number of vehicles waiting to enter, fractional.
    waiting: f64,
    /// The lane the next search for an entry gap starts at.
    next_lane: usize,
    entered: u64,
    behavior: Option<BehaviorFactory>,
}

impl TrafficSource {
    /// Creates a source of vehicles of the given type, with an inflow time
    /// series of `(time, flow)` pairs in s and veh/h, interpolated in between.
    pub fn new(prototype: VehiclePrototype, inflow: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let table = EquilibriumTable::new(&prototype.model, prototype.length);
        Self {
            prototype,
            table,
            inflow: inflow_series(inflow),
            waiting: 0.0,
            next_lane: 0,
            entered: 0,
            behavior: None,
        }
    }

    /// Gives every generated vehicle a behavior.
    pub fn with_behavior(mut self, factory: BehaviorFactory) -> Self {
        self.behavior = Some(factory);
        self
    }

    pub fn prototype(&self) -> &VehiclePrototype {
        &self.prototype
    }

    /// The equilibrium table of the generated vehicles.
    pub fn table(&self) -> &EquilibriumTable {
        &self.table
    }

    /// The inflow at `time` in veh/h.
    pub fn inflow_at(&self, time: f64) -> f64 {
        3600.0 * interpolate(&self.inflow, time).unwrap_or(0.0)
    }

    /// The number of vehicles generated since the start of the run.
    pub fn entered_count(&self) -> u64 {
        self.entered
    }

    /// The number of vehicles queued upstream of the segment.
    pub fn waiting(&self) -> f64 {
        self.waiting
    }

    /// Accumulates inflow and enters a vehicle on the lane with the largest
    /// gap, once that gap exceeds the gap at maximum flow. Returns the number
    /// of vehicles entered.
    pub(crate) fn time_step(
        &mut self,
        dt: f64,
        time: f64,
        segment: RoadSegmentId,
        lanes: &mut [LaneSegment],
        ids: &mut IdRegistry,
    ) -> usize {
        self.waiting += dt * interpolate(&self.inflow, time).unwrap_or(0.0);
        if self.waiting < 1.0 {
            return 0;
        }

        let best = rotated_range(lanes.len(), self.next_lane)
            .map(|lane| {
                let gap = lanes[lane].last().map_or(f64::INFINITY, Vehicle::pos_rear);
                (lane, gap)
            })
            .fold(None, |best: Option<(usize, f64)>, (lane, gap)| match best {
                Some((_, best_gap)) if best_gap >= gap => best,
                _ => Some((lane, gap)),
            });
        let Some((lane, gap)) = best else {
            return 0;
        };
        if gap <= self.table.net_gap_at_max_flow() {
            return 0;
        }

        let lead_speed = lanes[lane].last().map_or(f64::INFINITY, Vehicle::speed);
        let speed = f64::min(self.table.speed_for_gap(gap), lead_speed);
        let vehicle = spawn(
            &self.prototype,
            self.behavior,
            ids,
            segment,
            lane,
            0.0,
            speed,
            time,
        );
        debug!("vehicle {} enters lane {lane} at {speed:.2} m/s", vehicle.id());
        lanes[lane].add_vehicle(vehicle);

        self.next_lane = (lane + 1) % lanes.len();
        self.waiting -= 1.0;
        self.entered += 1;
        1
    }

    pub(crate) fn reset(&mut self) {
        self.waiting = 0.0;
        self.next_lane = 0;
        self.entered = 0;
    }
}

/// An on-ramp that drops vehicles into the largest gap of a merge zone.
#[derive(Clone, Debug)]
pub struct SimpleRamp {
    prototype: VehiclePrototype,
    table: EquilibriumTable,
    lane: usize,
    merge_zone: Interval<f64>,
    inflow: Vec<(f64, f64)>,
    waiting: f64,
    entered: u64,
    /// The smallest net gap accepted on either side, in m.
    min_gap: f64,
    behavior: Option<BehaviorFactory>,
}

impl SimpleRamp {
    /// The default smallest net gap accepted on either side of a merging vehicle, in m.
    pub const MIN_GAP: f64 = 4.0;

    /// Creates a ramp feeding `lane` within `merge_zone`, with an inflow time
    /// series of `(time, flow)` pairs in s and veh/h.
    pub fn new(
        prototype: VehiclePrototype,
        lane: usize,
        merge_zone: Interval<f64>,
        inflow: impl IntoIterator<Item = (f64, f64)>,
    ) -> Self {
        let table = EquilibriumTable::new(&prototype.model, prototype.length);
        Self {
            prototype,
            table,
            lane,
            merge_zone,
            inflow: inflow_series(inflow),
            waiting: 0.0,
            entered: 0,
            min_gap: Self::MIN_GAP,
            behavior: None,
        }
    }

    pub fn with_behavior(mut self, factory: BehaviorFactory) -> Self {
        self.behavior = Some(factory);
        self
    }

    pub fn with_min_gap(mut self, min_gap: f64) -> Self {
        self.min_gap = min_gap;
        self
    }

    pub fn lane(&self) -> usize {
        self.lane
    }

    pub fn merge_zone(&self) -> Interval<f64> {
        self.merge_zone
    }

    pub fn entered_count(&self) -> u64 {
        self.entered
    }

    pub fn waiting(&self) -> f64 {
        self.waiting
    }

    /// Finds the insertion point in the merge zone with the largest smaller
    /// gap, as `(front position, front gap, smaller gap, leader speed)`.
    fn best_slot(&self, lane: &LaneSegment) -> Option<(f64, f64, f64, f64)> {
        let zone = self.merge_zone;
        let length = self.prototype.length;
        let mut ahead: Option<&Vehicle> = None;
        let mut best: Option<(f64, f64, f64, f64)> = None;

        for behind in lane.iter().map(Some).chain(std::iter::once(None)) {
            let front = ahead.map(Vehicle::pos_rear);
            let back = behind.map(Vehicle::pos_front);
            let lead_speed = ahead.map_or(f64::INFINITY, Vehicle::speed);
            ahead = behind;

            let x = match (front, back) {
                (Some(front), Some(back)) => 0.5 * (front + back + length),
                (None, Some(_)) => zone.max,
                (Some(_), None) => zone.min,
                (None, None) => zone.midpoint(),
            }
            .clamp(zone.min, zone.max);
            let front_gap = front.map_or(f64::INFINITY, |front| front - x);
            let back_gap = back.map_or(f64::INFINITY, |back| x - length - back);
            let gap = f64::min(front_gap, back_gap);

            if best.map_or(true, |(_, _, best_gap, _)| gap > best_gap) {
                best = Some((x, front_gap, gap, lead_speed));
            }
        }
        best
    }

    /// Accumulates inflow and merges a vehicle when a large enough gap exists.
    pub(crate) fn time_step(
        &mut self,
        dt: f64,
        time: f64,
        segment: RoadSegmentId,
        lanes: &mut [LaneSegment],
        ids: &mut IdRegistry,
    ) -> usize {
        self.waiting += dt * interpolate(&self.inflow, time).unwrap_or(0.0);
        if self.waiting < 1.0 {
            return 0;
        }
        let Some(lane) = lanes.get_mut(self.lane) else {
            return 0;
        };
        let Some((pos, front_gap, gap, lead_speed)) = self.best_slot(lane) else {
            return 0;
        };
        if gap < self.min_gap {
            return 0;
        }

        let speed = f64::min(self.table.speed_for_gap(front_gap), lead_speed);
        let vehicle = spawn(
            &self.prototype,
            self.behavior,
            ids,
            segment,
            self.lane,
            pos,
            speed,
            time,
        );
        debug!("vehicle {} merges at {pos:.1} m", vehicle.id());
        lane.add_vehicle(vehicle);

        self.waiting -= 1.0;
        self.entered += 1;
        1
    }

    pub(crate) fn reset(&mut self) {
        self.waiting = 0.0;
        self.entered = 0;
    }
}

/// Consumes vehicles leaving the network at the end of a road segment.
#[derive(Clone, Debug, PartialEq)]
pub struct TrafficSink {
    consumed: u64,
    total_travel_time: f64,
    total_distance: f64,
    interval: f64,
    interval_count: usize,
    elapsed: f64,
    measured_outflow: f64,
}

impl Default for TrafficSink {
    fn default() -> Self {
        Self::new(AGGREGATION_INTERVAL)
    }
}

impl TrafficSink {
    /// Creates a sink measuring outflow over `interval` s.
    pub fn new(interval: f64) -> Self {
        Self {
            consumed: 0,
            total_travel_time: 0.0,
            total_distance: 0.0,
            interval,
            interval_count: 0,
            elapsed: 0.0,
            measured_outflow: 0.0,
        }
    }

    /// The number of vehicles consumed since the start of the run.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// The summed travel time of consumed vehicles, in s.
    pub fn total_travel_time(&self) -> f64 {
        self.total_travel_time
    }

    /// The summed distance travelled by consumed vehicles, in m.
    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    /// The outflow of the last completed interval, in veh/h.
    pub fn measured_outflow(&self) -> f64 {
        self.measured_outflow
    }

    pub(crate) fn record(&mut self, vehicle: &Vehicle, time: f64) {
        debug!("vehicle {} leaves the network", vehicle.id());
        self.consumed += 1;
        self.interval_count += 1;
        self.total_travel_time += time - vehicle.creation_time();
        self.total_distance += vehicle.distance_travelled();
    }

    pub(crate) fn time_step(&mut self, dt: f64) {
        self.elapsed += dt;
        if self.elapsed >= self.interval {
            self.measured_outflow = 3600.0 * self.interval_count as f64 / self.elapsed;
            self.interval_count = 0;
            self.elapsed = 0.0;
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.interval);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vehicle::acceleration::AccelerationModel;
    use assert_approx_eq::assert_approx_eq;
    use slotmap::KeyData;

    fn segment() -> RoadSegmentId {
        RoadSegmentId::from(KeyData::from_ffi(1))
    }

    fn lanes(count: usize) -> Vec<LaneSegment> {
        (0..count).map(|lane| LaneSegment::new(segment(), lane)).collect()
    }

    #[test]
    fn source_alternates_lanes() {
        let mut source = TrafficSource::new(VehiclePrototype::default(), [(0.0, 3600.0)]);
        let mut lanes = lanes(2);
        let mut ids = IdRegistry::new();
        assert_approx_eq!(source.inflow_at(100.0), 3600.0);

        assert_eq!(source.time_step(1.0, 0.0, segment(), &mut lanes, &mut ids), 1);
        assert_eq!(source.time_step(1.0, 1.0, segment(), &mut lanes, &mut ids), 1);
        assert_eq!(lanes[0].len(), 1);
        assert_eq!(lanes[1].len(), 1);
        assert_eq!(source.entered_count(), 2);

        // free road: vehicles enter at the desired speed
        let speed = lanes[0].first().unwrap().speed();
        assert_approx_eq!(speed, VehiclePrototype::default().model.desired_speed());
    }

    #[test]
    fn source_waits_for_gap() {
        let mut source = TrafficSource::new(VehiclePrototype::default(), [(0.0, 7200.0)]);
        let mut lanes = lanes(1);
        let mut ids = IdRegistry::new();
        assert_eq!(source.time_step(1.0, 0.0, segment(), &mut lanes, &mut ids), 1);
        // the entered vehicle still blocks the entrance
        assert_eq!(source.time_step(1.0, 1.0, segment(), &mut lanes, &mut ids), 0);
        assert!(source.waiting() >= 1.0);
    }

    #[test]
    fn ramp_merges_into_largest_gap() {
        let mut ramp = SimpleRamp::new(
            VehiclePrototype::default(),
            0,
            Interval::new(100.0, 200.0),
            [(0.0, 3600.0)],
        );
        let mut lanes = lanes(1);
        let mut ids = IdRegistry::new();
        let prototype = VehiclePrototype::default();
        for (pos, id) in [(190.0, 100), (160.0, 101), (105.0, 102)] {
            lanes[0].append_vehicle(Vehicle::new(
                VehicleId(id),
                &prototype,
                segment(),
                0,
                pos,
                10.0,
                0.0,
            ));
        }

        assert_eq!(ramp.time_step(1.0, 0.0, segment(), &mut lanes, &mut ids), 1);
        assert_eq!(lanes[0].len(), 4);
        assert!(lanes[0].is_sorted());
        let merged = lanes[0].get(2).unwrap();
        assert_eq!(merged.id(), VehicleId(1));
        assert_approx_eq!(merged.pos_front(), 0.5 * (155.0 + 105.0 + 5.0));
    }

    #[test]
    fn sink_measures_outflow() {
        let mut sink = TrafficSink::new(10.0);
        let vehicle = Vehicle::new(
            VehicleId(1),
            &VehiclePrototype::default(),
            segment(),
            0,
            0.0,
            0.0,
            2.0,
        );
        sink.record(&vehicle, 12.0);
        for _ in 0..10 {
            sink.time_step(1.0);
        }
        assert_eq!(sink.consumed(), 1);
        assert_approx_eq!(sink.total_travel_time(), 10.0);
        assert_approx_eq!(sink.measured_outflow(), 360.0);
    }
}
