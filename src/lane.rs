use crate::road::boundary::TrafficSink;
use crate::{RoadSegmentId, Vehicle, VehicleId};
use log::warn;

/// The purpose of a lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LaneType {
    #[default]
    Traffic,
    /// A lane vehicles must leave before it ends.
    Entrance,
    Exit,
}

/// A reference to one lane of a road segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LaneRef {
    pub segment: RoadSegmentId,
    pub lane: usize,
}

impl LaneRef {
    pub fn new(segment: RoadSegmentId, lane: usize) -> Self {
        Self { segment, lane }
    }
}

/// One lane of a road segment, holding its vehicles ordered by decreasing
/// front position. Index 0 is the most downstream vehicle.
#[derive(Debug)]
pub struct LaneSegment {
    segment: RoadSegmentId,
    lane: usize,
    lane_type: LaneType,
    vehicles: Vec<Vehicle>,
    /// The upstream lane feeding this lane.
    source: Option<LaneRef>,
    /// The downstream lane this lane feeds.
    sink: Option<LaneRef>,
}

/// What [LaneSegment::out_flow] did with the vehicles past the end of the lane.
#[derive(Debug, Default)]
pub struct OutFlow {
    /// Vehicles to move onto the downstream lane.
    pub transfers: Vec<Vehicle>,
    /// The number of vehicles that left the network.
    pub consumed: usize,
}

impl LaneSegment {
    pub(crate) fn new(segment: RoadSegmentId, lane: usize) -> Self {
        Self {
            segment,
            lane,
            lane_type: LaneType::Traffic,
            vehicles: vec![],
            source: None,
            sink: None,
        }
    }

    pub fn segment(&self) -> RoadSegmentId {
        self.segment
    }

    /// The lane index, 0 being the leftmost lane.
    pub fn lane(&self) -> usize {
        self.lane
    }

    pub fn lane_type(&self) -> LaneType {
        self.lane_type
    }

    pub(crate) fn set_lane_type(&mut self, lane_type: LaneType) {
        self.lane_type = lane_type;
    }

    pub fn source(&self) -> Option<LaneRef> {
        self.source
    }

    pub fn sink(&self) -> Option<LaneRef> {
        self.sink
    }

    pub(crate) fn set_source(&mut self, source: LaneRef) {
        self.source = Some(source);
    }

    pub(crate) fn set_sink(&mut self, sink: LaneRef) {
        self.sink = Some(sink);
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Iterates over the vehicles from downstream to upstream.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Vehicle> + ExactSizeIterator {
        self.vehicles.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Vehicle> {
        self.vehicles.iter_mut()
    }

    pub fn get(&self, idx: usize) -> Option<&Vehicle> {
        self.vehicles.get(idx)
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> Option<&mut Vehicle> {
        self.vehicles.get_mut(idx)
    }

    /// The most downstream vehicle.
    pub fn first(&self) -> Option<&Vehicle> {
        self.vehicles.first()
    }

    /// The most upstream vehicle.
    pub fn last(&self) -> Option<&Vehicle> {
        self.vehicles.last()
    }

    /// The vehicle ahead of the vehicle at `idx`.
    pub fn front_vehicle(&self, idx: usize) -> Option<&Vehicle> {
        idx.checked_sub(1).and_then(|idx| self.vehicles.get(idx))
    }

    /// The vehicle behind the vehicle at `idx`.
    pub fn rear_vehicle(&self, idx: usize) -> Option<&Vehicle> {
        self.vehicles.get(idx + 1)
    }

    /// The index at which a vehicle with front position `pos` belongs.
    /// Vehicles at the same position stay ahead of it.
    fn insertion_index(&self, pos: f64) -> usize {
        self.vehicles.partition_point(|veh| veh.pos_front() >= pos)
    }

    /// The closest vehicle ahead of front position `pos`.
    pub fn front_vehicle_at(&self, pos: f64) -> Option<&Vehicle> {
        self.front_vehicle(self.insertion_index(pos))
    }

    /// The closest vehicle at or behind front position `pos`.
    pub fn rear_vehicle_at(&self, pos: f64) -> Option<&Vehicle> {
        self.vehicles.get(self.insertion_index(pos))
    }

    pub fn index_of(&self, id: VehicleId) -> Option<usize> {
        self.vehicles.iter().position(|veh| veh.id() == id)
    }

    /// Inserts the vehicle at the position dictated by its front position.
    pub fn add_vehicle(&mut self, vehicle: Vehicle) {
        assert_eq!(
            vehicle.lane(),
            self.lane,
            "vehicle {} added to the wrong lane",
            vehicle.id()
        );
        let idx = self.insertion_index(vehicle.pos_front());
        self.vehicles.insert(idx, vehicle);
        debug_assert!(self.is_sorted());
    }

    /// Appends the vehicle at the upstream end of the lane.
    pub fn append_vehicle(&mut self, vehicle: Vehicle) {
        if let Some(last) = self.vehicles.last() {
            assert!(
                last.pos_front() >= vehicle.pos_front(),
                "vehicle {} appended ahead of vehicle {}",
                vehicle.id(),
                last.id()
            );
        }
        self.vehicles.push(vehicle);
    }

    /// Removes the vehicle at `idx`. The vehicle previously at `idx + 1` takes its
    /// place, so a cursor over the lane must not advance after a removal.
    pub(crate) fn remove(&mut self, idx: usize) -> Vehicle {
        self.vehicles.remove(idx)
    }

    pub(crate) fn remove_vehicle(&mut self, id: VehicleId) -> Option<Vehicle> {
        self.index_of(id).map(|idx| self.vehicles.remove(idx))
    }

    /// Removes every vehicle whose front is past `length`, handing each to the sink.
    /// Returns the number of vehicles removed.
    pub fn remove_vehicles_past_end(
        &mut self,
        length: f64,
        mut sink: Option<&mut TrafficSink>,
        time: f64,
    ) -> usize {
        let passed = self.take_vehicles_past_end(length);
        if let Some(sink) = sink.as_mut() {
            for vehicle in &passed {
                sink.record(vehicle, time);
            }
        }
        passed.len()
    }

    fn take_vehicles_past_end(&mut self, length: f64) -> Vec<Vehicle> {
        let count = self.vehicles.partition_point(|veh| veh.pos_front() > length);
        self.vehicles.drain(..count).collect()
    }

    /// Takes the vehicles past the end of the lane: they move on to the
    /// downstream lane if there is one, else they are consumed by the sink.
    pub fn out_flow(&mut self, length: f64, sink: Option<&mut TrafficSink>, time: f64) -> OutFlow {
        if self.sink.is_some() {
            OutFlow {
                transfers: self.take_vehicles_past_end(length),
                consumed: 0,
            }
        } else {
            OutFlow {
                transfers: vec![],
                consumed: self.remove_vehicles_past_end(length, sink, time),
            }
        }
    }

    /// Whether the vehicles are ordered by decreasing front position.
    pub fn is_sorted(&self) -> bool {
        self.vehicles
            .windows(2)
            .all(|pair| pair[0].pos_front() >= pair[1].pos_front())
    }

    /// Re-sorts the lane if vehicles overtook each other. Returns true if it was needed.
    pub(crate) fn restore_order(&mut self) -> bool {
        if self.is_sorted() {
            return false;
        }
        warn!(
            "vehicles overtook each other in lane {} of road {:?}; re-sorting",
            self.lane, self.segment
        );
        self.vehicles
            .sort_by(|a, b| b.pos_front().total_cmp(&a.pos_front()));
        true
    }

    pub fn stopped_count(&self) -> usize {
        self.vehicles
            .iter()
            .filter(|veh| !veh.is_obstacle() && veh.has_stopped())
            .count()
    }

    pub fn obstacle_count(&self) -> usize {
        self.vehicles.iter().filter(|veh| veh.is_obstacle()).count()
    }

    pub(crate) fn clear(&mut self) {
        self.vehicles.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::VehiclePrototype;
    use slotmap::KeyData;

    fn segment() -> RoadSegmentId {
        RoadSegmentId::from(KeyData::from_ffi(1))
    }

    fn vehicle(id: u64, pos: f64) -> Vehicle {
        let prototype = VehiclePrototype::default();
        Vehicle::new(VehicleId(id), &prototype, segment(), 0, pos, 10.0, 0.0)
    }

    fn ids(lane: &LaneSegment) -> Vec<u64> {
        lane.iter().map(|veh| veh.id().0).collect()
    }

    #[test]
    fn add_vehicle_keeps_order() {
        let mut lane = LaneSegment::new(segment(), 0);
        lane.add_vehicle(vehicle(1, 50.0));
        lane.add_vehicle(vehicle(2, 80.0));
        lane.add_vehicle(vehicle(3, 10.0));
        lane.add_vehicle(vehicle(4, 50.0));
        assert_eq!(ids(&lane), vec![2, 1, 4, 3]);
        assert!(lane.is_sorted());
    }

    #[test]
    fn neighbours_by_index() {
        let mut lane = LaneSegment::new(segment(), 0);
        lane.append_vehicle(vehicle(1, 90.0));
        lane.append_vehicle(vehicle(2, 60.0));
        lane.append_vehicle(vehicle(3, 30.0));
        assert_eq!(lane.front_vehicle(1).map(Vehicle::id), Some(VehicleId(1)));
        assert_eq!(lane.rear_vehicle(1).map(Vehicle::id), Some(VehicleId(3)));
        assert!(lane.front_vehicle(0).is_none());
        assert!(lane.rear_vehicle(2).is_none());
        assert_eq!(lane.front_vehicle_at(45.0).map(Vehicle::id), Some(VehicleId(2)));
        assert_eq!(lane.rear_vehicle_at(45.0).map(Vehicle::id), Some(VehicleId(3)));
    }

    #[test]
    #[should_panic]
    fn append_ahead_panics() {
        let mut lane = LaneSegment::new(segment(), 0);
        lane.append_vehicle(vehicle(1, 10.0));
        lane.append_vehicle(vehicle(2, 20.0));
    }

    #[test]
    fn removes_vehicles_past_end() {
        let mut lane = LaneSegment::new(segment(), 0);
        lane.append_vehicle(vehicle(1, 120.0));
        lane.append_vehicle(vehicle(2, 101.0));
        lane.append_vehicle(vehicle(3, 99.0));
        let mut sink = TrafficSink::default();
        assert_eq!(lane.remove_vehicles_past_end(100.0, Some(&mut sink), 1.0), 2);
        assert_eq!(ids(&lane), vec![3]);
        assert_eq!(sink.consumed(), 2);
    }

    #[test]
    fn out_flow_transfers_with_downstream_lane() {
        let mut lane = LaneSegment::new(segment(), 0);
        lane.set_sink(LaneRef::new(segment(), 0));
        lane.append_vehicle(vehicle(1, 120.0));
        lane.append_vehicle(vehicle(2, 20.0));
        let out = lane.out_flow(100.0, None, 0.0);
        assert_eq!(out.transfers.len(), 1);
        assert_eq!(out.consumed, 0);
        assert_eq!(ids(&lane), vec![2]);
    }

    #[test]
    fn cursor_removal_visits_every_vehicle_once() {
        let mut lane = LaneSegment::new(segment(), 0);
        for (id, pos) in [(1, 50.0), (2, 40.0), (3, 30.0), (4, 20.0)] {
            lane.append_vehicle(vehicle(id, pos));
        }
        let mut visited = vec![];
        let mut idx = 0;
        while idx < lane.len() {
            let id = lane.get(idx).map(|veh| veh.id().0).unwrap();
            visited.push(id);
            if id % 2 == 0 {
                lane.remove(idx);
            } else {
                idx += 1;
            }
        }
        assert_eq!(visited, vec![1, 2, 3, 4]);
        assert_eq!(ids(&lane), vec![1, 3]);
    }
}
