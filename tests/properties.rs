//! Tests of properties that must hold after every step.

use std::collections::{HashMap, HashSet};
use traffic_microsim::road::boundary::{TrafficSink, TrafficSource};
use traffic_microsim::{
    RoadSegmentAttributes, RoadSegmentId, Simulation, VehicleId, VehiclePrototype,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A two-lane road fed by a source and drained by a sink, with lane 1
/// blocked part way along.
fn busy_road(sim: &mut Simulation) -> RoadSegmentId {
    let segment = sim.add_road_segment(&RoadSegmentAttributes {
        user_id: Some("motorway"),
        length: 1000.0,
        lane_count: 2,
    });
    let road = sim.segment_mut(segment);
    road.set_source(Some(TrafficSource::new(
        VehiclePrototype::default(),
        [(0.0, 1800.0)],
    )));
    road.set_sink(Some(TrafficSink::default()));
    sim.add_obstacle(segment, 1, 600.0, 10.0);
    segment
}

/// Test that every lane stays sorted and every vehicle sits in exactly one lane.
#[test]
fn lanes_stay_sorted_and_vehicles_contained() {
    init_logging();
    let mut sim = Simulation::new();
    let segment = busy_road(&mut sim);
    let mut last_lane: HashMap<VehicleId, usize> = HashMap::new();
    let mut lane_changes = 0;

    for _ in 0..3000 {
        sim.step(0.1).unwrap();

        let road = sim.segment(segment);
        let mut seen = HashSet::new();
        for (idx, lane) in road.lanes().iter().enumerate() {
            assert!(lane.is_sorted(), "lane {idx} out of order");
            for veh in lane.iter() {
                assert_eq!(veh.lane(), idx);
                assert_eq!(veh.segment(), segment);
                assert!(seen.insert(veh.id()), "vehicle {} in two lanes", veh.id());
                if let Some(prev) = last_lane.insert(veh.id(), idx) {
                    if prev != idx {
                        lane_changes += 1;
                    }
                }
            }
        }
        assert_eq!(seen.len(), road.vehicle_count());
    }
    assert!(lane_changes > 0);
}

/// Test that vehicles are neither created nor lost between the source and the sink.
#[test]
fn vehicles_are_conserved() {
    init_logging();
    let mut sim = Simulation::new();
    let segment = busy_road(&mut sim);

    for _ in 0..3000 {
        sim.step(0.1).unwrap();

        let road = sim.segment(segment);
        let entered = road.source().unwrap().entered_count();
        let consumed = road.sink().unwrap().consumed();
        let present = (road.vehicle_count() - road.obstacle_count()) as u64;
        assert_eq!(entered, present + consumed);
    }

    let road = sim.segment(segment);
    assert!(road.source().unwrap().entered_count() > 0);
    assert!(road.sink().unwrap().consumed() > 0);
}

/// Test that no vehicle crashes in regular traffic.
#[test]
fn regular_traffic_does_not_crash() {
    init_logging();
    let mut sim = Simulation::new();
    let segment = busy_road(&mut sim);
    for _ in 0..3000 {
        sim.step(0.1).unwrap();
    }
    assert!(sim.iter_vehicles().all(|veh| !veh.is_frozen()));
    assert!(sim.segment(segment).mean_speed() > 0.0);
}
