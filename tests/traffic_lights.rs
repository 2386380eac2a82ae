//! Tests of traffic light lookahead across road segments.

use assert_approx_eq::assert_approx_eq;
use traffic_microsim::{
    LaneRef, LightState, RoadSegmentAttributes, RoadSegmentId, Simulation, TrafficLight,
    TrafficLightId,
};

/// Two 100 m roads in a row with a light at 80 m on the first and at 30 m on the second.
fn corridor() -> (Simulation, RoadSegmentId, TrafficLightId, TrafficLightId) {
    let mut sim = Simulation::new();
    let attributes = RoadSegmentAttributes {
        user_id: None,
        length: 100.0,
        lane_count: 2,
    };
    let a = sim.add_road_segment(&attributes);
    let b = sim.add_road_segment(&RoadSegmentAttributes {
        lane_count: 1,
        ..attributes
    });
    sim.connect_lanes(LaneRef::new(a, 0), LaneRef::new(b, 0));
    sim.connect_lanes(LaneRef::new(a, 1), LaneRef::new(b, 0));
    let first = sim.add_traffic_light(TrafficLight::cycle(30.0, 3.0, 30.0));
    let second = sim.add_traffic_light(TrafficLight::fixed(LightState::Red));
    sim.add_traffic_light_location(a, first, 80.0);
    sim.add_traffic_light_location(b, second, 30.0);
    (sim, a, first, second)
}

#[test]
fn finds_light_on_same_segment() {
    let (sim, a, first, _) = corridor();
    let (location, distance) = sim
        .segment(a)
        .next_downstream_traffic_light(50.0, 0, 50.0, sim.segments())
        .unwrap();
    assert_eq!(location.light, first);
    assert_approx_eq!(distance, 30.0);

    // a light right at the vehicle still counts
    let (location, distance) = sim
        .segment(a)
        .next_downstream_traffic_light(80.0, 0, 50.0, sim.segments())
        .unwrap();
    assert_eq!(location.light, first);
    assert_approx_eq!(distance, 0.0);
}

#[test]
fn follows_downstream_lanes() {
    let (sim, a, _, second) = corridor();
    for lane in [0, 1] {
        let (location, distance) = sim
            .segment(a)
            .next_downstream_traffic_light(90.0, lane, 50.0, sim.segments())
            .unwrap();
        assert_eq!(location.light, second);
        assert_approx_eq!(distance, 40.0);
    }
}

#[test]
fn respects_lookahead_budget() {
    let (sim, a, _, _) = corridor();
    let segment = sim.segment(a);
    assert!(segment
        .next_downstream_traffic_light(90.0, 0, 30.0, sim.segments())
        .is_none());
    assert!(segment
        .next_downstream_traffic_light(10.0, 0, 50.0, sim.segments())
        .is_none());
}

#[test]
fn stops_at_network_end() {
    let (sim, a, _, second) = corridor();
    let b = sim
        .iter_segments()
        .find(|segment| segment.id() != a)
        .unwrap();
    assert!(b
        .next_downstream_traffic_light(50.0, 0, 1000.0, sim.segments())
        .is_none());
    assert_eq!(b.traffic_light_locations()[0].light, second);
}

#[test]
#[should_panic]
fn duplicate_light_position_panics() {
    let (mut sim, a, first, _) = corridor();
    sim.add_traffic_light_location(a, first, 80.0);
}
