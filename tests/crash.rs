//! Tests of the consistency check run after every position update.

use assert_approx_eq::assert_approx_eq;
use traffic_microsim::{
    CrashPolicy, RoadSegmentAttributes, RoadSegmentId, SimError, Simulation, SimulationConfig,
    VehicleId, VehiclePrototype,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two vehicles on one lane, the follower's front 2 m into the leader.
fn overlapping(policy: CrashPolicy) -> (Simulation, RoadSegmentId, VehicleId, VehicleId) {
    let config = SimulationConfig {
        crash_policy: policy,
        ..Default::default()
    };
    let mut sim = Simulation::with_config(config).unwrap();
    let segment = sim.add_road_segment(&RoadSegmentAttributes {
        user_id: Some("crash site"),
        length: 1000.0,
        lane_count: 1,
    });
    let leader = sim.add_vehicle(segment, 0, &VehiclePrototype::default(), 50.0, 0.0);
    let follower = sim.add_vehicle(segment, 0, &VehiclePrototype::default(), 47.0, 0.0);
    (sim, segment, leader, follower)
}

/// Test that a strict run stops with a report naming both vehicles.
#[test]
fn strict_policy_terminates_with_report() {
    init_logging();
    let (mut sim, segment, leader, follower) = overlapping(CrashPolicy::Terminate);

    let Err(SimError::Crash(report)) = sim.step(0.1) else {
        panic!("expected a crash");
    };
    assert_eq!(report.segment, segment);
    assert_eq!(report.user_id, "crash site");
    assert_eq!(report.lane, 0);
    assert_eq!(report.leader, leader);
    assert_eq!(report.follower, follower);
    assert_approx_eq!(report.leader_position, 50.0, 0.1);
    assert_approx_eq!(report.follower_position, 47.0, 0.1);
    assert!(report.net_distance < 0.0);

    let message = report.to_string();
    assert!(message.contains(&leader.to_string()));
    assert!(message.contains(&follower.to_string()));
}

/// Test that a lenient run freezes both vehicles in place.
#[test]
fn lenient_policy_freezes_both_vehicles() {
    init_logging();
    let (mut sim, _, leader, follower) = overlapping(CrashPolicy::Freeze);

    sim.step(0.1).unwrap();
    for id in [leader, follower] {
        let vehicle = sim.vehicle(id).unwrap();
        assert!(vehicle.is_frozen());
        assert_eq!(vehicle.speed(), 0.0);
        assert_eq!(vehicle.acc(), 0.0);
    }

    let positions: Vec<f64> = [leader, follower]
        .iter()
        .map(|id| sim.vehicle(*id).unwrap().pos_front())
        .collect();
    for _ in 0..10 {
        sim.step(0.1).unwrap();
    }
    for (id, pos) in [leader, follower].iter().zip(positions) {
        let vehicle = sim.vehicle(*id).unwrap();
        assert_eq!(vehicle.speed(), 0.0);
        assert_eq!(vehicle.pos_front(), pos);
    }
}

/// Test that overlapping obstacles are not reported.
#[test]
fn obstacles_are_exempt() {
    init_logging();
    let config = SimulationConfig {
        crash_policy: CrashPolicy::Terminate,
        ..Default::default()
    };
    let mut sim = Simulation::with_config(config).unwrap();
    let segment = sim.add_road_segment(&RoadSegmentAttributes {
        user_id: None,
        length: 100.0,
        lane_count: 1,
    });
    sim.add_obstacle(segment, 0, 50.0, 5.0);
    sim.add_obstacle(segment, 0, 47.0, 5.0);
    assert!(sim.step(0.1).is_ok());
}

/// Test that a vehicle running into an obstacle is reported.
#[test]
fn vehicle_into_obstacle_terminates() {
    init_logging();
    let config = SimulationConfig {
        crash_policy: CrashPolicy::Terminate,
        ..Default::default()
    };
    let mut sim = Simulation::with_config(config).unwrap();
    let segment = sim.add_road_segment(&RoadSegmentAttributes {
        user_id: None,
        length: 100.0,
        lane_count: 1,
    });
    let obstacle = sim.add_obstacle(segment, 0, 50.0, 5.0);
    let car = sim.add_vehicle(segment, 0, &VehiclePrototype::default(), 47.0, 0.0);

    let Err(SimError::Crash(report)) = sim.step(0.1) else {
        panic!("expected a crash");
    };
    assert_eq!(report.leader, obstacle);
    assert_eq!(report.follower, car);
    assert!(report.net_distance < 0.0);
}

/// Test that a lenient run freezes a vehicle stuck in an obstacle.
#[test]
fn vehicle_into_obstacle_is_frozen() {
    init_logging();
    let mut sim = Simulation::new();
    let segment = sim.add_road_segment(&RoadSegmentAttributes {
        user_id: None,
        length: 100.0,
        lane_count: 1,
    });
    sim.add_obstacle(segment, 0, 50.0, 5.0);
    let car = sim.add_vehicle(segment, 0, &VehiclePrototype::default(), 47.0, 0.0);

    sim.step(0.1).unwrap();
    let vehicle = sim.vehicle(car).unwrap();
    assert!(vehicle.is_frozen());
    assert_eq!(vehicle.speed(), 0.0);
}

/// Test that the check can be switched off.
#[test]
fn check_can_be_disabled() {
    let config = SimulationConfig {
        crash_policy: CrashPolicy::Terminate,
        check_consistency: false,
        ..Default::default()
    };
    let mut sim = Simulation::with_config(config).unwrap();
    let segment = sim.add_road_segment(&RoadSegmentAttributes {
        user_id: None,
        length: 1000.0,
        lane_count: 1,
    });
    let a = sim.add_vehicle(segment, 0, &VehiclePrototype::default(), 50.0, 0.0);
    let b = sim.add_vehicle(segment, 0, &VehiclePrototype::default(), 47.0, 0.0);
    assert!(sim.step(0.1).is_ok());
    assert!(!sim.vehicle(a).unwrap().is_frozen());
    assert!(!sim.vehicle(b).unwrap().is_frozen());
}
