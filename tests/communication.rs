//! Tests of the perception and communication phases.

use assert_approx_eq::assert_approx_eq;
use traffic_microsim::{
    BeaconBehavior, LaneRef, RoadSegmentAttributes, RoadSegmentId, RsuSensor, Sensor, Simulation,
    VehiclePrototype,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn road(sim: &mut Simulation, name: &str, length: f64) -> RoadSegmentId {
    sim.add_road_segment(&RoadSegmentAttributes {
        user_id: Some(name),
        length,
        lane_count: 1,
    })
}

fn talking_car() -> VehiclePrototype {
    VehiclePrototype {
        sensors: vec![
            Sensor::Gps { noise_std: 0.0 },
            Sensor::Communication { range: 200.0 },
        ],
        ..Default::default()
    }
}

/// Test that vehicles only ever sense broadcasts that road side units
/// completed in the current step, on their own and the downstream segment.
#[test]
fn vehicles_hear_broadcasts_of_current_step() {
    init_logging();
    let mut sim = Simulation::new();
    let a = road(&mut sim, "a", 500.0);
    let b = road(&mut sim, "b", 500.0);
    sim.connect_lanes(LaneRef::new(a, 0), LaneRef::new(b, 0));
    let sensors = [RsuSensor::Device { range: 100.0 }, RsuSensor::Broadcaster];
    let rsu_a = sim.add_road_side_unit(a, 250.0, &sensors);
    let rsu_b = sim.add_road_side_unit(b, 100.0, &sensors);
    let veh = sim.add_vehicle(a, 0, &talking_car(), 420.0, 0.0);

    for iteration in 0..5 {
        assert_eq!(sim.iteration(), iteration);
        sim.step(0.1).unwrap();

        let vehicle = sim.vehicle(veh).unwrap();
        let perception = vehicle.perception();
        let sensed: Vec<_> = perception.infrastructure().collect();
        assert_eq!(sensed.len(), 2);
        for infra in sensed {
            assert_eq!(infra.broadcast_iteration, iteration);
            let broadcast = sim.road_side_unit(infra.rsu).unwrap().broadcast().unwrap();
            assert_eq!(broadcast.iteration, iteration);
        }
        let downstream = perception
            .infrastructure()
            .find(|infra| infra.rsu == rsu_b)
            .unwrap();
        assert_eq!(downstream.segment, b);
        assert_approx_eq!(downstream.distance, 500.0 - vehicle.pos_front() + 100.0, 0.1);
        assert!(perception.infrastructure().any(|infra| infra.rsu == rsu_a));
    }
}

/// Test that a vehicle learns its leader from the leader's beacons.
#[test]
fn beacons_reveal_immediate_leader() {
    init_logging();
    let mut sim = Simulation::new();
    let segment = road(&mut sim, "main", 1000.0);
    let leader = sim.add_vehicle(segment, 0, &talking_car(), 100.0, 10.0);
    let follower = sim.add_vehicle(segment, 0, &talking_car(), 60.0, 10.0);
    for id in [leader, follower] {
        sim.set_vehicle_behavior(id, Box::<BeaconBehavior>::default());
    }

    // the first beacons go out at the end of the first step
    sim.step(0.1).unwrap();
    assert!(sim
        .vehicle(follower)
        .unwrap()
        .perception()
        .immediate_leader()
        .is_none());

    sim.step(0.1).unwrap();
    let vehicle = sim.vehicle(follower).unwrap();
    assert_eq!(vehicle.front_vehicle_id(), Some(leader));
    let perception = vehicle.perception();
    let sensed = perception.immediate_leader().unwrap();
    assert_eq!(sensed.id, leader);
    assert_approx_eq!(sensed.position, 101.0, 0.1);
    assert_approx_eq!(sensed.speed, 10.0, 0.1);

    // the leader has nobody in front to learn from
    let vehicle = sim.vehicle(leader).unwrap();
    assert_eq!(vehicle.front_vehicle_id(), None);
    assert!(vehicle.perception().immediate_leader().is_none());
}

/// Test that a congested road side unit advises approaching vehicles to slow down.
#[test]
fn congestion_advisory_reaches_vehicles() {
    init_logging();
    let mut sim = Simulation::new();
    let segment = road(&mut sim, "main", 1000.0);
    sim.add_road_side_unit(
        segment,
        300.0,
        &[RsuSensor::LoopDetector { range: 50.0 }, RsuSensor::Broadcaster],
    );
    for pos in [290.0, 300.0, 310.0] {
        let id = sim.add_vehicle(segment, 0, &VehiclePrototype::default(), pos, 0.0);
        sim.set_vehicle_frozen(id, true);
    }
    let veh = sim.add_vehicle(segment, 0, &talking_car(), 150.0, 10.0);
    sim.set_vehicle_behavior(veh, Box::<BeaconBehavior>::default());

    sim.step(0.1).unwrap();
    assert_eq!(sim.vehicle(veh).unwrap().advisory_speed(), None);

    sim.step(0.1).unwrap();
    assert_eq!(sim.vehicle(veh).unwrap().advisory_speed(), Some(15.0));
}

/// Test that accelerations can be computed from perception alone.
#[test]
fn perception_driven_vehicle_keeps_its_distance() {
    init_logging();
    let config = traffic_microsim::SimulationConfig {
        use_perception: true,
        ..Default::default()
    };
    let mut sim = Simulation::with_config(config).unwrap();
    let segment = road(&mut sim, "main", 2000.0);
    let radar = VehiclePrototype {
        sensors: vec![Sensor::Radar { range: 150.0 }],
        ..Default::default()
    };
    let obstacle = sim.add_obstacle(segment, 0, 300.0, 5.0);
    let veh = sim.add_vehicle(segment, 0, &radar, 0.0, 15.0);

    for _ in 0..1200 {
        sim.step(0.1).unwrap();
    }
    let vehicle = sim.vehicle(veh).unwrap();
    assert!(!vehicle.is_frozen());
    assert!(vehicle.speed() < 0.5);
    assert!(vehicle.net_distance(sim.vehicle(obstacle).unwrap()) > 0.0);
}
