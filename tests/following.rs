//! Vehicles queueing behind a leader that brakes to a standstill.

mod common;

use common::*;
use microsim::{
    DepartSpeed, JunctionKind, Network, RouteSpec, Simulation, SimulationConfig, VehicleDefinition, VehicleType,
};

const MAX_SPEED: f64 = 15.0;

/// `road` (600 m) ending at a permanently red light.
fn blocked_road() -> Network {
    let mut net = Network::new();
    let from = road(&mut net, "road", 600.0, 20.0);
    let to = road(&mut net, "exit", 100.0, 20.0);
    let tl = light(&mut net, "tl", &[(1000.0, "r")]);
    let j = junction(&mut net, "j", JunctionKind::TrafficLight, Some(tl));
    link(&mut net, j, from, to, Some(0));
    net
}

fn queue_forms(vtype: VehicleType) {
    let config = SimulationConfig {
        end: Some(150.0),
        time_to_teleport: None,
        ..SimulationConfig::default()
    };
    let decel = vtype.decel();
    let mut sim = Simulation::new(blocked_road(), config).unwrap();
    sim.add_vehicle_type(vtype).unwrap();
    for (idx, depart) in [0.0, 4.0, 8.0, 12.0].iter().enumerate() {
        let mut def = VehicleDefinition::new(&format!("v{}", idx), *depart, RouteSpec::edges(&["road", "exit"]));
        def.depart_speed = DepartSpeed::Max;
        sim.add_vehicle(&def).unwrap();
    }

    let mut speeds = vec![0.0; 4];
    sim.run_until_end(|sim| {
        let lane = sim.lane_info("road_0").unwrap();
        let infos: Vec<_> = lane.vehicles.iter().map(|id| sim.vehicle_info(id).unwrap()).collect();
        for pair in infos.windows(2) {
            let (leader, follower) = (&pair[0], &pair[1]);
            assert!(
                leader.pos - 5.0 - follower.pos >= 0.0,
                "{} ran into {} at t={}",
                follower.id,
                leader.id,
                sim.time()
            );
        }
        for info in &infos {
            let idx: usize = info.id[1..].parse().unwrap();
            assert!(info.speed <= MAX_SPEED + 1e-9);
            assert!(info.speed >= 0.0);
            assert!(speeds[idx] - info.speed <= decel + 1e-9, "{} braked too hard", info.id);
            assert!(info.pos <= 600.0 + 1e-9);
            speeds[idx] = info.speed;
        }
    });

    let lane = sim.lane_info("road_0").unwrap();
    assert_eq!(lane.vehicles, vec!["v0", "v1", "v2", "v3"]);
    assert_eq!(lane.halting, 4);
    assert_eq!(sim.statistics().collisions, 0);
    let front = sim.vehicle_info("v0").unwrap();
    assert!(front.pos > 590.0);
}

trait RunUntilEnd {
    fn run_until_end(&mut self, check: impl FnMut(&Self));
}

impl RunUntilEnd for Simulation {
    fn run_until_end(&mut self, mut check: impl FnMut(&Self)) {
        while self.simulation_state(None) == microsim::SimulationState::Running {
            self.step().unwrap();
            check(self);
        }
    }
}

#[test]
fn krauss_queue() {
    queue_forms(VehicleType {
        max_speed: MAX_SPEED,
        ..exact_car(MAX_SPEED)
    });
}

#[test]
fn krauss_with_dawdling() {
    queue_forms(VehicleType {
        max_speed: MAX_SPEED,
        ..VehicleType::default()
    });
}

#[test]
fn idm_queue() {
    queue_forms(VehicleType {
        max_speed: MAX_SPEED,
        cf_model: microsim::CarFollowModel::Idm(microsim::Idm::default()),
        ..VehicleType::default()
    });
}
