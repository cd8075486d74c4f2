//! Recovery of a vehicle stuck in front of a link that never opens.

mod common;

use common::*;
use microsim::{JunctionKind, Network, RouteSpec, Simulation, SimulationConfig, SimulationState, VehicleDefinition, VehicleState};

const TIME_TO_TELEPORT: f64 = 20.0;

/// `a` -> permanently red light -> `b` -> `c`, 100 m each.
fn blocked_corridor() -> Network {
    let mut net = Network::new();
    let a = road(&mut net, "a", 100.0, 10.0);
    let b = road(&mut net, "b", 100.0, 10.0);
    let c = road(&mut net, "c", 100.0, 10.0);
    let tl = light(&mut net, "tl", &[(10_000.0, "r")]);
    let j0 = junction(&mut net, "j0", JunctionKind::TrafficLight, Some(tl));
    link(&mut net, j0, a, b, Some(0));
    let j1 = junction(&mut net, "j1", JunctionKind::Priority, None);
    link(&mut net, j1, b, c, None);
    net
}

#[test]
fn teleports_past_blockage() {
    let config = SimulationConfig {
        time_to_teleport: Some(TIME_TO_TELEPORT),
        end: Some(500.0),
        ..SimulationConfig::default()
    };
    let mut sim = Simulation::new(blocked_corridor(), config).unwrap();
    sim.add_vehicle_type(exact_car(10.0)).unwrap();
    sim.add_vehicle(&VehicleDefinition::new("v", 0.0, RouteSpec::edges(&["a", "b", "c"])))
        .unwrap();

    let mut resumed_at = None;
    let mut waited = 0.0;
    while sim.simulation_state(None) == SimulationState::Running {
        let now = sim.time();
        sim.step().unwrap();
        let Some(veh) = sim.vehicle_info("v") else {
            break;
        };
        match veh.lane.as_deref() {
            Some("a_0") => {
                // handed over within one step of crossing the threshold
                assert!(veh.waiting_time <= TIME_TO_TELEPORT + 1.0 + 1e-9);
                assert!(veh.pos <= 100.0 + 1e-9);
                waited = veh.waiting_time;
            }
            Some("b_0") if resumed_at.is_none() => {
                assert_eq!(veh.state, VehicleState::Running);
                assert_eq!(veh.teleports, 1);
                assert!(waited >= TIME_TO_TELEPORT);
                resumed_at = Some(now);
            }
            _ => {}
        }
    }

    assert!(resumed_at.is_some());
    let stats = sim.statistics();
    assert_eq!(stats.teleports, 1);
    assert_eq!(stats.arrived, 1);
    assert_eq!(stats.running, 0);
    assert_eq!(stats.collisions, 0);
    // the rest of `a` was skipped
    assert!(stats.teleported_distance < 1.0);
    assert_eq!(sim.simulation_state(None), SimulationState::NoFurtherVehicles);
}

#[test]
fn waits_forever_without_teleporting() {
    let config = SimulationConfig {
        time_to_teleport: None,
        end: Some(400.0),
        ..SimulationConfig::default()
    };
    let mut sim = Simulation::new(blocked_corridor(), config).unwrap();
    sim.add_vehicle_type(exact_car(10.0)).unwrap();
    sim.add_vehicle(&VehicleDefinition::new("v", 0.0, RouteSpec::edges(&["a", "b", "c"])))
        .unwrap();
    assert_eq!(sim.run().unwrap(), SimulationState::EndReached);
    let veh = sim.vehicle_info("v").unwrap();
    assert_eq!(veh.lane.as_deref(), Some("a_0"));
    assert!(veh.waiting_time > 300.0);
    assert_eq!(sim.statistics().teleports, 0);
}
