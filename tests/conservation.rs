//! Vehicle accounting over a mixed demand read incrementally from JSON lines.

#![cfg(feature = "serde")]

mod common;

use common::*;
use microsim::{
    Command, JsonLinesSource, JunctionKind, LinkAttributes, LinkPriority, Network, Simulation, SimulationConfig,
    SimulationState, SummaryCollector,
};
use std::cell::RefCell;
use std::fmt::Write;
use std::io::Cursor;
use std::rc::Rc;

/// `a` -> signalised `j0` -> `b` -> priority merge `j1` with the minor road `c` -> `d`.
fn merge_network() -> Network {
    let mut net = Network::new();
    let a = road(&mut net, "a", 200.0, 14.0);
    let b = road(&mut net, "b", 150.0, 14.0);
    let c = road(&mut net, "c", 150.0, 10.0);
    let d = road(&mut net, "d", 300.0, 14.0);
    let tl = light(&mut net, "tl", &[(20.0, "G"), (3.0, "y"), (15.0, "r")]);
    let j0 = junction(&mut net, "j0", JunctionKind::TrafficLight, Some(tl));
    link(&mut net, j0, a, b, Some(0));
    let j1 = junction(&mut net, "j1", JunctionKind::Priority, None);
    let mut merge = |from, priority| {
        net.add_link(
            j1,
            &LinkAttributes {
                from,
                to: d,
                priority,
                signal: None,
                length: 8.0,
            },
        )
        .unwrap()
    };
    let (major, minor) = (merge(b, LinkPriority::Major), merge(c, LinkPriority::Minor));
    net.add_foes(major, minor).unwrap();
    net
}

fn demand() -> String {
    let mut lines = String::new();
    writeln!(lines, r#"{{ "vehicle_type": {{ "id": "truck", "length": 12.0, "max_speed": 9.0 }} }}"#).unwrap();
    writeln!(lines, r#"{{ "route": {{ "id": "main", "edges": ["a", "b", "d"] }} }}"#).unwrap();
    writeln!(lines, "# side road traffic is routed on load").unwrap();
    for idx in 0..30 {
        let depart = 2 * idx;
        writeln!(
            lines,
            r#"{{ "vehicle": {{ "id": "main{idx}", "depart": {depart}, "route": {{ "named": "main" }} }} }}"#
        )
        .unwrap();
        if idx % 3 == 0 {
            writeln!(
                lines,
                r#"{{ "vehicle": {{ "id": "side{idx}", "type": "truck", "depart": {depart}, "route": {{ "trip": {{ "from": "c", "to": "d" }} }} }} }}"#
            )
            .unwrap();
        }
    }
    lines
}

#[test]
fn vehicles_are_accounted_for() {
    let config = SimulationConfig {
        end: Some(3000.0),
        route_steps: Some(10.0),
        max_depart_delay: Some(40.0),
        ..SimulationConfig::default()
    };
    let mut sim = Simulation::new(merge_network(), config).unwrap();
    sim.add_route_source(JsonLinesSource::new(Cursor::new(demand()))).unwrap();
    let summary = Rc::new(RefCell::new(SummaryCollector::new()));
    sim.add_output(summary.clone());
    sim.schedule(
        15.0,
        Command::RemoveVehicle {
            vehicle: "main2".to_string(),
        },
    );
    assert!(sim.statistics().loaded < 40);

    while sim.simulation_state(None) == SimulationState::Running {
        sim.step().unwrap();
        let stats = sim.statistics();
        assert_eq!(stats.departed, stats.arrived + stats.running + stats.removed);
        for veh in sim.iter_vehicles() {
            assert!(veh.speed() >= 0.0);
            assert!(veh.speed() <= veh.vtype().max_speed + 1e-9, "{} too fast", veh.name());
        }
    }

    assert_eq!(sim.simulation_state(None), SimulationState::NoFurtherVehicles);
    let stats = sim.statistics();
    assert_eq!(stats.loaded, 40);
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.loaded, stats.arrived + stats.discarded + stats.removed);
    assert_eq!(stats.running, 0);
    assert_eq!(stats.collisions, 0);
    assert!(stats.mean_travel_time().unwrap() > 0.0);

    let summary = summary.borrow();
    assert_eq!(summary.rows().len(), sim.frame());
    assert_eq!(summary.last().unwrap().stats, *stats);
}
