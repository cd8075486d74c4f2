//! Network and vehicle builders shared by the integration tests.

#![allow(dead_code)]

use microsim::{
    CarFollowModel, EdgeAttributes, EdgeFunction, JunctionAttributes, JunctionId, JunctionKind, Krauss,
    LaneAttributes, LaneId, LinkAttributes, LinkId, LinkPriority, LogicKind, Network, Phase, TrafficLightId,
    TrafficLightLogic, VehicleType,
};

/// Adds an edge with a single lane named `<name>_0`.
pub fn road(net: &mut Network, name: &str, length: f64, speed: f64) -> LaneId {
    let edge = net
        .add_edge(&EdgeAttributes {
            name,
            function: EdgeFunction::Normal,
        })
        .unwrap();
    net.add_lane(
        edge,
        &LaneAttributes {
            name: &format!("{}_0", name),
            length,
            speed_limit: speed,
            width: 3.2,
            shape: &[],
        },
    )
    .unwrap()
}

pub fn junction(net: &mut Network, name: &str, kind: JunctionKind, light: Option<TrafficLightId>) -> JunctionId {
    net.add_junction(&JunctionAttributes { name, kind, light }).unwrap()
}

pub fn link(net: &mut Network, junction: JunctionId, from: LaneId, to: LaneId, signal: Option<usize>) -> LinkId {
    net.add_link(
        junction,
        &LinkAttributes {
            from,
            to,
            priority: LinkPriority::Major,
            signal,
            length: 0.0,
        },
    )
    .unwrap()
}

/// A static program with a single signal.
pub fn light(net: &mut Network, name: &str, phases: &[(f64, &str)]) -> TrafficLightId {
    let phases = phases
        .iter()
        .map(|(duration, state)| Phase::new(*duration, state).unwrap())
        .collect();
    net.add_traffic_light(TrafficLightLogic::new(name, LogicKind::Static, phases).unwrap())
        .unwrap()
}

/// The default vehicle type without driver imperfection.
pub fn exact_car(max_speed: f64) -> VehicleType {
    VehicleType {
        max_speed,
        cf_model: CarFollowModel::Krauss(Krauss {
            sigma: 0.0,
            ..Krauss::default()
        }),
        ..VehicleType::default()
    }
}
