//! Read-only snapshots of simulation objects, as answered to remote queries.

use crate::junction::{Junction, JunctionKind};
use crate::lane::Lane;
use crate::light::TrafficLightLogic;
use crate::link::LinkPriority;
use crate::network::Network;
use crate::vehicle::{Vehicle, VehicleState};
use crate::VehicleSet;
#[cfg(feature = "serde")]
use serde::Serialize;

/// The state of a vehicle.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct VehicleInfo {
    pub id: String,
    pub vtype: String,
    pub state: VehicleState,
    /// The lane the vehicle is on, unless it is teleporting or not yet departed.
    pub lane: Option<String>,
    /// The position of the vehicle's front along its lane in m.
    pub pos: f64,
    pub speed: f64,
    pub accel: f64,
    /// The world coordinates of the vehicle's front, if it is on a lane.
    pub position: Option<(f64, f64)>,
    pub route: Vec<String>,
    /// The index of the current edge within the route.
    pub route_index: usize,
    pub depart: f64,
    pub depart_time: Option<f64>,
    pub waiting_time: f64,
    pub distance: f64,
    pub teleports: u32,
}

/// The state of a lane.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct LaneInfo {
    pub id: String,
    pub edge: String,
    pub length: f64,
    pub speed_limit: f64,
    /// The vehicles on the lane, leader first.
    pub vehicles: Vec<String>,
    /// The share of the lane covered by vehicles and their minimum gaps.
    pub occupancy: f64,
    pub mean_speed: f64,
    pub halting: usize,
}

/// The state of a link.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct LinkInfo {
    pub index: usize,
    pub from: String,
    pub to: String,
    pub priority: LinkPriority,
    /// The signal state character, `o` if unsignalised.
    pub state: char,
    /// Whether a vehicle holds the link.
    pub occupied: bool,
}

/// The state of a junction and its links.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct JunctionInfo {
    pub id: String,
    pub kind: JunctionKind,
    pub links: Vec<LinkInfo>,
}

/// The state of a traffic light program.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TrafficLightInfo {
    pub id: String,
    pub phase: usize,
    pub phase_count: usize,
    /// The signal states of the current phase, one character per signal.
    pub state: String,
    /// The time until the next phase switch in s.
    pub time_to_switch: f64,
    pub elapsed: f64,
}

impl VehicleInfo {
    pub(crate) fn new(net: &Network, veh: &Vehicle) -> Self {
        let lane = veh.lane().map(|lane| net.lane(lane));
        Self {
            id: veh.name().to_string(),
            vtype: veh.vtype().name.clone(),
            state: veh.state(),
            lane: lane.map(|lane| lane.name().to_string()),
            pos: veh.pos(),
            speed: veh.speed(),
            accel: veh.accel(),
            position: lane.map(|lane| {
                let (point, _) = lane.world_pos(veh.pos().clamp(0.0, lane.length()));
                (point.x, point.y)
            }),
            route: veh.route().edges().iter().map(|e| net.edge(*e).name().to_string()).collect(),
            route_index: veh.route_index(),
            depart: veh.depart(),
            depart_time: veh.depart_time(),
            waiting_time: veh.waiting_time(),
            distance: veh.distance(),
            teleports: veh.teleports(),
        }
    }
}

impl LaneInfo {
    pub(crate) fn new(net: &Network, vehicles: &VehicleSet, lane: &Lane) -> Self {
        Self {
            id: lane.name().to_string(),
            edge: net.edge(lane.edge()).name().to_string(),
            length: lane.length(),
            speed_limit: lane.speed_limit(),
            vehicles: lane.vehicles().iter().map(|id| vehicles[*id].name().to_string()).collect(),
            occupancy: lane.occupancy(vehicles),
            mean_speed: lane.mean_speed(vehicles),
            halting: lane.halting(vehicles),
        }
    }
}

impl JunctionInfo {
    pub(crate) fn new(net: &Network, junction: &Junction) -> Self {
        let links = junction
            .links()
            .iter()
            .map(|id| {
                let link = net.link(*id);
                LinkInfo {
                    index: link.index(),
                    from: net.lane(link.from()).name().to_string(),
                    to: net.lane(link.to()).name().to_string(),
                    priority: link.priority(),
                    state: link.state().to_char(),
                    occupied: link.is_occupied(),
                }
            })
            .collect();
        Self {
            id: junction.name().to_string(),
            kind: junction.kind(),
            links,
        }
    }
}

impl TrafficLightInfo {
    pub(crate) fn new(light: &TrafficLightLogic) -> Self {
        Self {
            id: light.name().to_string(),
            phase: light.current_phase(),
            phase_count: light.phases().len(),
            state: light.state_string(),
            time_to_switch: light.time_to_switch(),
            elapsed: light.elapsed(),
        }
    }
}
