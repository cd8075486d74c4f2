//! Moving vehicles along their lanes and across junctions.
//!
//! A movement pass works on a consistent snapshot: link requests are collected
//! and arbitrated first, then every vehicle's speed is planned from the state at
//! the start of the step, and only then are the new speeds and positions applied.

use crate::junction::Request;
use crate::lane::{Lane, HALTING_SPEED};
use crate::link::LinkState;
use crate::network::Network;
use crate::vehicle::{CarFollowing, Vehicle};
use crate::{LaneId, LinkId, VehicleId, VehicleSet};
use itertools::Itertools;
use log::warn;
use smallvec::SmallVec;

/// Vehicles announce themselves at links they will reach within this time.
const APPROACH_HORIZON: f64 = 10.0; // s

/// Overlaps below this are rounding noise.
const COLLISION_TOLERANCE: f64 = 1e-6; // m

/// The settings of a movement pass.
pub(crate) struct MoveParams {
    /// The simulation time at the start of the step.
    pub time: f64,
    pub dt: f64,
    pub time_to_teleport: Option<f64>,
    pub check_collisions: bool,
}

/// Vehicles the simulation has to deal with after a movement pass.
#[derive(Debug, Default)]
pub(crate) struct MoveEvents {
    /// Vehicles that drove past the end of their route. They have already
    /// left their lane and released their links.
    pub arrived: Vec<VehicleId>,
    /// Vehicles that ran into their leader.
    pub collisions: Vec<VehicleId>,
    /// Lane front vehicles that have been waiting for too long.
    pub stuck: Vec<VehicleId>,
}

/// The outcome of planning a vehicle's move.
struct Plan {
    vehicle: VehicleId,
    /// The highest safe speed.
    safe: f64,
    /// The speed the vehicle wants to drive at on its lane.
    limit: f64,
}

/// Advances all vehicles on the network by one step.
pub(crate) fn move_vehicles(net: &mut Network, vehicles: &mut VehicleSet, params: &MoveParams) -> MoveEvents {
    let dt = params.dt;
    revoke_unsafe_grants(net, vehicles);
    let requests = collect_requests(net, vehicles, params.time, dt);
    grant_requests(net, vehicles, requests);

    for plan in plan_speeds(net, vehicles, dt) {
        let veh = &mut vehicles[plan.vehicle];
        let speed = veh.next_speed(plan.safe, plan.limit, dt);
        veh.apply_speed(speed, dt, HALTING_SPEED);
    }

    let mut events = MoveEvents {
        arrived: cross_lanes(net, vehicles),
        ..Default::default()
    };
    release_cleared_links(net, vehicles);
    if params.check_collisions {
        events.collisions = find_collisions(net, vehicles);
    }
    if let Some(threshold) = params.time_to_teleport {
        events.stuck = find_stuck(net, vehicles, threshold)
            .into_iter()
            .filter(|id| !events.collisions.contains(id))
            .collect();
    }
    events
}

/// The link a vehicle on `lane` at route index `idx` uses to leave the lane:
/// the one it holds, or else the best continuation along its route.
fn next_link(net: &Network, veh: &Vehicle, lane: LaneId, idx: usize) -> Option<LinkId> {
    let held = veh
        .reservations()
        .iter()
        .map(|r| r.link)
        .find(|link| net.link(*link).from() == lane);
    if held.is_some() {
        return held;
    }
    let route = veh.route();
    net.choose_link(lane, route.edge(idx + 1)?, route.edge(idx + 2))
}

/// The distance within which a vehicle must know whether it may pass the
/// next stop line: one step at full acceleration plus the braking distance.
fn decision_horizon(veh: &Vehicle, dt: f64) -> f64 {
    let cf = veh.cf_model();
    let v_next = cf.max_next_speed(veh.speed(), dt);
    v_next * dt + cf.brake_gap(v_next)
}

/// Takes back grants on links that turned red or yellow from vehicles that
/// can still stop in front of them.
fn revoke_unsafe_grants(net: &mut Network, vehicles: &mut VehicleSet) {
    for (id, veh) in vehicles.iter_mut() {
        let Some(lane) = veh.lane() else {
            continue;
        };
        let seen = net.lane(lane).length() - veh.pos();
        if veh.cf_model().brake_gap(veh.speed()) > seen {
            continue;
        }
        let idx = veh.route_index();
        let revoked: SmallVec<[LinkId; 2]> = veh
            .reservations()
            .iter()
            .filter(|r| r.target > idx)
            .map(|r| r.link)
            .filter(|link| matches!(net.link(*link).state(), LinkState::Red | LinkState::Yellow))
            .collect();
        for link in revoked {
            veh.release_reservation(link);
            net.links[link].remove_holder(id);
        }
    }
}

/// Whether the target lane has room for the vehicle to enter completely.
fn has_room(net: &Network, vehicles: &VehicleSet, target: LaneId, veh: &Vehicle) -> bool {
    match net.lane(target).last_vehicle() {
        Some(last) => vehicles[last].rear() >= veh.vtype().length + veh.vtype().min_gap,
        None => true,
    }
}

/// Registers approaching vehicles at their next links and collects the
/// crossing requests of vehicles that have to decide now.
fn collect_requests(net: &mut Network, vehicles: &VehicleSet, now: f64, dt: f64) -> Vec<Request> {
    let mut requests = vec![];
    let mut approaches = vec![];
    for lane in net.lanes.values() {
        for (pos_in_lane, id) in lane.vehicles().iter().enumerate() {
            let veh = &vehicles[*id];
            let Some(link_id) = next_link(net, veh, lane.id(), veh.route_index()) else {
                continue;
            };
            let link = net.link(link_id);
            let cf = veh.cf_model();
            let seen = lane.length() - veh.pos();
            let v_limit = veh.desired_speed(lane.speed_limit());
            let speed = veh.speed();

            if pos_in_lane == 0 {
                let eta = if speed > HALTING_SPEED {
                    seen / speed
                } else {
                    cf.min_reach_time(speed, seen, v_limit)
                };
                if eta <= APPROACH_HORIZON {
                    approaches.push((link_id, *id, now + eta));
                }
            }

            if veh.holds(link_id) || seen > decision_horizon(veh, dt) || !has_room(net, vehicles, link.to(), veh) {
                continue;
            }
            let clear_dist = seen + link.length() + veh.vtype().length;
            requests.push(Request {
                link: link_id,
                vehicle: *id,
                leave_time: now + cf.min_reach_time(speed, clear_dist, v_limit),
                can_stop: cf.brake_gap(speed) <= seen,
            });
        }
    }

    for link in net.links.values_mut() {
        link.clear_approaches();
    }
    for (link, vehicle, arrival) in approaches {
        net.links[link].add_approach(vehicle, arrival);
    }
    requests
}

/// Lets every junction arbitrate the requests for its links.
fn grant_requests(net: &mut Network, vehicles: &mut VehicleSet, requests: Vec<Request>) {
    let mut by_junction = requests
        .into_iter()
        .into_group_map_by(|req| net.links[req.link].junction());
    for junction in net.junctions.keys().collect_vec() {
        let Some(requests) = by_junction.remove(&junction) else {
            continue;
        };
        let granted = net.junctions[junction].arbitrate(requests, &mut net.links);
        for req in granted {
            vehicles[req.vehicle].add_reservation(req.link);
        }
    }
}

/// The highest safe speed behind `leader`, `gap` metres of free road ahead
/// measured from the front of `veh` to the rear of the leader.
fn follow_bound(veh: &Vehicle, leader: &Vehicle, gap: f64, dt: f64) -> f64 {
    let cf = veh.cf_model();
    let (vl, bl) = (leader.speed(), leader.vtype().decel());
    let safe = cf.follow_speed(veh.speed(), gap - veh.vtype().min_gap, vl, bl, dt);
    // never drive into the space the leader is certain to still occupy
    let leader_advance = (vl - bl * dt).max(0.0) * dt;
    safe.min(((gap + leader_advance) / dt).max(0.0))
}

/// The safe speed imposed by the road ahead of the vehicle's lane: stop lines
/// of links it may not cross, speed limits and vehicles on the lanes beyond.
fn lookahead_speed(net: &Network, vehicles: &VehicleSet, veh: &Vehicle, lane: &Lane, dt: f64) -> f64 {
    let cf = veh.cf_model();
    let horizon = decision_horizon(veh, dt);
    let mut seen = lane.length() - veh.pos();
    let mut lane_id = lane.id();
    let mut idx = veh.route_index();
    let mut safe = f64::INFINITY;

    while seen <= horizon {
        if veh.route().edge(idx + 1).is_none() {
            break;
        }
        let Some(link_id) = next_link(net, veh, lane_id, idx) else {
            return safe.min(cf.stop_speed(veh.speed(), seen, dt));
        };
        let link = net.link(link_id);
        let permitted = veh.holds(link_id) || (idx > veh.route_index() && link.is_free_passage());
        if !permitted {
            return safe.min(cf.stop_speed(veh.speed(), seen, dt));
        }
        seen += link.length();
        let target = net.lane(link.to());
        safe = safe.min(cf.free_speed(seen, veh.desired_speed(target.speed_limit())));
        if let Some(last) = target.last_vehicle().filter(|id| *id != veh.id()) {
            let last = &vehicles[last];
            return safe.min(follow_bound(veh, last, seen + last.rear(), dt));
        }
        seen += target.length();
        lane_id = target.id();
        idx += 1;
    }
    safe
}

/// Plans the speed of every vehicle from the state at the start of the step.
fn plan_speeds(net: &Network, vehicles: &VehicleSet, dt: f64) -> Vec<Plan> {
    let mut plans = Vec::with_capacity(vehicles.len());
    for lane in net.lanes.values() {
        let mut leader: Option<&Vehicle> = None;
        for id in lane.vehicles() {
            let veh = &vehicles[*id];
            let mut safe = lookahead_speed(net, vehicles, veh, lane, dt);
            if let Some(leader) = leader {
                safe = safe.min(follow_bound(veh, leader, leader.rear() - veh.pos(), dt));
            }
            plans.push(Plan {
                vehicle: *id,
                safe,
                limit: veh.desired_speed(lane.speed_limit()),
            });
            leader = Some(veh);
        }
    }
    plans
}

/// Moves vehicles that drove past the end of their lane onto the lanes of the
/// links they hold, reserving free links past the first one on the way.
/// Vehicles without a grant are stopped at the stop line.
/// Returns the vehicles that reached the end of their route.
fn cross_lanes(net: &mut Network, vehicles: &mut VehicleSet) -> Vec<VehicleId> {
    let mut arrived = vec![];
    let mut entered: Vec<(LaneId, VehicleId)> = vec![];
    let mut touched: Vec<LaneId> = vec![];

    for lane_id in net.lanes.keys().collect_vec() {
        let length = net.lanes[lane_id].length();
        let leaving: SmallVec<[VehicleId; 4]> = net.lanes[lane_id]
            .vehicles()
            .iter()
            .copied()
            .filter(|id| vehicles[*id].pos() > length)
            .collect();
        if leaving.is_empty() {
            continue;
        }
        touched.push(lane_id);

        for id in leaving {
            net.lanes[lane_id].remove_vehicle(id);
            let veh = &mut vehicles[id];
            let mut lane = lane_id;
            loop {
                let length = net.lanes[lane].length();
                if veh.pos() <= length {
                    entered.push((lane, id));
                    break;
                }
                if veh.on_last_edge() {
                    for link in veh.take_reservations() {
                        net.links[link].remove_holder(id);
                    }
                    veh.clear_location();
                    arrived.push(id);
                    break;
                }
                // beyond the first stop line, free links are taken as the lookahead planned them
                let crossing = next_link(net, veh, lane, veh.route_index())
                    .filter(|link| veh.holds(*link) || (lane != lane_id && net.links[*link].is_free_passage()));
                match crossing {
                    Some(link) => {
                        if !veh.holds(link) {
                            veh.add_reservation(link);
                            net.links[link].add_holder(id);
                        }
                        let link = &net.links[link];
                        veh.advance_lane(link.to(), veh.pos() - length - link.length());
                        lane = link.to();
                    }
                    None => {
                        veh.clip_to(length);
                        entered.push((lane, id));
                        break;
                    }
                }
            }
        }
    }

    for (lane, id) in entered {
        net.lanes[lane].push_vehicle(id);
        touched.push(lane);
    }
    for lane in touched.into_iter().unique() {
        net.lanes[lane].sort_vehicles(vehicles);
    }
    arrived
}

/// Frees the links whose vehicles have driven clear of them.
fn release_cleared_links(net: &mut Network, vehicles: &mut VehicleSet) {
    for (id, veh) in vehicles.iter_mut() {
        if veh.lane().is_none() {
            continue;
        }
        for link in veh.take_cleared_reservations() {
            net.links[link].remove_holder(id);
        }
    }
}

/// Followers overlapping their leader.
fn find_collisions(net: &Network, vehicles: &VehicleSet) -> Vec<VehicleId> {
    let mut colliders = vec![];
    for lane in net.lanes.values() {
        for pair in lane.vehicles().windows(2) {
            let (leader, follower) = (&vehicles[pair[0]], &vehicles[pair[1]]);
            let gap = leader.rear() - follower.pos();
            if gap < -COLLISION_TOLERANCE {
                warn!(
                    "vehicle '{}' collided with '{}' on lane '{}', gap {:.2}",
                    follower.name(),
                    leader.name(),
                    lane.name(),
                    gap
                );
                colliders.push(pair[1]);
            }
        }
    }
    colliders
}

/// Lane front vehicles that have been halting longer than the threshold.
fn find_stuck(net: &Network, vehicles: &VehicleSet, threshold: f64) -> Vec<VehicleId> {
    net.lanes
        .values()
        .filter_map(|lane| lane.front_vehicle())
        .filter(|id| vehicles[*id].waiting_time() > threshold)
        .collect()
}
