//! Finding room for vehicles entering a lane, either on departure or at the
//! end of a teleport.

use crate::loader::{DepartLane, DepartPos, DepartSpeed};
use crate::network::Network;
use crate::util::Interval;
use crate::vehicle::{CarFollowing, Vehicle};
use crate::{LaneId, VehicleSet};

/// Where and how fast a vehicle enters the network.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Placement {
    pub lane: LaneId,
    pub pos: f64,
    pub speed: f64,
}

/// The range of speeds at which `veh` may be placed on `lane_id` with its front at `pos`.
///
/// The upper bound keeps the vehicle safe behind whatever is ahead of it, including
/// the stop line of a junction it has not been granted yet. The lower bound keeps
/// the vehicle behind it, on this lane or an incoming one, able to stop in time.
/// Returns `None` if the vehicle does not fit at any speed.
pub(crate) fn speed_range(
    net: &Network,
    vehicles: &VehicleSet,
    veh: &Vehicle,
    lane_id: LaneId,
    pos: f64,
    dt: f64,
) -> Option<Interval<f64>> {
    let lane = net.lane(lane_id);
    if !(0.0..=lane.length()).contains(&pos) {
        return None;
    }
    let cf = veh.cf_model();
    let vtype = veh.vtype();
    let limit = veh.desired_speed(lane.speed_limit());
    let others = move || {
        lane.vehicles()
            .iter()
            .filter(move |id| **id != veh.id())
            .map(move |id| &vehicles[*id])
    };

    let mut max = limit;
    match others().filter(|v| v.pos() >= pos).last() {
        Some(leader) => {
            let gap = leader.rear() - pos - vtype.min_gap;
            if gap < 0.0 {
                return None;
            }
            max = max.min(cf.follow_speed(limit, gap, leader.speed(), leader.vtype().decel(), dt));
        }
        None if veh.next_edge().is_some() => {
            max = max.min(cf.stop_speed(limit, lane.length() - pos, dt));
        }
        None => {}
    }

    let rear = pos - vtype.length;
    let mut min = 0.0f64;
    match others().find(|v| v.pos() < pos) {
        Some(follower) => {
            let gap = rear - follower.pos() - follower.vtype().min_gap;
            min = min.max(speed_for_follower(veh, follower, gap)?);
        }
        None => {
            for link in lane.links_in() {
                let link = net.link(*link);
                let from = net.lane(link.from());
                let Some(follower) = from.front_vehicle().filter(|id| *id != veh.id()) else {
                    continue;
                };
                let follower = &vehicles[follower];
                let gap = from.length() - follower.pos() + link.length() + rear - follower.vtype().min_gap;
                min = min.max(speed_for_follower(veh, follower, gap)?);
            }
        }
    }

    (min <= max).then(|| Interval::new(min, max))
}

/// The lowest speed of an inserted vehicle at which `follower`, `gap` metres
/// behind it, is still safe.
fn speed_for_follower(veh: &Vehicle, follower: &Vehicle, gap: f64) -> Option<f64> {
    if gap < 0.0 {
        return None;
    }
    let missing = follower.cf_model().brake_gap(follower.speed()) - gap;
    if missing <= 0.0 {
        Some(0.0)
    } else {
        Some((2.0 * veh.vtype().decel() * missing).sqrt())
    }
}

/// Picks the departure speed from the admissible range.
fn pick_speed(depart_speed: DepartSpeed, range: Interval<f64>) -> Option<f64> {
    match depart_speed {
        DepartSpeed::Zero => (range.min <= 0.0).then_some(0.0),
        DepartSpeed::Given(speed) => range.contains(speed).then_some(speed),
        DepartSpeed::Max => Some(range.max),
    }
}

/// The first position on the lane where the vehicle fits and some speed
/// accepted by `accept` is safe. Tries the start of the lane first, then the
/// spots directly behind each vehicle, back to front.
fn free_position(
    net: &Network,
    vehicles: &VehicleSet,
    veh: &Vehicle,
    lane_id: LaneId,
    dt: f64,
    accept: impl Fn(Interval<f64>) -> Option<f64>,
) -> Option<(f64, f64)> {
    let lane = net.lane(lane_id);
    let length = veh.vtype().length;
    let base = length.min(lane.length());
    let behind = lane
        .vehicles()
        .iter()
        .rev()
        .filter(|id| **id != veh.id())
        .map(|id| vehicles[*id].rear() - veh.vtype().min_gap)
        .filter(|pos| *pos >= length);
    std::iter::once(base)
        .chain(behind)
        .find_map(|pos| speed_range(net, vehicles, veh, lane_id, pos, dt).and_then(&accept).map(|speed| (pos, speed)))
}

/// The least occupied of the given lanes. Ties go to the lower lane index.
pub(crate) fn least_occupied(net: &Network, vehicles: &VehicleSet, lanes: &[LaneId]) -> Option<LaneId> {
    lanes
        .iter()
        .copied()
        .min_by(|a, b| net.lane(*a).occupancy(vehicles).total_cmp(&net.lane(*b).occupancy(vehicles)))
}

/// Finds a departure placement for a pending vehicle according to its
/// departure lane, position and speed. Returns `None` if there is no room yet.
pub(crate) fn depart_placement(net: &Network, vehicles: &VehicleSet, veh: &Vehicle, dt: f64) -> Option<Placement> {
    let edge = veh.current_edge();
    let lanes = net.edge(edge).lanes();
    let lane = match veh.depart_lane {
        DepartLane::First => *lanes.first()?,
        DepartLane::Given(idx) => *lanes.get(idx)?,
        DepartLane::Free => {
            let continuing = net.continuing_lanes(edge, veh.next_edge());
            if continuing.is_empty() {
                least_occupied(net, vehicles, lanes)?
            } else {
                least_occupied(net, vehicles, &continuing)?
            }
        }
    };
    let lane_length = net.lane(lane).length();
    let accept = |range: Interval<f64>| pick_speed(veh.depart_speed, range);

    let (pos, speed) = match veh.depart_pos {
        DepartPos::Base => {
            let pos = veh.vtype().length.min(lane_length);
            (pos, accept(speed_range(net, vehicles, veh, lane, pos, dt)?)?)
        }
        DepartPos::Given(pos) => {
            let pos = if pos < 0.0 { lane_length + pos } else { pos };
            (pos, accept(speed_range(net, vehicles, veh, lane, pos, dt)?)?)
        }
        DepartPos::Free => free_position(net, vehicles, veh, lane, dt, accept)?,
    };
    Some(Placement { lane, pos, speed })
}

/// Finds room for a teleporting vehicle on the given lane, at the highest safe
/// speed up to its desired speed.
pub(crate) fn free_insertion(
    net: &Network,
    vehicles: &VehicleSet,
    veh: &Vehicle,
    lane: LaneId,
    dt: f64,
) -> Option<Placement> {
    let (pos, speed) = free_position(net, vehicles, veh, lane, dt, |range| Some(range.max))?;
    Some(Placement { lane, pos, speed })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::test::corridor;
    use crate::route::Route;
    use crate::vehicle::{VehicleParams, VehicleType};
    use crate::VehicleId;
    use std::rc::Rc;

    fn spawn(
        vehicles: &mut VehicleSet,
        route: &Rc<Route>,
        lane: Option<(LaneId, f64, f64)>,
        depart_pos: DepartPos,
        depart_speed: DepartSpeed,
    ) -> VehicleId {
        let index = vehicles.len();
        let id = vehicles.insert_with_key(|id| {
            Vehicle::new(
                id,
                VehicleParams {
                    name: format!("v{}", index),
                    index,
                    vtype: Rc::new(VehicleType::new("car")),
                    route: route.clone(),
                    depart: 0.0,
                    depart_lane: DepartLane::First,
                    depart_pos,
                    depart_speed,
                    speed_factor: 1.0,
                    rerouting: false,
                    seed: index as u64,
                },
            )
        });
        if let Some((lane, pos, speed)) = lane {
            vehicles[id].set_location(lane, pos, speed);
        }
        id
    }

    #[test]
    fn empty_lane() {
        let (net, edges) = corridor(&[200.0, 100.0], 10.0);
        let route = Rc::new(Route::from_edges(edges.clone()));
        let mut vehicles = VehicleSet::with_key();
        let id = spawn(&mut vehicles, &route, None, DepartPos::Base, DepartSpeed::Max);
        let placement = depart_placement(&net, &vehicles, &vehicles[id], 1.0).unwrap();
        assert_eq!(placement.lane, net.edge(edges[0]).lanes()[0]);
        assert_eq!(placement.pos, 5.0);
        assert_eq!(placement.speed, 10.0);
    }

    #[test]
    fn blocked_by_leader() {
        let (mut net, edges) = corridor(&[200.0, 100.0], 10.0);
        let lane = net.edge(edges[0]).lanes()[0];
        let route = Rc::new(Route::from_edges(edges.clone()));
        let mut vehicles = VehicleSet::with_key();
        let leader = spawn(&mut vehicles, &route, Some((lane, 10.0, 0.0)), DepartPos::Base, DepartSpeed::Zero);
        net.lanes[lane].insert_vehicle(&vehicles, leader);

        let id = spawn(&mut vehicles, &route, None, DepartPos::Base, DepartSpeed::Zero);
        assert!(depart_placement(&net, &vehicles, &vehicles[id], 1.0).is_none());

        // the free position behind the leader is too close for a standing start as well
        let free = spawn(&mut vehicles, &route, None, DepartPos::Free, DepartSpeed::Zero);
        assert!(depart_placement(&net, &vehicles, &vehicles[free], 1.0).is_none());
    }

    #[test]
    fn speed_limited_by_leader() {
        let (mut net, edges) = corridor(&[200.0, 100.0], 20.0);
        let lane = net.edge(edges[0]).lanes()[0];
        let route = Rc::new(Route::from_edges(edges.clone()));
        let mut vehicles = VehicleSet::with_key();
        let leader = spawn(&mut vehicles, &route, Some((lane, 40.0, 0.0)), DepartPos::Base, DepartSpeed::Zero);
        net.lanes[lane].insert_vehicle(&vehicles, leader);

        let id = spawn(&mut vehicles, &route, None, DepartPos::Base, DepartSpeed::Max);
        let placement = depart_placement(&net, &vehicles, &vehicles[id], 1.0).unwrap();
        let cf = vehicles[id].cf_model();
        // 40 - 5 - 5 - 2.5 metres to the standing leader
        assert!(cf.brake_gap(placement.speed) <= 27.5 + 1e-9);
        assert!(placement.speed > 0.0);

        let given = spawn(&mut vehicles, &route, None, DepartPos::Base, DepartSpeed::Given(19.0));
        assert!(depart_placement(&net, &vehicles, &vehicles[given], 1.0).is_none());
    }

    #[test]
    fn follower_needs_room() {
        let (mut net, edges) = corridor(&[200.0, 100.0], 20.0);
        let lane = net.edge(edges[0]).lanes()[0];
        let route = Rc::new(Route::from_edges(edges.clone()));
        let mut vehicles = VehicleSet::with_key();
        let follower = spawn(&mut vehicles, &route, Some((lane, 20.0, 15.0)), DepartPos::Base, DepartSpeed::Zero);
        net.lanes[lane].insert_vehicle(&vehicles, follower);

        // the follower needs 15 + 25 = 40 m to stop, so a standing vehicle 30 m ahead is unsafe
        let id = spawn(&mut vehicles, &route, None, DepartPos::Given(57.5), DepartSpeed::Zero);
        assert!(depart_placement(&net, &vehicles, &vehicles[id], 1.0).is_none());
        let fast = spawn(&mut vehicles, &route, None, DepartPos::Given(57.5), DepartSpeed::Max);
        let placement = depart_placement(&net, &vehicles, &vehicles[fast], 1.0).unwrap();
        assert!(placement.speed > 0.0);
    }

    #[test]
    fn free_insertion_behind_queue() {
        let (mut net, edges) = corridor(&[100.0, 100.0], 10.0);
        let lane = net.edge(edges[0]).lanes()[0];
        let route = Rc::new(Route::from_edges(edges.clone()));
        let mut vehicles = VehicleSet::with_key();
        let first = spawn(&mut vehicles, &route, Some((lane, 100.0, 0.0)), DepartPos::Base, DepartSpeed::Zero);
        let second = spawn(&mut vehicles, &route, Some((lane, 7.0, 0.0)), DepartPos::Base, DepartSpeed::Zero);
        net.lanes[lane].insert_vehicle(&vehicles, first);
        net.lanes[lane].insert_vehicle(&vehicles, second);

        let id = spawn(&mut vehicles, &route, None, DepartPos::Free, DepartSpeed::Zero);
        let placement = free_insertion(&net, &vehicles, &vehicles[id], lane, 1.0).unwrap();
        // directly behind the front vehicle, the start of the lane is taken
        assert_eq!(placement.pos, 92.5);
        assert_eq!(placement.speed, 0.0);
    }
}
