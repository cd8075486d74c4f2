//! Recovery from gridlock: vehicles stuck for too long are taken off the road
//! and moved along their route until there is room to put them back.

use crate::insertion::{free_insertion, least_occupied};
use crate::network::Network;
use crate::vehicle::VehicleState;
use crate::{VehicleId, VehicleSet};
use log::{debug, warn};

/// Teleporting vehicles move on virtually at no less than this speed.
const MIN_TELEPORT_SPEED: f64 = 1.0; // m/s

/// A vehicle held by the transfer.
#[derive(Clone, Copy, Debug)]
struct Held {
    vehicle: VehicleId,
    /// The time at which the vehicle moves on to the next edge of its route
    /// if it could not be inserted by then.
    proceed_time: f64,
}

/// The vehicles currently teleporting.
#[derive(Default)]
pub(crate) struct VehicleTransfer {
    held: Vec<Held>,
}

impl VehicleTransfer {
    /// The number of teleporting vehicles.
    pub fn len(&self) -> usize {
        self.held.len()
    }

    #[cfg(test)]
    pub fn contains(&self, vehicle: VehicleId) -> bool {
        self.held.iter().any(|h| h.vehicle == vehicle)
    }

    /// Takes a running vehicle off its lane, releasing its links, and moves it
    /// virtually onto the next edge of its route.
    /// Returns `true` if the route is exhausted, in which case the vehicle
    /// arrives instead of being held.
    pub fn add(&mut self, net: &mut Network, vehicles: &mut VehicleSet, id: VehicleId, now: f64, reason: &str) -> bool {
        let veh = &mut vehicles[id];
        let skipped = match veh.lane() {
            Some(lane) => {
                net.lanes[lane].remove_vehicle(id);
                warn!(
                    "teleporting vehicle '{}'; {}, lane '{}', time {}",
                    veh.name(),
                    reason,
                    net.lane(lane).name(),
                    now
                );
                (net.lane(lane).length() - veh.pos()).max(0.0)
            }
            None => 0.0,
        };
        for link in veh.take_reservations() {
            net.links[link].remove_holder(id);
        }
        veh.start_teleport(skipped);
        if veh.on_last_edge() {
            return true;
        }
        veh.skip_edge(0.0);
        let proceed_time = now + proceed_duration(net, vehicles, id);
        self.held.push(Held { vehicle: id, proceed_time });
        false
    }

    /// Tries to put every held vehicle back onto the road. Vehicles that found
    /// no room and whose proceed time has passed move on to the next edge.
    /// Returns the vehicles that ran out of route while teleporting.
    pub fn check_insertions(&mut self, net: &mut Network, vehicles: &mut VehicleSet, now: f64, dt: f64) -> Vec<VehicleId> {
        let mut arrived = vec![];
        let mut still_held = Vec::with_capacity(self.held.len());

        for mut held in std::mem::take(&mut self.held) {
            let id = held.vehicle;
            let veh = &vehicles[id];
            let edge = veh.current_edge();
            let mut lanes = net.continuing_lanes(edge, veh.next_edge());
            if lanes.is_empty() {
                lanes.extend_from_slice(net.edge(edge).lanes());
            }
            let placement = least_occupied(net, vehicles, &lanes)
                .and_then(|lane| free_insertion(net, vehicles, veh, lane, dt));

            if let Some(placement) = placement {
                vehicles[id].set_location(placement.lane, placement.pos, placement.speed);
                net.lanes[placement.lane].insert_vehicle(vehicles, id);
                warn!(
                    "vehicle '{}' ends teleporting on lane '{}', time {}",
                    vehicles[id].name(),
                    net.lane(placement.lane).name(),
                    now
                );
                continue;
            }

            if now >= held.proceed_time {
                let length = net.edge_length(edge);
                if veh.on_last_edge() {
                    debug!("vehicle '{}' arrives while teleporting", veh.name());
                    vehicles[id].add_teleported_distance(length);
                    arrived.push(id);
                    continue;
                }
                vehicles[id].skip_edge(length);
                held.proceed_time = now + proceed_duration(net, vehicles, id);
            }
            still_held.push(held);
        }

        self.held = still_held;
        arrived
    }

    /// Gives up a held vehicle, e.g. when it is removed from the simulation.
    pub fn remove(&mut self, vehicle: VehicleId) -> bool {
        let before = self.held.len();
        self.held.retain(|h| h.vehicle != vehicle);
        self.held.len() != before
    }
}

/// The time a teleporting vehicle spends on its current edge.
fn proceed_duration(net: &Network, vehicles: &VehicleSet, id: VehicleId) -> f64 {
    let veh = &vehicles[id];
    debug_assert_eq!(veh.state(), VehicleState::Teleporting);
    net.edge_travel_time(veh.current_edge(), vehicles, MIN_TELEPORT_SPEED)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::test::corridor;
    use crate::route::Route;
    use crate::vehicle::test::spawn;
    use crate::vehicle::VehicleType;
    use std::rc::Rc;

    #[test]
    fn reinserts_on_next_edge() {
        let (mut net, edges) = corridor(&[100.0, 100.0, 100.0], 10.0);
        let lanes: Vec<_> = edges.iter().map(|e| net.edge(*e).lanes()[0]).collect();
        let route = Rc::new(Route::from_edges(edges.clone()));
        let mut vehicles = VehicleSet::with_key();
        let id = spawn(&mut vehicles, &Rc::new(VehicleType::new("car")), &route);
        vehicles[id].set_location(lanes[0], 60.0, 0.0);
        net.lanes[lanes[0]].insert_vehicle(&vehicles, id);

        let mut transfer = VehicleTransfer::default();
        assert!(!transfer.add(&mut net, &mut vehicles, id, 10.0, "wrong lane"));
        assert!(net.lane(lanes[0]).vehicles().is_empty());
        assert_eq!(vehicles[id].state(), VehicleState::Teleporting);
        assert_eq!(vehicles[id].route_index(), 1);
        assert_eq!(vehicles[id].teleported_distance(), 40.0);

        assert!(transfer.check_insertions(&mut net, &mut vehicles, 11.0, 1.0).is_empty());
        assert_eq!(transfer.len(), 0);
        let veh = &vehicles[id];
        assert_eq!(veh.state(), VehicleState::Running);
        assert_eq!(veh.lane(), Some(lanes[1]));
        assert_eq!(veh.pos(), 5.0);
        assert_eq!(net.lane(lanes[1]).vehicles(), &[id]);
    }

    #[test]
    fn moves_on_while_blocked() {
        let (mut net, edges) = corridor(&[20.0, 20.0], 10.0);
        let lanes: Vec<_> = edges.iter().map(|e| net.edge(*e).lanes()[0]).collect();
        let route = Rc::new(Route::from_edges(edges.clone()));
        let vtype = Rc::new(VehicleType::new("car"));
        let mut vehicles = VehicleSet::with_key();

        // fill the second edge with standing vehicles
        for pos in [20.0, 10.0] {
            let blocker = spawn(&mut vehicles, &vtype, &route);
            vehicles[blocker].set_location(lanes[1], pos, 0.0);
            net.lanes[lanes[1]].insert_vehicle(&vehicles, blocker);
        }
        let id = spawn(&mut vehicles, &vtype, &route);
        vehicles[id].set_location(lanes[0], 20.0, 0.0);
        net.lanes[lanes[0]].insert_vehicle(&vehicles, id);

        let mut transfer = VehicleTransfer::default();
        assert!(!transfer.add(&mut net, &mut vehicles, id, 0.0, "jam"));
        assert!(transfer.contains(id));

        // 20 m at the mean speed of zero, raised to 1 m/s
        assert!(transfer.check_insertions(&mut net, &mut vehicles, 1.0, 1.0).is_empty());
        assert!(transfer.contains(id));
        assert_eq!(transfer.check_insertions(&mut net, &mut vehicles, 20.0, 1.0), vec![id]);
        assert_eq!(transfer.len(), 0);
        assert_eq!(vehicles[id].teleported_distance(), 20.0);
    }
}
