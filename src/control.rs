//! The vehicle population: building vehicles from their definitions,
//! inserting them when they are due, and retiring them.

use crate::config::RoutingConfig;
use crate::error::LoadError;
use crate::insertion::depart_placement;
use crate::loader::{DepartLane, DepartPos, DepartSpeed, VehicleDefinition};
use crate::network::Network;
use crate::route::Route;
use crate::vehicle::{Vehicle, VehicleParams, VehicleState, VehicleType, DEFAULT_VTYPE_ID};
use crate::{EdgeId, VehicleId, VehicleSet};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "serde")]
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

/// Departure times this close to the current time count as due.
const TIME_EPS: f64 = 1e-9;

/// Aggregate counts over the vehicle population.
///
/// Every departed vehicle is either running, arrived or removed. Loaded
/// vehicles that never departed are either still waiting or discarded.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Statistics {
    /// Vehicles built from their definitions.
    pub loaded: usize,
    /// Vehicles inserted into the network.
    pub departed: usize,
    /// Departed vehicles still in the simulation, including teleporting ones.
    pub running: usize,
    /// Vehicles that reached the end of their route.
    pub arrived: usize,
    /// Teleports started.
    pub teleports: usize,
    /// Collisions detected.
    pub collisions: usize,
    /// Vehicles dropped before departure.
    pub discarded: usize,
    /// Departed vehicles removed by command.
    pub removed: usize,
    /// The summed travel time of arrived vehicles in s.
    pub total_travel_time: f64,
    /// The summed delay between desired and actual departure in s.
    pub total_depart_delay: f64,
    /// The summed distance skipped by teleports of finished vehicles in m.
    pub teleported_distance: f64,
}

impl Statistics {
    /// Vehicles loaded but neither departed nor discarded.
    pub fn waiting(&self) -> usize {
        self.loaded - self.departed - self.discarded
    }

    /// The mean travel time of arrived vehicles.
    pub fn mean_travel_time(&self) -> Option<f64> {
        (self.arrived > 0).then(|| self.total_travel_time / self.arrived as f64)
    }

    /// The mean departure delay of departed vehicles.
    pub fn mean_depart_delay(&self) -> Option<f64> {
        (self.departed > 0).then(|| self.total_depart_delay / self.departed as f64)
    }
}

/// Owns every vehicle from loading until it leaves the simulation.
pub(crate) struct VehicleControl {
    pub vehicles: VehicleSet,
    vtypes: HashMap<String, Rc<VehicleType>>,
    /// Whether the default type was redefined.
    default_replaced: bool,
    names: HashMap<String, VehicleId>,
    /// Vehicles not yet departed, by desired departure time then load order.
    pending: VecDeque<VehicleId>,
    stats: Statistics,
    seed: u64,
    /// Draws speed factors and device equipment.
    rng: StdRng,
    routing: RoutingConfig,
}

impl VehicleControl {
    pub fn new(seed: u64, routing: RoutingConfig) -> Self {
        let mut vtypes = HashMap::new();
        vtypes.insert(DEFAULT_VTYPE_ID.to_string(), Rc::new(VehicleType::default()));
        Self {
            vehicles: VehicleSet::with_key(),
            vtypes,
            default_replaced: false,
            names: HashMap::new(),
            pending: VecDeque::new(),
            stats: Statistics::default(),
            seed,
            rng: StdRng::seed_from_u64(seed),
            routing,
        }
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut Statistics {
        &mut self.stats
    }

    /// Looks up a vehicle by name.
    pub fn vehicle_id(&self, name: &str) -> Option<VehicleId> {
        self.names.get(name).copied()
    }

    /// The number of vehicles waiting for their departure.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Registers a vehicle type. The default type may be redefined once.
    pub fn add_vehicle_type(&mut self, vtype: VehicleType) -> Result<(), LoadError> {
        vtype.validate()?;
        let is_default = vtype.name == DEFAULT_VTYPE_ID;
        if self.vtypes.contains_key(&vtype.name) && !(is_default && !self.default_replaced) {
            return Err(LoadError::DuplicateType(vtype.name));
        }
        self.default_replaced |= is_default;
        self.vtypes.insert(vtype.name.clone(), Rc::new(vtype));
        Ok(())
    }

    /// Builds a vehicle from its definition and schedules its departure.
    pub fn build_vehicle(
        &mut self,
        net: &Network,
        def: &VehicleDefinition,
        route: Rc<Route>,
    ) -> Result<VehicleId, LoadError> {
        if self.names.contains_key(&def.id) {
            return Err(LoadError::DuplicateVehicle(def.id.clone()));
        }
        let vtype = self.vtypes.get(&def.vtype).cloned().ok_or_else(|| LoadError::UnknownType {
            vehicle: def.id.clone(),
            vtype: def.vtype.clone(),
        })?;
        check_departure(net, def, &route, &vtype)?;

        let index = self.stats.loaded;
        let speed_factor = vtype.draw_speed_factor(&mut self.rng);
        let rerouting = self.routing.period.is_some() && self.rng.gen_bool(self.routing.probability.clamp(0.0, 1.0));
        let params = VehicleParams {
            name: def.id.clone(),
            index,
            vtype,
            route,
            depart: def.depart,
            depart_lane: def.depart_lane,
            depart_pos: def.depart_pos,
            depart_speed: def.depart_speed,
            speed_factor,
            rerouting,
            seed: self.seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15),
        };
        let id = self.vehicles.insert_with_key(|id| Vehicle::new(id, params));
        self.names.insert(def.id.clone(), id);

        let vehicles = &self.vehicles;
        let at = self.pending.partition_point(|other| vehicles[*other].depart() <= def.depart);
        self.pending.insert(at, id);
        self.stats.loaded += 1;
        Ok(id)
    }

    /// Inserts the pending vehicles that are due. A vehicle that finds no room
    /// keeps waiting, and so does every later vehicle departing from the same
    /// edge. Vehicles waiting longer than `max_depart_delay` are discarded.
    pub fn emit(&mut self, net: &mut Network, now: f64, dt: f64, max_depart_delay: Option<f64>) {
        let mut blocked: SmallVec<[EdgeId; 8]> = SmallVec::new();
        let mut waiting = VecDeque::new();

        while let Some(id) = self.pending.front().copied() {
            let veh = &self.vehicles[id];
            if veh.depart() > now + TIME_EPS {
                break;
            }
            self.pending.pop_front();
            let edge = veh.current_edge();
            let placement = if blocked.contains(&edge) {
                None
            } else {
                depart_placement(net, &self.vehicles, veh, dt)
            };

            match placement {
                Some(placement) => {
                    let delay = now - veh.depart();
                    let veh = &mut self.vehicles[id];
                    veh.set_location(placement.lane, placement.pos, placement.speed);
                    veh.set_departed(now);
                    net.lanes[placement.lane].insert_vehicle(&self.vehicles, id);
                    self.stats.departed += 1;
                    self.stats.running += 1;
                    self.stats.total_depart_delay += delay;
                    debug!("vehicle '{}' departed at {}", self.vehicles[id].name(), now);
                }
                None if max_depart_delay.map_or(false, |max| now - veh.depart() > max) => {
                    warn!(
                        "vehicle '{}' discarded, no insertion possible within {} s",
                        veh.name(),
                        now - veh.depart()
                    );
                    self.discard(id);
                }
                None => {
                    if !blocked.contains(&edge) {
                        blocked.push(edge);
                    }
                    waiting.push_back(id);
                }
            }
        }

        while let Some(id) = waiting.pop_back() {
            self.pending.push_front(id);
        }
    }

    /// Retires a vehicle that reached the end of its route. It must already
    /// have left its lane and released its links.
    pub fn arrive(&mut self, id: VehicleId, now: f64) {
        let Some(mut veh) = self.vehicles.remove(id) else {
            return;
        };
        veh.set_state(VehicleState::Arrived);
        self.names.remove(veh.name());
        self.stats.arrived += 1;
        self.stats.running -= 1;
        self.stats.total_travel_time += now - veh.depart_time().unwrap_or(now);
        self.stats.teleported_distance += veh.teleported_distance();
        debug!("vehicle '{}' arrived at {}", veh.name(), now);
    }

    /// Removes a vehicle. A running vehicle must already have left its lane and
    /// released its links; a teleporting one must have left the transfer.
    pub fn remove(&mut self, id: VehicleId) {
        let Some(veh) = self.vehicles.remove(id) else {
            return;
        };
        self.names.remove(veh.name());
        if veh.state() == VehicleState::Pending {
            self.pending.retain(|v| *v != id);
            self.stats.discarded += 1;
        } else {
            self.stats.running -= 1;
            self.stats.removed += 1;
            self.stats.teleported_distance += veh.teleported_distance();
        }
    }

    fn discard(&mut self, id: VehicleId) {
        if let Some(veh) = self.vehicles.remove(id) {
            self.names.remove(veh.name());
            self.stats.discarded += 1;
        }
    }
}

/// Rejects departure attributes that can never be satisfied on the first edge.
fn check_departure(net: &Network, def: &VehicleDefinition, route: &Route, vtype: &VehicleType) -> Result<(), LoadError> {
    let invalid = |reason| LoadError::InvalidDeparture {
        vehicle: def.id.clone(),
        reason,
    };
    let Some(first) = route.edge(0) else {
        return Err(LoadError::EmptyRoute(def.id.clone()));
    };
    if !def.depart.is_finite() {
        return Err(invalid("departure time is not finite"));
    }
    if let DepartLane::Given(idx) = def.depart_lane {
        if idx >= net.edge(first).lanes().len() {
            return Err(invalid("no such lane on the first edge"));
        }
    }
    if let DepartPos::Given(pos) = def.depart_pos {
        if pos.abs() > net.edge_length(first) {
            return Err(invalid("position beyond the first edge"));
        }
    }
    if let DepartSpeed::Given(speed) = def.depart_speed {
        if !(0.0..=vtype.max_speed).contains(&speed) {
            return Err(invalid("speed exceeds the vehicle's maximum"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::loader::RouteSpec;
    use crate::network::test::corridor;
    use crate::route::Route;

    fn definition(id: &str, depart: f64) -> VehicleDefinition {
        VehicleDefinition::new(id, depart, RouteSpec::edges(&["e0", "e1"]))
    }

    #[test]
    fn departs_in_order() {
        let (mut net, edges) = corridor(&[100.0, 100.0], 10.0);
        let route = Rc::new(Route::from_edges(edges.clone()));
        let mut control = VehicleControl::new(1, RoutingConfig::default());
        for (id, depart) in [("late", 5.0), ("a", 0.0), ("b", 0.0)] {
            control.build_vehicle(&net, &definition(id, depart), route.clone()).unwrap();
        }
        assert_eq!(control.stats().loaded, 3);
        assert!(matches!(
            control.build_vehicle(&net, &definition("a", 1.0), route.clone()),
            Err(LoadError::DuplicateVehicle(_))
        ));

        // only one vehicle fits at the start of the lane
        control.emit(&mut net, 0.0, 1.0, None);
        let a = control.vehicle_id("a").unwrap();
        assert_eq!(control.vehicles[a].state(), VehicleState::Running);
        assert_eq!(control.stats().departed, 1);
        assert_eq!(control.pending_len(), 2);

        let b = control.vehicle_id("b").unwrap();
        control.remove(b);
        assert_eq!(control.stats().discarded, 1);
        assert_eq!(control.stats().waiting(), 1);
    }

    #[test]
    fn discards_after_max_delay() {
        let (mut net, edges) = corridor(&[100.0, 100.0], 10.0);
        let route = Rc::new(Route::from_edges(edges.clone()));
        let mut control = VehicleControl::new(1, RoutingConfig::default());
        control.build_vehicle(&net, &definition("a", 0.0), route.clone()).unwrap();
        control.build_vehicle(&net, &definition("b", 0.0), route.clone()).unwrap();

        control.emit(&mut net, 0.0, 1.0, Some(2.0));
        control.emit(&mut net, 2.0, 1.0, Some(2.0));
        assert_eq!(control.stats().discarded, 0);
        control.emit(&mut net, 3.0, 1.0, Some(2.0));
        assert_eq!(control.stats().discarded, 1);
        assert!(control.vehicle_id("b").is_none());
        assert_eq!(control.pending_len(), 0);
    }

    #[test]
    fn arrival_statistics() {
        let (mut net, edges) = corridor(&[100.0], 10.0);
        let route = Rc::new(Route::from_edges(edges.clone()));
        let mut control = VehicleControl::new(1, RoutingConfig::default());
        let id = control.build_vehicle(&net, &definition("a", 2.0), route).unwrap();
        control.emit(&mut net, 1.0, 1.0, None);
        assert_eq!(control.stats().departed, 0);
        control.emit(&mut net, 2.0, 1.0, None);
        assert_eq!(control.stats().departed, 1);

        let lane = control.vehicles[id].lane().unwrap();
        net.lanes[lane].remove_vehicle(id);
        control.arrive(id, 12.0);
        let stats = control.stats();
        assert_eq!((stats.arrived, stats.running), (1, 0));
        assert_eq!(stats.mean_travel_time(), Some(10.0));
        assert_eq!(stats.mean_depart_delay(), Some(0.0));
        assert!(control.vehicle_id("a").is_none());
    }

    #[test]
    fn rejects_impossible_departures() {
        let (net, edges) = corridor(&[100.0, 100.0], 10.0);
        let route = Rc::new(Route::from_edges(edges.clone()));
        let mut control = VehicleControl::new(1, RoutingConfig::default());
        let mut def = definition("a", 0.0);
        def.depart_lane = DepartLane::Given(1);
        assert!(matches!(
            control.build_vehicle(&net, &def, route.clone()),
            Err(LoadError::InvalidDeparture { .. })
        ));
        let def = definition("b", 0.0).with_type("truck");
        assert!(matches!(
            control.build_vehicle(&net, &def, route.clone()),
            Err(LoadError::UnknownType { .. })
        ));
    }

    #[test]
    fn default_type_replaced_once() {
        let mut control = VehicleControl::new(1, RoutingConfig::default());
        let slow = VehicleType {
            max_speed: 5.0,
            ..VehicleType::default()
        };
        control.add_vehicle_type(slow.clone()).unwrap();
        assert!(matches!(control.add_vehicle_type(slow), Err(LoadError::DuplicateType(_))));
    }
}
