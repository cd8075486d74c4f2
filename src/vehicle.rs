use crate::loader::{DepartLane, DepartPos, DepartSpeed};
use crate::route::Route;
use crate::{EdgeId, LaneId, LinkId, VehicleId};
pub use cfmodel::{CarFollowModel, CarFollowing, Idm, Krauss, KraussOrig1};
use rand::rngs::StdRng;
use rand::SeedableRng;
#[cfg(feature = "serde")]
use serde::Serialize;
use smallvec::SmallVec;
use std::rc::Rc;
pub use vtype::{VehicleType, DEFAULT_VTYPE_ID};

mod cfmodel;
mod idm;
mod vtype;

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID.
    id: VehicleId,
    /// The external name.
    name: String,
    /// The order in which the vehicle was loaded.
    index: usize,
    /// The type of the vehicle.
    vtype: Rc<VehicleType>,
    /// The route the vehicle follows.
    route: Rc<Route>,
    /// The index of the current edge within the route.
    route_index: usize,
    /// The lane the vehicle is on, if it is running.
    lane: Option<LaneId>,
    /// The position of the vehicle's front along its lane in m.
    pos: f64,
    /// Velocity in m/s.
    speed: f64,
    /// Acceleration of the last step in m/s<sup>2</sup>.
    accel: f64,
    /// The individual factor applied to lane speed limits.
    speed_factor: f64,
    /// The lifecycle state.
    state: VehicleState,
    /// The desired departure time in s.
    depart: f64,
    /// The actual departure time in s.
    depart_time: Option<f64>,
    pub(crate) depart_lane: DepartLane,
    pub(crate) depart_pos: DepartPos,
    pub(crate) depart_speed: DepartSpeed,
    /// The time the vehicle has been halting without interruption, in s.
    waiting_time: f64,
    /// The distance driven in m.
    distance: f64,
    /// The number of times the vehicle was teleported.
    teleports: u32,
    /// The distance skipped while teleporting, in m.
    teleported_distance: f64,
    /// Links the vehicle may cross or has not yet cleared.
    reservations: SmallVec<[Reservation; 2]>,
    /// Whether the vehicle is equipped with the rerouting device.
    rerouting: bool,
    /// The time of the last periodic reroute.
    last_reroute: f64,
    /// The vehicle's own random number generator.
    rng: StdRng,
}

/// The lifecycle state of a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum VehicleState {
    /// Loaded, but not yet inserted into the network.
    Pending,
    /// Driving on a lane.
    Running,
    /// Held by the vehicle transfer.
    Teleporting,
    /// Reached the end of its route.
    Arrived,
}

/// A link a vehicle has been granted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Reservation {
    pub link: LinkId,
    /// The route index of the edge the link leads onto.
    pub target: usize,
}

/// The parameters needed to build a vehicle.
pub(crate) struct VehicleParams {
    pub name: String,
    pub index: usize,
    pub vtype: Rc<VehicleType>,
    pub route: Rc<Route>,
    pub depart: f64,
    pub depart_lane: DepartLane,
    pub depart_pos: DepartPos,
    pub depart_speed: DepartSpeed,
    pub speed_factor: f64,
    pub rerouting: bool,
    pub seed: u64,
}

impl Vehicle {
    pub(crate) fn new(id: VehicleId, params: VehicleParams) -> Self {
        Self {
            id,
            name: params.name,
            index: params.index,
            vtype: params.vtype,
            route: params.route,
            route_index: 0,
            lane: None,
            pos: 0.0,
            speed: 0.0,
            accel: 0.0,
            speed_factor: params.speed_factor,
            state: VehicleState::Pending,
            depart: params.depart,
            depart_time: None,
            depart_lane: params.depart_lane,
            depart_pos: params.depart_pos,
            depart_speed: params.depart_speed,
            waiting_time: 0.0,
            distance: 0.0,
            teleports: 0,
            teleported_distance: 0.0,
            reservations: SmallVec::new(),
            rerouting: params.rerouting,
            last_reroute: params.depart,
            rng: StdRng::seed_from_u64(params.seed),
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// Gets the external name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The order in which the vehicle was loaded.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Gets the vehicle type.
    pub fn vtype(&self) -> &VehicleType {
        &self.vtype
    }

    /// Gets the car-following model.
    pub fn cf_model(&self) -> &CarFollowModel {
        &self.vtype.cf_model
    }

    /// Gets the route.
    pub fn route(&self) -> &Rc<Route> {
        &self.route
    }

    /// Gets the index of the current edge within the route.
    pub fn route_index(&self) -> usize {
        self.route_index
    }

    /// The edge the vehicle is on, or is about to enter.
    pub fn current_edge(&self) -> EdgeId {
        self.route.edges()[self.route_index]
    }

    /// The edge after the current one, if any.
    pub fn next_edge(&self) -> Option<EdgeId> {
        self.route.edge(self.route_index + 1)
    }

    /// Whether the current edge is the last one of the route.
    pub fn on_last_edge(&self) -> bool {
        self.route_index + 1 >= self.route.len()
    }

    /// Gets the lane the vehicle is on.
    pub fn lane(&self) -> Option<LaneId> {
        self.lane
    }

    /// The position of the vehicle's front along its lane.
    pub fn pos(&self) -> f64 {
        self.pos
    }

    /// The position of the vehicle's rear along its lane.
    pub fn rear(&self) -> f64 {
        self.pos - self.vtype.length
    }

    /// Gets the vehicle's velocity.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Gets the vehicle's acceleration during the last step.
    pub fn accel(&self) -> f64 {
        self.accel
    }

    /// The individual factor applied to lane speed limits.
    pub fn speed_factor(&self) -> f64 {
        self.speed_factor
    }

    /// The speed the vehicle wants to drive at on a lane with the given limit.
    pub fn desired_speed(&self, speed_limit: f64) -> f64 {
        self.vtype.max_speed.min(speed_limit * self.speed_factor)
    }

    /// Gets the lifecycle state.
    pub fn state(&self) -> VehicleState {
        self.state
    }

    /// The desired departure time.
    pub fn depart(&self) -> f64 {
        self.depart
    }

    /// The actual departure time, once departed.
    pub fn depart_time(&self) -> Option<f64> {
        self.depart_time
    }

    /// The time the vehicle has been halting without interruption.
    pub fn waiting_time(&self) -> f64 {
        self.waiting_time
    }

    /// The distance driven.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// The number of times the vehicle was teleported.
    pub fn teleports(&self) -> u32 {
        self.teleports
    }

    /// The distance skipped while teleporting.
    pub fn teleported_distance(&self) -> f64 {
        self.teleported_distance
    }

    /// Whether the vehicle carries the rerouting device.
    pub fn has_rerouting(&self) -> bool {
        self.rerouting
    }

    pub(crate) fn last_reroute(&self) -> f64 {
        self.last_reroute
    }

    /// Whether the vehicle may cross the given link.
    pub(crate) fn holds(&self, link: LinkId) -> bool {
        self.reservations.iter().any(|r| r.link == link)
    }

    pub(crate) fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub(crate) fn add_reservation(&mut self, link: LinkId) {
        if !self.holds(link) {
            self.reservations.push(Reservation {
                link,
                target: self.route_index + 1,
            });
        }
    }

    /// Removes the reservations the vehicle has driven clear of,
    /// returning the links they were for.
    pub(crate) fn take_cleared_reservations(&mut self) -> SmallVec<[LinkId; 2]> {
        let (idx, rear) = (self.route_index, self.rear());
        let mut cleared = SmallVec::new();
        self.reservations.retain(|r| {
            let done = idx > r.target || (idx == r.target && rear >= 0.0);
            if done {
                cleared.push(r.link);
            }
            !done
        });
        cleared
    }

    /// Removes the reservations of links not yet crossed.
    pub(crate) fn take_pending_reservations(&mut self) -> SmallVec<[LinkId; 2]> {
        let idx = self.route_index;
        let mut pending = SmallVec::new();
        self.reservations.retain(|r| {
            if r.target > idx {
                pending.push(r.link);
                false
            } else {
                true
            }
        });
        pending
    }

    /// Gives up the reservation of a single link.
    pub(crate) fn release_reservation(&mut self, link: LinkId) {
        self.reservations.retain(|r| r.link != link);
    }

    /// Removes all reservations.
    pub(crate) fn take_reservations(&mut self) -> SmallVec<[LinkId; 2]> {
        self.reservations.drain(..).map(|r| r.link).collect()
    }

    /// The speed for the next step, given the safe speed and the speed limit.
    /// Driver imperfection is drawn from the vehicle's own generator.
    pub(crate) fn next_speed(&mut self, safe_speed: f64, max_speed: f64, dt: f64) -> f64 {
        self.vtype
            .cf_model
            .finalize_speed(self.speed, safe_speed, max_speed, &mut self.rng, dt)
    }

    /// Places the vehicle on a lane.
    pub(crate) fn set_location(&mut self, lane: LaneId, pos: f64, speed: f64) {
        self.lane = Some(lane);
        self.pos = pos;
        self.speed = speed;
        self.state = VehicleState::Running;
    }

    /// Takes the vehicle off its lane.
    pub(crate) fn clear_location(&mut self) {
        self.lane = None;
        self.speed = 0.0;
        self.accel = 0.0;
    }

    /// Applies the speed chosen for this step and moves the vehicle forward.
    pub(crate) fn apply_speed(&mut self, speed: f64, dt: f64, halting_speed: f64) {
        self.accel = (speed - self.speed) / dt;
        self.speed = speed;
        self.pos += speed * dt;
        self.distance += speed * dt;
        if speed < halting_speed {
            self.waiting_time += dt;
        } else {
            self.waiting_time = 0.0;
        }
    }

    /// Stops the vehicle at the given position.
    pub(crate) fn clip_to(&mut self, pos: f64) {
        self.distance -= self.pos - pos;
        self.pos = pos;
        self.speed = 0.0;
    }

    /// Moves the vehicle onto the next lane of its route.
    pub(crate) fn advance_lane(&mut self, lane: LaneId, pos: f64) {
        self.lane = Some(lane);
        self.pos = pos;
        self.route_index += 1;
    }

    pub(crate) fn set_departed(&mut self, time: f64) {
        self.depart_time = Some(time);
        self.waiting_time = 0.0;
    }

    pub(crate) fn set_state(&mut self, state: VehicleState) {
        self.state = state;
    }

    /// Starts a teleport: the vehicle leaves its lane and is moved virtually
    /// onto the next edge of its route.
    pub(crate) fn start_teleport(&mut self, skipped: f64) {
        self.clear_location();
        self.state = VehicleState::Teleporting;
        self.teleports += 1;
        self.teleported_distance += skipped;
        self.waiting_time = 0.0;
    }

    /// Moves a teleporting vehicle virtually onto the next edge.
    pub(crate) fn skip_edge(&mut self, skipped: f64) {
        self.route_index += 1;
        self.add_teleported_distance(skipped);
    }

    pub(crate) fn add_teleported_distance(&mut self, skipped: f64) {
        self.teleported_distance += skipped;
    }

    /// Replaces the route. The current edge must be the new route's first edge.
    pub(crate) fn replace_route(&mut self, route: Rc<Route>, time: f64) {
        let offset = self.route_index;
        for r in &mut self.reservations {
            r.target = r.target.saturating_sub(offset);
        }
        self.route = route;
        self.route_index = 0;
        self.last_reroute = time;
    }

    pub(crate) fn set_last_reroute(&mut self, time: f64) {
        self.last_reroute = time;
    }
}
