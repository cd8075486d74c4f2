use crate::math::{Point2d, Polyline, Vector2d};
use crate::{EdgeId, LaneId, LinkId, VehicleId, VehicleSet};
use smallvec::SmallVec;

/// Vehicles slower than this are considered to be halting, in m/s.
pub(crate) const HALTING_SPEED: f64 = 0.1;

/// A single-file drivable strip belonging to one edge.
#[derive(Clone, Debug)]
pub struct Lane {
    /// The lane ID.
    id: LaneId,
    /// The external name of the lane.
    name: String,
    /// The edge the lane belongs to.
    edge: EdgeId,
    /// The index of the lane within its edge, right-most is 0.
    index: usize,
    /// The length of the lane in m.
    length: f64,
    /// Speed limit in m/s.
    speed_limit: f64,
    /// Width in m.
    width: f64,
    /// The centre line of the lane.
    shape: Polyline,
    /// The vehicles on the lane, sorted by descending position (leader first).
    vehicles: Vec<VehicleId>,
    /// The links leaving the end of the lane.
    links_out: SmallVec<[LinkId; 4]>,
    /// The links entering the start of the lane.
    links_in: SmallVec<[LinkId; 4]>,
}

/// The attributes of a lane.
pub struct LaneAttributes<'a> {
    /// The external name.
    pub name: &'a str,
    /// The length of the lane in m.
    pub length: f64,
    /// The speed limit in m/s.
    pub speed_limit: f64,
    /// The width in m.
    pub width: f64,
    /// Points along the centre line. A straight line is used if empty.
    pub shape: &'a [Point2d],
}

impl Lane {
    pub(crate) fn new(id: LaneId, edge: EdgeId, index: usize, attribs: &LaneAttributes, shape: Polyline) -> Self {
        Self {
            id,
            name: attribs.name.to_string(),
            edge,
            index,
            length: attribs.length,
            speed_limit: attribs.speed_limit,
            width: attribs.width,
            shape,
            vehicles: vec![],
            links_out: SmallVec::new(),
            links_in: SmallVec::new(),
        }
    }

    /// Gets the lane ID.
    pub fn id(&self) -> LaneId {
        self.id
    }

    /// Gets the external name of the lane.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the edge the lane belongs to.
    pub fn edge(&self) -> EdgeId {
        self.edge
    }

    /// Gets the index of the lane within its edge.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Gets the length of the lane in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Gets the speed limit in m/s.
    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    /// Gets the width in m.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Gets the centre line of the lane.
    pub fn shape(&self) -> &Polyline {
        &self.shape
    }

    /// Gets the vehicles on the lane, leader first.
    pub fn vehicles(&self) -> &[VehicleId] {
        &self.vehicles
    }

    /// Gets the links leaving the lane.
    pub fn links_out(&self) -> &[LinkId] {
        &self.links_out
    }

    /// Gets the links entering the lane.
    pub fn links_in(&self) -> &[LinkId] {
        &self.links_in
    }

    /// The vehicle closest to the end of the lane.
    pub fn front_vehicle(&self) -> Option<VehicleId> {
        self.vehicles.first().copied()
    }

    /// The vehicle closest to the start of the lane.
    pub fn last_vehicle(&self) -> Option<VehicleId> {
        self.vehicles.last().copied()
    }

    /// Maps a position along the lane onto world coordinates and heading.
    pub fn world_pos(&self, pos: f64) -> (Point2d, Vector2d) {
        let scale = self.shape.length() / self.length;
        self.shape.sample(pos * scale)
    }

    /// The share of the lane covered by vehicles and their minimum gaps.
    pub fn occupancy(&self, vehicles: &VehicleSet) -> f64 {
        let used: f64 = self
            .vehicles
            .iter()
            .map(|id| {
                let vtype = vehicles[*id].vtype();
                vtype.length + vtype.min_gap
            })
            .sum();
        used / self.length
    }

    /// The mean speed of the vehicles on the lane, or the speed limit if it is empty.
    pub fn mean_speed(&self, vehicles: &VehicleSet) -> f64 {
        if self.vehicles.is_empty() {
            return self.speed_limit;
        }
        let sum: f64 = self.vehicles.iter().map(|id| vehicles[*id].speed()).sum();
        sum / self.vehicles.len() as f64
    }

    /// The number of halting vehicles on the lane.
    pub fn halting(&self, vehicles: &VehicleSet) -> usize {
        self.vehicles
            .iter()
            .filter(|id| vehicles[**id].speed() < HALTING_SPEED)
            .count()
    }

    pub(crate) fn set_speed_limit(&mut self, speed: f64) {
        self.speed_limit = speed;
    }

    pub(crate) fn add_link_out(&mut self, link: LinkId) {
        self.links_out.push(link);
    }

    pub(crate) fn add_link_in(&mut self, link: LinkId) {
        self.links_in.push(link);
    }

    /// Inserts the vehicle with the given ID into the lane, keeping the order.
    pub(crate) fn insert_vehicle(&mut self, vehicles: &VehicleSet, id: VehicleId) {
        let veh_pos = vehicles[id].pos();
        let idx = self
            .vehicles
            .iter()
            .position(|v| vehicles[*v].pos() < veh_pos)
            .unwrap_or(self.vehicles.len());
        self.vehicles.insert(idx, id);
    }

    /// Appends a vehicle without sorting. Call [Self::sort_vehicles] afterwards.
    pub(crate) fn push_vehicle(&mut self, id: VehicleId) {
        self.vehicles.push(id);
    }

    /// Removes the vehicle with the given ID from the lane.
    pub(crate) fn remove_vehicle(&mut self, id: VehicleId) {
        if let Some(idx) = self.vehicles.iter().position(|v| *v == id) {
            self.vehicles.remove(idx);
        }
    }

    /// Restores the descending position order after movement.
    pub(crate) fn sort_vehicles(&mut self, vehicles: &VehicleSet) {
        self.vehicles
            .sort_by(|a, b| vehicles[*b].pos().total_cmp(&vehicles[*a].pos()));
    }
}
