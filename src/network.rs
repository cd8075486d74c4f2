use crate::edge::{Edge, EdgeAttributes};
use crate::error::NetworkError;
use crate::junction::{Junction, JunctionAttributes, JunctionKind};
use crate::lane::{Lane, LaneAttributes};
use crate::light::TrafficLightLogic;
use crate::link::{Link, LinkAttributes};
use crate::math::{Point2d, Polyline};
use crate::{
    EdgeId, EdgeSet, JunctionId, JunctionSet, LaneId, LaneSet, LightSet, LinkId, LinkSet, TrafficLightId, VehicleSet,
};
#[cfg(feature = "serde")]
pub use description::NetworkDescription;
use smallvec::SmallVec;
use std::collections::HashMap;

#[cfg(feature = "serde")]
mod description;

/// The road network: edges, lanes, the links between lanes, junctions and
/// traffic lights. Built once before the simulation starts.
#[derive(Default)]
pub struct Network {
    pub(crate) edges: EdgeSet,
    pub(crate) lanes: LaneSet,
    pub(crate) links: LinkSet,
    pub(crate) junctions: JunctionSet,
    pub(crate) lights: LightSet,
    edge_names: HashMap<String, EdgeId>,
    lane_names: HashMap<String, LaneId>,
    junction_names: HashMap<String, JunctionId>,
    light_names: HashMap<String, TrafficLightId>,
}

impl Network {
    /// Creates an empty network.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds an edge to the network.
    pub fn add_edge(&mut self, attribs: &EdgeAttributes) -> Result<EdgeId, NetworkError> {
        check_unique(&self.edge_names, "edge", attribs.name)?;
        let id = self.edges.insert_with_key(|id| Edge::new(id, attribs));
        self.edge_names.insert(attribs.name.to_string(), id);
        Ok(id)
    }

    /// Adds a lane to the left of the given edge's lanes.
    pub fn add_lane(&mut self, edge: EdgeId, attribs: &LaneAttributes) -> Result<LaneId, NetworkError> {
        check_unique(&self.lane_names, "lane", attribs.name)?;
        let index = self
            .edges
            .get(edge)
            .ok_or_else(|| unknown("edge", format!("{:?}", edge)))?
            .lanes()
            .len();
        if !(attribs.length > 0.0 && attribs.length.is_finite()) {
            return Err(NetworkError::InvalidLength {
                lane: attribs.name.to_string(),
                length: attribs.length,
            });
        }
        if !(attribs.speed_limit > 0.0 && attribs.speed_limit.is_finite()) {
            return Err(NetworkError::InvalidSpeed {
                lane: attribs.name.to_string(),
                speed: attribs.speed_limit,
            });
        }
        let shape = if attribs.shape.is_empty() {
            let offset = -(index as f64) * attribs.width;
            Polyline::straight(Point2d::new(0.0, offset), attribs.length)
        } else {
            Polyline::new(attribs.shape.to_vec()).ok_or_else(|| NetworkError::InvalidShape(attribs.name.to_string()))?
        };

        let id = self
            .lanes
            .insert_with_key(|id| Lane::new(id, edge, index, attribs, shape));
        self.edges[edge].add_lane(id);
        self.lane_names.insert(attribs.name.to_string(), id);
        Ok(id)
    }

    /// Adds a traffic light program to the network.
    pub fn add_traffic_light(&mut self, logic: TrafficLightLogic) -> Result<TrafficLightId, NetworkError> {
        check_unique(&self.light_names, "traffic light", logic.name())?;
        let name = logic.name().to_string();
        let id = self.lights.insert(logic);
        self.light_names.insert(name, id);
        Ok(id)
    }

    /// Adds a junction to the network.
    pub fn add_junction(&mut self, attribs: &JunctionAttributes) -> Result<JunctionId, NetworkError> {
        check_unique(&self.junction_names, "junction", attribs.name)?;
        match attribs.light {
            Some(light) if !self.lights.contains_key(light) => {
                return Err(unknown("traffic light", format!("{:?}", light)));
            }
            None if attribs.kind == JunctionKind::TrafficLight => {
                return Err(NetworkError::MissingTrafficLight(attribs.name.to_string()));
            }
            _ => {}
        }
        let id = self.junctions.insert_with_key(|id| Junction::new(id, attribs));
        self.junction_names.insert(attribs.name.to_string(), id);
        Ok(id)
    }

    /// Adds a link across a junction, from the end of one lane to the start of another.
    pub fn add_link(&mut self, junction: JunctionId, attribs: &LinkAttributes) -> Result<LinkId, NetworkError> {
        let jct = self
            .junctions
            .get(junction)
            .ok_or_else(|| unknown("junction", format!("{:?}", junction)))?;
        let from = self.lanes.get(attribs.from).ok_or_else(|| unknown("lane", format!("{:?}", attribs.from)))?;
        let to = self.lanes.get(attribs.to).ok_or_else(|| unknown("lane", format!("{:?}", attribs.to)))?;
        if from.edge() == to.edge() {
            return Err(NetworkError::InvalidLink {
                from: from.name().to_string(),
                to: to.name().to_string(),
            });
        }
        let light = jct.light();
        if let Some(signal) = attribs.signal {
            let light = light.ok_or_else(|| NetworkError::MissingTrafficLight(jct.name().to_string()))?;
            let logic = &self.lights[light];
            if signal >= logic.signal_count() {
                return Err(NetworkError::InvalidSignal {
                    light: logic.name().to_string(),
                    index: signal,
                });
            }
        }

        let index = self.links.len();
        let id = self
            .links
            .insert_with_key(|id| Link::new(id, index, junction, attribs, light));
        if let (Some(light), Some(signal)) = (light, attribs.signal) {
            self.lights[light].add_controlled_link(signal, id)?;
        }
        self.junctions[junction].add_link(id);
        self.lanes[attribs.from].add_link_out(id);
        self.lanes[attribs.to].add_link_in(id);
        Ok(id)
    }

    /// Specifies that two links may not be used at the same time.
    /// Unregulated junctions grant every request, so their links cannot have foes.
    pub fn add_foes(&mut self, a: LinkId, b: LinkId) -> Result<(), NetworkError> {
        for id in [a, b] {
            let link = self.links.get(id).ok_or_else(|| unknown("link", format!("{:?}", id)))?;
            let junction = &self.junctions[link.junction()];
            if junction.kind() == JunctionKind::Unregulated {
                return Err(NetworkError::UnregulatedFoes(junction.name().to_string()));
            }
        }
        if a == b {
            let link = &self.links[a];
            return Err(NetworkError::SelfFoe {
                junction: self.junctions[link.junction()].name().to_string(),
                index: link.index(),
            });
        }
        self.links[a].add_foe(b);
        self.links[b].add_foe(a);
        Ok(())
    }

    /// Gets a reference to the edge with the given ID.
    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    /// Gets a reference to the lane with the given ID.
    pub fn lane(&self, id: LaneId) -> &Lane {
        &self.lanes[id]
    }

    /// Gets a reference to the link with the given ID.
    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id]
    }

    /// Gets a reference to the junction with the given ID.
    pub fn junction(&self, id: JunctionId) -> &Junction {
        &self.junctions[id]
    }

    /// Gets a reference to the traffic light with the given ID.
    pub fn traffic_light(&self, id: TrafficLightId) -> &TrafficLightLogic {
        &self.lights[id]
    }

    /// Looks up an edge by name.
    pub fn edge_id(&self, name: &str) -> Option<EdgeId> {
        self.edge_names.get(name).copied()
    }

    /// Looks up a lane by name.
    pub fn lane_id(&self, name: &str) -> Option<LaneId> {
        self.lane_names.get(name).copied()
    }

    /// Looks up a junction by name.
    pub fn junction_id(&self, name: &str) -> Option<JunctionId> {
        self.junction_names.get(name).copied()
    }

    /// Looks up a traffic light by name.
    pub fn traffic_light_id(&self, name: &str) -> Option<TrafficLightId> {
        self.light_names.get(name).copied()
    }

    /// Returns an iterator over all the edges.
    pub fn iter_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Returns an iterator over all the lanes.
    pub fn iter_lanes(&self) -> impl Iterator<Item = &Lane> {
        self.lanes.values()
    }

    /// Returns an iterator over all the links.
    pub fn iter_links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Returns an iterator over all the junctions.
    pub fn iter_junctions(&self) -> impl Iterator<Item = &Junction> {
        self.junctions.values()
    }

    /// Returns an iterator over all the traffic lights.
    pub fn iter_traffic_lights(&self) -> impl Iterator<Item = (TrafficLightId, &TrafficLightLogic)> {
        self.lights.iter()
    }

    /// The length of an edge, taken from its first lane.
    pub fn edge_length(&self, edge: EdgeId) -> f64 {
        self.edges[edge]
            .lanes()
            .first()
            .map(|lane| self.lanes[*lane].length())
            .unwrap_or(0.0)
    }

    /// The highest speed limit on an edge.
    pub fn edge_speed_limit(&self, edge: EdgeId) -> f64 {
        self.edges[edge]
            .lanes()
            .iter()
            .map(|lane| self.lanes[*lane].speed_limit())
            .fold(0.0, f64::max)
    }

    /// The mean speed of the vehicles on an edge, or its speed limit if empty.
    pub fn edge_mean_speed(&self, edge: EdgeId, vehicles: &VehicleSet) -> f64 {
        let (sum, count) = self.edges[edge]
            .lanes()
            .iter()
            .flat_map(|lane| self.lanes[*lane].vehicles())
            .fold((0.0, 0), |(sum, count), id| (sum + vehicles[*id].speed(), count + 1));
        if count == 0 {
            self.edge_speed_limit(edge)
        } else {
            sum / count as f64
        }
    }

    /// The time needed to drive along an edge at the current mean speed.
    pub fn edge_travel_time(&self, edge: EdgeId, vehicles: &VehicleSet, min_speed: f64) -> f64 {
        self.edge_length(edge) / self.edge_mean_speed(edge, vehicles).max(min_speed)
    }

    /// The edges reachable directly from the end of an edge, in link order.
    pub fn successor_edges(&self, edge: EdgeId) -> SmallVec<[EdgeId; 4]> {
        let mut out = SmallVec::<[EdgeId; 4]>::new();
        for lane in self.edges[edge].lanes() {
            for link in self.lanes[*lane].links_out() {
                let next = self.lanes[self.links[*link].to()].edge();
                if !out.contains(&next) {
                    out.push(next);
                }
            }
        }
        out
    }

    /// Whether some lane of `from` links to some lane of `to`.
    pub fn edges_connected(&self, from: EdgeId, to: EdgeId) -> bool {
        self.successor_edges(from).contains(&to)
    }

    /// Checks that consecutive edges are connected. Returns the first
    /// disconnected pair otherwise.
    pub fn check_route(&self, edges: &[EdgeId]) -> Result<(), (EdgeId, EdgeId)> {
        match edges.windows(2).find(|pair| !self.edges_connected(pair[0], pair[1])) {
            Some(pair) => Err((pair[0], pair[1])),
            None => Ok(()),
        }
    }

    /// Chooses the link from `lane` onto the edge `next`, preferring a target
    /// lane that continues onto `after`.
    pub(crate) fn choose_link(&self, lane: LaneId, next: EdgeId, after: Option<EdgeId>) -> Option<LinkId> {
        let mut candidates = self.lanes[lane]
            .links_out()
            .iter()
            .copied()
            .filter(|link| self.lanes[self.links[*link].to()].edge() == next)
            .peekable();
        let first = *candidates.peek()?;
        let Some(after) = after else {
            return Some(first);
        };
        candidates
            .find(|link| self.lane_continues(self.links[*link].to(), after))
            .or(Some(first))
    }

    /// Whether the lane has a link onto the given edge.
    pub(crate) fn lane_continues(&self, lane: LaneId, next: EdgeId) -> bool {
        self.lanes[lane]
            .links_out()
            .iter()
            .any(|link| self.lanes[self.links[*link].to()].edge() == next)
    }

    /// The lanes of an edge a vehicle heading for `next` may use.
    pub(crate) fn continuing_lanes(&self, edge: EdgeId, next: Option<EdgeId>) -> SmallVec<[LaneId; 4]> {
        let lanes = self.edges[edge].lanes();
        match next {
            Some(next) => lanes.iter().copied().filter(|l| self.lane_continues(*l, next)).collect(),
            None => lanes.iter().copied().collect(),
        }
    }

    pub(crate) fn light_mut(&mut self, id: TrafficLightId) -> &mut TrafficLightLogic {
        &mut self.lights[id]
    }

    pub(crate) fn set_lane_speed(&mut self, lane: LaneId, speed: f64) {
        self.lanes[lane].set_speed_limit(speed);
    }
}

fn check_unique<K>(names: &HashMap<String, K>, kind: &'static str, name: &str) -> Result<(), NetworkError> {
    if names.contains_key(name) {
        return Err(NetworkError::DuplicateId {
            kind,
            id: name.to_string(),
        });
    }
    Ok(())
}

fn unknown(kind: &'static str, id: String) -> NetworkError {
    NetworkError::UnknownId { kind, id }
}
