use crate::{EdgeId, LaneId};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A road segment between two junctions, made up of parallel lanes.
#[derive(Clone, Debug)]
pub struct Edge {
    /// The edge ID.
    id: EdgeId,
    /// The external name of the edge.
    name: String,
    /// The function of the edge.
    function: EdgeFunction,
    /// The lanes of the edge, right-most first.
    lanes: Vec<LaneId>,
}

/// The attributes of an edge.
pub struct EdgeAttributes<'a> {
    /// The external name.
    pub name: &'a str,
    /// The function of the edge.
    pub function: EdgeFunction,
}

/// The role of an edge in the network.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EdgeFunction {
    /// A regular road.
    #[default]
    Normal,
    /// A lane stretch inside a junction.
    Internal,
}

impl Edge {
    pub(crate) fn new(id: EdgeId, attribs: &EdgeAttributes) -> Self {
        Self {
            id,
            name: attribs.name.to_string(),
            function: attribs.function,
            lanes: vec![],
        }
    }

    /// Gets the edge ID.
    pub fn id(&self) -> EdgeId {
        self.id
    }

    /// Gets the external name of the edge.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the function of the edge.
    pub fn function(&self) -> EdgeFunction {
        self.function
    }

    /// Gets the lanes of the edge, right-most first.
    pub fn lanes(&self) -> &[LaneId] {
        &self.lanes
    }

    pub(crate) fn add_lane(&mut self, lane: LaneId) {
        self.lanes.push(lane);
    }
}
