//! A microscopic road traffic simulator.
//!
//! Vehicles advance along lanes in fixed time steps, following their leaders
//! with a pluggable car-following model, crossing junctions only when the
//! junction grants them a link, and obeying traffic-light phases. Stuck
//! vehicles are teleported past blockages so the simulation never deadlocks.

pub use cgmath;
pub use command::Command;
pub use config::{RoutingConfig, SimulationConfig};
pub use control::Statistics;
pub use edge::{Edge, EdgeAttributes, EdgeFunction};
pub use error::{CommandError, Error, LoadError, NetworkError, Result};
pub use junction::{Junction, JunctionAttributes, JunctionKind};
pub use lane::{Lane, LaneAttributes};
pub use light::{AgentParams, LogicKind, Phase, TrafficLightLogic};
pub use link::{Link, LinkAttributes, LinkPriority, LinkState};
pub use loader::{
    DepartLane, DepartPos, DepartSpeed, RouteDefinition, RouteItem, RouteSource, RouteSpec,
    VecSource, VehicleDefinition,
};
#[cfg(feature = "serde")]
pub use loader::JsonLinesSource;
pub use network::Network;
#[cfg(feature = "serde")]
pub use network::NetworkDescription;
pub use output::{OutputSink, StepOutput, SummaryCollector, SummaryRow, VehicleRecord};
#[cfg(feature = "serde")]
pub use output::JsonLinesWriter;
pub use query::{JunctionInfo, LaneInfo, LinkInfo, TrafficLightInfo, VehicleInfo};
pub use route::Route;
pub use simulation::{Simulation, SimulationState};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use util::Interval;
pub use vehicle::{CarFollowModel, CarFollowing, Idm, Krauss, KraussOrig1, Vehicle, VehicleState, VehicleType};

mod command;
mod config;
mod control;
mod edge;
mod error;
mod insertion;
mod junction;
mod lane;
mod light;
mod link;
mod loader;
pub mod math;
mod movement;
mod network;
mod output;
mod query;
mod route;
mod simulation;
mod transfer;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of an [Edge].
    pub struct EdgeId;
    /// Unique ID of a [Lane].
    pub struct LaneId;
    /// Unique ID of a [Link].
    pub struct LinkId;
    /// Unique ID of a [Junction].
    pub struct JunctionId;
    /// Unique ID of a [TrafficLightLogic].
    pub struct TrafficLightId;
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type EdgeSet = SlotMap<EdgeId, Edge>;
type LaneSet = SlotMap<LaneId, Lane>;
type LinkSet = SlotMap<LinkId, Link>;
type JunctionSet = SlotMap<JunctionId, Junction>;
type LightSet = SlotMap<TrafficLightId, TrafficLightLogic>;
type VehicleSet = SlotMap<VehicleId, Vehicle>;
