//! Error types.

use thiserror::Error;

/// A malformed network description.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NetworkError {
    #[error("duplicate {kind} id `{id}`")]
    DuplicateId { kind: &'static str, id: String },
    #[error("unknown {kind} `{id}`")]
    UnknownId { kind: &'static str, id: String },
    #[error("lane `{lane}` has invalid length {length}")]
    InvalidLength { lane: String, length: f64 },
    #[error("lane `{lane}` has invalid speed limit {speed}")]
    InvalidSpeed { lane: String, speed: f64 },
    #[error("lane shape of `{0}` needs at least two distinct points")]
    InvalidShape(String),
    #[error("junction `{junction}` has no link with index {index}")]
    InvalidFoe { junction: String, index: usize },
    #[error("traffic light `{light}` has no signal with index {index}")]
    InvalidSignal { light: String, index: usize },
    #[error("junction `{0}` is signalised but has no traffic light")]
    MissingTrafficLight(String),
    #[error("traffic light `{0}` has no phases")]
    EmptyProgram(String),
    #[error("traffic light `{light}` phase {phase} has {found} signals, expected {expected}")]
    StateLength {
        light: String,
        phase: usize,
        expected: usize,
        found: usize,
    },
    #[error("invalid signal state character `{0}`")]
    InvalidState(char),
    #[error("traffic light `{light}` phase {phase} has invalid duration")]
    InvalidDuration { light: String, phase: usize },
    #[error("link {index} of junction `{junction}` cannot be its own foe")]
    SelfFoe { junction: String, index: usize },
    #[error("junction `{0}` is unregulated and cannot have foe links")]
    UnregulatedFoes(String),
    #[error("link from `{from}` to `{to}` does not start where it ends")]
    InvalidLink { from: String, to: String },
}

/// A malformed route, trip or vehicle definition.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("duplicate vehicle id `{0}`")]
    DuplicateVehicle(String),
    #[error("duplicate vehicle type `{0}`")]
    DuplicateType(String),
    #[error("duplicate route id `{0}`")]
    DuplicateRoute(String),
    #[error("vehicle `{vehicle}` refers to unknown vehicle type `{vtype}`")]
    UnknownType { vehicle: String, vtype: String },
    #[error("unknown route `{0}`")]
    UnknownRoute(String),
    #[error("unknown edge `{0}`")]
    UnknownEdge(String),
    #[error("route `{0}` is empty")]
    EmptyRoute(String),
    #[error("edge `{from}` is not connected to edge `{to}`")]
    Disconnected { from: String, to: String },
    #[error("no route from `{from}` to `{to}`")]
    NoRoute { from: String, to: String },
    #[error("vehicle `{vehicle}` has invalid departure: {reason}")]
    InvalidDeparture { vehicle: String, reason: &'static str },
    #[error("vehicle type `{vtype}` has invalid parameter `{param}`")]
    InvalidType { vtype: String, param: &'static str },
    #[error("line {line}: {source}")]
    #[cfg(feature = "serde")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A rejected remote-control command. Simulation state is left unchanged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    #[error("unknown vehicle `{0}`")]
    UnknownVehicle(String),
    #[error("unknown traffic light `{0}`")]
    UnknownTrafficLight(String),
    #[error("unknown lane `{0}`")]
    UnknownLane(String),
    #[error("unknown edge `{0}`")]
    UnknownEdge(String),
    #[error("vehicle `{0}` is not running")]
    NotRunning(String),
    #[error("traffic light `{light}` has no phase {phase}")]
    InvalidPhase { light: String, phase: usize },
    #[error("new route of `{0}` does not start at its current edge")]
    RouteMismatch(String),
    #[error("edge `{to}` is unreachable from `{from}`")]
    Unreachable { from: String, to: String },
    #[error("invalid value {0}")]
    InvalidValue(f64),
    #[error("vehicle `{0}` is rejected: {1}")]
    Rejected(String, String),
}

/// Any error raised by the simulator.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(&'static str),
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
    #[error("load error: {0}")]
    Load(#[from] LoadError),
    #[error("command error: {0}")]
    Command(#[from] CommandError),
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
