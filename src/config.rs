//! Simulation-wide configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Global parameters of a simulation run, passed to [crate::Simulation::new].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimulationConfig {
    /// The length of one simulation step in s.
    pub step_length: f64,
    /// The simulation time of the first step in s.
    pub begin: f64,
    /// The time at which the run ends, if any.
    pub end: Option<f64>,
    /// The seed of every random number generator in the simulation.
    pub seed: u64,
    /// The waiting time in s after which a vehicle blocking a lane is teleported.
    /// `None` disables teleporting.
    pub time_to_teleport: Option<f64>,
    /// The time in s a vehicle may wait past its departure time before it is
    /// discarded. `None` keeps it waiting indefinitely.
    pub max_depart_delay: Option<f64>,
    /// Whether overlapping vehicles are detected and teleported.
    pub check_collisions: bool,
    /// How far ahead, in s, route definitions are loaded.
    /// `None` loads all definitions before the first step.
    pub route_steps: Option<f64>,
    /// The simulation halts once more vehicles than this are running.
    pub max_vehicles: Option<usize>,
    /// The periodic rerouting device.
    pub routing: RoutingConfig,
}

/// Parameters of the periodic rerouting device.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RoutingConfig {
    /// The rerouting period in s. `None` disables the device.
    pub period: Option<f64>,
    /// The share of vehicles equipped with the device, in `[0, 1]`.
    pub probability: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            step_length: 1.0,
            begin: 0.0,
            end: None,
            seed: 42,
            time_to_teleport: Some(300.0),
            max_depart_delay: None,
            check_collisions: true,
            route_steps: None,
            max_vehicles: None,
            routing: RoutingConfig::default(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            period: None,
            probability: 1.0,
        }
    }
}
