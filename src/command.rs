//! Remote-control commands and the queue of commands scheduled for later.

use crate::loader::VehicleDefinition;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scheduled times this close to the current time count as due.
const TIME_EPS: f64 = 1e-9;

/// A change to the simulation requested from outside. Commands are applied
/// between steps; see [crate::Simulation::execute].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "command", rename_all = "snake_case"))]
pub enum Command {
    /// Replaces the route of a vehicle. The new route must start with the
    /// vehicle's current edge.
    Reroute { vehicle: String, edges: Vec<String> },
    /// Sends a vehicle along the fastest route to a new destination edge.
    ChangeTarget { vehicle: String, edge: String },
    /// Switches a traffic light to the given phase.
    SetPhase { light: String, phase: usize },
    /// Sets the remaining duration of a traffic light's current phase.
    SetPhaseDuration { light: String, duration: f64 },
    /// Adds a vehicle to the simulation.
    InsertVehicle(VehicleDefinition),
    /// Removes a vehicle from the simulation.
    RemoveVehicle { vehicle: String },
    /// Changes the speed limit of a lane.
    SetLaneSpeed { lane: String, speed: f64 },
    /// Halts the simulation.
    Close,
}

/// A command waiting for its time.
#[derive(Clone, Debug)]
struct Scheduled {
    time: f64,
    command: Command,
}

/// Commands scheduled for execution at a later time, in time order.
/// Commands scheduled for the same time keep the order they were added in.
#[derive(Clone, Debug, Default)]
pub(crate) struct CommandQueue {
    queue: Vec<Scheduled>,
}

impl CommandQueue {
    pub fn push(&mut self, time: f64, command: Command) {
        let at = self.queue.partition_point(|s| s.time <= time);
        self.queue.insert(at, Scheduled { time, command });
    }

    /// Removes and returns the commands due at `time`.
    pub fn take_due(&mut self, time: f64) -> Vec<Command> {
        let due = self.queue.partition_point(|s| s.time <= time + TIME_EPS);
        self.queue.drain(..due).map(|s| s.command).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn schedule_speed(queue: &mut CommandQueue, time: f64, lane: &str) {
        queue.push(
            time,
            Command::SetLaneSpeed {
                lane: lane.to_string(),
                speed: time,
            },
        );
    }

    #[test]
    fn due_in_order() {
        let mut queue = CommandQueue::default();
        schedule_speed(&mut queue, 10.0, "b");
        schedule_speed(&mut queue, 5.0, "a");
        schedule_speed(&mut queue, 10.0, "c");
        assert!(queue.take_due(4.0).is_empty());

        let lanes = |cmds: Vec<Command>| -> Vec<String> {
            cmds.into_iter()
                .filter_map(|c| match c {
                    Command::SetLaneSpeed { lane, .. } => Some(lane),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(lanes(queue.take_due(5.0)), vec!["a"]);
        assert_eq!(lanes(queue.take_due(12.0)), vec!["b", "c"]);
        assert!(queue.take_due(f64::INFINITY).is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn parse_commands() {
        let cmd: Command = serde_json::from_str(r#"{ "command": "set_phase", "light": "tl", "phase": 2 }"#).unwrap();
        assert_eq!(
            cmd,
            Command::SetPhase {
                light: "tl".to_string(),
                phase: 2
            }
        );
        let cmd: Command = serde_json::from_str(
            r#"{ "command": "insert_vehicle", "id": "v", "depart": 3.0, "route": { "edges": ["a", "b"] } }"#,
        )
        .unwrap();
        match cmd {
            Command::InsertVehicle(def) => {
                assert_eq!(def.id, "v");
                assert_eq!(def.route, crate::loader::RouteSpec::edges(&["a", "b"]));
            }
            other => panic!("unexpected command {:?}", other),
        }
        let cmd: Command = serde_json::from_str(r#"{ "command": "close" }"#).unwrap();
        assert_eq!(cmd, Command::Close);
    }
}
