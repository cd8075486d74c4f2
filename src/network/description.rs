//! A serialisable description of a network, as read from a network file.

use super::Network;
use crate::edge::{EdgeAttributes, EdgeFunction};
use crate::error::NetworkError;
use crate::junction::{JunctionAttributes, JunctionKind};
use crate::lane::LaneAttributes;
use crate::light::{LogicKind, Phase, TrafficLightLogic};
use crate::link::{LinkAttributes, LinkPriority};
use crate::math::Point2d;
use serde::{Deserialize, Serialize};

/// A complete network.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkDescription {
    #[serde(default)]
    pub traffic_lights: Vec<TrafficLightDescription>,
    pub edges: Vec<EdgeDescription>,
    #[serde(default)]
    pub junctions: Vec<JunctionDescription>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrafficLightDescription {
    pub id: String,
    #[serde(default = "static_program")]
    pub program: LogicKind,
    pub phases: Vec<PhaseDescription>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhaseDescription {
    pub duration: f64,
    pub state: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeDescription {
    pub id: String,
    #[serde(default)]
    pub function: EdgeFunction,
    pub lanes: Vec<LaneDescription>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LaneDescription {
    pub id: String,
    pub length: f64,
    pub speed: f64,
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default)]
    pub shape: Vec<[f64; 2]>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JunctionDescription {
    pub id: String,
    #[serde(default)]
    pub kind: JunctionKind,
    #[serde(default)]
    pub traffic_light: Option<String>,
    pub links: Vec<LinkDescription>,
}

/// A link of a junction. `foes` are indices into the junction's links.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkDescription {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub priority: LinkPriority,
    #[serde(default)]
    pub signal: Option<usize>,
    #[serde(default)]
    pub length: f64,
    #[serde(default)]
    pub foes: Vec<usize>,
}

fn static_program() -> LogicKind {
    LogicKind::Static
}

fn default_width() -> f64 {
    3.2
}

impl NetworkDescription {
    /// Parses a description from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Builds and validates the network.
    pub fn build(&self) -> Result<Network, NetworkError> {
        let mut net = Network::new();

        for tl in &self.traffic_lights {
            let phases = tl
                .phases
                .iter()
                .map(|p| {
                    let phase = Phase::new(p.duration, &p.state)?;
                    Ok(phase.with_bounds(p.min.unwrap_or(p.duration), p.max.unwrap_or(p.duration)))
                })
                .collect::<Result<Vec<_>, NetworkError>>()?;
            net.add_traffic_light(TrafficLightLogic::new(&tl.id, tl.program.clone(), phases)?)?;
        }

        for edge in &self.edges {
            let edge_id = net.add_edge(&EdgeAttributes {
                name: &edge.id,
                function: edge.function,
            })?;
            for lane in &edge.lanes {
                let shape = lane.shape.iter().map(|[x, y]| Point2d::new(*x, *y)).collect::<Vec<_>>();
                net.add_lane(
                    edge_id,
                    &LaneAttributes {
                        name: &lane.id,
                        length: lane.length,
                        speed_limit: lane.speed,
                        width: lane.width,
                        shape: &shape,
                    },
                )?;
            }
        }

        for jct in &self.junctions {
            let light = match &jct.traffic_light {
                Some(name) => Some(net.traffic_light_id(name).ok_or_else(|| NetworkError::UnknownId {
                    kind: "traffic light",
                    id: name.clone(),
                })?),
                None => None,
            };
            let junction = net.add_junction(&JunctionAttributes {
                name: &jct.id,
                kind: jct.kind,
                light,
            })?;
            let mut links = Vec::with_capacity(jct.links.len());
            for link in &jct.links {
                let lane = |name: &str| {
                    net.lane_id(name).ok_or_else(|| NetworkError::UnknownId {
                        kind: "lane",
                        id: name.to_string(),
                    })
                };
                let attribs = LinkAttributes {
                    from: lane(&link.from)?,
                    to: lane(&link.to)?,
                    priority: link.priority,
                    signal: link.signal,
                    length: link.length,
                };
                links.push(net.add_link(junction, &attribs)?);
            }
            for (idx, link) in jct.links.iter().enumerate() {
                for foe in &link.foes {
                    let foe = links.get(*foe).ok_or_else(|| NetworkError::InvalidFoe {
                        junction: jct.id.clone(),
                        index: *foe,
                    })?;
                    net.add_foes(links[idx], *foe)?;
                }
            }
        }

        Ok(net)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const CROSSING: &str = r#"{
        "traffic_lights": [
            { "id": "tl", "phases": [
                { "duration": 30, "state": "Gr" },
                { "duration": 5, "state": "yr" },
                { "duration": 30, "state": "rG" },
                { "duration": 5, "state": "ry" }
            ] }
        ],
        "edges": [
            { "id": "n", "lanes": [{ "id": "n_0", "length": 100, "speed": 13.9 }] },
            { "id": "w", "lanes": [{ "id": "w_0", "length": 100, "speed": 13.9 }] },
            { "id": "s", "lanes": [{ "id": "s_0", "length": 100, "speed": 13.9 }] },
            { "id": "e", "lanes": [{ "id": "e_0", "length": 100, "speed": 13.9 }] }
        ],
        "junctions": [
            { "id": "c", "kind": "traffic_light", "traffic_light": "tl", "links": [
                { "from": "n_0", "to": "s_0", "signal": 0, "foes": [1] },
                { "from": "w_0", "to": "e_0", "signal": 1, "foes": [0] }
            ] }
        ]
    }"#;

    #[test]
    fn build_crossing() {
        let net = NetworkDescription::from_json(CROSSING).unwrap().build().unwrap();
        let light = net.traffic_light_id("tl").unwrap();
        assert_eq!(net.traffic_light(light).controlled_links().len(), 2);
        let junction = net.junction(net.junction_id("c").unwrap());
        let [a, b] = [junction.links()[0], junction.links()[1]];
        assert_eq!(net.link(a).foes(), &[b]);
        assert_eq!(net.link(b).foes(), &[a]);
        assert_eq!(net.link(a).signal(), Some((light, 0)));
    }

    #[test]
    fn unknown_lane() {
        let mut desc = NetworkDescription::from_json(CROSSING).unwrap();
        desc.junctions[0].links[0].to = "nowhere".to_string();
        assert!(matches!(desc.build(), Err(NetworkError::UnknownId { kind: "lane", .. })));
    }

    #[test]
    fn foes_checked() {
        let mut desc = NetworkDescription::from_json(CROSSING).unwrap();
        desc.junctions[0].links[0].foes = vec![0];
        assert_eq!(
            desc.build().err(),
            Some(NetworkError::SelfFoe {
                junction: "c".to_string(),
                index: 0
            })
        );

        let mut desc = NetworkDescription::from_json(CROSSING).unwrap();
        desc.junctions[0].kind = JunctionKind::Unregulated;
        desc.junctions[0].traffic_light = None;
        for link in &mut desc.junctions[0].links {
            link.signal = None;
        }
        assert_eq!(desc.build().err(), Some(NetworkError::UnregulatedFoes("c".to_string())));
    }

    #[test]
    fn bad_signal_index() {
        let mut desc = NetworkDescription::from_json(CROSSING).unwrap();
        desc.junctions[0].links[1].signal = Some(7);
        assert!(matches!(desc.build(), Err(NetworkError::InvalidSignal { index: 7, .. })));
    }
}
