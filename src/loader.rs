//! Incremental loading of vehicle, route and vehicle type definitions.

use crate::error::LoadError;
use crate::vehicle::{VehicleType, DEFAULT_VTYPE_ID};
use log::debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Where on its first edge a vehicle departs.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DepartLane {
    /// The right-most lane.
    #[default]
    First,
    /// The least occupied lane continuing along the route.
    Free,
    /// The lane with the given index.
    Given(usize),
}

/// Where along its first lane a vehicle departs.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DepartPos {
    /// With its rear at the start of the lane.
    #[default]
    Base,
    /// The first gap that fits, searching from the back of the lane.
    Free,
    /// The given front position; negative values count from the lane end.
    Given(f64),
}

/// The speed a vehicle departs with.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DepartSpeed {
    /// Standing.
    #[default]
    Zero,
    /// The highest safe speed.
    Max,
    /// The given speed, which must be safe.
    Given(f64),
}

/// How a vehicle's route is given.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RouteSpec {
    /// An explicit sequence of edge names.
    Edges(Vec<String>),
    /// A previously defined route.
    Named(String),
    /// The fastest route between two edges, computed when loaded.
    Trip { from: String, to: String },
}

/// A vehicle to be inserted into the simulation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VehicleDefinition {
    /// The unique vehicle ID.
    pub id: String,
    /// The departure time in s.
    pub depart: f64,
    /// The vehicle type ID.
    #[cfg_attr(feature = "serde", serde(rename = "type", default = "default_vtype"))]
    pub vtype: String,
    pub route: RouteSpec,
    #[cfg_attr(feature = "serde", serde(default))]
    pub depart_lane: DepartLane,
    #[cfg_attr(feature = "serde", serde(default))]
    pub depart_pos: DepartPos,
    #[cfg_attr(feature = "serde", serde(default))]
    pub depart_speed: DepartSpeed,
}

/// A named route shared by several vehicles.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RouteDefinition {
    pub id: String,
    pub edges: Vec<String>,
}

/// One record of a route input stream.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RouteItem {
    VehicleType(VehicleType),
    Route(RouteDefinition),
    Vehicle(VehicleDefinition),
}

#[cfg(feature = "serde")]
fn default_vtype() -> String {
    DEFAULT_VTYPE_ID.to_string()
}

impl VehicleDefinition {
    /// Creates a definition of a default vehicle departing from the start of its route.
    pub fn new(id: &str, depart: f64, route: RouteSpec) -> Self {
        Self {
            id: id.to_string(),
            depart,
            vtype: DEFAULT_VTYPE_ID.to_string(),
            route,
            depart_lane: DepartLane::default(),
            depart_pos: DepartPos::default(),
            depart_speed: DepartSpeed::default(),
        }
    }

    /// Sets the vehicle type.
    pub fn with_type(mut self, vtype: &str) -> Self {
        self.vtype = vtype.to_string();
        self
    }
}

impl RouteSpec {
    /// An explicit route through the named edges.
    pub fn edges<S: AsRef<str>>(edges: &[S]) -> Self {
        Self::Edges(edges.iter().map(|e| e.as_ref().to_string()).collect())
    }
}

impl RouteItem {
    /// The departure time, for vehicle records.
    fn depart(&self) -> Option<f64> {
        match self {
            Self::Vehicle(veh) => Some(veh.depart),
            _ => None,
        }
    }
}

/// A stream of route records.
pub trait RouteSource {
    /// Reads the next record, or `None` once the stream is exhausted.
    fn next_item(&mut self) -> Result<Option<RouteItem>, LoadError>;
}

/// A route source backed by records in memory.
#[derive(Default)]
pub struct VecSource {
    items: VecDeque<RouteItem>,
}

impl From<Vec<RouteItem>> for VecSource {
    fn from(items: Vec<RouteItem>) -> Self {
        Self { items: items.into() }
    }
}

impl RouteSource for VecSource {
    fn next_item(&mut self) -> Result<Option<RouteItem>, LoadError> {
        Ok(self.items.pop_front())
    }
}

/// Reads one JSON record per line. Blank lines and lines starting with `#` are skipped.
#[cfg(feature = "serde")]
pub struct JsonLinesSource<R> {
    lines: std::io::Lines<R>,
    line: usize,
}

#[cfg(feature = "serde")]
impl JsonLinesSource<std::io::BufReader<std::fs::File>> {
    /// Opens a route file.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, LoadError> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(std::io::BufReader::new(file)))
    }
}

#[cfg(feature = "serde")]
impl<R: std::io::BufRead> JsonLinesSource<R> {
    /// Reads records from any buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

#[cfg(feature = "serde")]
impl<R: std::io::BufRead> RouteSource for JsonLinesSource<R> {
    fn next_item(&mut self) -> Result<Option<RouteItem>, LoadError> {
        for line in self.lines.by_ref() {
            let line = line?;
            self.line += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let item = serde_json::from_str(trimmed).map_err(|source| LoadError::Parse {
                line: self.line,
                source,
            })?;
            return Ok(Some(item));
        }
        Ok(None)
    }
}

/// Reads a single source up to a given departure time.
struct RouteLoader {
    source: Box<dyn RouteSource>,
    /// The departure time of the last vehicle read.
    last_depart: f64,
    /// Whether the source may hold further records.
    more: bool,
}

impl RouteLoader {
    /// Reads records until one departs after `time`. That record is
    /// returned as well, so no record is held back.
    fn load_until(&mut self, time: f64, out: &mut Vec<RouteItem>) -> Result<(), LoadError> {
        if !self.more || self.last_depart > time {
            return Ok(());
        }
        while let Some(item) = self.source.next_item()? {
            let depart = item.depart();
            out.push(item);
            if let Some(depart) = depart {
                if depart > time {
                    self.last_depart = depart;
                    return Ok(());
                }
            }
        }
        self.more = false;
        Ok(())
    }
}

/// Feeds definitions from all route sources into the simulation, reading only
/// a limited time ahead so that large demand files need not fit into memory.
pub(crate) struct RouteLoaderControl {
    loaders: Vec<RouteLoader>,
    /// How far ahead to read in s; `None` reads everything at once.
    in_advance: Option<f64>,
    /// The time up to which all sources have been read.
    loaded_until: f64,
}

impl RouteLoaderControl {
    pub fn new(in_advance: Option<f64>) -> Self {
        Self {
            loaders: vec![],
            in_advance,
            loaded_until: f64::NEG_INFINITY,
        }
    }

    /// Adds a source, to be read at the next call to [Self::load_next].
    pub fn add(&mut self, source: Box<dyn RouteSource>) {
        self.loaders.push(RouteLoader {
            source,
            last_depart: f64::NEG_INFINITY,
            more: true,
        });
        self.loaded_until = f64::NEG_INFINITY;
    }

    /// Reads the records needed up to `time` plus the look-ahead, unless that
    /// was done already.
    pub fn load_next(&mut self, time: f64) -> Result<Vec<RouteItem>, LoadError> {
        let mut items = vec![];
        if time < self.loaded_until {
            return Ok(items);
        }
        let until = self.in_advance.map_or(f64::INFINITY, |ahead| time + ahead);
        for loader in &mut self.loaders {
            loader.load_until(until, &mut items)?;
        }
        self.loaded_until = until;
        if !items.is_empty() {
            debug!("loaded {} route records up to t={}", items.len(), until);
        }
        Ok(items)
    }

    /// Whether any source may hold further records.
    pub fn has_more(&self) -> bool {
        self.loaders.iter().any(|l| l.more)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn vehicle(id: &str, depart: f64) -> RouteItem {
        RouteItem::Vehicle(VehicleDefinition::new(id, depart, RouteSpec::edges(&["a"])))
    }

    fn ids(items: &[RouteItem]) -> Vec<String> {
        items
            .iter()
            .filter_map(|item| match item {
                RouteItem::Vehicle(v) => Some(v.id.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn loads_in_advance() {
        let source = VecSource::from(vec![
            vehicle("a", 0.0),
            vehicle("b", 10.0),
            vehicle("c", 40.0),
            vehicle("d", 45.0),
            vehicle("e", 100.0),
        ]);
        let mut control = RouteLoaderControl::new(Some(20.0));
        control.add(Box::new(source));

        assert_eq!(ids(&control.load_next(0.0).unwrap()), vec!["a", "b", "c"]);
        assert!(control.load_next(5.0).unwrap().is_empty());
        assert!(control.load_next(20.0).unwrap().is_empty());
        assert_eq!(ids(&control.load_next(30.0).unwrap()), vec!["d", "e"]);
        assert!(control.has_more());
        assert!(control.load_next(90.0).unwrap().is_empty());
        assert!(control.load_next(110.0).unwrap().is_empty());
        assert!(!control.has_more());
    }

    #[test]
    fn loads_everything() {
        let source = VecSource::from(vec![vehicle("a", 0.0), vehicle("b", 1e6)]);
        let mut control = RouteLoaderControl::new(None);
        control.add(Box::new(source));
        assert_eq!(control.load_next(0.0).unwrap().len(), 2);
        assert!(!control.has_more());
        assert!(control.load_next(1.0).unwrap().is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_lines() {
        let text = r#"
# demand
{"vehicle_type": {"id": "car", "max_speed": 10.0, "car_following": {"model": "krauss", "sigma": 0.0}}}
{"route": {"id": "r0", "edges": ["a", "b"]}}
{"vehicle": {"id": "v0", "depart": 0, "route": {"named": "r0"}}}
{"vehicle": {"id": "v1", "depart": 5, "type": "car", "route": {"trip": {"from": "a", "to": "b"}}, "depart_speed": "max", "depart_pos": {"given": 20.0}}}
"#;
        let mut source = JsonLinesSource::new(text.as_bytes());
        let mut items = vec![];
        while let Some(item) = source.next_item().unwrap() {
            items.push(item);
        }
        assert_eq!(items.len(), 4);
        match &items[0] {
            RouteItem::VehicleType(vt) => {
                assert_eq!(vt.name, "car");
                assert_eq!(vt.max_speed, 10.0);
                assert_eq!(vt.length, 5.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &items[3] {
            RouteItem::Vehicle(v) => {
                assert_eq!(v.vtype, "car");
                assert_eq!(v.depart_speed, DepartSpeed::Max);
                assert_eq!(v.depart_pos, DepartPos::Given(20.0));
                assert_eq!(v.depart_lane, DepartLane::First);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &items[2] {
            RouteItem::Vehicle(v) => assert_eq!(v.vtype, DEFAULT_VTYPE_ID),
            other => panic!("unexpected {:?}", other),
        }

        let mut broken = JsonLinesSource::new("{\"vehicle\": 1}\n".as_bytes());
        assert!(matches!(broken.next_item(), Err(LoadError::Parse { line: 1, .. })));
    }
}
