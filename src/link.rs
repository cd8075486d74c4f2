use crate::error::NetworkError;
use crate::{JunctionId, LaneId, LinkId, TrafficLightId, VehicleId};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A directed connection across a junction, from the end of one lane
/// to the start of another.
#[derive(Clone, Debug)]
pub struct Link {
    /// The link ID.
    id: LinkId,
    /// The creation index of the link, used to break ties between requests.
    index: usize,
    /// The junction the link belongs to.
    junction: JunctionId,
    /// The lane the link leaves.
    from: LaneId,
    /// The lane the link enters.
    to: LaneId,
    /// The static priority class.
    priority: LinkPriority,
    /// The distance across the junction in m.
    length: f64,
    /// Links which may not be used at the same time as this one.
    foes: SmallVec<[LinkId; 8]>,
    /// The controlling traffic light and the index of the signal.
    signal: Option<(TrafficLightId, usize)>,
    /// The current signal state.
    state: LinkState,
    /// The vehicles currently holding a reservation of this link.
    holders: SmallVec<[VehicleId; 2]>,
    /// The vehicles expected to reach this link soon.
    approaches: Vec<Approach>,
}

/// The attributes of a link.
pub struct LinkAttributes {
    /// The lane the link leaves.
    pub from: LaneId,
    /// The lane the link enters.
    pub to: LaneId,
    /// The priority class of the link.
    pub priority: LinkPriority,
    /// The index of the controlling signal in the junction's traffic light.
    pub signal: Option<usize>,
    /// The distance across the junction in m.
    pub length: f64,
}

/// The static priority class of a link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LinkPriority {
    /// The link must yield to major foes.
    Minor,
    /// The link has right of way.
    #[default]
    Major,
}

/// The state of a single signal, as written in a phase state string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// `G`: green with right of way.
    GreenMajor,
    /// `g`: green, but must yield to major foes.
    GreenMinor,
    /// `y`: stop if able to.
    Yellow,
    /// `r`: stop.
    Red,
    /// `o`: signal switched off, priority rules apply.
    Off,
}

/// A vehicle registered as approaching a link.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Approach {
    pub vehicle: VehicleId,
    /// The expected time at which the vehicle reaches the stop line.
    pub arrival: f64,
}

impl LinkState {
    /// Parses a single state character.
    pub fn from_char(c: char) -> Result<Self, NetworkError> {
        match c {
            'G' => Ok(Self::GreenMajor),
            'g' => Ok(Self::GreenMinor),
            'y' | 'Y' => Ok(Self::Yellow),
            'r' | 'R' => Ok(Self::Red),
            'o' | 'O' => Ok(Self::Off),
            c => Err(NetworkError::InvalidState(c)),
        }
    }

    /// The state character.
    pub fn to_char(self) -> char {
        match self {
            Self::GreenMajor => 'G',
            Self::GreenMinor => 'g',
            Self::Yellow => 'y',
            Self::Red => 'r',
            Self::Off => 'o',
        }
    }

    /// Whether the state is a green light.
    pub fn is_green(self) -> bool {
        matches!(self, Self::GreenMajor | Self::GreenMinor)
    }

    /// Whether vehicles may drive through without having to stop.
    pub fn is_passable(self) -> bool {
        !matches!(self, Self::Red | Self::Yellow)
    }
}

impl Link {
    pub(crate) fn new(id: LinkId, index: usize, junction: JunctionId, attribs: &LinkAttributes, light: Option<TrafficLightId>) -> Self {
        Self {
            id,
            index,
            junction,
            from: attribs.from,
            to: attribs.to,
            priority: attribs.priority,
            length: attribs.length.max(0.0),
            foes: SmallVec::new(),
            signal: light.zip(attribs.signal),
            state: LinkState::Off,
            holders: SmallVec::new(),
            approaches: vec![],
        }
    }

    /// Gets the link ID.
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// The creation index of the link.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Gets the junction the link belongs to.
    pub fn junction(&self) -> JunctionId {
        self.junction
    }

    /// Gets the lane the link leaves.
    pub fn from(&self) -> LaneId {
        self.from
    }

    /// Gets the lane the link enters.
    pub fn to(&self) -> LaneId {
        self.to
    }

    /// Gets the priority class of the link.
    pub fn priority(&self) -> LinkPriority {
        self.priority
    }

    /// Gets the distance across the junction in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Gets the foe links.
    pub fn foes(&self) -> &[LinkId] {
        &self.foes
    }

    /// Gets the controlling traffic light and signal index, if any.
    pub fn signal(&self) -> Option<(TrafficLightId, usize)> {
        self.signal
    }

    /// Gets the current signal state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Gets the vehicles holding a reservation of this link.
    pub fn holders(&self) -> &[VehicleId] {
        &self.holders
    }

    /// Whether any vehicle holds a reservation of this link.
    pub fn is_occupied(&self) -> bool {
        !self.holders.is_empty()
    }

    /// The effective priority, taking minor green signals into account.
    pub(crate) fn effective_priority(&self) -> LinkPriority {
        match self.state {
            LinkState::GreenMinor => LinkPriority::Minor,
            _ => self.priority,
        }
    }

    /// Whether vehicles may cross without asking, i.e. the link has no foes
    /// and its signal does not tell them to stop.
    pub(crate) fn is_free_passage(&self) -> bool {
        self.foes.is_empty() && self.state.is_passable()
    }

    pub(crate) fn approaches(&self) -> &[Approach] {
        &self.approaches
    }

    pub(crate) fn add_foe(&mut self, foe: LinkId) {
        if foe != self.id && !self.foes.contains(&foe) {
            self.foes.push(foe);
        }
    }

    pub(crate) fn set_state(&mut self, state: LinkState) {
        self.state = state;
    }

    pub(crate) fn add_holder(&mut self, vehicle: VehicleId) {
        if !self.holders.contains(&vehicle) {
            self.holders.push(vehicle);
        }
    }

    pub(crate) fn remove_holder(&mut self, vehicle: VehicleId) {
        self.holders.retain(|v| *v != vehicle);
    }

    pub(crate) fn add_approach(&mut self, vehicle: VehicleId, arrival: f64) {
        self.approaches.push(Approach { vehicle, arrival });
    }

    pub(crate) fn clear_approaches(&mut self) {
        self.approaches.clear();
    }
}
