use crate::link::LinkState;
use crate::{JunctionId, LinkId, LinkSet, TrafficLightId, VehicleId};
use itertools::Itertools;
use log::debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// An intersection, grouping the links that converge on it.
#[derive(Clone, Debug)]
pub struct Junction {
    /// The junction ID.
    id: JunctionId,
    /// The external name.
    name: String,
    /// How right of way is decided.
    kind: JunctionKind,
    /// The links crossing the junction, in creation order.
    links: Vec<LinkId>,
    /// The traffic light controlling the junction's signals.
    light: Option<TrafficLightId>,
}

/// The attributes of a junction.
pub struct JunctionAttributes<'a> {
    /// The external name.
    pub name: &'a str,
    /// How right of way is decided.
    pub kind: JunctionKind,
    /// The traffic light controlling the junction, required for
    /// [JunctionKind::TrafficLight].
    pub light: Option<TrafficLightId>,
}

/// How right of way is decided at a junction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum JunctionKind {
    /// Foe links and link priorities decide.
    #[default]
    Priority,
    /// As [Self::Priority], with a traffic light gating each link.
    TrafficLight,
    /// Every request is granted. The links may not have foes.
    Unregulated,
}

/// A vehicle asking to cross a link in the current step.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Request {
    pub link: LinkId,
    pub vehicle: VehicleId,
    /// The time at which the vehicle expects to have left the junction.
    pub leave_time: f64,
    /// Whether the vehicle is still able to stop before the stop line.
    pub can_stop: bool,
}

impl Junction {
    pub(crate) fn new(id: JunctionId, attribs: &JunctionAttributes) -> Self {
        Self {
            id,
            name: attribs.name.to_string(),
            kind: attribs.kind,
            links: vec![],
            light: attribs.light,
        }
    }

    /// Gets the junction ID.
    pub fn id(&self) -> JunctionId {
        self.id
    }

    /// Gets the external name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the kind of junction.
    pub fn kind(&self) -> JunctionKind {
        self.kind
    }

    /// Gets the links crossing the junction.
    pub fn links(&self) -> &[LinkId] {
        &self.links
    }

    /// Gets the traffic light of the junction.
    pub fn light(&self) -> Option<TrafficLightId> {
        self.light
    }

    pub(crate) fn add_link(&mut self, link: LinkId) {
        self.links.push(link);
    }

    /// Resolves this step's crossing requests in a single deterministic pass.
    ///
    /// Requests are handled in order of priority class, then link index. A granted
    /// link is reserved immediately, so every later request on one of its foes fails.
    /// Returns the granted requests.
    pub(crate) fn arbitrate(&self, requests: Vec<Request>, links: &mut LinkSet) -> Vec<Request> {
        if self.kind == JunctionKind::Unregulated {
            for req in &requests {
                links[req.link].add_holder(req.vehicle);
            }
            return requests;
        }

        let ordered = requests.into_iter().sorted_by_key(|req| {
            let link = &links[req.link];
            (Reverse(link.effective_priority()), link.index())
        });

        let mut granted: Vec<Request> = vec![];
        for req in ordered {
            let link = &links[req.link];
            let allowed = match link.state() {
                LinkState::Red => false,
                LinkState::Yellow => !req.can_stop,
                _ => true,
            };
            let taken = granted.iter().any(|g| g.link == req.link);
            let blocked = link.foes().iter().any(|foe| links[*foe].is_occupied());
            if !allowed || taken || blocked || self.must_yield(req, links) {
                debug!("junction {}: request of link {} denied", self.name, link.index());
                continue;
            }
            links[req.link].add_holder(req.vehicle);
            granted.push(req);
        }
        granted
    }

    /// Checks whether a vehicle on a link must let an approaching vehicle on a
    /// higher priority foe link go first.
    fn must_yield(&self, req: Request, links: &LinkSet) -> bool {
        let link = &links[req.link];
        let priority = link.effective_priority();
        link.foes().iter().map(|foe| &links[*foe]).any(|foe| {
            foe.effective_priority() > priority
                && foe.state() != LinkState::Red
                && foe
                    .approaches()
                    .iter()
                    .any(|a| a.vehicle != req.vehicle && a.arrival < req.leave_time)
        })
    }
}
