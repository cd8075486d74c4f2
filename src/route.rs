use crate::error::LoadError;
use crate::network::Network;
use crate::EdgeId;
use std::collections::HashMap;
use std::rc::Rc;

pub(crate) use router::shortest_path;

mod router;

/// An immutable sequence of edges a vehicle intends to drive along.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    /// The external name, if the route was defined explicitly.
    name: Option<String>,
    /// The edges of the route.
    edges: Vec<EdgeId>,
}

impl Route {
    /// Creates an anonymous route.
    pub(crate) fn from_edges(edges: Vec<EdgeId>) -> Self {
        Self { name: None, edges }
    }

    /// Gets the name of the route, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Gets the edges of the route.
    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    /// The number of edges in the route.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the route has no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Gets the edge at the given index.
    pub fn edge(&self, idx: usize) -> Option<EdgeId> {
        self.edges.get(idx).copied()
    }

    /// The last edge of the route.
    pub fn destination(&self) -> Option<EdgeId> {
        self.edges.last().copied()
    }

    /// The total length of the route in m.
    pub fn length(&self, net: &Network) -> f64 {
        self.edges.iter().map(|e| net.edge_length(*e)).sum()
    }

    /// The driving distance from a position on one route edge to a position on
    /// a later one. Returns `None` if `to` precedes `from`.
    pub fn distance_between(&self, net: &Network, from: (usize, f64), to: (usize, f64)) -> Option<f64> {
        if to.0 < from.0 || (to.0 == from.0 && to.1 < from.1) || to.0 >= self.edges.len() {
            return None;
        }
        let skipped: f64 = self.edges[from.0..to.0].iter().map(|e| net.edge_length(*e)).sum();
        Some(skipped - from.1 + to.1)
    }
}

/// Owns every route in the simulation.
///
/// Named routes live for the whole run. Anonymous routes are shared between
/// all vehicles driving the same edges, and dropped once none of them does.
#[derive(Default)]
pub(crate) struct RouteRegistry {
    named: HashMap<String, Rc<Route>>,
    anonymous: HashMap<Vec<EdgeId>, Rc<Route>>,
}

impl RouteRegistry {
    /// Adds a permanent route.
    pub fn add_named(&mut self, name: &str, edges: Vec<EdgeId>) -> Result<Rc<Route>, LoadError> {
        if self.named.contains_key(name) {
            return Err(LoadError::DuplicateRoute(name.to_string()));
        }
        if edges.is_empty() {
            return Err(LoadError::EmptyRoute(name.to_string()));
        }
        let route = Rc::new(Route {
            name: Some(name.to_string()),
            edges,
        });
        self.named.insert(name.to_string(), route.clone());
        Ok(route)
    }

    /// Gets a permanent route by name.
    pub fn get(&self, name: &str) -> Option<Rc<Route>> {
        self.named.get(name).cloned()
    }

    /// Gets the shared route driving along `edges`, creating it if needed.
    pub fn intern(&mut self, edges: Vec<EdgeId>) -> Rc<Route> {
        self.anonymous
            .entry(edges)
            .or_insert_with_key(|edges| Rc::new(Route::from_edges(edges.clone())))
            .clone()
    }

    /// Drops the anonymous routes no vehicle refers to anymore.
    pub fn prune(&mut self) {
        self.anonymous.retain(|_, route| Rc::strong_count(route) > 1);
    }

    /// The number of routes currently stored.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.named.len() + self.anonymous.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::test::corridor;
    use slotmap::SlotMap;

    fn edges(n: usize) -> Vec<EdgeId> {
        let mut set: SlotMap<EdgeId, ()> = SlotMap::with_key();
        (0..n).map(|_| set.insert(())).collect()
    }

    #[test]
    fn anonymous_routes_are_shared() {
        let e = edges(3);
        let mut registry = RouteRegistry::default();
        let a = registry.intern(vec![e[0], e[1]]);
        let b = registry.intern(vec![e[0], e[1]]);
        let c = registry.intern(vec![e[0], e[2]]);
        assert!(Rc::ptr_eq(&a, &b));
        assert!(!Rc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);

        drop(c);
        registry.prune();
        assert_eq!(registry.len(), 1);
        drop((a, b));
        registry.prune();
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn named_routes_are_permanent() {
        let e = edges(2);
        let mut registry = RouteRegistry::default();
        let r = registry.add_named("r", e.clone()).unwrap();
        assert_eq!(r.name(), Some("r"));
        assert!(matches!(registry.add_named("r", e), Err(LoadError::DuplicateRoute(_))));
        assert!(matches!(registry.add_named("empty", vec![]), Err(LoadError::EmptyRoute(_))));
        drop(r);
        registry.prune();
        assert!(registry.get("r").is_some());
    }

    #[test]
    fn distances() {
        let (net, edges) = corridor(&[100.0, 50.0, 80.0], 10.0);
        let route = Route::from_edges(edges);
        assert_eq!(route.length(&net), 230.0);
        assert_eq!(route.distance_between(&net, (0, 40.0), (2, 10.0)), Some(120.0));
        assert_eq!(route.distance_between(&net, (1, 20.0), (1, 30.0)), Some(10.0));
        assert_eq!(route.distance_between(&net, (1, 20.0), (0, 30.0)), None);
        assert_eq!(route.distance_between(&net, (0, 0.0), (3, 0.0)), None);
    }
}
