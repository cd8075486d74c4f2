use crate::network::Network;
use crate::EdgeId;

/// Finds the cheapest edge sequence from `from` to `to`, where entering an
/// edge costs `cost(edge)` seconds.
pub(crate) fn shortest_path(net: &Network, from: EdgeId, to: EdgeId, cost: impl Fn(EdgeId) -> f64) -> Option<Vec<EdgeId>> {
    let result = pathfinding::directed::dijkstra::dijkstra(
        &from,
        |id| successors(*id, net, &cost),
        |id| *id == to,
    );
    result.map(|(path, _)| path)
}

fn successors<'a>(
    edge: EdgeId,
    net: &'a Network,
    cost: &'a impl Fn(EdgeId) -> f64,
) -> impl Iterator<Item = (EdgeId, u64)> + 'a {
    net.successor_edges(edge)
        .into_iter()
        .map(move |next| (next, (1000.0 * cost(next).max(0.0)) as u64))
}
