use std::collections::TryReserveError;

use crate::error::EngineError;

pub type NodeId = usize;
pub type Cost = u32;
pub type Distance = u64;

/// Distance of a node no path was found to.
pub const UNREACHABLE: Distance = Distance::MAX;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub cost: Cost,
}

/// Immutable road graph.
///
/// Outgoing edges are stored in one flat array grouped by source node, so the
/// edges of node `i` are `edges[offsets[i]..offsets[i + 1]]`.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    offsets: Vec<usize>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns `id` unchanged if it names a node of this graph.
    pub fn check(&self, id: NodeId) -> Result<NodeId, EngineError> {
        if id < self.nodes.len() {
            Ok(id)
        } else {
            Err(EngineError::UnknownId {
                id,
                count: self.nodes.len(),
            })
        }
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, EngineError> {
        self.check(id).map(|id| &self.nodes[id])
    }

    pub fn edges_of(&self, id: NodeId) -> Result<&[Edge], EngineError> {
        self.check(id).map(|id| self.outgoing(id))
    }

    /// (latitude, longitude) of a node.
    pub fn coordinates_of(&self, id: NodeId) -> Result<(f64, f64), EngineError> {
        self.node(id).map(|n| (n.latitude, n.longitude))
    }

    // Unchecked: callers hold ids validated at build time.
    #[inline(always)]
    pub(crate) fn outgoing(&self, id: NodeId) -> &[Edge] {
        &self.edges[self.offsets[id]..self.offsets[id + 1]]
    }
}

/// Collects nodes and edges in any order and freezes them into a [`Graph`].
#[derive(Debug)]
pub struct GraphBuilder {
    nodes: Vec<Option<Node>>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    pub fn new(node_count: usize) -> Self {
        Self {
            nodes: vec![None; node_count],
            edges: Vec::new(),
        }
    }

    /// Like [`new`](Self::new) with room for `edge_count` edges, but reports
    /// sizes that cannot be allocated instead of aborting.
    pub fn try_with_edge_capacity(node_count: usize, edge_count: usize) -> Result<Self, TryReserveError> {
        let mut nodes: Vec<Option<Node>> = Vec::new();
        nodes.try_reserve_exact(node_count)?;
        nodes.resize(node_count, None);
        let mut edges: Vec<Edge> = Vec::new();
        edges.try_reserve_exact(edge_count)?;
        Ok(Self { nodes, edges })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn check(&self, id: NodeId) -> Result<NodeId, EngineError> {
        if id < self.nodes.len() {
            Ok(id)
        } else {
            Err(EngineError::UnknownId {
                id,
                count: self.nodes.len(),
            })
        }
    }

    pub fn add_node(&mut self, id: NodeId, latitude: f64, longitude: f64) -> Result<(), EngineError> {
        let id = self.check(id)?;
        let slot = &mut self.nodes[id];
        if slot.is_some() {
            return Err(EngineError::DuplicateNode { id });
        }
        *slot = Some(Node {
            id,
            latitude,
            longitude,
        });
        Ok(())
    }

    pub fn add_edge(&mut self, source: NodeId, target: NodeId, cost: Cost) -> Result<(), EngineError> {
        self.check(source)?;
        self.check(target)?;
        self.edges.push(Edge {
            source,
            target,
            cost,
        });
        Ok(())
    }

    /// Adds `a -> b` and `b -> a` with the same cost.
    pub fn add_road(&mut self, a: NodeId, b: NodeId, cost: Cost) -> Result<(), EngineError> {
        self.add_edge(a, b, cost)?;
        self.add_edge(b, a, cost)
    }

    pub fn build(self) -> Result<Graph, EngineError> {
        let nodes = self
            .nodes
            .into_iter()
            .enumerate()
            .map(|(id, node)| node.ok_or(EngineError::MissingNode { id }))
            .collect::<Result<Vec<_>, _>>()?;

        // Stable: edges of one node keep their input order.
        let mut edges = self.edges;
        edges.sort_by_key(|e| e.source);

        let mut offsets = vec![0usize; nodes.len() + 1];
        for edge in &edges {
            offsets[edge.source + 1] += 1;
        }
        for i in 0..nodes.len() {
            offsets[i + 1] += offsets[i];
        }

        Ok(Graph {
            nodes,
            offsets,
            edges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_graph() -> Graph {
        let mut builder = GraphBuilder::new(3);
        builder.add_node(2, 0.0, 2.0).unwrap();
        builder.add_node(0, 0.0, 0.0).unwrap();
        builder.add_node(1, 0.0, 1.0).unwrap();
        builder.add_edge(1, 2, 3).unwrap();
        builder.add_edge(0, 1, 5).unwrap();
        builder.add_edge(0, 2, 9).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn edges_are_grouped_by_source() {
        let graph = line_graph();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);

        let targets: Vec<_> = graph.edges_of(0).unwrap().iter().map(|e| e.target).collect();
        assert_eq!(targets, vec![1, 2]);
        assert_eq!(
            graph.edges_of(1).unwrap(),
            &[Edge {
                source: 1,
                target: 2,
                cost: 3
            }]
        );
        assert!(graph.edges_of(2).unwrap().is_empty());
    }

    #[test]
    fn coordinates_are_latitude_then_longitude() {
        let graph = line_graph();
        assert_eq!(graph.coordinates_of(2).unwrap(), (0.0, 2.0));
        assert_eq!(graph.node(1).unwrap().id, 1);
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let graph = line_graph();
        assert_eq!(
            graph.edges_of(3),
            Err(EngineError::UnknownId { id: 3, count: 3 })
        );
        assert!(graph.coordinates_of(usize::MAX).is_err());

        let mut builder = GraphBuilder::new(2);
        assert!(builder.add_node(2, 0.0, 0.0).is_err());
        assert!(builder.add_edge(0, 5, 1).is_err());
    }

    #[test]
    fn every_node_must_be_supplied_once() {
        let mut builder = GraphBuilder::new(2);
        builder.add_node(0, 1.0, 1.0).unwrap();
        assert_eq!(
            builder.add_node(0, 1.0, 1.0),
            Err(EngineError::DuplicateNode { id: 0 })
        );
        assert_eq!(builder.build().unwrap_err(), EngineError::MissingNode { id: 1 });
    }

    #[test]
    fn edges_of_one_node_keep_input_order() {
        let mut builder = GraphBuilder::new(3);
        for id in 0..3 {
            builder.add_node(id, 0.0, 0.0).unwrap();
        }
        for (a, b, cost) in [(2, 0, 1), (0, 2, 7), (1, 0, 2), (0, 1, 3), (2, 1, 4), (0, 0, 5)] {
            builder.add_edge(a, b, cost).unwrap();
        }
        let graph = builder.build().unwrap();
        let costs = |id| graph.edges_of(id).unwrap().iter().map(|e| e.cost).collect::<Vec<_>>();
        assert_eq!(costs(0), vec![7, 3, 5]);
        assert_eq!(costs(1), vec![2]);
        assert_eq!(costs(2), vec![1, 4]);
    }

    #[test]
    fn impossible_sizes_are_reported() {
        assert!(GraphBuilder::try_with_edge_capacity(usize::MAX, 0).is_err());
        assert!(GraphBuilder::try_with_edge_capacity(0, usize::MAX).is_err());
        let builder = GraphBuilder::try_with_edge_capacity(4, 10).unwrap();
        assert_eq!(builder.node_count(), 4);
    }

    #[test]
    fn roads_add_both_directions() {
        let mut builder = GraphBuilder::new(2);
        builder.add_node(0, 0.0, 0.0).unwrap();
        builder.add_node(1, 0.0, 0.0).unwrap();
        builder.add_road(0, 1, 4).unwrap();
        let graph = builder.build().unwrap();
        assert_eq!(graph.edges_of(0).unwrap()[0].target, 1);
        assert_eq!(graph.edges_of(1).unwrap()[0].target, 0);
    }
}
