use crate::error::EngineError;
use crate::graph::{Distance, Graph, NodeId, UNREACHABLE};
use crate::heap::{DecreaseKeyQueue, IndexedHeap};

/// Single-source shortest paths over a shared [`Graph`].
///
/// The engine owns all per-query state (tentative distances, predecessors and
/// the queue), so any number of engines may borrow the same graph. One engine
/// answers one source at a time: call [`reset`](Self::reset) before
/// calculating from another source, or use [`calculate_from`](Self::calculate_from).
#[derive(Debug)]
pub struct Dijkstra<'g, Q = IndexedHeap> {
    graph: &'g Graph,
    queue: Q,
    distance: Vec<Distance>,
    previous: Vec<Option<NodeId>>,
    source: Option<NodeId>,
    settled: usize,
}

impl<'g> Dijkstra<'g, IndexedHeap> {
    pub fn new(graph: &'g Graph) -> Self {
        Self::with_queue(graph)
    }
}

impl<'g, Q: DecreaseKeyQueue> Dijkstra<'g, Q> {
    pub fn with_queue(graph: &'g Graph) -> Self {
        let n = graph.node_count();
        Self {
            graph,
            queue: Q::with_capacity(n),
            distance: vec![UNREACHABLE; n],
            previous: vec![None; n],
            source: None,
            settled: 0,
        }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Source of the results currently held, if any.
    pub fn source(&self) -> Option<NodeId> {
        self.source
    }

    /// Number of nodes settled by the last calculation.
    pub fn settled_count(&self) -> usize {
        self.settled
    }

    pub fn reset(&mut self) {
        self.distance.fill(UNREACHABLE);
        self.previous.fill(None);
        self.queue.clear();
        self.source = None;
        self.settled = 0;
    }

    /// Runs Dijkstra from `source` to every reachable node.
    pub fn calculate(&mut self, source: NodeId) -> Result<(), EngineError> {
        self.graph.check(source)?;
        if let Some(origin) = self.source {
            return Err(EngineError::StaleState { origin });
        }
        self.source = Some(source);

        self.distance[source] = 0;
        self.queue.insert(source, 0)?;

        while !self.queue.is_empty() {
            let (node, dist) = self.queue.extract_min()?;
            self.settled += 1;

            for edge in self.graph.outgoing(node) {
                let target = edge.target;
                let candidate = dist + Distance::from(edge.cost);
                let known = self.distance[target];
                if candidate < known {
                    self.distance[target] = candidate;
                    self.previous[target] = Some(node);
                    // A finite distance means the target is still queued: with
                    // non-negative costs settled nodes never improve.
                    if known == UNREACHABLE {
                        self.queue.insert(target, candidate)?;
                    } else {
                        self.queue.decrease_key(target, candidate)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Makes sure the held results are for `source`, recomputing only if needed.
    ///
    /// Returns `true` when a new calculation ran.
    pub fn calculate_from(&mut self, source: NodeId) -> Result<bool, EngineError> {
        if self.source == Some(source) {
            return Ok(false);
        }
        if self.source.is_some() {
            self.reset();
        }
        self.calculate(source)?;
        Ok(true)
    }

    /// Shortest distance to `id`, `None` if it was not reached.
    pub fn distance_to(&self, id: NodeId) -> Result<Option<Distance>, EngineError> {
        let d = self.distance[self.graph.check(id)?];
        Ok((d != UNREACHABLE).then_some(d))
    }

    /// Node before `id` on its shortest path. `None` for the source and unreached nodes.
    pub fn predecessor(&self, id: NodeId) -> Result<Option<NodeId>, EngineError> {
        Ok(self.previous[self.graph.check(id)?])
    }

    /// Nodes from the source to `id`, both included. Empty if `id` was not reached.
    pub fn path_to(&self, id: NodeId) -> Result<Vec<NodeId>, EngineError> {
        if self.distance_to(id)?.is_none() {
            return Ok(Vec::new());
        }
        let mut path = vec![id];
        let mut current = id;
        while let Some(prev) = self.previous[current] {
            path.push(prev);
            current = prev;
        }
        path.reverse();
        Ok(path)
    }

    /// Every node with its distance, `None` where unreached.
    pub fn distances(&self) -> impl Iterator<Item = (NodeId, Option<Distance>)> + '_ {
        self.distance
            .iter()
            .enumerate()
            .map(|(id, &d)| (id, (d != UNREACHABLE).then_some(d)))
    }
}

/// Dijkstra from `start` to all nodes. Unreachable nodes get [`UNREACHABLE`].
pub fn dijkstra_all(graph: &Graph, start: NodeId) -> Result<Vec<Distance>, EngineError> {
    let mut engine = Dijkstra::new(graph);
    engine.calculate(start)?;
    Ok(engine.distance)
}
