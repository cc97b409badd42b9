/*
Priority queues for Dijkstra, keyed by node id with a distance as priority.

Both queues have a fixed capacity equal to the number of graph nodes, so an id
doubles as an index into their bookkeeping arrays.

IndexedHeap: binary min-heap over a flat array plus a back-index array
(id -> position in the heap) which gives O(1) membership and lets
decrease-key start its sift-up from the entry's current slot.

MapHeap: the same contract on top of orx_priority_queue's map-backed heap.
*/

use orx_priority_queue::*;

use crate::error::EngineError;
use crate::graph::{Distance, NodeId};

const ABSENT: usize = usize::MAX;

/// Priority queue operations Dijkstra relies on.
pub trait DecreaseKeyQueue {
    fn with_capacity(capacity: usize) -> Self
    where
        Self: Sized;

    /// Adds `id`; fails if it is already queued.
    fn insert(&mut self, id: NodeId, key: Distance) -> Result<(), EngineError>;

    /// Lowers the key of a queued `id`. A larger key is rejected.
    fn decrease_key(&mut self, id: NodeId, key: Distance) -> Result<(), EngineError>;

    fn extract_min(&mut self) -> Result<(NodeId, Distance), EngineError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);
}

#[derive(Debug, Clone)]
pub struct IndexedHeap {
    entries: Vec<(NodeId, Distance)>,
    position: Vec<usize>,
}

impl IndexedHeap {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            position: vec![ABSENT; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.position.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.position.get(id).is_some_and(|&p| p != ABSENT)
    }

    pub fn key_of(&self, id: NodeId) -> Option<Distance> {
        match self.position.get(id) {
            Some(&p) if p != ABSENT => Some(self.entries[p].1),
            _ => None,
        }
    }

    pub fn peek(&self) -> Option<(NodeId, Distance)> {
        self.entries.first().copied()
    }

    fn check(&self, id: NodeId) -> Result<(), EngineError> {
        if id < self.position.len() {
            Ok(())
        } else {
            Err(EngineError::UnknownId {
                id,
                count: self.position.len(),
            })
        }
    }

    #[inline(always)]
    fn place(&mut self, index: usize, entry: (NodeId, Distance)) {
        self.entries[index] = entry;
        self.position[entry.0] = index;
    }

    // Moves the entry at `index` toward the root while its parent has a larger key.
    fn sift_up(&mut self, mut index: usize) {
        let entry = self.entries[index];
        while index > 0 {
            let parent = (index - 1) / 2;
            let above = self.entries[parent];
            if above.1 <= entry.1 {
                break;
            }
            self.place(index, above);
            index = parent;
        }
        self.place(index, entry);
    }

    // Moves the entry at `index` toward the leaves, always swapping with the smaller child.
    fn sift_down(&mut self, mut index: usize) {
        let entry = self.entries[index];
        let len = self.entries.len();
        loop {
            let left = 2 * index + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.entries[right].1 < self.entries[left].1 {
                right
            } else {
                left
            };
            let below = self.entries[child];
            if entry.1 <= below.1 {
                break;
            }
            self.place(index, below);
            index = child;
        }
        self.place(index, entry);
    }

    #[cfg(test)]
    fn is_heap(&self) -> bool {
        let ordered = (1..self.entries.len()).all(|i| self.entries[(i - 1) / 2].1 <= self.entries[i].1);
        let indexed = self
            .entries
            .iter()
            .enumerate()
            .all(|(i, &(id, _))| self.position[id] == i);
        ordered && indexed
    }
}

impl DecreaseKeyQueue for IndexedHeap {
    fn with_capacity(capacity: usize) -> Self {
        Self::new(capacity)
    }

    fn insert(&mut self, id: NodeId, key: Distance) -> Result<(), EngineError> {
        self.check(id)?;
        if self.position[id] != ABSENT {
            return Err(EngineError::AlreadyQueued { id });
        }
        let index = self.entries.len();
        self.entries.push((id, key));
        self.position[id] = index;
        self.sift_up(index);
        Ok(())
    }

    fn decrease_key(&mut self, id: NodeId, key: Distance) -> Result<(), EngineError> {
        self.check(id)?;
        let index = self.position[id];
        if index == ABSENT {
            return Err(EngineError::NotQueued { id });
        }
        let current = self.entries[index].1;
        if key > current {
            return Err(EngineError::KeyIncreased {
                id,
                current,
                requested: key,
            });
        }
        self.entries[index].1 = key;
        self.sift_up(index);
        Ok(())
    }

    fn extract_min(&mut self) -> Result<(NodeId, Distance), EngineError> {
        let last = self.entries.pop().ok_or(EngineError::EmptyQueue)?;
        if self.entries.is_empty() {
            self.position[last.0] = ABSENT;
            return Ok(last);
        }
        let min = std::mem::replace(&mut self.entries[0], last);
        self.position[min.0] = ABSENT;
        self.sift_down(0);
        Ok(min)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    // O(len), not O(capacity): only queued ids have a position to forget.
    fn clear(&mut self) {
        for &(id, _) in &self.entries {
            self.position[id] = ABSENT;
        }
        self.entries.clear();
    }
}

pub struct MapHeap {
    pq: BinaryHeapWithMap<NodeId, Distance>,
    keys: Vec<Option<Distance>>,
}

impl std::fmt::Debug for MapHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapHeap")
            .field("len", &self.pq.len())
            .field("capacity", &self.keys.len())
            .finish()
    }
}

impl MapHeap {
    fn check(&self, id: NodeId) -> Result<(), EngineError> {
        if id < self.keys.len() {
            Ok(())
        } else {
            Err(EngineError::UnknownId {
                id,
                count: self.keys.len(),
            })
        }
    }
}

impl DecreaseKeyQueue for MapHeap {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            pq: BinaryHeapWithMap::new(),
            keys: vec![None; capacity],
        }
    }

    fn insert(&mut self, id: NodeId, key: Distance) -> Result<(), EngineError> {
        self.check(id)?;
        if self.keys[id].is_some() {
            return Err(EngineError::AlreadyQueued { id });
        }
        self.keys[id] = Some(key);
        self.pq.decrease_key_or_push(&id, key);
        Ok(())
    }

    fn decrease_key(&mut self, id: NodeId, key: Distance) -> Result<(), EngineError> {
        self.check(id)?;
        match self.keys[id] {
            None => Err(EngineError::NotQueued { id }),
            Some(current) if key > current => Err(EngineError::KeyIncreased {
                id,
                current,
                requested: key,
            }),
            Some(_) => {
                self.keys[id] = Some(key);
                self.pq.decrease_key_or_push(&id, key);
                Ok(())
            }
        }
    }

    fn extract_min(&mut self) -> Result<(NodeId, Distance), EngineError> {
        let (id, key) = self.pq.pop().ok_or(EngineError::EmptyQueue)?;
        self.keys[id] = None;
        Ok((id, key))
    }

    fn len(&self) -> usize {
        self.pq.len()
    }

    fn clear(&mut self) {
        while let Some((id, _)) = self.pq.pop() {
            self.keys[id] = None;
        }
    }
}
