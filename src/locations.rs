use fnv::FnvHashMap;
use log::warn;

use crate::geo::BoundingBox;
use crate::graph::{Graph, NodeId};

/// Distinct coordinates of a node set.
///
/// Nodes sharing exactly the same coordinate are merged into one location
/// carrying all their ids, so every location is unique. Points are stored as
/// `[longitude, latitude]`.
#[derive(Debug, Clone, Default)]
pub struct Locations {
    points: Vec<[f64; 2]>,
    offsets: Vec<usize>,
    ids: Vec<NodeId>,
    bounds: BoundingBox,
}

// -0.0 and 0.0 compare equal, so they must share a key.
fn key(point: [f64; 2]) -> (u64, u64) {
    ((point[0] + 0.0).to_bits(), (point[1] + 0.0).to_bits())
}

impl Locations {
    /// Merges `(id, longitude, latitude)` triples. Ids at one location keep
    /// their input order. Non-finite coordinates are skipped.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (NodeId, f64, f64)>,
    {
        let mut index: FnvHashMap<(u64, u64), usize> = FnvHashMap::default();
        let mut unique: Vec<[f64; 2]> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        let mut assigned: Vec<(NodeId, usize)> = Vec::new();
        let mut bounds = BoundingBox::empty();
        let mut skipped = 0usize;

        for (id, lon, lat) in points {
            if !lon.is_finite() || !lat.is_finite() {
                skipped += 1;
                continue;
            }
            let point = [lon, lat];
            let loc = *index.entry(key(point)).or_insert_with(|| {
                unique.push(point);
                counts.push(0);
                bounds.extend(lon, lat);
                unique.len() - 1
            });
            counts[loc] += 1;
            assigned.push((id, loc));
        }
        if skipped > 0 {
            warn!("Skipped {} nodes with non-finite coordinates", skipped);
        }

        let mut offsets = Vec::with_capacity(unique.len() + 1);
        offsets.push(0);
        for count in &counts {
            offsets.push(offsets[offsets.len() - 1] + count);
        }
        let mut cursor = offsets.clone();
        let mut ids = vec![0; assigned.len()];
        for (id, loc) in assigned {
            ids[cursor[loc]] = id;
            cursor[loc] += 1;
        }

        Self {
            points: unique,
            offsets,
            ids,
            bounds,
        }
    }

    pub fn from_graph(graph: &Graph) -> Self {
        Self::from_points(graph.nodes().iter().map(|n| (n.id, n.longitude, n.latitude)))
    }

    /// Number of distinct locations.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of node ids over all locations.
    pub fn id_count(&self) -> usize {
        self.ids.len()
    }

    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    pub fn point(&self, location: usize) -> [f64; 2] {
        self.points[location]
    }

    pub fn ids(&self, location: usize) -> &[NodeId] {
        &self.ids[self.offsets[location]..self.offsets[location + 1]]
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }
}
