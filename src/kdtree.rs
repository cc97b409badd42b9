//! Balanced 2-d tree for exact nearest-node search.
//!
//! The tree over `k` distinct locations is a complete binary tree of `2k - 1`
//! nodes stored implicitly in heap order: node `i` has children `2i + 1` and
//! `2i + 2`, the first `k - 1` nodes are internal and the last `k` are leaves.
//! Internal nodes keep only their splitting coordinate, leaves keep a location
//! index. Axes alternate by depth, longitude at the root.
//!
//! Every location in the left subtree of a node has an axis coordinate `<=`
//! the split, every location in the right subtree `>=` it.

use log::info;
use std::time::Instant;

use crate::brute;
use crate::geo::euclidean;
use crate::graph::{Graph, NodeId};
use crate::locations::Locations;

#[derive(Debug, Clone)]
pub struct KdTree {
    locations: Locations,
    splits: Vec<f64>,
    leaves: Vec<usize>,
}

// Depth parity of heap node `node`: 0 = longitude, 1 = latitude.
#[inline(always)]
fn axis_of(node: usize) -> usize {
    let depth = usize::BITS - 1 - (node + 1).leading_zeros();
    (depth % 2) as usize
}

// Leaves below `node` in a full heap-shaped tree of `size` nodes.
fn leaf_count(node: usize, size: usize) -> usize {
    let mut nodes = 0;
    let mut first = node;
    let mut width = 1;
    while first < size {
        nodes += width.min(size - first);
        first = 2 * first + 1;
        width *= 2;
    }
    (nodes + 1) / 2
}

/// Reorders `order` so the entry at `nth` has the `nth` smallest coordinate,
/// with nothing larger before it and nothing smaller after it.
///
/// Quickselect with a three-way partition, which keeps runs of equal
/// coordinates (common on grid-like road data) linear.
fn select_nth<F>(order: &mut [usize], nth: usize, coord: F)
where
    F: Fn(usize) -> f64,
{
    let (mut lo, mut hi) = (0, order.len());
    while hi - lo > 1 {
        let pivot = {
            let a = coord(order[lo]);
            let b = coord(order[lo + (hi - lo) / 2]);
            let c = coord(order[hi - 1]);
            if (a <= b) == (b <= c) {
                b
            } else if (b <= a) == (a <= c) {
                a
            } else {
                c
            }
        };

        let (mut lt, mut i, mut gt) = (lo, lo, hi);
        while i < gt {
            let v = coord(order[i]);
            if v < pivot {
                order.swap(lt, i);
                lt += 1;
                i += 1;
            } else if v > pivot {
                gt -= 1;
                order.swap(i, gt);
            } else {
                i += 1;
            }
        }

        if nth < lt {
            hi = lt;
        } else if nth >= gt {
            lo = gt;
        } else {
            return;
        }
    }
}

impl KdTree {
    pub fn build(locations: Locations) -> Self {
        let start = Instant::now();
        let k = locations.len();
        if k == 0 {
            return Self {
                locations,
                splits: Vec::new(),
                leaves: Vec::new(),
            };
        }

        let internal = k - 1;
        let size = 2 * k - 1;
        let mut splits = vec![0.0; internal];
        let mut leaves = vec![0; k];
        let mut order: Vec<usize> = (0..k).collect();
        let points = locations.points();

        // (node, lo, hi): node owns order[lo..hi], one slot per leaf below it.
        let mut stack = vec![(0usize, 0usize, k)];
        while let Some((node, lo, hi)) = stack.pop() {
            if node >= internal {
                debug_assert_eq!(hi - lo, 1);
                leaves[node - internal] = order[lo];
                continue;
            }
            let left = 2 * node + 1;
            let left_leaves = leaf_count(left, size);
            let axis = axis_of(node);
            let pos = lo + left_leaves - 1;

            select_nth(&mut order[lo..hi], left_leaves - 1, |loc| points[loc][axis]);
            splits[node] = points[order[pos]][axis];

            stack.push((left + 1, pos + 1, hi));
            stack.push((left, lo, pos + 1));
        }

        info!(
            "Built k-d tree over {} locations ({} nodes) in {:.3} s",
            k,
            locations.id_count(),
            start.elapsed().as_secs_f64()
        );

        Self {
            locations,
            splits,
            leaves,
        }
    }

    pub fn from_graph(graph: &Graph) -> Self {
        Self::build(Locations::from_graph(graph))
    }

    pub fn locations(&self) -> &Locations {
        &self.locations
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    fn search(&self, node: usize, query: [f64; 2], best: &mut f64, found: &mut Vec<usize>) {
        let internal = self.splits.len();
        if node >= internal {
            let loc = self.leaves[node - internal];
            let p = self.locations.point(loc);
            let d = euclidean(query[0], query[1], p[0], p[1]);
            if d < *best {
                *best = d;
                found.clear();
                found.push(loc);
            } else if d == *best {
                found.push(loc);
            }
            return;
        }

        let axis = axis_of(node);
        let threshold = self.splits[node] - query[axis];
        let (near, far) = if threshold < 0.0 {
            (2 * node + 2, 2 * node + 1)
        } else {
            (2 * node + 1, 2 * node + 2)
        };

        self.search(near, query, best, found);
        // The far side can only hold points at least |threshold| away.
        if *best >= threshold.abs() {
            self.search(far, query, best, found);
        }
    }

    #[cfg(test)]
    fn is_partitioned(&self) -> bool {
        let internal = self.splits.len();
        let mut below: Vec<Vec<usize>> = vec![Vec::new(); internal + self.leaves.len()];
        for node in (0..below.len()).rev() {
            below[node] = if node >= internal {
                vec![self.leaves[node - internal]]
            } else {
                [below[2 * node + 1].clone(), below[2 * node + 2].clone()].concat()
            };
        }
        (0..internal).all(|node| {
            let axis = axis_of(node);
            let split = self.splits[node];
            below[2 * node + 1].iter().all(|&l| self.locations.point(l)[axis] <= split)
                && below[2 * node + 2].iter().all(|&l| self.locations.point(l)[axis] >= split)
        })
    }
}

/// Per-query state for nearest-node lookups against a shared [`KdTree`].
///
/// Holds the result accumulator, which is cleared and reused by every query.
#[derive(Debug, Clone)]
pub struct NearestSearch<'t> {
    tree: &'t KdTree,
    found: Vec<usize>,
    distance: f64,
}

impl<'t> NearestSearch<'t> {
    pub fn new(tree: &'t KdTree) -> Self {
        Self {
            tree,
            found: Vec::new(),
            distance: f64::INFINITY,
        }
    }

    pub fn tree(&self) -> &'t KdTree {
        self.tree
    }

    /// Distance to the nearest location using the k-d tree. Every location at
    /// exactly that distance is kept. `+inf` if the index is empty.
    pub fn nearest(&mut self, lon: f64, lat: f64) -> f64 {
        self.found.clear();
        self.distance = f64::INFINITY;
        if !self.tree.is_empty() {
            self.tree.search(0, [lon, lat], &mut self.distance, &mut self.found);
        }
        self.distance
    }

    /// Same as [`nearest`](Self::nearest) by scanning every location.
    pub fn nearest_iterative(&mut self, lon: f64, lat: f64) -> f64 {
        self.distance = brute::nearest_iterative(self.tree.locations(), lon, lat, &mut self.found);
        self.distance
    }

    /// Distance found by the last query.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Location indices found by the last query.
    pub fn found_locations(&self) -> &[usize] {
        &self.found
    }

    /// Node ids found by the last query.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        let locations = self.tree.locations();
        self.found
            .iter()
            .flat_map(move |&loc| locations.ids(loc).iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sorted_ids(search: &NearestSearch<'_>) -> Vec<NodeId> {
        let mut ids: Vec<_> = search.ids().collect();
        ids.sort_unstable();
        ids
    }

    fn tree_of(points: &[(NodeId, f64, f64)]) -> KdTree {
        KdTree::build(Locations::from_points(points.iter().copied()))
    }

    fn assert_agrees(tree: &KdTree, rng: &mut StdRng, queries: usize) {
        let mut fast = NearestSearch::new(tree);
        let mut slow = NearestSearch::new(tree);
        let bounds = tree.locations().bounds();
        for _ in 0..queries {
            let (lon, lat) = bounds.sample(rng).unwrap();
            let df = fast.nearest(lon, lat);
            let ds = slow.nearest_iterative(lon, lat);
            assert_eq!(df, ds, "distance at ({lon}, {lat})");
            assert_eq!(sorted_ids(&fast), sorted_ids(&slow), "ids at ({lon}, {lat})");
        }
    }

    #[test]
    fn heap_shape_helpers() {
        assert_eq!(axis_of(0), 0);
        assert_eq!(axis_of(1), 1);
        assert_eq!(axis_of(2), 1);
        assert_eq!(axis_of(3), 0);
        assert_eq!(axis_of(6), 0);
        assert_eq!(axis_of(7), 1);

        // 6 leaves -> 11 nodes: left subtree holds 4 leaves, right 2.
        assert_eq!(leaf_count(0, 11), 6);
        assert_eq!(leaf_count(1, 11), 4);
        assert_eq!(leaf_count(2, 11), 2);
        assert_eq!(leaf_count(10, 11), 1);
    }

    #[test]
    fn select_nth_partitions_around_the_element() {
        let values = [5.0, 1.0, 4.0, 4.0, 2.0, 9.0, 4.0, 0.0, 7.0];
        for nth in 0..values.len() {
            let mut order: Vec<usize> = (0..values.len()).collect();
            select_nth(&mut order, nth, |i| values[i]);
            let v = values[order[nth]];
            let mut sorted = values.to_vec();
            sorted.sort_by(f64::total_cmp);
            assert_eq!(v, sorted[nth]);
            assert!(order[..nth].iter().all(|&i| values[i] <= v));
            assert!(order[nth + 1..].iter().all(|&i| values[i] >= v));
        }
    }

    #[test]
    fn coincident_nodes_are_all_returned() {
        let tree = tree_of(&[(7, 5.0, 5.0), (9, 5.0, 5.0), (1, 0.0, 0.0), (2, 9.0, 1.0)]);
        let mut search = NearestSearch::new(&tree);
        assert_eq!(search.nearest(5.0, 5.0), 0.0);
        assert_eq!(sorted_ids(&search), vec![7, 9]);
        assert_eq!(search.nearest_iterative(5.0, 5.0), 0.0);
        assert_eq!(sorted_ids(&search), vec![7, 9]);
    }

    #[test]
    fn every_node_finds_itself() {
        let mut rng = StdRng::seed_from_u64(21);
        let points: Vec<_> = (0..500)
            .map(|id| (id, rng.random_range(8.0..10.0), rng.random_range(47.0..49.0)))
            .collect();
        let tree = tree_of(&points);
        assert!(tree.is_partitioned());
        let mut search = NearestSearch::new(&tree);
        for &(id, lon, lat) in &points {
            assert_eq!(search.nearest(lon, lat), 0.0);
            assert_eq!(search.ids().collect::<Vec<_>>(), vec![id]);
        }
    }

    #[test]
    fn equidistant_grid_points_are_ties() {
        let points: Vec<_> = (0..100)
            .map(|i| (i, (i % 10) as f64, (i / 10) as f64))
            .collect();
        let tree = tree_of(&points);
        assert!(tree.is_partitioned());
        let mut search = NearestSearch::new(&tree);
        assert_eq!(search.nearest(3.5, 6.5), std::f64::consts::FRAC_1_SQRT_2);
        assert_eq!(sorted_ids(&search), vec![63, 64, 73, 74]);
        search.nearest(2.0, 4.5);
        assert_eq!(sorted_ids(&search), vec![42, 52]);
    }

    #[test]
    fn agrees_with_brute_force_on_random_points() {
        let mut rng = StdRng::seed_from_u64(99);
        for n in [1, 2, 3, 5, 6, 17, 64, 1_000, 5_000] {
            let points: Vec<_> = (0..n)
                .map(|id| (id, rng.random_range(8.0..10.0), rng.random_range(47.0..49.0)))
                .collect();
            let tree = tree_of(&points);
            assert_eq!(tree.len(), n);
            assert!(tree.is_partitioned());
            assert_agrees(&tree, &mut rng, 150);
        }
    }

    #[test]
    fn agrees_with_brute_force_on_duplicates_and_grids() {
        let mut rng = StdRng::seed_from_u64(4);
        // Coarse coordinates force many duplicates and equal split values.
        let points: Vec<_> = (0..3_000)
            .map(|id| {
                (
                    id,
                    f64::from(rng.random_range(0..20u32)) * 0.25,
                    f64::from(rng.random_range(0..20u32)) * 0.25,
                )
            })
            .collect();
        let tree = tree_of(&points);
        assert!(tree.len() <= 400);
        assert_eq!(tree.locations().id_count(), 3_000);
        assert!(tree.is_partitioned());
        assert_agrees(&tree, &mut rng, 300);

        // Snap queries onto the half-grid where ties are exact.
        let mut fast = NearestSearch::new(&tree);
        let mut slow = NearestSearch::new(&tree);
        for _ in 0..200 {
            let lon = f64::from(rng.random_range(0..40u32)) * 0.125;
            let lat = f64::from(rng.random_range(0..40u32)) * 0.125;
            assert_eq!(fast.nearest(lon, lat), slow.nearest_iterative(lon, lat));
            assert_eq!(sorted_ids(&fast), sorted_ids(&slow));
        }
    }

    #[test]
    fn degenerate_axis_still_answers_correctly() {
        let mut rng = StdRng::seed_from_u64(8);
        let points: Vec<_> = (0..300).map(|id| (id, 9.0, rng.random_range(47.0..49.0))).collect();
        let tree = tree_of(&points);
        assert!(tree.is_partitioned());
        let mut fast = NearestSearch::new(&tree);
        let mut slow = NearestSearch::new(&tree);
        for _ in 0..100 {
            let lon = rng.random_range(8.0..10.0);
            let lat = rng.random_range(46.0..50.0);
            assert_eq!(fast.nearest(lon, lat), slow.nearest_iterative(lon, lat));
            assert_eq!(sorted_ids(&fast), sorted_ids(&slow));
        }
    }

    #[test]
    fn rebuilding_gives_the_same_answers() {
        let mut rng = StdRng::seed_from_u64(12);
        let points: Vec<_> = (0..2_000)
            .map(|id| (id, rng.random_range(0.0..1.0), rng.random_range(0.0..1.0)))
            .collect();
        let a = tree_of(&points);
        let b = tree_of(&points);
        let mut sa = NearestSearch::new(&a);
        let mut sb = NearestSearch::new(&b);
        for _ in 0..100 {
            let (lon, lat) = (rng.random_range(0.0..1.0), rng.random_range(0.0..1.0));
            assert_eq!(sa.nearest(lon, lat), sb.nearest(lon, lat));
            assert_eq!(sorted_ids(&sa), sorted_ids(&sb));
        }
    }

    #[test]
    fn empty_tree_finds_nothing() {
        let tree = tree_of(&[]);
        let mut search = NearestSearch::new(&tree);
        assert_eq!(search.nearest(1.0, 1.0), f64::INFINITY);
        assert_eq!(search.ids().count(), 0);
        assert_eq!(search.nearest_iterative(1.0, 1.0), f64::INFINITY);
        assert!(search.found_locations().is_empty());
    }

    #[test]
    fn accumulator_is_reset_between_queries() {
        let tree = tree_of(&[(0, 0.0, 0.0), (1, 10.0, 10.0)]);
        let mut search = NearestSearch::new(&tree);
        search.nearest(0.1, 0.1);
        assert_eq!(search.ids().collect::<Vec<_>>(), vec![0]);
        search.nearest(9.9, 9.9);
        assert_eq!(search.ids().collect::<Vec<_>>(), vec![1]);
        assert!(search.distance() > 0.0);
    }

    #[test]
    fn tree_is_shared_across_threads() {
        let mut rng = StdRng::seed_from_u64(2);
        let points: Vec<_> = (0..1_000)
            .map(|id| (id, rng.random_range(0.0..1.0), rng.random_range(0.0..1.0)))
            .collect();
        let tree = tree_of(&points);
        std::thread::scope(|scope| {
            for seed in 0..4 {
                let tree = &tree;
                scope.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(seed);
                    assert_agrees(tree, &mut rng, 50);
                });
            }
        });
    }
}
