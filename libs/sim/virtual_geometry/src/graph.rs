//! Weighted adjacency graphs and the balanced recursive-bisection
//! partitioner that turns one into contiguous, bounded-size parts.
//!
//! The partitioner is consumed as a black box by the cluster/group builder:
//! any algorithm honoring the `(node_indices, node_map, part_ranges)`
//! contract is substitutable, matching the source engine's use of an
//! external graph-partitioning library behind the same interface. This one
//! is a greedy weighted flood-fill seeded bisection with a light
//! Kernighan-Lin-style swap pass to nudge undersized parts toward
//! `min_part_size`.

use fxhash::{FxHashMap, FxHashSet};

/// A weighted undirected adjacency graph over `0..node_count`.
#[derive(Debug, Clone)]
pub struct AdjacencyGraph {
    neighbors: Vec<FxHashMap<u32, u32>>,
}

impl AdjacencyGraph {
    pub fn with_node_count(node_count: usize) -> Self {
        Self { neighbors: vec![FxHashMap::default(); node_count] }
    }

    pub fn node_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Accumulate `weight` onto the undirected edge `(a, b)`. Self-edges are
    /// ignored (a node is never its own neighbor in these graphs).
    pub fn add_edge(&mut self, a: u32, b: u32, weight: u32) {
        if a == b {
            return;
        }
        *self.neighbors[a as usize].entry(b).or_insert(0) += weight;
        *self.neighbors[b as usize].entry(a).or_insert(0) += weight;
    }

    pub fn neighbors(&self, node: u32) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.neighbors[node as usize].iter().map(|(&n, &w)| (n, w))
    }

    fn affinity(&self, node: u32, part: &FxHashSet<u32>) -> u32 {
        self.neighbors[node as usize].iter().filter(|(n, _)| part.contains(n)).map(|(_, &w)| w).sum()
    }
}

/// Output of [`partition`]: a reordering of `0..node_count` into contiguous
/// parts, plus the inverse map from original node id to new position.
#[derive(Debug, Clone)]
pub struct PartitionResult {
    pub node_indices: Vec<u32>,
    pub node_map: Vec<u32>,
    pub part_ranges: Vec<(u32, u32)>,
}

/// Partition `graph` into contiguous parts sized within
/// `[min_part_size, max_part_size]` wherever the node count allows it (a
/// final leftover part may fall short of `min_part_size`).
pub fn partition(graph: &AdjacencyGraph, min_part_size: u32, max_part_size: u32) -> PartitionResult {
    let node_count = graph.node_count();
    assert!(max_part_size > 0, "max_part_size must be positive");

    if node_count as u32 <= max_part_size {
        let node_indices: Vec<u32> = (0..node_count as u32).collect();
        return PartitionResult { node_map: node_indices.clone(), part_ranges: vec![(0, node_count as u32)], node_indices };
    }

    let mut unassigned: FxHashSet<u32> = (0..node_count as u32).collect();
    let mut parts: Vec<Vec<u32>> = Vec::new();

    while !unassigned.is_empty() {
        let remaining = unassigned.len() as u32;
        let target_size = max_part_size.min(remaining);
        let seed = *unassigned.iter().min().expect("unassigned is non-empty");
        unassigned.remove(&seed);

        let mut part_set: FxHashSet<u32> = FxHashSet::default();
        part_set.insert(seed);
        let mut part: Vec<u32> = vec![seed];

        while part.len() < target_size as usize {
            let mut candidates: Vec<(u32, u32)> = unassigned.iter().map(|&n| (graph.affinity(n, &part_set), n)).collect();
            let best = candidates.iter().copied().max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
            let chosen = match best {
                Some((score, node)) if score > 0 => node,
                _ => {
                    // No remaining node is connected to this part; start a
                    // fresh component within the same part from the lowest
                    // unassigned id, keeping ordering deterministic.
                    match unassigned.iter().min().copied() {
                        Some(node) => node,
                        None => break,
                    }
                }
            };
            candidates.clear();
            unassigned.remove(&chosen);
            part_set.insert(chosen);
            part.push(chosen);
        }

        parts.push(part);
    }

    refine_undersized_parts(graph, &mut parts, min_part_size);

    let mut node_indices = Vec::with_capacity(node_count);
    let mut part_ranges = Vec::with_capacity(parts.len());
    for part in &parts {
        let start = node_indices.len() as u32;
        node_indices.extend_from_slice(part);
        part_ranges.push((start, node_indices.len() as u32));
    }
    let mut node_map = vec![0u32; node_count];
    for (new_pos, &old_node) in node_indices.iter().enumerate() {
        node_map[old_node as usize] = new_pos as u32;
    }

    PartitionResult { node_indices, node_map, part_ranges }
}

/// Single best-effort pass: for every part short of `min_part_size` (other
/// than a trailing leftover that cannot be helped), pull in the
/// highest-affinity node from a neighboring part that can afford to give
/// one up without itself dropping below `min_part_size`.
fn refine_undersized_parts(graph: &AdjacencyGraph, parts: &mut [Vec<u32>], min_part_size: u32) {
    let part_count = parts.len();
    for i in 0..part_count {
        while (parts[i].len() as u32) < min_part_size {
            let part_set: FxHashSet<u32> = parts[i].iter().copied().collect();
            let mut best: Option<(u32, usize, usize)> = None; // (affinity, donor_part, node_index_in_donor)
            for (j, donor) in parts.iter().enumerate() {
                if j == i || donor.len() as u32 <= min_part_size {
                    continue;
                }
                for (idx, &node) in donor.iter().enumerate() {
                    let affinity = graph.affinity(node, &part_set);
                    if affinity == 0 {
                        continue;
                    }
                    let better = match best {
                        None => true,
                        Some((best_affinity, _, _)) => affinity > best_affinity,
                    };
                    if better {
                        best = Some((affinity, j, idx));
                    }
                }
            }
            match best {
                Some((_, donor_part, node_index)) => {
                    let node = parts[donor_part].remove(node_index);
                    parts[i].push(node);
                }
                None => break,
            }
        }
    }
}
