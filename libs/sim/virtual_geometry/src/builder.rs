//! The virtual geometry builder: partitions a triangle list into clusters,
//! groups clusters, simplifies each group to produce the next LOD, and
//! recurses until a single root cluster remains.

use crate::cluster::{MeshCluster, MeshClusterGroup, VirtualSubmesh, MAX_CLUSTER_TRIANGLES, MAX_GROUP_CLUSTERS};
use crate::error::VirtualGeometryError;
use crate::graph::{partition, AdjacencyGraph};
use crate::sphere::BoundingSphere;
use fxhash::FxHashMap;
use mesh_simplify::{MeshSimplifier, SimplifierOptions, Vertex};
use rayon::prelude::*;
use spatial_hash::position_hash;
use tracing::{debug, info_span};

/// Tunable cluster/group sizes. Embedded in the on-disk cache header so a
/// parameter change invalidates a stale cache (Section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterBuilderOptions {
    pub max_cluster_triangles: u32,
    pub max_group_clusters: u32,
}

impl Default for ClusterBuilderOptions {
    fn default() -> Self {
        Self { max_cluster_triangles: MAX_CLUSTER_TRIANGLES, max_group_clusters: MAX_GROUP_CLUSTERS }
    }
}

/// One submesh's raw triangle list, as handed to the builder.
#[derive(Debug, Clone)]
pub struct SubmeshInput {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

fn next_in_triangle(offset: u32) -> u32 {
    let base = offset - offset % 3;
    base + (offset - base + 1) % 3
}

/// Half-edge opposite-partner table for a single triangle list: half-edge
/// `i` pairs `(indices[i], indices[next_in_triangle(i)])` with every other
/// half-edge carrying the reversed endpoint pair.
fn half_edge_opposites(indices: &[u32]) -> Vec<Vec<u32>> {
    let mut by_pair: FxHashMap<(u32, u32), Vec<u32>> = FxHashMap::default();
    for i in 0..indices.len() as u32 {
        let a = indices[i as usize];
        let b = indices[next_in_triangle(i) as usize];
        by_pair.entry((a, b)).or_default().push(i);
    }
    let mut opposites = vec![Vec::new(); indices.len()];
    for i in 0..indices.len() as u32 {
        let a = indices[i as usize];
        let b = indices[next_in_triangle(i) as usize];
        if let Some(partners) = by_pair.get(&(b, a)) {
            opposites[i as usize] = partners.clone();
        }
    }
    opposites
}

fn triangle_adjacency_graph(indices: &[u32], opposites: &[Vec<u32>]) -> AdjacencyGraph {
    let triangle_count = indices.len() / 3;
    let mut graph = AdjacencyGraph::with_node_count(triangle_count);
    for (offset, partners) in opposites.iter().enumerate() {
        let t = (offset / 3) as u32;
        for &partner_offset in partners {
            let other_t = partner_offset / 3;
            if other_t != t {
                graph.add_edge(t, other_t, 1);
            }
        }
    }
    graph
}

fn part_of(new_position: u32, part_ranges: &[(u32, u32)]) -> u32 {
    part_ranges
        .iter()
        .position(|&(start, end)| new_position >= start && new_position < end)
        .expect("every partitioned node falls in exactly one part") as u32
}

/// `cluster_triangles`: partition a triangle list into clusters of at most
/// `max_cluster_triangles` triangles.
fn cluster_triangles(vertices: &[Vertex], indices: &[u32], mip_level: u32, max_cluster_triangles: u32) -> Vec<MeshCluster> {
    let triangle_count = (indices.len() / 3) as u32;
    if triangle_count == 0 {
        return Vec::new();
    }
    let opposites = half_edge_opposites(indices);
    let graph = triangle_adjacency_graph(indices, &opposites);
    let min_part = max_cluster_triangles.saturating_sub(4).max(1);
    let result = partition(&graph, min_part, max_cluster_triangles);

    result
        .part_ranges
        .iter()
        .map(|&(start, end)| {
            let mut local_vertex_map: FxHashMap<u32, u32> = FxHashMap::default();
            let mut cluster_vertices = Vec::new();
            let mut cluster_indices = Vec::new();
            let mut external_edges = Vec::new();

            for &original_t in result.node_indices[start as usize..end as usize].iter() {
                let base = 3 * original_t;
                for slot in 0..3 {
                    let offset = base + slot;
                    let global_vi = indices[offset as usize];
                    let local_vi = *local_vertex_map.entry(global_vi).or_insert_with(|| {
                        cluster_vertices.push(vertices[global_vi as usize]);
                        (cluster_vertices.len() - 1) as u32
                    });
                    let local_offset = cluster_indices.len() as u32;
                    cluster_indices.push(local_vi);

                    let partners = &opposites[offset as usize];
                    let is_external = partners.is_empty()
                        || partners.iter().any(|&p| {
                            let other_t = p / 3;
                            part_of(result.node_map[other_t as usize], &result.part_ranges) != part_of(result.node_map[original_t as usize], &result.part_ranges)
                        });
                    if is_external {
                        external_edges.push(local_offset);
                    }
                }
            }

            let positions: Vec<_> = cluster_vertices.iter().map(|v| v.position).collect();
            let bounding_sphere = BoundingSphere::enclosing(&positions);
            MeshCluster {
                vertices: cluster_vertices,
                indices: cluster_indices,
                external_edges,
                group_id: MeshCluster::UNASSIGNED_GROUP,
                mip_level,
                lod_error: 0.0,
                bounding_sphere,
                lod_bounding_sphere: bounding_sphere,
            }
        })
        .collect()
}

/// `build_cluster_groups` at level `L`: groups the clusters named by
/// `cluster_ids` (all must be at mip `L`) into [`MeshClusterGroup`]s and
/// assigns each cluster's `group_id`. Returns the new groups' indices.
fn build_cluster_groups(submesh: &mut VirtualSubmesh, level: u32, cluster_ids: &[u32], max_group_clusters: u32) -> Result<Vec<u32>, VirtualGeometryError> {
    // registry entry: (local cluster index into `cluster_ids`, edge offset)
    let mut registry: Vec<(u32, u32)> = Vec::new();
    for (local_idx, &cid) in cluster_ids.iter().enumerate() {
        for &offset in &submesh.clusters[cid as usize].external_edges {
            registry.push((local_idx as u32, offset));
        }
    }

    let mut by_pair: FxHashMap<(u32, u32), Vec<usize>> = FxHashMap::default();
    for (entry_idx, &(local_idx, offset)) in registry.iter().enumerate() {
        let cluster = &submesh.clusters[cluster_ids[local_idx as usize] as usize];
        let a = cluster.vertices[cluster.indices[offset as usize] as usize].position;
        let b = cluster.vertices[cluster.indices[next_in_triangle(offset) as usize] as usize].position;
        by_pair.entry((position_hash(&a), position_hash(&b))).or_default().push(entry_idx);
    }

    let mut graph = AdjacencyGraph::with_node_count(cluster_ids.len());
    let mut matched_opposite: Vec<Option<usize>> = vec![None; registry.len()];
    for (entry_idx, &(local_idx, offset)) in registry.iter().enumerate() {
        let cluster = &submesh.clusters[cluster_ids[local_idx as usize] as usize];
        let a = cluster.vertices[cluster.indices[offset as usize] as usize].position;
        let b = cluster.vertices[cluster.indices[next_in_triangle(offset) as usize] as usize].position;
        if let Some(partners) = by_pair.get(&(position_hash(&b), position_hash(&a))) {
            for &partner_idx in partners {
                let (partner_local, _) = registry[partner_idx];
                if partner_local != local_idx {
                    graph.add_edge(local_idx, partner_local, 1);
                    matched_opposite[entry_idx] = Some(partner_idx);
                }
            }
        }
    }

    let min_part = max_group_clusters.saturating_sub(4).max(1);
    let result = partition(&graph, min_part, max_group_clusters);

    let mut new_group_ids = Vec::with_capacity(result.part_ranges.len());
    for &(start, end) in &result.part_ranges {
        let local_members = &result.node_indices[start as usize..end as usize];
        let members_part = |local: u32| part_of(result.node_map[local as usize], &result.part_ranges);
        let this_part = members_part(local_members[0]);

        let mut group_cluster_indices = Vec::with_capacity(local_members.len());
        for &local in local_members {
            group_cluster_indices.push(cluster_ids[local as usize]);
        }

        let mut external_edges = Vec::new();
        for (entry_idx, &(local_idx, offset)) in registry.iter().enumerate() {
            if members_part(local_idx) != this_part {
                continue;
            }
            let is_external = match matched_opposite[entry_idx] {
                None => true,
                Some(partner_idx) => {
                    let (partner_local, _) = registry[partner_idx];
                    members_part(partner_local) != this_part
                }
            };
            if is_external {
                external_edges.push((cluster_ids[local_idx as usize], offset));
            }
        }

        let bounding_sphere = BoundingSphere::merge_all(group_cluster_indices.iter().map(|&cid| &submesh.clusters[cid as usize].lod_bounding_sphere));

        let group_id = submesh.cluster_groups.len() as u32;
        for &cid in &group_cluster_indices {
            submesh.clusters[cid as usize].group_id = group_id;
        }
        submesh.cluster_groups.push(MeshClusterGroup {
            mip_level: level,
            cluster_indices: group_cluster_indices,
            external_edges,
            bounding_sphere,
            parent_lod_error: 0.0,
        });
        new_group_ids.push(group_id);
    }

    if new_group_ids.is_empty() && cluster_ids.len() > 1 {
        return Err(VirtualGeometryError::ZeroGroupsProduced { level, cluster_count: cluster_ids.len() as u32 });
    }
    Ok(new_group_ids)
}

struct ParentClusterResult {
    new_clusters: Vec<MeshCluster>,
    parent_lod_error: f32,
    bounding_sphere: BoundingSphere,
}

/// `build_parent_clusters`: simplify one group's concatenated geometry and
/// re-cluster it into the next mip level. Pure with respect to `submesh`
/// (reads only); callers apply the returned group-level updates themselves,
/// which lets independent groups within a level run concurrently.
fn build_parent_clusters(
    submesh: &VirtualSubmesh,
    group_id: u32,
    options: ClusterBuilderOptions,
) -> Result<ParentClusterResult, VirtualGeometryError> {
    let group = &submesh.cluster_groups[group_id as usize];
    let level = group.mip_level;

    let mut concat_vertices = Vec::new();
    let mut concat_indices = Vec::new();
    let mut vertex_offset_of_cluster = Vec::with_capacity(group.cluster_indices.len());
    for &cid in &group.cluster_indices {
        let cluster = &submesh.clusters[cid as usize];
        vertex_offset_of_cluster.push(concat_vertices.len() as u32);
        concat_vertices.extend_from_slice(&cluster.vertices);
        concat_indices.extend(cluster.indices.iter().map(|&i| i + *vertex_offset_of_cluster.last().unwrap()));
    }

    let bounding_sphere = BoundingSphere::merge_all(group.cluster_indices.iter().map(|&cid| &submesh.clusters[cid as usize].lod_bounding_sphere));
    let mut parent_lod_error = group.cluster_indices.iter().map(|&cid| submesh.clusters[cid as usize].lod_error).fold(0.0_f32, f32::max);

    let mut simplifier = MeshSimplifier::new(concat_vertices, concat_indices, SimplifierOptions::default());

    let mut locked_positions: Vec<nalgebra::Point3<f32>> = Vec::new();
    for &(cid, offset) in &group.external_edges {
        let cluster = &submesh.clusters[cid as usize];
        let a = cluster.vertices[cluster.indices[offset as usize] as usize].position;
        let b = cluster.vertices[cluster.indices[next_in_triangle(offset) as usize] as usize].position;
        simplifier.lock_position(&a);
        simplifier.lock_position(&b);
        locked_positions.push(a);
        locked_positions.push(b);
    }
    let locked_hashes: std::collections::HashSet<u32> = locked_positions.iter().map(position_hash).collect();

    let cluster_count = group.cluster_indices.len() as u32;
    let target = (options.max_cluster_triangles - 2) * (cluster_count / 2).max(1);

    let report = simplifier.simplify(target).map_err(|source| VirtualGeometryError::SimplifierFailed { group_index: group_id, source })?;
    parent_lod_error = parent_lod_error.max((report.max_error as f32).sqrt());

    let (simplified_vertices, simplified_indices) = simplifier.into_parts();
    let mut new_clusters = cluster_triangles(&simplified_vertices, &simplified_indices, level + 1, options.max_cluster_triangles);

    for cluster in &mut new_clusters {
        cluster.lod_error = parent_lod_error;
        cluster.lod_bounding_sphere = bounding_sphere;
        for offset in 0..cluster.indices.len() as u32 {
            if cluster.external_edges.contains(&offset) {
                continue;
            }
            let a = cluster.vertices[cluster.indices[offset as usize] as usize].position;
            let b = cluster.vertices[cluster.indices[next_in_triangle(offset) as usize] as usize].position;
            if locked_hashes.contains(&position_hash(&a)) && locked_hashes.contains(&position_hash(&b)) {
                cluster.external_edges.push(offset);
            }
        }
    }

    Ok(ParentClusterResult { new_clusters, parent_lod_error, bounding_sphere })
}

/// Build the full cluster DAG for one submesh, recursing until a level
/// produces at most one cluster.
pub fn build_submesh(input: &SubmeshInput, options: ClusterBuilderOptions) -> Result<VirtualSubmesh, VirtualGeometryError> {
    let span = info_span!("build_submesh", triangles = input.indices.len() / 3);
    let _enter = span.enter();

    // A Mesh-Simplifier-validated copy: run `fix_triangle` coalescing with
    // target == current count so only duplicate/degenerate cleanup happens.
    let triangle_count = (input.indices.len() / 3) as u32;
    let mut validator = MeshSimplifier::new(input.vertices.clone(), input.indices.clone(), SimplifierOptions::default());
    validator.simplify(triangle_count).map_err(|source| VirtualGeometryError::SimplifierFailed { group_index: u32::MAX, source })?;
    let (vertices, indices) = validator.into_parts();

    let mut submesh = VirtualSubmesh::default();
    submesh.clusters = cluster_triangles(&vertices, &indices, 0, options.max_cluster_triangles);

    let mut level = 0;
    loop {
        let cluster_ids: Vec<u32> = submesh.clusters_at_mip(level).map(|(i, _)| i).collect();
        if cluster_ids.is_empty() {
            return Err(VirtualGeometryError::EmptyLevel { level, remaining: 0 });
        }
        if cluster_ids.len() <= 1 {
            break;
        }

        let group_ids = build_cluster_groups(&mut submesh, level, &cluster_ids, options.max_group_clusters)?;

        let results: Vec<Result<ParentClusterResult, VirtualGeometryError>> =
            group_ids.par_iter().map(|&gid| build_parent_clusters(&submesh, gid, options)).collect();

        for (gid, result) in group_ids.into_iter().zip(results.into_iter()) {
            let result = result?;
            submesh.cluster_groups[gid as usize].parent_lod_error = result.parent_lod_error;
            submesh.cluster_groups[gid as usize].bounding_sphere = result.bounding_sphere;
            submesh.clusters.extend(result.new_clusters);
        }

        debug!(level, clusters_at_level = cluster_ids.len(), "built cluster group level");
        level += 1;
    }

    submesh.mip_levels = level + 1;
    Ok(submesh)
}

/// Build cluster DAGs for every submesh of a mesh. Independent submeshes
/// build concurrently on the shared rayon pool (Section 5).
pub fn build_mesh(submeshes: &[SubmeshInput], options: ClusterBuilderOptions) -> Result<Vec<VirtualSubmesh>, VirtualGeometryError> {
    submeshes.par_iter().map(|s| build_submesh(s, options)).collect()
}
