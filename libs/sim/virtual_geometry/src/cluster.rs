//! The cluster DAG data model: [`MeshCluster`], [`MeshClusterGroup`], and
//! the per-submesh [`VirtualSubmesh`] that owns them.

use crate::sphere::BoundingSphere;
use mesh_simplify::Vertex;

/// Maximum triangles in one [`MeshCluster`].
pub const MAX_CLUSTER_TRIANGLES: u32 = 128;
/// Maximum clusters in one [`MeshClusterGroup`].
pub const MAX_GROUP_CLUSTERS: u32 = 32;

/// A bounded group of at most [`MAX_CLUSTER_TRIANGLES`] triangles: the unit
/// of virtual-geometry streaming.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshCluster {
    pub vertices: Vec<Vertex>,
    /// Triangle-list indices into `vertices`; length is a multiple of 3.
    pub indices: Vec<u32>,
    /// Index-array offsets whose opposite half-edge lies in another
    /// cluster (mip 0) or another cluster group (mip > 0).
    pub external_edges: Vec<u32>,
    /// The [`MeshClusterGroup`] this cluster belongs to, at its own mip
    /// level. `u32::MAX` until assigned by `build_cluster_groups`.
    pub group_id: u32,
    /// 0 = finest.
    pub mip_level: u32,
    pub lod_error: f32,
    pub bounding_sphere: BoundingSphere,
    pub lod_bounding_sphere: BoundingSphere,
}

impl MeshCluster {
    pub const UNASSIGNED_GROUP: u32 = u32::MAX;

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// A bounded group of at most [`MAX_GROUP_CLUSTERS`] clusters sharing a mip
/// level: the simplification unit for the next LOD.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshClusterGroup {
    pub mip_level: u32,
    pub cluster_indices: Vec<u32>,
    /// `(cluster_index, edge_start_index)` pairs identifying the group's
    /// external boundary.
    pub external_edges: Vec<(u32, u32)>,
    pub bounding_sphere: BoundingSphere,
    pub parent_lod_error: f32,
}

/// Ordered cluster array + cluster-group array for one submesh, forming a
/// DAG where clusters at mip `L+1` are the simplification of the group at
/// mip `L` they were built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VirtualSubmesh {
    pub clusters: Vec<MeshCluster>,
    pub cluster_groups: Vec<MeshClusterGroup>,
    pub mip_levels: u32,
}

impl VirtualSubmesh {
    pub fn clusters_at_mip(&self, mip: u32) -> impl Iterator<Item = (u32, &MeshCluster)> {
        self.clusters.iter().enumerate().filter(move |(_, c)| c.mip_level == mip).map(|(i, c)| (i as u32, c))
    }

    pub fn groups_at_mip(&self, mip: u32) -> impl Iterator<Item = (u32, &MeshClusterGroup)> {
        self.cluster_groups.iter().enumerate().filter(move |(_, g)| g.mip_level == mip).map(|(i, g)| (i as u32, g))
    }
}
