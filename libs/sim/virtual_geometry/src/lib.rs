//! Virtual geometry: builds a cluster DAG (bounded triangle clusters grouped
//! and progressively simplified across mip levels, terminating at a single
//! root cluster) from a raw triangle mesh, and persists it to a binary cache.

pub mod builder;
pub mod cache;
pub mod cluster;
pub mod error;
pub mod graph;
pub mod sphere;

pub use builder::{build_mesh, build_submesh, ClusterBuilderOptions, SubmeshInput};
pub use cache::{load_or_build, read_cache, write_cache};
pub use cluster::{MeshCluster, MeshClusterGroup, VirtualSubmesh, MAX_CLUSTER_TRIANGLES, MAX_GROUP_CLUSTERS};
pub use error::VirtualGeometryError;
pub use graph::{partition, AdjacencyGraph, PartitionResult};
pub use sphere::BoundingSphere;

#[cfg(test)]
mod test {
    use super::*;
    use mesh_simplify::Vertex;
    use nalgebra::{Point3, Vector2, Vector3, Vector4};

    fn grid_submesh(n: u32) -> SubmeshInput {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                vertices.push(Vertex::new(
                    Point3::new(x as f32, y as f32, 0.0),
                    Vector3::new(0.0, 0.0, 1.0),
                    Vector4::new(1.0, 0.0, 0.0, 1.0),
                    Vector2::new(0.0, 0.0),
                ));
            }
        }
        for y in 0..n {
            for x in 0..n {
                let i0 = y * (n + 1) + x;
                let i1 = i0 + 1;
                let i2 = i0 + (n + 1);
                let i3 = i2 + 1;
                indices.extend_from_slice(&[i0, i2, i1, i1, i2, i3]);
            }
        }
        SubmeshInput { vertices, indices }
    }

    #[test]
    fn single_cluster_mesh_has_one_mip_level() {
        // A handful of triangles fits in one cluster; the DAG should
        // terminate immediately at the root with no grouping pass.
        let submesh = build_submesh(&grid_submesh(2), ClusterBuilderOptions::default()).expect("build succeeds");
        assert_eq!(submesh.mip_levels, 1);
        assert_eq!(submesh.clusters_at_mip(0).count(), 1);
    }

    #[test]
    fn large_mesh_builds_a_multi_level_dag_rooted_at_one_cluster() {
        let submesh = build_submesh(&grid_submesh(40), ClusterBuilderOptions::default()).expect("build succeeds");
        assert!(submesh.mip_levels > 1);
        assert_eq!(submesh.clusters_at_mip(submesh.mip_levels - 1).count(), 1);
        for level in 0..submesh.mip_levels {
            for (_, cluster) in submesh.clusters_at_mip(level) {
                assert!(cluster.triangle_count() as u32 <= MAX_CLUSTER_TRIANGLES);
            }
        }
    }

    #[test]
    fn coarser_levels_have_non_decreasing_lod_error() {
        let submesh = build_submesh(&grid_submesh(40), ClusterBuilderOptions::default()).expect("build succeeds");
        let mut max_error_at = vec![0.0f32; submesh.mip_levels as usize];
        for cluster in &submesh.clusters {
            max_error_at[cluster.mip_level as usize] = max_error_at[cluster.mip_level as usize].max(cluster.lod_error);
        }
        for pair in max_error_at.windows(2) {
            assert!(pair[1] >= pair[0] - 1.0e-5, "lod error should not decrease going coarser: {:?}", max_error_at);
        }
    }

    #[test]
    fn every_cluster_above_root_is_assigned_to_a_group() {
        let submesh = build_submesh(&grid_submesh(40), ClusterBuilderOptions::default()).expect("build succeeds");
        for level in 0..submesh.mip_levels - 1 {
            for (_, cluster) in submesh.clusters_at_mip(level) {
                assert_ne!(cluster.group_id, MeshCluster::UNASSIGNED_GROUP);
            }
        }
    }

    #[test]
    fn build_mesh_processes_every_submesh() {
        let inputs = vec![grid_submesh(2), grid_submesh(6)];
        let submeshes = build_mesh(&inputs, ClusterBuilderOptions::default()).expect("build succeeds");
        assert_eq!(submeshes.len(), 2);
    }
}
