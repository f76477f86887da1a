//! Binary on-disk cache for a submesh's cluster DAG ("assets/cache/virtual_mesh/<name>.vm").
//!
//! Layout: `u32 cluster_size`, `u32 group_size`, `u64 submesh_count`, then
//! per submesh `u32 mip_levels`, `u64 cluster_count`, `u64 cluster_group_count`,
//! clusters, then cluster groups. A header mismatch against the caller's
//! current [`ClusterBuilderOptions`] means the whole file is stale and must
//! be rebuilt, never patched in place.

use crate::builder::ClusterBuilderOptions;
use crate::cluster::{MeshCluster, MeshClusterGroup, VirtualSubmesh};
use crate::error::VirtualGeometryError;
use crate::sphere::BoundingSphere;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use mesh_simplify::Vertex;
use nalgebra::{Point3, Vector2, Vector3, Vector4};
use std::io::{self, Read, Write};
use std::path::Path;

fn write_vertex<W: Write>(w: &mut W, v: &Vertex) -> io::Result<()> {
    for component in [v.position.x, v.position.y, v.position.z] {
        w.write_f32::<LittleEndian>(component)?;
    }
    for component in [v.normal.x, v.normal.y, v.normal.z] {
        w.write_f32::<LittleEndian>(component)?;
    }
    for component in [v.tangent.x, v.tangent.y, v.tangent.z, v.tangent.w] {
        w.write_f32::<LittleEndian>(component)?;
    }
    w.write_f32::<LittleEndian>(v.uv.x)?;
    w.write_f32::<LittleEndian>(v.uv.y)?;
    Ok(())
}

fn read_vertex<R: Read>(r: &mut R) -> io::Result<Vertex> {
    let position = Point3::new(r.read_f32::<LittleEndian>()?, r.read_f32::<LittleEndian>()?, r.read_f32::<LittleEndian>()?);
    let normal = Vector3::new(r.read_f32::<LittleEndian>()?, r.read_f32::<LittleEndian>()?, r.read_f32::<LittleEndian>()?);
    let tangent = Vector4::new(
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
    );
    let uv = Vector2::new(r.read_f32::<LittleEndian>()?, r.read_f32::<LittleEndian>()?);
    Ok(Vertex::new(position, normal, tangent, uv))
}

fn write_sphere<W: Write>(w: &mut W, s: &BoundingSphere) -> io::Result<()> {
    w.write_f32::<LittleEndian>(s.center.x)?;
    w.write_f32::<LittleEndian>(s.center.y)?;
    w.write_f32::<LittleEndian>(s.center.z)?;
    w.write_f32::<LittleEndian>(s.radius)?;
    Ok(())
}

fn read_sphere<R: Read>(r: &mut R) -> io::Result<BoundingSphere> {
    let center = Point3::new(r.read_f32::<LittleEndian>()?, r.read_f32::<LittleEndian>()?, r.read_f32::<LittleEndian>()?);
    let radius = r.read_f32::<LittleEndian>()?;
    Ok(BoundingSphere::new(center, radius))
}

fn write_cluster<W: Write>(w: &mut W, c: &MeshCluster) -> io::Result<()> {
    w.write_u64::<LittleEndian>(c.vertices.len() as u64)?;
    for v in &c.vertices {
        write_vertex(w, v)?;
    }
    w.write_u64::<LittleEndian>(c.indices.len() as u64)?;
    for &i in &c.indices {
        w.write_u32::<LittleEndian>(i)?;
    }
    w.write_u64::<LittleEndian>(c.external_edges.len() as u64)?;
    for &e in &c.external_edges {
        w.write_u32::<LittleEndian>(e)?;
    }
    w.write_u32::<LittleEndian>(c.group_id)?;
    w.write_u32::<LittleEndian>(c.mip_level)?;
    w.write_f32::<LittleEndian>(c.lod_error)?;
    write_sphere(w, &c.bounding_sphere)?;
    write_sphere(w, &c.lod_bounding_sphere)?;
    Ok(())
}

fn read_cluster<R: Read>(r: &mut R) -> io::Result<MeshCluster> {
    let vertex_count = r.read_u64::<LittleEndian>()? as usize;
    let mut vertices = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        vertices.push(read_vertex(r)?);
    }
    let index_count = r.read_u64::<LittleEndian>()? as usize;
    let mut indices = Vec::with_capacity(index_count);
    for _ in 0..index_count {
        indices.push(r.read_u32::<LittleEndian>()?);
    }
    let external_edge_count = r.read_u64::<LittleEndian>()? as usize;
    let mut external_edges = Vec::with_capacity(external_edge_count);
    for _ in 0..external_edge_count {
        external_edges.push(r.read_u32::<LittleEndian>()?);
    }
    let group_id = r.read_u32::<LittleEndian>()?;
    let mip_level = r.read_u32::<LittleEndian>()?;
    let lod_error = r.read_f32::<LittleEndian>()?;
    let bounding_sphere = read_sphere(r)?;
    let lod_bounding_sphere = read_sphere(r)?;
    Ok(MeshCluster { vertices, indices, external_edges, group_id, mip_level, lod_error, bounding_sphere, lod_bounding_sphere })
}

fn write_group<W: Write>(w: &mut W, g: &MeshClusterGroup) -> io::Result<()> {
    w.write_u32::<LittleEndian>(g.mip_level)?;
    w.write_u64::<LittleEndian>(g.cluster_indices.len() as u64)?;
    for &c in &g.cluster_indices {
        w.write_u32::<LittleEndian>(c)?;
    }
    w.write_u64::<LittleEndian>(g.external_edges.len() as u64)?;
    for &(cluster, offset) in &g.external_edges {
        w.write_u32::<LittleEndian>(cluster)?;
        w.write_u32::<LittleEndian>(offset)?;
    }
    write_sphere(w, &g.bounding_sphere)?;
    w.write_f32::<LittleEndian>(g.parent_lod_error)?;
    Ok(())
}

fn read_group<R: Read>(r: &mut R) -> io::Result<MeshClusterGroup> {
    let mip_level = r.read_u32::<LittleEndian>()?;
    let cluster_count = r.read_u64::<LittleEndian>()? as usize;
    let mut cluster_indices = Vec::with_capacity(cluster_count);
    for _ in 0..cluster_count {
        cluster_indices.push(r.read_u32::<LittleEndian>()?);
    }
    let external_edge_count = r.read_u64::<LittleEndian>()? as usize;
    let mut external_edges = Vec::with_capacity(external_edge_count);
    for _ in 0..external_edge_count {
        external_edges.push((r.read_u32::<LittleEndian>()?, r.read_u32::<LittleEndian>()?));
    }
    let bounding_sphere = read_sphere(r)?;
    let parent_lod_error = r.read_f32::<LittleEndian>()?;
    Ok(MeshClusterGroup { mip_level, cluster_indices, external_edges, bounding_sphere, parent_lod_error })
}

/// Write `submeshes` to `path` under the header described in the module
/// docs, tagged with the `options` they were built with.
pub fn write_cache(path: &Path, options: ClusterBuilderOptions, submeshes: &[VirtualSubmesh]) -> Result<(), VirtualGeometryError> {
    let write = || -> io::Result<()> {
        let mut f = io::BufWriter::new(std::fs::File::create(path)?);
        f.write_u32::<LittleEndian>(options.max_cluster_triangles)?;
        f.write_u32::<LittleEndian>(options.max_group_clusters)?;
        f.write_u64::<LittleEndian>(submeshes.len() as u64)?;
        for submesh in submeshes {
            f.write_u32::<LittleEndian>(submesh.mip_levels)?;
            f.write_u64::<LittleEndian>(submesh.clusters.len() as u64)?;
            f.write_u64::<LittleEndian>(submesh.cluster_groups.len() as u64)?;
            for cluster in &submesh.clusters {
                write_cluster(&mut f, cluster)?;
            }
            for group in &submesh.cluster_groups {
                write_group(&mut f, group)?;
            }
        }
        f.flush()
    };
    write().map_err(|source| VirtualGeometryError::CacheCorrupt { path: path.display().to_string(), source })
}

/// Read a cache file written by [`write_cache`]. Returns
/// [`VirtualGeometryError::CacheSchemaMismatch`] if the header's cluster or
/// group size does not match `options` — callers should treat that as "stale,
/// rebuild from source" rather than attempt a partial repair.
pub fn read_cache(path: &Path, options: ClusterBuilderOptions) -> Result<Vec<VirtualSubmesh>, VirtualGeometryError> {
    let to_corrupt = |source: io::Error| VirtualGeometryError::CacheCorrupt { path: path.display().to_string(), source };

    let mut f = io::BufReader::new(std::fs::File::open(path).map_err(to_corrupt)?);
    let cluster_size = f.read_u32::<LittleEndian>().map_err(to_corrupt)?;
    let group_size = f.read_u32::<LittleEndian>().map_err(to_corrupt)?;
    if cluster_size != options.max_cluster_triangles || group_size != options.max_group_clusters {
        return Err(VirtualGeometryError::CacheSchemaMismatch {
            path: path.display().to_string(),
            reason: format!(
                "cache built with cluster_size={cluster_size} group_size={group_size}, current options want {}/{}",
                options.max_cluster_triangles, options.max_group_clusters
            ),
        });
    }

    let submesh_count = f.read_u64::<LittleEndian>().map_err(to_corrupt)? as usize;
    let mut submeshes = Vec::with_capacity(submesh_count);
    for _ in 0..submesh_count {
        let mip_levels = f.read_u32::<LittleEndian>().map_err(to_corrupt)?;
        let cluster_count = f.read_u64::<LittleEndian>().map_err(to_corrupt)? as usize;
        let group_count = f.read_u64::<LittleEndian>().map_err(to_corrupt)? as usize;
        let mut clusters = Vec::with_capacity(cluster_count);
        for _ in 0..cluster_count {
            clusters.push(read_cluster(&mut f).map_err(to_corrupt)?);
        }
        let mut cluster_groups = Vec::with_capacity(group_count);
        for _ in 0..group_count {
            cluster_groups.push(read_group(&mut f).map_err(to_corrupt)?);
        }
        submeshes.push(VirtualSubmesh { clusters, cluster_groups, mip_levels });
    }
    Ok(submeshes)
}

/// Load `path` if it matches `options`'s cluster/group sizes, otherwise
/// rebuild from `inputs` and overwrite the file (Recoverable: stale cache,
/// Section 9 error table).
pub fn load_or_build(
    path: &Path,
    options: ClusterBuilderOptions,
    inputs: &[crate::builder::SubmeshInput],
) -> Result<Vec<VirtualSubmesh>, VirtualGeometryError> {
    if path.exists() {
        match read_cache(path, options) {
            Ok(submeshes) => return Ok(submeshes),
            Err(VirtualGeometryError::CacheSchemaMismatch { reason, .. }) => {
                tracing::warn!(path = %path.display(), reason, "virtual mesh cache is stale, rebuilding");
            }
            Err(err) => return Err(err),
        }
    }
    let submeshes = crate::builder::build_mesh(inputs, options)?;
    write_cache(path, options, &submeshes)?;
    Ok(submeshes)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::builder::{build_submesh, SubmeshInput};
    use mesh_simplify::Vertex;
    use nalgebra::{Vector2, Vector3, Vector4};

    fn grid_submesh(n: u32) -> SubmeshInput {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                vertices.push(Vertex::new(Point3::new(x as f32, y as f32, 0.0), Vector3::new(0.0, 0.0, 1.0), Vector4::new(1.0, 0.0, 0.0, 1.0), Vector2::new(0.0, 0.0)));
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
    fn round_trips_through_disk() {
        let options = ClusterBuilderOptions::default();
        let submesh = build_submesh(&grid_submesh(4), options).expect("build succeeds");
        let path = std::env::temp_dir().join(format!("virtual_geometry_cache_test_{}.vm", std::process::id()));
        write_cache(&path, options, std::slice::from_ref(&submesh)).expect("write succeeds");
        let loaded = read_cache(&path, options).expect("read succeeds");
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].mip_levels, submesh.mip_levels);
        assert_eq!(loaded[0].clusters.len(), submesh.clusters.len());
        assert_eq!(loaded[0].cluster_groups.len(), submesh.cluster_groups.len());
    }

    #[test]
    fn mismatched_options_is_reported_as_schema_mismatch() {
        let built = ClusterBuilderOptions::default();
        let submesh = build_submesh(&grid_submesh(4), built).expect("build succeeds");
        let path = std::env::temp_dir().join(format!("virtual_geometry_cache_mismatch_{}.vm", std::process::id()));
        write_cache(&path, built, std::slice::from_ref(&submesh)).expect("write succeeds");

        let different = ClusterBuilderOptions { max_cluster_triangles: 64, max_group_clusters: 16 };
        let result = read_cache(&path, different);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(VirtualGeometryError::CacheSchemaMismatch { .. })));
    }
}
