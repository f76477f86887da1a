//! Binary on-disk cache for a model's per-submesh SDF grids
//! ("assets/sdf/<name>.sdf").
//!
//! Layout: `u32 sdf_resolution`, `u64 submesh_count`, then per submesh an
//! AABB (6 floats) followed by `sdf_resolution^3` `f32` samples in row-major
//! order. A resolution mismatch against the caller's current resolution
//! means the whole file is stale and must be rebuilt, never patched in
//! place (mirrors the virtual mesh cache's header-mismatch contract).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use nalgebra::Point3;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::components::SDFGrid;
use crate::error::SceneError;

fn write_grid<W: Write>(w: &mut W, grid: &SDFGrid) -> io::Result<()> {
    for component in [grid.aabb_min.x, grid.aabb_min.y, grid.aabb_min.z, grid.aabb_max.x, grid.aabb_max.y, grid.aabb_max.z] {
        w.write_f32::<LittleEndian>(component)?;
    }
    for &sample in &grid.samples {
        w.write_f32::<LittleEndian>(sample)?;
    }
    Ok(())
}

fn read_grid<R: Read>(r: &mut R, resolution: u32) -> io::Result<SDFGrid> {
    let aabb_min = Point3::new(r.read_f32::<LittleEndian>()?, r.read_f32::<LittleEndian>()?, r.read_f32::<LittleEndian>()?);
    let aabb_max = Point3::new(r.read_f32::<LittleEndian>()?, r.read_f32::<LittleEndian>()?, r.read_f32::<LittleEndian>()?);
    let sample_count = (resolution as usize).pow(3);
    let mut samples = Vec::with_capacity(sample_count);
    for _ in 0..sample_count {
        samples.push(r.read_f32::<LittleEndian>()?);
    }
    Ok(SDFGrid { aabb_min, aabb_max, resolution, samples })
}

pub fn write_cache(path: &Path, resolution: u32, grids: &[SDFGrid]) -> Result<(), SceneError> {
    let write = || -> io::Result<()> {
        let mut f = io::BufWriter::new(std::fs::File::create(path)?);
        f.write_u32::<LittleEndian>(resolution)?;
        f.write_u64::<LittleEndian>(grids.len() as u64)?;
        for grid in grids {
            write_grid(&mut f, grid)?;
        }
        f.flush()
    };
    write().map_err(|source| SceneError::CacheCorrupt { path: path.display().to_string(), source })
}

pub fn read_cache(path: &Path, resolution: u32) -> Result<Vec<SDFGrid>, SceneError> {
    let to_corrupt = |source: io::Error| SceneError::CacheCorrupt { path: path.display().to_string(), source };

    let mut f = io::BufReader::new(std::fs::File::open(path).map_err(to_corrupt)?);
    let file_resolution = f.read_u32::<LittleEndian>().map_err(to_corrupt)?;
    if file_resolution != resolution {
        return Err(SceneError::CacheSchemaMismatch {
            path: path.display().to_string(),
            reason: format!("cache built at resolution {file_resolution}, current resolution wants {resolution}"),
        });
    }

    let submesh_count = f.read_u64::<LittleEndian>().map_err(to_corrupt)? as usize;
    let mut grids = Vec::with_capacity(submesh_count);
    for _ in 0..submesh_count {
        grids.push(read_grid(&mut f, resolution).map_err(to_corrupt)?);
    }
    Ok(grids)
}

/// Loads `path` if it matches `resolution`, otherwise rebuilds by calling
/// `build` and overwrites the file (Recoverable: stale cache).
pub fn load_or_build(path: &Path, resolution: u32, build: impl FnOnce() -> Vec<SDFGrid>) -> Result<Vec<SDFGrid>, SceneError> {
    if path.exists() {
        match read_cache(path, resolution) {
            Ok(grids) => return Ok(grids),
            Err(SceneError::CacheSchemaMismatch { reason, .. }) => {
                tracing::warn!(path = %path.display(), reason, "sdf cache is stale, rebuilding");
            }
            Err(err) => return Err(err),
        }
    }
    let grids = build();
    write_cache(path, resolution, &grids)?;
    Ok(grids)
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_grid(resolution: u32, fill: f32) -> SDFGrid {
        SDFGrid::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0), resolution, vec![fill; (resolution as usize).pow(3)])
    }

    #[test]
    fn round_trips_through_disk() {
        let grids = vec![sample_grid(4, 0.5), sample_grid(4, -0.25)];
        let path = std::env::temp_dir().join(format!("scene_sdf_cache_test_{}.sdf", std::process::id()));
        write_cache(&path, 4, &grids).expect("write succeeds");
        let loaded = read_cache(&path, 4).expect("read succeeds");
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].samples, grids[0].samples);
        assert_eq!(loaded[1].samples, grids[1].samples);
    }

    #[test]
    fn mismatched_resolution_is_reported_as_schema_mismatch() {
        let grids = vec![sample_grid(4, 0.0)];
        let path = std::env::temp_dir().join(format!("scene_sdf_cache_mismatch_{}.sdf", std::process::id()));
        write_cache(&path, 4, &grids).expect("write succeeds");
        let result = read_cache(&path, 8);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(SceneError::CacheSchemaMismatch { .. })));
    }

    #[test]
    fn load_or_build_rebuilds_on_stale_resolution() {
        let path = std::env::temp_dir().join(format!("scene_sdf_cache_rebuild_{}.sdf", std::process::id()));
        write_cache(&path, 4, &[sample_grid(4, 1.0)]).expect("write succeeds");
        let rebuilt = load_or_build(&path, 8, || vec![sample_grid(8, 2.0)]).expect("rebuild succeeds");
        std::fs::remove_file(&path).ok();
        assert_eq!(rebuilt.len(), 1);
        assert_eq!(rebuilt[0].resolution, 8);
    }
}
