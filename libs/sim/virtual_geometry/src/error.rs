use thiserror::Error;

#[derive(Debug, Error)]
pub enum VirtualGeometryError {
    #[error("mesh simplifier failed while building cluster group {group_index}: {source}")]
    SimplifierFailed { group_index: u32, #[source] source: mesh_simplify::SimplifyError },

    #[error("level {level} produced zero clusters while {remaining} were expected to terminate")]
    EmptyLevel { level: u32, remaining: u32 },

    #[error("level {level} produced zero cluster groups while {cluster_count} clusters remain ungrouped")]
    ZeroGroupsProduced { level: u32, cluster_count: u32 },

    #[error("cache file {path} has a schema mismatch that cannot be rebuilt in place: {reason}")]
    CacheSchemaMismatch { path: String, reason: String },

    #[error("cache file {path} is truncated or corrupt: {source}")]
    CacheCorrupt { path: String, #[source] source: std::io::Error },
}
