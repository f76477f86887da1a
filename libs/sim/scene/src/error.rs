use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("sdf cache file {path} has a schema mismatch that cannot be rebuilt in place: {reason}")]
    CacheSchemaMismatch { path: String, reason: String },

    #[error("sdf cache file {path} is truncated or corrupt: {source}")]
    CacheCorrupt { path: String, #[source] source: std::io::Error },
}
