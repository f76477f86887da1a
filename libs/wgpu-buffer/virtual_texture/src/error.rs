use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResidencyError {
    #[error("tile-mapping update failed: {reason}")]
    TileMappingUpdateFailed { reason: String },
}
