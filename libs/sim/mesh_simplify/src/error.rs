use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimplifyError {
    #[error(
        "compact step recounted {actual_vertices} live vertices but ref-counts tracked {expected_vertices}"
    )]
    VertexCountMismatch { expected_vertices: u32, actual_vertices: u32 },

    #[error(
        "compact step recounted {actual_triangles} live triangles but the removal bitset tracked {expected_triangles}"
    )]
    TriangleCountMismatch { expected_triangles: u32, actual_triangles: u32 },
}
