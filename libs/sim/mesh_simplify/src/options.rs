/// Tunable constants for [`crate::MeshSimplifier`]. Defaults match the
/// source engine's hard-coded constants; exposed here so callers operating
/// at a different geometric scale can override them per invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplifierOptions {
    /// A popped edge whose collapse error is at or above this value halts
    /// simplification early rather than continuing toward the target.
    pub excessive_error_threshold: f64,
    /// Once an edge's merged adjacent-triangle count exceeds this many, a
    /// `0.5 * (count - threshold)` penalty discourages collapsing it first.
    pub neighbor_overflow_penalty_start: u32,
}

impl Default for SimplifierOptions {
    fn default() -> Self {
        Self {
            excessive_error_threshold: 1.0e6,
            neighbor_overflow_penalty_start: 24,
        }
    }
}
