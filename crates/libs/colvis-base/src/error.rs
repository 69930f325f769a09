//! Error type for the core library.

/// Errors raised while building core values from untrusted input.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Numeric visualisation type outside of the known range.
    #[error("Invalid visualisation type index: {0}")]
    InvalidVisualisationType(u32),
    /// Numeric sampling pattern outside of the known range.
    #[error("Invalid sampling pattern index: {0}")]
    InvalidSamplingPattern(u32),
    /// A triangle references a vertex the mesh doesn't have.
    #[error("Triangle {face} references vertex {index}, but the mesh only has {count} vertices")]
    InvalidTriangleIndex {
        /// Index of the offending triangle.
        face: usize,
        /// Vertex index referenced by the triangle.
        index: u32,
        /// Number of vertices in the mesh.
        count: usize,
    },
    /// Pixel storage doesn't match the requested dimensions.
    #[error("Render buffer of {width}x{height} requires {expected} pixels, got {actual}")]
    BufferSizeMismatch {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Number of pixels implied by the dimensions.
        expected: usize,
        /// Number of pixels provided.
        actual: usize,
    },
}
