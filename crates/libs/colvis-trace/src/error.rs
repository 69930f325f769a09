/// Errors raised by the tracer and its output writers.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// The background task ended without producing its result.
    #[error("Background trace task was lost before completing")]
    TaskLost,
    /// The faces handed to the cube map writer are unusable.
    #[error("Invalid cube map: {0}")]
    InvalidCubemap(String),
    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// PNG encoding failure.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    /// DDS encoding failure.
    #[error("DDS error: {0}")]
    Dds(#[from] ddsfile::Error),
    /// Error from the core library.
    #[error(transparent)]
    Base(#[from] base::Error),
}
