/// All the ways a visualizer invocation can fail.
/// None of them are recovered locally, they abort the run.
#[derive(Debug, thiserror::Error)]
pub enum VisualizerError {
    /// missing or invalid config.json, or a misconfigured assembly folder
    #[error("configuration error: {0}")]
    Configuration(String),

    /// missing arguments or unsupported input category
    #[error("usage error: {0}")]
    Usage(String),

    /// the archive or one of its entries could not be read or parsed
    #[error("data access error: {0}")]
    DataAccess(String),

    /// invalid plot size or failure while drawing/writing the image
    #[error("render error: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VisualizerError>;
