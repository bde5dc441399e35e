//! Error taxonomy for the detection and rendering pipeline.
//!
//! Feature preparation and scoring fail fast with `InvalidInput` or
//! `InsufficientData`; document construction fails with `Render`.
//! Visualization never surfaces here (see `visualization::Visualization`).

/// Errors that can occur while detecting anomalies or rendering a report
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Malformed rows, missing required columns, empty required lists
    InvalidInput(String),
    /// Batch too small to score meaningfully
    InsufficientData { required: usize, found: usize },
    /// Document backend could not build or write the report
    Render(String),
}

impl PipelineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(e) => write!(f, "Invalid input: {}", e),
            Self::InsufficientData { required, found } => write!(
                f,
                "Insufficient data: at least {} observations required, got {}",
                required, found
            ),
            Self::Render(e) => write!(f, "Render failed: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        Self::Render(e.to_string())
    }
}

impl From<lopdf::Error> for PipelineError {
    fn from(e: lopdf::Error) -> Self {
        Self::Render(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
