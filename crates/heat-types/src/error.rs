use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeatError {
    #[error(
        "Worker count mismatch: {workers} workers for a {nx_domains}x{ny_domains} process grid"
    )]
    WorkerCountMismatch {
        workers: usize,
        nx_domains: usize,
        ny_domains: usize,
    },

    #[error("Uneven decomposition along {axis}: size {size} is not divisible by {domains} domains")]
    UnevenDecomposition {
        axis: char,
        size: usize,
        domains: usize,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Geometry violation: {0}")]
    GeometryViolation(String),

    #[error("Communication failure on rank {rank}: {message}")]
    Communication { rank: usize, message: String },

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("NPY error: {0}")]
    Npy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HeatError {
    /// True for the configuration failures that must stop a run before iterating.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HeatError::WorkerCountMismatch { .. }
                | HeatError::UnevenDecomposition { .. }
                | HeatError::ConfigError(_)
        )
    }
}

pub type HeatResult<T> = Result<T, HeatError>;
