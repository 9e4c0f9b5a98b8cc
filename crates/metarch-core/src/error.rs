//! Error types for Metarch

use thiserror::Error;

/// Result type alias using Metarch's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Metarch error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Analysis errors (E100-E199)
    #[error("Task analysis failed: {0}. Rephrase the task and try again.")]
    AnalysisFailed(String),

    // Registry errors (E200-E299)
    #[error("An active worker already covers this capability: {0}")]
    DuplicateCapability(String),

    #[error("Worker '{0}' not found. Run `metarch list-agents --all` to see all workers.")]
    UnknownWorker(String),

    #[error("Worker '{worker_id}' is at version {actual}, expected {expected}")]
    VersionConflict {
        worker_id: String,
        expected: u32,
        actual: u32,
    },

    #[error("Registry corrupted: {0}")]
    RegistryCorrupted(String),

    // Synthesis errors (E300-E399)
    #[error("Synthesis blocked by existing coverage: {0}")]
    SynthesisConflict(String),

    #[error("No capable worker for task: {0}")]
    NoCapableWorker(String),

    // Dispatch errors (E400-E499)
    #[error("Worker '{worker_id}' failed: {reason}")]
    DispatchFailed { worker_id: String, reason: String },

    #[error("Orchestrator halted after an integrity failure. Inspect the registry, then resume.")]
    Halted,

    // Storage errors (E500-E599)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::AnalysisFailed(_) => "E100",
            Self::DuplicateCapability(_) => "E200",
            Self::UnknownWorker(_) => "E201",
            Self::VersionConflict { .. } => "E202",
            Self::RegistryCorrupted(_) => "E203",
            Self::SynthesisConflict(_) => "E300",
            Self::NoCapableWorker(_) => "E301",
            Self::DispatchFailed { .. } => "E400",
            Self::Halted => "E401",
            Self::DatabaseError(_) => "E500",
            Self::Serialization(_) => "E501",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::AnalysisFailed(_) => Some("Retry with a more descriptive task".to_string()),
            Self::UnknownWorker(_) => Some("metarch list-agents --all".to_string()),
            Self::NoCapableWorker(_) => {
                Some("metarch create-agent --tags <domain> --complexity <0-10>".to_string())
            }
            Self::ConfigError(_) => Some("metarch config list".to_string()),
            Self::Halted => Some("metarch status".to_string()),
            _ => None,
        }
    }

    /// Whether the failure is local to one request
    ///
    /// Registry corruption is the only process-level failure; everything else
    /// leaves the orchestrator able to serve the next request.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::RegistryCorrupted(_) | Self::Halted)
    }
}
