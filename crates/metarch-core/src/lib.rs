//! Metarch Core Library
//!
//! This crate decides which specialist worker should handle a free-form task,
//! and creates a new worker definition when none qualifies:
//! - Problem analysis (task text to domain tags, complexity, operations)
//! - Worker registry with per-worker performance statistics
//! - Deterministic capability routing
//! - Synthesis of capability descriptors for unmatched tasks
//! - Orchestration of analyze, route, synthesize, dispatch, track
//! - Registry persistence (SQLite or JSON)

pub mod analyzer;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod routing;
pub mod storage;
pub mod synthesis;
pub mod tracker;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::analyzer::{Classifier, ProblemAnalyzer};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::orchestrator::{Orchestrator, SolveReport, WorkerExecutor};
    pub use crate::registry::WorkerRegistry;
    pub use crate::routing::{CapabilityDescriptor, ComplexityRange, Router, TaskProfile, WorkerRecord};
    pub use crate::storage::RegistryStore;
}
