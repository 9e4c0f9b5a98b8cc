//! Problem analysis
//!
//! Turns a raw task string into a [`TaskProfile`]. Classification itself is
//! delegated to a [`Classifier`]; the analyzer bounds the call with a timeout
//! and normalizes whatever comes back.

mod keyword;

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::routing::{clamp_complexity, TaskProfile};

pub use keyword::KeywordClassifier;

/// Raw output of a classifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Domain tags, most confident first
    pub domain_tags: Vec<String>,
    /// Complexity estimate; values outside the scale are clamped
    pub complexity: f64,
    /// Operations the task needs
    pub required_operations: Vec<String>,
}

/// Classification collaborator
///
/// May be backed by a rule engine or a model call. Implementations should
/// return `Error::AnalysisFailed` for text they cannot classify.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification>;
}

/// Analyzer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Upper bound on a single classification call
    pub timeout_ms: u64,
    /// Number of tags kept in the profile
    pub max_domain_tags: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_domain_tags: 3,
        }
    }
}

impl AnalyzerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Builds task profiles through a classifier
pub struct ProblemAnalyzer {
    classifier: Box<dyn Classifier>,
    config: AnalyzerConfig,
}

impl std::fmt::Debug for ProblemAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProblemAnalyzer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ProblemAnalyzer {
    fn default() -> Self {
        Self::new(KeywordClassifier::new())
    }
}

impl ProblemAnalyzer {
    /// Create an analyzer with default settings
    pub fn new(classifier: impl Classifier + 'static) -> Self {
        Self::with_config(classifier, AnalyzerConfig::default())
    }

    /// Create an analyzer with custom settings
    pub fn with_config(classifier: impl Classifier + 'static, config: AnalyzerConfig) -> Self {
        Self {
            classifier: Box::new(classifier),
            config,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze a task string
    ///
    /// Fails with `AnalysisFailed` on empty input, classifier errors, or when the
    /// classifier exceeds the configured timeout.
    pub async fn analyze(&self, raw_task: &str) -> Result<TaskProfile> {
        if raw_task.trim().is_empty() {
            return Err(Error::AnalysisFailed("task text is empty".to_string()));
        }

        let timeout = self.config.timeout();
        let classification = match tokio::time::timeout(timeout, self.classifier.classify(raw_task)).await {
            Ok(result) => result.map_err(|e| match e {
                Error::AnalysisFailed(_) => e,
                other => Error::AnalysisFailed(other.to_string()),
            })?,
            Err(_) => {
                warn!(timeout_ms = self.config.timeout_ms, "Classification timed out");
                return Err(Error::AnalysisFailed(format!(
                    "classification timed out after {}ms",
                    self.config.timeout_ms
                )));
            }
        };

        if classification.complexity.is_nan() {
            return Err(Error::AnalysisFailed(
                "classifier returned a non-numeric complexity".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        let tags: Vec<String> = classification
            .domain_tags
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .take(self.config.max_domain_tags)
            .collect();

        let profile = TaskProfile::new(raw_task, tags, clamp_complexity(classification.complexity))
            .with_operations(
                classification
                    .required_operations
                    .into_iter()
                    .map(|op| op.trim().to_lowercase())
                    .filter(|op| !op.is_empty()),
            );

        debug!(
            tags = ?profile.domain_tags,
            complexity = profile.complexity,
            operations = ?profile.required_operations,
            "Analyzed task"
        );
        Ok(profile)
    }
}
