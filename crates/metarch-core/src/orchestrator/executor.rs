//! Worker execution collaborator

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::routing::CapabilityDescriptor;

/// What a worker reports back after executing a task
///
/// The core only reads `succeeded`, `latency` and `quality_score`; `output`
/// is passed through to the caller untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub succeeded: bool,
    pub output: String,
    pub latency: Duration,
    pub quality_score: Option<f64>,
}

impl ExecutionReport {
    pub fn success(output: impl Into<String>, latency: Duration) -> Self {
        Self {
            succeeded: true,
            output: output.into(),
            latency,
            quality_score: None,
        }
    }

    pub fn failure(output: impl Into<String>, latency: Duration) -> Self {
        Self {
            succeeded: false,
            output: output.into(),
            latency,
            quality_score: None,
        }
    }

    pub fn with_quality(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }
}

/// Executes domain logic for a dispatched worker
///
/// Returning `Err` means the dispatch itself broke (the worker could not be
/// reached or crashed); a worker that ran but failed its task should return
/// `Ok` with `succeeded: false`.
#[async_trait]
pub trait WorkerExecutor: Send + Sync {
    async fn execute(&self, worker: &CapabilityDescriptor, task: &str) -> Result<ExecutionReport>;
}

/// Executor used when no domain implementation is plugged in
///
/// Acknowledges the task on behalf of the worker, naming the operations it
/// declares. A worker with a prompt template gets the prompt it would run,
/// with the task appended.
#[derive(Debug, Clone, Default)]
pub struct GenericExecutor;

impl GenericExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WorkerExecutor for GenericExecutor {
    async fn execute(&self, worker: &CapabilityDescriptor, task: &str) -> Result<ExecutionReport> {
        let started = Instant::now();

        let operations = if worker.operations.is_empty() {
            "general handling".to_string()
        } else {
            worker.operations.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        let mut output = format!(
            "{} ({}) accepted task '{}' [operations: {}]",
            worker.name,
            worker.id,
            task.trim(),
            operations
        );
        if let Some(prompt) = &worker.prompt_template {
            output.push_str(&format!("\n\n{}\n\nUser request: {}", prompt, task.trim()));
        }

        Ok(ExecutionReport::success(output, started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::ComplexityRange;

    #[tokio::test]
    async fn test_generic_executor_acknowledges() {
        let worker = CapabilityDescriptor::new("Budget Agent", ["finance"], ComplexityRange::full())
            .with_id("budget-agent")
            .with_operations(["forecast", "risk_analysis"]);

        let report = GenericExecutor::new().execute(&worker, " plan the budget ").await.unwrap();

        assert!(report.succeeded);
        assert_eq!(
            report.output,
            "Budget Agent (budget-agent) accepted task 'plan the budget' [operations: forecast, risk_analysis]"
        );
        assert_eq!(report.quality_score, None);
    }

    #[tokio::test]
    async fn test_generic_executor_includes_prompt() {
        let worker = CapabilityDescriptor::new("Budget Agent", ["finance"], ComplexityRange::full())
            .with_id("budget-agent")
            .with_prompt_template("You are a budgeting specialist.");

        let report = GenericExecutor::new().execute(&worker, "plan the budget").await.unwrap();

        assert_eq!(
            report.output,
            "Budget Agent (budget-agent) accepted task 'plan the budget' [operations: general handling]\n\n\
             You are a budgeting specialist.\n\nUser request: plan the budget"
        );
    }
}
