//! Orchestrator
//!
//! Coordinates one request through analysis, routing, optional synthesis,
//! dispatch and tracking:
//!
//! ```text
//! Idle -> Analyzing -> Routing -> [Synthesizing ->] Dispatching -> Tracking -> Idle
//! ```
//!
//! Failures before dispatch leave the registry untouched. Once a worker has
//! been dispatched, an outcome is always recorded: a failed execution is
//! tracked before the error is returned, and a request dropped before its
//! outcome was recorded hands the outcome to a spawned task. A drop while the
//! worker is still executing records a cancelled outcome; a drop during
//! tracking records the outcome the worker actually reported.

mod executor;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::analyzer::{KeywordClassifier, ProblemAnalyzer};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::registry::{EcosystemStatus, WorkerRegistry};
use crate::routing::{
    CapabilityDescriptor, Outcome, PerformanceStats, Router, RoutingDecision, RoutingReason,
    TaskProfile, WorkerRecord,
};
use crate::synthesis::AgentSynthesizer;
use crate::tracker::PerformanceTracker;

pub use executor::{ExecutionReport, GenericExecutor, WorkerExecutor};

/// Stage of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveState {
    Idle,
    Analyzing,
    Routing,
    Synthesizing,
    Dispatching,
    Tracking,
}

impl fmt::Display for SolveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::Routing => write!(f, "routing"),
            Self::Synthesizing => write!(f, "synthesizing"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::Tracking => write!(f, "tracking"),
        }
    }
}

/// Everything a completed request produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveReport {
    pub profile: TaskProfile,
    pub decision: RoutingDecision,
    /// Descriptor of the dispatched worker
    pub worker: CapabilityDescriptor,
    /// The worker was created for this request
    pub synthesized: bool,
    /// The worker was chosen below threshold after a synthesis conflict
    pub fallback: bool,
    pub outcome: Outcome,
    pub output: String,
    /// Worker statistics after this request was tracked
    pub stats: PerformanceStats,
    /// States visited, in order
    pub states: Vec<SolveState>,
}

impl SolveReport {
    pub fn succeeded(&self) -> bool {
        self.outcome.succeeded
    }
}

/// Registry summary plus orchestrator health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub halted: bool,
    #[serde(flatten)]
    pub ecosystem: EcosystemStatus,
}

/// Entry point for solving tasks against a shared registry
pub struct Orchestrator {
    registry: Arc<WorkerRegistry>,
    analyzer: ProblemAnalyzer,
    router: Router,
    synthesizer: AgentSynthesizer,
    tracker: Arc<PerformanceTracker>,
    executor: Arc<dyn WorkerExecutor>,
    halted: AtomicBool,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("router", &self.router)
            .field("synthesizer", &self.synthesizer)
            .field("halted", &self.is_halted())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator with default settings and the generic executor
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self {
            analyzer: ProblemAnalyzer::default(),
            router: Router::new(),
            synthesizer: AgentSynthesizer::new(Arc::clone(&registry)),
            tracker: Arc::new(PerformanceTracker::new(Arc::clone(&registry))),
            executor: Arc::new(GenericExecutor::new()),
            halted: AtomicBool::new(false),
            registry,
        }
    }

    /// Create an orchestrator from loaded configuration
    pub fn from_config(registry: Arc<WorkerRegistry>, config: &Config) -> Self {
        Self {
            analyzer: ProblemAnalyzer::with_config(KeywordClassifier::new(), config.analyzer.clone()),
            router: Router::with_config(config.routing.clone()),
            synthesizer: AgentSynthesizer::with_config(Arc::clone(&registry), config.synthesis.clone()),
            tracker: Arc::new(PerformanceTracker::with_config(
                Arc::clone(&registry),
                config.tracker.clone(),
            )),
            executor: Arc::new(GenericExecutor::new()),
            halted: AtomicBool::new(false),
            registry,
        }
    }

    /// Replace the analyzer
    pub fn with_analyzer(mut self, analyzer: ProblemAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Replace the execution collaborator
    pub fn with_executor(mut self, executor: impl WorkerExecutor + 'static) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Solve a task end to end
    pub async fn solve(&self, task: &str) -> Result<SolveReport> {
        self.ensure_running()?;
        let mut states = vec![SolveState::Idle, SolveState::Analyzing];

        let profile = match self.analyzer.analyze(task).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "Analysis failed");
                return Err(e);
            }
        };

        states.push(SolveState::Routing);
        let candidates = self.registry.find_candidates(&profile).await;
        let mut decision = self.router.route(&profile, &candidates);
        let mut synthesized = false;
        let mut fallback = false;

        if !decision.is_match() {
            states.push(SolveState::Synthesizing);
            match self.synthesizer.create(&profile).await {
                Ok(descriptor) => {
                    let record = WorkerRecord::new(descriptor);
                    decision = RoutingDecision {
                        worker_id: Some(record.descriptor.id.clone()),
                        score: self.router.score(&record, &profile),
                        reason: RoutingReason::Synthesized,
                        candidates: decision.candidates,
                    };
                    synthesized = true;
                }
                Err(Error::SynthesisConflict(reason)) => {
                    // Coverage appeared since routing; route against what is there now
                    let fresh = self.registry.find_candidates(&profile).await;
                    let rerouted = self.router.route(&profile, &fresh);
                    if rerouted.is_match() {
                        decision = rerouted;
                    } else {
                        decision = self.router.fallback(&profile, &fresh).ok_or_else(|| {
                            Error::NoCapableWorker(format!(
                                "synthesis blocked ({}) and no candidate shares tags {:?}",
                                reason, profile.domain_tags
                            ))
                        })?;
                        fallback = true;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let worker_id = decision.worker_id.clone().ok_or_else(|| {
            Error::NoCapableWorker(format!("no worker selected for tags {:?}", profile.domain_tags))
        })?;
        let worker = self
            .registry
            .get(&worker_id)
            .await
            .ok_or_else(|| Error::UnknownWorker(worker_id.clone()))?;

        states.push(SolveState::Dispatching);
        info!(
            worker_id = %worker_id,
            score = decision.score,
            reason = %decision.reason,
            "Dispatching task"
        );
        let started = Instant::now();
        let mut guard = DispatchGuard::new(Arc::clone(&self.tracker), worker_id.clone(), started);
        let result = self.executor.execute(&worker.descriptor, task).await;

        states.push(SolveState::Tracking);
        let (outcome, output, dispatch_error) = match result {
            Ok(report) => {
                let outcome = if report.succeeded {
                    Outcome::success(report.latency)
                } else {
                    Outcome::failure(report.latency)
                };
                let outcome = match report.quality_score {
                    Some(q) => outcome.with_quality(q),
                    None => outcome,
                };
                (outcome, report.output, None)
            }
            Err(e) => (Outcome::failure(started.elapsed()), String::new(), Some(e)),
        };

        // From here a drop hands the real outcome to the guard
        guard.settle(outcome.clone());
        let tracked = self.tracker.record(&worker_id, &outcome).await;
        guard.disarm();
        let stats = tracked?;
        self.check_after_tracking(&worker_id).await?;
        states.push(SolveState::Idle);

        if let Some(e) = dispatch_error {
            warn!(worker_id = %worker_id, error = %e, "Dispatch failed");
            return Err(Error::DispatchFailed {
                worker_id,
                reason: e.to_string(),
            });
        }

        info!(
            worker_id = %worker_id,
            succeeded = outcome.succeeded,
            synthesized,
            fallback,
            "Task complete"
        );

        Ok(SolveReport {
            profile,
            decision,
            worker: worker.descriptor,
            synthesized,
            fallback,
            outcome,
            output,
            stats,
            states,
        })
    }

    /// Operator path: synthesize and register a worker for a given profile
    ///
    /// The profile may carry at most as many tags as analysis would produce,
    /// so the new worker is eligible for the profile it was built from.
    pub async fn create_agent(&self, profile: &TaskProfile) -> Result<WorkerRecord> {
        self.ensure_running()?;
        let max_tags = self.analyzer.config().max_domain_tags;
        if profile.domain_tags.len() > max_tags {
            return Err(Error::InvalidInput(format!(
                "a worker can be created for at most {} tags, got {}",
                max_tags,
                profile.domain_tags.len()
            )));
        }
        let descriptor = self.synthesizer.create(profile).await?;
        Ok(WorkerRecord::new(descriptor))
    }

    /// Register an operator-supplied descriptor as is
    pub async fn register(&self, descriptor: CapabilityDescriptor) -> Result<WorkerRecord> {
        self.ensure_running()?;
        self.registry.register(descriptor).await
    }

    /// Workers sorted by id; deprecated ones only when asked
    pub async fn list_workers(&self, include_deprecated: bool) -> Vec<WorkerRecord> {
        let mut workers = self.registry.snapshot().await;
        if !include_deprecated {
            workers.retain(WorkerRecord::is_active);
        }
        workers
    }

    pub async fn status(&self) -> SystemStatus {
        SystemStatus {
            halted: self.is_halted(),
            ecosystem: self.registry.ecosystem_status().await,
        }
    }

    pub async fn deprecate(&self, worker_id: &str) -> Result<WorkerRecord> {
        self.ensure_running()?;
        self.registry.deprecate(worker_id).await
    }

    /// Full registry snapshot, for persistence
    pub async fn snapshot(&self) -> Vec<WorkerRecord> {
        self.registry.snapshot().await
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Accept requests again once the registry passes a full integrity check
    pub async fn resume(&self) -> Result<()> {
        self.registry.verify_integrity().await?;
        if self.halted.swap(false, Ordering::SeqCst) {
            info!("Orchestrator resumed");
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_halted() {
            return Err(Error::Halted);
        }
        Ok(())
    }

    async fn check_after_tracking(&self, worker_id: &str) -> Result<()> {
        match self.registry.check_worker(worker_id).await {
            Err(e @ Error::RegistryCorrupted(_)) => {
                self.halt(&e);
                Err(e)
            }
            other => other,
        }
    }

    fn halt(&self, cause: &Error) {
        self.halted.store(true, Ordering::SeqCst);
        error!(error = %cause, "Registry integrity check failed; halting new requests");
    }
}

/// Records an outcome on a spawned task if dropped while still armed
///
/// Until [`settle`](Self::settle) is called the recorded outcome is a
/// cancellation; afterwards it is the settled outcome.
struct DispatchGuard {
    tracker: Arc<PerformanceTracker>,
    worker_id: Option<String>,
    started: Instant,
    settled: Option<Outcome>,
}

impl DispatchGuard {
    fn new(tracker: Arc<PerformanceTracker>, worker_id: String, started: Instant) -> Self {
        Self {
            tracker,
            worker_id: Some(worker_id),
            started,
            settled: None,
        }
    }

    fn settle(&mut self, outcome: Outcome) {
        self.settled = Some(outcome);
    }

    /// The outcome has been recorded
    fn disarm(&mut self) {
        self.worker_id = None;
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        let Some(worker_id) = self.worker_id.take() else {
            return;
        };
        let started = self.started;
        let outcome = self
            .settled
            .take()
            .unwrap_or_else(|| Outcome::cancelled(started.elapsed()));

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let tracker = Arc::clone(&self.tracker);
                handle.spawn(async move {
                    if let Err(e) = tracker.record(&worker_id, &outcome).await {
                        warn!(worker_id = %worker_id, error = %e, "Failed to record abandoned dispatch");
                    }
                });
            }
            Err(_) => {
                warn!(worker_id = %worker_id, "No runtime left to record abandoned dispatch");
            }
        }
    }
}
