//! Router - deterministic capability scoring
//!
//! Every candidate is scored as
//!
//! ```text
//! score = domain_overlap * domain_weight
//!       + complexity_fit * complexity_weight
//!       + performance_factor * performance_weight
//! ```
//!
//! Candidates are ranked by score, then by invocation count, then by id, so the
//! same (profile, candidates, config) always yields the same decision.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{
    RoutingDecision, RoutingReason, ScoreBreakdown, ScoredCandidate, TaskProfile, WorkerRecord,
};
use crate::error::{Error, Result};

/// Performance factor used until a worker has enough samples
pub const NEUTRAL_PERFORMANCE: f64 = 0.5;

/// Scoring weights and thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Weight of tag overlap
    pub domain_weight: f64,
    /// Weight of complexity fit
    pub complexity_weight: f64,
    /// Weight of historical performance
    pub performance_weight: f64,
    /// Minimum score for a worker to be dispatched
    pub acceptance_threshold: f64,
    /// Distance beyond a range edge at which complexity fit reaches zero
    pub complexity_tolerance: f64,
    /// Invocations required before the success rate is trusted
    pub min_sample_size: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            domain_weight: 0.5,
            complexity_weight: 0.3,
            performance_weight: 0.2,
            acceptance_threshold: 0.6,
            complexity_tolerance: 2.0,
            min_sample_size: 5,
        }
    }
}

impl RouterConfig {
    /// Validate weights and thresholds
    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("domain_weight", self.domain_weight),
            ("complexity_weight", self.complexity_weight),
            ("performance_weight", self.performance_weight),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::ConfigError(format!(
                    "routing.{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        let sum = self.domain_weight + self.complexity_weight + self.performance_weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(Error::ConfigError(format!(
                "routing weights must sum to 1.0, got {:.3}",
                sum
            )));
        }

        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(Error::ConfigError(format!(
                "routing.acceptance_threshold must be between 0.0 and 1.0, got {}",
                self.acceptance_threshold
            )));
        }

        if self.complexity_tolerance.is_nan() || self.complexity_tolerance <= 0.0 {
            return Err(Error::ConfigError(format!(
                "routing.complexity_tolerance must be positive, got {}",
                self.complexity_tolerance
            )));
        }

        Ok(())
    }
}

/// Scores candidates against a task profile
#[derive(Debug, Clone, Default)]
pub struct Router {
    config: RouterConfig,
}

impl Router {
    /// Create a router with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a router with custom configuration
    pub fn with_config(config: RouterConfig) -> Self {
        Self { config }
    }

    /// Get the current configuration
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Break a worker's score down into its three factors
    pub fn breakdown(&self, worker: &WorkerRecord, profile: &TaskProfile) -> ScoreBreakdown {
        let domain_overlap = if profile.domain_tags.is_empty() {
            0.0
        } else {
            let shared = profile
                .domain_tags
                .iter()
                .filter(|t| worker.descriptor.domain_tags.contains(*t))
                .count();
            shared as f64 / profile.domain_tags.len() as f64
        };

        let distance =
            worker.descriptor.complexity.distance(profile.complexity) / self.config.complexity_tolerance;
        let complexity_fit = 1.0 - distance.clamp(0.0, 1.0);

        let performance_factor = if worker.stats.invocation_count >= self.config.min_sample_size {
            worker.stats.success_rate()
        } else {
            NEUTRAL_PERFORMANCE
        };

        ScoreBreakdown {
            domain_overlap,
            complexity_fit,
            performance_factor,
        }
    }

    /// Weighted score of a worker for a profile
    pub fn score(&self, worker: &WorkerRecord, profile: &TaskProfile) -> f64 {
        self.weigh(&self.breakdown(worker, profile))
    }

    fn weigh(&self, b: &ScoreBreakdown) -> f64 {
        b.domain_overlap * self.config.domain_weight
            + b.complexity_fit * self.config.complexity_weight
            + b.performance_factor * self.config.performance_weight
    }

    /// Score and order every candidate, best first
    pub fn rank(&self, profile: &TaskProfile, candidates: &[WorkerRecord]) -> Vec<ScoredCandidate> {
        let mut ranked: Vec<ScoredCandidate> = candidates
            .iter()
            .map(|worker| {
                let breakdown = self.breakdown(worker, profile);
                ScoredCandidate {
                    worker_id: worker.descriptor.id.clone(),
                    score: self.weigh(&breakdown),
                    breakdown,
                    invocation_count: worker.stats.invocation_count,
                    missing_operations: missing_operations(worker, profile),
                }
            })
            .collect();

        ranked.sort_by(compare_candidates);
        ranked
    }

    /// Pick the best candidate that meets the acceptance threshold
    pub fn route(&self, profile: &TaskProfile, candidates: &[WorkerRecord]) -> RoutingDecision {
        let ranked = self.rank(profile, candidates);

        let best = ranked.first().map(|c| (c.worker_id.clone(), c.score));

        let decision = match best {
            None => RoutingDecision {
                worker_id: None,
                score: 0.0,
                reason: RoutingReason::NoCandidates,
                candidates: ranked,
            },
            Some((id, score)) if score >= self.config.acceptance_threshold => RoutingDecision {
                worker_id: Some(id),
                score,
                reason: RoutingReason::Matched,
                candidates: ranked,
            },
            Some((_, score)) => RoutingDecision {
                worker_id: None,
                score,
                reason: RoutingReason::BelowThreshold,
                candidates: ranked,
            },
        };

        if let Some(chosen) = decision.best().filter(|_| decision.worker_id.is_some()) {
            if !chosen.missing_operations.is_empty() {
                warn!(
                    worker_id = %chosen.worker_id,
                    missing = ?chosen.missing_operations,
                    "Chosen worker does not declare every required operation"
                );
            }
        }

        debug!(
            tags = ?profile.domain_tags,
            complexity = profile.complexity,
            chosen = ?decision.worker_id,
            score = decision.score,
            candidates = decision.candidates.len(),
            reason = %decision.reason,
            "Routed task profile"
        );

        decision
    }

    /// Best candidate regardless of threshold, used after a synthesis conflict
    pub fn fallback(&self, profile: &TaskProfile, candidates: &[WorkerRecord]) -> Option<RoutingDecision> {
        let ranked = self.rank(profile, candidates);
        let (id, score) = ranked.first().map(|c| (c.worker_id.clone(), c.score))?;
        Some(RoutingDecision {
            worker_id: Some(id),
            score,
            reason: RoutingReason::Fallback,
            candidates: ranked,
        })
    }
}

fn missing_operations(worker: &WorkerRecord, profile: &TaskProfile) -> Vec<String> {
    profile
        .required_operations
        .iter()
        .filter(|op| !worker.descriptor.operations.contains(*op))
        .cloned()
        .collect()
}

/// Higher score, then more invocations, then smallest id
fn compare_candidates(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.invocation_count.cmp(&a.invocation_count))
        .then_with(|| a.worker_id.cmp(&b.worker_id))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::routing::types::{CapabilityDescriptor, ComplexityRange, Outcome};

    fn worker(id: &str, tags: &[&str], min: f64, max: f64) -> WorkerRecord {
        WorkerRecord::new(
            CapabilityDescriptor::new(id, tags.iter().copied(), ComplexityRange::new(min, max).unwrap())
                .with_id(id),
        )
    }

    fn with_history(mut record: WorkerRecord, successes: u64, failures: u64) -> WorkerRecord {
        for _ in 0..successes {
            record.stats.apply(&Outcome::success(Duration::from_millis(10)), 0.2);
        }
        for _ in 0..failures {
            record.stats.apply(&Outcome::failure(Duration::from_millis(10)), 0.2);
        }
        record
    }

    #[test]
    fn test_untested_worker_in_range_is_accepted() {
        let router = Router::new();
        let profile = TaskProfile::new("budget review", ["finance"], 4.0);
        let candidates = vec![worker("finance", &["finance"], 0.0, 10.0)];

        let decision = router.route(&profile, &candidates);

        assert_eq!(decision.worker_id.as_deref(), Some("finance"));
        assert_eq!(decision.reason, RoutingReason::Matched);
        assert!((decision.score - 0.9).abs() < 1e-9);
        let b = decision.candidates[0].breakdown;
        assert_eq!(b.domain_overlap, 1.0);
        assert_eq!(b.complexity_fit, 1.0);
        assert_eq!(b.performance_factor, NEUTRAL_PERFORMANCE);
    }

    #[test]
    fn test_complexity_fit_decays_linearly() {
        let router = Router::new();
        let record = worker("w", &["data"], 2.0, 4.0);

        let at = |c: f64| router.breakdown(&record, &TaskProfile::new("t", ["data"], c)).complexity_fit;

        assert_eq!(at(3.0), 1.0);
        assert!((at(5.0) - 0.5).abs() < 1e-9);
        assert_eq!(at(6.0), 0.0);
        assert_eq!(at(9.0), 0.0);
    }

    #[test]
    fn test_empty_profile_tags_give_zero_overlap() {
        let router = Router::new();
        let record = worker("w", &["data"], 0.0, 10.0);
        let profile = TaskProfile::new("t", Vec::<String>::new(), 5.0);
        assert_eq!(router.breakdown(&record, &profile).domain_overlap, 0.0);
    }

    #[test]
    fn test_partial_overlap() {
        let router = Router::new();
        let record = worker("w", &["data", "ml"], 0.0, 10.0);
        let profile = TaskProfile::new("t", ["data", "finance", "ml", "web"], 5.0);
        assert!((router.breakdown(&record, &profile).domain_overlap - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_success_rate_used_after_min_samples() {
        let router = Router::new();
        let profile = TaskProfile::new("t", ["data"], 5.0);

        let young = with_history(worker("young", &["data"], 0.0, 10.0), 0, 4);
        let seasoned = with_history(worker("seasoned", &["data"], 0.0, 10.0), 1, 4);

        assert_eq!(router.breakdown(&young, &profile).performance_factor, NEUTRAL_PERFORMANCE);
        assert!((router.breakdown(&seasoned, &profile).performance_factor - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_below_threshold_returns_none_with_ranking() {
        let router = Router::new();
        let profile = TaskProfile::new("t", ["data", "ml", "web"], 9.0);
        let candidates = vec![worker("w", &["data"], 0.0, 2.0)];

        let decision = router.route(&profile, &candidates);

        assert!(!decision.is_match());
        assert_eq!(decision.reason, RoutingReason::BelowThreshold);
        assert_eq!(decision.candidates.len(), 1);
        assert!(decision.score < 0.6);
    }

    #[test]
    fn test_no_candidates() {
        let decision = Router::new().route(&TaskProfile::new("t", ["x"], 1.0), &[]);
        assert_eq!(decision.reason, RoutingReason::NoCandidates);
        assert!(decision.best().is_none());
    }

    #[test]
    fn test_tie_break_by_invocations_then_id() {
        let router = Router::new();
        let profile = TaskProfile::new("t", ["data"], 5.0);

        // Under min_sample_size both score identically
        let busy = with_history(worker("b-busy", &["data"], 0.0, 10.0), 2, 0);
        let idle_a = worker("a-idle", &["data"], 0.0, 10.0);
        let idle_c = worker("c-idle", &["data"], 0.0, 10.0);

        let decision = router.route(&profile, &[idle_c, busy, idle_a]);
        let order: Vec<&str> = decision.candidates.iter().map(|c| c.worker_id.as_str()).collect();

        assert_eq!(order, vec!["b-busy", "a-idle", "c-idle"]);
        assert_eq!(decision.alternatives().count(), 2);
    }

    #[test]
    fn test_route_is_deterministic() {
        let router = Router::new();
        let profile = TaskProfile::new("t", ["data", "ml"], 6.5);
        let candidates = vec![
            worker("x", &["data"], 0.0, 5.0),
            worker("y", &["ml"], 5.0, 8.0),
            worker("z", &["data", "ml"], 7.0, 10.0),
        ];

        let first = router.route(&profile, &candidates);
        let mut reversed = candidates.clone();
        reversed.reverse();
        for _ in 0..10 {
            assert_eq!(router.route(&profile, &candidates), first);
            assert_eq!(router.route(&profile, &reversed), first);
        }
    }

    #[test]
    fn test_fallback_ignores_threshold() {
        let router = Router::new();
        let profile = TaskProfile::new("t", ["data", "ml", "web"], 9.0);
        let candidates = vec![worker("w", &["data"], 0.0, 2.0)];

        let decision = router.fallback(&profile, &candidates).unwrap();
        assert_eq!(decision.worker_id.as_deref(), Some("w"));
        assert_eq!(decision.reason, RoutingReason::Fallback);
        assert!(router.fallback(&profile, &[]).is_none());
    }

    #[test]
    fn test_missing_operations_reported_without_changing_score() {
        let router = Router::new();
        let profile = TaskProfile::new("forecast the budget", ["finance"], 4.0)
            .with_operations(["forecast", "visualize"]);
        let plain = worker("plain", &["finance"], 0.0, 10.0);
        let mut equipped = worker("equipped", &["finance"], 0.0, 10.0);
        equipped.descriptor.operations.insert("forecast".to_string());

        let ranked = router.rank(&profile, &[plain, equipped]);

        assert_eq!(ranked[0].score, ranked[1].score);
        assert_eq!(ranked[0].worker_id, "equipped");
        assert_eq!(ranked[0].missing_operations, vec!["visualize"]);
        assert_eq!(ranked[1].missing_operations, vec!["forecast", "visualize"]);
    }

    #[test]
    fn test_config_validation() {
        assert!(RouterConfig::default().validate().is_ok());

        let skewed = RouterConfig {
            domain_weight: 0.9,
            ..Default::default()
        };
        assert!(skewed.validate().is_err());

        let bad_threshold = RouterConfig {
            acceptance_threshold: 1.5,
            ..Default::default()
        };
        assert!(bad_threshold.validate().is_err());

        let bad_tolerance = RouterConfig {
            complexity_tolerance: 0.0,
            ..Default::default()
        };
        assert!(bad_tolerance.validate().is_err());
    }
}
