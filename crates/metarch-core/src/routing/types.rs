//! Types shared by the registry, router, synthesizer, and tracker
//!
//! Workers are described purely by data: a [`CapabilityDescriptor`] declares
//! what a worker covers, [`PerformanceStats`] record how it has done, and a
//! [`RoutingDecision`] explains why a worker was (or was not) chosen.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Lower bound of the complexity scale
pub const COMPLEXITY_MIN: f64 = 0.0;
/// Upper bound of the complexity scale
pub const COMPLEXITY_MAX: f64 = 10.0;

/// Clamp a complexity estimate into the fixed scale
pub fn clamp_complexity(value: f64) -> f64 {
    value.clamp(COMPLEXITY_MIN, COMPLEXITY_MAX)
}

/// Closed complexity interval a worker declares it can handle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexityRange {
    pub min: f64,
    pub max: f64,
}

impl ComplexityRange {
    /// Create a range, rejecting inverted or non-finite bounds
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(Error::InvalidInput(format!(
                "complexity range bounds must be finite, got [{}, {}]",
                min, max
            )));
        }
        if min > max {
            return Err(Error::InvalidInput(format!(
                "complexity range is inverted: [{}, {}]",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// The full scale
    pub fn full() -> Self {
        Self {
            min: COMPLEXITY_MIN,
            max: COMPLEXITY_MAX,
        }
    }

    /// Range of `center ± margin`, clamped to the scale
    pub fn centered(center: f64, margin: f64) -> Self {
        let center = clamp_complexity(center);
        let margin = margin.max(0.0);
        Self {
            min: clamp_complexity(center - margin),
            max: clamp_complexity(center + margin),
        }
    }

    /// Whether `value` lies inside the range (inclusive)
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Distance from the nearest edge, zero inside the range
    pub fn distance(&self, value: f64) -> f64 {
        if value < self.min {
            self.min - value
        } else if value > self.max {
            value - self.max
        } else {
            0.0
        }
    }

    /// Whether two ranges share at least one point
    pub fn overlaps(&self, other: &ComplexityRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }
}

impl std::fmt::Display for ComplexityRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.1}, {:.1}]", self.min, self.max)
    }
}

/// How a descriptor entered the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorOrigin {
    /// Registered by an operator or loaded from a snapshot
    #[default]
    Registered,
    /// Created by the synthesizer for an unmatched task
    Synthesized,
}

impl std::fmt::Display for DescriptorOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registered => write!(f, "registered"),
            Self::Synthesized => write!(f, "synthesized"),
        }
    }
}

impl std::str::FromStr for DescriptorOrigin {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "registered" => Ok(Self::Registered),
            "synthesized" => Ok(Self::Synthesized),
            _ => Err(format!("Unknown descriptor origin: {}", s)),
        }
    }
}

/// Declares what a worker covers
///
/// Descriptors are immutable once registered; the only way to change one is
/// [`crate::registry::WorkerRegistry::revise`], which bumps `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Unique, immutable identifier
    pub id: String,
    /// Human-readable name (e.g. "QuarterlyFinanceAgent")
    pub name: String,
    /// Optional free-text description
    pub description: Option<String>,
    /// Instructions the worker is primed with, if it was generated with any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
    /// Domain tags this worker specializes in
    pub domain_tags: BTreeSet<String>,
    /// Complexity interval the worker handles
    pub complexity: ComplexityRange,
    /// Operations the worker declares
    pub operations: BTreeSet<String>,
    /// When the descriptor was created
    pub created_at: DateTime<Utc>,
    /// Monotonic version, starts at 1
    pub version: u32,
    /// Where the descriptor came from
    pub origin: DescriptorOrigin,
}

impl CapabilityDescriptor {
    /// Create a new descriptor with a generated id
    pub fn new<I, S>(name: impl Into<String>, domain_tags: I, complexity: ComplexityRange) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        Self {
            id: generate_worker_id(&name),
            name,
            description: None,
            prompt_template: None,
            domain_tags: normalize_tags(domain_tags),
            complexity,
            operations: BTreeSet::new(),
            created_at: Utc::now(),
            version: 1,
            origin: DescriptorOrigin::Registered,
        }
    }

    /// Override the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set declared operations
    pub fn with_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operations = operations.into_iter().map(Into::into).collect();
        self
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set prompt template
    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    /// Set origin
    pub fn with_origin(mut self, origin: DescriptorOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Identical (domain tags, complexity range) pair
    pub fn same_coverage(&self, other: &CapabilityDescriptor) -> bool {
        self.domain_tags == other.domain_tags && self.complexity == other.complexity
    }

    /// Whether `other` already covers this descriptor: our tags are a subset of
    /// its tags and the complexity ranges overlap
    pub fn covered_by(&self, other: &CapabilityDescriptor) -> bool {
        self.domain_tags.is_subset(&other.domain_tags) && self.complexity.overlaps(&other.complexity)
    }

    /// Whether any of our tags appears in `tags`
    pub fn shares_tag_with<'a>(&self, tags: impl IntoIterator<Item = &'a String>) -> bool {
        tags.into_iter().any(|t| self.domain_tags.contains(t))
    }

    /// Validate descriptor fields
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidInput("worker id must not be empty".to_string()));
        }
        if self.domain_tags.is_empty() {
            return Err(Error::InvalidInput(format!(
                "worker '{}' declares no domain tags",
                self.id
            )));
        }
        ComplexityRange::new(self.complexity.min, self.complexity.max)?;
        Ok(())
    }
}

/// Lower-case, trim, and deduplicate tags
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    tags.into_iter()
        .map(|t| t.into().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn generate_worker_id(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let suffix = Uuid::new_v4().simple().to_string();
    if slug.is_empty() {
        format!("worker-{}", &suffix[..8])
    } else {
        format!("{}-{}", slug, &suffix[..8])
    }
}

/// Structured representation of an incoming task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProfile {
    /// The original task text
    pub raw_text: String,
    /// Inferred domain tags, most confident first
    pub domain_tags: Vec<String>,
    /// Estimated complexity on the fixed scale
    pub complexity: f64,
    /// Operations the task needs
    pub required_operations: BTreeSet<String>,
}

impl TaskProfile {
    /// Create a profile; complexity is clamped into the scale
    pub fn new<I, S>(raw_text: impl Into<String>, domain_tags: I, complexity: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = BTreeSet::new();
        let domain_tags = domain_tags
            .into_iter()
            .map(|t| t.into().trim().to_lowercase())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect();
        Self {
            raw_text: raw_text.into(),
            domain_tags,
            complexity: clamp_complexity(complexity),
            required_operations: BTreeSet::new(),
        }
    }

    /// Set required operations
    pub fn with_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_operations = operations.into_iter().map(Into::into).collect();
        self
    }

    /// The `n` most confident tags
    pub fn top_tags(&self, n: usize) -> impl Iterator<Item = &String> {
        self.domain_tags.iter().take(n)
    }
}

/// Lifecycle status of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    #[default]
    Active,
    Deprecated,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Deprecated => write!(f, "deprecated"),
        }
    }
}

impl std::str::FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "deprecated" => Ok(Self::Deprecated),
            _ => Err(format!("Unknown worker status: {}", s)),
        }
    }
}

/// Result of one dispatch, as seen by the tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Whether the worker succeeded
    pub succeeded: bool,
    /// Wall-clock time spent in the worker
    pub latency: Duration,
    /// Optional quality score (0.0 to 1.0)
    pub quality_score: Option<f64>,
    /// The request was dropped mid-dispatch
    pub cancelled: bool,
}

impl Outcome {
    /// A successful outcome
    pub fn success(latency: Duration) -> Self {
        Self {
            succeeded: true,
            latency,
            quality_score: None,
            cancelled: false,
        }
    }

    /// A failed outcome
    pub fn failure(latency: Duration) -> Self {
        Self {
            succeeded: false,
            latency,
            quality_score: None,
            cancelled: false,
        }
    }

    /// A cancelled dispatch; counts as a failure
    pub fn cancelled(latency: Duration) -> Self {
        Self {
            cancelled: true,
            ..Self::failure(latency)
        }
    }

    /// Attach a quality score
    pub fn with_quality(mut self, score: f64) -> Self {
        self.quality_score = Some(score.clamp(0.0, 1.0));
        self
    }
}

/// Running statistics for a worker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Total dispatches recorded
    pub invocation_count: u64,
    /// Dispatches that succeeded
    pub success_count: u64,
    /// Sum of latencies in milliseconds
    pub cumulative_latency_ms: u64,
    /// Exponentially weighted quality score, unset until the first sample
    pub rolling_quality: Option<f64>,
    /// Time of the last recorded dispatch
    pub last_used: Option<DateTime<Utc>>,
}

impl PerformanceStats {
    /// Fold an outcome into the statistics
    ///
    /// `quality_weight` is the weight of the new sample in the moving average.
    pub fn apply(&mut self, outcome: &Outcome, quality_weight: f64) {
        self.invocation_count += 1;
        if outcome.succeeded {
            self.success_count += 1;
        }

        let latency_ms = u64::try_from(outcome.latency.as_millis()).unwrap_or(u64::MAX);
        self.cumulative_latency_ms = self.cumulative_latency_ms.saturating_add(latency_ms);

        if let Some(sample) = outcome.quality_score {
            let sample = sample.clamp(0.0, 1.0);
            self.rolling_quality = Some(match self.rolling_quality {
                Some(prev) => quality_weight * sample + (1.0 - quality_weight) * prev,
                None => sample,
            });
        }

        self.last_used = Some(Utc::now());
    }

    /// Fraction of successful dispatches (0.0 when never invoked)
    pub fn success_rate(&self) -> f64 {
        if self.invocation_count == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.invocation_count as f64
    }

    /// Mean latency in milliseconds
    pub fn average_latency_ms(&self) -> f64 {
        if self.invocation_count == 0 {
            return 0.0;
        }
        self.cumulative_latency_ms as f64 / self.invocation_count as f64
    }

    /// invocation_count >= success_count
    pub fn is_consistent(&self) -> bool {
        self.invocation_count >= self.success_count
    }
}

/// A registry entry as seen from outside the registry (always a snapshot)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub descriptor: CapabilityDescriptor,
    pub stats: PerformanceStats,
    pub status: WorkerStatus,
}

impl WorkerRecord {
    /// New active record with empty stats
    pub fn new(descriptor: CapabilityDescriptor) -> Self {
        Self {
            descriptor,
            stats: PerformanceStats::default(),
            status: WorkerStatus::Active,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn is_active(&self) -> bool {
        self.status == WorkerStatus::Active
    }
}

/// Per-factor contribution to a score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub domain_overlap: f64,
    pub complexity_fit: f64,
    pub performance_factor: f64,
}

/// A scored candidate worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub worker_id: String,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub invocation_count: u64,
    /// Required operations the worker does not declare; informational only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_operations: Vec<String>,
}

/// Why a routing decision came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingReason {
    /// Best candidate met the acceptance threshold
    Matched,
    /// Candidates exist but none met the threshold
    BelowThreshold,
    /// No active worker shares a tag with the task
    NoCandidates,
    /// A new worker was synthesized for the task
    Synthesized,
    /// Synthesis conflicted; best existing candidate used regardless of score
    Fallback,
}

impl std::fmt::Display for RoutingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Matched => write!(f, "matched"),
            Self::BelowThreshold => write!(f, "below_threshold"),
            Self::NoCandidates => write!(f, "no_candidates"),
            Self::Synthesized => write!(f, "synthesized"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Output of the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Chosen worker, `None` when nothing qualified
    pub worker_id: Option<String>,
    /// Score of the chosen worker (or of the best candidate when none was chosen)
    pub score: f64,
    /// Reason for the decision
    pub reason: RoutingReason,
    /// Every candidate, best first
    pub candidates: Vec<ScoredCandidate>,
}

impl RoutingDecision {
    /// Whether a worker was chosen
    pub fn is_match(&self) -> bool {
        self.worker_id.is_some()
    }

    /// Highest-ranked candidate regardless of threshold
    pub fn best(&self) -> Option<&ScoredCandidate> {
        self.candidates.first()
    }

    /// Candidates other than the chosen worker
    pub fn alternatives(&self) -> impl Iterator<Item = &ScoredCandidate> {
        let chosen = self.worker_id.clone();
        self.candidates
            .iter()
            .filter(move |c| Some(&c.worker_id) != chosen.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_range_distance() {
        let range = ComplexityRange::new(3.0, 6.0).unwrap();
        assert_eq!(range.distance(4.0), 0.0);
        assert_eq!(range.distance(1.5), 1.5);
        assert_eq!(range.distance(7.0), 1.0);
        assert!(ComplexityRange::new(5.0, 1.0).is_err());
        assert!(ComplexityRange::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_centered_range_clamps_to_scale() {
        let range = ComplexityRange::centered(9.0, 2.0);
        assert_eq!(range, ComplexityRange { min: 7.0, max: 10.0 });
        assert!(range.contains(9.0));

        let low = ComplexityRange::centered(-3.0, 1.0);
        assert_eq!(low, ComplexityRange { min: 0.0, max: 1.0 });
    }

    #[test]
    fn test_descriptor_coverage() {
        let broad = CapabilityDescriptor::new(
            "Broad",
            ["finance", "data"],
            ComplexityRange::new(0.0, 6.0).unwrap(),
        );
        let narrow =
            CapabilityDescriptor::new("Narrow", ["Finance"], ComplexityRange::new(5.0, 9.0).unwrap());
        let disjoint =
            CapabilityDescriptor::new("Late", ["finance"], ComplexityRange::new(7.0, 9.0).unwrap());

        assert!(narrow.covered_by(&broad));
        assert!(!disjoint.covered_by(&broad));
        assert!(!broad.covered_by(&narrow));
        assert!(!narrow.same_coverage(&broad));
    }

    #[test]
    fn test_generated_ids_are_unique_slugs() {
        let a = CapabilityDescriptor::new("Quarterly Finance", ["finance"], ComplexityRange::full());
        let b = CapabilityDescriptor::new("Quarterly Finance", ["finance"], ComplexityRange::full());
        assert!(a.id.starts_with("quarterly-finance-"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_task_profile_dedups_and_clamps() {
        let profile = TaskProfile::new("t", ["ML", "data", "ml", " "], 14.0);
        assert_eq!(profile.domain_tags, vec!["ml".to_string(), "data".to_string()]);
        assert_eq!(profile.complexity, COMPLEXITY_MAX);
    }

    #[test]
    fn test_stats_apply_is_monotonic() {
        let mut stats = PerformanceStats::default();
        stats.apply(&Outcome::success(Duration::from_millis(100)).with_quality(1.0), 0.2);
        stats.apply(&Outcome::failure(Duration::from_millis(300)).with_quality(0.0), 0.2);

        assert_eq!(stats.invocation_count, 2);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.cumulative_latency_ms, 400);
        assert!((stats.rolling_quality.unwrap() - 0.8).abs() < 1e-9);
        assert!((stats.success_rate() - 0.5).abs() < 1e-9);
        assert!(stats.is_consistent());
        assert!(stats.last_used.is_some());
    }

    #[test]
    fn test_quality_untouched_without_sample() {
        let mut stats = PerformanceStats::default();
        stats.apply(&Outcome::success(Duration::ZERO), 0.2);
        assert_eq!(stats.rolling_quality, None);
    }

    #[test]
    fn test_cancelled_outcome_is_failure() {
        let outcome = Outcome::cancelled(Duration::from_millis(5));
        assert!(!outcome.succeeded);
        assert!(outcome.cancelled);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("ACTIVE".parse::<WorkerStatus>().unwrap(), WorkerStatus::Active);
        assert!("retired".parse::<WorkerStatus>().is_err());
    }
}
