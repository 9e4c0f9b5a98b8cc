//! Worker registry
//!
//! The registry is the only shared mutable state in the core. Its locking
//! discipline:
//!
//! - The worker map sits behind a `RwLock`. Lookups take the read lock and may
//!   run concurrently with each other.
//! - Structural writes (`register`, `register_synthesized`, `revise`,
//!   `deprecate`) take the write lock, so the duplicate-coverage check and the
//!   insert form a single critical section.
//! - Each worker's [`PerformanceStats`] live behind their own `Mutex`.
//!   `update_stats` only holds the map read lock long enough to clone the
//!   handle, so updates for different workers proceed in parallel while
//!   updates for the same worker serialize.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::routing::{
    CapabilityDescriptor, ComplexityRange, Outcome, PerformanceStats, TaskProfile, WorkerRecord,
    WorkerStatus,
};

struct WorkerEntry {
    descriptor: CapabilityDescriptor,
    status: WorkerStatus,
    stats: Arc<Mutex<PerformanceStats>>,
}

impl WorkerEntry {
    fn new(descriptor: CapabilityDescriptor, status: WorkerStatus, stats: PerformanceStats) -> Self {
        Self {
            descriptor,
            status,
            stats: Arc::new(Mutex::new(stats)),
        }
    }

    async fn snapshot(&self) -> WorkerRecord {
        WorkerRecord {
            descriptor: self.descriptor.clone(),
            stats: self.stats.lock().await.clone(),
            status: self.status,
        }
    }
}

/// Registry of worker descriptors and their live statistics
#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, WorkerEntry>>,
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry").finish_non_exhaustive()
    }
}

impl WorkerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from a persisted snapshot
    ///
    /// The snapshot must satisfy every registry invariant; anything else is
    /// reported as corruption.
    pub fn from_records(records: Vec<WorkerRecord>) -> Result<Self> {
        let mut workers = HashMap::with_capacity(records.len());
        for record in records {
            let id = record.descriptor.id.clone();
            if workers.contains_key(&id) {
                return Err(Error::RegistryCorrupted(format!(
                    "worker id '{}' appears more than once",
                    id
                )));
            }
            check_stats(&id, &record.stats)?;
            workers.insert(
                id,
                WorkerEntry::new(record.descriptor, record.status, record.stats),
            );
        }

        check_entries(&workers)?;
        info!(count = workers.len(), "Restored worker registry");
        Ok(Self {
            workers: RwLock::new(workers),
        })
    }

    /// Register an operator-supplied descriptor
    ///
    /// Fails with `DuplicateCapability` if an active worker already has the
    /// identical (domain tags, complexity range) pair.
    pub async fn register(&self, descriptor: CapabilityDescriptor) -> Result<WorkerRecord> {
        descriptor.validate()?;
        let mut workers = self.workers.write().await;

        if workers.contains_key(&descriptor.id) {
            return Err(Error::DuplicateCapability(format!(
                "worker id '{}' is already registered",
                descriptor.id
            )));
        }
        if let Some(existing) = find_same_coverage(&workers, &descriptor, None) {
            return Err(Error::DuplicateCapability(format!(
                "'{}' already covers {:?} at {}",
                existing, descriptor.domain_tags, descriptor.complexity
            )));
        }

        Ok(insert(&mut workers, descriptor))
    }

    /// Register a synthesized descriptor
    ///
    /// In addition to the duplicate check, rejects the descriptor with
    /// `SynthesisConflict` when an active worker already covers its tags with
    /// an overlapping complexity range.
    pub async fn register_synthesized(&self, descriptor: CapabilityDescriptor) -> Result<WorkerRecord> {
        descriptor.validate()?;
        let mut workers = self.workers.write().await;

        if workers.contains_key(&descriptor.id) {
            return Err(Error::SynthesisConflict(format!(
                "worker id '{}' is already registered",
                descriptor.id
            )));
        }
        let covering = workers
            .values()
            .filter(|e| e.status == WorkerStatus::Active)
            .find(|e| descriptor.covered_by(&e.descriptor));
        if let Some(existing) = covering {
            return Err(Error::SynthesisConflict(format!(
                "'{}' already covers {:?} at {}",
                existing.descriptor.id, descriptor.domain_tags, descriptor.complexity
            )));
        }

        Ok(insert(&mut workers, descriptor))
    }

    /// Replace a descriptor's coverage, bumping its version
    ///
    /// `expected_version` must match the current version. Statistics are kept.
    pub async fn revise(
        &self,
        worker_id: &str,
        expected_version: u32,
        domain_tags: Vec<String>,
        complexity: ComplexityRange,
        operations: Vec<String>,
    ) -> Result<WorkerRecord> {
        let mut workers = self.workers.write().await;

        let current = workers
            .get(worker_id)
            .ok_or_else(|| Error::UnknownWorker(worker_id.to_string()))?;
        if current.descriptor.version != expected_version {
            return Err(Error::VersionConflict {
                worker_id: worker_id.to_string(),
                expected: expected_version,
                actual: current.descriptor.version,
            });
        }

        let mut revised = current.descriptor.clone();
        revised.domain_tags = crate::routing::normalize_tags(domain_tags);
        revised.complexity = complexity;
        revised.operations = operations.into_iter().collect();
        revised.version += 1;
        revised.validate()?;

        if current.status == WorkerStatus::Active {
            if let Some(existing) = find_same_coverage(&workers, &revised, Some(worker_id)) {
                return Err(Error::DuplicateCapability(format!(
                    "'{}' already covers {:?} at {}",
                    existing, revised.domain_tags, revised.complexity
                )));
            }
        }

        let entry = workers
            .get_mut(worker_id)
            .ok_or_else(|| Error::UnknownWorker(worker_id.to_string()))?;
        entry.descriptor = revised;
        info!(
            worker_id = %worker_id,
            version = entry.descriptor.version,
            "Revised worker descriptor"
        );
        Ok(entry.snapshot().await)
    }

    /// Mark a worker as deprecated; history is retained
    pub async fn deprecate(&self, worker_id: &str) -> Result<WorkerRecord> {
        let mut workers = self.workers.write().await;
        let entry = workers
            .get_mut(worker_id)
            .ok_or_else(|| Error::UnknownWorker(worker_id.to_string()))?;

        if entry.status != WorkerStatus::Deprecated {
            entry.status = WorkerStatus::Deprecated;
            info!(worker_id = %worker_id, "Deprecated worker");
        }
        Ok(entry.snapshot().await)
    }

    /// All active workers sharing at least one tag with the profile
    ///
    /// Complexity is deliberately not considered here; that is the router's job.
    pub async fn find_candidates(&self, profile: &TaskProfile) -> Vec<WorkerRecord> {
        let workers = self.workers.read().await;
        let mut candidates = Vec::new();
        for entry in workers.values() {
            if entry.status == WorkerStatus::Active
                && entry.descriptor.shares_tag_with(&profile.domain_tags)
            {
                candidates.push(entry.snapshot().await);
            }
        }
        candidates.sort_by(|a, b| a.descriptor.id.cmp(&b.descriptor.id));

        debug!(
            tags = ?profile.domain_tags,
            count = candidates.len(),
            "Found candidate workers"
        );
        candidates
    }

    /// Fold an outcome into a worker's statistics
    ///
    /// This is the only mutation path for [`PerformanceStats`].
    pub async fn update_stats(
        &self,
        worker_id: &str,
        outcome: &Outcome,
        quality_weight: f64,
    ) -> Result<PerformanceStats> {
        let stats = {
            let workers = self.workers.read().await;
            workers
                .get(worker_id)
                .map(|e| Arc::clone(&e.stats))
                .ok_or_else(|| Error::UnknownWorker(worker_id.to_string()))?
        };

        let mut stats = stats.lock().await;
        stats.apply(outcome, quality_weight);
        Ok(stats.clone())
    }

    /// Snapshot of a single worker
    pub async fn get(&self, worker_id: &str) -> Option<WorkerRecord> {
        let workers = self.workers.read().await;
        match workers.get(worker_id) {
            Some(entry) => Some(entry.snapshot().await),
            None => None,
        }
    }

    /// Snapshot of every worker, sorted by id
    pub async fn snapshot(&self) -> Vec<WorkerRecord> {
        let workers = self.workers.read().await;
        let mut records = Vec::with_capacity(workers.len());
        for entry in workers.values() {
            records.push(entry.snapshot().await);
        }
        records.sort_by(|a, b| a.descriptor.id.cmp(&b.descriptor.id));
        records
    }

    /// Number of registered workers (any status)
    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    /// Whether the registry has no workers
    pub async fn is_empty(&self) -> bool {
        self.workers.read().await.is_empty()
    }

    /// Check one worker's statistics invariant
    pub async fn check_worker(&self, worker_id: &str) -> Result<()> {
        let stats = {
            let workers = self.workers.read().await;
            workers
                .get(worker_id)
                .map(|e| Arc::clone(&e.stats))
                .ok_or_else(|| Error::UnknownWorker(worker_id.to_string()))?
        };
        let stats = stats.lock().await;
        check_stats(worker_id, &stats)
    }

    /// Check every registry invariant
    pub async fn verify_integrity(&self) -> Result<()> {
        let workers = self.workers.read().await;
        for (id, entry) in workers.iter() {
            let stats = entry.stats.lock().await;
            check_stats(id, &stats)?;
        }
        check_entries(&workers)
    }

    /// Aggregate view of the worker ecosystem
    pub async fn ecosystem_status(&self) -> EcosystemStatus {
        let records = self.snapshot().await;

        let mut status = EcosystemStatus {
            total_workers: records.len(),
            ..Default::default()
        };
        let mut quality_sum = 0.0;
        let mut quality_samples = 0usize;
        let mut total_successes = 0u64;
        let mut usage_by_domain: BTreeMap<String, u64> = BTreeMap::new();

        for record in &records {
            match record.status {
                WorkerStatus::Active => status.active_workers += 1,
                WorkerStatus::Deprecated => status.deprecated_workers += 1,
            }
            for tag in &record.descriptor.domain_tags {
                *status.domains.entry(tag.clone()).or_insert(0) += 1;
                *usage_by_domain.entry(tag.clone()).or_insert(0) += record.stats.invocation_count;
            }
            status.total_invocations += record.stats.invocation_count;
            total_successes += record.stats.success_count;
            if let Some(q) = record.stats.rolling_quality {
                quality_sum += q;
                quality_samples += 1;
            }
        }

        if status.total_invocations > 0 {
            status.success_rate = total_successes as f64 / status.total_invocations as f64;
        }
        if quality_samples > 0 {
            status.average_quality = Some(quality_sum / quality_samples as f64);
        }
        // Highest usage wins; BTreeMap order makes ties resolve alphabetically
        status.most_active_domain = usage_by_domain
            .into_iter()
            .filter(|(_, uses)| *uses > 0)
            .fold(None, |best: Option<(String, u64)>, (tag, uses)| match best {
                Some((_, best_uses)) if best_uses >= uses => best,
                _ => Some((tag, uses)),
            })
            .map(|(tag, _)| tag);

        status
    }
}

/// Summary of the worker ecosystem
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EcosystemStatus {
    pub total_workers: usize,
    pub active_workers: usize,
    pub deprecated_workers: usize,
    /// Workers per domain tag
    pub domains: BTreeMap<String, usize>,
    pub total_invocations: u64,
    /// Successes over invocations across all workers
    pub success_rate: f64,
    /// Mean rolling quality of workers that have one
    pub average_quality: Option<f64>,
    /// Tag with the most recorded invocations
    pub most_active_domain: Option<String>,
}

fn check_stats(worker_id: &str, stats: &PerformanceStats) -> Result<()> {
    if !stats.is_consistent() {
        return Err(Error::RegistryCorrupted(format!(
            "worker '{}' has {} successes out of {} invocations",
            worker_id, stats.success_count, stats.invocation_count
        )));
    }
    Ok(())
}

/// Ids match their keys and no two active workers share a coverage pair
fn check_entries(workers: &HashMap<String, WorkerEntry>) -> Result<()> {
    let mut seen: Vec<&CapabilityDescriptor> = Vec::new();
    for (id, entry) in workers.iter() {
        if id != &entry.descriptor.id {
            return Err(Error::RegistryCorrupted(format!(
                "worker stored under '{}' has id '{}'",
                id, entry.descriptor.id
            )));
        }
        if entry.status != WorkerStatus::Active {
            continue;
        }
        if let Some(other) = seen.iter().find(|d| d.same_coverage(&entry.descriptor)) {
            return Err(Error::RegistryCorrupted(format!(
                "active workers '{}' and '{}' have identical coverage",
                other.id, id
            )));
        }
        seen.push(&entry.descriptor);
    }
    Ok(())
}

fn find_same_coverage<'a>(
    workers: &'a HashMap<String, WorkerEntry>,
    descriptor: &CapabilityDescriptor,
    skip_id: Option<&str>,
) -> Option<&'a str> {
    workers
        .values()
        .filter(|e| e.status == WorkerStatus::Active)
        .filter(|e| Some(e.descriptor.id.as_str()) != skip_id)
        .find(|e| e.descriptor.same_coverage(descriptor))
        .map(|e| e.descriptor.id.as_str())
}

fn insert(workers: &mut HashMap<String, WorkerEntry>, descriptor: CapabilityDescriptor) -> WorkerRecord {
    info!(
        worker_id = %descriptor.id,
        name = %descriptor.name,
        tags = ?descriptor.domain_tags,
        complexity = %descriptor.complexity,
        origin = %descriptor.origin,
        "Registered worker"
    );
    let record = WorkerRecord::new(descriptor);
    workers.insert(
        record.descriptor.id.clone(),
        WorkerEntry::new(
            record.descriptor.clone(),
            record.status,
            record.stats.clone(),
        ),
    );
    record
}
