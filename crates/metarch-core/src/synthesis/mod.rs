//! Agent synthesis
//!
//! When the router finds no acceptable worker, the synthesizer derives a new
//! [`CapabilityDescriptor`] from the task profile and registers it. Synthesis
//! only produces routing metadata; execution is always delegated to the
//! orchestrator's executor.

mod templates;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::registry::WorkerRegistry;
use crate::routing::{CapabilityDescriptor, ComplexityRange, DescriptorOrigin, TaskProfile};

pub use templates::{render_prompt, template_for, DomainTemplate};

const DESCRIPTION_EXCERPT_CHARS: usize = 200;

/// Synthesis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Number of top-confidence profile tags copied into the descriptor
    pub top_n_tags: usize,
    /// Half-width of the complexity range around the profile's estimate
    pub creation_margin: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            top_n_tags: 3,
            creation_margin: 2.0,
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_n_tags == 0 {
            return Err(Error::ConfigError(
                "synthesis.top_n_tags must be at least 1".to_string(),
            ));
        }
        if !self.creation_margin.is_finite() || self.creation_margin < 0.0 {
            return Err(Error::ConfigError(format!(
                "synthesis.creation_margin must be non-negative, got {}",
                self.creation_margin
            )));
        }
        Ok(())
    }
}

/// Creates and registers descriptors for unmatched profiles
#[derive(Debug)]
pub struct AgentSynthesizer {
    registry: Arc<WorkerRegistry>,
    config: SynthesisConfig,
}

impl AgentSynthesizer {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self::with_config(registry, SynthesisConfig::default())
    }

    pub fn with_config(registry: Arc<WorkerRegistry>, config: SynthesisConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Build the descriptor a profile would get, without registering it
    pub fn design(&self, profile: &TaskProfile) -> Result<CapabilityDescriptor> {
        let tags: Vec<String> = profile.top_tags(self.config.top_n_tags).cloned().collect();
        let primary = tags.first().cloned().ok_or_else(|| {
            Error::NoCapableWorker(format!(
                "task has no domain tags to specialize in: '{}'",
                excerpt(&profile.raw_text, 80)
            ))
        })?;

        let template = template_for(&primary);
        let mut operations = profile.required_operations.clone();
        if let Some(template) = template {
            operations.extend(template.operations.iter().map(|op| op.to_string()));
        }

        let name = agent_name(&primary, &profile.raw_text);
        let focus = match template {
            Some(t) => t.focus.to_string(),
            None => format!("{} tasks", tags.join(", ")),
        };
        let summary = match template {
            Some(_) => format!("Specialist in {}", focus),
            None => format!("Specialist for {}", focus),
        };
        let task = excerpt(&profile.raw_text, DESCRIPTION_EXCERPT_CHARS);
        let description = if task.is_empty() {
            summary.clone()
        } else {
            format!("{}: {}", summary, task)
        };
        let mission = if task.is_empty() { summary } else { task };
        let prompt = render_prompt(&focus, &tags, &mission);

        Ok(CapabilityDescriptor::new(
            name,
            tags,
            ComplexityRange::centered(profile.complexity, self.config.creation_margin),
        )
        .with_operations(operations)
        .with_description(description)
        .with_prompt_template(prompt)
        .with_origin(DescriptorOrigin::Synthesized))
    }

    /// Design and register a descriptor for the profile
    ///
    /// Design and registration are one step: on `SynthesisConflict` nothing has
    /// been registered.
    pub async fn create(&self, profile: &TaskProfile) -> Result<CapabilityDescriptor> {
        let descriptor = self.design(profile)?;

        match self.registry.register_synthesized(descriptor).await {
            Ok(record) => {
                info!(
                    worker_id = %record.descriptor.id,
                    name = %record.descriptor.name,
                    tags = ?record.descriptor.domain_tags,
                    complexity = %record.descriptor.complexity,
                    "Synthesized new worker"
                );
                Ok(record.descriptor)
            }
            Err(Error::SynthesisConflict(reason)) | Err(Error::DuplicateCapability(reason)) => {
                warn!(tags = ?profile.domain_tags, reason = %reason, "Synthesis blocked");
                Err(Error::SynthesisConflict(reason))
            }
            Err(e) => Err(e),
        }
    }
}

/// `<FirstSignificantWord><Domain>Agent`, or `Specialized<Domain>Agent`
fn agent_name(domain: &str, task: &str) -> String {
    let domain = pascal_case(domain);
    let keyword = task
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .find(|w| w.chars().count() > 4 && w.chars().all(char::is_alphabetic));

    match keyword {
        Some(word) => format!("{}{}Agent", pascal_case(&word.to_lowercase()), domain),
        None => format!("Specialized{}Agent", domain),
    }
}

fn pascal_case(s: &str) -> String {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{Router, WorkerRecord, COMPLEXITY_MAX};

    fn synthesizer() -> (Arc<WorkerRegistry>, AgentSynthesizer) {
        let registry = Arc::new(WorkerRegistry::new());
        let synth = AgentSynthesizer::new(Arc::clone(&registry));
        (registry, synth)
    }

    #[test]
    fn test_design_copies_top_tags_and_centers_range() {
        let (_, synth) = synthesizer();
        let profile = TaskProfile::new("Quarterly budget forecast", ["finance", "data", "ml", "web"], 4.0)
            .with_operations(["forecast"]);

        let descriptor = synth.design(&profile).unwrap();

        let tags: Vec<&str> = descriptor.domain_tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["data", "finance", "ml"]);
        assert_eq!(descriptor.complexity, ComplexityRange { min: 2.0, max: 6.0 });
        assert!(descriptor.operations.contains("forecast"));
        assert!(descriptor.operations.contains("risk_analysis"));
        assert_eq!(descriptor.name, "QuarterlyFinanceAgent");
        assert_eq!(descriptor.origin, DescriptorOrigin::Synthesized);
        assert!(descriptor.description.unwrap().starts_with("Specialist in financial analysis"));
        let prompt = descriptor.prompt_template.unwrap();
        assert!(prompt.contains("focused on financial analysis and investment insights"));
        assert!(prompt.contains("Quarterly budget forecast"));
        assert!(prompt.contains("finance, data, ml"));
    }

    #[test]
    fn test_design_novel_domain() {
        let (_, synth) = synthesizer();
        let profile = TaskProfile::new("why do birds navigate", ["quantum-biology"], 9.5);

        let descriptor = synth.design(&profile).unwrap();

        assert_eq!(descriptor.name, "BirdsQuantumBiologyAgent");
        assert!(descriptor
            .prompt_template
            .unwrap()
            .contains("focused on quantum-biology tasks"));
        assert_eq!(descriptor.complexity.max, COMPLEXITY_MAX);
        assert!(descriptor.operations.is_empty());
    }

    #[test]
    fn test_design_without_task_text() {
        let (_, synth) = synthesizer();
        let profile = TaskProfile::new("", ["web"], 5.0);

        let descriptor = synth.design(&profile).unwrap();

        assert_eq!(descriptor.name, "SpecializedWebAgent");
        assert_eq!(
            descriptor.description.as_deref(),
            Some("Specialist in web development and frontend design")
        );
    }

    #[test]
    fn test_design_without_tags_fails() {
        let (_, synth) = synthesizer();
        let profile = TaskProfile::new("???", Vec::<String>::new(), 3.0);
        assert!(matches!(synth.design(&profile), Err(Error::NoCapableWorker(_))));
    }

    #[tokio::test]
    async fn test_created_worker_is_immediately_eligible() {
        let (registry, synth) = synthesizer();
        let router = Router::new();
        let profile = TaskProfile::new("Study enzyme tunnelling", ["quantum-biology"], 7.0);

        let descriptor = synth.create(&profile).await.unwrap();

        let record = registry.get(&descriptor.id).await.unwrap();
        assert!(router.score(&record, &profile) >= router.config().acceptance_threshold);
        assert_eq!(
            router.route(&profile, &[record]).worker_id.as_deref(),
            Some(descriptor.id.as_str())
        );
    }

    #[tokio::test]
    async fn test_second_creation_conflicts() {
        let (registry, synth) = synthesizer();
        let profile = TaskProfile::new("Study enzyme tunnelling", ["quantum-biology"], 7.0);

        synth.create(&profile).await.unwrap();
        let err = synth.create(&profile).await.unwrap_err();

        assert!(matches!(err, Error::SynthesisConflict(_)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_operator_worker_blocks_covered_synthesis() {
        let (registry, synth) = synthesizer();
        registry
            .register(CapabilityDescriptor::new(
                "Generalist",
                ["finance", "data"],
                ComplexityRange::full(),
            ))
            .await
            .unwrap();

        let profile = TaskProfile::new("budget", ["finance"], 5.0);
        assert!(matches!(synth.create(&profile).await, Err(Error::SynthesisConflict(_))));

        let snapshot: Vec<WorkerRecord> = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_excerpt_truncates() {
        assert_eq!(excerpt("  short  ", 10), "short");
        assert_eq!(excerpt("abcdefghijkl", 5), "abcde...");
    }

    #[test]
    fn test_config_validation() {
        assert!(SynthesisConfig::default().validate().is_ok());
        let zero = SynthesisConfig {
            top_n_tags: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }
}
