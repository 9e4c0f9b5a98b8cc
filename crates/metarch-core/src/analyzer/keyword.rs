//! Rule-based classifier
//!
//! Matches the task text against per-domain keyword tables. A domain's
//! confidence is its number of keyword hits; ties keep table order.

use async_trait::async_trait;

use super::{Classification, Classifier};
use crate::error::{Error, Result};

const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    ("data", &["data", "dataset", "analysis", "statistics", "analytics"]),
    (
        "finance",
        &["financial", "finance", "money", "budget", "investment", "stock"],
    ),
    ("web", &["website", "web", "html", "css", "frontend", "backend"]),
    (
        "ml",
        &["machine learning", "ai", "model", "training", "prediction", "neural"],
    ),
    (
        "research",
        &["research", "study", "analyze", "academic", "paper", "investigate"],
    ),
    ("creative", &["creative", "design", "content", "writing", "art"]),
    (
        "automation",
        &["automate", "script", "workflow", "process", "integration"],
    ),
];

/// (stem, operation) pairs; a stem anywhere in the text implies the operation
const OPERATION_STEMS: &[(&str, &str)] = &[
    ("analy", "analyze"),
    ("visuali", "visualize"),
    ("forecast", "forecast"),
    ("predict", "predict"),
    ("summar", "summarize"),
    ("scrap", "scrape"),
    ("train", "train"),
    ("automat", "automate"),
    ("monitor", "monitor"),
    ("design", "design"),
    ("writ", "write"),
    ("optimi", "optimize"),
    ("clean", "clean"),
    ("research", "research"),
];

/// Keyword-table classifier
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn domain_tags(text: &str) -> Vec<String> {
        let mut hits: Vec<(usize, usize, &str)> = DOMAIN_KEYWORDS
            .iter()
            .enumerate()
            .filter_map(|(order, (domain, keywords))| {
                let count = keywords.iter().filter(|k| contains_keyword(text, k)).count();
                (count > 0).then_some((count, order, *domain))
            })
            .collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        if hits.is_empty() {
            return novel_tag(text).into_iter().collect();
        }
        hits.into_iter().map(|(_, _, d)| d.to_string()).collect()
    }

    fn complexity(text: &str) -> f64 {
        let len = text.chars().count();
        if len > 500 || text.contains("complex") {
            8.0
        } else if len > 200 {
            5.0
        } else {
            2.0
        }
    }

    fn operations(text: &str) -> Vec<String> {
        OPERATION_STEMS
            .iter()
            .filter(|(stem, _)| text.contains(stem))
            .map(|(_, op)| op.to_string())
            .collect()
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<Classification> {
        let lower = text.to_lowercase();
        let domain_tags = Self::domain_tags(&lower);
        if domain_tags.is_empty() {
            return Err(Error::AnalysisFailed(format!(
                "no recognizable domain in '{}'",
                text.trim()
            )));
        }

        Ok(Classification {
            domain_tags,
            complexity: Self::complexity(&lower),
            required_operations: Self::operations(&lower),
        })
    }
}

/// Whole-word match for single words, substring match for phrases
fn contains_keyword(text: &str, keyword: &str) -> bool {
    if keyword.contains(' ') {
        return text.contains(keyword);
    }
    text.split(|c: char| !c.is_alphanumeric())
        .any(|word| word == keyword)
}

/// First alphabetic word longer than four characters
fn novel_tag(text: &str) -> Option<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|w| w.trim_matches('-'))
        .find(|w| w.chars().count() > 4 && w.chars().all(|c| c.is_alphabetic() || c == '-'))
        .map(str::to_string)
}
