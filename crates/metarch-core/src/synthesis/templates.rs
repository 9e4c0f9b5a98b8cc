//! Built-in domain templates
//!
//! Known domains contribute a focus phrase (used in generated descriptions
//! and prompt templates) and a default set of operations for synthesized
//! workers.

/// Template for one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainTemplate {
    pub domain: &'static str,
    pub focus: &'static str,
    pub operations: &'static [&'static str],
}

const TEMPLATES: &[DomainTemplate] = &[
    DomainTemplate {
        domain: "data",
        focus: "data analysis and statistical insights",
        operations: &[
            "analyze_dataset",
            "create_visualization",
            "statistical_summary",
            "data_quality_check",
        ],
    },
    DomainTemplate {
        domain: "finance",
        focus: "financial analysis and investment insights",
        operations: &[
            "calculate_metrics",
            "risk_analysis",
            "portfolio_optimization",
            "financial_forecasting",
        ],
    },
    DomainTemplate {
        domain: "web",
        focus: "web development and frontend design",
        operations: &["generate_html", "create_css", "web_scraping", "validate_markup"],
    },
    DomainTemplate {
        domain: "ml",
        focus: "machine learning and predictive modeling",
        operations: &[
            "train_model",
            "evaluate_model",
            "feature_selection",
            "hyperparameter_tuning",
        ],
    },
    DomainTemplate {
        domain: "research",
        focus: "research and academic analysis",
        operations: &[
            "literature_review",
            "summarize_papers",
            "citation_analysis",
            "research_synthesis",
        ],
    },
    DomainTemplate {
        domain: "creative",
        focus: "creative content and design",
        operations: &[
            "generate_content",
            "brainstorm_ideas",
            "creative_writing",
            "design_concepts",
        ],
    },
    DomainTemplate {
        domain: "automation",
        focus: "automation and workflow optimization",
        operations: &["automate_task", "monitor_system", "integrate_apis", "schedule_jobs"],
    },
];

/// Look up the template for a domain tag
pub fn template_for(domain: &str) -> Option<&'static DomainTemplate> {
    TEMPLATES.iter().find(|t| t.domain == domain)
}

/// Prompt a synthesized worker is primed with
///
/// `focus` is the template's focus phrase (or a tag summary for unknown
/// domains), `mission` the task the worker was created for.
pub fn render_prompt(focus: &str, domains: &[String], mission: &str) -> String {
    let domains = domains.join(", ");
    format!(
        "You are a specialized agent focused on {focus}.\n\
         \n\
         Mission:\n\
         {mission}\n\
         \n\
         Expertise:\n\
         - Working knowledge of the {domains} domain\n\
         - Practical, step-by-step problem solving\n\
         \n\
         When responding:\n\
         1. Start with a short analysis of the request\n\
         2. Give specific, actionable recommendations and explain the reasoning\n\
         3. Note risks and how to mitigate them\n\
         4. Finish with suggested next steps\n\
         \n\
         Stay accurate and relevant to {domains}."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let finance = template_for("finance").unwrap();
        assert!(finance.operations.contains(&"risk_analysis"));
        assert!(template_for("quantum-biology").is_none());
    }

    #[test]
    fn test_render_prompt() {
        let prompt = render_prompt(
            "financial analysis and investment insights",
            &["finance".to_string(), "data".to_string()],
            "Review the quarterly budget",
        );

        assert!(prompt.starts_with("You are a specialized agent focused on financial analysis"));
        assert!(prompt.contains("Mission:\nReview the quarterly budget\n"));
        assert!(prompt.ends_with("Stay accurate and relevant to finance, data."));
    }
}
