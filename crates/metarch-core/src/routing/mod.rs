//! Capability routing
//!
//! This module holds the data model shared across the crate and the router
//! that scores registered workers against an analyzed task.
//!
//! - **Capability Descriptor**: what a worker covers (domain tags, complexity
//!   range, operations).
//!
//! - **Task Profile**: the analyzed form of an incoming task.
//!
//! - **Router**: scores each candidate on domain overlap, complexity fit, and
//!   past performance, and picks the best one that clears the acceptance
//!   threshold.
//!
//! ## Example
//!
//! ```rust,ignore
//! use metarch_core::routing::{Router, TaskProfile};
//!
//! let router = Router::new();
//! let profile = TaskProfile::new("Review the quarterly budget", ["finance"], 4.0);
//! let candidates = registry.find_candidates(&profile).await;
//!
//! let decision = router.route(&profile, &candidates);
//! match decision.worker_id {
//!     Some(id) => println!("dispatch to {id}"),
//!     None => println!("no match, best score {:.2}", decision.score),
//! }
//! ```

mod router;
mod types;

pub use router::{Router, RouterConfig, NEUTRAL_PERFORMANCE};
pub use types::{
    clamp_complexity, normalize_tags, CapabilityDescriptor, ComplexityRange, DescriptorOrigin,
    Outcome, PerformanceStats, RoutingDecision, RoutingReason, ScoreBreakdown, ScoredCandidate,
    TaskProfile, WorkerRecord, WorkerStatus, COMPLEXITY_MAX, COMPLEXITY_MIN,
};
