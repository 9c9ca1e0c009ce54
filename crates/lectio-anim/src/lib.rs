//! Animation refiner: the plan → implement → validate → repair loop that
//! turns one script section into an executable scene file and a rendered
//! MP4.
//!
//! The loop is strictly sequential per section: choreography plan from the
//! LLM, scene code generation, then iterative refinement combining static
//! checks, deterministic rewrites, a dry-run render probe with an injected
//! spatial checker, surgical LLM edits, and vision-based verification of
//! low-confidence findings.

pub mod bounds;
pub mod choreographer;
pub mod error;
pub mod fixer;
pub mod implementer;
pub mod inject;
pub mod qc;
pub mod refiner;
pub mod render;
pub mod scene_file;
pub mod timing;
pub mod tools;
pub mod validate;

pub use error::{AnimError, AnimResult};
pub use refiner::{AnimationOutput, AnimationRefiner, RefinerConfig, SectionContext};
