//! Financial Planning Pipeline
//!
//! A personal-finance planner that:
//! - Turns a profile into a structured plan with a text generator
//! - Runs deterministic finance engines over the plan (LLM excluded from execution)
//! - Reflects on the results and remembers each episode for later recall
//!
//! PIPELINE:
//! INIT → PLAN → EXECUTE → REFLECT → DONE

pub mod agent;
pub mod api;
pub mod config;
pub mod engines;
pub mod error;
pub mod execution;
pub mod gemini;
pub mod generator;
pub mod memory;
pub mod models;
pub mod planner;
pub mod reflector;
pub mod state;
pub mod store;
pub mod tools;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use models::*;
pub use state::{Stage, WorkflowState};
