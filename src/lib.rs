//! Posture – admission control and posture resolution for simulated actors
//!
//! This crate implements the core that decides which concurrently-active
//! interactions an actor may run and what physical configuration it must hold:
//! - Posture nodes: body, carry and surface aspects with template matching
//! - Posture operations: the transition edges a planner walks, with costs
//! - Interaction state sets: compatibility tests, constraint combination,
//!   priority displacement and the save/load contract

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Runtime core modules implementing posture resolution and admission control
pub mod runtime;

// Re-export key types for convenience
pub use runtime::{Runtime, RuntimeConfig};

/// Current version of the posture runtime
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version of the persisted snapshot layout
pub const SNAPSHOT_VERSION: &str = "1.0.0";
