//! Core types and error definitions for the Maestro scheduler.
//!
//! This crate provides the foundational types shared across all Maestro crates:
//! the unified error enum and the identifiers handed out by the coordinator.
//!
//! # Main types
//!
//! - [`MaestroError`]: Unified error enum for all Maestro subsystems.
//! - [`MaestroResult`]: Convenience alias for `Result<T, MaestroError>`.
//! - [`TaskId`] / [`WorkflowId`]: Sequential, process-unique identifiers.
//! - [`AgentId`]: Caller-chosen agent identifier.

/// Error taxonomy.
pub mod error;
/// Identifier newtypes.
pub mod id;

pub use error::{MaestroError, MaestroResult, ResourceKind};
pub use id::{AgentId, TaskId, WorkflowId};
