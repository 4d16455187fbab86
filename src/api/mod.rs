//! Public API for the governance gateway.
//!
//! This module provides the main interface for interacting with the gateway,
//! including the `GovernanceEngine` struct and the request and response types
//! exchanged with callers.

mod engine;
mod wire;

pub use engine::{EngineMetrics, GovernanceEngine, GovernanceEngineBuilder};
pub use wire::{AuditRequest, AuditResponse, ErrorBody, FindingView, PreCheckRequest, PreCheckResponse};
