//! Typed errors for the outcomes callers are expected to act on.
//!
//! Provider, advisor and transport plumbing returns `anyhow::Result`; those
//! failures are absorbed by fallbacks and never reach these types.

use std::time::Duration;
use uuid::Uuid;

use crate::model::RouteStatus;

/// The only synthesis failure surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("location could not be resolved: {address}")]
    LocationUnresolvable { address: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("route not found: {0}")]
    NotFound(Uuid),

    #[error("route {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: RouteStatus,
        to: RouteStatus,
    },

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Why an advisor response could not be used. Always recovered internally.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdvisorFailure {
    #[error("advisor timed out after {0:?}")]
    Timeout(Duration),

    #[error("advisor call failed: {0}")]
    Transport(String),

    #[error("malformed advisor response: {0}")]
    Malformed(String),
}
