//! Bounded-time media URL resolution.
//!
//! A [`Resolver`] walks a fixed chain of strategies under a global
//! deadline, validates every provider-supplied URL before trusting it,
//! and reports failures in a closed [`ErrorKind`] taxonomy.

pub mod deadline;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod strategies;
pub mod strategy;

pub use error::{ErrorKind, ResolveError};
pub use model::{
    CandidateRelay, Liveness, MediaId, Outcome, RelayOrigin, ResolutionRequest, ResolutionResult,
    StrategyDescriptor, StrategyOutcome,
};
pub use orchestrator::{AttemptRecord, BackoffPolicy, Resolver};
pub use strategy::ResolveStrategy;
