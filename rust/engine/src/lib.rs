//! Systematic concurrency-testing engine for event-driven actor
//! programs.
//!
//! The engine intercepts every nondeterministic decision of a run
//! (which operation proceeds, which value a choice takes), delegates it
//! to a pluggable exploration strategy, records a replayable trace, and
//! detects safety and liveness violations. Execution is cooperative:
//! one OS thread per operation, serialized by the controller so at most
//! one operation's actor code runs at any instant.

// The controller treats a poisoned scheduler lock as fatal; a poisoned
// lock means a prior panic inside the engine itself.
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod controller;
pub mod error;
pub mod fingerprint;
pub mod liveness;
pub mod operation;
pub mod registry;
pub mod rng;
pub mod schedule_trace;
pub mod signal;
pub mod strategy;
pub mod trace;

pub use config::{Config, StrategyKind};
pub use controller::{Controller, ExecutionCanceled, IterationOutcome, RunArtifacts};
pub use error::EngineError;
pub use liveness::MonitorId;
pub use operation::{ActionKind, Operation, OperationId, OperationStatus, StateSource};
pub use schedule_trace::ScheduleTrace;
pub use strategy::Strategy;
pub use trace::{Trace, TraceStep, TraceStepKind};
