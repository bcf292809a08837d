//! Sandboxed execution engine for benchmarking machine-generated solutions.
//!
//! Each attempt runs in its own single-purpose interpreter process with a
//! neutered capability surface and hard resource caps. A two-layer timeout
//! (a deadline checked at the harness's test-case loop boundary, backed by a
//! supervisor-side force kill after a grace period) guarantees every attempt
//! terminates with exactly one [`gauntlet_common::ExecutionResult`], and no
//! child process outlives its attempt on any path.
//!
//! Layering, leaf to root:
//! - [`guard`]: capability neutering and resource limits applied before any
//!   candidate code runs.
//! - [`harness`]: renders the per-attempt harness that loads the candidate,
//!   drives the test-case loop and classifies the outcome.
//! - [`supervisor`]: one isolation process per attempt; owns the outer
//!   timeout, forced kill, reap and result parsing.
//! - [`scheduler`]: bounded-concurrency dispatch over many attempts with a
//!   single result-aggregating owner.

pub mod config;
pub mod guard;
pub mod harness;
pub mod scheduler;
pub mod supervisor;

pub use config::EngineConfig;
pub use scheduler::{ExecutionScheduler, SubmitError};
pub use supervisor::ProcessSupervisor;
