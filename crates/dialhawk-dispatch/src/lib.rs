//! Call dispatch and admission control for the Dialhawk platform.
//!
//! Decides which leads get dialed, when, and how often:
//!
//! - [`admission`] — the calling-window / limit checks, evaluated
//!   coarsely at enqueue and authoritatively at the worker.
//! - [`queue`] — the durable dial job queue (SQLite-backed,
//!   at-least-once).
//! - [`worker`] — the fixed-size call worker pool and the telephony
//!   status callback (call logs, minute charging, the single
//!   no-answer redial).
//! - [`autopilot`] — the periodic sweep that feeds the queue from each
//!   running agent's lead list.
//! - [`usage`] — the timezone-aware scheduler that resets daily
//!   attempts and monthly minutes.
//!
//! Shared per-agent counters (dial counts, attempt counts, minutes) are
//! updated with single atomic SQL statements — no check-then-act
//! windows anywhere in this crate.

pub mod admission;
pub mod agents;
pub mod attempts;
pub mod autopilot;
pub mod error;
pub mod history;
pub mod leads;
pub mod queue;
pub mod time;
pub mod usage;
pub mod worker;

pub use admission::{agent_local_clock, check_admission, check_policy, Admission, SkipReason};
pub use agents::CreateAgentParams;
pub use error::DispatchError;
pub use leads::{DbLeadSource, LeadSource};
pub use queue::ClaimedJob;
pub use usage::ResetOutcome;
pub use worker::{handle_status_callback, spawn_worker_pool, Telephony, WorkerConfig};
