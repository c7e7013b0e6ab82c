//! # Testrig Supervisor
//!
//! Owns one long-running subprocess at a time (the dependent service or the
//! service under test) and provides:
//! - `start` with working directory, environment and optional log capture
//! - `wait_ready`, polling a caller-supplied readiness probe with a bounded
//!   timeout
//! - `stop`, a graceful signal followed by a force kill, idempotent
//!
//! Probe failures are never errors here; only exhausting the timeout is
//! reported, as `Readiness::TimedOut`.

mod handle;
mod supervisor;

pub use handle::{CommandSpec, ProcessHandle};
pub use supervisor::{ProcessSupervisor, Readiness, StopOutcome, FORCE_KILL_TIMEOUT};
