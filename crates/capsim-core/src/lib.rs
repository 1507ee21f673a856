//! Discrete-event simulation engine for CAPSIM.
//!
//! The engine owns a single-threaded cooperative event loop over a
//! bounded priority queue, paced by a fast or real-time clock. Agent
//! actions and trend influence mutate in-memory state; every mutation
//! is buffered through the batched repository in `capsim-db`.
//!
//! # Modules
//!
//! - [`clock`] -- fast-mode / real-time clock behind one contract
//! - [`queue`] -- bounded priority queue with admission control
//! - [`config`] -- typed YAML configuration with validation
//! - [`metrics`] -- counters and the event-latency histogram
//! - [`engine`] -- bootstrap, main loop, system events, shutdown
//! - [`shutdown`] -- the graceful-shutdown token
//! - [`error`] -- engine error types
//!
//! The action executor and the influence processor are `impl` blocks
//! on [`engine::SimulationEngine`] in their own modules.

pub mod clock;
pub mod config;
pub mod engine;
mod executor;
mod influence;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod shutdown;

pub use clock::{Clock, WaitOutcome};
pub use config::{ConfigError, SimulationConfig};
pub use engine::{ActiveRunLock, EndReason, RunOutcome, SimulationEngine};
pub use error::EngineError;
pub use metrics::{MetricsSnapshot, SimMetrics};
pub use queue::{EventQueue, QueueError, ScheduledEvent};
pub use shutdown::{shutdown_channel, ShutdownHandle, ShutdownToken};
