//! Error types for the simulation engine.

use capsim_agents::AgentError;
use capsim_db::DbError;

use crate::config::ConfigError;
use crate::queue::QueueError;

/// Errors that can abort a simulation run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration was malformed or missing. Fatal at bootstrap.
    #[error("configuration error: {source}")]
    Config {
        /// The underlying configuration error.
        #[from]
        source: ConfigError,
    },

    /// Another run with non-terminal status exists. Bootstrap refused;
    /// no state was written.
    #[error("an active simulation already exists")]
    ActiveSimulationExists,

    /// A store operation failed during bootstrap, where persistence is
    /// not yet buffered and failures cannot be absorbed.
    #[error("store error during bootstrap: {source}")]
    Bootstrap {
        /// The underlying store error.
        #[from]
        source: DbError,
    },

    /// A defensive check found impossible state. The run was marked
    /// FAILED and flushed before this surfaced.
    #[error("invariant violation: {context}")]
    InvariantViolation {
        /// Description of the violated invariant.
        context: String,
    },
}

impl From<AgentError> for EngineError {
    fn from(err: AgentError) -> Self {
        Self::InvariantViolation {
            context: err.to_string(),
        }
    }
}

impl From<QueueError> for EngineError {
    fn from(err: QueueError) -> Self {
        // Queue admission failures are absorbed at the call site; only
        // impossible states (e.g. negative timestamps) reach here.
        Self::InvariantViolation {
            context: err.to_string(),
        }
    }
}
