//! Error types for the capsim-agents crate.

use capsim_types::AgentId;

/// Errors that can occur during agent state operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// A defensive check found state that should be impossible.
    ///
    /// Invariant violations are fatal: the engine sets the run to FAILED
    /// and aborts through its single unwind path.
    #[error("invariant violation on agent {agent_id}: {context}")]
    InvariantViolation {
        /// The agent whose state is corrupt.
        agent_id: AgentId,
        /// Description of the violated invariant.
        context: String,
    },
}
