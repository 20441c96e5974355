//! Saga state machines.

use serde::{Deserialize, Serialize};

/// Progress of one registration or deletion run.
///
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          └──► Compensating ──► Failed
/// ```
///
/// `Failed` means the undo pass ran, not that it fully succeeded; individual
/// compensation results are reported by the compensation manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    #[default]
    NotStarted,
    Running,
    /// Undoing completed steps in reverse order.
    Compensating,
    Completed,
    Failed,
}

impl SagaState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// Returns true if the saga may move to `next`.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        matches!(
            (self, next),
            (SagaState::NotStarted, SagaState::Running)
                | (SagaState::Running, SagaState::Completed)
                | (SagaState::Running, SagaState::Compensating)
                | (SagaState::Compensating, SagaState::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Running => "Running",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-order settlement progress.
///
/// State transitions:
/// ```text
/// Received ──► Authorizing ──┬──► Settled
///     │                      └──► Failed
///     └─────────────────────────► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SettlementState {
    /// Order-created event arrived; nothing recorded yet.
    #[default]
    Received,

    /// Pending payment recorded; waiting for a verdict.
    Authorizing,

    /// Verdict recorded and published (terminal state).
    Settled,

    /// Something went wrong; a failure event was published (terminal state).
    Failed,
}

impl SettlementState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SettlementState::Settled | SettlementState::Failed)
    }

    /// Returns true if the state may move to `next`.
    pub fn can_transition_to(&self, next: SettlementState) -> bool {
        matches!(
            (self, next),
            (SettlementState::Received, SettlementState::Authorizing)
                | (SettlementState::Received, SettlementState::Failed)
                | (SettlementState::Authorizing, SettlementState::Settled)
                | (SettlementState::Authorizing, SettlementState::Failed)
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementState::Received => "Received",
            SettlementState::Authorizing => "Authorizing",
            SettlementState::Settled => "Settled",
            SettlementState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SettlementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
