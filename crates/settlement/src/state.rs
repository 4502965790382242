//! Settlement run state machine.

use serde::{Deserialize, Serialize};

/// The state of a settlement run.
///
/// State transitions:
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          └──► PartiallyFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SettlementState {
    #[default]
    NotStarted,

    /// Orders are being settled one by one.
    Running,

    /// Every order was settled or skipped (terminal state).
    Completed,

    /// An order failed; earlier settlements stand (terminal state).
    PartiallyFailed,
}

impl SettlementState {
    pub fn can_start(&self) -> bool {
        matches!(self, SettlementState::NotStarted)
    }

    /// Returns true while per-order outcomes can still be recorded.
    pub fn is_running(&self) -> bool {
        matches!(self, SettlementState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SettlementState::Completed | SettlementState::PartiallyFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementState::NotStarted => "NotStarted",
            SettlementState::Running => "Running",
            SettlementState::Completed => "Completed",
            SettlementState::PartiallyFailed => "PartiallyFailed",
        }
    }
}

impl std::fmt::Display for SettlementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
