//! Session lifecycle states.

use std::fmt;

use crate::protocol::Phase;

/// Where a session is in its lifecycle.
///
/// `Connecting → Authenticating → (PrivilegeEscalation)? → (PagerDisable)?
/// → Capturing → Terminating → Closed`, with `Failed` reachable from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    Authenticating,
    PrivilegeEscalation,
    PagerDisable,
    Capturing,
    Terminating,
    Closed,
    Failed,
}

impl SessionState {
    /// Whether the session has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl From<Phase> for SessionState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Authenticating => SessionState::Authenticating,
            Phase::PrivilegeEscalation => SessionState::PrivilegeEscalation,
            Phase::PagerDisable => SessionState::PagerDisable,
            Phase::Capturing => SessionState::Capturing,
            Phase::Terminating => SessionState::Terminating,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::PrivilegeEscalation => "privilege-escalation",
            SessionState::PagerDisable => "pager-disable",
            SessionState::Capturing => "capturing",
            SessionState::Terminating => "terminating",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}
