//! Phases of a verification request.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse stage of a verification exchange.
///
/// Variants are declared in protocol order; `Cancelled` and `Done` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing has been sent or received yet.
    Unsent,
    /// A request message exists.
    Requested,
    /// The non-requesting party answered with ready.
    Ready,
    /// A method-specific start message was accepted.
    Started,
    /// Terminal - either side cancelled.
    Cancelled,
    /// Terminal - both sides sent done.
    Done,
}

impl Phase {
    /// Check if this is a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Done)
    }

    /// Get phases reachable in a single step from this one.
    pub fn valid_transitions(&self) -> &'static [Phase] {
        match self {
            Self::Unsent => &[Self::Requested, Self::Started, Self::Cancelled],
            Self::Requested => &[Self::Ready, Self::Started, Self::Cancelled],
            Self::Ready => &[Self::Started, Self::Cancelled],
            Self::Started => &[Self::Done, Self::Cancelled],
            Self::Cancelled => &[],
            Self::Done => &[],
        }
    }

    /// Check if transition to target phase is valid.
    pub fn can_transition_to(&self, target: Phase) -> bool {
        self.valid_transitions().contains(&target)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unsent => "unsent",
            Self::Requested => "requested",
            Self::Ready => "ready",
            Self::Started => "started",
            Self::Cancelled => "cancelled",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_transitions() {
        assert!(Phase::Unsent.can_transition_to(Phase::Requested));
        assert!(Phase::Unsent.can_transition_to(Phase::Started));
        assert!(!Phase::Unsent.can_transition_to(Phase::Ready));

        assert!(Phase::Requested.can_transition_to(Phase::Ready));
        assert!(!Phase::Ready.can_transition_to(Phase::Requested));
        assert!(Phase::Started.can_transition_to(Phase::Done));
        assert!(!Phase::Ready.can_transition_to(Phase::Done));
    }

    #[test]
    fn terminal_phases() {
        assert!(Phase::Cancelled.is_terminal());
        assert!(Phase::Done.is_terminal());
        assert!(!Phase::Started.is_terminal());
        assert!(Phase::Done.valid_transitions().is_empty());
        assert!(!Phase::Done.can_transition_to(Phase::Cancelled));
    }

    #[test]
    fn phase_order() {
        assert!(Phase::Unsent < Phase::Requested);
        assert!(Phase::Ready < Phase::Started);
        assert!(Phase::Started < Phase::Cancelled);
    }
}
