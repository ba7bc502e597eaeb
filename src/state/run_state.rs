/// Run state definitions for the scan orchestrator
///
/// This module defines the lifecycle a scan run moves through.
use std::fmt;

/// Represents the current state of a scan run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Establishing the session and opening the store
    Init,

    /// Walking the listing and producing references
    Collecting,

    /// Resolving references into records
    Extracting,

    /// Final flush performed, summary produced
    Done,

    /// Initialization failed; nothing was scanned
    Failed,
}

impl RunState {
    /// Returns true if the run cannot move any further
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Checks whether the orchestrator may move from `self` to `next`
    ///
    /// Collection and extraction overlap in pipelined mode, so a run may go
    /// straight from `Init` to `Extracting` when the reference set is supplied
    /// up front, and may reach `Done` from either active state when interrupted.
    /// `Failed` is only reachable from `Init`.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Init, Collecting)
                | (Init, Extracting)
                | (Init, Failed)
                | (Collecting, Extracting)
                | (Collecting, Done)
                | (Extracting, Done)
        )
    }

    /// Converts the run state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Collecting => "collecting",
            Self::Extracting => "extracting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parses a run state from a database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "init" => Some(Self::Init),
            "collecting" => Some(Self::Collecting),
            "extracting" => Some(Self::Extracting),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(RunState::Init.can_transition_to(RunState::Collecting));
        assert!(RunState::Collecting.can_transition_to(RunState::Extracting));
        assert!(RunState::Extracting.can_transition_to(RunState::Done));
    }

    #[test]
    fn test_failed_only_from_init() {
        assert!(RunState::Init.can_transition_to(RunState::Failed));
        assert!(!RunState::Collecting.can_transition_to(RunState::Failed));
        assert!(!RunState::Extracting.can_transition_to(RunState::Failed));
    }

    #[test]
    fn test_interrupted_collection_reaches_done() {
        assert!(RunState::Collecting.can_transition_to(RunState::Done));
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        for next in [
            RunState::Init,
            RunState::Collecting,
            RunState::Extracting,
            RunState::Done,
            RunState::Failed,
        ] {
            assert!(!RunState::Done.can_transition_to(next));
            assert!(!RunState::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_db_string_roundtrip() {
        for state in [
            RunState::Init,
            RunState::Collecting,
            RunState::Extracting,
            RunState::Done,
            RunState::Failed,
        ] {
            assert_eq!(RunState::from_db_string(state.to_db_string()), Some(state));
        }
        assert_eq!(RunState::from_db_string("bogus"), None);
    }
}
