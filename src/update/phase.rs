// ABOUTME: Phases of an update run and the transitions allowed between them.
// ABOUTME: Terminal phases accept no further transitions.

use serde::{Deserialize, Serialize};

/// Where an update run is in its lifecycle.
///
/// ```text
/// Idle → Checking → NoUpdate
///                 → BackingUp → Applying → Verifying → Committed
///                                        ↘           ↘
///                                          RollingBack → RolledBack | Failed
/// ```
/// Any non-terminal phase may also go straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Checking,
    NoUpdate,
    BackingUp,
    Applying,
    Verifying,
    Committed,
    RollingBack,
    RolledBack,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Phase::NoUpdate | Phase::Committed | Phase::RolledBack | Phase::Failed
        )
    }

    /// Whether the run ended without leaving the deployment worse off.
    pub fn is_success(&self) -> bool {
        matches!(self, Phase::NoUpdate | Phase::Committed)
    }

    pub fn can_transition_to(&self, next: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Phase::Failed {
            return true;
        }
        matches!(
            (self, next),
            (Phase::Idle, Phase::Checking)
                | (Phase::Checking, Phase::NoUpdate)
                | (Phase::Checking, Phase::BackingUp)
                | (Phase::BackingUp, Phase::Applying)
                | (Phase::Applying, Phase::Verifying)
                | (Phase::Applying, Phase::RollingBack)
                | (Phase::Verifying, Phase::Committed)
                | (Phase::Verifying, Phase::RollingBack)
                | (Phase::RollingBack, Phase::RolledBack)
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Checking => "checking",
            Phase::NoUpdate => "no-update",
            Phase::BackingUp => "backing-up",
            Phase::Applying => "applying",
            Phase::Verifying => "verifying",
            Phase::Committed => "committed",
            Phase::RollingBack => "rolling-back",
            Phase::RolledBack => "rolled-back",
            Phase::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Phase; 10] = [
        Phase::Idle,
        Phase::Checking,
        Phase::NoUpdate,
        Phase::BackingUp,
        Phase::Applying,
        Phase::Verifying,
        Phase::Committed,
        Phase::RollingBack,
        Phase::RolledBack,
        Phase::Failed,
    ];

    #[test]
    fn happy_path_is_allowed() {
        let path = [
            Phase::Idle,
            Phase::Checking,
            Phase::BackingUp,
            Phase::Applying,
            Phase::Verifying,
            Phase::Committed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_phases_are_final() {
        for from in ALL.iter().filter(|p| p.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn verifying_cannot_skip_to_rolled_back() {
        assert!(!Phase::Verifying.can_transition_to(Phase::RolledBack));
        assert!(!Phase::Checking.can_transition_to(Phase::Applying));
        assert!(!Phase::BackingUp.can_transition_to(Phase::RollingBack));
    }

    #[test]
    fn any_live_phase_can_fail() {
        for from in ALL.iter().filter(|p| !p.is_terminal()) {
            assert!(from.can_transition_to(Phase::Failed));
        }
    }
}
