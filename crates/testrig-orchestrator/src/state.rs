use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use testrig_common::{Error, PhaseName, Result};

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "value")]
pub enum OrchestratorState {
    Idle,
    SettingUp,
    RunningPhase(PhaseName),
    Aggregating,
    CleaningUp,
    /// Terminal; carries the run's overall success.
    Done(bool),
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorState::Idle => write!(f, "idle"),
            OrchestratorState::SettingUp => write!(f, "setting_up"),
            OrchestratorState::RunningPhase(phase) => write!(f, "running_phase({})", phase),
            OrchestratorState::Aggregating => write!(f, "aggregating"),
            OrchestratorState::CleaningUp => write!(f, "cleaning_up"),
            OrchestratorState::Done(success) => write!(f, "done({})", success),
        }
    }
}

impl OrchestratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrchestratorState::Done(_))
    }
}

/// A recorded state transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: OrchestratorState,
    pub to_state: OrchestratorState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Forward-only state machine for one orchestration run.
///
/// Phases advance in their fixed order and may be skipped but never
/// revisited. `CleaningUp` is reachable from every non-terminal state and
/// is entered at most once.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current_state: OrchestratorState,
    state_history: Vec<StateTransition>,
    cleaned_up: bool,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current_state: OrchestratorState::Idle,
            state_history: Vec::new(),
            cleaned_up: false,
        }
    }

    pub fn current_state(&self) -> OrchestratorState {
        self.current_state
    }

    pub fn state_history(&self) -> &[StateTransition] {
        &self.state_history
    }

    /// Every state visited so far, starting with `Idle`.
    pub fn visited(&self) -> Vec<OrchestratorState> {
        std::iter::once(OrchestratorState::Idle)
            .chain(self.state_history.iter().map(|t| t.to_state))
            .collect()
    }

    pub fn has_visited(&self, state: OrchestratorState) -> bool {
        self.visited().contains(&state)
    }

    /// Check if a transition from the current state to `target` is valid
    pub fn is_valid_transition(&self, target: OrchestratorState) -> bool {
        use OrchestratorState::*;

        match (self.current_state, target) {
            (Idle, SettingUp) => true,

            (SettingUp, RunningPhase(_)) => true,
            (SettingUp, Aggregating) => true,

            // Strictly forward through the phase order
            (RunningPhase(from), RunningPhase(to)) => to > from,
            (RunningPhase(_), Aggregating) => true,

            (CleaningUp, Done(_)) => true,

            // Reachable from anywhere, exactly once
            (from, CleaningUp) => !from.is_terminal() && !self.cleaned_up,

            _ => false,
        }
    }

    /// Transition to a new state with optional reason
    pub fn transition_to(&mut self, target: OrchestratorState, reason: Option<String>) -> Result<()> {
        if !self.is_valid_transition(target) {
            return Err(Error::Internal(format!(
                "Invalid orchestrator transition from {} to {}",
                self.current_state, target
            )));
        }

        let from = self.current_state;
        self.state_history.push(StateTransition {
            from_state: from,
            to_state: target,
            timestamp: Utc::now(),
            reason,
        });
        self.current_state = target;
        if target == OrchestratorState::CleaningUp {
            self.cleaned_up = true;
        }

        tracing::debug!("Orchestrator transitioned from {} to {}", from, target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrchestratorState::*;

    #[test]
    fn test_full_forward_path() {
        let mut sm = StateMachine::new();
        sm.transition_to(SettingUp, None).unwrap();
        for phase in PhaseName::ALL {
            sm.transition_to(RunningPhase(phase), None).unwrap();
        }
        sm.transition_to(Aggregating, None).unwrap();
        sm.transition_to(CleaningUp, None).unwrap();
        sm.transition_to(Done(true), None).unwrap();

        assert_eq!(sm.visited().len(), 9);
        assert!(sm.current_state().is_terminal());
    }

    #[test]
    fn test_phases_only_move_forward() {
        let mut sm = StateMachine::new();
        sm.transition_to(SettingUp, None).unwrap();
        sm.transition_to(RunningPhase(PhaseName::Unit), None).unwrap();
        // Skipping ahead is fine
        sm.transition_to(RunningPhase(PhaseName::Load), None).unwrap();
        assert!(sm
            .transition_to(RunningPhase(PhaseName::Benchmark), None)
            .is_err());
        assert!(!sm.is_valid_transition(RunningPhase(PhaseName::Load)));
        assert!(!sm.is_valid_transition(SettingUp));
    }

    #[test]
    fn test_cleanup_reachable_from_any_state_once() {
        for prelude in [
            vec![],
            vec![SettingUp],
            vec![SettingUp, RunningPhase(PhaseName::Integration)],
            vec![SettingUp, Aggregating],
        ] {
            let mut sm = StateMachine::new();
            for state in prelude {
                sm.transition_to(state, None).unwrap();
            }
            sm.transition_to(CleaningUp, Some("interrupted".to_string()))
                .unwrap();
            assert!(!sm.is_valid_transition(CleaningUp));
            sm.transition_to(Done(false), None).unwrap();
            assert!(!sm.is_valid_transition(CleaningUp));
        }
    }

    #[test]
    fn test_setup_failure_path() {
        let mut sm = StateMachine::new();
        sm.transition_to(SettingUp, None).unwrap();
        sm.transition_to(CleaningUp, Some("dependent service not ready".to_string()))
            .unwrap();
        sm.transition_to(Done(false), None).unwrap();

        assert_eq!(sm.visited(), vec![Idle, SettingUp, CleaningUp, Done(false)]);
        assert!(!sm.has_visited(RunningPhase(PhaseName::Unit)));
        assert_eq!(
            sm.state_history()[1].reason.as_deref(),
            Some("dependent service not ready")
        );
    }

    #[test]
    fn test_done_requires_cleanup() {
        let mut sm = StateMachine::new();
        sm.transition_to(SettingUp, None).unwrap();
        assert!(sm.transition_to(Done(true), None).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(RunningPhase(PhaseName::Benchmark).to_string(), "running_phase(benchmark)");
        assert_eq!(Done(false).to_string(), "done(false)");
    }
}
