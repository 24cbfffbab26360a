use thiserror::Error;

/// High-level phases a quiz session can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Lobby is open; players join and leave freely.
    Waiting,
    /// Rounds are being played.
    Active,
    /// Final leaderboard is known. Terminal.
    Finished(FinishReason),
}

/// Indicates why a session transitioned to its final leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Every round of the question set was played.
    RoundsConsumed,
    /// Every roster member finished or left before the last round.
    AllPlayersFinished,
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Lobby start condition held; the first round begins.
    Start,
    /// The current round closed and another one remains.
    NextRound,
    /// No round remains or nobody is left to play.
    Finish(FinishReason),
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: LifecycleEvent,
}

/// State machine guarding the `WAITING -> ACTIVE -> FINISHED` lifecycle of a session.
///
/// The version counter increments on each applied transition so snapshots can be
/// compared cheaply by clients.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    phase: SessionPhase,
    version: usize,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Waiting,
            version: 0,
        }
    }
}

impl SessionStateMachine {
    /// Create a new state machine initialised in the waiting state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Whether the machine reached its terminal phase.
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, SessionPhase::Finished(_))
    }

    /// Validate and apply `event`, returning the new phase.
    pub fn apply(&mut self, event: LifecycleEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(next)
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(
        &self,
        event: LifecycleEvent,
    ) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (SessionPhase::Waiting, LifecycleEvent::Start) => SessionPhase::Active,
            (SessionPhase::Active, LifecycleEvent::NextRound) => SessionPhase::Active,
            (SessionPhase::Active, LifecycleEvent::Finish(reason)) => {
                SessionPhase::Finished(reason)
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
