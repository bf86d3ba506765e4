use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
    Completed,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Stopping => "stopping",
            SessionState::Completed => "completed",
            SessionState::Error => "error",
        }
    }

    /// Only `reset()` leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    Opened,
    OpenFailed,
    Stop,
    Finalized,
    FinalizeFailed,
    Reset,
}

impl SessionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEvent::Start => "start",
            SessionEvent::Opened => "open",
            SessionEvent::OpenFailed => "fail open",
            SessionEvent::Stop => "stop",
            SessionEvent::Finalized => "finalize",
            SessionEvent::FinalizeFailed => "fail finalize",
            SessionEvent::Reset => "reset",
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {event} while session is {from}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub event: SessionEvent,
}

/// Session state plus the generation that identifies the current session
/// instance. Work tagged with an older generation is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    state: SessionState,
    generation: u64,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            generation: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while `generation` is the running session and it still accepts
    /// results. Stopping sessions accept none.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.state == SessionState::Active
    }

    /// Apply `event`, returning the new state. `Start` and `Reset` open a new
    /// generation.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionState, InvalidTransition> {
        use SessionEvent as E;
        use SessionState as S;

        let next = match (self.state, event) {
            (S::Idle, E::Start) => S::Starting,
            (S::Starting, E::Opened) => S::Active,
            (S::Starting, E::OpenFailed) => S::Error,
            (S::Active, E::Stop) => S::Stopping,
            (S::Stopping, E::Finalized) => S::Completed,
            (S::Stopping, E::FinalizeFailed) => S::Error,
            (S::Idle | S::Completed | S::Error, E::Reset) => S::Idle,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        if matches!(event, E::Start | E::Reset) {
            self.generation += 1;
        }

        tracing::debug!(from = %self.state, to = %next, %event, generation = self.generation, "Session transition");
        self.state = next;
        Ok(next)
    }
}
