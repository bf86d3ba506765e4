use crate::state_machine::{InvalidTransition, SessionEvent, SessionState};
use detection::DetectionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Cannot {event} while session is {state}")]
    InvalidState {
        event: SessionEvent,
        state: SessionState,
    },

    #[error("Failed to open scan session: {0}")]
    Open(#[source] DetectionError),
}

impl From<InvalidTransition> for ControllerError {
    fn from(e: InvalidTransition) -> Self {
        Self::InvalidState {
            event: e.event,
            state: e.from,
        }
    }
}
