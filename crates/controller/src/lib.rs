pub mod aggregation;
pub mod config;
pub mod error;
pub mod feedback;
pub mod scheduler;
pub mod session;
pub mod state_machine;

pub use aggregation::{AmenitySet, SessionStats};
pub use config::ScannerConfig;
pub use error::ControllerError;
pub use feedback::{BroadcastFeedback, FeedbackEvent, FeedbackSink, OverlayFeedback};
pub use scheduler::TickScheduler;
pub use session::{
    Collaborators, ScanOutcome, ScanReport, SessionConfig, SessionController, SessionStatus,
};
pub use state_machine::{Lifecycle, SessionEvent, SessionState};
