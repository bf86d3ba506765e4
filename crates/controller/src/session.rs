use crate::aggregation::{AmenitySet, SessionStats};
use crate::error::ControllerError;
use crate::feedback::FeedbackSink;
use crate::scheduler::TickScheduler;
use crate::state_machine::{Lifecycle, SessionEvent, SessionState};
use capture::FrameSource;
use detection::{DetectionClient, RequestStats};
use schema::Analysis;
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_CAPTURE_FAILURE_WARN_THRESHOLD: u32 = 5;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user_id: String,
    pub property_label: String,
    /// Pause between the end of one tick and the start of the next.
    pub capture_interval: Duration,
    /// Warn after this many capture failures in a row; 0 disables.
    pub capture_failure_warn_threshold: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_id: "spectacles_user".to_string(),
            property_label: "Property Scan".to_string(),
            capture_interval: DEFAULT_CAPTURE_INTERVAL,
            capture_failure_warn_threshold: DEFAULT_CAPTURE_FAILURE_WARN_THRESHOLD,
        }
    }
}

/// Everything the controller drives, handed over at construction.
pub struct Collaborators<S, D> {
    pub source: S,
    pub client: D,
    pub feedback: Option<Arc<dyn FeedbackSink>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    Completed(Analysis),
    /// Finalize failed; the report carries only what was aggregated locally.
    Degraded { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub session_id: String,
    pub outcome: ScanOutcome,
    pub amenities: AmenitySet,
    pub stats: SessionStats,
    pub requests: RequestStats,
    pub duration_secs: f64,
}

impl ScanReport {
    pub fn is_degraded(&self) -> bool {
        matches!(self.outcome, ScanOutcome::Degraded { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub session_id: Option<String>,
    pub amenities: AmenitySet,
    pub stats: SessionStats,
    pub capture_sequence: u64,
    pub elapsed_secs: f64,
}

#[derive(Default)]
struct SessionShared {
    lifecycle: Lifecycle,
    session_id: Option<String>,
    started_at: Option<Instant>,
    capture_sequence: u64,
    amenities: AmenitySet,
    stats: SessionStats,
}

impl SessionShared {
    fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }
}

fn lock(shared: &Mutex<SessionShared>) -> MutexGuard<'_, SessionShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives one scan session at a time: opens it remotely, runs the
/// capture → detect → merge loop and finalizes it on stop.
///
/// Aggregated state belongs to the controller. Ticks run on a spawned task
/// and only touch it while their generation is still the active session.
pub struct SessionController<S, D> {
    config: SessionConfig,
    source: Arc<tokio::sync::Mutex<S>>,
    client: Arc<D>,
    feedback: Option<Arc<dyn FeedbackSink>>,
    shared: Arc<Mutex<SessionShared>>,
    scheduler: TickScheduler,
}

impl<S, D> SessionController<S, D>
where
    S: FrameSource,
    D: DetectionClient,
{
    pub fn new(config: SessionConfig, collaborators: Collaborators<S, D>) -> Self {
        Self {
            config,
            source: Arc::new(tokio::sync::Mutex::new(collaborators.source)),
            client: Arc::new(collaborators.client),
            feedback: collaborators.feedback,
            shared: Arc::new(Mutex::new(SessionShared::default())),
            scheduler: TickScheduler::new(),
        }
    }

    /// Open a remote session and begin ticking. Returns the session token.
    ///
    /// Dropping the future before it resolves leaves the controller in
    /// `Error`, from which `reset()` recovers.
    pub async fn start(&mut self) -> Result<String, ControllerError> {
        let generation = {
            let mut shared = lock(&self.shared);
            shared.lifecycle.apply(SessionEvent::Start)?;
            shared.session_id = None;
            shared.started_at = Some(Instant::now());
            shared.capture_sequence = 0;
            shared.amenities.clear();
            shared.stats = SessionStats::default();
            shared.lifecycle.generation()
        };

        let guard = StartGuard {
            shared: &self.shared,
            generation,
            armed: true,
        };

        self.source.lock().await.reset_counter();

        let opened = self
            .client
            .open_session(&self.config.user_id, &self.config.property_label)
            .await;

        guard.disarm();
        let mut shared = lock(&self.shared);
        match opened {
            Ok(session_id) => {
                shared.lifecycle.apply(SessionEvent::Opened)?;
                shared.session_id = Some(session_id.clone());
                drop(shared);

                self.schedule_ticks(generation, session_id.clone());
                tracing::info!(
                    %session_id,
                    generation,
                    interval_ms = self.config.capture_interval.as_millis() as u64,
                    "Scan session active"
                );
                Ok(session_id)
            }
            Err(e) => {
                shared.lifecycle.apply(SessionEvent::OpenFailed)?;
                tracing::error!(error = %e, "Failed to open scan session");
                Err(ControllerError::Open(e))
            }
        }
    }

    /// Stop ticking and finalize. A detect still in flight is left to resolve
    /// on its own and its result is dropped.
    ///
    /// A failed finalize still returns a report, marked degraded and built
    /// from the local aggregate.
    pub async fn stop(&mut self) -> Result<ScanReport, ControllerError> {
        let session_id = {
            let mut shared = lock(&self.shared);
            shared.lifecycle.apply(SessionEvent::Stop)?;
            shared.session_id.clone().unwrap_or_default()
        };

        let cancelled = self.scheduler.cancel_pending();
        tracing::info!(%session_id, cancelled, "Stopping scan session");

        let finalized = self.client.finalize(&session_id).await;

        let mut shared = lock(&self.shared);
        let outcome = match finalized {
            Ok(analysis) => {
                shared.lifecycle.apply(SessionEvent::Finalized)?;
                ScanOutcome::Completed(analysis)
            }
            Err(e) => {
                shared.lifecycle.apply(SessionEvent::FinalizeFailed)?;
                tracing::warn!(%session_id, error = %e, "Finalize failed, reporting local results");
                ScanOutcome::Degraded {
                    reason: e.to_string(),
                }
            }
        };

        let report = ScanReport {
            session_id,
            outcome,
            amenities: shared.amenities.clone(),
            stats: shared.stats,
            requests: self.client.stats(),
            duration_secs: shared.elapsed().as_secs_f64(),
        };

        tracing::info!(
            session_id = %report.session_id,
            state = %shared.lifecycle.state(),
            amenities = report.amenities.len(),
            succeeded = report.stats.succeeded,
            failed = report.stats.failed,
            duration_secs = report.duration_secs,
            "Scan session ended"
        );

        Ok(report)
    }

    /// Return a finished (or never started) controller to `Idle`. The last
    /// session's amenities and stats stay readable until the next `start`.
    pub fn reset(&mut self) -> Result<(), ControllerError> {
        let mut shared = lock(&self.shared);
        shared.lifecycle.apply(SessionEvent::Reset)?;
        shared.session_id = None;
        shared.started_at = None;
        drop(shared);

        self.scheduler.cancel_pending();
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        lock(&self.shared).lifecycle.state()
    }

    pub fn status(&self) -> SessionStatus {
        let shared = lock(&self.shared);
        SessionStatus {
            state: shared.lifecycle.state(),
            session_id: shared.session_id.clone(),
            amenities: shared.amenities.clone(),
            stats: shared.stats,
            capture_sequence: shared.capture_sequence,
            elapsed_secs: shared.elapsed().as_secs_f64(),
        }
    }

    pub fn amenities(&self) -> AmenitySet {
        lock(&self.shared).amenities.clone()
    }

    pub fn stats(&self) -> SessionStats {
        lock(&self.shared).stats
    }

    pub fn request_stats(&self) -> RequestStats {
        self.client.stats()
    }

    fn schedule_ticks(&mut self, generation: u64, session_id: String) {
        let ctx = Arc::new(TickContext {
            generation,
            session_id,
            warn_threshold: self.config.capture_failure_warn_threshold,
            source: Arc::clone(&self.source),
            client: Arc::clone(&self.client),
            feedback: self.feedback.clone(),
            shared: Arc::clone(&self.shared),
        });

        self.scheduler
            .schedule_after(self.config.capture_interval, move || {
                let ctx = Arc::clone(&ctx);
                async move { ctx.tick().await }
            });
    }
}

/// Moves an abandoned `start()` from `Starting` to `Error`.
struct StartGuard<'a> {
    shared: &'a Mutex<SessionShared>,
    generation: u64,
    armed: bool,
}

impl StartGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut shared = lock(self.shared);
        if shared.lifecycle.generation() == self.generation
            && shared.lifecycle.state() == SessionState::Starting
            && shared.lifecycle.apply(SessionEvent::OpenFailed).is_ok()
        {
            tracing::warn!(generation = self.generation, "Session start abandoned");
        }
    }
}

/// What a tick needs, pinned to the session generation it was scheduled for.
struct TickContext<S, D> {
    generation: u64,
    session_id: String,
    warn_threshold: u32,
    source: Arc<tokio::sync::Mutex<S>>,
    client: Arc<D>,
    feedback: Option<Arc<dyn FeedbackSink>>,
    shared: Arc<Mutex<SessionShared>>,
}

impl<S, D> TickContext<S, D>
where
    S: FrameSource,
    D: DetectionClient,
{
    fn is_current(&self) -> bool {
        lock(&self.shared).lifecycle.is_current(self.generation)
    }

    async fn tick(&self) -> ControlFlow<()> {
        {
            let mut shared = lock(&self.shared);
            if !shared.lifecycle.is_current(self.generation) {
                return ControlFlow::Break(());
            }
            shared.capture_sequence += 1;
        }

        let captured = self.source.lock().await.capture().await;

        let frame = match captured {
            Ok(frame) => frame,
            Err(e) => {
                let mut shared = lock(&self.shared);
                if !shared.lifecycle.is_current(self.generation) {
                    return ControlFlow::Break(());
                }
                let streak = shared.stats.record_capture_failure();
                drop(shared);

                tracing::warn!(error = %e, streak, "Capture unavailable, skipping tick");
                if self.warn_threshold > 0 && streak % self.warn_threshold == 0 {
                    tracing::warn!(
                        streak,
                        "Capture keeps failing, check the camera or image directory"
                    );
                }
                return ControlFlow::Continue(());
            }
        };

        // Stop may have landed while the frame was being captured.
        if !self.is_current() {
            return ControlFlow::Break(());
        }

        let detected = self
            .client
            .detect(&frame, &self.session_id, frame.captured_at)
            .await;

        let mut shared = lock(&self.shared);
        if !shared.lifecycle.is_current(self.generation) {
            tracing::debug!(sequence = frame.sequence, "Discarding late detection result");
            return ControlFlow::Break(());
        }

        match detected {
            Ok(result) => {
                let added = shared.amenities.merge(result.amenities.iter().cloned());
                shared.stats.record_success();
                let snapshot = shared.amenities.clone();
                drop(shared);

                tracing::info!(
                    sequence = frame.sequence,
                    objects = result.total_objects,
                    room_type = result.room_type.as_deref().unwrap_or("-"),
                    new_amenities = added,
                    total_amenities = snapshot.len(),
                    "Detection merged"
                );

                if let Some(feedback) = &self.feedback {
                    feedback.on_detection(&result, &snapshot);
                }
            }
            Err(e) => {
                shared.stats.record_request_failure();
                drop(shared);
                tracing::warn!(sequence = frame.sequence, error = %e, "Detection failed, skipping tick");
            }
        }

        ControlFlow::Continue(())
    }
}
