use capture::{AttemptCounter, CaptureError, FrameSource};
use chrono::{DateTime, Utc};
use controller::{
    AmenitySet, BroadcastFeedback, Collaborators, ControllerError, FeedbackSink, ScanOutcome,
    SessionConfig, SessionController, SessionEvent, SessionState,
};
use detection::{DetectionClient, DetectionError, RequestStats};
use schema::{Analysis, CaptureFrame, DetectionResult, Rooms};
use std::collections::{BTreeSet, VecDeque};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU32, Ordering},
};
use std::time::Duration;

// ========== Fakes ==========

#[derive(Clone, Default)]
struct Probe {
    opens: Arc<AtomicU32>,
    detects: Arc<AtomicU32>,
    finalizes: Arc<AtomicU32>,
    in_flight: Arc<AtomicU32>,
    max_in_flight: Arc<AtomicU32>,
    capture_fails: Arc<AtomicBool>,
}

impl Probe {
    fn detects(&self) -> u32 {
        self.detects.load(Ordering::SeqCst)
    }

    fn finalizes(&self) -> u32 {
        self.finalizes.load(Ordering::SeqCst)
    }
}

struct FakeSource {
    probe: Probe,
    counter: AttemptCounter,
    latency: Duration,
}

impl FrameSource for FakeSource {
    async fn capture(&mut self) -> Result<CaptureFrame, CaptureError> {
        let sequence = self.counter.next();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.probe.capture_fails.load(Ordering::SeqCst) {
            return Err(CaptureError::DeviceNotReady("lens covered".into()));
        }
        Ok(CaptureFrame {
            sequence,
            captured_at: Utc::now(),
            width: 1,
            height: 1,
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
        })
    }

    fn attempts(&self) -> u64 {
        self.counter.get()
    }

    fn reset_counter(&mut self) {
        self.counter.reset();
    }
}

type DetectStep = Result<Vec<&'static str>, DetectionError>;

struct FakeClient {
    probe: Probe,
    latency: Duration,
    open_latency: Duration,
    script: Mutex<VecDeque<DetectStep>>,
    fail_open: bool,
    fail_finalize: bool,
    /// Everything detect ever returned, stale responses included.
    served: Mutex<BTreeSet<String>>,
}

impl FakeClient {
    fn new(probe: &Probe) -> Self {
        Self {
            probe: probe.clone(),
            latency: Duration::from_millis(100),
            open_latency: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            fail_open: false,
            fail_finalize: false,
            served: Mutex::new(BTreeSet::new()),
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn with_script(self, steps: Vec<DetectStep>) -> Self {
        *self.script.lock().unwrap() = steps.into();
        self
    }
}

impl DetectionClient for FakeClient {
    async fn open_session(&self, _user_id: &str, _label: &str) -> Result<String, DetectionError> {
        let n = self.probe.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.open_latency.is_zero() {
            tokio::time::sleep(self.open_latency).await;
        }
        if self.fail_open {
            return Err(DetectionError::Transport("connection refused".into()));
        }
        Ok(format!("sess-{n}"))
    }

    async fn detect(
        &self,
        _frame: &CaptureFrame,
        _session_id: &str,
        _timestamp: DateTime<Utc>,
    ) -> Result<DetectionResult, DetectionError> {
        self.probe.detects.fetch_add(1, Ordering::SeqCst);
        let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;

        self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()));

        let labels = step?;
        self.served
            .lock()
            .unwrap()
            .extend(labels.iter().map(|l| l.to_string()));

        Ok(DetectionResult {
            amenities: labels.iter().map(|l| l.to_string()).collect(),
            total_objects: labels.len() as u32,
            ..DetectionResult::default()
        })
    }

    async fn finalize(&self, _session_id: &str) -> Result<Analysis, DetectionError> {
        self.probe.finalizes.fetch_add(1, Ordering::SeqCst);
        if self.fail_finalize {
            return Err(DetectionError::Timeout);
        }

        let mut amenities: Vec<String> = self.served.lock().unwrap().iter().cloned().collect();
        amenities.push("balcony".to_string());
        Ok(Analysis {
            property_type: "apartment".into(),
            rooms: Rooms {
                bedrooms: 1,
                bathrooms: 1.0,
            },
            amenities,
            quality_score: 7.5,
        })
    }

    fn stats(&self) -> RequestStats {
        RequestStats::default()
    }
}

fn config() -> SessionConfig {
    SessionConfig {
        capture_interval: Duration::from_secs(2),
        ..SessionConfig::default()
    }
}

fn controller(
    probe: &Probe,
    client: FakeClient,
    feedback: Option<Arc<dyn FeedbackSink>>,
) -> SessionController<FakeSource, FakeClient> {
    slow_capture_controller(probe, client, feedback, Duration::ZERO)
}

fn slow_capture_controller(
    probe: &Probe,
    client: FakeClient,
    feedback: Option<Arc<dyn FeedbackSink>>,
    capture_latency: Duration,
) -> SessionController<FakeSource, FakeClient> {
    SessionController::new(
        config(),
        Collaborators {
            source: FakeSource {
                probe: probe.clone(),
                counter: AttemptCounter::default(),
                latency: capture_latency,
            },
            client,
            feedback,
        },
    )
}

fn set(labels: &[&str]) -> AmenitySet {
    labels.iter().copied().collect()
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ========== End to end ==========

#[tokio::test(start_paused = true)]
async fn test_amenities_accumulate_across_ticks() {
    let probe = Probe::default();
    let client = FakeClient::new(&probe).with_script(vec![
        Ok(vec!["tv"]),
        Ok(vec!["tv", "sofa"]),
        Ok(vec!["sofa", "bed"]),
    ]);
    let mut ctl = controller(&probe, client, None);

    let session_id = ctl.start().await.unwrap();
    assert_eq!(session_id, "sess-1");
    assert_eq!(ctl.state(), SessionState::Active);

    // Ticks fire at 2.0s, 4.1s and 6.2s (interval restarts after each 100ms detect).
    sleep_ms(2500).await;
    let first = ctl.amenities();
    assert_eq!(first, set(&["tv"]));

    sleep_ms(2000).await;
    let second = ctl.amenities();
    assert_eq!(second, set(&["tv", "sofa"]));
    assert!(second.is_superset_of(&first));

    sleep_ms(2000).await;
    let third = ctl.amenities();
    assert_eq!(third, set(&["tv", "sofa", "bed"]));
    assert!(third.is_superset_of(&second));

    let status = ctl.status();
    assert_eq!(status.capture_sequence, 3);
    assert_eq!(status.session_id.as_deref(), Some("sess-1"));

    let report = ctl.stop().await.unwrap();
    assert_eq!(ctl.state(), SessionState::Completed);
    assert_eq!(report.session_id, "sess-1");
    assert_eq!(report.stats.succeeded, 3);
    assert_eq!(report.stats.attempted, 3);
    assert_eq!(report.amenities, third);

    match &report.outcome {
        ScanOutcome::Completed(analysis) => {
            let remote: AmenitySet = analysis.amenities.iter().cloned().collect();
            assert!(remote.is_superset_of(&report.amenities));
        }
        other => panic!("Expected a completed scan, got {other:?}"),
    }

    sleep_ms(10_000).await;
    assert_eq!(probe.detects(), 3, "No ticks after stop");
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_first_tick() {
    let probe = Probe::default();
    let mut ctl = controller(&probe, FakeClient::new(&probe), None);

    ctl.start().await.unwrap();
    sleep_ms(1000).await;
    let report = ctl.stop().await.unwrap();

    sleep_ms(10_000).await;
    assert_eq!(probe.detects(), 0);
    assert_eq!(probe.finalizes(), 1);
    assert!(report.amenities.is_empty());
    assert!(!report.is_degraded());
}

// ========== Failure handling ==========

#[tokio::test(start_paused = true)]
async fn test_detect_failure_only_counts() {
    let probe = Probe::default();
    let client = FakeClient::new(&probe).with_script(vec![
        Ok(vec!["tv"]),
        Err(DetectionError::Transport("reset by peer".into())),
        Err(DetectionError::Rejected {
            status: Some(400),
            message: "blurry".into(),
        }),
        Ok(vec!["sofa"]),
    ]);
    let mut ctl = controller(&probe, client, None);
    ctl.start().await.unwrap();

    sleep_ms(2500).await;
    assert_eq!(ctl.amenities(), set(&["tv"]));

    sleep_ms(4200).await;
    let stats = ctl.stats();
    assert_eq!(ctl.amenities(), set(&["tv"]), "Failures merge nothing");
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.capture_failures, 0);
    assert_eq!(ctl.state(), SessionState::Active);

    sleep_ms(2100).await;
    assert_eq!(ctl.amenities(), set(&["tv", "sofa"]));
}

#[tokio::test(start_paused = true)]
async fn test_capture_failures_skip_ticks() {
    let probe = Probe::default();
    probe.capture_fails.store(true, Ordering::SeqCst);
    let mut ctl = controller(&probe, FakeClient::new(&probe), None);
    ctl.start().await.unwrap();

    // Ticks at 2s, 4s and 6s all fail to capture.
    sleep_ms(7000).await;
    let stats = ctl.stats();
    assert_eq!(probe.detects(), 0);
    assert_eq!(stats.capture_failures, 3);
    assert_eq!(stats.failed, 3);
    assert_eq!(stats.consecutive_capture_failures, 3);
    assert_eq!(ctl.state(), SessionState::Active, "Never aborts on capture failure");

    probe.capture_fails.store(false, Ordering::SeqCst);
    sleep_ms(1500).await;
    let stats = ctl.stats();
    assert_eq!(probe.detects(), 1);
    assert_eq!(stats.consecutive_capture_failures, 0);
    assert_eq!(stats.attempted, stats.succeeded + stats.failed);
}

#[tokio::test(start_paused = true)]
async fn test_degraded_finalize_keeps_local_results() {
    let probe = Probe::default();
    let mut client = FakeClient::new(&probe).with_script(vec![Ok(vec!["tv", "oven"])]);
    client.fail_finalize = true;
    let mut ctl = controller(&probe, client, None);

    ctl.start().await.unwrap();
    sleep_ms(2500).await;

    let report = ctl.stop().await.unwrap();
    assert!(report.is_degraded());
    assert_eq!(report.amenities, set(&["oven", "tv"]));
    assert_eq!(ctl.state(), SessionState::Error);

    assert_eq!(ctl.amenities(), set(&["oven", "tv"]));
    assert_eq!(ctl.stats().succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_start_can_be_reset() {
    let probe = Probe::default();
    let mut client = FakeClient::new(&probe);
    client.open_latency = Duration::from_secs(30);
    let mut ctl = controller(&probe, client, None);

    let abandoned = tokio::time::timeout(Duration::from_secs(1), ctl.start()).await;
    assert!(abandoned.is_err());
    assert_eq!(ctl.state(), SessionState::Error);

    ctl.reset().unwrap();
    assert_eq!(ctl.state(), SessionState::Idle);

    sleep_ms(10_000).await;
    assert_eq!(probe.detects(), 0, "An abandoned start schedules nothing");
}

#[tokio::test(start_paused = true)]
async fn test_open_failure_schedules_nothing() {
    let probe = Probe::default();
    let mut client = FakeClient::new(&probe);
    client.fail_open = true;
    let mut ctl = controller(&probe, client, None);

    let err = ctl.start().await.unwrap_err();
    assert!(matches!(err, ControllerError::Open(_)));
    assert_eq!(ctl.state(), SessionState::Error);

    sleep_ms(10_000).await;
    assert_eq!(probe.detects(), 0);

    ctl.reset().unwrap();
    assert_eq!(ctl.state(), SessionState::Idle);
}

// ========== Concurrency ==========

#[tokio::test(start_paused = true)]
async fn test_late_response_is_discarded() {
    let probe = Probe::default();
    let client = FakeClient::new(&probe)
        .with_latency(Duration::from_secs(5))
        .with_script(vec![Ok(vec!["ghost"])]);
    let mut ctl = controller(&probe, client, None);

    ctl.start().await.unwrap();
    // Detect is in flight from 2s to 7s.
    sleep_ms(3000).await;
    assert_eq!(probe.detects(), 1);

    let report = ctl.stop().await.unwrap();
    assert!(report.amenities.is_empty());
    assert_eq!(report.stats.attempted, 0);

    sleep_ms(10_000).await;
    assert!(ctl.amenities().is_empty());
    assert_eq!(ctl.stats().attempted, 0);
    assert_eq!(probe.detects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_capture_finishing_after_stop_is_not_detected() {
    let probe = Probe::default();
    let client = FakeClient::new(&probe).with_script(vec![Ok(vec!["tv"])]);
    let mut ctl = slow_capture_controller(&probe, client, None, Duration::from_secs(3));
    ctl.start().await.unwrap();

    // First tick starts capturing at 2s and holds the frame until 5s.
    sleep_ms(2500).await;
    assert_eq!(ctl.status().capture_sequence, 1);
    let report = ctl.stop().await.unwrap();

    sleep_ms(10_000).await;
    assert_eq!(probe.detects(), 0, "A frame captured after stop is never sent");
    assert_eq!(probe.finalizes(), 1);
    assert!(report.amenities.is_empty());
    assert_eq!(ctl.stats().attempted, 0);
    assert_eq!(ctl.status().capture_sequence, 1);
    assert_eq!(ctl.state(), SessionState::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_never_two_requests_in_flight() {
    let probe = Probe::default();
    let client = FakeClient::new(&probe).with_latency(Duration::from_secs(5));
    let mut ctl = controller(&probe, client, None);

    ctl.start().await.unwrap();
    // Detects start at 2s, 9s, 16s and 23s.
    sleep_ms(29_000).await;

    assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(probe.detects(), 4);
    ctl.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stale_session_cannot_touch_new_one() {
    let probe = Probe::default();
    let client = FakeClient::new(&probe)
        .with_latency(Duration::from_secs(5))
        .with_script(vec![Ok(vec!["ghost"]), Ok(vec!["tv"])]);
    let mut ctl = controller(&probe, client, None);

    ctl.start().await.unwrap();
    sleep_ms(3000).await;
    ctl.stop().await.unwrap();
    ctl.reset().unwrap();

    let second = ctl.start().await.unwrap();
    assert_eq!(second, "sess-2");

    // First session's detect resolves at 7s; the second session's runs 5s..10s.
    sleep_ms(5000).await;
    assert!(ctl.amenities().is_empty());
    assert_eq!(ctl.stats().attempted, 0);

    sleep_ms(3000).await;
    assert_eq!(ctl.amenities(), set(&["tv"]));
    assert_eq!(ctl.stats().succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_controller_cancels_ticks() {
    let probe = Probe::default();
    let mut ctl = controller(&probe, FakeClient::new(&probe), None);
    ctl.start().await.unwrap();
    drop(ctl);

    sleep_ms(10_000).await;
    assert_eq!(probe.detects(), 0);
}

// ========== State errors ==========

#[tokio::test(start_paused = true)]
async fn test_operations_outside_their_state_are_rejected() {
    let probe = Probe::default();
    let mut ctl = controller(&probe, FakeClient::new(&probe), None);

    let err = ctl.stop().await.unwrap_err();
    assert!(matches!(
        err,
        ControllerError::InvalidState {
            event: SessionEvent::Stop,
            state: SessionState::Idle
        }
    ));

    ctl.start().await.unwrap();
    assert!(matches!(
        ctl.start().await.unwrap_err(),
        ControllerError::InvalidState {
            event: SessionEvent::Start,
            state: SessionState::Active
        }
    ));
    assert!(ctl.reset().is_err(), "Reset mid-session");

    ctl.stop().await.unwrap();
    assert!(ctl.stop().await.is_err(), "Stop twice");
    assert!(ctl.start().await.is_err(), "Start needs reset first");
    assert_eq!(probe.opens.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_keeps_results_until_next_start() {
    let probe = Probe::default();
    let client = FakeClient::new(&probe).with_script(vec![Ok(vec!["tv"])]);
    let mut ctl = controller(&probe, client, None);

    ctl.start().await.unwrap();
    sleep_ms(2500).await;
    ctl.stop().await.unwrap();
    ctl.reset().unwrap();

    let status = ctl.status();
    assert_eq!(status.state, SessionState::Idle);
    assert!(status.session_id.is_none());
    assert_eq!(status.amenities, set(&["tv"]));

    ctl.start().await.unwrap();
    assert!(ctl.amenities().is_empty(), "Start clears the previous session");
    assert_eq!(ctl.stats().attempted, 0);
}

// ========== Feedback ==========

#[tokio::test(start_paused = true)]
async fn test_feedback_sees_each_merge() {
    let probe = Probe::default();
    let feedback = Arc::new(BroadcastFeedback::new(8));
    let mut rx = feedback.subscribe();

    let client = FakeClient::new(&probe).with_script(vec![Ok(vec!["tv"]), Ok(vec!["sofa"])]);
    let mut ctl = controller(&probe, client, Some(feedback));
    ctl.start().await.unwrap();

    sleep_ms(4500).await;

    let first = rx.try_recv().unwrap();
    assert_eq!(first.amenities, set(&["tv"]));
    let second = rx.try_recv().unwrap();
    assert_eq!(second.amenities, set(&["sofa", "tv"]));
    assert!(second.result.amenities.contains("sofa"));

    ctl.stop().await.unwrap();
}
