use crate::client::DetectionClient;
use crate::error::DetectionError;
use crate::stats::{RequestCounters, RequestStats};
use chrono::{DateTime, Utc};
use common::retry::{RetryPolicy, retry_with_fixed_delay};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use schema::wire::{
    DETECT_PATH, DetectRequest, DetectResponse, FINALIZE_PATH, FinalizeRequest, FinalizeResponse,
    HEALTH_PATH, OPEN_SESSION_PATH, OpenSessionRequest, OpenSessionResponse, ServiceReply,
};
use schema::{Analysis, CaptureFrame, DetectionResult, HealthStatus, format_timestamp};
use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::time::{Duration, Instant};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    OpenSession,
    Detect,
    Finalize,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Operation::OpenSession => "open_session",
            Operation::Detect => "detect",
            Operation::Finalize => "finalize",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Service root, e.g. `http://127.0.0.1:8000`. A trailing slash is ignored.
    pub base_url: String,
    /// Applies to every single send, retries included.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

struct RequestMetrics {
    requests: Counter<u64>,
    retries: Counter<u64>,
    duration: Histogram<f64>,
}

impl RequestMetrics {
    fn new() -> Self {
        let meter = global::meter("scanner");
        Self {
            requests: meter
                .u64_counter("scanner_requests_total")
                .with_description("Detection service operations by outcome")
                .build(),
            retries: meter
                .u64_counter("scanner_request_retries_total")
                .with_description("Extra sends made by the retry policy")
                .build(),
            duration: meter
                .f64_histogram("scanner_request_duration_seconds")
                .with_description("Wall time of an operation including retries")
                .with_unit("s")
                .build(),
        }
    }
}

/// JSON-over-HTTP client for the detection service.
pub struct HttpDetectionClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    counters: RequestCounters,
    metrics: RequestMetrics,
}

impl HttpDetectionClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, DetectionError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DetectionError::Transport(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(
            base_url = %config.base_url,
            timeout_ms = config.timeout.as_millis() as u64,
            max_retries = config.retry.max_retries,
            "Detection client configured"
        );

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry,
            counters: RequestCounters::default(),
            metrics: RequestMetrics::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Connectivity probe. Not retried and not counted.
    pub async fn health(&self) -> Result<HealthStatus, DetectionError> {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);
        let resp = self.http.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Count, time and log one logical operation.
    async fn tracked<T, F>(&self, operation: Operation, fut: F) -> Result<T, DetectionError>
    where
        F: Future<Output = Result<T, DetectionError>>,
    {
        let epoch = self.counters.record_attempt();
        let started = Instant::now();
        let result = fut.await;

        let outcome = match &result {
            Ok(_) => {
                self.counters.record_success(epoch);
                "success"
            }
            Err(e) => {
                self.counters.record_failure(epoch);
                tracing::warn!(operation = operation.as_str(), error = %e, "Detection service request failed");
                if e.is_transient() {
                    "transport_failure"
                } else {
                    "rejected"
                }
            }
        };

        let attrs = [
            KeyValue::new("operation", operation.as_str()),
            KeyValue::new("outcome", outcome),
        ];
        self.metrics.requests.add(1, &attrs);
        self.metrics
            .duration
            .record(started.elapsed().as_secs_f64(), &attrs[..1]);

        result
    }

    async fn post_json<Req, Resp>(
        &self,
        operation: Operation,
        path: &str,
        body: &Req,
    ) -> Result<Resp, DetectionError>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned + ServiceReply,
    {
        let url = format!("{}{}", self.base_url, path);
        let epoch = self.counters.epoch();
        let mut sends = 0u64;

        let result = retry_with_fixed_delay(
            || {
                sends += 1;
                self.send_once::<Req, Resp>(&url, body)
            },
            &self.retry,
            DetectionError::is_transient,
            operation.as_str(),
        )
        .await;

        let retries = sends.saturating_sub(1);
        if retries > 0 {
            self.counters.record_retries(epoch, retries);
            self.metrics.retries.add(
                retries,
                &[KeyValue::new("operation", operation.as_str())],
            );
        }

        result
    }

    async fn send_once<Req, Resp>(&self, url: &str, body: &Req) -> Result<Resp, DetectionError>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned + ServiceReply,
    {
        let resp = self.http.post(url).json(body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let bytes = resp.bytes().await?;
        let reply: Resp = serde_json::from_slice(&bytes)?;

        if !reply.success() {
            return Err(DetectionError::Rejected {
                status: Some(status.as_u16()),
                message: reply
                    .failure_reason()
                    .unwrap_or("service reported failure")
                    .to_string(),
            });
        }

        Ok(reply)
    }
}

/// Gateway-class statuses mean the service never saw the request properly;
/// anything else non-2xx is the service's verdict.
fn classify_status(status: reqwest::StatusCode, body: String) -> DetectionError {
    let code = status.as_u16();
    match code {
        502..=504 => DetectionError::Transport(format!("HTTP {status}")),
        _ => {
            let body = body.trim();
            DetectionError::Rejected {
                status: Some(code),
                message: if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    format!("HTTP {status}: {body}")
                },
            }
        }
    }
}

impl DetectionClient for HttpDetectionClient {
    async fn open_session(
        &self,
        user_id: &str,
        property_label: &str,
    ) -> Result<String, DetectionError> {
        self.counters.reset();

        let request = OpenSessionRequest {
            user_id,
            property_label,
        };

        self.tracked(Operation::OpenSession, async {
            let reply: OpenSessionResponse = self
                .post_json(Operation::OpenSession, OPEN_SESSION_PATH, &request)
                .await?;

            let session_id = reply
                .session_id
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| DetectionError::Rejected {
                    status: None,
                    message: "response carried no session_id".to_string(),
                })?;

            tracing::info!(%session_id, property_label, "Scan session opened");
            Ok(session_id)
        })
        .await
    }

    async fn detect(
        &self,
        frame: &CaptureFrame,
        session_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<DetectionResult, DetectionError> {
        let request = DetectRequest {
            image_base64: frame.to_base64(),
            session_id,
            timestamp: format_timestamp(timestamp),
        };

        self.tracked(Operation::Detect, async {
            let reply: DetectResponse = self
                .post_json(Operation::Detect, DETECT_PATH, &request)
                .await?;
            let result = DetectionResult::from(reply);

            tracing::debug!(
                sequence = frame.sequence,
                objects = result.total_objects,
                amenities = result.amenities.len(),
                room_type = result.room_type.as_deref().unwrap_or("-"),
                "Frame analysed"
            );
            Ok(result)
        })
        .await
    }

    async fn finalize(&self, session_id: &str) -> Result<Analysis, DetectionError> {
        let request = FinalizeRequest { session_id };

        self.tracked(Operation::Finalize, async {
            let reply: FinalizeResponse = self
                .post_json(Operation::Finalize, FINALIZE_PATH, &request)
                .await?;
            let analysis = reply.analysis.unwrap_or_default();

            tracing::info!(
                %session_id,
                property_type = %analysis.property_type,
                amenities = analysis.amenities.len(),
                quality_score = analysis.quality_score,
                "Scan session finalized"
            );
            Ok(analysis)
        })
        .await
    }

    fn stats(&self) -> RequestStats {
        self.counters.snapshot()
    }
}
