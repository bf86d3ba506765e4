use crate::feedback::{DEFAULT_MIN_CONFIDENCE, DEFAULT_OVERLAY_LIFETIME};
use crate::session::{DEFAULT_CAPTURE_FAILURE_WARN_THRESHOLD, DEFAULT_CAPTURE_INTERVAL, SessionConfig};
use capture::DEFAULT_JPEG_QUALITY;
use common::{Environment, RetryPolicy, env_opt, env_or};
use detection::{DEFAULT_REQUEST_TIMEOUT, HttpClientConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub environment: Environment,
    pub backend_url: String,
    pub user_id: String,
    pub property_label: String,
    pub capture_interval: Duration,
    pub jpeg_quality: u8,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub min_confidence: f32,
    pub overlay_lifetime: Duration,
    pub capture_failure_warn_threshold: u32,
    /// None runs until Ctrl-C.
    pub scan_duration: Option<Duration>,
    pub image_dir: Option<PathBuf>,
    pub device_id: u32,
    pub otel_endpoint: Option<String>,
}

fn millis(key: &str, default: Duration) -> Duration {
    Duration::from_millis(env_or(key, default.as_millis() as u64))
}

impl ScannerConfig {
    pub fn from_env() -> Self {
        let retry = RetryPolicy::default();

        Self {
            environment: Environment::from_env(),
            backend_url: env_or("SCANNER_BACKEND_URL", "http://127.0.0.1:8000".to_string()),
            user_id: env_or("SCANNER_USER_ID", "spectacles_user".to_string()),
            property_label: env_or("SCANNER_PROPERTY_LABEL", "Property Scan".to_string()),
            capture_interval: millis("SCANNER_CAPTURE_INTERVAL_MS", DEFAULT_CAPTURE_INTERVAL),
            jpeg_quality: env_or("SCANNER_JPEG_QUALITY", DEFAULT_JPEG_QUALITY),
            request_timeout: millis("SCANNER_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT),
            max_retries: env_or("SCANNER_MAX_RETRIES", retry.max_retries),
            retry_delay: millis("SCANNER_RETRY_DELAY_MS", retry.delay),
            min_confidence: env_or("SCANNER_MIN_CONFIDENCE", DEFAULT_MIN_CONFIDENCE),
            overlay_lifetime: millis("SCANNER_OVERLAY_LIFETIME_MS", DEFAULT_OVERLAY_LIFETIME),
            capture_failure_warn_threshold: env_or(
                "SCANNER_CAPTURE_FAILURE_WARN_THRESHOLD",
                DEFAULT_CAPTURE_FAILURE_WARN_THRESHOLD,
            ),
            scan_duration: env_opt("SCANNER_SCAN_DURATION_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs),
            image_dir: env_opt("SCANNER_IMAGE_DIR").map(PathBuf::from),
            device_id: env_or("SCANNER_DEVICE_ID", 0),
            otel_endpoint: env_opt("OTEL_EXPORTER_OTLP_ENDPOINT"),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            user_id: self.user_id.clone(),
            property_label: self.property_label.clone(),
            capture_interval: self.capture_interval,
            capture_failure_warn_threshold: self.capture_failure_warn_threshold,
        }
    }

    pub fn client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            base_url: self.backend_url.clone(),
            timeout: self.request_timeout,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                delay: self.retry_delay,
            },
        }
    }
}
