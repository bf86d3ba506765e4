pub mod config;
pub mod logging;
pub mod retry;
pub mod telemetry;

pub use config::{Environment, env_opt, env_or};
pub use logging::setup_logging;
pub use retry::RetryPolicy;
pub use telemetry::TelemetryGuard;
