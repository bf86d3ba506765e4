use anyhow::{Context, Result, bail};
use capture::{FrameEncoder, FrameSource, StillImageSource};
use common::{TelemetryGuard, setup_logging};
use controller::{
    Collaborators, FeedbackSink, OverlayFeedback, ScanReport, ScannerConfig, SessionController,
};
use detection::HttpDetectionClient;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    let config = ScannerConfig::from_env();

    let runtime = build_runtime()?;

    // The guard is created inside the runtime and dropped before it. Its
    // shutdown flushes through exporter tasks that must keep running after
    // `block_on` returns, which a current-thread runtime would not do.
    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(
            runtime.block_on(async { TelemetryGuard::init("scanner", endpoint, config.environment) })?,
        ),
        None => {
            setup_logging(config.environment);
            None
        }
    };

    tracing::info!(?config, "Scanner starting");

    let report = runtime.block_on(run(&config))?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_degraded() {
        bail!("Scan finished without a backend analysis");
    }
    Ok(())
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")
}

async fn run(config: &ScannerConfig) -> Result<ScanReport> {
    let encoder = FrameEncoder::new(config.jpeg_quality);

    if let Some(dir) = &config.image_dir {
        let source = StillImageSource::open(dir, encoder)
            .with_context(|| format!("Failed to open image directory {}", dir.display()))?;
        return scan(config, source).await;
    }

    #[cfg(feature = "v4l")]
    {
        let device_id = config.device_id;
        let source = tokio::task::spawn_blocking(move || {
            capture::V4lCameraSource::open(device_id, encoder)
        })
        .await?
        .context("Failed to open camera")?;
        return scan(config, source).await;
    }

    #[cfg(not(feature = "v4l"))]
    bail!("No capture source: set SCANNER_IMAGE_DIR or build with the `v4l` feature");
}

async fn scan<S: FrameSource>(config: &ScannerConfig, source: S) -> Result<ScanReport> {
    let client = HttpDetectionClient::new(config.client_config())?;

    match client.health().await {
        Ok(health) if health.is_healthy() => {
            tracing::info!(status = %health.status, "Detection service healthy")
        }
        Ok(health) => tracing::warn!(status = %health.status, "Detection service reports degraded health"),
        Err(e) => tracing::warn!(error = %e, "Detection service health probe failed"),
    }

    let feedback: Arc<dyn FeedbackSink> = Arc::new(OverlayFeedback::new(
        config.min_confidence,
        config.overlay_lifetime,
    ));

    let mut controller = SessionController::new(
        config.session_config(),
        Collaborators {
            source,
            client,
            feedback: Some(feedback),
        },
    );

    controller
        .start()
        .await
        .context("Failed to start scan session")?;

    wait_for_end(config.scan_duration).await;

    Ok(controller.stop().await?)
}

async fn wait_for_end(limit: Option<Duration>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    match limit {
        Some(limit) => tokio::select! {
            _ = ctrl_c => tracing::info!("Ctrl-C received"),
            _ = tokio::time::sleep(limit) => tracing::info!(secs = limit.as_secs(), "Scan duration reached"),
        },
        None => {
            ctrl_c.await;
            tracing::info!("Ctrl-C received");
        }
    }
}
