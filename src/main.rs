use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod analytics;
mod api;
mod camera;
mod config;
mod registry;
mod storage;

use analytics::{DetectionAdapter, HazardKind, InferenceScheduler, OrtDetector, SchedulerSettings};
use api::AppState;
use camera::{spawn_capture, CameraFeed, OpenCvBackend};
use config::Config;
use registry::{CameraHandle, CameraRegistry};
use storage::SnapshotWriter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("firewatch=debug".parse()?))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    tracing::info!("loaded {} camera(s)", config.cameras.len());

    let shutdown = Arc::new(AtomicBool::new(false));
    let settings = SchedulerSettings::from_config(&config);
    let snapshots = config
        .snapshots
        .enabled
        .then(|| SnapshotWriter::new(config.snapshots.dir.clone()));

    let mut handles = Vec::new();
    let mut capture_tasks = Vec::new();

    for cam_config in &config.cameras {
        let feed = CameraFeed::new(cam_config.id.clone());

        let detector = OrtDetector::new(
            &config.inference.model_path,
            config.inference.min_detection_confidence,
            config.inference.classes.clone(),
            config.inference.intra_threads,
        )?;
        let adapter = DetectionAdapter::new(Box::new(detector), &config.inference);
        let scheduler =
            InferenceScheduler::new(Arc::clone(&feed), adapter, &settings, snapshots.clone());

        tracing::info!(camera = %cam_config.id, source = %cam_config.source, "camera registered");
        let backend = OpenCvBackend::new(cam_config.source.clone(), &config.capture);
        capture_tasks.push((
            cam_config.id.clone(),
            spawn_capture(
                Arc::clone(&feed),
                backend,
                config.capture.reopen_delay(),
                Arc::clone(&shutdown),
            ),
        ));

        handles.push(CameraHandle { feed, scheduler });
    }

    let registry = CameraRegistry::new(handles);
    tracing::info!(cameras = registry.len(), "inference ready");

    let stats_registry = registry.clone();
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            for handle in stats_registry.iter() {
                let status = handle.scheduler.status();
                let history = handle.scheduler.history();
                let (frame_age, resolution) = match handle.feed.snapshot() {
                    Some(latest) => (
                        format!("{:.1}s", latest.captured_at.elapsed().as_secs_f32()),
                        format!("{}x{}", latest.frame.width(), latest.frame.height()),
                    ),
                    None => ("never".to_string(), "-".to_string()),
                };
                tracing::info!(
                    camera = %handle.feed.camera_id(),
                    failures = handle.feed.failure_count(),
                    frame_age = %frame_age,
                    resolution = %resolution,
                    status = ?status.summary.status,
                    fire_events = history.store(HazardKind::Fire).len(),
                    spark_events = history.store(HazardKind::Spark).len(),
                    "camera stats"
                );
            }
        }
    });

    let state = AppState::new(registry, config.stream.clone());

    tokio::select! {
        result = api::start_server(state, config.http.port) => {
            if let Err(e) = result {
                tracing::error!("HTTP server failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    shutdown.store(true, Ordering::Relaxed);
    stats_handle.abort();

    for (camera_id, task) in capture_tasks {
        if let Err(e) = task.await {
            tracing::error!(camera = %camera_id, "capture task failed: {}", e);
        }
    }

    tracing::info!("shutdown complete");

    Ok(())
}
