use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use retimer_api::StatsBoard;
use retimer_capture::Producer;
use retimer_common::config::Config;
use retimer_common::gpu::RenderDevice;
use retimer_common::settings::SettingsStore;
use retimer_common::stats::RendererStats;
use retimer_renderer::{DisplaySurface, OffscreenSurface, RendererCoordinator};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

fn frame_interval(fps: u32) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(fps.max(1))));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        backend = config.capture.backend,
        capture_fps = config.capture.fps,
        display_width = config.display.width,
        display_height = config.display.height,
        frame_generation = config.render.frame_generation_enabled,
        "starting retimer"
    );

    let device = match RenderDevice::new(config.gpu.device_descriptor()) {
        Ok(device) => device,
        Err(e) => {
            error!(error = %e, "failed to create render device");
            std::process::exit(1);
        }
    };

    let producer = match Producer::from_config(&config.capture, &device) {
        Ok(producer) => producer,
        Err(e) => {
            error!(error = %e, "failed to create capture producer");
            std::process::exit(1);
        }
    };

    let surface = OffscreenSurface::new(&device, config.display.width, config.display.height);
    let settings = Arc::new(SettingsStore::new(config.render.clone()));

    let mut coordinator = match RendererCoordinator::new(
        &device,
        producer,
        surface,
        settings,
        config.capture.capture_configuration(),
        config.capture.target,
    ) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!(error = %e, "failed to build renderer");
            std::process::exit(1);
        }
    };

    let board = Arc::new(StatsBoard::new());
    coordinator.add_stats_observer(board.clone());
    coordinator.add_stats_observer(Arc::new(|stats: &RendererStats| {
        info!(
            source_fps = stats.source_fps,
            capture_fps = stats.capture_fps,
            present_fps = stats.present_fps,
            generated_fps = stats.generated_fps,
            input = ?stats.input_size,
            output = ?stats.output_size,
            scale = stats.effective_scale,
            "renderer stats"
        );
    }));

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let api_task = if config.api.enabled {
        let bind = config.api.bind.clone();
        let board = board.clone();
        let mut api_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            let shutdown = async move {
                let _ = api_shutdown.wait_for(|stop| *stop).await;
            };
            if let Err(e) = retimer_api::serve(&bind, board, shutdown).await {
                error!(error = %e, "stats API stopped");
            }
        }))
    } else {
        None
    };

    if let Err(e) = coordinator.start().await {
        error!(error = %e, "failed to start capture");
        std::process::exit(1);
    }
    board.set_running(true);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let mut fps = coordinator.surface().preferred_fps();
    let mut clock = frame_interval(fps);
    loop {
        tokio::select! {
            _ = clock.tick() => {
                tokio::task::block_in_place(|| coordinator.tick());
                let preferred = coordinator.surface().preferred_fps();
                if preferred != fps {
                    info!(fps = preferred, "display clock retimed");
                    fps = preferred;
                    clock = frame_interval(fps);
                }
                board.set_running(coordinator.is_running());
            }
            _ = shutdown_rx.wait_for(|stop| *stop) => break,
        }
    }

    coordinator.stop().await;
    board.set_running(false);
    if let Some(task) = api_task {
        let _ = task.await;
    }
    info!(
        presented = coordinator.surface().presented_count(),
        "retimer stopped"
    );
}
