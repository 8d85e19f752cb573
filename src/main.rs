//! Port graph monitor demo
//!
//! Runs the monitor against a simulated detector, rewires a couple of
//! plugins, logs the resulting change reports and prints the final layout as
//! JSON on stdout.
//!
//! Usage: `portvis-rs [CONFIG.toml]`

use anyhow::Context;
use portvis_rs::{
    config::{AppConfig, LoggingConfig},
    monitor::{MonitorBackend, MonitorMessage},
    source::MockPortSource,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// How long to wait for the worker to settle after each change
const SETTLE_TIMEOUT: Duration = Duration::from_millis(500);

fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "portvis.log".to_string());
            let appender = tracing_appender::rolling::daily(
                dir.map(|d| d.to_path_buf()).unwrap_or_else(|| ".".into()),
                name,
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn load_config() -> anyhow::Result<AppConfig> {
    match std::env::args_os().nth(1) {
        Some(path) => AppConfig::load(&path)
            .with_context(|| format!("loading config from {}", path.to_string_lossy())),
        None => Ok(AppConfig::load_or_default(AppConfig::default_config_path())),
    }
}

/// Log messages until the worker has been quiet for [`SETTLE_TIMEOUT`]
fn settle(client: &portvis_rs::monitor::MonitorClient) {
    while let Some(msg) = client.recv_timeout(SETTLE_TIMEOUT) {
        match msg {
            MonitorMessage::Report(report) => {
                tracing::info!("Graph update {}", report);
                for edge in &report.edges_added {
                    tracing::info!("  + {}", edge);
                }
                for edge in &report.edges_removed {
                    tracing::info!("  - {}", edge);
                }
            }
            MonitorMessage::RefreshFailed(e) => tracing::warn!("Refresh failed: {}", e),
            MonitorMessage::Stats(stats) => {
                let at = stats
                    .last_refresh_at
                    .map(|t| t.format("%H:%M:%S%.3f").to_string())
                    .unwrap_or_else(|| "never".to_string());
                tracing::info!(
                    "{} refreshes ({:.0}% ok), {} subscriptions, last at {} took {:?}",
                    stats.refreshes,
                    stats.success_rate(),
                    stats.active_subscriptions,
                    at,
                    stats.last_refresh_duration
                );
            }
            MonitorMessage::Snapshot(_) | MonitorMessage::Shutdown => {}
        }
    }
}

fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    let _log_guard = init_logging(&config.logging);

    tracing::info!("Starting port graph monitor demo");

    let source = Arc::new(MockPortSource::simulated_detector());
    let (backend, client) = MonitorBackend::new(&config, source.clone());
    let monitor = backend.monitor();
    let worker = std::thread::Builder::new()
        .name("portvis-monitor".into())
        .spawn(move || backend.run())
        .context("spawning monitor worker")?;

    settle(&client);

    // Rewiring fires the port's subscription, no explicit refresh needed
    source.set_upstream("STATS1", Some("PROC1"));
    settle(&client);

    source.add_plugin("ROI2", Some("SIM1"));
    source.add_plugin("STATS2", Some("ROI2"));
    client.refresh();
    settle(&client);

    source.remove_port("TIFF1");
    client.refresh();
    settle(&client);

    client.request_stats();
    settle(&client);

    let snapshot = monitor.snapshot();
    let positions = if config.layout.auto_position {
        let layout = snapshot.layout_annotated(&config.layout.params());
        for edge in &layout.back_references {
            tracing::warn!("Back reference not laid out: {}", edge);
        }
        Some(layout.positions)
    } else {
        tracing::info!("Auto-positioning disabled, skipping layout");
        None
    };

    let output = serde_json::json!({
        "generation": snapshot.generation,
        "cameras": snapshot.cameras(),
        "edges": snapshot.edges,
        "positions": positions,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    client.shutdown();
    if worker.join().is_err() {
        anyhow::bail!("monitor worker panicked");
    }

    tracing::info!("Done");
    Ok(())
}
