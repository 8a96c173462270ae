//! Solo kernel - main entry point.
//!
//! Builds the event bus and supervisor, registers the built-in components:
//! - metrics-sampler: publishes bus counters as `metrics-sample` events
//! - status-reporter: logs the aggregated health report
//!
//! then runs until Ctrl-C or SIGTERM.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use solo_core::supervisor::{ComponentSpec, RestartPolicy};
use solo_core::types::{CorrelationId, RestartConfig};
use solo_core::{
    CommBus, ComponentContext, Config, EventPayload, HealthAggregator, KindRegistry, Supervisor,
};

#[derive(Debug, Parser)]
#[command(name = "solo-kernel", version, about = "Solo event bus and component supervisor")]
struct Args {
    /// JSON configuration file.
    #[arg(long, env = "SOLO_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,

    /// Interval between metrics samples and status reports.
    #[arg(long, default_value = "15s", value_parser = humantime_serde::re::humantime::parse_duration)]
    report_interval: Duration,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if args.json_logs {
        config.observability.json_logs = true;
    }

    // Initialize observability
    solo_core::observability::init_tracing_with(&config.observability);

    let bus = Arc::new(CommBus::try_new(KindRegistry::with_defaults(), &config.bus)?);
    let supervisor = Supervisor::new(bus.clone(), config.supervisor.clone());
    let health = HealthAggregator::new(supervisor.status_handle(), bus.clone());

    let interval = args.report_interval;
    let always = RestartConfig {
        policy: RestartPolicy::Always,
        ..config.supervisor.default_restart
    };

    supervisor
        .register(
            ComponentSpec::from_fn("metrics-sampler", move |ctx| sample_metrics(ctx, interval))?
                .with_restart(always),
        )
        .await?;

    supervisor
        .register(
            ComponentSpec::from_fn("status-reporter", move |ctx| {
                report_status(ctx, health.clone(), interval)
            })?
            .with_restart(always),
        )
        .await?;

    let started = supervisor.start_all().await?;
    tracing::info!(
        running = ?started.running,
        failed = ?started.failed,
        pending = ?started.pending,
        "Solo kernel started"
    );

    wait_for_signal().await?;
    tracing::info!("shutdown requested");

    let report = supervisor.shutdown(supervisor.shutdown_timeout()).await;
    if !report.is_clean() {
        tracing::error!(unclean = ?report.unclean, "unclean shutdown");
        std::process::exit(1);
    }
    Ok(())
}

/// Publish bus counters as a `metrics-sample` every `interval`.
async fn sample_metrics(ctx: ComponentContext, interval: Duration) -> solo_core::Result<()> {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = ctx.cancelled() => return Ok(()),
        }
        let stats = ctx.bus().stats().await;
        let payload = EventPayload::metrics_sample(
            "bus",
            [
                ("events_published", stats.events_published as f64),
                ("events_dropped", stats.events_dropped as f64),
                ("events_timed_out", stats.events_timed_out as f64),
                ("active_subscribers", stats.active_subscribers as f64),
                ("queue_depth", stats.queue_depth as f64),
            ],
        );
        ctx.emit(payload, CorrelationId::new()).await?;
    }
}

async fn report_status(
    ctx: ComponentContext,
    health: HealthAggregator,
    interval: Duration,
) -> solo_core::Result<()> {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = ctx.cancelled() => return Ok(()),
        }
        let report = health.get_status().await;
        tracing::info!(
            overall = ?report.overall,
            components = report.components.len(),
            published = report.counters.events_published,
            "status report"
        );
        tracing::debug!(report = %serde_json::to_string(&report)?, "status report detail");
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
