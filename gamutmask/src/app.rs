use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use gamutmask_core::{
    GuardedReconciler, PassGuard, PassReport, PassRunner, Reconciler, WatchController,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::mask::GamutMaskTransform;

/// Run one pass or keep the output folder in sync until `shutdown` fires.
pub async fn run(config: AppConfig, shutdown: CancellationToken) -> Result<()> {
    info!("Input folder: {}", config.input_dir.display());
    info!("Output folder: {}", config.output_dir.display());
    if let Some(source) = &config.source {
        info!("loaded configuration from {}", source.display());
    }

    ensure_dir(&config.input_dir, "input")?;
    ensure_dir(&config.output_dir, "output")?;

    let transform = Arc::new(GamutMaskTransform::new(config.mask));
    let reconciler = Reconciler::new(&config.input_dir, &config.output_dir, transform)
        .with_config(config.reconcile.clone());
    let runner = Arc::new(GuardedReconciler::new(PassGuard::new(), Arc::new(reconciler)));

    if !config.monitor {
        let report = runner.run_pass().await.context("reconciliation pass failed")?;
        log_report(&report);
        return Ok(());
    }

    let controller = WatchController::for_directory(
        &config.input_dir,
        &config.reconcile,
        config.watch.clone(),
        runner,
    )
    .with_context(|| format!("failed to watch {}", config.input_dir.display()))?;

    info!("Monitoring {} for changes", config.input_dir.display());
    let summary = controller
        .run(shutdown)
        .await
        .context("monitoring stopped on a failed pass")?;
    info!(passes = summary.passes, "Stopped monitoring");
    Ok(())
}

fn ensure_dir(path: &Path, role: &str) -> Result<()> {
    if !path.is_dir() {
        bail!("{} folder {} does not exist", role, path.display());
    }
    Ok(())
}

fn log_report(report: &PassReport) {
    if report.failed > 0 {
        warn!("{} input(s) could not be processed", report.failed);
    }
}

/// Cancel `token` on SIGINT, SIGTERM, SIGHUP or Ctrl-C.
pub async fn forward_shutdown_signals(token: CancellationToken) {
    wait_for_signal().await;
    token.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigint, mut sigterm, mut sighup) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
    ) {
        (Ok(sigint), Ok(sigterm), Ok(sighup)) => (sigint, sigterm, sighup),
        _ => {
            warn!("unix signal handlers unavailable, falling back to Ctrl+C only");
            ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => info!("SIGINT detected."),
        _ = sigterm.recv() => info!("SIGTERM detected."),
        _ = sighup.recv() => info!("SIGHUP detected."),
        _ = ctrl_c() => info!("Ctrl+C detected."),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
    info!("Ctrl+C detected.");
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl+C: {}", err);
        std::future::pending::<()>().await;
    }
}
