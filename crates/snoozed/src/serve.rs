//! Serve mode — the HTTP surface plus the background loops.
//!
//! In this mode, the daemon:
//! 1. Builds the gateway, PaaS and chat clients from configuration
//! 2. Opens the savings ledger when a path is configured
//! 3. Starts the scan, savings and candidate loops (not on build instances)
//! 4. Serves the waiting page and report endpoints until Ctrl-C

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use snooze_api::{ApiHeaders, ApiState};
use snooze_autoscale::{ScanPolicy, Scanner};
use snooze_clients::{ChatNotifier, HttpGateway, HttpPaas};
use snooze_core::{SnoozeConfig, SystemClock};
use snooze_state::SavingsLedger;
use snooze_wake::{RequestCoalescer, WakeContext, WakeSettings};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Assemble the shared context from configuration.
pub fn build_context(config: &SnoozeConfig) -> anyhow::Result<Arc<WakeContext>> {
    let gateway = Arc::new(HttpGateway::new(&config.gateway)?);
    let paas = Arc::new(HttpPaas::new(&config.paas)?);
    let notifier = Arc::new(ChatNotifier::new(config.notify.chat_url.clone())?);

    let ledger = match config.ledger.path.as_deref() {
        Some(path) => {
            let ledger = SavingsLedger::open(Path::new(path))?;
            info!(%path, "savings ledger opened");
            Some(ledger)
        }
        None => {
            info!("no savings ledger configured, past savings will read 0");
            None
        }
    };

    Ok(WakeContext::new(
        gateway,
        paas,
        notifier,
        ledger,
        Arc::new(SystemClock),
        WakeSettings::from_config(config),
    ))
}

/// Run until Ctrl-C.
pub async fn run(config: SnoozeConfig) -> anyhow::Result<()> {
    info!(
        release_mode = ?config.wake.release_mode,
        instance_type = %config.server.instance_type,
        "snooze daemon starting"
    );

    let ctx = build_context(&config)?;
    let coalescer = RequestCoalescer::new(ctx.clone());

    // ── Background loops ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut loops: Vec<JoinHandle<()>> = Vec::new();

    if config.server.is_build_instance() {
        info!("build instance, background loops disabled");
    } else {
        let scanner = Scanner::new(coalescer.clone(), ScanPolicy::from_config(&config.scan));
        let scan_shutdown = shutdown_rx.clone();
        loops.push(tokio::spawn(async move {
            scanner.run(scan_shutdown).await;
        }));

        loops.push(tokio::spawn(snooze_autoscale::run_reports(
            ctx.clone(),
            config.scan.report_every(),
            shutdown_rx.clone(),
        )));

        loops.push(tokio::spawn(snooze_autoscale::run_candidates(
            ctx.clone(),
            config.scan.lookback(),
            config.scan.excluded_signature.clone(),
            config.scan.candidates_every(),
            shutdown_rx.clone(),
        )));
    }

    // ── HTTP surface ───────────────────────────────────────────

    let state = ApiState::new(coalescer, ApiHeaders::from_config(&config.server)?)?;
    let router = snooze_api::build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "HTTP server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    for handle in loops {
        let _ = handle.await;
    }
    ctx.shutdown();

    info!("snooze daemon stopped");
    Ok(())
}
