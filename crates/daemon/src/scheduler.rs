//! Polling scheduler driving sequential sync cycles.
//!
//! Bindings are processed strictly one at a time: each engine's cycle runs
//! to completion before the next starts, so two bindings can never race on
//! pull/push. Shutdown is honored only at sleep boundaries.

use std::time::Duration;

use tracing::{error, info};

use gitwikisync_core::sync_engine::SyncEngine;
use gitwikisync_core::wiki::WikiAdapter;

use crate::signals::{is_shutdown_requested, ShutdownFlag};

/// Run sync cycles across all engines until shutdown is requested.
pub async fn run_polling_loop<W: WikiAdapter>(
    engines: &mut [SyncEngine<W>],
    interval: Duration,
    shutdown: ShutdownFlag,
) {
    info!(
        interval_secs = interval.as_secs(),
        bindings = engines.len(),
        "starting polling loop"
    );

    let mut cycle: u64 = 0;
    loop {
        if is_shutdown_requested(&shutdown) {
            info!("shutdown requested, exiting polling loop");
            return;
        }

        cycle += 1;
        for engine in engines.iter_mut() {
            info!(cycle, binding = engine.name(), "syncing repository");
            match engine.run_cycle().await {
                Ok(stats) => {
                    if stats.wiki_to_repo_count > 0
                        || stats.repo_to_wiki_count > 0
                        || stats.conflicts_detected > 0
                    {
                        info!(
                            binding = engine.name(),
                            wiki_to_repo = stats.wiki_to_repo_count,
                            repo_to_wiki = stats.repo_to_wiki_count,
                            conflicts = stats.conflicts_detected,
                            "sync cycle completed with changes"
                        );
                    }
                }
                Err(e) => {
                    // The next cycle retries from re-derived state.
                    error!(binding = engine.name(), error = %e, "sync cycle failed");
                }
            }

            // Brief pause between repositories so shutdown requests are
            // noticed quickly.
            if sleep_with_shutdown(Duration::from_secs(1), &shutdown).await {
                return;
            }
        }

        if sleep_with_shutdown(interval, &shutdown).await {
            return;
        }
    }
}

/// Run a single cycle for every engine, in order.
pub async fn run_once<W: WikiAdapter>(engines: &mut [SyncEngine<W>]) {
    for engine in engines.iter_mut() {
        info!(binding = engine.name(), "syncing repository");
        match engine.run_cycle().await {
            Ok(stats) => {
                println!(
                    "{}: wiki→repo: {}, repo→wiki: {}, conflicts: {}",
                    engine.name(),
                    stats.wiki_to_repo_count,
                    stats.repo_to_wiki_count,
                    stats.conflicts_detected
                );
            }
            Err(e) => error!(binding = engine.name(), error = %e, "sync cycle failed"),
        }
    }
}

/// Sleep in one-second steps, returning `true` if shutdown was requested.
async fn sleep_with_shutdown(total: Duration, shutdown: &ShutdownFlag) -> bool {
    let step = Duration::from_secs(1);
    let mut slept = Duration::ZERO;
    while slept < total {
        if is_shutdown_requested(shutdown) {
            info!("shutdown requested during sleep, exiting");
            return true;
        }
        tokio::time::sleep(step.min(total - slept)).await;
        slept += step;
    }
    is_shutdown_requested(shutdown)
}
