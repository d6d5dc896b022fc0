//! Delayed periodic loops with shutdown.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

/// Run `tick` after `first`, then every `every`, until shutdown.
pub async fn run<F, Fut>(
    name: &'static str,
    first: Duration,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    info!(task = name, interval_secs = every.as_secs(), "periodic task started");
    let mut delay = first;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                tick().await;
                delay = every;
            }
            _ = shutdown.changed() => {
                info!(task = name, "periodic task shutting down");
                break;
            }
        }
    }
}
