//! Periodic background jobs.
//!
//! Each job runs one pass immediately, then one pass per interval until the
//! shared stop signal flips to `true` (or its sender is dropped). A failed
//! pass is logged and the loop keeps going.

pub mod enforcement;
pub mod expiration;

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

pub type StopSignal = watch::Receiver<bool>;

/// Sender flips to `true` to stop every job holding a receiver.
pub fn stop_channel() -> (watch::Sender<bool>, StopSignal) {
    watch::channel(false)
}

pub(crate) async fn run_every<F, Fut, T>(
    job: &'static str,
    interval: Duration,
    mut stop: StopSignal,
    mut pass: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    loop {
        if *stop.borrow() {
            break;
        }

        if let Err(e) = pass().await {
            tracing::error!(job, error = %e, "background pass failed");
        }

        tokio::select! {
            _ = time::sleep(interval) => {}
            _ = stopped(&mut stop) => break,
        }
    }
    tracing::info!(job, "background job stopped");
}

/// Resolves once stop is requested or the sender is gone.
async fn stopped(stop: &mut StopSignal) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}
