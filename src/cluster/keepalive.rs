//! Periodic keep-alive sweep over the membership table.
//!
//! Each sweep pings every known member's liveness operation. Consecutive
//! failures past the threshold mark a member unreachable; one success marks
//! it alive again and refreshes its load metric. Probe errors become state
//! transitions, never propagated failures.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::Membership;
use crate::config::DispatchConfig;

/// Keep-alive loop options.
#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    /// Sweep period.
    pub interval: Duration,
    /// Consecutive failed pings before a member is marked unreachable.
    pub failure_threshold: u32,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            failure_threshold: 3,
        }
    }
}

impl From<&DispatchConfig> for KeepAliveConfig {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            interval: config.keep_alive_interval(),
            failure_threshold: config.keep_alive_failure_threshold,
        }
    }
}

/// Handle to the background keep-alive task.
pub struct KeepAliveWorker {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl KeepAliveWorker {
    /// Stop the loop and wait for it to finish its current sweep.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "Keep-alive task panicked");
        }
    }
}

/// Spawn the keep-alive loop for a membership table.
pub fn spawn_keep_alive(membership: Arc<Membership>, config: KeepAliveConfig) -> KeepAliveWorker {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    info!(
        interval_ms = config.interval.as_millis() as u64,
        failure_threshold = config.failure_threshold,
        "Starting keep-alive loop"
    );
    let handle = tokio::spawn(run(membership, config, shutdown_rx));

    KeepAliveWorker {
        handle,
        shutdown: shutdown_tx,
    }
}

async fn run(membership: Arc<Membership>, config: KeepAliveConfig, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("Keep-alive loop stopped");
                return;
            }
            _ = ticker.tick() => sweep(&membership, &config).await,
        }
    }
}

/// Ping every member once and record the outcome.
pub(crate) async fn sweep(membership: &Membership, config: &KeepAliveConfig) {
    for (id, channel) in membership.probe_targets().await {
        match channel.ping().await {
            Ok(load) => membership.record_ping_success(id, load).await,
            Err(e) => {
                debug!(member = %id, error = %e, "Liveness ping failed");
                membership
                    .record_ping_failure(id, config.failure_threshold)
                    .await;
            }
        }
    }
}
