//! Queue-mediated dispatch: decoupled, retry-bounded, fire-and-forget.
//!
//! Producers enqueue invocation contexts and move on; a background consumer
//! drives the synchronous dispatcher for each one. Successful results are
//! discarded - there is no return channel. Failures are retried with
//! backoff up to the configured limit, except for conditions that cannot
//! succeed on retry, which are dropped immediately.

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::Dispatcher;
use crate::config::DispatchConfig;
use crate::context::InvocationContext;

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that can occur while enqueueing.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,

    #[error("Queue is full")]
    Full,
}

/// Wraps one context for asynchronous handoff. The retry counter lives in
/// the consumer, not here.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub correlation_id: Uuid,
    pub context: InvocationContext,
}

impl Envelope {
    fn new(context: InvocationContext) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            context,
        }
    }
}

/// Queue consumer options.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Bounded queue capacity.
    pub capacity: usize,
    /// Retries after the first failed dispatch attempt.
    pub retry_limit: usize,
    /// Upper bound on one blocking dequeue wait.
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            retry_limit: 3,
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl From<&DispatchConfig> for QueueConfig {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            capacity: config.queue_capacity,
            retry_limit: config.retry_limit,
            poll_interval: config.poll_interval(),
        }
    }
}

/// Producer handle: enqueue contexts for asynchronous dispatch.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<Envelope>,
}

impl DispatchQueue {
    /// Enqueue a context, waiting for queue space if necessary.
    ///
    /// Returns as soon as the context is queued; no dispatch result will
    /// ever be observable by this caller.
    pub async fn enqueue(&self, context: InvocationContext) -> Result<Uuid> {
        let envelope = Envelope::new(context);
        let correlation_id = envelope.correlation_id;
        self.tx
            .send(envelope)
            .await
            .map_err(|_| QueueError::Closed)?;
        Ok(correlation_id)
    }

    /// Enqueue without waiting; a full queue is the caller's problem.
    pub fn try_enqueue(&self, context: InvocationContext) -> Result<Uuid> {
        let envelope = Envelope::new(context);
        let correlation_id = envelope.correlation_id;
        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;
        Ok(correlation_id)
    }
}

/// Handle to the background consumer task.
pub struct QueueWorker {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl QueueWorker {
    /// Request shutdown and wait for the consumer to drain and stop.
    ///
    /// The item being dispatched, if any, finishes first; everything still
    /// resident in the queue is processed best-effort with errors swallowed.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "Queue consumer task panicked");
        }
    }
}

/// Spawn the queue and its background consumer.
pub fn spawn(dispatcher: Arc<Dispatcher>, config: QueueConfig) -> (DispatchQueue, QueueWorker) {
    let (tx, rx) = mpsc::channel(config.capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    info!(
        capacity = config.capacity,
        retry_limit = config.retry_limit,
        "Starting queue consumer"
    );
    let handle = tokio::spawn(consume_loop(dispatcher, config, rx, shutdown_rx));

    (
        DispatchQueue { tx },
        QueueWorker {
            handle,
            shutdown: shutdown_tx,
        },
    )
}

async fn consume_loop(
    dispatcher: Arc<Dispatcher>,
    config: QueueConfig,
    mut rx: mpsc::Receiver<Envelope>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                drain(&dispatcher, &mut rx).await;
                info!("Queue consumer stopped");
                return;
            }
            polled = timeout(config.poll_interval, rx.recv()) => match polled {
                // Bounded wait expired with nothing available.
                Err(_) => continue,
                // All producers dropped; nothing can arrive anymore.
                Ok(None) => {
                    info!("Queue closed, consumer stopping");
                    return;
                }
                Ok(Some(envelope)) => process(&dispatcher, &config, envelope).await,
            }
        }
    }
}

/// Dispatch one envelope with bounded retries.
async fn process(dispatcher: &Dispatcher, config: &QueueConfig, envelope: Envelope) {
    let backoff = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(config.retry_limit)
        .with_jitter()
        .build();

    let mut attempt = 0;
    let mut last_error = None;

    for delay in std::iter::once(Duration::ZERO).chain(backoff) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;

        let mut ctx = envelope.context.clone();
        match dispatcher.dispatch(&mut ctx).await {
            Ok(_) => {
                // Fire-and-forget: the result has no recipient.
                debug!(
                    correlation_id = %envelope.correlation_id,
                    attempt,
                    "Queued invocation dispatched"
                );
                return;
            }
            Err(e) if !e.is_retryable() => {
                warn!(
                    correlation_id = %envelope.correlation_id,
                    error = %e,
                    "Dropping undeliverable invocation"
                );
                return;
            }
            Err(e) => {
                warn!(
                    correlation_id = %envelope.correlation_id,
                    attempt,
                    retry_limit = config.retry_limit,
                    error = %e,
                    "Queued dispatch failed, will retry"
                );
                last_error = Some(e);
            }
        }
    }

    if let Some(e) = last_error {
        error!(
            correlation_id = %envelope.correlation_id,
            attempts = attempt,
            error = %e,
            "Retry limit exhausted, dropping invocation"
        );
    }
}

/// Process everything still resident in the queue, swallowing errors.
async fn drain(dispatcher: &Dispatcher, rx: &mut mpsc::Receiver<Envelope>) {
    rx.close();

    let mut drained = 0;
    while let Ok(envelope) = rx.try_recv() {
        drained += 1;
        let mut ctx = envelope.context.clone();
        if let Err(e) = dispatcher.dispatch(&mut ctx).await {
            warn!(
                correlation_id = %envelope.correlation_id,
                error = %e,
                "Error while draining queue on shutdown"
            );
        }
    }

    if drained > 0 {
        info!(count = drained, "Drained queue on shutdown");
    }
}
