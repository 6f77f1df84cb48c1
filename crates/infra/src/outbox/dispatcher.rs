//! Outbox dispatcher with retry and dead-letter handling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use housebank_core::LedgerResult;

use crate::config::DispatcherConfig;
use crate::store::{Database, LedgerStore, Queries};

use super::types::{FailureDisposition, OutboxMessage, RetryPolicy};

/// Delivers outbox messages of one topic to an external system.
///
/// Delivery is at-least-once: a crash or commit failure after `handle`
/// returns leads to redelivery. Implementations should deduplicate on
/// `message.id`.
#[async_trait]
pub trait OutboxHandler: Send + Sync {
    async fn handle(&self, message: &OutboxMessage) -> anyhow::Result<()>;
}

/// Counts from one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

impl DispatchReport {
    pub fn processed(&self) -> usize {
        self.delivered + self.retried + self.dead_lettered
    }
}

/// Dispatcher runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DispatcherStats {
    pub passes: u64,
    pub delivered: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub failed_passes: u64,
    pub uptime_secs: u64,
}

impl DispatcherStats {
    fn record(&mut self, report: &DispatchReport) {
        self.passes += 1;
        self.delivered += report.delivered as u64;
        self.retried += report.retried as u64;
        self.dead_lettered += report.dead_lettered as u64;
    }
}

type Handlers = HashMap<String, Arc<dyn OutboxHandler>>;

/// Polls the outbox and hands due messages to their topic's handler.
///
/// Each pass claims a batch inside one transaction (claimed rows stay locked,
/// so concurrent dispatchers never pick the same message), delivers, records
/// the result, and commits.
pub struct OutboxDispatcher<D> {
    store: LedgerStore<D>,
    handlers: Handlers,
    config: DispatcherConfig,
}

impl<D: Database> OutboxDispatcher<D> {
    pub fn new(store: LedgerStore<D>, config: DispatcherConfig) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            config,
        }
    }

    pub fn register_handler(&mut self, topic: impl Into<String>, handler: impl OutboxHandler + 'static) {
        self.handlers.insert(topic.into(), Arc::new(handler));
    }

    /// Claim and process one batch.
    pub async fn run_once(&self) -> LedgerResult<DispatchReport> {
        let handlers = self.handlers.clone();
        let policy = self.config.retry_policy.clone();
        let batch_size = self.config.batch_size;

        self.store
            .run_in_transaction(move |q| Box::pin(dispatch_batch(q, handlers, policy, batch_size)))
            .await
    }

    /// Run passes until the outbox is empty or `max_passes` is reached.
    pub async fn drain(&self, max_passes: usize) -> LedgerResult<DispatchReport> {
        let mut total = DispatchReport::default();
        for _ in 0..max_passes {
            let report = self.run_once().await?;
            total.delivered += report.delivered;
            total.retried += report.retried;
            total.dead_lettered += report.dead_lettered;
            if report.processed() == 0 {
                break;
            }
        }
        Ok(total)
    }

    /// Spawn the dispatcher loop on the current tokio runtime.
    pub fn spawn(self) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(DispatcherStats::default()));
        let join = tokio::spawn(dispatcher_loop(self, shutdown_rx, Arc::clone(&stats)));

        DispatcherHandle {
            shutdown: shutdown_tx,
            join,
            stats,
        }
    }
}

async fn dispatch_batch(
    q: &mut dyn Queries,
    handlers: Handlers,
    policy: RetryPolicy,
    batch_size: u32,
) -> LedgerResult<DispatchReport> {
    let mut report = DispatchReport::default();

    for message in q.claim_outbox(batch_size, Utc::now()).await? {
        let outcome = match handlers.get(&message.topic) {
            Some(handler) => handler.handle(&message).await,
            None => Err(anyhow::anyhow!("no handler for topic {}", message.topic)),
        };

        match outcome {
            Ok(()) => {
                q.mark_outbox_delivered(message.id, Utc::now()).await?;
                debug!(message_id = %message.id, topic = %message.topic, "outbox message delivered");
                report.delivered += 1;
            }
            Err(err) => {
                let attempts = message.attempts + 1;
                let reason = format!("{err:#}");
                match policy.on_failure(attempts, Utc::now()) {
                    FailureDisposition::RetryAt(at) => {
                        q.mark_outbox_failed(message.id, &reason, Some(at)).await?;
                        debug!(
                            message_id = %message.id,
                            attempts,
                            error = %reason,
                            retry_at = %at,
                            "outbox delivery failed; will retry"
                        );
                        report.retried += 1;
                    }
                    FailureDisposition::DeadLetter => {
                        q.mark_outbox_failed(message.id, &reason, None).await?;
                        warn!(
                            message_id = %message.id,
                            topic = %message.topic,
                            attempts,
                            error = %reason,
                            "outbox message dead-lettered"
                        );
                        report.dead_lettered += 1;
                    }
                }
            }
        }
    }

    Ok(report)
}

/// Handle to control a running dispatcher.
#[derive(Debug)]
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    stats: Arc<Mutex<DispatcherStats>>,
}

impl DispatcherHandle {
    /// Request graceful shutdown and wait for the current pass to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.join.await {
            error!(error = %err, "outbox dispatcher task failed");
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

async fn dispatcher_loop<D: Database>(
    dispatcher: OutboxDispatcher<D>,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<Mutex<DispatcherStats>>,
) {
    let name = dispatcher.config.name.clone();
    let poll_interval = dispatcher.config.poll_interval;
    info!(dispatcher = %name, "outbox dispatcher started");
    let start_time = Instant::now();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let pass = dispatcher.run_once().await;
        let idle = match &pass {
            Ok(report) => report.processed() == 0,
            Err(_) => true,
        };

        if let Ok(mut s) = stats.lock() {
            s.uptime_secs = start_time.elapsed().as_secs();
            match &pass {
                Ok(report) => s.record(report),
                Err(_) => s.failed_passes += 1,
            }
        }

        if let Err(err) = pass {
            error!(dispatcher = %name, error = %err, "outbox dispatch pass failed");
        }

        if idle {
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                changed = shutdown.changed() => {
                    // Handle dropped without an explicit shutdown.
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }

    info!(dispatcher = %name, "outbox dispatcher stopped");
}
