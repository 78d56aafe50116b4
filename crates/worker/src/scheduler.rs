//! Periodic flush scheduler.

use hitcount_core::Result;
use pipeline::Pipeline;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::flush::{FlushReport, FlushWorker};

/// Runs the flush worker on an interval and on demand.
pub struct Scheduler {
    worker: FlushWorker,
    config: SchedulerConfig,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, config: SchedulerConfig) -> Self {
        Self {
            worker: FlushWorker::new(pipeline, config.clone()),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Flush now and wait for the result.
    ///
    /// Safe to call while the interval loop runs; flushes are serialised.
    pub async fn persist_and_stat(&self) -> Result<FlushReport> {
        self.worker.flush().await
    }

    /// Starts the interval loop. It stops after [`shutdown`](Self::shutdown),
    /// running one final flush first.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            scheduler.run().await;
        });
        info!(
            flush_interval_ms = self.config.flush_interval_ms,
            "Flush scheduler started"
        );
        handle
    }

    async fn run(&self) {
        let period = self.config.flush_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    match self.worker.flush().await {
                        Ok(report) => info!(hits = report.hits, "Final flush complete"),
                        Err(e) => error!(error = %e, "Final flush failed"),
                    }
                    break;
                }
                _ = ticker.tick() => {
                    // Failures are logged by the worker and the batch stays
                    // buffered for the next tick.
                    let _ = self.worker.flush().await;
                }
            }
        }

        info!("Flush scheduler stopped");
    }

    /// Signal the interval loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
