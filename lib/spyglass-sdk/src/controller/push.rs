/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::warn;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use spyglass_api::{LabelSet, Meter, MeterProvider, MetricsError, handle_error};

use crate::Accumulator;
use crate::export::{Batcher, Exporter};

const DEFAULT_PERIOD: Duration = Duration::from_secs(10);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A timer-driven controller: collect, checkpoint and export on a fixed
/// period from a spawned task.
///
/// An export failure is reported through the error sink and the timer
/// loop keeps running. `stop` is idempotent, runs one final cycle so
/// pending updates are not lost, and bounds the wait on the in-flight
/// cycle with the shutdown timeout.
pub struct PushController {
    accumulator: Accumulator,
    stop: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

/// Configuration for a [`PushController`].
pub struct PushControllerBuilder {
    period: Duration,
    shutdown_timeout: Duration,
    resource: LabelSet,
}

impl PushControllerBuilder {
    /// Interval between collection cycles.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Bound on how long `stop` waits for the final cycle.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Resource labels attached to every exported checkpoint set.
    pub fn with_resource(mut self, resource: LabelSet) -> Self {
        self.resource = resource;
        self
    }

    pub fn build<B>(
        self,
        accumulator: Accumulator,
        mut batcher: B,
        exporter: Arc<dyn Exporter>,
    ) -> PushController
    where
        B: Batcher + 'static,
    {
        batcher.set_resource(self.resource);
        let stop = Arc::new(Notify::new());
        let worker = tokio::spawn(run_loop(
            accumulator.clone(),
            batcher,
            exporter,
            self.period,
            stop.clone(),
        ));
        PushController {
            accumulator,
            stop,
            worker: Mutex::new(Some(worker)),
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

impl PushController {
    pub fn builder() -> PushControllerBuilder {
        PushControllerBuilder {
            period: DEFAULT_PERIOD,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            resource: LabelSet::empty(),
        }
    }

    pub fn meter(&self, name: &str) -> Meter {
        self.accumulator.meter(name)
    }

    /// Stop the timer loop after one final collect-and-export cycle.
    ///
    /// Idempotent. No new cycle starts after this returns; a cycle still
    /// in flight past the shutdown timeout is aborted and the timeout
    /// reported to the caller.
    pub async fn stop(&self) -> Result<(), MetricsError> {
        self.stop.notify_one();
        let worker = self.worker.lock().unwrap().take();
        let Some(worker) = worker else {
            return Ok(());
        };
        let abort = worker.abort_handle();
        if tokio::time::timeout(self.shutdown_timeout, worker)
            .await
            .is_err()
        {
            warn!("push controller shutdown timed out, aborting worker");
            abort.abort();
            return Err(MetricsError::ShutdownTimeout);
        }
        Ok(())
    }
}

impl MeterProvider for PushController {
    fn meter(&self, name: &str) -> Meter {
        PushController::meter(self, name)
    }
}

impl Drop for PushController {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.lock().unwrap().take() {
            worker.abort();
        }
    }
}

async fn run_loop<B>(
    accumulator: Accumulator,
    mut batcher: B,
    exporter: Arc<dyn Exporter>,
    period: Duration,
    stop: Arc<Notify>,
) where
    B: Batcher,
{
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            biased;
            _ = stop.notified() => {
                run_cycle(&accumulator, &mut batcher, exporter.as_ref()).await;
                break;
            }
            _ = interval.tick() => {
                run_cycle(&accumulator, &mut batcher, exporter.as_ref()).await;
            }
        }
    }
}

async fn run_cycle<B>(accumulator: &Accumulator, batcher: &mut B, exporter: &dyn Exporter)
where
    B: Batcher,
{
    batcher.start_collection();
    accumulator.collect(batcher);
    if let Err(e) = exporter.export(batcher.checkpoint_set()).await {
        handle_error(MetricsError::Other(e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimpleSelector;
    use crate::batcher::UngroupedBatcher;
    use crate::export::CheckpointSet;
    use async_trait::async_trait;
    use spyglass_api::KeyValue;
    use tokio::sync::mpsc;

    struct ChannelExporter {
        tx: mpsc::UnboundedSender<Vec<(String, i64)>>,
    }

    #[async_trait]
    impl Exporter for ChannelExporter {
        async fn export(&self, checkpoint: &CheckpointSet) -> anyhow::Result<()> {
            let sums = checkpoint
                .iter()
                .map(|rec| {
                    (
                        rec.descriptor().name().to_string(),
                        rec.aggregator().as_sum().unwrap().sum().as_i64(),
                    )
                })
                .collect();
            self.tx.send(sums)?;
            Ok(())
        }
    }

    fn start(period: Duration) -> (PushController, mpsc::UnboundedReceiver<Vec<(String, i64)>>) {
        let accumulator = Accumulator::new(Arc::new(SimpleSelector::inexpensive()));
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = PushController::builder().with_period(period).build(
            accumulator,
            UngroupedBatcher::stateful(),
            Arc::new(ChannelExporter { tx }),
        );
        (controller, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn exports_once_per_period() {
        let (controller, mut rx) = start(Duration::from_secs(1));
        let counter = controller.meter("test").i64_counter("c").unwrap();
        let labels = LabelSet::from_kvs([KeyValue::new("A", "B")]);

        counter.add(3i64, &labels);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let exported = rx.recv().await.unwrap();
        assert_eq!(exported, vec![("c".to_string(), 3)]);

        counter.add(4i64, &labels);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let exported = rx.recv().await.unwrap();
        assert_eq!(exported, vec![("c".to_string(), 7)]);

        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_flushes_pending_updates() {
        let (controller, mut rx) = start(Duration::from_secs(3600));
        let counter = controller.meter("test").i64_counter("c").unwrap();

        counter.add(5i64, &LabelSet::empty());
        controller.stop().await.unwrap();

        let exported = rx.recv().await.unwrap();
        assert_eq!(exported, vec![("c".to_string(), 5)]);
    }

    struct FlakyExporter {
        fail_first: std::sync::atomic::AtomicBool,
        inner: ChannelExporter,
    }

    #[async_trait]
    impl Exporter for FlakyExporter {
        async fn export(&self, checkpoint: &CheckpointSet) -> anyhow::Result<()> {
            if self
                .fail_first
                .swap(false, std::sync::atomic::Ordering::AcqRel)
            {
                anyhow::bail!("backend unavailable");
            }
            self.inner.export(checkpoint).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn export_error_does_not_stop_timer_loop() {
        let accumulator = Accumulator::new(Arc::new(SimpleSelector::inexpensive()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let controller = PushController::builder()
            .with_period(Duration::from_secs(1))
            .build(
                accumulator,
                UngroupedBatcher::stateful(),
                Arc::new(FlakyExporter {
                    fail_first: std::sync::atomic::AtomicBool::new(true),
                    inner: ChannelExporter { tx },
                }),
            );
        let counter = controller.meter("test").i64_counter("c").unwrap();

        counter.add(1i64, &LabelSet::empty());
        tokio::time::sleep(Duration::from_millis(2100)).await;

        // first cycle's export failed, second succeeded with the data intact
        let exported = rx.recv().await.unwrap();
        assert_eq!(exported, vec![("c".to_string(), 1)]);
        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let (controller, mut rx) = start(Duration::from_secs(3600));
        controller.stop().await.unwrap();
        controller.stop().await.unwrap();

        // the single final cycle exported one (empty) set
        assert!(rx.recv().await.unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }
}
