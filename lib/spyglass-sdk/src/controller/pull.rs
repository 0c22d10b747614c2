/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};

use spyglass_api::{LabelSet, Meter, MeterProvider};

use crate::Accumulator;
use crate::controller::clock::{Clock, RealClock};
use crate::export::{Batcher, CheckpointSet};

/// An on-demand controller for scrape-style exporters.
///
/// The caller drives collection, typically from an HTTP handler. A cache
/// window coalesces bursts of scrapes: a `collect` call within the
/// window of the previous one reuses the prior checkpoint set.
pub struct PullController<B: Batcher> {
    accumulator: Accumulator,
    cache_period: TimeDelta,
    clock: Arc<dyn Clock>,
    inner: Mutex<PullInner<B>>,
}

struct PullInner<B> {
    batcher: B,
    last_collect: Option<DateTime<Utc>>,
}

impl<B: Batcher> PullController<B> {
    pub fn new(accumulator: Accumulator, batcher: B) -> Self {
        PullController {
            accumulator,
            cache_period: TimeDelta::zero(),
            clock: Arc::new(RealClock),
            inner: Mutex::new(PullInner {
                batcher,
                last_collect: None,
            }),
        }
    }

    /// Minimum interval between fresh collections. Zero disables
    /// caching.
    pub fn with_cache_period(mut self, period: TimeDelta) -> Self {
        self.cache_period = period;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn meter(&self, name: &str) -> Meter {
        self.accumulator.meter(name)
    }

    /// Run a collection pass unless the previous one is still within the
    /// cache window. Returns whether a fresh pass ran.
    pub fn collect(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let now = self.clock.now();
        if let Some(last) = inner.last_collect {
            if now - last < self.cache_period {
                return false;
            }
        }
        inner.last_collect = Some(now);
        inner.batcher.start_collection();
        self.accumulator.collect(&mut inner.batcher);
        true
    }

    /// Read the current checkpoint set under the controller lock.
    pub fn with_checkpoint<R>(&self, f: impl FnOnce(&CheckpointSet) -> R) -> R {
        let mut inner = self.inner.lock().unwrap();
        f(inner.batcher.checkpoint_set())
    }

    /// Resource labels attached to every checkpoint set.
    pub fn set_resource(&self, resource: LabelSet) {
        self.inner.lock().unwrap().batcher.set_resource(resource);
    }
}

impl<B: Batcher> MeterProvider for PullController<B> {
    fn meter(&self, name: &str) -> Meter {
        PullController::meter(self, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimpleSelector;
    use crate::batcher::UngroupedBatcher;
    use crate::controller::clock::ManualClock;
    use spyglass_api::KeyValue;

    fn controller(cache_secs: i64, clock: Arc<ManualClock>) -> PullController<UngroupedBatcher> {
        let accumulator = Accumulator::new(Arc::new(SimpleSelector::inexpensive()));
        PullController::new(accumulator, UngroupedBatcher::stateful())
            .with_cache_period(TimeDelta::seconds(cache_secs))
            .with_clock(clock)
    }

    #[test]
    fn cache_window_coalesces_scrapes() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let controller = controller(10, clock.clone());
        let counter = controller.meter("test").i64_counter("c").unwrap();
        let labels = LabelSet::from_kvs([KeyValue::new("A", "B")]);

        counter.add(1i64, &labels);
        assert!(controller.collect());

        // within the window: cached, the new update is not visible
        counter.add(1i64, &labels);
        assert!(!controller.collect());
        let sum = controller.with_checkpoint(|set| {
            set.iter()
                .next()
                .map(|rec| rec.aggregator().as_sum().unwrap().sum().as_i64())
        });
        assert_eq!(sum, Some(1));

        clock.advance(TimeDelta::seconds(10));
        assert!(controller.collect());
        let sum = controller.with_checkpoint(|set| {
            set.iter()
                .next()
                .map(|rec| rec.aggregator().as_sum().unwrap().sum().as_i64())
        });
        assert_eq!(sum, Some(2));
    }

    #[test]
    fn zero_cache_period_always_collects() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let controller = controller(0, clock);
        assert!(controller.collect());
        assert!(controller.collect());
    }

    #[test]
    fn resource_flows_to_checkpoint() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let controller = controller(0, clock);
        controller.set_resource(LabelSet::from_kvs([KeyValue::new("service", "api")]));
        controller.collect();
        let resource =
            controller.with_checkpoint(|set| set.resource().encoded().to_string());
        assert_eq!(resource, "service=api");
    }
}
