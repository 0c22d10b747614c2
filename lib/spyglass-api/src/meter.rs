/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use crate::observer::{AsyncInstrumentCore, ObserverCallback, ObserverResult};
use crate::{
    BoundSyncInstrumentCore, Descriptor, InstrumentKind, LabelSet, Measurement, MeterCore,
    MetricsError, Number, NumberKind, SyncInstrumentCore,
};

/// A named handle to a [`MeterCore`], used to construct instruments.
#[derive(Clone)]
pub struct Meter {
    name: String,
    core: Arc<dyn MeterCore>,
}

impl Meter {
    pub fn new(name: impl Into<String>, core: Arc<dyn MeterCore>) -> Self {
        Meter {
            name: name.into(),
            core,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn core(&self) -> &Arc<dyn MeterCore> {
        &self.core
    }

    fn new_counter(&self, name: &str, number_kind: NumberKind) -> Result<Counter, MetricsError> {
        let descriptor = Descriptor::new(name, InstrumentKind::Counter, number_kind);
        let inst = self.core.new_sync_instrument(descriptor)?;
        Ok(Counter { inst })
    }

    fn new_measure(&self, name: &str, number_kind: NumberKind) -> Result<Measure, MetricsError> {
        let descriptor = Descriptor::new(name, InstrumentKind::Measure, number_kind);
        let inst = self.core.new_sync_instrument(descriptor)?;
        Ok(Measure { inst })
    }

    pub fn i64_counter(&self, name: &str) -> Result<Counter, MetricsError> {
        self.new_counter(name, NumberKind::Signed)
    }

    pub fn f64_counter(&self, name: &str) -> Result<Counter, MetricsError> {
        self.new_counter(name, NumberKind::Double)
    }

    pub fn i64_measure(&self, name: &str) -> Result<Measure, MetricsError> {
        self.new_measure(name, NumberKind::Signed)
    }

    pub fn f64_measure(&self, name: &str) -> Result<Measure, MetricsError> {
        self.new_measure(name, NumberKind::Double)
    }

    /// Build a synchronous instrument from a caller-supplied descriptor,
    /// for callers that need keys/unit/description options.
    pub fn sync_instrument(
        &self,
        descriptor: Descriptor,
    ) -> Result<Arc<dyn SyncInstrumentCore>, MetricsError> {
        self.core.new_sync_instrument(descriptor)
    }

    pub fn i64_observer<F>(&self, name: &str, callback: F) -> Result<Observer, MetricsError>
    where
        F: Fn(&mut ObserverResult) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_observer(name, NumberKind::Signed, Arc::new(callback))
    }

    pub fn f64_observer<F>(&self, name: &str, callback: F) -> Result<Observer, MetricsError>
    where
        F: Fn(&mut ObserverResult) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_observer(name, NumberKind::Double, Arc::new(callback))
    }

    fn register_observer(
        &self,
        name: &str,
        number_kind: NumberKind,
        callback: ObserverCallback,
    ) -> Result<Observer, MetricsError> {
        let descriptor = Descriptor::new(name, InstrumentKind::Observer, number_kind);
        let inst = self.core.new_async_instrument(descriptor, callback)?;
        Ok(Observer { inst })
    }

    /// Record multiple measurements atomically under one label set.
    pub fn record_batch(&self, labels: &LabelSet, measurements: &[Measurement]) {
        self.core.record_batch(labels, measurements)
    }
}

/// A monotonic additive instrument.
#[derive(Clone)]
pub struct Counter {
    inst: Arc<dyn SyncInstrumentCore>,
}

impl Counter {
    pub fn add(&self, value: impl Into<Number>, labels: &LabelSet) {
        self.inst.record_one(value.into(), labels)
    }

    pub fn bind(&self, labels: &LabelSet) -> BoundCounter {
        BoundCounter {
            bound: self.inst.bind(labels),
        }
    }

    pub fn measurement(&self, value: impl Into<Number>) -> Measurement {
        Measurement::new(self.inst.clone(), value.into())
    }

    pub fn descriptor(&self) -> &Descriptor {
        self.inst.descriptor()
    }
}

pub struct BoundCounter {
    bound: Arc<dyn BoundSyncInstrumentCore>,
}

impl BoundCounter {
    pub fn add(&self, value: impl Into<Number>) {
        self.bound.record_one(value.into())
    }
}

impl Drop for BoundCounter {
    fn drop(&mut self) {
        self.bound.unbind()
    }
}

/// A grouping (distribution) instrument.
#[derive(Clone)]
pub struct Measure {
    inst: Arc<dyn SyncInstrumentCore>,
}

impl Measure {
    pub fn record(&self, value: impl Into<Number>, labels: &LabelSet) {
        self.inst.record_one(value.into(), labels)
    }

    pub fn bind(&self, labels: &LabelSet) -> BoundMeasure {
        BoundMeasure {
            bound: self.inst.bind(labels),
        }
    }

    pub fn measurement(&self, value: impl Into<Number>) -> Measurement {
        Measurement::new(self.inst.clone(), value.into())
    }

    pub fn descriptor(&self) -> &Descriptor {
        self.inst.descriptor()
    }
}

pub struct BoundMeasure {
    bound: Arc<dyn BoundSyncInstrumentCore>,
}

impl BoundMeasure {
    pub fn record(&self, value: impl Into<Number>) {
        self.bound.record_one(value.into())
    }
}

impl Drop for BoundMeasure {
    fn drop(&mut self) {
        self.bound.unbind()
    }
}

/// Handle to a registered asynchronous instrument. Dropping the handle
/// does not unregister the callback.
#[derive(Clone)]
pub struct Observer {
    inst: Arc<dyn AsyncInstrumentCore>,
}

impl Observer {
    pub fn descriptor(&self) -> &Descriptor {
        self.inst.descriptor()
    }
}
