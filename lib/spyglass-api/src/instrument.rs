/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use crate::observer::{AsyncInstrumentCore, ObserverCallback};
use crate::{Descriptor, LabelSet, Meter, MetricsError, Number};

/// Implemented by every instrument, sync or async.
pub trait InstrumentCore: Send + Sync {
    fn descriptor(&self) -> &Descriptor;
}

/// A synchronous instrument implementation.
pub trait SyncInstrumentCore: InstrumentCore {
    /// Acquire a handle bound to one label set. The handle caches the
    /// record lookup, which is the dominant hot path.
    fn bind(&self, labels: &LabelSet) -> Arc<dyn BoundSyncInstrumentCore>;

    /// Record one measurement against the given label set.
    fn record_one(&self, value: Number, labels: &LabelSet);
}

/// A synchronous instrument bound to one label set.
pub trait BoundSyncInstrumentCore: Send + Sync {
    fn record_one(&self, value: Number);

    /// Release the handle's reference on its record.
    fn unbind(&self);
}

/// One value of a batched multi-measurement event.
pub struct Measurement {
    instrument: Arc<dyn SyncInstrumentCore>,
    number: Number,
}

impl Measurement {
    pub fn new(instrument: Arc<dyn SyncInstrumentCore>, number: Number) -> Self {
        Measurement { instrument, number }
    }

    #[inline]
    pub fn instrument(&self) -> &Arc<dyn SyncInstrumentCore> {
        &self.instrument
    }

    #[inline]
    pub fn number(&self) -> Number {
        self.number
    }
}

/// The SDK-facing construction surface behind a [`Meter`].
pub trait MeterCore: Send + Sync {
    fn new_sync_instrument(
        &self,
        descriptor: Descriptor,
    ) -> Result<Arc<dyn SyncInstrumentCore>, MetricsError>;

    fn new_async_instrument(
        &self,
        descriptor: Descriptor,
        callback: ObserverCallback,
    ) -> Result<Arc<dyn AsyncInstrumentCore>, MetricsError>;

    /// Record multiple measurements under one label set.
    fn record_batch(&self, labels: &LabelSet, measurements: &[Measurement]);
}

/// Source of named [`Meter`] instances.
pub trait MeterProvider: Send + Sync {
    fn meter(&self, name: &str) -> Meter;
}
