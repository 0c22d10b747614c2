/*
 * SPDX-License-Identifier: Apache-2.0
 */

//! The forwarding meter provider used as the process-wide default.
//!
//! Instrumentation may construct meters and instruments at program init,
//! before any SDK is installed. Everything built before delegation is a
//! buffered no-op forwarder; [`set_meter_provider`] re-homes every
//! buffered meter and instrument against the real provider exactly once.
//! After that, calls on the forwarders short-circuit through a one-time
//! atomic pointer load.

use std::sync::{Arc, LazyLock, Mutex, OnceLock};

use crate::observer::{AsyncInstrumentCore, ObserverCallback};
use crate::{
    BoundSyncInstrumentCore, Descriptor, InstrumentCore, LabelSet, Measurement, Meter, MeterCore,
    MeterProvider, MetricsError, Number, SyncInstrumentCore, handle_error,
};

static GLOBAL_PROVIDER: LazyLock<Arc<DelegatingMeterProvider>> =
    LazyLock::new(|| Arc::new(DelegatingMeterProvider::new()));

/// The process-wide default provider. Forwards once delegated.
pub fn meter_provider() -> Arc<dyn MeterProvider> {
    GLOBAL_PROVIDER.clone() as Arc<dyn MeterProvider>
}

/// Install the real provider behind the process-wide default.
///
/// May be called exactly once; a second call is reported through the
/// error sink and ignored.
pub fn set_meter_provider(provider: Arc<dyn MeterProvider>) {
    GLOBAL_PROVIDER.set_delegate(provider)
}

/// Shorthand for `meter_provider().meter(name)`.
pub fn meter(name: &str) -> Meter {
    GLOBAL_PROVIDER.meter(name)
}

struct ProviderInner {
    delegate: Option<Arc<dyn MeterProvider>>,
    meters: Vec<Arc<DelegatingMeterCore>>,
}

/// A [`MeterProvider`] that buffers meter construction until a real
/// provider is installed.
///
/// The global default is one of these; tests construct their own
/// instance instead of touching process state.
pub struct DelegatingMeterProvider {
    inner: Mutex<ProviderInner>,
}

impl DelegatingMeterProvider {
    pub fn new() -> Self {
        DelegatingMeterProvider {
            inner: Mutex::new(ProviderInner {
                delegate: None,
                meters: Vec::new(),
            }),
        }
    }

    pub fn set_delegate(&self, provider: Arc<dyn MeterProvider>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.delegate.is_some() {
            handle_error(MetricsError::AlreadyDelegated);
            return;
        }
        inner.delegate = Some(provider.clone());
        for m in inner.meters.drain(..) {
            m.set_delegate(&provider);
        }
    }
}

impl Default for DelegatingMeterProvider {
    fn default() -> Self {
        DelegatingMeterProvider::new()
    }
}

impl MeterProvider for DelegatingMeterProvider {
    fn meter(&self, name: &str) -> Meter {
        let mut inner = self.inner.lock().unwrap();
        if let Some(delegate) = &inner.delegate {
            return delegate.meter(name);
        }
        let core = Arc::new(DelegatingMeterCore::new(name));
        inner.meters.push(core.clone());
        Meter::new(name, core as Arc<dyn MeterCore>)
    }
}

struct MeterInner {
    sync_insts: Vec<Arc<DelegatingSyncInstrument>>,
    async_insts: Vec<Arc<DelegatingAsyncInstrument>>,
}

struct DelegatingMeterCore {
    name: String,
    delegate: OnceLock<Arc<dyn MeterCore>>,
    inner: Mutex<MeterInner>,
}

impl DelegatingMeterCore {
    fn new(name: &str) -> Self {
        DelegatingMeterCore {
            name: name.to_string(),
            delegate: OnceLock::new(),
            inner: Mutex::new(MeterInner {
                sync_insts: Vec::new(),
                async_insts: Vec::new(),
            }),
        }
    }

    fn set_delegate(&self, provider: &Arc<dyn MeterProvider>) {
        // the meter lock serializes against instrument construction, so
        // a racing constructor sees either "buffered" or "delegated"
        let mut inner = self.inner.lock().unwrap();
        let real = provider.meter(&self.name);
        let core = real.core().clone();
        let _ = self.delegate.set(core.clone());

        for inst in inner.sync_insts.drain(..) {
            inst.set_delegate(&core);
        }
        for obs in inner.async_insts.drain(..) {
            obs.set_delegate(&core);
        }
    }
}

impl MeterCore for DelegatingMeterCore {
    fn new_sync_instrument(
        &self,
        descriptor: Descriptor,
    ) -> Result<Arc<dyn SyncInstrumentCore>, MetricsError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(delegate) = self.delegate.get() {
            return delegate.new_sync_instrument(descriptor);
        }
        let inst = Arc::new(DelegatingSyncInstrument {
            descriptor,
            delegate: Arc::new(OnceLock::new()),
        });
        inner.sync_insts.push(inst.clone());
        Ok(inst)
    }

    fn new_async_instrument(
        &self,
        descriptor: Descriptor,
        callback: ObserverCallback,
    ) -> Result<Arc<dyn AsyncInstrumentCore>, MetricsError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(delegate) = self.delegate.get() {
            return delegate.new_async_instrument(descriptor, callback);
        }
        let inst = Arc::new(DelegatingAsyncInstrument {
            descriptor,
            callback,
            delegate: OnceLock::new(),
        });
        inner.async_insts.push(inst.clone());
        Ok(inst)
    }

    fn record_batch(&self, labels: &LabelSet, measurements: &[Measurement]) {
        if let Some(delegate) = self.delegate.get() {
            delegate.record_batch(labels, measurements)
        }
    }
}

/// Forwarder for one synchronous instrument. The descriptor is the
/// entire construction state, so re-homing against the real meter needs
/// nothing else.
struct DelegatingSyncInstrument {
    descriptor: Descriptor,
    delegate: Arc<OnceLock<Arc<dyn SyncInstrumentCore>>>,
}

impl DelegatingSyncInstrument {
    fn set_delegate(&self, core: &Arc<dyn MeterCore>) {
        match core.new_sync_instrument(self.descriptor.clone()) {
            Ok(real) => {
                let _ = self.delegate.set(real);
            }
            Err(e) => handle_error(e),
        }
    }
}

impl InstrumentCore for DelegatingSyncInstrument {
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }
}

impl SyncInstrumentCore for DelegatingSyncInstrument {
    fn bind(&self, labels: &LabelSet) -> Arc<dyn BoundSyncInstrumentCore> {
        if let Some(delegate) = self.delegate.get() {
            return delegate.bind(labels);
        }
        Arc::new(DelegatingBoundInstrument {
            labels: labels.clone(),
            inst_delegate: self.delegate.clone(),
            resolved: OnceLock::new(),
        })
    }

    fn record_one(&self, value: Number, labels: &LabelSet) {
        if let Some(delegate) = self.delegate.get() {
            delegate.record_one(value, labels)
        }
    }
}

/// A handle bound before delegation. It holds the pending label values
/// and lazily re-resolves a real bound handle exactly once on first use
/// after delegation, so there is no duplicate bind.
struct DelegatingBoundInstrument {
    labels: LabelSet,
    inst_delegate: Arc<OnceLock<Arc<dyn SyncInstrumentCore>>>,
    resolved: OnceLock<Option<Arc<dyn BoundSyncInstrumentCore>>>,
}

impl BoundSyncInstrumentCore for DelegatingBoundInstrument {
    fn record_one(&self, value: Number) {
        let Some(inst) = self.inst_delegate.get() else {
            return;
        };
        let resolved = self.resolved.get_or_init(|| Some(inst.bind(&self.labels)));
        if let Some(bound) = resolved {
            bound.record_one(value)
        }
    }

    fn unbind(&self) {
        // resolving to None here keeps a later record_one from binding
        // a handle that was already released
        let resolved = self.resolved.get_or_init(|| None);
        if let Some(bound) = resolved {
            bound.unbind()
        }
    }
}

struct DelegatingAsyncInstrument {
    descriptor: Descriptor,
    callback: ObserverCallback,
    delegate: OnceLock<Arc<dyn AsyncInstrumentCore>>,
}

impl DelegatingAsyncInstrument {
    fn set_delegate(&self, core: &Arc<dyn MeterCore>) {
        match core.new_async_instrument(self.descriptor.clone(), self.callback.clone()) {
            Ok(real) => {
                let _ = self.delegate.set(real);
            }
            Err(e) => handle_error(e),
        }
    }
}

impl InstrumentCore for DelegatingAsyncInstrument {
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }
}

impl AsyncInstrumentCore for DelegatingAsyncInstrument {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TestState {
        records: Mutex<Vec<(String, Number, String)>>,
        binds: AtomicUsize,
        async_names: Mutex<Vec<String>>,
    }

    struct TestProvider {
        state: Arc<TestState>,
    }

    impl MeterProvider for TestProvider {
        fn meter(&self, name: &str) -> Meter {
            Meter::new(
                name,
                Arc::new(TestMeterCore {
                    state: self.state.clone(),
                }),
            )
        }
    }

    struct TestMeterCore {
        state: Arc<TestState>,
    }

    impl MeterCore for TestMeterCore {
        fn new_sync_instrument(
            &self,
            descriptor: Descriptor,
        ) -> Result<Arc<dyn SyncInstrumentCore>, MetricsError> {
            Ok(Arc::new(TestSyncInstrument {
                descriptor,
                state: self.state.clone(),
            }))
        }

        fn new_async_instrument(
            &self,
            descriptor: Descriptor,
            _callback: ObserverCallback,
        ) -> Result<Arc<dyn AsyncInstrumentCore>, MetricsError> {
            self.state
                .async_names
                .lock()
                .unwrap()
                .push(descriptor.name().to_string());
            Ok(Arc::new(TestAsyncInstrument { descriptor }))
        }

        fn record_batch(&self, labels: &LabelSet, measurements: &[Measurement]) {
            for m in measurements {
                m.instrument().record_one(m.number(), labels);
            }
        }
    }

    struct TestSyncInstrument {
        descriptor: Descriptor,
        state: Arc<TestState>,
    }

    impl InstrumentCore for TestSyncInstrument {
        fn descriptor(&self) -> &Descriptor {
            &self.descriptor
        }
    }

    impl SyncInstrumentCore for TestSyncInstrument {
        fn bind(&self, labels: &LabelSet) -> Arc<dyn BoundSyncInstrumentCore> {
            self.state.binds.fetch_add(1, Ordering::SeqCst);
            Arc::new(TestBoundInstrument {
                name: self.descriptor.name().to_string(),
                labels: labels.clone(),
                state: self.state.clone(),
            })
        }

        fn record_one(&self, value: Number, labels: &LabelSet) {
            self.state.records.lock().unwrap().push((
                self.descriptor.name().to_string(),
                value,
                labels.encoded().to_string(),
            ));
        }
    }

    struct TestBoundInstrument {
        name: String,
        labels: LabelSet,
        state: Arc<TestState>,
    }

    impl BoundSyncInstrumentCore for TestBoundInstrument {
        fn record_one(&self, value: Number) {
            self.state.records.lock().unwrap().push((
                self.name.clone(),
                value,
                self.labels.encoded().to_string(),
            ));
        }

        fn unbind(&self) {}
    }

    struct TestAsyncInstrument {
        descriptor: Descriptor,
    }

    impl InstrumentCore for TestAsyncInstrument {
        fn descriptor(&self) -> &Descriptor {
            &self.descriptor
        }
    }

    impl AsyncInstrumentCore for TestAsyncInstrument {}

    fn test_provider() -> (Arc<TestState>, Arc<dyn MeterProvider>) {
        let state = Arc::new(TestState::default());
        let provider = Arc::new(TestProvider {
            state: state.clone(),
        });
        (state, provider)
    }

    #[test]
    fn buffered_counter_routes_after_delegation() {
        let global = DelegatingMeterProvider::new();
        let meter = global.meter("test");
        let counter = meter.i64_counter("requests").unwrap();
        let labels = LabelSet::from_kvs([KeyValue::new("a", "b")]);

        // pre-delegation updates are dropped
        counter.add(5i64, &labels);

        let (state, provider) = test_provider();
        global.set_delegate(provider);

        counter.add(7i64, &labels);

        let records = state.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], ("requests".to_string(), Number::Signed(7), "a=b".to_string()));
    }

    #[test]
    fn bound_handle_binds_exactly_once() {
        let global = DelegatingMeterProvider::new();
        let meter = global.meter("test");
        let counter = meter.i64_counter("hits").unwrap();
        let labels = LabelSet::from_kvs([KeyValue::new("k", "v")]);

        let bound = counter.bind(&labels);
        bound.add(1i64); // dropped, not yet delegated

        let (state, provider) = test_provider();
        global.set_delegate(provider);

        bound.add(2i64);
        bound.add(3i64);

        assert_eq!(state.binds.load(Ordering::SeqCst), 1);
        let records = state.records.lock().unwrap();
        let values: Vec<i64> = records.iter().map(|(_, n, _)| n.as_i64()).collect();
        assert_eq!(values, vec![2, 3]);
    }

    #[test]
    fn buffered_observer_reconstructed_on_delegation() {
        let global = DelegatingMeterProvider::new();
        let meter = global.meter("test");
        let _obs = meter
            .i64_observer("queue_depth", |result| {
                result.observe(4i64, &LabelSet::empty());
                Ok(())
            })
            .unwrap();

        let (state, provider) = test_provider();
        global.set_delegate(provider);

        let names = state.async_names.lock().unwrap();
        assert_eq!(names.as_slice(), ["queue_depth"]);
    }

    #[test]
    fn meters_after_delegation_are_real() {
        let global = DelegatingMeterProvider::new();
        let (state, provider) = test_provider();
        global.set_delegate(provider);

        let meter = global.meter("late");
        let counter = meter.i64_counter("c").unwrap();
        counter.add(1i64, &LabelSet::empty());

        assert_eq!(state.records.lock().unwrap().len(), 1);
    }

    #[test]
    fn second_delegate_is_ignored() {
        let global = DelegatingMeterProvider::new();
        let meter = global.meter("test");
        let counter = meter.i64_counter("c").unwrap();

        let (first_state, first) = test_provider();
        let (second_state, second) = test_provider();
        global.set_delegate(first);
        global.set_delegate(second);

        counter.add(1i64, &LabelSet::empty());
        assert_eq!(first_state.records.lock().unwrap().len(), 1);
        assert!(second_state.records.lock().unwrap().is_empty());
    }

    #[test]
    fn unbind_before_delegation_blocks_late_bind() {
        let global = DelegatingMeterProvider::new();
        let meter = global.meter("test");
        let counter = meter.i64_counter("c").unwrap();
        let bound = counter.bind(&LabelSet::empty());
        drop(bound); // unbinds while undelegated

        let (state, provider) = test_provider();
        global.set_delegate(provider);
        assert_eq!(state.binds.load(Ordering::SeqCst), 0);
    }
}
