/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use log::trace;

use spyglass_api::{
    AsyncInstrumentCore, BoundSyncInstrumentCore, Descriptor, InstrumentCore, LabelSet,
    Measurement, Meter, MeterCore, MeterProvider, MetricsError, Number, ObserverCallback,
    ObserverResult, SyncInstrumentCore, handle_error,
};

use crate::aggregator::Aggregator;
use crate::export::{AggregationSelector, Batcher, ExportRecord};

static NEXT_INSTRUMENT_ID: AtomicUsize = AtomicUsize::new(1);

fn next_instrument_id() -> usize {
    NEXT_INSTRUMENT_ID.fetch_add(1, Ordering::Relaxed)
}

/// The metrics SDK core: a registry of live aggregation records swept by
/// a single collector context per pass.
///
/// Arbitrary instrumentation call-sites update records concurrently at
/// all times; exactly one collector runs `collect` at a time. Records
/// keep a reference count for bound handles and an update counter for
/// staleness: a record survives a sweep if it is still referenced or was
/// updated since the previous sweep, and is removed on the first sweep
/// that finds it both unreferenced and idle.
#[derive(Clone)]
pub struct Accumulator {
    core: Arc<AccumulatorCore>,
}

impl Accumulator {
    pub fn new(selector: Arc<dyn AggregationSelector>) -> Self {
        let core = Arc::new_cyclic(|weak| AccumulatorCore {
            self_weak: weak.clone(),
            selector,
            records: Mutex::new(AHashMap::new()),
            asyncs: Mutex::new(Vec::new()),
            collect_state: Mutex::new(CollectState {
                epoch: 0,
                last_collect: Utc::now(),
            }),
        });
        Accumulator { core }
    }

    pub fn meter(&self, name: &str) -> Meter {
        Meter::new(name, self.core.clone() as Arc<dyn MeterCore>)
    }

    /// Run one collection pass, feeding checkpointed records to the
    /// batcher. Returns the number of records processed.
    ///
    /// Non-reentrant: a call while another pass is running is reported
    /// through the error sink and collects nothing.
    pub fn collect(&self, batcher: &mut dyn Batcher) -> usize {
        let mut st = match self.core.collect_state.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                handle_error(MetricsError::ConcurrentCollect);
                return 0;
            }
        };
        st.epoch += 1;
        let start = st.last_collect;
        let end = Utc::now();

        let mut count = self.core.observe_asyncs(st.epoch, start, end, batcher);
        count += self.core.sweep_records(start, end, batcher);

        st.last_collect = end;
        trace!("collection pass {} processed {count} records", st.epoch);
        count
    }

    /// Number of live records in the registry.
    pub fn records_len(&self) -> usize {
        self.core.records.lock().unwrap().len()
    }
}

impl MeterProvider for Accumulator {
    fn meter(&self, name: &str) -> Meter {
        Accumulator::meter(self, name)
    }
}

struct CollectState {
    epoch: u64,
    last_collect: DateTime<Utc>,
}

#[derive(Hash, PartialEq, Eq)]
struct MapKey {
    instrument_id: usize,
    labels: LabelSet,
}

struct AccumulatorCore {
    self_weak: Weak<AccumulatorCore>,
    selector: Arc<dyn AggregationSelector>,
    records: Mutex<AHashMap<MapKey, Arc<Record>>>,
    asyncs: Mutex<Vec<Arc<AsyncInstrument>>>,
    collect_state: Mutex<CollectState>,
}

impl AccumulatorCore {
    /// Look up or create the record for one (instrument, label-set)
    /// pair, taking a reference on it. Insert-if-absent runs under the
    /// registry lock, so a racing creator either wins or adopts the
    /// winner's record. Returns `None` when aggregation is disabled for
    /// the instrument.
    fn acquire_record(&self, inst: &SyncInstrument, labels: &LabelSet) -> Option<Arc<Record>> {
        let key = MapKey {
            instrument_id: inst.id,
            labels: labels.clone(),
        };
        let mut map = self.records.lock().unwrap();
        if let Some(rec) = map.get(&key) {
            rec.ref_count.fetch_add(1, Ordering::AcqRel);
            return Some(rec.clone());
        }

        let current = self.selector.aggregator_for(&inst.descriptor)?;
        let checkpoint = current.clone_empty();
        let rec = Arc::new(Record {
            descriptor: inst.descriptor.clone(),
            labels: labels.clone(),
            current: Arc::new(current),
            checkpoint: Arc::new(checkpoint),
            ref_count: AtomicUsize::new(1),
            update_count: AtomicU64::new(0),
            collected_count: AtomicU64::new(0),
        });
        map.insert(key, rec.clone());
        Some(rec)
    }

    fn sweep_records(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        batcher: &mut dyn Batcher,
    ) -> usize {
        let mut map = self.records.lock().unwrap();
        let mut emitted = 0;
        map.retain(|_, rec| {
            let mods = rec.update_count.load(Ordering::Acquire);
            let collected = rec.collected_count.load(Ordering::Relaxed);
            if mods == collected {
                // idle since the previous pass: no checkpoint, and the
                // record is reclaimed once nothing references it
                return rec.ref_count.load(Ordering::Acquire) != 0;
            }

            // the pre-move count is stored deliberately: an update that
            // lands between the load and the move is checkpointed now
            // but counted next pass, which at worst emits one empty
            // checkpoint then. storing a post-move re-load instead could
            // mark an uncollected update as collected and lose it.
            rec.collected_count.store(mods, Ordering::Relaxed);
            if let Err(e) = rec.current.synchronized_move(&rec.checkpoint) {
                handle_error(e);
                return true;
            }
            let export = ExportRecord::new(
                rec.descriptor.clone(),
                rec.labels.clone(),
                rec.checkpoint.clone(),
                start,
                end,
            );
            match batcher.process(export) {
                Ok(()) => emitted += 1,
                Err(e) => handle_error(e),
            }
            true
        });
        emitted
    }

    fn observe_asyncs(
        &self,
        epoch: u64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        batcher: &mut dyn Batcher,
    ) -> usize {
        let asyncs = self.asyncs.lock().unwrap().clone();
        let mut emitted = 0;
        for inst in asyncs {
            let mut result = ObserverResult::new();
            match (inst.callback)(&mut result) {
                Ok(()) => inst.apply(result, epoch, self.selector.as_ref()),
                Err(e) => {
                    // this instrument's partial results are dropped, the
                    // pass continues for the others
                    handle_error(MetricsError::Other(e));
                }
            }
            emitted += inst.checkpoint(epoch, start, end, batcher);
        }
        emitted
    }
}

impl MeterCore for AccumulatorCore {
    fn new_sync_instrument(
        &self,
        descriptor: Descriptor,
    ) -> Result<Arc<dyn SyncInstrumentCore>, MetricsError> {
        Ok(Arc::new(SyncInstrument {
            id: next_instrument_id(),
            descriptor: Arc::new(descriptor),
            core: self.self_weak.clone(),
        }))
    }

    fn new_async_instrument(
        &self,
        descriptor: Descriptor,
        callback: ObserverCallback,
    ) -> Result<Arc<dyn AsyncInstrumentCore>, MetricsError> {
        let inst = Arc::new(AsyncInstrument {
            descriptor: Arc::new(descriptor),
            callback,
            recorders: Mutex::new(AHashMap::new()),
        });
        self.asyncs.lock().unwrap().push(inst.clone());
        Ok(inst)
    }

    fn record_batch(&self, labels: &LabelSet, measurements: &[Measurement]) {
        for m in measurements {
            m.instrument().record_one(m.number(), labels);
        }
    }
}

/// The registry entry for one (instrument, label-set) pair.
struct Record {
    descriptor: Arc<Descriptor>,
    labels: LabelSet,
    // written by concurrent updaters
    current: Arc<Aggregator>,
    // written only during collection
    checkpoint: Arc<Aggregator>,
    ref_count: AtomicUsize,
    update_count: AtomicU64,
    // collector-only
    collected_count: AtomicU64,
}

impl Record {
    fn update(&self, value: Number) {
        if let Err(e) = self.current.update(value, &self.descriptor) {
            handle_error(e);
            return;
        }
        self.update_count.fetch_add(1, Ordering::Release);
    }

    fn release(&self) {
        self.ref_count.fetch_sub(1, Ordering::AcqRel);
    }
}

struct SyncInstrument {
    id: usize,
    descriptor: Arc<Descriptor>,
    core: Weak<AccumulatorCore>,
}

impl InstrumentCore for SyncInstrument {
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }
}

impl SyncInstrumentCore for SyncInstrument {
    fn bind(&self, labels: &LabelSet) -> Arc<dyn BoundSyncInstrumentCore> {
        let record = self
            .core
            .upgrade()
            .and_then(|core| core.acquire_record(self, labels));
        Arc::new(BoundInstrument { record })
    }

    fn record_one(&self, value: Number, labels: &LabelSet) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        let Some(record) = core.acquire_record(self, labels) else {
            return;
        };
        record.update(value);
        record.release();
    }
}

/// A handle caching the record lookup. `record_one` touches only the
/// record's aggregator, which is the dominant hot path.
struct BoundInstrument {
    record: Option<Arc<Record>>,
}

impl BoundSyncInstrumentCore for BoundInstrument {
    fn record_one(&self, value: Number) {
        if let Some(rec) = &self.record {
            rec.update(value);
        }
    }

    fn unbind(&self) {
        if let Some(rec) = &self.record {
            rec.release();
        }
    }
}

struct ObserverRecorder {
    current: Arc<Aggregator>,
    checkpoint: Arc<Aggregator>,
    observed_epoch: u64,
}

struct AsyncInstrument {
    descriptor: Arc<Descriptor>,
    callback: ObserverCallback,
    recorders: Mutex<AHashMap<LabelSet, ObserverRecorder>>,
}

impl AsyncInstrument {
    fn apply(&self, result: ObserverResult, epoch: u64, selector: &dyn AggregationSelector) {
        use std::collections::hash_map::Entry;

        let mut recorders = self.recorders.lock().unwrap();
        for (value, labels) in result.into_observations() {
            let rec = match recorders.entry(labels) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let Some(current) = selector.aggregator_for(&self.descriptor) else {
                        return;
                    };
                    let checkpoint = current.clone_empty();
                    entry.insert(ObserverRecorder {
                        current: Arc::new(current),
                        checkpoint: Arc::new(checkpoint),
                        observed_epoch: epoch,
                    })
                }
            };
            if let Err(e) = rec.current.update(value, &self.descriptor) {
                handle_error(e);
                continue;
            }
            rec.observed_epoch = epoch;
        }
    }

    fn checkpoint(
        &self,
        epoch: u64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        batcher: &mut dyn Batcher,
    ) -> usize {
        let mut recorders = self.recorders.lock().unwrap();
        let mut emitted = 0;
        recorders.retain(|labels, rec| {
            if rec.observed_epoch == epoch {
                if let Err(e) = rec.current.synchronized_move(&rec.checkpoint) {
                    handle_error(e);
                    return true;
                }
                let export = ExportRecord::new(
                    self.descriptor.clone(),
                    labels.clone(),
                    rec.checkpoint.clone(),
                    start,
                    end,
                );
                match batcher.process(export) {
                    Ok(()) => emitted += 1,
                    Err(e) => handle_error(e),
                }
                return true;
            }
            // a recorder not observed this pass is kept one more epoch,
            // then reclaimed
            rec.observed_epoch + 1 >= epoch
        });
        emitted
    }
}

impl InstrumentCore for AsyncInstrument {
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }
}

impl AsyncInstrumentCore for AsyncInstrument {}
