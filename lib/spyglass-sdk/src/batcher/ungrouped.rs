/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use ahash::AHashMap;

use spyglass_api::{LabelSet, MetricsError};

use crate::export::{Batcher, CheckpointSet, ExportRecord, LabelEncoder};

#[derive(Hash, PartialEq, Eq)]
struct BatchKey {
    instrument: String,
    labels: LabelSet,
}

/// Passes records through with their full label sets.
///
/// Each (instrument, label-set) pair maps to one entry per checkpoint
/// set. Colliding checkpoints are merged into an owned aggregator, never
/// into the shared one produced by the collection pass.
pub struct UngroupedBatcher {
    stateful: bool,
    batch: AHashMap<BatchKey, ExportRecord>,
    checkpoint: CheckpointSet,
}

impl UngroupedBatcher {
    /// Delta semantics: each checkpoint set covers one interval.
    pub fn stateless() -> Self {
        UngroupedBatcher::new(false)
    }

    /// Cumulative semantics: checkpoints merge into retained state.
    pub fn stateful() -> Self {
        UngroupedBatcher::new(true)
    }

    fn new(stateful: bool) -> Self {
        UngroupedBatcher {
            stateful,
            batch: AHashMap::new(),
            checkpoint: CheckpointSet::new(LabelSet::empty()),
        }
    }

    /// Override the label encoding exporters read off the checkpoint
    /// set, so an exporter with its own wire format does not re-encode.
    pub fn with_encoder(mut self, encoder: Arc<dyn LabelEncoder>) -> Self {
        self.checkpoint.encoder = encoder;
        self
    }
}

impl Batcher for UngroupedBatcher {
    fn start_collection(&mut self) {
        if !self.stateful {
            self.batch.clear();
        }
    }

    fn process(&mut self, record: ExportRecord) -> Result<(), MetricsError> {
        let key = BatchKey {
            instrument: record.descriptor().name().to_string(),
            labels: record.labels().clone(),
        };
        match self.batch.get_mut(&key) {
            Some(existing) if self.stateful => {
                // retained entries are owned, merge in place
                existing.aggregator().merge(record.aggregator())?;
                existing.set_end(record.end());
            }
            Some(existing) => {
                // a stateless entry may alias the collector's checkpoint
                // slot, rebuild an owned one before merging
                let owned = existing.aggregator().clone_empty();
                owned.merge(existing.aggregator())?;
                owned.merge(record.aggregator())?;
                let end = record.end();
                *existing = ExportRecord::new(
                    existing.descriptor_arc().clone(),
                    existing.labels().clone(),
                    Arc::new(owned),
                    existing.start(),
                    end,
                );
            }
            None => {
                let entry = if self.stateful {
                    // own the state so later intervals merge without
                    // touching the collector's checkpoint slot
                    let owned = record.aggregator().clone_empty();
                    owned.merge(record.aggregator())?;
                    ExportRecord::new(
                        record.descriptor_arc().clone(),
                        record.labels().clone(),
                        Arc::new(owned),
                        record.start(),
                        record.end(),
                    )
                } else {
                    record
                };
                self.batch.insert(key, entry);
            }
        }
        Ok(())
    }

    fn checkpoint_set(&mut self) -> &CheckpointSet {
        self.checkpoint.records = self.batch.values().cloned().collect();
        &self.checkpoint
    }

    fn set_resource(&mut self, resource: LabelSet) {
        self.checkpoint.resource = resource;
    }
}
