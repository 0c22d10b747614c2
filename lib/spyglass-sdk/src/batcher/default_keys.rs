/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use ahash::AHashMap;

use spyglass_api::{LabelSet, MetricsError};

use crate::export::{Batcher, CheckpointSet, ExportRecord, LabelEncoder};

#[derive(Hash, PartialEq, Eq)]
struct GroupKey {
    instrument: String,
    labels: LabelSet,
}

/// Groups records by each instrument's recommended keys.
///
/// Incoming label sets are projected onto the descriptor's key list, so
/// records differing only in non-recommended dimensions fold into one
/// entry. Entries always own their aggregator since distinct checkpoints
/// merge into them within a single pass.
pub struct DefaultKeysBatcher {
    stateful: bool,
    batch: AHashMap<GroupKey, ExportRecord>,
    checkpoint: CheckpointSet,
}

impl DefaultKeysBatcher {
    pub fn stateless() -> Self {
        DefaultKeysBatcher::new(false)
    }

    pub fn stateful() -> Self {
        DefaultKeysBatcher::new(true)
    }

    fn new(stateful: bool) -> Self {
        DefaultKeysBatcher {
            stateful,
            batch: AHashMap::new(),
            checkpoint: CheckpointSet::new(LabelSet::empty()),
        }
    }

    /// Override the label encoding exporters read off the checkpoint
    /// set.
    pub fn with_encoder(mut self, encoder: Arc<dyn LabelEncoder>) -> Self {
        self.checkpoint.encoder = encoder;
        self
    }
}

impl Batcher for DefaultKeysBatcher {
    fn start_collection(&mut self) {
        if !self.stateful {
            self.batch.clear();
        }
    }

    fn process(&mut self, record: ExportRecord) -> Result<(), MetricsError> {
        let grouped = record.labels().project(record.descriptor().keys());
        let key = GroupKey {
            instrument: record.descriptor().name().to_string(),
            labels: grouped.clone(),
        };
        match self.batch.get_mut(&key) {
            Some(existing) => {
                existing.aggregator().merge(record.aggregator())?;
                existing.set_end(record.end());
            }
            None => {
                let owned = record.aggregator().clone_empty();
                owned.merge(record.aggregator())?;
                let entry = ExportRecord::new(
                    record.descriptor_arc().clone(),
                    grouped,
                    Arc::new(owned),
                    record.start(),
                    record.end(),
                );
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
