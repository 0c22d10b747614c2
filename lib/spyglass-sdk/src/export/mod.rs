/*
 * SPDX-License-Identifier: Apache-2.0
 */

//! Contracts between the accumulator, batchers and exporters.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use spyglass_api::{Descriptor, LabelSet, MetricsError};

use crate::aggregator::Aggregator;

/// Chooses the aggregator strategy for an instrument. Returning `None`
/// disables collection for that instrument.
pub trait AggregationSelector: Send + Sync {
    fn aggregator_for(&self, descriptor: &Descriptor) -> Option<Aggregator>;
}

/// Custom label serialization supplied by an exporter, to avoid
/// double-encoding on the way out.
pub trait LabelEncoder: Send + Sync {
    fn encode(&self, labels: &LabelSet) -> String;
}

/// The stable `key=value,...` encoding.
pub struct DefaultLabelEncoder;

impl LabelEncoder for DefaultLabelEncoder {
    fn encode(&self, labels: &LabelSet) -> String {
        labels.encoded().to_string()
    }
}

/// One checkpointed aggregation, the unit exporters consume.
#[derive(Clone)]
pub struct ExportRecord {
    descriptor: Arc<Descriptor>,
    labels: LabelSet,
    aggregator: Arc<Aggregator>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ExportRecord {
    pub fn new(
        descriptor: Arc<Descriptor>,
        labels: LabelSet,
        aggregator: Arc<Aggregator>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        ExportRecord {
            descriptor,
            labels,
            aggregator,
            start,
            end,
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    #[inline]
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    #[inline]
    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    #[inline]
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    #[inline]
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub(crate) fn descriptor_arc(&self) -> &Arc<Descriptor> {
        &self.descriptor
    }

    pub(crate) fn set_end(&mut self, end: DateTime<Utc>) {
        self.end = end;
    }
}

/// The post-collection snapshot handed to exporters.
///
/// Read-only, valid until the next collection pass begins.
pub struct CheckpointSet {
    pub(crate) resource: LabelSet,
    pub(crate) encoder: Arc<dyn LabelEncoder>,
    pub(crate) records: Vec<ExportRecord>,
}

impl CheckpointSet {
    pub fn new(resource: LabelSet) -> Self {
        CheckpointSet {
            resource,
            encoder: Arc::new(DefaultLabelEncoder),
            records: Vec::new(),
        }
    }

    /// The resource labels shared by every record in this set.
    #[inline]
    pub fn resource(&self) -> &LabelSet {
        &self.resource
    }

    /// The label encoder exporters should serialize with.
    #[inline]
    pub fn label_encoder(&self) -> &dyn LabelEncoder {
        self.encoder.as_ref()
    }

    /// A record's labels in the configured encoding.
    pub fn encoded_labels(&self, record: &ExportRecord) -> String {
        self.encoder.encode(record.labels())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExportRecord> {
        self.records.iter()
    }
}

/// Groups checkpointed records into a [`CheckpointSet`].
///
/// Driven by the single collector context: `start_collection` opens a
/// pass, `process` is called once per checkpointed record, and the
/// resulting set stays valid until the next `start_collection`.
pub trait Batcher: Send {
    fn start_collection(&mut self);

    fn process(&mut self, record: ExportRecord) -> Result<(), MetricsError>;

    fn checkpoint_set(&mut self) -> &CheckpointSet;

    /// Resource labels attached to every produced checkpoint set.
    fn set_resource(&mut self, resource: LabelSet);
}

/// Consumes checkpoint sets at the end of a push cycle. Implementations
/// translate to a wire format; they must honor cancellation and return
/// promptly on shutdown.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, checkpoint: &CheckpointSet) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use spyglass_api::KeyValue;

    #[test]
    fn default_encoder_reuses_stable_encoding() {
        let labels = LabelSet::from_kvs([KeyValue::new("b", "x"), KeyValue::new("a", 1i64)]);
        assert_eq!(DefaultLabelEncoder.encode(&labels), "a=1,b=x");
    }
}
