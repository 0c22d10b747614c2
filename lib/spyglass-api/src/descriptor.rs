/*
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::NumberKind;

/// The kind of an instrument.
///
/// `Counter` and `Measure` are synchronous, updated from instrumentation
/// call sites. `Observer` is asynchronous, read through a registered
/// callback once per collection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    Counter,
    Measure,
    Observer,
}

impl InstrumentKind {
    pub fn is_sync(&self) -> bool {
        matches!(self, InstrumentKind::Counter | InstrumentKind::Measure)
    }

    pub fn is_async(&self) -> bool {
        matches!(self, InstrumentKind::Observer)
    }

    /// Monotonic instruments reject negative updates.
    pub fn is_monotonic(&self) -> bool {
        matches!(self, InstrumentKind::Counter)
    }
}

/// Immutable metadata describing an instrument.
///
/// Built once when the instrument is constructed and shared by every
/// record of that instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    name: String,
    instrument_kind: InstrumentKind,
    number_kind: NumberKind,
    description: String,
    unit: String,
    keys: Vec<String>,
}

impl Descriptor {
    pub fn new(
        name: impl Into<String>,
        instrument_kind: InstrumentKind,
        number_kind: NumberKind,
    ) -> Self {
        Descriptor {
            name: name.into(),
            instrument_kind,
            number_kind,
            description: String::new(),
            unit: String::new(),
            keys: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Set the recommended aggregation keys for this instrument.
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = keys.into_iter().map(|k| k.into()).collect();
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn instrument_kind(&self) -> InstrumentKind {
        self.instrument_kind
    }

    #[inline]
    pub fn number_kind(&self) -> NumberKind {
        self.number_kind
    }

    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    #[inline]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}
