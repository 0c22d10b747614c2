/*
 * SPDX-License-Identifier: Apache-2.0
 */

//! Aggregator strategies.
//!
//! A closed set of kinds behind one capability surface: `update` is safe
//! for arbitrary concurrent callers on the same instance;
//! `synchronized_move` and `merge` are only ever invoked from the single
//! collector context. That single-writer/many-updaters split is the core
//! correctness argument and every implementation here preserves it.

use spyglass_api::{Descriptor, MetricsError, Number};

mod sum;
pub use sum::Sum;

mod last_value;
pub use last_value::LastValue;

mod min_max_sum_count;
pub use min_max_sum_count::MinMaxSumCount;

mod exact;
pub use exact::Exact;

mod sketch;
pub use sketch::{Sketch, SketchConfig};

pub enum Aggregator {
    Sum(Sum),
    LastValue(LastValue),
    MinMaxSumCount(MinMaxSumCount),
    Exact(Exact),
    Sketch(Sketch),
}

impl Aggregator {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Aggregator::Sum(_) => "sum",
            Aggregator::LastValue(_) => "last-value",
            Aggregator::MinMaxSumCount(_) => "min-max-sum-count",
            Aggregator::Exact(_) => "exact",
            Aggregator::Sketch(_) => "sketch",
        }
    }

    /// A fresh, empty aggregator of the same kind and configuration.
    pub fn clone_empty(&self) -> Aggregator {
        match self {
            Aggregator::Sum(a) => Aggregator::Sum(Sum::new(a.number_kind())),
            Aggregator::LastValue(_) => Aggregator::LastValue(LastValue::new()),
            Aggregator::MinMaxSumCount(a) => {
                Aggregator::MinMaxSumCount(MinMaxSumCount::new(a.number_kind()))
            }
            Aggregator::Exact(_) => Aggregator::Exact(Exact::new()),
            Aggregator::Sketch(a) => Aggregator::Sketch(a.clone_empty()),
        }
    }

    /// Apply one measurement. Safe for concurrent callers.
    pub fn update(&self, value: Number, descriptor: &Descriptor) -> Result<(), MetricsError> {
        range_test(value, descriptor)?;
        match self {
            Aggregator::Sum(a) => a.update(value),
            Aggregator::LastValue(a) => a.update(value),
            Aggregator::MinMaxSumCount(a) => a.update(value),
            Aggregator::Exact(a) => a.update(value),
            Aggregator::Sketch(a) => a.update(value),
        }
        Ok(())
    }

    /// Atomically transfer the accumulated state into `dest`, resetting
    /// self to the empty state. Collector context only.
    pub fn synchronized_move(&self, dest: &Aggregator) -> Result<(), MetricsError> {
        match (self, dest) {
            (Aggregator::Sum(a), Aggregator::Sum(d)) => a.move_to(d),
            (Aggregator::LastValue(a), Aggregator::LastValue(d)) => a.move_to(d),
            (Aggregator::MinMaxSumCount(a), Aggregator::MinMaxSumCount(d)) => a.move_to(d),
            (Aggregator::Exact(a), Aggregator::Exact(d)) => a.move_to(d),
            (Aggregator::Sketch(a), Aggregator::Sketch(d)) => a.move_to(d),
            _ => {
                return Err(MetricsError::InconsistentAggregator(
                    self.kind_name(),
                    dest.kind_name(),
                ));
            }
        }
        Ok(())
    }

    /// Combine another checkpoint of the same kind into self. Collector
    /// context only.
    pub fn merge(&self, other: &Aggregator) -> Result<(), MetricsError> {
        match (self, other) {
            (Aggregator::Sum(a), Aggregator::Sum(o)) => a.merge(o),
            (Aggregator::LastValue(a), Aggregator::LastValue(o)) => a.merge(o),
            (Aggregator::MinMaxSumCount(a), Aggregator::MinMaxSumCount(o)) => a.merge(o),
            (Aggregator::Exact(a), Aggregator::Exact(o)) => a.merge(o),
            (Aggregator::Sketch(a), Aggregator::Sketch(o)) => return a.merge(o),
            _ => {
                return Err(MetricsError::InconsistentAggregator(
                    self.kind_name(),
                    other.kind_name(),
                ));
            }
        }
        Ok(())
    }

    pub fn as_sum(&self) -> Option<&Sum> {
        match self {
            Aggregator::Sum(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_last_value(&self) -> Option<&LastValue> {
        match self {
            Aggregator::LastValue(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_min_max_sum_count(&self) -> Option<&MinMaxSumCount> {
        match self {
            Aggregator::MinMaxSumCount(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_exact(&self) -> Option<&Exact> {
        match self {
            Aggregator::Exact(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_sketch(&self) -> Option<&Sketch> {
        match self {
            Aggregator::Sketch(a) => Some(a),
            _ => None,
        }
    }
}

/// Validate one measurement against its instrument before aggregation.
fn range_test(value: Number, descriptor: &Descriptor) -> Result<(), MetricsError> {
    if value.kind() != descriptor.number_kind() {
        return Err(MetricsError::NumberKindMismatch {
            instrument: descriptor.name().to_string(),
            expected: descriptor.number_kind(),
            actual: value.kind(),
        });
    }
    if value.is_nan() {
        return Err(MetricsError::NaNInput);
    }
    if descriptor.instrument_kind().is_monotonic() && value.is_negative() {
        return Err(MetricsError::NegativeInput(descriptor.name().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spyglass_api::{InstrumentKind, NumberKind};

    fn counter_desc() -> Descriptor {
        Descriptor::new("c", InstrumentKind::Counter, NumberKind::Signed)
    }

    #[test]
    fn kind_mismatch_rejected() {
        let agg = Aggregator::Sum(Sum::new(NumberKind::Signed));
        let err = agg.update(Number::Double(1.0), &counter_desc()).unwrap_err();
        assert!(matches!(err, MetricsError::NumberKindMismatch { .. }));
    }

    #[test]
    fn nan_rejected() {
        let desc = Descriptor::new("m", InstrumentKind::Measure, NumberKind::Double);
        let agg = Aggregator::LastValue(LastValue::new());
        let err = agg.update(Number::Double(f64::NAN), &desc).unwrap_err();
        assert!(matches!(err, MetricsError::NaNInput));
    }

    #[test]
    fn negative_counter_rejected() {
        let agg = Aggregator::Sum(Sum::new(NumberKind::Signed));
        let err = agg.update(Number::Signed(-1), &counter_desc()).unwrap_err();
        assert!(matches!(err, MetricsError::NegativeInput(_)));
    }

    #[test]
    fn cross_kind_move_is_error() {
        let sum = Aggregator::Sum(Sum::new(NumberKind::Signed));
        let lv = Aggregator::LastValue(LastValue::new());
        let err = sum.synchronized_move(&lv).unwrap_err();
        assert!(matches!(err, MetricsError::InconsistentAggregator(_, _)));
    }
}
