/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Mutex;

use spyglass_api::{MetricsError, Number, NumberKind};

#[derive(Clone, Copy)]
struct State {
    count: u64,
    sum: Number,
    min: Number,
    max: Number,
}

/// Tracks min, max, sum and count of observed values.
///
/// One mutex guards all four fields so a checkpoint is mutually
/// consistent; a live read during concurrent updates has no coherence
/// guarantee and is not offered.
pub struct MinMaxSumCount {
    kind: NumberKind,
    inner: Mutex<Option<State>>,
}

impl MinMaxSumCount {
    pub fn new(kind: NumberKind) -> Self {
        MinMaxSumCount {
            kind,
            inner: Mutex::new(None),
        }
    }

    #[inline]
    pub fn number_kind(&self) -> NumberKind {
        self.kind
    }

    pub fn count(&self) -> u64 {
        self.inner.lock().unwrap().map_or(0, |st| st.count)
    }

    pub fn sum(&self) -> Number {
        self.inner
            .lock()
            .unwrap()
            .map_or(Number::zero(self.kind), |st| st.sum)
    }

    pub fn min(&self) -> Result<Number, MetricsError> {
        self.inner
            .lock()
            .unwrap()
            .map(|st| st.min)
            .ok_or(MetricsError::NoData)
    }

    pub fn max(&self) -> Result<Number, MetricsError> {
        self.inner
            .lock()
            .unwrap()
            .map(|st| st.max)
            .ok_or(MetricsError::NoData)
    }

    pub(super) fn update(&self, value: Number) {
        let mut inner = self.inner.lock().unwrap();
        match inner.as_mut() {
            Some(st) => {
                st.count += 1;
                st.sum += value;
                st.min = st.min.min(value);
                st.max = st.max.max(value);
            }
            None => {
                *inner = Some(State {
                    count: 1,
                    sum: value,
                    min: value,
                    max: value,
                });
            }
        }
    }

    pub(super) fn move_to(&self, dest: &MinMaxSumCount) {
        let moved = self.inner.lock().unwrap().take();
        *dest.inner.lock().unwrap() = moved;
    }

    pub(super) fn merge(&self, other: &MinMaxSumCount) {
        let Some(o) = *other.inner.lock().unwrap() else {
            return;
        };
        let mut inner = self.inner.lock().unwrap();
        match inner.as_mut() {
            Some(st) => {
                st.count += o.count;
                st.sum += o.sum;
                st.min = st.min.min(o.min);
                st.max = st.max.max(o.max);
            }
            None => *inner = Some(o),
        }
    }
}
