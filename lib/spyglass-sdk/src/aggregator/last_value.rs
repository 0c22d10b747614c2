/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use spyglass_api::{MetricsError, Number};

/// Keeps the most temporally-recent value.
///
/// Updates carry a timestamp; the later timestamp wins even when updates
/// are applied out of program order. The empty state is distinct from a
/// legitimate zero value.
pub struct LastValue {
    inner: Mutex<Option<(Number, DateTime<Utc>)>>,
}

impl LastValue {
    pub fn new() -> Self {
        LastValue {
            inner: Mutex::new(None),
        }
    }

    /// The checkpointed value and its timestamp, or `NoData` when the
    /// aggregator was never updated.
    pub fn last_value(&self) -> Result<(Number, DateTime<Utc>), MetricsError> {
        self.inner.lock().unwrap().ok_or(MetricsError::NoData)
    }

    pub(super) fn update(&self, value: Number) {
        self.update_at(value, Utc::now())
    }

    pub(crate) fn update_at(&self, value: Number, at: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        match *inner {
            Some((_, prev)) if prev > at => {}
            _ => *inner = Some((value, at)),
        }
    }

    pub(super) fn move_to(&self, dest: &LastValue) {
        let moved = self.inner.lock().unwrap().take();
        *dest.inner.lock().unwrap() = moved;
    }

    pub(super) fn merge(&self, other: &LastValue) {
        // copy out first, the two locks are never nested
        let other_v = *other.inner.lock().unwrap();
        if let Some((value, at)) = other_v {
            self.update_at(value, at);
        }
    }
}

impl Default for LastValue {
    fn default() -> Self {
        LastValue::new()
    }
}
