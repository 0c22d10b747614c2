/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::cmp::Ordering;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use spyglass_api::{MetricsError, Number};

/// Appends every observed value with its timestamp.
///
/// Memory grows with the number of updates per checkpoint window; the
/// payoff is exact quantile computation downstream.
pub struct Exact {
    inner: Mutex<Vec<(Number, DateTime<Utc>)>>,
}

impl Exact {
    pub fn new() -> Self {
        Exact {
            inner: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> u64 {
        self.inner.lock().unwrap().len() as u64
    }

    pub fn points(&self) -> Vec<(Number, DateTime<Utc>)> {
        self.inner.lock().unwrap().clone()
    }

    /// Exact quantile over the checkpointed points, using the
    /// nearest-rank convention: the smallest value whose rank is at
    /// least `q * count`.
    pub fn quantile(&self, q: f64) -> Result<Number, MetricsError> {
        if !(0.0..=1.0).contains(&q) {
            return Err(MetricsError::InvalidQuantile);
        }
        let inner = self.inner.lock().unwrap();
        if inner.is_empty() {
            return Err(MetricsError::NoData);
        }
        let mut values: Vec<Number> = inner.iter().map(|(v, _)| *v).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let rank = (q * values.len() as f64).ceil() as usize;
        Ok(values[rank.clamp(1, values.len()) - 1])
    }

    pub(super) fn update(&self, value: Number) {
        self.inner.lock().unwrap().push((value, Utc::now()));
    }

    pub(super) fn move_to(&self, dest: &Exact) {
        let moved = std::mem::take(&mut *self.inner.lock().unwrap());
        *dest.inner.lock().unwrap() = moved;
    }

    pub(super) fn merge(&self, other: &Exact) {
        let other_points = other.inner.lock().unwrap().clone();
        self.inner.lock().unwrap().extend(other_points);
    }
}

impl Default for Exact {
    fn default() -> Self {
        Exact::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_in_order() {
        let agg = Exact::new();
        for v in [5i64, 1, 3] {
            agg.update(Number::Signed(v));
        }
        let values: Vec<i64> = agg.points().iter().map(|(v, _)| v.as_i64()).collect();
        assert_eq!(values, vec![5, 1, 3]);
    }

    #[test]
    fn exact_quantiles() {
        let agg = Exact::new();
        for v in 1..=100i64 {
            agg.update(Number::Signed(v));
        }
        assert_eq!(agg.quantile(0.0).unwrap(), Number::Signed(1));
        assert_eq!(agg.quantile(0.5).unwrap(), Number::Signed(50));
        assert_eq!(agg.quantile(1.0).unwrap(), Number::Signed(100));
        assert!(matches!(
            agg.quantile(1.5),
            Err(MetricsError::InvalidQuantile)
        ));
    }

    #[test]
    fn quantile_uses_nearest_rank() {
        let agg = Exact::new();
        for v in [10i64, 20, 30, 40] {
            agg.update(Number::Signed(v));
        }
        // rank = ceil(q * 4), clamped to [1, 4]
        assert_eq!(agg.quantile(0.0).unwrap(), Number::Signed(10));
        assert_eq!(agg.quantile(0.25).unwrap(), Number::Signed(10));
        assert_eq!(agg.quantile(0.5).unwrap(), Number::Signed(20));
        assert_eq!(agg.quantile(0.51).unwrap(), Number::Signed(30));
        assert_eq!(agg.quantile(0.75).unwrap(), Number::Signed(30));
        assert_eq!(agg.quantile(1.0).unwrap(), Number::Signed(40));
    }

    #[test]
    fn empty_quantile_is_no_data() {
        let agg = Exact::new();
        assert!(matches!(agg.quantile(0.5), Err(MetricsError::NoData)));
    }

    #[test]
    fn move_then_merge_concatenates() {
        let a = Exact::new();
        let b = Exact::new();
        a.update(Number::Signed(1));
        b.update(Number::Signed(2));
        b.update(Number::Signed(3));

        a.merge(&b);
        assert_eq!(a.count(), 3);
        // the merged-from side is untouched
        assert_eq!(b.count(), 2);

        let checkpoint = Exact::new();
        a.move_to(&checkpoint);
        assert_eq!(checkpoint.count(), 3);
        assert_eq!(a.count(), 0);
    }
}
