/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Mutex;

use anyhow::anyhow;
use hdrhistogram::Histogram;

use spyglass_api::{MetricsError, Number};

/// Configuration for the [`Sketch`] aggregator.
///
/// `sigfig` is the number of significant value digits the histogram
/// maintains, bounding the relative error of reported quantiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SketchConfig {
    sigfig: u8,
}

impl SketchConfig {
    pub fn with_sigfig(sigfig: u8) -> Self {
        SketchConfig {
            sigfig: sigfig.min(5),
        }
    }

    #[inline]
    pub fn sigfig(&self) -> u8 {
        self.sigfig
    }
}

impl Default for SketchConfig {
    fn default() -> Self {
        SketchConfig { sigfig: 3 }
    }
}

/// A log-linear quantile sketch over an HDR histogram.
///
/// Values are recorded as non-negative integer units; float values are
/// rounded and clamped at zero. Quantiles carry the relative error bound
/// set by the sigfig configuration rather than being exact.
pub struct Sketch {
    inner: Mutex<Histogram<u64>>,
}

impl Sketch {
    pub fn new(config: &SketchConfig) -> Self {
        // sigfig is clamped to the supported range, construction cannot fail
        let mut h = Histogram::new(config.sigfig).unwrap();
        h.auto(true);
        Sketch {
            inner: Mutex::new(h),
        }
    }

    pub(super) fn clone_empty(&self) -> Sketch {
        let inner = self.inner.lock().unwrap();
        Sketch {
            inner: Mutex::new(Histogram::new_from(&*inner)),
        }
    }

    pub fn count(&self) -> u64 {
        self.inner.lock().unwrap().len()
    }

    pub fn min(&self) -> u64 {
        self.inner.lock().unwrap().min()
    }

    pub fn max(&self) -> u64 {
        self.inner.lock().unwrap().max()
    }

    pub fn mean(&self) -> f64 {
        self.inner.lock().unwrap().mean()
    }

    pub fn quantile(&self, q: f64) -> Result<u64, MetricsError> {
        if !(0.0..=1.0).contains(&q) {
            return Err(MetricsError::InvalidQuantile);
        }
        let inner = self.inner.lock().unwrap();
        if inner.is_empty() {
            return Err(MetricsError::NoData);
        }
        Ok(inner.value_at_quantile(q))
    }

    pub(super) fn update(&self, value: Number) {
        let units = match value {
            Number::Signed(i) => i.max(0) as u64,
            Number::Double(f) => f.max(0.0).round() as u64,
        };
        // auto-resize is on, recording cannot fail
        let _ = self.inner.lock().unwrap().record(units);
    }

    pub(super) fn move_to(&self, dest: &Sketch) {
        let mut inner = self.inner.lock().unwrap();
        let empty = Histogram::new_from(&*inner);
        let moved = std::mem::replace(&mut *inner, empty);
        drop(inner);
        *dest.inner.lock().unwrap() = moved;
    }

    pub(super) fn merge(&self, other: &Sketch) -> Result<(), MetricsError> {
        let snapshot = other.inner.lock().unwrap().clone();
        self.inner
            .lock()
            .unwrap()
            .add(&snapshot)
            .map_err(|e| MetricsError::Other(anyhow!("sketch merge failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantiles_within_relative_error() {
        let agg = Sketch::new(&SketchConfig::default());
        for v in 1..=1_000i64 {
            agg.update(Number::Signed(v));
        }
        assert_eq!(agg.count(), 1_000);

        let p50 = agg.quantile(0.5).unwrap() as f64;
        assert!((p50 - 500.0).abs() / 500.0 < 0.01);
        let p99 = agg.quantile(0.99).unwrap() as f64;
        assert!((p99 - 990.0).abs() / 990.0 < 0.01);
    }

    #[test]
    fn empty_quantile_is_no_data() {
        let agg = Sketch::new(&SketchConfig::default());
        assert!(matches!(agg.quantile(0.5), Err(MetricsError::NoData)));
    }

    #[test]
    fn move_resets_live_state() {
        let agg = Sketch::new(&SketchConfig::default());
        agg.update(Number::Signed(10));
        agg.update(Number::Signed(20));

        let checkpoint = agg.clone_empty();
        agg.move_to(&checkpoint);
        assert_eq!(checkpoint.count(), 2);
        assert_eq!(agg.count(), 0);
    }

    #[test]
    fn merge_combines_counts() {
        let a = Sketch::new(&SketchConfig::default());
        let b = Sketch::new(&SketchConfig::default());
        a.update(Number::Signed(5));
        b.update(Number::Signed(15));
        b.update(Number::Signed(25));

        a.merge(&b).unwrap();
        assert_eq!(a.count(), 3);
        assert_eq!(a.max(), 25);
    }

    #[test]
    fn float_values_round_to_units() {
        let agg = Sketch::new(&SketchConfig::default());
        agg.update(Number::Double(99.7));
        assert_eq!(agg.quantile(1.0).unwrap(), 100);
    }
}
