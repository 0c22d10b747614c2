/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::cmp::Ordering;
use std::fmt;
use std::ops;
use std::sync::atomic::{AtomicU64, Ordering as MemOrdering};

/// The value domain of an instrument, fixed at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Signed,
    Double,
}

impl fmt::Display for NumberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberKind::Signed => f.write_str("i64"),
            NumberKind::Double => f.write_str("f64"),
        }
    }
}

/// A measurement value, tagged with its kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Signed(i64),
    Double(f64),
}

impl Number {
    pub fn zero(kind: NumberKind) -> Self {
        match kind {
            NumberKind::Signed => Number::Signed(0),
            NumberKind::Double => Number::Double(0.0),
        }
    }

    pub fn kind(&self) -> NumberKind {
        match self {
            Number::Signed(_) => NumberKind::Signed,
            Number::Double(_) => NumberKind::Double,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            Number::Signed(i) => *i,
            Number::Double(f) => *f as i64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Signed(i) => *i as f64,
            Number::Double(f) => *f,
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Number::Double(f) if f.is_nan())
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Number::Signed(i) => *i < 0,
            Number::Double(f) => *f < 0.0,
        }
    }

    pub(crate) fn to_bits(self) -> u64 {
        match self {
            Number::Signed(i) => i as u64,
            Number::Double(f) => f.to_bits(),
        }
    }

    pub(crate) fn from_bits(kind: NumberKind, bits: u64) -> Self {
        match kind {
            NumberKind::Signed => Number::Signed(bits as i64),
            NumberKind::Double => Number::Double(f64::from_bits(bits)),
        }
    }

    /// Ordering between two numbers of the same kind. Cross-kind
    /// comparison falls back to f64 ordering.
    pub fn partial_cmp(&self, other: &Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Signed(a), Number::Signed(b)) => Some(a.cmp(b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }

    pub fn min(self, other: Number) -> Number {
        match self.partial_cmp(&other) {
            Some(Ordering::Greater) => other,
            _ => self,
        }
    }

    pub fn max(self, other: Number) -> Number {
        match self.partial_cmp(&other) {
            Some(Ordering::Less) => other,
            _ => self,
        }
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Signed(v)
    }
}

impl From<u64> for Number {
    fn from(v: u64) -> Self {
        Number::Signed(v as i64)
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Double(v)
    }
}

impl ops::Add for Number {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Number::Signed(a), Number::Signed(b)) => Number::Signed(a.wrapping_add(b)),
            (Number::Signed(a), Number::Double(b)) => Number::Double(a as f64 + b),
            (Number::Double(a), Number::Signed(b)) => Number::Double(a + b as f64),
            (Number::Double(a), Number::Double(b)) => Number::Double(a + b),
        }
    }
}

impl ops::AddAssign for Number {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Signed(i) => itoa::Buffer::new().format(*i).fmt(f),
            Number::Double(v) => ryu::Buffer::new().format(*v).fmt(f),
        }
    }
}

/// Atomic storage for a [`Number`] of a fixed kind.
///
/// The kind is not stored here, callers supply it on each access. Integer
/// addition uses a wrapping fetch-add on the raw bits, float addition runs
/// a compare-and-swap loop.
pub struct AtomicNumber {
    bits: AtomicU64,
}

impl AtomicNumber {
    pub fn new(value: Number) -> Self {
        AtomicNumber {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn zero() -> Self {
        AtomicNumber {
            bits: AtomicU64::new(0),
        }
    }

    pub fn load(&self, kind: NumberKind) -> Number {
        Number::from_bits(kind, self.bits.load(MemOrdering::Acquire))
    }

    pub fn store(&self, value: Number) {
        self.bits.store(value.to_bits(), MemOrdering::Release)
    }

    /// Atomically replace the held value, returning the previous one.
    pub fn swap(&self, kind: NumberKind, value: Number) -> Number {
        Number::from_bits(kind, self.bits.swap(value.to_bits(), MemOrdering::AcqRel))
    }

    pub fn fetch_add(&self, kind: NumberKind, delta: Number) {
        match kind {
            NumberKind::Signed => {
                // two's complement addition is the same on the raw bits
                self.bits
                    .fetch_add(delta.as_i64() as u64, MemOrdering::AcqRel);
            }
            NumberKind::Double => {
                let d = delta.as_f64();
                let _ = self
                    .bits
                    .fetch_update(MemOrdering::AcqRel, MemOrdering::Acquire, |bits| {
                        Some((f64::from_bits(bits) + d).to_bits())
                    });
            }
        }
    }
}

impl fmt::Debug for AtomicNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicNumber")
            .field("bits", &self.bits.load(MemOrdering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_add() {
        let v = AtomicNumber::zero();
        v.fetch_add(NumberKind::Signed, Number::Signed(10));
        v.fetch_add(NumberKind::Signed, Number::Signed(-4));
        assert_eq!(v.load(NumberKind::Signed), Number::Signed(6));
    }

    #[test]
    fn double_add() {
        let v = AtomicNumber::zero();
        v.fetch_add(NumberKind::Double, Number::Double(1.5));
        v.fetch_add(NumberKind::Double, Number::Double(2.25));
        assert_eq!(v.load(NumberKind::Double), Number::Double(3.75));
    }

    #[test]
    fn swap_resets() {
        let v = AtomicNumber::new(Number::Signed(42));
        let old = v.swap(NumberKind::Signed, Number::zero(NumberKind::Signed));
        assert_eq!(old, Number::Signed(42));
        assert_eq!(v.load(NumberKind::Signed), Number::Signed(0));
    }

    #[test]
    fn ordering() {
        assert_eq!(Number::Signed(3).max(Number::Signed(-5)), Number::Signed(3));
        assert_eq!(
            Number::Double(0.5).min(Number::Double(1.5)),
            Number::Double(0.5)
        );
    }

    #[test]
    fn display() {
        assert_eq!(Number::Signed(-3).to_string(), "-3");
        assert_eq!(Number::Double(1.0).to_string(), "1.0");
    }
}
