/*
 * SPDX-License-Identifier: Apache-2.0
 */

use spyglass_api::{AtomicNumber, Number, NumberKind};

/// An additive aggregator holding one atomic number.
///
/// Integer updates are a lock-free fetch-add on the raw bits, float
/// updates a compare-and-swap loop. Checkpointing swaps the value with
/// zero in a single atomic operation.
pub struct Sum {
    kind: NumberKind,
    value: AtomicNumber,
}

impl Sum {
    pub fn new(kind: NumberKind) -> Self {
        Sum {
            kind,
            value: AtomicNumber::zero(),
        }
    }

    #[inline]
    pub fn number_kind(&self) -> NumberKind {
        self.kind
    }

    pub fn sum(&self) -> Number {
        self.value.load(self.kind)
    }

    pub(super) fn update(&self, value: Number) {
        self.value.fetch_add(self.kind, value)
    }

    pub(super) fn move_to(&self, dest: &Sum) {
        let old = self.value.swap(self.kind, Number::zero(self.kind));
        dest.value.store(old);
    }

    pub(super) fn merge(&self, other: &Sum) {
        self.value.fetch_add(self.kind, other.sum())
    }
}
