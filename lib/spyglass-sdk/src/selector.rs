/*
 * SPDX-License-Identifier: Apache-2.0
 */

use spyglass_api::{Descriptor, InstrumentKind};

use crate::aggregator::{Aggregator, Exact, MinMaxSumCount, Sketch, SketchConfig, Sum};
use crate::export::AggregationSelector;

enum DistributionPolicy {
    Inexpensive,
    Exact,
    Sketch(SketchConfig),
}

/// The stock aggregation selector.
///
/// Counters always aggregate as sums. Measures and observers follow the
/// chosen distribution policy, trading memory and cpu for quantile
/// fidelity.
pub struct SimpleSelector {
    policy: DistributionPolicy,
}

impl SimpleSelector {
    /// Min/max/sum/count for distributions. Fastest and smallest, no
    /// quantile information.
    pub fn inexpensive() -> Self {
        SimpleSelector {
            policy: DistributionPolicy::Inexpensive,
        }
    }

    /// Every value retained for exact quantiles. Memory grows with the
    /// number of updates per interval.
    pub fn exact() -> Self {
        SimpleSelector {
            policy: DistributionPolicy::Exact,
        }
    }

    /// One quantile sketch per distribution, bounded relative error.
    pub fn sketch(config: SketchConfig) -> Self {
        SimpleSelector {
            policy: DistributionPolicy::Sketch(config),
        }
    }
}

impl AggregationSelector for SimpleSelector {
    fn aggregator_for(&self, descriptor: &Descriptor) -> Option<Aggregator> {
        match descriptor.instrument_kind() {
            InstrumentKind::Counter => {
                Some(Aggregator::Sum(Sum::new(descriptor.number_kind())))
            }
            InstrumentKind::Measure | InstrumentKind::Observer => Some(match &self.policy {
                DistributionPolicy::Inexpensive => {
                    Aggregator::MinMaxSumCount(MinMaxSumCount::new(descriptor.number_kind()))
                }
                DistributionPolicy::Exact => Aggregator::Exact(Exact::new()),
                DistributionPolicy::Sketch(config) => Aggregator::Sketch(Sketch::new(config)),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spyglass_api::NumberKind;

    fn desc(kind: InstrumentKind) -> Descriptor {
        Descriptor::new("i", kind, NumberKind::Signed)
    }

    #[test]
    fn counters_always_sum() {
        for selector in [
            SimpleSelector::inexpensive(),
            SimpleSelector::exact(),
            SimpleSelector::sketch(SketchConfig::default()),
        ] {
            let agg = selector.aggregator_for(&desc(InstrumentKind::Counter)).unwrap();
            assert_eq!(agg.kind_name(), "sum");
        }
    }

    #[test]
    fn distributions_follow_policy() {
        let cases = [
            (SimpleSelector::inexpensive(), "min-max-sum-count"),
            (SimpleSelector::exact(), "exact"),
            (
                SimpleSelector::sketch(SketchConfig::with_sigfig(2)),
                "sketch",
            ),
        ];
        for (selector, expected) in cases {
            for kind in [InstrumentKind::Measure, InstrumentKind::Observer] {
                let agg = selector.aggregator_for(&desc(kind)).unwrap();
                assert_eq!(agg.kind_name(), expected);
            }
        }
    }
}
