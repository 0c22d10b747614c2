/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use crate::instrument::InstrumentCore;
use crate::{LabelSet, Number};

/// An asynchronous (callback-driven) instrument implementation.
pub trait AsyncInstrumentCore: InstrumentCore {}

/// Invoked once per collection pass. Observed values are buffered in the
/// result and applied only if the callback returns `Ok`, so a failing
/// callback contributes nothing to that pass.
pub type ObserverCallback = Arc<dyn Fn(&mut ObserverResult) -> anyhow::Result<()> + Send + Sync>;

/// Collects the observations made by one observer callback.
#[derive(Default)]
pub struct ObserverResult {
    observations: Vec<(Number, LabelSet)>,
}

impl ObserverResult {
    pub fn new() -> Self {
        ObserverResult::default()
    }

    pub fn observe(&mut self, value: impl Into<Number>, labels: &LabelSet) {
        self.observations.push((value.into(), labels.clone()));
    }

    pub fn observations(&self) -> &[(Number, LabelSet)] {
        &self.observations
    }

    pub fn into_observations(self) -> Vec<(Number, LabelSet)> {
        self.observations
    }
}
