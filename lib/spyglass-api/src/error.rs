/*
 * SPDX-License-Identifier: Apache-2.0
 */

use arc_swap::ArcSwapOption;
use std::sync::Arc;

use thiserror::Error;

use crate::NumberKind;

/// Errors surfaced by the metrics SDK.
///
/// None of these abort collection. They are funneled to the process-wide
/// handler installed with [`set_error_handler`], which defaults to the
/// `log` facade.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("no data collected by this aggregator")]
    NoData,
    #[error("inconsistent aggregator kinds: {0} and {1}")]
    InconsistentAggregator(&'static str, &'static str),
    #[error("instrument {instrument} expects {expected} values, got {actual}")]
    NumberKindMismatch {
        instrument: String,
        expected: NumberKind,
        actual: NumberKind,
    },
    #[error("NaN is not a valid metric value")]
    NaNInput,
    #[error("quantile must be within [0, 1]")]
    InvalidQuantile,
    #[error("negative value on monotonic instrument {0}")]
    NegativeInput(String),
    #[error("a collection pass is already running")]
    ConcurrentCollect,
    #[error("shutdown timed out before the final collection cycle finished")]
    ShutdownTimeout,
    #[error("the global meter provider can only be set once")]
    AlreadyDelegated,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The process-wide error sink.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, err: &MetricsError);
}

impl<F> ErrorHandler for F
where
    F: Fn(&MetricsError) + Send + Sync,
{
    fn handle(&self, err: &MetricsError) {
        self(err)
    }
}

static ERROR_HANDLER: ArcSwapOption<Box<dyn ErrorHandler>> = ArcSwapOption::const_empty();

/// Replace the process-wide error handler.
///
/// Uses the same atomic-swap pattern as the global meter provider, so
/// concurrent reporters see either the old or the new handler, never a
/// torn state.
pub fn set_error_handler(handler: Box<dyn ErrorHandler>) {
    ERROR_HANDLER.store(Some(Arc::new(handler)));
}

/// Report an error through the installed handler.
pub fn handle_error(err: MetricsError) {
    match ERROR_HANDLER.load_full() {
        Some(handler) => handler.handle(&err),
        None => log::error!("metrics error: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn handler_receives_reports() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_c = seen.clone();
        set_error_handler(Box::new(move |err: &MetricsError| {
            seen_c.lock().unwrap().push(err.to_string());
        }));

        handle_error(MetricsError::NaNInput);

        let seen = seen.lock().unwrap();
        assert!(seen.iter().any(|m| m.contains("NaN")));
    }
}
