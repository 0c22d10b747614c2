/*
 * SPDX-License-Identifier: Apache-2.0
 */

//! The instrument-facing metrics API: meters, instruments, label sets
//! and the process-wide default provider.

mod number;
pub use number::{AtomicNumber, Number, NumberKind};

mod descriptor;
pub use descriptor::{Descriptor, InstrumentKind};

mod label;
pub use label::{KeyValue, LabelSet, Value};

mod instrument;
pub use instrument::{
    BoundSyncInstrumentCore, InstrumentCore, Measurement, MeterCore, MeterProvider,
    SyncInstrumentCore,
};

mod meter;
pub use meter::{BoundCounter, BoundMeasure, Counter, Measure, Meter, Observer};

mod observer;
pub use observer::{AsyncInstrumentCore, ObserverCallback, ObserverResult};

mod error;
pub use error::{ErrorHandler, MetricsError, handle_error, set_error_handler};

pub mod global;
