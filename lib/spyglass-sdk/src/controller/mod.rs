/*
 * SPDX-License-Identifier: Apache-2.0
 */

//! Controllers driving the collect-checkpoint-export cycle.
//!
//! The push controller runs the cycle on its own timer and hands each
//! checkpoint set to an exporter. The pull controller collects on
//! demand, for scrape-style exporters, with an optional cache window.

mod clock;
pub use clock::{Clock, ManualClock, RealClock};

mod push;
pub use push::PushController;

mod pull;
pub use pull::PullController;
