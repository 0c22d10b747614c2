/*
 * SPDX-License-Identifier: Apache-2.0
 */

//! The Spyglass metrics SDK.
//!
//! The [`Accumulator`] is the core: a concurrency-safe registry mapping
//! (instrument, label-set) pairs to live aggregator state, swept by a
//! single collector context per pass. Batchers reduce checkpointed
//! records into a [`export::CheckpointSet`] for exporters, and the push
//! and pull controllers drive the collect-checkpoint-export cycle.

mod accumulator;
pub use accumulator::Accumulator;

pub mod aggregator;
pub mod batcher;
pub mod controller;
pub mod export;

mod selector;
pub use selector::SimpleSelector;
