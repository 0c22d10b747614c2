/*
 * SPDX-License-Identifier: Apache-2.0
 */

//! Batching policies reducing checkpointed records into checkpoint sets.
//!
//! A batcher is either stateless, producing delta checkpoint sets that
//! cover exactly one collection interval, or stateful, retaining merged
//! state so every checkpoint set carries cumulative values since the
//! batcher was created.

mod ungrouped;
pub use ungrouped::UngroupedBatcher;

mod default_keys;
pub use default_keys::DefaultKeysBatcher;
