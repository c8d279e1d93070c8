// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Last known-good peer set.
//!
//! - **Atomic swap**: `ArcSwap` (no lock on read)
//! - **Wholesale replace**: a new set is built aside, then published
//!
//! Readers see either the previous set or the new one, never a mix.

use crate::model::Address;
use arc_swap::ArcSwap;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug)]
pub struct DiscoveryCache {
    peers: ArcSwap<BTreeSet<Address>>,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self {
            peers: ArcSwap::from_pointee(BTreeSet::new()),
        }
    }

    /// Publish `peers` as the current set.
    pub fn replace(&self, peers: BTreeSet<Address>) {
        self.peers.store(Arc::new(peers));
    }

    /// Ordered copy of the current set.
    pub fn snapshot(&self) -> Vec<Address> {
        self.peers.load().iter().cloned().collect()
    }
}

impl Default for DiscoveryCache {
    fn default() -> Self {
        Self::new()
    }
}
