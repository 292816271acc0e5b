/*
 * SPDX-FileCopyrightText: Copyright (c) 2025-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Generation stamped visited set for graph traversals.
//!
//! Clearing bumps a generation counter instead of zeroing the array, so a
//! worker can reuse one set across all the queries it processes.

#[derive(Debug, Clone)]
pub(crate) struct VisitedSet {
    stamps: Vec<u16>,
    generation: u16,
}

impl VisitedSet {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            stamps: vec![0; capacity],
            generation: 1,
        }
    }

    /// Forget every node. Only zeroes the array once every `u16::MAX - 1` calls.
    pub(crate) fn clear(&mut self) {
        if self.generation == u16::MAX {
            self.stamps.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    /// Clears the set and grows it to hold at least `capacity` nodes
    pub(crate) fn reset(&mut self, capacity: usize) {
        if capacity > self.stamps.len() {
            self.stamps.resize(capacity, 0);
        }
        self.clear();
    }

    /// Marks `id` as visited. Returns `true` if it was not visited before.
    #[inline]
    pub(crate) fn insert(&mut self, id: u32) -> bool {
        let stamp = &mut self.stamps[id as usize];
        if *stamp == self.generation {
            false
        } else {
            *stamp = self.generation;
            true
        }
    }

    #[inline]
    pub(crate) fn contains(&self, id: u32) -> bool {
        self.stamps[id as usize] == self.generation
    }
}
