/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Resources are objects that are shared between function calls,
/// and includes things like the worker thread pool and the device memory
/// pool that are expensive to create.
#[derive(Debug)]
pub struct Resources {
    pool: Option<rayon::ThreadPool>,
    memory: Arc<MemoryPool>,
}

/// Byte accounting for device allocations. A limit of `usize::MAX` means unlimited.
#[derive(Debug)]
struct MemoryPool {
    limit: AtomicUsize,
    used: AtomicUsize,
}

/// Device memory held by a tensor or an index, released on drop
#[derive(Debug)]
pub(crate) struct Reservation {
    pool: Arc<MemoryPool>,
    bytes: usize,
}

impl Resources {
    /// Returns a new Resources object running on the global thread pool
    pub fn new() -> Result<Resources> {
        Ok(Resources {
            pool: None,
            memory: Arc::new(MemoryPool {
                limit: AtomicUsize::new(usize::MAX),
                used: AtomicUsize::new(0),
            }),
        })
    }

    /// Returns a new Resources object with a dedicated pool of `num_threads` workers
    pub fn with_num_threads(num_threads: usize) -> Result<Resources> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("vsearch-worker-{}", i))
            .build()
            .map_err(|e| Error::ResourceExhausted(format!("failed to create thread pool: {}", e)))?;
        let mut res = Resources::new()?;
        res.pool = Some(pool);
        Ok(res)
    }

    /// Caps the number of bytes that device tensors and indexes may hold at once.
    /// `None` removes the cap.
    pub fn set_device_memory_limit(&self, limit: Option<usize>) {
        self.memory
            .limit
            .store(limit.unwrap_or(usize::MAX), Ordering::SeqCst);
    }

    /// Bytes currently held by device tensors and indexes created with these resources
    pub fn device_memory_used(&self) -> usize {
        self.memory.used.load(Ordering::SeqCst)
    }

    /// Number of worker threads used for build and search
    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    pub(crate) fn reserve(&self, bytes: usize) -> Result<Reservation> {
        let limit = self.memory.limit.load(Ordering::SeqCst);
        self.memory
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                used.checked_add(bytes).filter(|total| *total <= limit)
            })
            .map_err(|used| {
                Error::ResourceExhausted(format!(
                    "failed to allocate {} bytes of device memory ({} of {} bytes in use)",
                    bytes, used, limit
                ))
            })?;
        Ok(Reservation {
            pool: self.memory.clone(),
            bytes,
        })
    }

    /// Runs `op` inside the worker pool, so that parallel iterators started by
    /// `op` use the threads owned by these resources
    pub(crate) fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

impl Reservation {
    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.pool.used.fetch_sub(self.bytes, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resources_create() {
        let res = Resources::new().unwrap();
        assert!(res.num_threads() >= 1);
        assert_eq!(res.device_memory_used(), 0);
    }

    #[test]
    fn test_dedicated_pool() {
        let res = Resources::with_num_threads(2).unwrap();
        assert_eq!(res.num_threads(), 2);
        let threads = res.install(rayon::current_num_threads);
        assert_eq!(threads, 2);
    }

    #[test]
    fn test_memory_limit() {
        let res = Resources::new().unwrap();
        res.set_device_memory_limit(Some(1024));

        let first = res.reserve(1000).unwrap();
        assert_eq!(first.bytes(), 1000);
        assert_eq!(res.device_memory_used(), 1000);

        match res.reserve(100) {
            Err(Error::ResourceExhausted(_)) => {}
            other => panic!("expected ResourceExhausted, got {:?}", other),
        }
        // failed reservations don't leak
        assert_eq!(res.device_memory_used(), 1000);

        drop(first);
        assert_eq!(res.device_memory_used(), 0);
        assert!(res.reserve(1024).is_ok());

        res.set_device_memory_limit(None);
        assert!(res.reserve(1 << 30).is_ok());
    }
}
