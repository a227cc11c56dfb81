// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Single-flight execution
//!
//! At most one in-flight operation per key. Callers arriving while an
//! operation is pending await its shared result instead of starting their
//! own; once it resolves the key is free again.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;

pub struct SingleFlight<K, T>
where
    T: Clone,
{
    pending: Mutex<HashMap<K, Shared<BoxFuture<'static, T>>>>,
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Joins the pending operation for `key`, or starts one with `start`.
    ///
    /// `start` is only called when nothing is pending. The returned future
    /// should not depend on the caller staying around: dropping every
    /// awaiter drops the shared future.
    pub async fn run<F>(&self, key: K, start: F) -> T
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let flight = {
            let mut pending = self.pending.lock();
            match pending.get(&key) {
                Some(existing) if existing.peek().is_none() => existing.clone(),
                // Nothing pending, or a finished flight nobody cleared
                // (all awaiters dropped).
                _ => {
                    let flight = start().shared();
                    pending.insert(key.clone(), flight.clone());
                    flight
                }
            }
        };

        let result = flight.clone().await;

        let mut pending = self.pending.lock();
        if pending.get(&key).is_some_and(|current| current.ptr_eq(&flight)) {
            pending.remove(&key);
        }
        result
    }

    /// Whether an operation is currently pending for `key`.
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending
            .lock()
            .get(key)
            .is_some_and(|flight| flight.peek().is_none())
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
