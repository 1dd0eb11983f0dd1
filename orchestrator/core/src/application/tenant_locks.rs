// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::instance::TenantId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per tenant id, created on demand.
///
/// Entries are held weakly and pruned once no guard or waiter refers to them.
#[derive(Default)]
pub struct TenantLocks {
    locks: Mutex<HashMap<TenantId, Weak<AsyncMutex<()>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, tenant: &TenantId) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock();
            locks.retain(|_, weak| weak.strong_count() > 0);
            match locks.get(tenant).and_then(Weak::upgrade) {
                Some(mutex) => mutex,
                None => {
                    let mutex = Arc::new(AsyncMutex::new(()));
                    locks.insert(tenant.clone(), Arc::downgrade(&mutex));
                    mutex
                }
            }
        };
        mutex.lock_owned().await
    }

    /// Number of tenants with a live lock.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
