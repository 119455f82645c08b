//! Per-subnet advisory locks

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Serializes generation and regeneration of the same subnet
///
/// Requests for different subnets never contend. An entry lives only while
/// some request holds or waits on it.
#[derive(Debug, Default)]
pub struct SubnetLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

/// Exclusive hold on one subnet; releasing it drops the map entry once idle
#[derive(Debug)]
pub struct SubnetGuard<'a> {
    locks: &'a DashMap<Uuid, Arc<Mutex<()>>>,
    subnet_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SubnetGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone of the Arc, so a count of one means nobody is queued
        self.locks
            .remove_if(&self.subnet_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl SubnetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `subnet_id`; released when the guard drops
    pub async fn acquire(&self, subnet_id: Uuid) -> SubnetGuard<'_> {
        if self.is_locked(subnet_id) {
            debug!(subnet_id = %subnet_id, "Waiting for in-flight generation");
        }

        // Clone the handle so the map shard is not held across the await
        let lock = self
            .locks
            .entry(subnet_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        SubnetGuard {
            locks: &self.locks,
            subnet_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Whether a generation currently holds the subnet
    pub fn is_locked(&self, subnet_id: Uuid) -> bool {
        self.locks
            .get(&subnet_id)
            .map(|lock| {
                let held = lock.try_lock().is_err();
                held
            })
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.locks.len()
    }
}
