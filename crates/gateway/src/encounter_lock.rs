//! Per-encounter write serialization.
//!
//! Each encounter id maps to a `Semaphore(1)`. Holding the permit makes the
//! verify → commit → broadcast sequence atomic with respect to other writers
//! of the same encounter, which is what keeps subscriber version streams
//! strictly increasing. Writers for different encounters never contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct EncounterLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for EncounterLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl EncounterLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the write permit for an encounter, waiting behind any writer
    /// already inside the critical section. The permit releases on drop.
    pub async fn acquire(&self, encounter_id: &str) -> OwnedSemaphorePermit {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(encounter_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        // The semaphore is never closed, so acquisition cannot fail.
        sem.acquire_owned()
            .await
            .expect("encounter semaphore closed")
    }

    /// Number of tracked encounters (for monitoring).
    pub fn encounter_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop entries whose permit is not currently held.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_acquire_release() {
        let map = EncounterLockMap::new();

        let permit = map.acquire("enc-1").await;
        drop(permit);

        let permit = map.acquire("enc-1").await;
        drop(permit);
    }

    #[tokio::test]
    async fn different_encounters_do_not_contend() {
        let map = Arc::new(EncounterLockMap::new());

        let p1 = map.acquire("enc-1").await;
        let p2 = map.acquire("enc-2").await;

        assert_eq!(map.encounter_count(), 2);

        drop(p1);
        drop(p2);
    }

    #[tokio::test]
    async fn same_encounter_waits_for_the_writer() {
        let map = Arc::new(EncounterLockMap::new());
        let map2 = map.clone();

        let permit = map.acquire("enc-1").await;

        let waiter = tokio::spawn(async move {
            let _permit = map2.acquire("enc-1").await;
            42
        });

        // Give the waiter a moment to queue behind the held permit.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(permit);

        assert_eq!(waiter.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn prune_drops_idle_entries_only() {
        let map = EncounterLockMap::new();

        let held = map.acquire("busy").await;
        drop(map.acquire("idle").await);
        assert_eq!(map.encounter_count(), 2);

        map.prune_idle();
        assert_eq!(map.encounter_count(), 1);

        drop(held);
    }
}
