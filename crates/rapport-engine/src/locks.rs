//! Per-entity async locks.

use std::sync::Arc;

use dashmap::DashMap;
use rapport_core::snapshot::EntityKey;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Idle entries are swept once the map grows past this many keys.
const PRUNE_THRESHOLD: usize = 1024;

/// One mutex per [`EntityKey`], created on first use.
///
/// Holding the guard returned by [`KeyedLocks::lock`] gives exclusive access
/// to the entity's read-modify-write cycle. Different keys never contend.
#[derive(Debug, Default)]
pub struct KeyedLocks {
  inner: DashMap<EntityKey, Arc<Mutex<()>>>,
}

impl KeyedLocks {
  pub async fn lock(&self, key: EntityKey) -> OwnedMutexGuard<()> {
    // Clone the Arc out so the shard lock is released before awaiting.
    let mutex = self.inner.entry(key).or_default().clone();
    mutex.lock_owned().await
  }

  pub fn len(&self) -> usize { self.inner.len() }

  pub fn is_empty(&self) -> bool { self.inner.is_empty() }

  /// Drop entries no task holds or waits on.
  pub fn prune_idle(&self) {
    if self.inner.len() > PRUNE_THRESHOLD {
      self.inner.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use uuid::Uuid;

  use super::*;

  #[tokio::test]
  async fn same_key_is_exclusive() {
    let locks = Arc::new(KeyedLocks::default());
    let key = EntityKey::Node(Uuid::new_v4());

    let guard = locks.lock(key).await;
    let contender = {
      let locks = locks.clone();
      tokio::spawn(async move { locks.lock(key).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!contender.is_finished());

    drop(guard);
    tokio::time::timeout(Duration::from_secs(1), contender)
      .await
      .expect("lock released")
      .unwrap();
  }

  #[tokio::test]
  async fn different_keys_do_not_contend() {
    let locks = KeyedLocks::default();
    let _a = locks.lock(EntityKey::Node(Uuid::new_v4())).await;
    let _b = tokio::time::timeout(
      Duration::from_secs(1),
      locks.lock(EntityKey::Node(Uuid::new_v4())),
    )
    .await
    .expect("independent key");
    assert_eq!(locks.len(), 2);
  }
}
