//! # Aggregate Locks
//!
//! Mutual exclusion per product-in-branch and per account.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sell(Rice @ MAIN, customer C)    transfer(Rice MAIN → EAST)            │
//! │          │                                 │                            │
//! │          ▼                                 ▼                            │
//! │  keys sorted:                      keys sorted:                         │
//! │    stock:rice@EAST? no               stock:rice@EAST                    │
//! │    stock:rice@MAIN                   stock:rice@MAIN                    │
//! │    account:C                                                            │
//! │          │                                 │                            │
//! │          └──────── both take rice@MAIN ────┘                            │
//! │                     in the same order, so neither can hold one key      │
//! │                     while waiting for a key the other holds             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Operations on unrelated aggregates never wait on each other. A lock that
//! cannot be taken within the configured timeout fails the operation with
//! a retryable `ConcurrentMutationConflict`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use stockbook_core::validation::product_key;
use stockbook_core::CoreError;

/// One lockable aggregate.
///
/// Variant order is the global acquisition order: every stock key sorts
/// before every account key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    /// A product in a branch, by normalized product name.
    Stock { product: String, branch_id: String },
    Account(String),
}

impl LockKey {
    pub fn stock(branch_id: &str, product_name: &str) -> Self {
        LockKey::Stock {
            product: product_key(product_name),
            branch_id: branch_id.to_string(),
        }
    }

    pub fn account(account_id: &str) -> Self {
        LockKey::Account(account_id.to_string())
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Stock { product, branch_id } => write!(f, "stock:{}:{}", branch_id, product),
            LockKey::Account(id) => write!(f, "account:{}", id),
        }
    }
}

type LockMap = Arc<Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>>;

fn lock_map(map: &LockMap) -> MutexGuard<'_, HashMap<LockKey, Arc<AsyncMutex<()>>>> {
    // the map only hands out Arcs, so a poisoned map is still whole
    map.lock().unwrap_or_else(|p| p.into_inner())
}

/// Forgets keys nobody holds or waits for.
fn prune(map: &LockMap, keys: &[LockKey]) {
    let mut locks = lock_map(map);
    for key in keys {
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }
}

/// Guards held for the duration of one operation. Dropping releases all.
#[derive(Debug)]
pub struct LockSet {
    keys: Vec<LockKey>,
    guards: Vec<OwnedMutexGuard<()>>,
    map: LockMap,
}

impl LockSet {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        // each guard owns a reference to its mutex
        self.guards.clear();
        prune(&self.map, &self.keys);
    }
}

#[derive(Debug, Clone)]
pub struct LockRegistry {
    locks: LockMap,
    timeout: Duration,
}

impl LockRegistry {
    pub fn new(timeout: Duration) -> Self {
        LockRegistry {
            locks: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Keys currently held or waited for.
    pub fn tracked(&self) -> usize {
        lock_map(&self.locks).len()
    }

    fn handle(&self, key: &LockKey) -> Arc<AsyncMutex<()>> {
        lock_map(&self.locks).entry(key.clone()).or_default().clone()
    }

    /// Takes every key, in sorted order, waiting at most `timeout` for each.
    pub async fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> Result<LockSet, CoreError> {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut set = LockSet {
            keys: Vec::with_capacity(keys.len()),
            guards: Vec::with_capacity(keys.len()),
            map: Arc::clone(&self.locks),
        };
        for key in keys {
            let lock = self.handle(&key);
            match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
                Ok(guard) => {
                    set.keys.push(key);
                    set.guards.push(guard);
                }
                Err(_) => {
                    warn!(key = %key, timeout_ms = self.timeout.as_millis() as u64, "Lock wait timed out");
                    prune(&self.locks, std::slice::from_ref(&key));
                    return Err(CoreError::conflict(key.to_string()));
                }
            }
        }

        debug!(keys = ?set.keys.iter().map(ToString::to_string).collect::<Vec<_>>(), "Locks acquired");
        Ok(set)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_sort_stock_before_account() {
        let mut keys = vec![
            LockKey::account("c-1"),
            LockKey::stock("b-2", "Rice"),
            LockKey::stock("b-1", "rice "),
        ];
        keys.sort();
        assert!(matches!(keys[2], LockKey::Account(_)));
        assert_eq!(keys[0], LockKey::stock("b-1", "RICE"));
    }

    #[tokio::test]
    async fn test_acquire_dedups_keys() {
        let registry = LockRegistry::new(Duration::from_millis(50));
        let set = registry
            .acquire([LockKey::stock("b-1", "Rice"), LockKey::stock("b-1", "rice")])
            .await
            .unwrap();
        assert_eq!(set.keys().len(), 1);
    }

    #[tokio::test]
    async fn test_held_key_times_out_with_conflict() {
        let registry = LockRegistry::new(Duration::from_millis(20));
        let _held = registry.acquire([LockKey::account("c-1")]).await.unwrap();

        let err = registry.acquire([LockKey::account("c-1")]).await.unwrap_err();
        assert!(err.is_retryable());

        // unrelated aggregates are not blocked
        assert!(registry.acquire([LockKey::account("c-2")]).await.is_ok());
    }

    #[tokio::test]
    async fn test_released_on_drop() {
        let registry = LockRegistry::new(Duration::from_millis(20));
        let held = registry.acquire([LockKey::stock("b-1", "Sugar")]).await.unwrap();
        drop(held);
        assert!(registry.acquire([LockKey::stock("b-1", "Sugar")]).await.is_ok());
    }

    #[tokio::test]
    async fn test_released_keys_are_forgotten() {
        let registry = LockRegistry::new(Duration::from_millis(20));
        let held = registry
            .acquire([LockKey::stock("b-1", "Sugar"), LockKey::account("c-1")])
            .await
            .unwrap();
        assert_eq!(registry.tracked(), 2);
        drop(held);
        assert_eq!(registry.tracked(), 0);

        let held = registry.acquire([LockKey::account("c-1")]).await.unwrap();
        assert!(registry
            .acquire([LockKey::stock("b-1", "Sugar"), LockKey::account("c-1")])
            .await
            .is_err());
        assert_eq!(registry.tracked(), 1);
        drop(held);
        assert_eq!(registry.tracked(), 0);
    }

    #[tokio::test]
    async fn test_waiter_keeps_key_until_it_is_done() {
        let registry = LockRegistry::new(Duration::from_secs(5));
        let held = registry.acquire([LockKey::account("c-1")]).await.unwrap();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let set = registry.acquire([LockKey::account("c-1")]).await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
                drop(set);
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert_eq!(registry.tracked(), 1);

        waiter.await.unwrap();
        assert_eq!(registry.tracked(), 0);
    }
}
