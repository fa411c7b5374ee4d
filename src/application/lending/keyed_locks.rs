use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// 使われなくなったロックを掃除する閾値
const PRUNE_THRESHOLD: usize = 1024;

/// キーごとの排他ロック
///
/// 同じキーに対する操作を直列化し、異なるキーは並行に進める。
/// ガードを保持している間、そのキーの他の取得者は待たされる。
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// キーのロックを取得する
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = {
            // マップ自体は不変条件を持たないので、poisonされていても使い続ける
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() >= PRUNE_THRESHOLD {
                // マップだけが参照しているロックは誰も保持・待機していない
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
