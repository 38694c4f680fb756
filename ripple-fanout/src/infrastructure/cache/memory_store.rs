//! 进程内缓存存储
//!
//! 语义与 Redis 子集一致：带 TTL 的字符串键、按 glob 模式的游标扫描。
//! 用于测试和 `cache_backend = "memory"` 的单机部署，
//! 也可以通过 `set_unreachable` 模拟后端不可达。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{CacheConnector, CacheStore};
use crate::error::CacheStoreError;

/// 每写入这么多次清理一次过期键
const PURGE_INTERVAL: u64 = 64;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
    /// 写入序号，作为扫描游标（删除其它键不会影响游标位置）
    seq: u64,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<BTreeMap<String, MemoryEntry>>,
    next_seq: AtomicU64,
    unreachable: AtomicBool,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// 模拟后端不可达：之后的所有操作都返回 `Unreachable`
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// 当前未过期的键数量
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_reachable(&self) -> Result<(), CacheStoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(CacheStoreError::Unreachable(
                "memory cache marked unreachable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        self.check_reachable()?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheStoreError> {
        self.check_reachable()?;
        let now = Instant::now();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at: now + ttl,
            seq,
        };

        let mut entries = self.entries.write().await;
        // 只写不读的键不会在 get / del 时被移除
        if seq % PURGE_INTERVAL == 0 {
            entries.retain(|_, entry| !entry.is_expired(now));
        }
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheStoreError> {
        self.check_reachable()?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if !entry.is_expired(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), CacheStoreError> {
        self.check_reachable()?;
        let now = Instant::now();
        let entries = self.entries.read().await;

        // 与 Redis 一样，COUNT 限制的是本轮检查的键数量，而不是返回的匹配数量
        let mut window: Vec<(u64, &String, &MemoryEntry)> = entries
            .iter()
            .filter(|(_, entry)| entry.seq >= cursor)
            .map(|(key, entry)| (entry.seq, key, entry))
            .collect();
        window.sort_by_key(|(seq, _, _)| *seq);

        let examined: Vec<_> = window.into_iter().take(count.max(1)).collect();
        let next_cursor = match examined.last() {
            Some((seq, _, _)) if entries.values().any(|entry| entry.seq > *seq) => seq + 1,
            _ => 0,
        };

        let keys = examined
            .into_iter()
            .filter(|(_, key, entry)| !entry.is_expired(now) && glob_match(pattern, key))
            .map(|(_, key, _)| key.clone())
            .collect();

        Ok((next_cursor, keys))
    }

    async fn ping(&self) -> Result<(), CacheStoreError> {
        self.check_reachable()
    }
}

/// 把共享的内存存储包装成连接器
pub struct MemoryCacheConnector {
    store: Arc<MemoryCacheStore>,
}

impl MemoryCacheConnector {
    pub fn new(store: Arc<MemoryCacheStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CacheConnector for MemoryCacheConnector {
    async fn connect(&self) -> Result<Arc<dyn CacheStore>, CacheStoreError> {
        self.store.ping().await?;
        Ok(self.store.clone())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Redis 风格的 glob 匹配，支持 `*` 与 `?`
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern = glob_tokens(pattern);
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_key = 0;

    while k < key.len() {
        match pattern.get(p) {
            Some(GlobToken::AnyOne) => {
                p += 1;
                k += 1;
            }
            Some(GlobToken::Literal(c)) if *c == key[k] => {
                p += 1;
                k += 1;
            }
            Some(GlobToken::AnyRun) => {
                star = Some(p);
                star_key = k;
                p += 1;
            }
            _ => match star {
                Some(star_pos) => {
                    p = star_pos + 1;
                    star_key += 1;
                    k = star_key;
                }
                None => return false,
            },
        }
    }

    while matches!(pattern.get(p), Some(GlobToken::AnyRun)) {
        p += 1;
    }
    p == pattern.len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GlobToken {
    Literal(char),
    AnyOne,
    AnyRun,
}

/// `\x` 匹配字面量 x（与 Redis 一致）
fn glob_tokens(pattern: &str) -> Vec<GlobToken> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '\\' => GlobToken::Literal(chars.next().unwrap_or('\\')),
            '*' => GlobToken::AnyRun,
            '?' => GlobToken::AnyOne,
            other => GlobToken::Literal(other),
        });
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("feed:42:*", "feed:42:home:1"));
        assert!(!glob_match("feed:42:*", "feed:420:home:1"));
        assert!(!glob_match("feed:42:*", "user:42"));
        assert!(glob_match("session:?:*", "session:7:abc"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[test]
    fn test_escaped_metacharacters_match_literally() {
        assert!(glob_match(r"feed:4\*:*", "feed:4*:home:1"));
        assert!(!glob_match(r"feed:4\*:*", "feed:42:home:1"));
        assert!(glob_match(r"session:a\?:*", "session:a?:t1"));
        assert!(!glob_match(r"session:a\?:*", "session:ab:t1"));
        assert!(glob_match(r"x\\y", r"x\y"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_write_only_keys_are_purged() {
        let store = MemoryCacheStore::new();
        for i in 0..10 {
            store
                .set_ex(&format!("short:{i}"), "v", Duration::from_secs(1))
                .await
                .unwrap();
        }
        tokio::time::advance(Duration::from_secs(2)).await;

        for i in 0..PURGE_INTERVAL {
            store
                .set_ex(&format!("long:{i}"), "v", Duration::from_secs(60))
                .await
                .unwrap();
        }

        assert_eq!(store.entries.read().await.len(), PURGE_INTERVAL as usize);
        assert_eq!(store.len().await, PURGE_INTERVAL as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let store = MemoryCacheStore::new();
        store
            .set_ex("user:1", "alice", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(store.get("user:1").await.unwrap().as_deref(), Some("alice"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("user:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scan_visits_every_key_once_in_batches() {
        let store = MemoryCacheStore::new();
        for i in 0..25 {
            store
                .set_ex(&format!("k:{i}"), "v", Duration::from_secs(60))
                .await
                .unwrap();
        }

        let mut cursor = 0;
        let mut seen = Vec::new();
        let mut rounds = 0;
        loop {
            let (next, keys) = store.scan(cursor, "k:*", 10).await.unwrap();
            seen.extend(keys);
            rounds += 1;
            if next == 0 {
                break;
            }
            cursor = next;
        }

        assert_eq!(rounds, 3);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 25);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_every_call() {
        let store = MemoryCacheStore::new();
        store.set_unreachable(true);
        assert!(matches!(
            store.get("k").await,
            Err(CacheStoreError::Unreachable(_))
        ));
        assert!(store.ping().await.is_err());
    }
}
