//! Mock Store - In-Process Fallback Backend
//!
//! A `DashMap`-backed store that emulates the command surface of the remote
//! cache. Expiry is a stored deadline checked on every read, so an expired
//! key is never observable even if the background sweeper has not run yet.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{CacheError, CacheResult};

/// Value held under a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockValue {
    /// Plain string value (`get`/`set`/`setex`)
    Str(String),
    /// Field map (`hget`/`hset`/`hdel`)
    Hash(HashMap<String, String>),
}

/// Store entry with expiration tracking
#[derive(Debug, Clone)]
pub struct MockEntry {
    pub value: MockValue,
    pub expires_at: Option<Instant>,
}

impl MockEntry {
    fn new(value: MockValue, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// In-process stand-in for the remote cache
///
/// **Features**:
/// - Same command semantics as the remote cache (TTL codes, hash fields,
///   `WRONGTYPE` on mismatched access)
/// - Lazy expiry on every read path
/// - Optional background sweep to reclaim memory
///
/// **Example**:
/// ```rust
/// use storefront_tenancy::backends::MockStore;
/// use storefront_tenancy::CacheCommands;
///
/// # async fn example() -> storefront_tenancy::CacheResult<()> {
/// let store = MockStore::new();
/// store.setex("otp:555", 300, "123456").await?;
/// assert_eq!(store.get("otp:555").await?, Some("123456".to_string()));
/// # Ok(())
/// # }
/// ```
pub struct MockStore {
    map: DashMap<String, MockEntry>,
    /// Entries reclaimed by the sweeper or by lazy expiry
    evictions: AtomicU64,
}

impl MockStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        debug!("Initializing mock cache store");
        Self {
            map: DashMap::new(),
            evictions: AtomicU64::new(0),
        }
    }

    /// Number of live (not expired) entries
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.map.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Check if the store holds no live entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries removed because their TTL passed
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.map.retain(|_, entry| {
            if entry.is_expired(now) {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(count = removed, "[Mock] Purged expired entries");
        }
        removed
    }

    /// Drop everything
    pub fn clear(&self) {
        self.map.clear();
    }

    /// Spawn a task that calls [`purge_expired`](Self::purge_expired) every `every`
    ///
    /// The task holds only a weak reference and stops on its own once the
    /// store is dropped.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> Sweeper {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let store: Weak<Self> = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else { break };
                        store.purge_expired();
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            debug!("[Mock] Sweeper stopped");
        });

        info!(interval_secs = every.as_secs(), "[Mock] Sweeper started");
        Sweeper { shutdown_tx, task }
    }

    /// Look up a live entry, reclaiming it if it has expired
    fn live_value(&self, key: &str) -> Option<MockValue> {
        let now = Instant::now();
        let entry = self.map.get(key)?;
        if entry.is_expired(now) {
            drop(entry); // Release read lock
            self.remove_if_expired(key, now);
            return None;
        }
        Some(entry.value.clone())
    }

    fn remove_if_expired(&self, key: &str, now: Instant) {
        if self
            .map
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a running sweeper task
pub struct Sweeper {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl Sweeper {
    /// Signal the sweeper to stop
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Whether the task has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn require_ttl(ttl_secs: u64) -> CacheResult<Duration> {
    if ttl_secs == 0 {
        return Err(CacheError::InvalidArgument(
            "TTL must be a positive number of seconds".to_string(),
        ));
    }
    Ok(Duration::from_secs(ttl_secs))
}

// ===== Trait Implementations =====

use crate::traits::CacheCommands;
use async_trait::async_trait;

#[async_trait]
impl CacheCommands for MockStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self.live_value(key) {
            Some(MockValue::Str(value)) => Ok(Some(value)),
            Some(MockValue::Hash(_)) => Err(CacheError::WrongType {
                key: key.to_string(),
            }),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.map.insert(
            key.to_string(),
            MockEntry::new(MockValue::Str(value.to_string()), None),
        );
        Ok(())
    }

    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> CacheResult<()> {
        let ttl = require_ttl(ttl_secs)?;
        self.map.insert(
            key.to_string(),
            MockEntry::new(MockValue::Str(value.to_string()), Some(ttl)),
        );
        debug!(key = %key, ttl_secs, "[Mock] Cached key with TTL");
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        let now = Instant::now();
        match self.map.remove(key) {
            Some((_, entry)) if !entry.is_expired(now) => Ok(1),
            _ => Ok(0),
        }
    }

    async fn exists(&self, key: &str) -> CacheResult<u64> {
        Ok(u64::from(self.live_value(key).is_some()))
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<u64> {
        let ttl = require_ttl(ttl_secs)?;
        let now = Instant::now();
        match self.map.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(1)
            }
            Some(entry) => {
                drop(entry);
                self.remove_if_expired(key, now);
                Ok(0)
            }
            None => Ok(0),
        }
    }

    async fn ttl(&self, key: &str) -> CacheResult<i64> {
        let now = Instant::now();
        let Some(entry) = self.map.get(key) else {
            return Ok(-2);
        };
        if entry.is_expired(now) {
            drop(entry);
            self.remove_if_expired(key, now);
            return Ok(-2);
        }
        Ok(match entry.expires_at {
            // Rounded to the nearest second, like the remote cache
            Some(deadline) => {
                let millis = deadline.saturating_duration_since(now).as_millis();
                i64::try_from((millis + 500) / 1000).unwrap_or(i64::MAX)
            }
            None => -1,
        })
    }

    async fn flushall(&self) -> CacheResult<()> {
        self.clear();
        info!("[Mock] Flushed all entries");
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let matcher = GlobPattern::new(pattern);
        let now = Instant::now();
        let keys: Vec<String> = self
            .map
            .iter()
            .filter(|e| !e.is_expired(now) && matcher.matches(e.key()))
            .map(|e| e.key().clone())
            .collect();
        debug!(pattern = %pattern, count = keys.len(), "[Mock] Matched keys");
        Ok(keys)
    }

    async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
        match self.live_value(key) {
            Some(MockValue::Hash(fields)) => Ok(fields.get(field).cloned()),
            Some(MockValue::Str(_)) => Err(CacheError::WrongType {
                key: key.to_string(),
            }),
            None => Ok(None),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> CacheResult<u64> {
        let now = Instant::now();
        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    let fields = HashMap::from([(field.to_string(), value.to_string())]);
                    occupied.insert(MockEntry::new(MockValue::Hash(fields), None));
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    return Ok(1);
                }
                match &mut occupied.get_mut().value {
                    MockValue::Hash(fields) => Ok(u64::from(
                        fields
                            .insert(field.to_string(), value.to_string())
                            .is_none(),
                    )),
                    MockValue::Str(_) => Err(CacheError::WrongType {
                        key: key.to_string(),
                    }),
                }
            }
            Entry::Vacant(vacant) => {
                let fields = HashMap::from([(field.to_string(), value.to_string())]);
                vacant.insert(MockEntry::new(MockValue::Hash(fields), None));
                Ok(1)
            }
        }
    }

    async fn hdel(&self, key: &str, field: &str) -> CacheResult<u64> {
        let now = Instant::now();
        let Entry::Occupied(mut occupied) = self.map.entry(key.to_string()) else {
            return Ok(0);
        };
        if occupied.get().is_expired(now) {
            occupied.remove();
            self.evictions.fetch_add(1, Ordering::Relaxed);
            return Ok(0);
        }
        let MockValue::Hash(fields) = &mut occupied.get_mut().value else {
            return Err(CacheError::WrongType {
                key: key.to_string(),
            });
        };
        let removed = u64::from(fields.remove(field).is_some());
        // An emptied hash disappears, as it does remotely
        if fields.is_empty() {
            occupied.remove();
        }
        Ok(removed)
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Mock"
    }
}

#[derive(Debug, Clone, PartialEq)]
enum GlobToken {
    Literal(char),
    AnyChar,
    AnySequence,
    Class { negated: bool, ranges: Vec<(char, char)> },
}

impl GlobToken {
    fn matches_char(&self, c: char) -> bool {
        match self {
            Self::Literal(l) => *l == c,
            Self::AnyChar => true,
            Self::AnySequence => false,
            Self::Class { negated, ranges } => {
                ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&c)) != *negated
            }
        }
    }
}

/// Glob-style key pattern: `*`, `?`, `[abc]`, `[a-z]`, `[^x]` and `\` escapes
#[derive(Debug, Clone)]
pub struct GlobPattern {
    tokens: Vec<GlobToken>,
}

impl GlobPattern {
    /// Compile a pattern; malformed classes are taken literally
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let chars: Vec<char> = pattern.chars().collect();
        let mut tokens = Vec::with_capacity(chars.len());
        let mut i = 0;
        while let Some(&c) = chars.get(i) {
            i += 1;
            match c {
                '*' => {
                    if tokens.last() != Some(&GlobToken::AnySequence) {
                        tokens.push(GlobToken::AnySequence);
                    }
                }
                '?' => tokens.push(GlobToken::AnyChar),
                '\\' => {
                    let escaped = chars.get(i).copied().unwrap_or('\\');
                    i += 1;
                    tokens.push(GlobToken::Literal(escaped));
                }
                '[' => match Self::parse_class(&chars, i) {
                    Some((token, next)) => {
                        tokens.push(token);
                        i = next;
                    }
                    None => tokens.push(GlobToken::Literal('[')),
                },
                other => tokens.push(GlobToken::Literal(other)),
            }
        }
        Self { tokens }
    }

    /// Parse a `[...]` class starting just after the `[`
    fn parse_class(chars: &[char], start: usize) -> Option<(GlobToken, usize)> {
        let mut i = start;
        let negated = matches!(chars.get(i), Some('^' | '!'));
        if negated {
            i += 1;
        }
        let mut ranges = Vec::new();
        loop {
            let c = *chars.get(i)?;
            i += 1;
            match c {
                ']' if !ranges.is_empty() => return Some((GlobToken::Class { negated, ranges }, i)),
                '\\' => {
                    let escaped = *chars.get(i)?;
                    i += 1;
                    ranges.push((escaped, escaped));
                }
                lo => {
                    if chars.get(i) == Some(&'-') && chars.get(i + 1).is_some_and(|hi| *hi != ']') {
                        let hi = *chars.get(i + 1)?;
                        i += 2;
                        ranges.push(if lo <= hi { (lo, hi) } else { (hi, lo) });
                    } else {
                        ranges.push((lo, lo));
                    }
                }
            }
        }
    }

    /// Whether `text` matches the whole pattern
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();
        let (mut t, mut p) = (0, 0);
        // Position of the last `*` and the text index it is currently absorbing up to
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            match (self.tokens.get(p), text.get(t)) {
                (Some(GlobToken::AnySequence), _) => {
                    backtrack = Some((p, t));
                    p += 1;
                }
                (Some(token), Some(&c)) if token.matches_char(c) => {
                    p += 1;
                    t += 1;
                }
                _ => match backtrack {
                    Some((star, absorbed)) => {
                        p = star + 1;
                        t = absorbed + 1;
                        backtrack = Some((star, absorbed + 1));
                    }
                    None => return false,
                },
            }
        }
        self.tokens
            .get(p..)
            .is_some_and(|rest| rest.iter().all(|token| *token == GlobToken::AnySequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_patterns() {
        let cases = [
            ("*", "anything", true),
            ("otp:*", "otp:555", true),
            ("otp:*", "session:1", false),
            ("*:555", "otp:555", true),
            ("otp:5?5", "otp:545", true),
            ("otp:5?5", "otp:5445", false),
            ("token:[ar]*", "token:access", true),
            ("token:[^ar]*", "token:access", false),
            ("k[0-9]", "k7", true),
            ("k[0-9]", "kx", false),
            ("a\\*b", "a*b", true),
            ("a\\*b", "axb", false),
            ("a*b*c", "aXXbYYc", true),
            ("a*b*c", "aXXbYY", false),
            ("", "", true),
            ("[", "[", true),
        ];
        for (pattern, text, expected) in cases {
            assert_eq!(
                GlobPattern::new(pattern).matches(text),
                expected,
                "pattern {pattern:?} against {text:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_set_clears_prior_expiry() {
        let store = MockStore::new();
        store.setex("k", 60, "a").await.unwrap();
        assert!(store.ttl("k").await.unwrap() > 0);

        store.set("k", "b").await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), -1);
        assert_eq!(store.get("k").await.unwrap(), Some("b".to_string()));
    }

    #[tokio::test]
    async fn test_ttl_codes() {
        let store = MockStore::new();
        assert_eq!(store.ttl("missing").await.unwrap(), -2);

        store.set("plain", "v").await.unwrap();
        assert_eq!(store.ttl("plain").await.unwrap(), -1);

        store.setex("otp:1", 300, "v").await.unwrap();
        assert_eq!(store.ttl("otp:1").await.unwrap(), 300);
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let store = MockStore::new();
        assert!(matches!(
            store.setex("k", 0, "v").await,
            Err(CacheError::InvalidArgument(_))
        ));
        store.set("k", "v").await.unwrap();
        assert!(matches!(
            store.expire("k", 0).await,
            Err(CacheError::InvalidArgument(_))
        ));
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_checked_on_read() {
        let store = MockStore::new();
        store.setex("k", 1, "v").await.unwrap();
        assert_eq!(store.exists("k").await.unwrap(), 1);

        tokio::time::advance(Duration::from_millis(1001)).await;

        // No sweep has run; reads alone must hide the entry
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.exists("k").await.unwrap(), 0);
        assert_eq!(store.ttl("k").await.unwrap(), -2);
        assert_eq!(store.del("k").await.unwrap(), 0);
        assert!(store.evictions() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_overwrites_ttl() {
        let store = MockStore::new();
        assert_eq!(store.expire("absent", 10).await.unwrap(), 0);

        store.set("k", "v").await.unwrap();
        assert_eq!(store.expire("k", 2).await.unwrap(), 1);
        assert_eq!(store.ttl("k").await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.expire("k", 10).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_skips_expired() {
        let store = MockStore::new();
        store.set("session:1", "a").await.unwrap();
        store.setex("session:2", 1, "b").await.unwrap();
        store.set("otp:1", "c").await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        let keys = store.keys("session:*").await.unwrap();
        assert_eq!(keys, vec!["session:1".to_string()]);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_hash_operations() {
        let store = MockStore::new();
        assert_eq!(store.hset("h", "a", "1").await.unwrap(), 1);
        assert_eq!(store.hset("h", "a", "2").await.unwrap(), 0);
        assert_eq!(store.hset("h", "b", "3").await.unwrap(), 1);
        assert_eq!(store.hget("h", "a").await.unwrap(), Some("2".to_string()));
        assert_eq!(store.hget("h", "zz").await.unwrap(), None);

        assert_eq!(store.hdel("h", "a").await.unwrap(), 1);
        assert_eq!(store.hdel("h", "a").await.unwrap(), 0);
        assert_eq!(store.hdel("h", "b").await.unwrap(), 1);
        assert_eq!(store.exists("h").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wrong_type_access() {
        let store = MockStore::new();
        store.set("s", "v").await.unwrap();
        store.hset("h", "f", "v").await.unwrap();

        assert!(matches!(
            store.hget("s", "f").await,
            Err(CacheError::WrongType { .. })
        ));
        assert!(matches!(
            store.hset("s", "f", "v").await,
            Err(CacheError::WrongType { .. })
        ));
        assert!(matches!(
            store.get("h").await,
            Err(CacheError::WrongType { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_reclaims_memory() {
        let store = Arc::new(MockStore::new());
        store.setex("k", 1, "v").await.unwrap();
        let sweeper = store.spawn_sweeper(Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(store.map.len(), 0);
        assert_eq!(store.evictions(), 1);

        sweeper.shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(sweeper.is_finished());
    }

    #[tokio::test]
    async fn test_flushall() {
        let store = MockStore::new();
        store.set("a", "1").await.unwrap();
        store.hset("b", "f", "2").await.unwrap();
        store.flushall().await.unwrap();
        assert!(store.is_empty());
        assert!(store.keys("*").await.unwrap().is_empty());
    }
}
