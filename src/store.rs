// Key-value persistence with collision detection, batched writes, and a
// retry-then-fallback write path that reports one structured outcome per
// game.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::{debug, error, warn};

// ---------------------------------------------------------------------------
// Key namespace
// ---------------------------------------------------------------------------

/// Keys may not contain the namespace separator; ids from upstream get
/// sanitized before keying.
fn sanitize(part: &str) -> String {
    part.replace(':', "-")
}

/// Per-game record key: entity, season, and a collision-proof suffix of
/// date plus game id. Double-headers differ in game id and never collide.
pub fn game_key(season: u16, entity_id: &str, date: NaiveDate, game_id: &str) -> String {
    format!(
        "game:{season}:{}:{}:{}",
        sanitize(entity_id),
        date.format("%Y-%m-%d"),
        sanitize(game_id)
    )
}

/// Season-totals key: stable per (entity, season).
pub fn season_key(season: u16, entity_id: &str) -> String {
    format!("season:{season}:{}", sanitize(entity_id))
}

/// Scan prefix covering every season-totals record for a season.
pub fn season_prefix(season: u16) -> String {
    format!("season:{season}:")
}

// ---------------------------------------------------------------------------
// KvStore trait
// ---------------------------------------------------------------------------

/// Minimal key-value surface the pipeline persists through: get/set,
/// transactional batch writes, and prefix scans.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// All-or-nothing write of several records.
    fn batch_set(&self, pairs: &[(String, String)]) -> Result<()>;
    /// All records whose key starts with `prefix`.
    fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

/// SQLite-backed record store. One `records` table holds every serialized
/// record under its string key.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`. Pass `":memory:"` for an
    /// ephemeral store (useful for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open store at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set store pragmas")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );",
        )
        .context("failed to create store schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Ephemeral in-memory store.
    pub fn memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Acquire the connection. Panics if the mutex is poisoned (another
    /// thread panicked while holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store mutex poisoned")
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare_cached("SELECT value FROM records WHERE key = ?1")
            .context("failed to prepare get query")?;
        let mut rows = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))
            .context("failed to query record")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("failed to read record row")?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO records (key, value, updated_at)
             VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
             ON CONFLICT(key) DO UPDATE SET
                value      = excluded.value,
                updated_at = excluded.updated_at",
            params![key, value],
        )
        .context("failed to write record")?;
        Ok(())
    }

    fn batch_set(&self, pairs: &[(String, String)]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin batch transaction")?;
        for (key, value) in pairs {
            tx.execute(
                "INSERT INTO records (key, value, updated_at)
                 VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                 ON CONFLICT(key) DO UPDATE SET
                    value      = excluded.value,
                    updated_at = excluded.updated_at",
                params![key, value],
            )
            .with_context(|| format!("failed to write record {key} in batch"))?;
        }
        tx.commit().context("failed to commit batch")?;
        Ok(())
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let conn = self.conn();
        // Half-open key range; '\u{10FFFF}' sorts after every continuation
        // of the prefix in UTF-8 byte order.
        let upper = format!("{prefix}\u{10FFFF}");
        let mut stmt = conn
            .prepare_cached("SELECT key, value FROM records WHERE key >= ?1 AND key < ?2 ORDER BY key")
            .context("failed to prepare scan query")?;
        let rows = stmt
            .query_map(params![prefix, upper], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .context("failed to scan records")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map scanned rows")?;
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Collision detection
// ---------------------------------------------------------------------------

/// What to do with an incoming per-game write given what the key already
/// holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameWriteDisposition {
    /// Nothing at the key yet.
    Fresh,
    /// The key holds this same game: an intentional same-game refresh of
    /// the per-game record. The game is not re-folded into season totals.
    Refresh,
    /// The key holds a different game's data (double-header naming clash
    /// or id sanitization collapse). The write is refused.
    Conflict { existing_game_id: String },
}

/// Compare an existing serialized record's game id against the incoming
/// one. Unparseable existing data is treated as a conflict rather than
/// silently overwritten.
pub fn game_disposition(existing: Option<&str>, incoming_game_id: &str) -> GameWriteDisposition {
    let Some(existing) = existing else {
        return GameWriteDisposition::Fresh;
    };
    let stored_id = serde_json::from_str::<Value>(existing)
        .ok()
        .and_then(|v| {
            v.pointer("/context/game_id")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
    match stored_id {
        Some(id) if id == incoming_game_id => GameWriteDisposition::Refresh,
        Some(id) => GameWriteDisposition::Conflict {
            existing_game_id: id,
        },
        None => GameWriteDisposition::Conflict {
            existing_game_id: "<unparseable>".to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff for individual record writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 120,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt after `attempt` (1-based): base * 2^(n-1).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let factor = 1u64 << (attempt.saturating_sub(1)).min(16) as u64;
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }
}

// ---------------------------------------------------------------------------
// Write state machine
// ---------------------------------------------------------------------------

/// One record queued for the per-game batch write, with enough context to
/// report a permanent failure for manual reconciliation.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub key: String,
    pub value: String,
    pub game_id: String,
    pub date: NaiveDate,
    pub disciplines: String,
}

/// A record that exhausted its retries.
#[derive(Debug, Clone)]
pub struct RecordFailure {
    pub key: String,
    pub game_id: String,
    pub date: NaiveDate,
    pub disciplines: String,
    pub reason: String,
}

/// Which path the writes took: the single batched transaction, or the
/// per-record fallback after a batch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    Batched,
    Fallback,
}

/// Outcome of one game's record writes.
#[derive(Debug)]
pub struct BatchWriteResult {
    pub phase: WritePhase,
    /// Keys whose records are durably written.
    pub succeeded: Vec<String>,
    /// Records that failed after all retries.
    pub failed: Vec<RecordFailure>,
}

impl BatchWriteResult {
    pub fn fully_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Write one record with bounded exponential backoff. Returns the number
/// of attempts taken.
pub async fn write_with_retry(
    store: &dyn KvStore,
    policy: &RetryPolicy,
    key: &str,
    value: &str,
) -> Result<usize> {
    let mut last_err = None;
    for attempt in 1..=policy.max_attempts.max(1) {
        match store.set(key, value) {
            Ok(()) => return Ok(attempt),
            Err(e) => {
                if attempt < policy.max_attempts {
                    let delay = policy.delay_for_attempt(attempt);
                    debug!(
                        key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "write failed, backing off: {e:#}"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err
        .unwrap_or_else(|| anyhow::anyhow!("write never attempted"))
        .context(format!(
            "write of {key} exhausted {} attempts",
            policy.max_attempts
        )))
}

/// Write one game's records: a single batched transaction first, then a
/// per-record retry fallback if the batch fails. Each record ends
/// Succeeded or PermanentlyFailed; permanent failures carry full context
/// for manual reconciliation.
pub async fn write_game_records(
    store: &dyn KvStore,
    policy: &RetryPolicy,
    writes: Vec<PendingWrite>,
) -> BatchWriteResult {
    if writes.is_empty() {
        return BatchWriteResult {
            phase: WritePhase::Batched,
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
    }

    let pairs: Vec<(String, String)> = writes
        .iter()
        .map(|w| (w.key.clone(), w.value.clone()))
        .collect();

    match store.batch_set(&pairs) {
        Ok(()) => BatchWriteResult {
            phase: WritePhase::Batched,
            succeeded: writes.into_iter().map(|w| w.key).collect(),
            failed: Vec::new(),
        },
        Err(batch_err) => {
            warn!(
                records = pairs.len(),
                "batched write failed, retrying records individually: {batch_err:#}"
            );
            let mut succeeded = Vec::new();
            let mut failed = Vec::new();
            for w in writes {
                match write_with_retry(store, policy, &w.key, &w.value).await {
                    Ok(attempts) => {
                        debug!(key = %w.key, attempts, "fallback write succeeded");
                        succeeded.push(w.key);
                    }
                    Err(e) => {
                        error!(
                            game_id = %w.game_id,
                            date = %w.date,
                            key = %w.key,
                            disciplines = %w.disciplines,
                            "record write permanently failed: {e:#}"
                        );
                        failed.push(RecordFailure {
                            key: w.key,
                            game_id: w.game_id,
                            date: w.date,
                            disciplines: w.disciplines,
                            reason: format!("{e:#}"),
                        });
                    }
                }
            }
            BatchWriteResult {
                phase: WritePhase::Fallback,
                succeeded,
                failed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Store wrapper that fails a configurable number of operations before
    /// delegating, for exercising the retry/fallback paths.
    struct FlakyStore {
        inner: SqliteStore,
        set_failures: AtomicUsize,
        fail_batches: bool,
    }

    impl FlakyStore {
        fn new(set_failures: usize, fail_batches: bool) -> Self {
            Self {
                inner: SqliteStore::memory().unwrap(),
                set_failures: AtomicUsize::new(set_failures),
                fail_batches,
            }
        }
    }

    impl KvStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            let remaining = self.set_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.set_failures.store(remaining - 1, Ordering::SeqCst);
                anyhow::bail!("injected set failure");
            }
            self.inner.set(key, value)
        }

        fn batch_set(&self, pairs: &[(String, String)]) -> Result<()> {
            if self.fail_batches {
                anyhow::bail!("injected batch failure");
            }
            self.inner.batch_set(pairs)
        }

        fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>> {
            self.inner.scan(prefix)
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff_ms: 1,
        }
    }

    fn pending(key: &str, game_id: &str) -> PendingWrite {
        PendingWrite {
            key: key.to_string(),
            value: format!(r#"{{"context":{{"game_id":"{game_id}"}}}}"#),
            game_id: game_id.to_string(),
            date: date(2025, 7, 4),
            disciplines: "batting".into(),
        }
    }

    // ---- Keys ----

    #[test]
    fn game_keys_keep_double_headers_distinct() {
        let d = date(2025, 7, 4);
        let k1 = game_key(2025, "judge99", d, "2025-07-04-NYY-BOS-1");
        let k2 = game_key(2025, "judge99", d, "2025-07-04-NYY-BOS-2");
        assert_ne!(k1, k2);
        assert!(k1.starts_with("game:2025:judge99:2025-07-04:"));
    }

    #[test]
    fn keys_sanitize_namespace_separator() {
        let d = date(2025, 7, 4);
        let k = game_key(2025, "team:NYY", d, "g:1");
        assert_eq!(k, "game:2025:team-NYY:2025-07-04:g-1");
        assert_eq!(season_key(2025, "team:NYY"), "season:2025:team-NYY");
    }

    #[test]
    fn season_prefix_covers_season_keys() {
        assert!(season_key(2025, "p1").starts_with(&season_prefix(2025)));
        assert!(!season_key(2024, "p1").starts_with(&season_prefix(2025)));
    }

    // ---- SqliteStore ----

    #[test]
    fn get_set_round_trip() {
        let store = SqliteStore::memory().unwrap();
        assert!(store.get("k1").unwrap().is_none());
        store.set("k1", "v1").unwrap();
        assert_eq!(store.get("k1").unwrap().as_deref(), Some("v1"));
        store.set("k1", "v2").unwrap();
        assert_eq!(store.get("k1").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn batch_set_writes_all_records() {
        let store = SqliteStore::memory().unwrap();
        let pairs = vec![
            ("a:1".to_string(), "one".to_string()),
            ("a:2".to_string(), "two".to_string()),
            ("b:1".to_string(), "three".to_string()),
        ];
        store.batch_set(&pairs).unwrap();
        assert_eq!(store.get("a:2").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn scan_returns_only_prefix_matches_in_order() {
        let store = SqliteStore::memory().unwrap();
        store.set("season:2025:b", "2").unwrap();
        store.set("season:2025:a", "1").unwrap();
        store.set("season:2024:z", "0").unwrap();
        store.set("game:2025:a:x:y", "g").unwrap();

        let rows = store.scan("season:2025:").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "season:2025:a");
        assert_eq!(rows[1].0, "season:2025:b");
    }

    // ---- Disposition ----

    #[test]
    fn empty_key_is_fresh() {
        assert_eq!(game_disposition(None, "g1"), GameWriteDisposition::Fresh);
    }

    #[test]
    fn same_game_id_is_a_refresh() {
        let existing = r#"{"context":{"game_id":"g1"}}"#;
        assert_eq!(
            game_disposition(Some(existing), "g1"),
            GameWriteDisposition::Refresh
        );
    }

    #[test]
    fn different_game_id_is_a_conflict() {
        let existing = r#"{"context":{"game_id":"g1"}}"#;
        assert_eq!(
            game_disposition(Some(existing), "g2"),
            GameWriteDisposition::Conflict {
                existing_game_id: "g1".into()
            }
        );
    }

    #[test]
    fn unparseable_existing_data_is_a_conflict() {
        assert!(matches!(
            game_disposition(Some("not json"), "g1"),
            GameWriteDisposition::Conflict { .. }
        ));
    }

    // ---- Retry policy ----

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_backoff_ms: 100,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn write_with_retry_recovers_from_transient_failures() {
        let store = FlakyStore::new(2, false);
        let attempts = write_with_retry(&store, &fast_policy(), "k", "v")
            .await
            .unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn write_with_retry_gives_up_after_max_attempts() {
        let store = FlakyStore::new(100, false);
        let err = write_with_retry(&store, &fast_policy(), "k", "v")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exhausted 3 attempts"));
        assert!(store.get("k").unwrap().is_none());
    }

    // ---- write_game_records ----

    #[tokio::test]
    async fn healthy_store_uses_batched_phase() {
        let store = SqliteStore::memory().unwrap();
        let writes = vec![pending("game:2025:a:d:g1", "g1"), pending("game:2025:b:d:g1", "g1")];
        let result = write_game_records(&store, &fast_policy(), writes).await;
        assert_eq!(result.phase, WritePhase::Batched);
        assert!(result.fully_succeeded());
        assert_eq!(result.succeeded.len(), 2);
        assert!(store.get("game:2025:a:d:g1").unwrap().is_some());
    }

    #[tokio::test]
    async fn batch_failure_falls_back_to_individual_writes() {
        // Batch always fails; individual sets succeed.
        let store = FlakyStore::new(0, true);
        let writes = vec![pending("k1", "g1"), pending("k2", "g1")];
        let result = write_game_records(&store, &fast_policy(), writes).await;
        assert_eq!(result.phase, WritePhase::Fallback);
        assert!(result.fully_succeeded());
        assert_eq!(store.get("k1").unwrap().as_deref().is_some(), true);
    }

    #[tokio::test]
    async fn exhausted_records_are_reported_with_context() {
        // Batch fails and every individual set fails too.
        let store = FlakyStore::new(usize::MAX, true);
        let writes = vec![pending("k1", "game-42")];
        let result = write_game_records(&store, &fast_policy(), writes).await;
        assert_eq!(result.phase, WritePhase::Fallback);
        assert!(!result.fully_succeeded());
        assert_eq!(result.failed.len(), 1);
        let failure = &result.failed[0];
        assert_eq!(failure.game_id, "game-42");
        assert_eq!(failure.key, "k1");
        assert_eq!(failure.disciplines, "batting");
        assert!(!failure.reason.is_empty());
    }

    #[tokio::test]
    async fn empty_write_set_is_a_no_op() {
        let store = SqliteStore::memory().unwrap();
        let result = write_game_records(&store, &fast_policy(), Vec::new()).await;
        assert!(result.fully_succeeded());
        assert!(result.succeeded.is_empty());
    }
}
