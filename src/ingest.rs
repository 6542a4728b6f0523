// Season ingest: pull box scores in bounded-concurrency batches, extract
// per-game records, persist them through the batched/fallback write path,
// and fold each durably-written record into season totals.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::baseline::{default_baseline, Baseline, BaselineConfig, BaselineStore};
use crate::config::Config;
use crate::stats::counts::{EntityKind, GameStatRecord, SeasonTotals};
use crate::stats::extract::extract_game;
use crate::store::{
    game_disposition, game_key, season_key, season_prefix, write_game_records, write_with_retry,
    GameWriteDisposition, KvStore, PendingWrite, RecordFailure, RetryPolicy,
};

// ---------------------------------------------------------------------------
// Game sources
// ---------------------------------------------------------------------------

/// One game on the season schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledGame {
    pub game_id: String,
    pub date: NaiveDate,
    pub home: String,
    pub away: String,
}

/// Where box scores come from. The directory source reads pre-fetched JSON
/// files; tests substitute in-memory sources.
#[async_trait]
pub trait GameSource: Send + Sync {
    /// Scheduled games for the season within an inclusive date range.
    async fn schedule(
        &self,
        season: u16,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduledGame>>;

    /// The raw box score payload for one scheduled game.
    async fn box_score(&self, game: &ScheduledGame) -> Result<Value>;
}

/// Reads a season from a directory: `schedule.json` holds the schedule,
/// each game's box score lives in `{game_id}.json`.
pub struct DirectoryGameSource {
    dir: PathBuf,
}

impl DirectoryGameSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl GameSource for DirectoryGameSource {
    async fn schedule(
        &self,
        _season: u16,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduledGame>> {
        let path = self.dir.join("schedule.json");
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read schedule at {}", path.display()))?;
        let all: Vec<ScheduledGame> =
            serde_json::from_str(&text).context("failed to parse schedule.json")?;
        Ok(all
            .into_iter()
            .filter(|g| g.date >= from && g.date <= to)
            .collect())
    }

    async fn box_score(&self, game: &ScheduledGame) -> Result<Value> {
        let path = self.dir.join(format!("{}.json", game.game_id));
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read box score at {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("malformed box score for game {}", game.game_id))
    }
}

// ---------------------------------------------------------------------------
// Salary sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerSalary {
    pub name: String,
    pub salary: u64,
}

/// Team payroll lookups, resolved lazily one team at a time.
pub trait SalarySource: Send + Sync {
    fn team_salaries(&self, team: &str, season: u16) -> Result<Vec<PlayerSalary>>;
}

#[derive(Debug, Deserialize)]
struct SalaryRow {
    team: String,
    season: u16,
    name: String,
    salary: u64,
}

/// Salary CSV with `team,season,name,salary` columns.
pub struct CsvSalarySource {
    path: PathBuf,
}

impl CsvSalarySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SalarySource for CsvSalarySource {
    fn team_salaries(&self, team: &str, season: u16) -> Result<Vec<PlayerSalary>> {
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("failed to open salary csv at {}", self.path.display()))?;
        let mut out = Vec::new();
        for row in reader.deserialize() {
            let row: SalaryRow = row.context("malformed salary csv row")?;
            if row.team == team && row.season == season {
                out.push(PlayerSalary {
                    name: row.name,
                    salary: row.salary,
                });
            }
        }
        Ok(out)
    }
}

/// Per-team salary cache in front of a source. A team whose lookup fails
/// is cached as empty so one bad team does not re-query every game.
pub struct SalaryBook {
    source: Option<Box<dyn SalarySource>>,
    season: u16,
    cache: HashMap<String, HashMap<String, u64>>,
}

impl SalaryBook {
    pub fn new(source: Option<Box<dyn SalarySource>>, season: u16) -> Self {
        Self {
            source,
            season,
            cache: HashMap::new(),
        }
    }

    /// No salary data at all.
    pub fn empty(season: u16) -> Self {
        Self::new(None, season)
    }

    pub fn salary_for(&mut self, team: &str, name: &str) -> Option<u64> {
        let source = self.source.as_ref()?;
        if !self.cache.contains_key(team) {
            let by_name = match source.team_salaries(team, self.season) {
                Ok(rows) => rows.into_iter().map(|p| (p.name, p.salary)).collect(),
                Err(e) => {
                    warn!(team, "salary lookup failed, scoring without salary: {e:#}");
                    HashMap::new()
                }
            };
            self.cache.insert(team.to_string(), by_name);
        }
        self.cache.get(team).and_then(|m| m.get(name)).copied()
    }
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

/// A game dropped before any of its records could be written.
#[derive(Debug, Clone)]
pub struct FailedGame {
    pub game_id: String,
    pub date: NaiveDate,
    pub reason: String,
}

/// End-of-run accounting, including every record that permanently failed
/// to persist, for manual reconciliation.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub games_scheduled: usize,
    pub games_processed: usize,
    pub records_written: usize,
    pub conflicts: usize,
    pub baseline_refreshes: usize,
    pub failed_games: Vec<FailedGame>,
    pub failed_records: Vec<RecordFailure>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failed_games.is_empty() && self.failed_records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Season runner
// ---------------------------------------------------------------------------

/// Drives a full season (or date range) through the pipeline.
///
/// Fetch and extract fan out with bounded concurrency per batch; merges
/// run sequentially so two games touching the same entity can never race
/// a read-modify-write on its season record.
pub struct SeasonRunner {
    store: Arc<dyn KvStore>,
    source: Box<dyn GameSource>,
    baselines: BaselineStore,
    policy: RetryPolicy,
    salaries: SalaryBook,
    season: u16,
    batch_size: usize,
    batch_pause: Duration,
    games_processed: u64,
}

impl SeasonRunner {
    pub fn new(
        store: Arc<dyn KvStore>,
        source: Box<dyn GameSource>,
        config: &Config,
        salaries: SalaryBook,
    ) -> Self {
        let baseline_config = BaselineConfig {
            min_pa: config.baseline.min_pa,
            min_outs: config.baseline.min_outs,
            staleness: chrono::Duration::seconds(config.baseline.staleness_secs),
            game_interval: config.baseline.game_interval,
        };
        Self {
            store,
            source,
            baselines: BaselineStore::new(baseline_config),
            policy: RetryPolicy {
                max_attempts: config.pipeline.max_write_attempts,
                base_backoff_ms: config.pipeline.base_backoff_ms,
            },
            salaries,
            season: config.season.year,
            batch_size: config.effective_batch_size(),
            batch_pause: Duration::from_millis(config.pipeline.batch_pause_ms),
            games_processed: 0,
        }
    }

    /// Process every scheduled game in the range and report what happened.
    pub async fn run(&mut self, from: NaiveDate, to: NaiveDate) -> Result<RunSummary> {
        let started = Instant::now();
        let schedule = self
            .source
            .schedule(self.season, from, to)
            .await
            .context("failed to load season schedule")?;

        let mut summary = RunSummary {
            games_scheduled: schedule.len(),
            ..RunSummary::default()
        };
        info!(
            season = self.season,
            games = schedule.len(),
            batch_size = self.batch_size,
            "starting season run"
        );

        let mut batches = schedule.chunks(self.batch_size.max(1)).peekable();
        while let Some(batch) = batches.next() {
            // Fetch and extract concurrently; results come back in schedule
            // order and merges run strictly sequentially.
            let this = &*self;
            let extracted: Vec<(ScheduledGame, Result<Vec<GameStatRecord>>)> =
                stream::iter(batch.iter().cloned())
                    .map(|game| async move {
                        let records = this.fetch_and_extract(&game).await;
                        (game, records)
                    })
                    .buffered(this.batch_size.max(1))
                    .collect()
                    .await;

            for (game, records) in extracted {
                // One game's failure never aborts the run; it lands in the
                // summary and the loop moves on.
                let outcome = match records {
                    Ok(records) => self.process_game(&game, records, &mut summary).await,
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(()) => {
                        self.games_processed += 1;
                        summary.games_processed += 1;
                    }
                    Err(e) => {
                        warn!(game_id = %game.game_id, date = %game.date, "game dropped: {e:#}");
                        summary.failed_games.push(FailedGame {
                            game_id: game.game_id,
                            date: game.date,
                            reason: format!("{e:#}"),
                        });
                    }
                }
            }

            if batches.peek().is_some() && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        summary.elapsed = started.elapsed();
        info!(
            games_processed = summary.games_processed,
            records_written = summary.records_written,
            conflicts = summary.conflicts,
            failed_games = summary.failed_games.len(),
            failed_records = summary.failed_records.len(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "season run complete"
        );
        Ok(summary)
    }

    async fn fetch_and_extract(&self, game: &ScheduledGame) -> Result<Vec<GameStatRecord>> {
        let payload = self.source.box_score(game).await?;
        let records = extract_game(&payload)
            .with_context(|| format!("failed to extract game {}", game.game_id))?;
        Ok(records)
    }

    /// Persist one game's records and fold the durably-written ones into
    /// season totals.
    async fn process_game(
        &mut self,
        game: &ScheduledGame,
        records: Vec<GameStatRecord>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        // Disposition pass before any write. Conflicts are refused; a
        // same-game re-send refreshes the stored per-game record without
        // re-folding it into season totals.
        let mut fresh = Vec::new();
        let mut refreshes = Vec::new();
        for record in records {
            let key = game_key(
                record.season,
                &record.entity_id,
                record.context.date,
                &record.context.game_id,
            );
            let existing = self.store.get(&key)?;
            match game_disposition(existing.as_deref(), &record.context.game_id) {
                GameWriteDisposition::Fresh => fresh.push((key, record)),
                GameWriteDisposition::Refresh => refreshes.push((key, record)),
                GameWriteDisposition::Conflict { existing_game_id } => {
                    warn!(
                        key = %key,
                        incoming = %record.context.game_id,
                        existing = %existing_game_id,
                        "key collision, record refused"
                    );
                    summary.conflicts += 1;
                }
            }
        }

        for (key, record) in &refreshes {
            let value = serde_json::to_string(record).context("failed to serialize record")?;
            match write_with_retry(self.store.as_ref(), &self.policy, key, &value).await {
                Ok(_) => summary.records_written += 1,
                Err(e) => summary.failed_records.push(RecordFailure {
                    key: key.clone(),
                    game_id: record.context.game_id.clone(),
                    date: record.context.date,
                    disciplines: record.disciplines(),
                    reason: format!("{e:#}"),
                }),
            }
        }
        if !refreshes.is_empty() {
            debug!(
                game_id = %game.game_id,
                records = refreshes.len(),
                "re-sent game, per-game records refreshed without re-folding"
            );
        }

        if fresh.is_empty() {
            return Ok(());
        }

        let mut writes = Vec::with_capacity(fresh.len());
        for (key, record) in &fresh {
            writes.push(PendingWrite {
                key: key.clone(),
                value: serde_json::to_string(record).context("failed to serialize record")?,
                game_id: record.context.game_id.clone(),
                date: record.context.date,
                disciplines: record.disciplines(),
            });
        }

        let result = write_game_records(self.store.as_ref(), &self.policy, writes).await;
        summary.records_written += result.succeeded.len();
        if !result.fully_succeeded() {
            summary.failed_games.push(FailedGame {
                game_id: game.game_id.clone(),
                date: game.date,
                reason: format!(
                    "{} of {} records permanently failed",
                    result.failed.len(),
                    fresh.len()
                ),
            });
            summary.failed_records.extend(result.failed);
        }

        // Fold only records that are durably on disk; an unpersisted game
        // must never influence season totals.
        let succeeded: std::collections::HashSet<&str> =
            result.succeeded.iter().map(String::as_str).collect();
        let to_fold: Vec<&GameStatRecord> = fresh
            .iter()
            .filter(|(key, _)| succeeded.contains(key.as_str()))
            .map(|(_, record)| record)
            .collect();
        if to_fold.is_empty() {
            return Ok(());
        }

        let baseline = self.refreshed_baseline(summary, false);
        for record in to_fold {
            self.fold_record(record, &baseline, summary).await?;
        }
        Ok(())
    }

    async fn fold_record(
        &mut self,
        record: &GameStatRecord,
        baseline: &Baseline,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let key = season_key(record.season, &record.entity_id);
        let mut totals = match self.store.get(&key)? {
            Some(json) => serde_json::from_str(&json)
                .with_context(|| format!("corrupt season record at {key}"))?,
            None => SeasonTotals::new(
                &record.entity_id,
                record.kind,
                &record.name,
                &record.team,
                record.season,
            ),
        };

        let salary = match record.kind {
            EntityKind::Player => self.salaries.salary_for(&record.team, &record.name),
            EntityKind::Team => None,
        };

        if !aggregate::merge_and_score(&mut totals, record, baseline, salary) {
            return Ok(());
        }

        let value = serde_json::to_string(&totals).context("failed to serialize season record")?;
        match write_with_retry(self.store.as_ref(), &self.policy, &key, &value).await {
            Ok(_) => summary.records_written += 1,
            Err(e) => summary.failed_records.push(RecordFailure {
                key,
                game_id: record.context.game_id.clone(),
                date: record.context.date,
                disciplines: record.disciplines(),
                reason: format!("season merge write failed: {e:#}"),
            }),
        }
        Ok(())
    }

    /// Current baseline, recomputed from stored season totals when a
    /// refresh trigger has tripped.
    ///
    /// A failed sample read degrades to the last cached baseline (or the
    /// hard-coded defaults) so a storage hiccup never blocks scoring.
    fn refreshed_baseline(&mut self, summary: &mut RunSummary, force: bool) -> Baseline {
        if self
            .baselines
            .needs_refresh(self.season, self.games_processed, force)
        {
            match self.season_samples() {
                Ok(samples) => {
                    self.baselines
                        .refresh(self.season, self.games_processed, &samples);
                    summary.baseline_refreshes += 1;
                }
                Err(e) => warn!(
                    season = self.season,
                    "baseline sample read failed, scoring on cached baseline: {e:#}"
                ),
            }
        }
        self.baselines
            .snapshot()
            .cloned()
            .unwrap_or_else(|| default_baseline(self.season))
    }

    /// Every season-totals record stored for the current season.
    fn season_samples(&self) -> Result<Vec<SeasonTotals>> {
        let rows = self.store.scan(&season_prefix(self.season))?;
        let mut samples = Vec::with_capacity(rows.len());
        for (key, json) in rows {
            match serde_json::from_str::<SeasonTotals>(&json) {
                Ok(t) => samples.push(t),
                Err(e) => warn!(key = %key, "skipping unparseable season record: {e}"),
            }
        }
        Ok(samples)
    }
}
