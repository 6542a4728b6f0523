// League-wide percentile baselines, recomputed wholesale over qualified
// season totals and cached between refreshes.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::stats::counts::{EntityKind, SeasonTotals};

/// Tracked metric names. Keys into [`Baseline::batting`] / [`Baseline::pitching`].
pub mod metrics {
    pub const AVG: &str = "avg";
    pub const OBP: &str = "obp";
    pub const SLG: &str = "slg";
    pub const OPS: &str = "ops";
    pub const HR_RATE: &str = "hr_rate";
    pub const SB_RATE: &str = "sb_rate";

    pub const ERA: &str = "era";
    pub const FIP: &str = "fip";
    pub const WHIP: &str = "whip";
    pub const K9: &str = "k9";
    pub const BB9: &str = "bb9";

    pub const BATTING: [&str; 6] = [AVG, OBP, SLG, OPS, HR_RATE, SB_RATE];
    pub const PITCHING: [&str; 5] = [ERA, FIP, WHIP, K9, BB9];
}

// ---------------------------------------------------------------------------
// Distributions
// ---------------------------------------------------------------------------

/// Percentile cut-points plus the mean for one metric across the qualified
/// pool. Monotone by construction: p10 <= p25 <= p50 <= p75 <= p90.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub mean: f64,
}

impl Distribution {
    /// Compute cut-points from an unsorted sample. Returns `None` on an
    /// empty sample (callers fall back to defaults).
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
        Some(Distribution {
            p10: percentile(&sorted, 0.10),
            p25: percentile(&sorted, 0.25),
            p50: percentile(&sorted, 0.50),
            p75: percentile(&sorted, 0.75),
            p90: percentile(&sorted, 0.90),
            mean,
        })
    }
}

/// Linear-interpolation percentile over a sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = q * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

// ---------------------------------------------------------------------------
// Baseline snapshot
// ---------------------------------------------------------------------------

/// One season's per-metric distributions with freshness bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub season: u16,
    pub batting: BTreeMap<String, Distribution>,
    pub pitching: BTreeMap<String, Distribution>,
    pub computed_at: DateTime<Utc>,
    /// Processed-game counter value that triggered this computation.
    pub games_processed: u64,
    pub qualified_batters: usize,
    pub qualified_pitchers: usize,
}

impl Baseline {
    pub fn batting_dist(&self, metric: &str) -> Option<&Distribution> {
        self.batting.get(metric)
    }

    pub fn pitching_dist(&self, metric: &str) -> Option<&Distribution> {
        self.pitching.get(metric)
    }
}

/// Hard-coded league-typical distributions used when no qualifying samples
/// exist yet (early season, empty store).
pub fn default_baseline(season: u16) -> Baseline {
    let mut batting = BTreeMap::new();
    let d = |p10, p25, p50, p75, p90, mean| Distribution {
        p10,
        p25,
        p50,
        p75,
        p90,
        mean,
    };
    batting.insert(metrics::AVG.into(), d(0.215, 0.238, 0.255, 0.275, 0.295, 0.252));
    batting.insert(metrics::OBP.into(), d(0.285, 0.305, 0.320, 0.345, 0.370, 0.322));
    batting.insert(metrics::SLG.into(), d(0.340, 0.375, 0.410, 0.455, 0.505, 0.414));
    batting.insert(metrics::OPS.into(), d(0.630, 0.680, 0.730, 0.795, 0.870, 0.736));
    batting.insert(metrics::HR_RATE.into(), d(0.010, 0.018, 0.028, 0.040, 0.055, 0.030));
    batting.insert(metrics::SB_RATE.into(), d(0.005, 0.012, 0.022, 0.040, 0.065, 0.028));

    let mut pitching = BTreeMap::new();
    pitching.insert(metrics::ERA.into(), d(3.05, 3.55, 4.10, 4.70, 5.40, 4.18));
    pitching.insert(metrics::FIP.into(), d(3.20, 3.65, 4.15, 4.65, 5.15, 4.16));
    pitching.insert(metrics::WHIP.into(), d(1.08, 1.19, 1.30, 1.42, 1.55, 1.31));
    pitching.insert(metrics::K9.into(), d(6.3, 7.4, 8.5, 9.7, 11.0, 8.6));
    pitching.insert(metrics::BB9.into(), d(2.1, 2.6, 3.2, 3.9, 4.7, 3.3));

    Baseline {
        season,
        batting,
        pitching,
        computed_at: Utc::now(),
        games_processed: 0,
        qualified_batters: 0,
        qualified_pitchers: 0,
    }
}

// ---------------------------------------------------------------------------
// Store with refresh triggers
// ---------------------------------------------------------------------------

/// Qualification thresholds and refresh cadence.
#[derive(Debug, Clone)]
pub struct BaselineConfig {
    /// Minimum season plate appearances to enter the batting pool.
    pub min_pa: u32,
    /// Minimum season outs recorded to enter the pitching pool.
    pub min_outs: u32,
    /// Wall-clock staleness window.
    pub staleness: Duration,
    /// Recompute every N fully-processed games.
    pub game_interval: u64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            min_pa: 50,
            min_outs: 45, // 15 innings
            staleness: Duration::minutes(30),
            game_interval: 25,
        }
    }
}

/// Explicit, passed-in holder for the last-computed baseline. Consumers
/// read the cached snapshot; only the caller that trips a refresh trigger
/// pays for recomputation.
#[derive(Debug)]
pub struct BaselineStore {
    config: BaselineConfig,
    current: Option<Baseline>,
}

impl BaselineStore {
    pub fn new(config: BaselineConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    /// The cached snapshot, if any refresh has ever run.
    pub fn snapshot(&self) -> Option<&Baseline> {
        self.current.as_ref()
    }

    /// True when a refresh trigger has tripped: first use in this process,
    /// season mismatch, wall-clock staleness, the processed-game counter
    /// crossing a multiple of the refresh interval, or an explicit force.
    pub fn needs_refresh(&self, season: u16, games_processed: u64, force: bool) -> bool {
        if force {
            return true;
        }
        let Some(current) = &self.current else {
            return true;
        };
        if current.season != season {
            return true;
        }
        if Utc::now() - current.computed_at > self.config.staleness {
            return true;
        }
        let interval = self.config.game_interval.max(1);
        games_processed / interval > current.games_processed / interval
    }

    /// Recompute the baseline wholesale from the given season totals.
    ///
    /// Totals below the qualification thresholds (and team aggregates) are
    /// excluded. With zero qualifying samples in a pool, that pool's
    /// distributions come from the hard-coded defaults.
    pub fn refresh(&mut self, season: u16, games_processed: u64, samples: &[SeasonTotals]) {
        let defaults = default_baseline(season);

        let batters: Vec<&SeasonTotals> = samples
            .iter()
            .filter(|t| {
                t.kind == EntityKind::Player
                    && t.season == season
                    && t.batting.pa >= self.config.min_pa
            })
            .collect();
        let pitchers: Vec<&SeasonTotals> = samples
            .iter()
            .filter(|t| {
                t.kind == EntityKind::Player
                    && t.season == season
                    && t.pitching.ip.total_outs() >= self.config.min_outs
            })
            .collect();

        let mut batting = BTreeMap::new();
        for metric in metrics::BATTING {
            let values: Vec<f64> = batters
                .iter()
                .map(|t| batting_metric(t, metric))
                .collect();
            let dist = Distribution::from_values(&values)
                .unwrap_or_else(|| defaults.batting[metric]);
            batting.insert(metric.to_string(), dist);
        }

        let mut pitching = BTreeMap::new();
        for metric in metrics::PITCHING {
            let values: Vec<f64> = pitchers
                .iter()
                .map(|t| pitching_metric(t, metric))
                .collect();
            let dist = Distribution::from_values(&values)
                .unwrap_or_else(|| defaults.pitching[metric]);
            pitching.insert(metric.to_string(), dist);
        }

        if batters.is_empty() && pitchers.is_empty() {
            debug!(season, "no qualifying samples; baseline falls back to defaults");
        }

        info!(
            season,
            games_processed,
            qualified_batters = batters.len(),
            qualified_pitchers = pitchers.len(),
            "baseline recomputed"
        );

        self.current = Some(Baseline {
            season,
            batting,
            pitching,
            computed_at: Utc::now(),
            games_processed,
            qualified_batters: batters.len(),
            qualified_pitchers: pitchers.len(),
        });
    }
}

fn batting_metric(t: &SeasonTotals, metric: &str) -> f64 {
    let r = &t.batting_rates;
    match metric {
        metrics::AVG => r.avg,
        metrics::OBP => r.obp,
        metrics::SLG => r.slg,
        metrics::OPS => r.ops,
        metrics::HR_RATE => r.hr_rate,
        metrics::SB_RATE => r.sb_rate,
        _ => 0.0,
    }
}

fn pitching_metric(t: &SeasonTotals, metric: &str) -> f64 {
    let r = &t.pitching_rates;
    match metric {
        metrics::ERA => r.era,
        metrics::FIP => r.fip,
        metrics::WHIP => r.whip,
        metrics::K9 => r.k9,
        metrics::BB9 => r.bb9,
        _ => 0.0,
    }
}
