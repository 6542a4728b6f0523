// Season aggregation: fold one per-game record into an entity's running
// season totals, re-derive every rate stat, and re-classify.

use chrono::Utc;
use tracing::debug;

use crate::baseline::Baseline;
use crate::stats::counts::{Classification, GameStatRecord, SeasonTotals};
use crate::stats::rates;
use crate::value;

/// Classify an entity from its accumulated participation: batter with at
/// least one season at-bat, pitcher with at least one out recorded, both
/// makes a two-way, neither means the record carries nothing worth keeping.
pub fn classify(totals: &SeasonTotals) -> Option<Classification> {
    let bats = totals.batting.ab >= 1;
    let pitches = totals.pitching.ip.total_outs() >= 1;
    match (bats, pitches) {
        (true, true) => Some(Classification::TwoWay),
        (true, false) => Some(Classification::Batter),
        (false, true) => Some(Classification::Pitcher),
        (false, false) => None,
    }
}

/// Fold one game's counting stats into the season totals.
///
/// Only disciplines the entity qualified in that game are merged. Every
/// rate stat is then recomputed from the merged sums; rates are never
/// summed across games. Assumes each (entity, game) pair is folded at most
/// once; the storage layer enforces that.
pub fn fold_game(totals: &mut SeasonTotals, game: &GameStatRecord) {
    totals.games += 1;

    if let Some(batting) = &game.batting {
        totals.batting.fold(batting);
        totals.batting_games += 1;
    }
    if let Some(pitching) = &game.pitching {
        totals.pitching.fold(pitching);
        totals.pitching_games += 1;
    }
    if let Some(fielding) = &game.fielding {
        totals.fielding.fold(fielding);
    }

    // Keep identity fields current; trades move a player mid-season.
    totals.team = game.team.clone();
    totals.name = game.name.clone();

    totals.batting_rates = rates::batting_rates(&totals.batting);
    totals.pitching_rates = rates::pitching_rates(&totals.pitching);
    totals.fielding_rates = rates::fielding_rates(&totals.fielding);
    totals.classification = classify(totals);
}

/// Fold a game, then score the merged record against the baseline.
///
/// Returns `false` when the entity still has no qualifying participation,
/// in which case the caller must not persist the record.
pub fn merge_and_score(
    totals: &mut SeasonTotals,
    game: &GameStatRecord,
    baseline: &Baseline,
    salary: Option<u64>,
) -> bool {
    fold_game(totals, game);

    if totals.classification.is_none() {
        debug!(
            entity = %totals.entity_id,
            season = totals.season,
            "no qualifying participation yet; season record not persisted"
        );
        return false;
    }

    value::apply_scores(totals, baseline, salary);
    totals.last_updated = Utc::now();
    true
}
