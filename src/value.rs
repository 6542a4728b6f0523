// Composite value scoring: percentile-relative contributions against the
// current baseline, role and playing-time adjustments, and the
// cost-efficiency (CVR) composite.

use serde::{Deserialize, Serialize};

use crate::baseline::{metrics, Baseline, Distribution};
use crate::stats::counts::{Classification, SeasonTotals, SubGrade};

/// Composite value scores are clamped to this range.
pub const SCORE_MIN: f64 = -2.0;
pub const SCORE_MAX: f64 = 8.0;

/// Weight applied to the secondary role of a two-way entity.
const SECONDARY_ROLE_WEIGHT: f64 = 0.5;

/// League-average salary anchor for the CVR salary tier.
const LEAGUE_AVG_SALARY: f64 = 4_500_000.0;

// ---------------------------------------------------------------------------
// Percentile tiers
// ---------------------------------------------------------------------------

/// Where a metric value falls relative to the baseline distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    Elite,
    AboveAverage,
    Average,
    BelowAverage,
    Poor,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Elite => "elite",
            Tier::AboveAverage => "above-average",
            Tier::Average => "average",
            Tier::BelowAverage => "below-average",
            Tier::Poor => "poor",
        }
    }

    /// Base contribution points before per-metric scaling.
    fn points(&self) -> f64 {
        match self {
            Tier::Elite => 1.0,
            Tier::AboveAverage => 0.5,
            Tier::Average => 0.1,
            Tier::BelowAverage => -0.25,
            Tier::Poor => -0.6,
        }
    }
}

/// Grade a value against a distribution. For lower-is-better metrics (ERA,
/// FIP, WHIP, BB/9) the percentile direction is inverted: at or under p10
/// is elite.
pub fn tier_for(value: f64, dist: &Distribution, lower_is_better: bool) -> Tier {
    if lower_is_better {
        if value <= dist.p10 {
            Tier::Elite
        } else if value <= dist.p25 {
            Tier::AboveAverage
        } else if value <= dist.p50 {
            Tier::Average
        } else if value <= dist.p75 {
            Tier::BelowAverage
        } else {
            Tier::Poor
        }
    } else if value >= dist.p90 {
        Tier::Elite
    } else if value >= dist.p75 {
        Tier::AboveAverage
    } else if value >= dist.p50 {
        Tier::Average
    } else if value >= dist.p25 {
        Tier::BelowAverage
    } else {
        Tier::Poor
    }
}

// ---------------------------------------------------------------------------
// Score breakdown
// ---------------------------------------------------------------------------

/// A composite score plus per-metric tier grades.
#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub score: f64,
    pub sub_grades: Vec<SubGrade>,
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(SCORE_MIN, SCORE_MAX)
}

/// One metric's contribution: tier points scaled by the metric weight,
/// recording the grade.
fn contribute(
    grades: &mut Vec<SubGrade>,
    metric: &str,
    value: f64,
    dist: Option<&Distribution>,
    lower_is_better: bool,
    scale: f64,
) -> f64 {
    let Some(dist) = dist else {
        return 0.0;
    };
    let tier = tier_for(value, dist, lower_is_better);
    grades.push(SubGrade {
        metric: metric.to_string(),
        tier: tier.as_str().to_string(),
    });
    tier.points() * scale
}

// ---------------------------------------------------------------------------
// Batter scoring
// ---------------------------------------------------------------------------

/// Percentile-relative batter score: OPS/OBP/SLG/AVG/HR-rate/SB-rate
/// contributions plus a playing-time adjustment, clamped.
pub fn score_batter(totals: &SeasonTotals, baseline: &Baseline) -> ScoreBreakdown {
    let r = &totals.batting_rates;
    let mut grades = Vec::new();
    let mut score = 0.0;

    score += contribute(&mut grades, metrics::OPS, r.ops, baseline.batting_dist(metrics::OPS), false, 1.5);
    score += contribute(&mut grades, metrics::OBP, r.obp, baseline.batting_dist(metrics::OBP), false, 1.0);
    score += contribute(&mut grades, metrics::SLG, r.slg, baseline.batting_dist(metrics::SLG), false, 1.0);
    score += contribute(&mut grades, metrics::AVG, r.avg, baseline.batting_dist(metrics::AVG), false, 0.75);
    score += contribute(&mut grades, metrics::HR_RATE, r.hr_rate, baseline.batting_dist(metrics::HR_RATE), false, 0.75);
    score += contribute(&mut grades, metrics::SB_RATE, r.sb_rate, baseline.batting_dist(metrics::SB_RATE), false, 0.5);

    score += batting_playing_time_adjustment(totals.batting.pa);

    ScoreBreakdown {
        score: clamp_score(score),
        sub_grades: grades,
    }
}

/// Playing-time bonus/penalty on season plate appearances.
fn batting_playing_time_adjustment(pa: u32) -> f64 {
    if pa >= 502 {
        0.75
    } else if pa >= 300 {
        0.25
    } else if pa < 100 {
        -0.5
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Pitcher scoring
// ---------------------------------------------------------------------------

/// Percentile-relative pitcher score: ERA/FIP/WHIP (inverted), K/9, BB/9
/// (inverted), durability, and save/hold role bonuses, clamped.
pub fn score_pitcher(totals: &SeasonTotals, baseline: &Baseline) -> ScoreBreakdown {
    let r = &totals.pitching_rates;
    let mut grades = Vec::new();
    let mut score = 0.0;

    score += contribute(&mut grades, metrics::ERA, r.era, baseline.pitching_dist(metrics::ERA), true, 1.5);
    score += contribute(&mut grades, metrics::FIP, r.fip, baseline.pitching_dist(metrics::FIP), true, 1.25);
    score += contribute(&mut grades, metrics::WHIP, r.whip, baseline.pitching_dist(metrics::WHIP), true, 1.0);
    score += contribute(&mut grades, metrics::K9, r.k9, baseline.pitching_dist(metrics::K9), false, 0.75);
    score += contribute(&mut grades, metrics::BB9, r.bb9, baseline.pitching_dist(metrics::BB9), true, 0.5);

    score += durability_adjustment(totals.pitching.ip.total_outs());
    score += role_bonus(totals.pitching.sv + totals.pitching.holds);

    ScoreBreakdown {
        score: clamp_score(score),
        sub_grades: grades,
    }
}

/// Durability bonus/penalty on season outs recorded. 486 outs is a
/// 162-inning workhorse season.
fn durability_adjustment(outs: u32) -> f64 {
    if outs >= 486 {
        0.75
    } else if outs >= 300 {
        0.25
    } else if outs < 60 {
        -0.5
    } else {
        0.0
    }
}

/// Leverage-role bonus for closers and setup men.
fn role_bonus(saves_plus_holds: u32) -> f64 {
    if saves_plus_holds >= 30 {
        0.5
    } else if saves_plus_holds >= 15 {
        0.25
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Entity scoring (role dispatch)
// ---------------------------------------------------------------------------

/// Score an entity by its classification. Two-way entities weight the
/// primary role (more appearances) fully and the secondary role partially.
/// Returns `None` for unclassified records, which are never persisted.
pub fn score_entity(totals: &SeasonTotals, baseline: &Baseline) -> Option<ScoreBreakdown> {
    match totals.classification? {
        Classification::Batter => Some(score_batter(totals, baseline)),
        Classification::Pitcher => Some(score_pitcher(totals, baseline)),
        Classification::TwoWay => {
            let bat = score_batter(totals, baseline);
            let pit = score_pitcher(totals, baseline);
            let batting_primary = totals.batting_games >= totals.pitching_games;
            let (primary, secondary) = if batting_primary { (bat, pit) } else { (pit, bat) };
            let mut sub_grades = primary.sub_grades;
            sub_grades.extend(secondary.sub_grades);
            Some(ScoreBreakdown {
                score: clamp_score(primary.score + secondary.score * SECONDARY_ROLE_WEIGHT),
                sub_grades,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Traditional 0-100 score
// ---------------------------------------------------------------------------

/// Rule-based traditional-performance score on a 0-100 scale, anchored at
/// 50 for a league-average line.
pub fn traditional_score(totals: &SeasonTotals) -> f64 {
    match totals.classification {
        Some(Classification::Batter) => traditional_batting(totals),
        Some(Classification::Pitcher) => traditional_pitching(totals),
        Some(Classification::TwoWay) => {
            let bat = traditional_batting(totals);
            let pit = traditional_pitching(totals);
            if totals.batting_games >= totals.pitching_games {
                (bat * 2.0 + pit) / 3.0
            } else {
                (pit * 2.0 + bat) / 3.0
            }
        }
        None => 0.0,
    }
}

fn traditional_batting(totals: &SeasonTotals) -> f64 {
    let r = &totals.batting_rates;
    let mut score: f64 = 50.0;

    if r.avg >= 0.300 {
        score += 15.0;
    } else if r.avg >= 0.275 {
        score += 10.0;
    } else if r.avg >= 0.250 {
        score += 5.0;
    } else if r.avg < 0.220 {
        score -= 10.0;
    }

    if r.obp >= 0.380 {
        score += 15.0;
    } else if r.obp >= 0.350 {
        score += 10.0;
    } else if r.obp >= 0.320 {
        score += 5.0;
    } else if r.obp < 0.290 {
        score -= 5.0;
    }

    if r.slg >= 0.500 {
        score += 10.0;
    } else if r.slg >= 0.450 {
        score += 5.0;
    } else if r.slg < 0.350 {
        score -= 5.0;
    }

    if totals.batting.hr >= 30 {
        score += 10.0;
    } else if totals.batting.hr >= 20 {
        score += 5.0;
    }

    score.clamp(0.0, 100.0)
}

fn traditional_pitching(totals: &SeasonTotals) -> f64 {
    let r = &totals.pitching_rates;
    let mut score: f64 = 50.0;
    let has_innings = totals.pitching.ip.total_outs() > 0;

    if has_innings {
        if r.era <= 3.00 {
            score += 15.0;
        } else if r.era <= 3.50 {
            score += 10.0;
        } else if r.era <= 4.00 {
            score += 5.0;
        } else if r.era > 5.00 {
            score -= 10.0;
        }

        if r.whip <= 1.10 {
            score += 10.0;
        } else if r.whip <= 1.25 {
            score += 5.0;
        } else if r.whip > 1.45 {
            score -= 5.0;
        }

        if r.k9 >= 10.0 {
            score += 10.0;
        } else if r.k9 >= 8.5 {
            score += 5.0;
        }
    }

    if totals.pitching.w >= 15 {
        score += 10.0;
    } else if totals.pitching.w >= 10 {
        score += 5.0;
    }

    score.clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// Cost-efficiency (CVR)
// ---------------------------------------------------------------------------

/// Estimate a salary tier from the composite value score when no observed
/// salary exists.
pub fn estimate_salary(value_score: f64) -> u64 {
    if value_score >= 6.0 {
        30_000_000
    } else if value_score >= 4.0 {
        20_000_000
    } else if value_score >= 2.0 {
        10_000_000
    } else if value_score >= 1.0 {
        6_000_000
    } else if value_score >= 0.0 {
        2_000_000
    } else {
        750_000
    }
}

/// Cost-value ratio: traditional performance scaled by the value-score
/// multiplier and divided by the salary tier. Normalized so 1.0 is roughly
/// a league-average return on a league-average salary.
pub fn cost_value_ratio(traditional: f64, value_score: f64, salary: Option<u64>) -> f64 {
    let salary = salary.unwrap_or_else(|| estimate_salary(value_score)) as f64;
    let salary_tier = (salary / LEAGUE_AVG_SALARY).max(0.25);
    let multiplier = (1.0 + value_score / 10.0).clamp(0.5, 1.8);
    let cvr = (traditional / 50.0) * multiplier / salary_tier;
    (cvr * 100.0).round() / 100.0
}

/// Stamp value score, sub-grades, salary, and CVR onto a classified season
/// record. A no-op for unclassified records.
pub fn apply_scores(totals: &mut SeasonTotals, baseline: &Baseline, salary: Option<u64>) {
    let Some(breakdown) = score_entity(totals, baseline) else {
        return;
    };
    let traditional = traditional_score(totals);
    totals.value_score = (breakdown.score * 100.0).round() / 100.0;
    totals.sub_grades = breakdown.sub_grades;
    totals.salary = salary;
    totals.cvr = cost_value_ratio(traditional, totals.value_score, salary);
}
