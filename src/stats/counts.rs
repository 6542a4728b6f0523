// Typed counting-stat records: per-game box-score deltas and accumulated
// season totals.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::rates::{BattingRates, FieldingRates, PitchingRates};

// ---------------------------------------------------------------------------
// Innings pitched (outs arithmetic)
// ---------------------------------------------------------------------------

/// Fractional innings pitched, held as whole innings plus an outs remainder
/// in `{0, 1, 2}`.
///
/// Box scores write "6.2" for six and two-thirds innings. That notation is
/// not a decimal: 0.1 + 0.2 is one whole inning (three outs), not 0.3.
/// All arithmetic here happens in outs so accumulation stays exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct InningsPitched {
    innings: u32,
    outs: u8,
}

impl InningsPitched {
    pub const ZERO: InningsPitched = InningsPitched { innings: 0, outs: 0 };

    /// Build from a total outs count, normalizing the remainder.
    pub fn from_outs(total_outs: u32) -> Self {
        Self {
            innings: total_outs / 3,
            outs: (total_outs % 3) as u8,
        }
    }

    /// Total outs recorded (innings * 3 + remainder).
    pub fn total_outs(&self) -> u32 {
        self.innings * 3 + self.outs as u32
    }

    /// Sum in outs-space. `add(0.1, 0.2)` is `1.0`, never `0.3`.
    pub fn add(self, other: InningsPitched) -> InningsPitched {
        Self::from_outs(self.total_outs() + other.total_outs())
    }

    /// True innings as a real number (outs / 3), for rate-stat denominators.
    pub fn as_f64(&self) -> f64 {
        self.innings as f64 + self.outs as f64 / 3.0
    }

    /// Parse the conventional "X.Y" box-score notation where Y is an outs
    /// remainder in 0..=2. Plain "6" means six whole innings.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        match s.split_once('.') {
            None => s.parse::<u32>().ok().map(|innings| InningsPitched {
                innings,
                outs: 0,
            }),
            Some((whole, frac)) => {
                let innings = whole.parse::<u32>().ok()?;
                let outs = frac.parse::<u8>().ok()?;
                if outs > 2 {
                    return None;
                }
                Some(InningsPitched { innings, outs })
            }
        }
    }

    /// Interpret a numeric payload value in box-score notation: the tenths
    /// digit is the outs remainder. `6.2` parses as 6 innings 2 outs.
    pub fn from_notation(value: f64) -> Self {
        if !value.is_finite() || value < 0.0 {
            return Self::ZERO;
        }
        let innings = value.trunc() as u32;
        let outs = ((value.fract() * 10.0).round() as u32).min(2) as u8;
        InningsPitched { innings, outs }
    }
}

impl From<u32> for InningsPitched {
    fn from(total_outs: u32) -> Self {
        Self::from_outs(total_outs)
    }
}

impl From<InningsPitched> for u32 {
    fn from(ip: InningsPitched) -> Self {
        ip.total_outs()
    }
}

impl std::fmt::Display for InningsPitched {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.innings, self.outs)
    }
}

// ---------------------------------------------------------------------------
// Per-discipline counting stats
// ---------------------------------------------------------------------------

/// Raw batting tallies. Every field defaults to 0 so partial upstream
/// payloads deserialize cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattingCounts {
    pub pa: u32,
    pub ab: u32,
    pub h: u32,
    pub doubles: u32,
    pub triples: u32,
    pub hr: u32,
    pub r: u32,
    pub rbi: u32,
    pub bb: u32,
    pub hbp: u32,
    pub so: u32,
    pub sb: u32,
    pub cs: u32,
    pub sf: u32,
}

impl BattingCounts {
    /// Singles are derived: hits minus extra-base hits.
    pub fn singles(&self) -> u32 {
        self.h
            .saturating_sub(self.doubles)
            .saturating_sub(self.triples)
            .saturating_sub(self.hr)
    }

    /// Total bases: 1B + 2*2B + 3*3B + 4*HR.
    pub fn total_bases(&self) -> u32 {
        self.singles() + 2 * self.doubles + 3 * self.triples + 4 * self.hr
    }

    pub fn fold(&mut self, other: &BattingCounts) {
        self.pa += other.pa;
        self.ab += other.ab;
        self.h += other.h;
        self.doubles += other.doubles;
        self.triples += other.triples;
        self.hr += other.hr;
        self.r += other.r;
        self.rbi += other.rbi;
        self.bb += other.bb;
        self.hbp += other.hbp;
        self.so += other.so;
        self.sb += other.sb;
        self.cs += other.cs;
        self.sf += other.sf;
    }
}

/// Raw pitching tallies. Innings are carried as [`InningsPitched`] and
/// folded in outs-space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchingCounts {
    pub ip: InningsPitched,
    pub batters_faced: u32,
    pub h: u32,
    pub r: u32,
    pub er: u32,
    pub bb: u32,
    pub hbp: u32,
    pub so: u32,
    pub hr: u32,
    pub w: u32,
    pub l: u32,
    pub sv: u32,
    pub holds: u32,
    pub gs: u32,
}

impl PitchingCounts {
    pub fn fold(&mut self, other: &PitchingCounts) {
        self.ip = self.ip.add(other.ip);
        self.batters_faced += other.batters_faced;
        self.h += other.h;
        self.r += other.r;
        self.er += other.er;
        self.bb += other.bb;
        self.hbp += other.hbp;
        self.so += other.so;
        self.hr += other.hr;
        self.w += other.w;
        self.l += other.l;
        self.sv += other.sv;
        self.holds += other.holds;
        self.gs += other.gs;
    }
}

/// Raw fielding tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldingCounts {
    pub innings: InningsPitched,
    pub po: u32,
    pub a: u32,
    pub e: u32,
    pub dp: u32,
}

impl FieldingCounts {
    /// Total chances: putouts + assists + errors.
    pub fn chances(&self) -> u32 {
        self.po + self.a + self.e
    }

    pub fn fold(&mut self, other: &FieldingCounts) {
        self.innings = self.innings.add(other.innings);
        self.po += other.po;
        self.a += other.a;
        self.e += other.e;
        self.dp += other.dp;
    }
}

// ---------------------------------------------------------------------------
// Per-game record
// ---------------------------------------------------------------------------

/// Whether a record tracks an individual player or a team aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Player,
    Team,
}

/// Game metadata attached to each per-game record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameContext {
    pub game_id: String,
    pub date: NaiveDate,
    pub opponent: String,
    pub home: bool,
    /// `Some(true)` for a win, `Some(false)` for a loss, `None` when the
    /// payload carried no final score.
    pub win: Option<bool>,
}

/// One entity's stat line for one game. Immutable once written; keyed by
/// (entity, season, date, game id) so double-headers stay distinct.
///
/// Discipline blocks are present only when the entity had qualifying
/// participation in that discipline for that game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStatRecord {
    pub entity_id: String,
    pub kind: EntityKind,
    pub name: String,
    pub team: String,
    pub season: u16,
    pub context: GameContext,
    pub batting: Option<BattingCounts>,
    pub pitching: Option<PitchingCounts>,
    pub fielding: Option<FieldingCounts>,
}

impl GameStatRecord {
    /// Names of the discipline blocks present, for failure-report context.
    pub fn disciplines(&self) -> String {
        let mut parts = Vec::new();
        if self.batting.is_some() {
            parts.push("batting");
        }
        if self.pitching.is_some() {
            parts.push("pitching");
        }
        if self.fielding.is_some() {
            parts.push("fielding");
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join("+")
        }
    }
}

// ---------------------------------------------------------------------------
// Season totals
// ---------------------------------------------------------------------------

/// Role classification derived from accumulated participation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Batter,
    Pitcher,
    TwoWay,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Batter => "batter",
            Classification::Pitcher => "pitcher",
            Classification::TwoWay => "two-way",
        }
    }
}

/// One metric's tier grade attached to a scored season record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubGrade {
    pub metric: String,
    pub tier: String,
}

/// Accumulated season-to-date record for one entity.
///
/// Counting sums are folded game by game; every rate stat is recomputed
/// from the current sums on each merge and is never summed directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonTotals {
    pub entity_id: String,
    pub kind: EntityKind,
    pub name: String,
    pub team: String,
    pub season: u16,

    pub games: u32,
    pub batting_games: u32,
    pub pitching_games: u32,

    pub batting: BattingCounts,
    pub pitching: PitchingCounts,
    pub fielding: FieldingCounts,

    pub batting_rates: BattingRates,
    pub pitching_rates: PitchingRates,
    pub fielding_rates: FieldingRates,

    pub classification: Option<Classification>,
    pub value_score: f64,
    pub sub_grades: Vec<SubGrade>,
    pub cvr: f64,
    pub salary: Option<u64>,

    pub last_updated: DateTime<Utc>,
}

impl SeasonTotals {
    /// Fresh zero record for an entity's first appearance in a season.
    pub fn new(entity_id: &str, kind: EntityKind, name: &str, team: &str, season: u16) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            kind,
            name: name.to_string(),
            team: team.to_string(),
            season,
            games: 0,
            batting_games: 0,
            pitching_games: 0,
            batting: BattingCounts::default(),
            pitching: PitchingCounts::default(),
            fielding: FieldingCounts::default(),
            batting_rates: BattingRates::default(),
            pitching_rates: PitchingRates::default(),
            fielding_rates: FieldingRates::default(),
            classification: None,
            value_score: 0.0,
            sub_grades: Vec::new(),
            cvr: 0.0,
            salary: None,
            last_updated: Utc::now(),
        }
    }
}
