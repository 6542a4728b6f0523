// Rate-stat derivation: pure functions from counting-stat sums to derived
// rate bundles.
//
// Rates are recomputed from scratch on every season merge. Nothing here is
// ever summed across games.

use serde::{Deserialize, Serialize};

use crate::stats::counts::{BattingCounts, FieldingCounts, PitchingCounts};

/// Sentinel for ratio stats (K/BB style) with a positive numerator over a
/// zero denominator. Every other division by zero yields 0.0.
pub const RATIO_SENTINEL: f64 = 99.99;

/// League constant added to the FIP core. Graded relatively against the
/// baseline, so a fixed constant only shifts all entities equally.
pub const FIP_CONSTANT: f64 = 3.10;

// wOBA linear weights (per-event run values over PA).
const WOBA_BB: f64 = 0.69;
const WOBA_HBP: f64 = 0.72;
const WOBA_1B: f64 = 0.89;
const WOBA_2B: f64 = 1.27;
const WOBA_3B: f64 = 1.62;
const WOBA_HR: f64 = 2.10;

// ---------------------------------------------------------------------------
// Derived-rate bundles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattingRates {
    pub avg: f64,
    pub obp: f64,
    pub slg: f64,
    pub ops: f64,
    pub iso: f64,
    pub woba: f64,
    pub k_pct: f64,
    pub bb_pct: f64,
    /// HR per plate appearance.
    pub hr_rate: f64,
    /// SB per plate appearance.
    pub sb_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchingRates {
    pub era: f64,
    pub whip: f64,
    pub k9: f64,
    pub bb9: f64,
    pub hr9: f64,
    pub fip: f64,
    pub k_bb: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldingRates {
    pub fpct: f64,
    /// Range factor: (PO + A) per nine innings in the field.
    pub rf9: f64,
}

// ---------------------------------------------------------------------------
// Rounding and division helpers
// ---------------------------------------------------------------------------

/// Round to 3 decimals (averages, OBP, SLG, OPS, wOBA).
pub fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Round to 2 decimals (ERA, WHIP, FIP, K/BB).
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Round to 1 decimal (per-9 rates).
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Division that yields 0.0 (not NaN or infinity) on a zero denominator.
fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Ratio division: zero denominator with a positive numerator returns the
/// large sentinel instead of 0.
fn ratio_div(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        if num > 0.0 {
            RATIO_SENTINEL
        } else {
            0.0
        }
    } else {
        num / den
    }
}

// ---------------------------------------------------------------------------
// Per-discipline calculators
// ---------------------------------------------------------------------------

/// Derive all batting rates from counting sums.
pub fn batting_rates(c: &BattingCounts) -> BattingRates {
    let ab = c.ab as f64;
    let pa = c.pa as f64;
    let h = c.h as f64;
    let bb = c.bb as f64;
    let hbp = c.hbp as f64;
    let sf = c.sf as f64;

    let avg = safe_div(h, ab);
    let obp = safe_div(h + bb + hbp, ab + bb + hbp + sf);
    let slg = safe_div(c.total_bases() as f64, ab);
    let ops = obp + slg;
    let iso = slg - avg;

    let woba_num = WOBA_BB * bb
        + WOBA_HBP * hbp
        + WOBA_1B * c.singles() as f64
        + WOBA_2B * c.doubles as f64
        + WOBA_3B * c.triples as f64
        + WOBA_HR * c.hr as f64;
    let woba = safe_div(woba_num, pa);

    BattingRates {
        avg: round3(avg),
        obp: round3(obp),
        slg: round3(slg),
        ops: round3(ops),
        iso: round3(iso),
        woba: round3(woba),
        k_pct: round3(safe_div(c.so as f64, pa)),
        bb_pct: round3(safe_div(bb, pa)),
        hr_rate: round3(safe_div(c.hr as f64, pa)),
        sb_rate: round3(safe_div(c.sb as f64, pa)),
    }
}

/// Derive all pitching rates from counting sums. Innings come in as outs
/// and are converted to true thirds for the denominators.
pub fn pitching_rates(c: &PitchingCounts) -> PitchingRates {
    let ip = c.ip.as_f64();
    let er = c.er as f64;
    let bb = c.bb as f64;
    let h = c.h as f64;
    let so = c.so as f64;
    let hr = c.hr as f64;
    let hbp = c.hbp as f64;

    let fip_core = safe_div(13.0 * hr + 3.0 * (bb + hbp) - 2.0 * so, ip);
    // A pitcher with zero innings has no FIP to speak of; leave it at 0
    // rather than emitting the bare constant.
    let fip = if ip == 0.0 { 0.0 } else { fip_core + FIP_CONSTANT };

    PitchingRates {
        era: round2(safe_div(9.0 * er, ip)),
        whip: round2(safe_div(bb + h, ip)),
        k9: round1(safe_div(9.0 * so, ip)),
        bb9: round1(safe_div(9.0 * bb, ip)),
        hr9: round1(safe_div(9.0 * hr, ip)),
        fip: round2(fip),
        k_bb: round2(ratio_div(so, bb)),
    }
}

/// Derive fielding rates from counting sums.
pub fn fielding_rates(c: &FieldingCounts) -> FieldingRates {
    let innings = c.innings.as_f64();
    let fpct = safe_div((c.po + c.a) as f64, c.chances() as f64);
    let rf9 = safe_div(9.0 * (c.po + c.a) as f64, innings);
    FieldingRates {
        fpct: round3(fpct),
        rf9: round1(rf9),
    }
}
