// Counting-stat extraction: one raw box-score payload in, typed per-entity
// stat deltas out.
//
// The extractor is a pure transform. Malformed numeric fields default to 0;
// a malformed player block is skipped with a warning and never aborts the
// game.

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::stats::counts::{
    BattingCounts, EntityKind, FieldingCounts, GameContext, GameStatRecord, InningsPitched,
    PitchingCounts,
};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("box score is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("box score has invalid date `{0}` (expected YYYY-MM-DD)")]
    InvalidDate(String),
}

// ---------------------------------------------------------------------------
// Lenient field access
// ---------------------------------------------------------------------------

/// Read a numeric field, defaulting anything missing or non-numeric to 0.
/// Values beyond the counter range saturate rather than wrap.
fn num(obj: &Value, key: &str) -> u32 {
    match obj.get(key) {
        Some(Value::Number(n)) => {
            let v = n
                .as_u64()
                .or_else(|| n.as_f64().map(|f| f.max(0.0).round() as u64))
                .unwrap_or(0);
            u32::try_from(v).unwrap_or(u32::MAX)
        }
        _ => 0,
    }
}

/// Read innings pitched from either an `outs` count or the conventional
/// `ip` notation ("6.2" as string or number).
fn innings(obj: &Value) -> InningsPitched {
    if let Some(Value::Number(n)) = obj.get("outs") {
        return InningsPitched::from_outs(n.as_u64().unwrap_or(0) as u32);
    }
    match obj.get("ip") {
        Some(Value::String(s)) => InningsPitched::parse(s).unwrap_or(InningsPitched::ZERO),
        Some(Value::Number(n)) => InningsPitched::from_notation(n.as_f64().unwrap_or(0.0)),
        _ => InningsPitched::ZERO,
    }
}

fn required_str<'a>(payload: &'a Value, key: &'static str) -> Result<&'a str, ExtractError> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .ok_or(ExtractError::MissingField(key))
}

// ---------------------------------------------------------------------------
// Per-discipline block parsing with qualification gates
// ---------------------------------------------------------------------------

/// Batting block, included only with qualifying participation (AB > 0 or
/// PA > 0 that game).
fn batting_block(player: &Value) -> Option<BattingCounts> {
    let block = player.get("batting")?;
    let counts = BattingCounts {
        pa: num(block, "pa"),
        ab: num(block, "ab"),
        h: num(block, "h"),
        doubles: num(block, "doubles"),
        triples: num(block, "triples"),
        hr: num(block, "hr"),
        r: num(block, "r"),
        rbi: num(block, "rbi"),
        bb: num(block, "bb"),
        hbp: num(block, "hbp"),
        so: num(block, "so"),
        sb: num(block, "sb"),
        cs: num(block, "cs"),
        sf: num(block, "sf"),
    };
    if counts.ab > 0 || counts.pa > 0 {
        Some(counts)
    } else {
        None
    }
}

/// Pitching block, included only with qualifying participation (at least
/// one out recorded or one batter faced).
fn pitching_block(player: &Value) -> Option<PitchingCounts> {
    let block = player.get("pitching")?;
    let counts = PitchingCounts {
        ip: innings(block),
        batters_faced: num(block, "batters_faced"),
        h: num(block, "h"),
        r: num(block, "r"),
        er: num(block, "er"),
        bb: num(block, "bb"),
        hbp: num(block, "hbp"),
        so: num(block, "so"),
        hr: num(block, "hr"),
        w: num(block, "w"),
        l: num(block, "l"),
        sv: num(block, "sv"),
        holds: num(block, "holds"),
        gs: num(block, "gs"),
    };
    if counts.ip.total_outs() > 0 || counts.batters_faced > 0 {
        Some(counts)
    } else {
        None
    }
}

/// Fielding block, included only with time in the field or a chance.
fn fielding_block(player: &Value) -> Option<FieldingCounts> {
    let block = player.get("fielding")?;
    let counts = FieldingCounts {
        innings: innings(block),
        po: num(block, "po"),
        a: num(block, "a"),
        e: num(block, "e"),
        dp: num(block, "dp"),
    };
    if counts.innings.total_outs() > 0 || counts.chances() > 0 {
        Some(counts)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Game extraction
// ---------------------------------------------------------------------------

/// Extract every qualifying per-player and per-team stat record from one
/// game's box-score payload.
///
/// Expected payload shape:
/// ```json
/// {
///   "game_id": "...", "season": 2025, "date": "2025-04-18",
///   "home": { "team": "NYY", "score": 5, "players": [...], "totals": {...} },
///   "away": { "team": "BOS", "score": 3, "players": [...], "totals": {...} }
/// }
/// ```
pub fn extract_game(payload: &Value) -> Result<Vec<GameStatRecord>, ExtractError> {
    let game_id = required_str(payload, "game_id")?;
    let date_str = required_str(payload, "date")?;
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| ExtractError::InvalidDate(date_str.to_string()))?;
    let season = payload
        .get("season")
        .and_then(Value::as_u64)
        .ok_or(ExtractError::MissingField("season"))? as u16;

    let home = payload.get("home").ok_or(ExtractError::MissingField("home"))?;
    let away = payload.get("away").ok_or(ExtractError::MissingField("away"))?;

    let home_team = required_str(home, "team")?;
    let away_team = required_str(away, "team")?;
    let home_score = home.get("score").and_then(Value::as_u64);
    let away_score = away.get("score").and_then(Value::as_u64);

    let win_for = |is_home: bool| -> Option<bool> {
        match (home_score, away_score) {
            (Some(h), Some(a)) if h != a => Some(if is_home { h > a } else { a > h }),
            _ => None,
        }
    };

    let mut records = Vec::new();
    for (side, is_home) in [(home, true), (away, false)] {
        let (team, opponent) = if is_home {
            (home_team, away_team)
        } else {
            (away_team, home_team)
        };
        let context = GameContext {
            game_id: game_id.to_string(),
            date,
            opponent: opponent.to_string(),
            home: is_home,
            win: win_for(is_home),
        };

        extract_side(side, team, season, &context, &mut records);
    }

    Ok(records)
}

/// Extract one side's players plus its team-aggregate record.
fn extract_side(
    side: &Value,
    team: &str,
    season: u16,
    context: &GameContext,
    records: &mut Vec<GameStatRecord>,
) {
    let players = side
        .get("players")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    for player in players {
        match player_record(player, team, season, context) {
            Some(rec) => records.push(rec),
            None => {
                warn!(
                    game_id = %context.game_id,
                    team,
                    "skipping malformed player block in box score"
                );
            }
        }
    }

    // Team-level aggregate, same gating as players.
    if let Some(totals) = side.get("totals") {
        let batting = batting_block(totals);
        let pitching = pitching_block(totals);
        let fielding = fielding_block(totals);
        if batting.is_some() || pitching.is_some() || fielding.is_some() {
            records.push(GameStatRecord {
                entity_id: format!("team:{team}"),
                kind: EntityKind::Team,
                name: team.to_string(),
                team: team.to_string(),
                season,
                context: context.clone(),
                batting,
                pitching,
                fielding,
            });
        }
    }
}

/// Build one player's record, or `None` when the block is malformed
/// (missing id/name) or the player had no qualifying participation.
fn player_record(
    player: &Value,
    team: &str,
    season: u16,
    context: &GameContext,
) -> Option<GameStatRecord> {
    if !player.is_object() {
        return None;
    }
    let entity_id = match player.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return None,
    };
    let name = player.get("name").and_then(Value::as_str)?;

    let batting = batting_block(player);
    let pitching = pitching_block(player);
    let fielding = fielding_block(player);

    // A present-but-unqualified player (pinch runner, defensive sub with no
    // chances) yields no record at all.
    if batting.is_none() && pitching.is_none() && fielding.is_none() {
        return None;
    }

    Some(GameStatRecord {
        entity_id,
        kind: EntityKind::Player,
        name: name.to_string(),
        team: team.to_string(),
        season,
        context: context.clone(),
        batting,
        pitching,
        fielding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> Value {
        json!({
            "game_id": "2025-04-18-NYY-BOS-1",
            "season": 2025,
            "date": "2025-04-18",
            "home": {
                "team": "NYY",
                "score": 5,
                "players": [
                    {
                        "id": "judge99",
                        "name": "A. Judge",
                        "batting": {"pa": 5, "ab": 4, "h": 2, "hr": 1, "bb": 1, "r": 2, "rbi": 3}
                    },
                    {
                        "id": "cole45",
                        "name": "G. Cole",
                        "pitching": {"ip": "6.2", "batters_faced": 27, "h": 5, "er": 2, "bb": 1, "so": 9, "gs": 1, "w": 1}
                    }
                ],
                "totals": {
                    "batting": {"pa": 38, "ab": 34, "h": 10, "hr": 2, "r": 5},
                    "pitching": {"ip": "9.0", "er": 3, "h": 8, "bb": 2, "so": 11}
                }
            },
            "away": {
                "team": "BOS",
                "score": 3,
                "players": [
                    {
                        "id": "devers11",
                        "name": "R. Devers",
                        "batting": {"pa": 4, "ab": 4, "h": 1}
                    }
                ]
            }
        })
    }

    #[test]
    fn extracts_players_and_team_totals() {
        let records = extract_game(&sample_payload()).unwrap();
        // Two home players + home team totals + one away player.
        assert_eq!(records.len(), 4);

        let judge = records.iter().find(|r| r.entity_id == "judge99").unwrap();
        assert_eq!(judge.kind, EntityKind::Player);
        assert_eq!(judge.team, "NYY");
        assert!(judge.batting.is_some());
        assert!(judge.pitching.is_none());
        assert_eq!(judge.batting.unwrap().hr, 1);
        assert_eq!(judge.context.win, Some(true));
        assert!(judge.context.home);

        let cole = records.iter().find(|r| r.entity_id == "cole45").unwrap();
        assert!(cole.batting.is_none());
        let pitching = cole.pitching.unwrap();
        assert_eq!(pitching.ip.total_outs(), 20);
        assert_eq!(pitching.so, 9);

        let team = records.iter().find(|r| r.entity_id == "team:NYY").unwrap();
        assert_eq!(team.kind, EntityKind::Team);
        assert!(team.batting.is_some());
        assert!(team.pitching.is_some());

        let devers = records.iter().find(|r| r.entity_id == "devers11").unwrap();
        assert_eq!(devers.context.win, Some(false));
        assert!(!devers.context.home);
        assert_eq!(devers.context.opponent, "NYY");
    }

    #[test]
    fn malformed_player_is_skipped_not_fatal() {
        let payload = json!({
            "game_id": "g1",
            "season": 2025,
            "date": "2025-05-01",
            "home": {
                "team": "NYY",
                "players": [
                    "not an object",
                    {"name": "No Id", "batting": {"ab": 4, "h": 1}},
                    {"id": "ok1", "name": "Fine Player", "batting": {"ab": 3, "h": 1}}
                ]
            },
            "away": {"team": "BOS", "players": []}
        });
        let records = extract_game(&payload).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entity_id, "ok1");
    }

    #[test]
    fn malformed_numeric_fields_default_to_zero() {
        let payload = json!({
            "game_id": "g1",
            "season": 2025,
            "date": "2025-05-01",
            "home": {
                "team": "NYY",
                "players": [
                    {"id": "p1", "name": "P One",
                     "batting": {"ab": 4, "h": "two", "hr": null, "bb": 1}}
                ]
            },
            "away": {"team": "BOS", "players": []}
        });
        let records = extract_game(&payload).unwrap();
        let b = records[0].batting.unwrap();
        assert_eq!(b.ab, 4);
        assert_eq!(b.h, 0);
        assert_eq!(b.hr, 0);
        assert_eq!(b.bb, 1);
    }

    #[test]
    fn oversized_numeric_fields_saturate() {
        let payload = json!({
            "game_id": "g1",
            "season": 2025,
            "date": "2025-05-01",
            "home": {
                "team": "NYY",
                "players": [
                    {"id": "p1", "name": "P One",
                     "batting": {"ab": 4, "h": 1, "rbi": 99_999_999_999u64}}
                ]
            },
            "away": {"team": "BOS", "players": []}
        });
        let records = extract_game(&payload).unwrap();
        let b = records[0].batting.unwrap();
        assert_eq!(b.ab, 4);
        assert_eq!(b.rbi, u32::MAX);
    }

    #[test]
    fn unqualified_disciplines_are_omitted() {
        // Zero-AB, zero-PA batting block is dropped; one-out pitching kept.
        let payload = json!({
            "game_id": "g1",
            "season": 2025,
            "date": "2025-05-01",
            "home": {
                "team": "NYY",
                "players": [
                    {"id": "p1", "name": "Reliever",
                     "batting": {"ab": 0, "pa": 0},
                     "pitching": {"outs": 1, "so": 1}}
                ]
            },
            "away": {"team": "BOS", "players": []}
        });
        let records = extract_game(&payload).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].batting.is_none());
        assert_eq!(records[0].pitching.unwrap().ip.total_outs(), 1);
    }

    #[test]
    fn player_with_no_qualifying_participation_yields_no_record() {
        let payload = json!({
            "game_id": "g1",
            "season": 2025,
            "date": "2025-05-01",
            "home": {
                "team": "NYY",
                "players": [
                    {"id": "pr1", "name": "Pinch Runner",
                     "batting": {"ab": 0, "pa": 0, "sb": 1}}
                ]
            },
            "away": {"team": "BOS", "players": []}
        });
        let records = extract_game(&payload).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn missing_game_metadata_is_an_error() {
        let payload = json!({"season": 2025, "date": "2025-05-01"});
        let err = extract_game(&payload).unwrap_err();
        assert!(matches!(err, ExtractError::MissingField("game_id")));

        let bad_date = json!({
            "game_id": "g1", "season": 2025, "date": "05/01/2025",
            "home": {"team": "A"}, "away": {"team": "B"}
        });
        assert!(matches!(
            extract_game(&bad_date).unwrap_err(),
            ExtractError::InvalidDate(_)
        ));
    }

    #[test]
    fn tie_or_missing_score_leaves_win_unset() {
        let payload = json!({
            "game_id": "g1",
            "season": 2025,
            "date": "2025-05-01",
            "home": {
                "team": "NYY",
                "players": [{"id": "p1", "name": "P", "batting": {"ab": 4, "h": 1}}]
            },
            "away": {"team": "BOS", "players": []}
        });
        let records = extract_game(&payload).unwrap();
        assert_eq!(records[0].context.win, None);
    }

    #[test]
    fn numeric_player_ids_are_accepted() {
        let payload = json!({
            "game_id": "g1",
            "season": 2025,
            "date": "2025-05-01",
            "home": {
                "team": "NYY",
                "players": [{"id": 660271, "name": "S. Ohtani", "batting": {"ab": 4, "h": 2}}]
            },
            "away": {"team": "BOS", "players": []}
        });
        let records = extract_game(&payload).unwrap();
        assert_eq!(records[0].entity_id, "660271");
    }
}
