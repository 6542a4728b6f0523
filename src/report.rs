// End-of-run reporting: a plain-text summary block plus structured log
// lines for every record that permanently failed to persist.

use std::fmt::Write as _;

use tracing::{error, info};

use crate::ingest::RunSummary;

/// Render the run summary as a plain-text block for stdout.
pub fn render(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "season run summary");
    let _ = writeln!(out, "  games scheduled:    {}", summary.games_scheduled);
    let _ = writeln!(out, "  games processed:    {}", summary.games_processed);
    let _ = writeln!(out, "  records written:    {}", summary.records_written);
    let _ = writeln!(out, "  conflicts refused:  {}", summary.conflicts);
    let _ = writeln!(out, "  baseline refreshes: {}", summary.baseline_refreshes);
    let _ = writeln!(
        out,
        "  elapsed:            {:.1}s",
        summary.elapsed.as_secs_f64()
    );

    if !summary.failed_games.is_empty() {
        let _ = writeln!(out, "  failed games:       {}", summary.failed_games.len());
        for game in &summary.failed_games {
            let _ = writeln!(out, "    {} ({}): {}", game.game_id, game.date, game.reason);
        }
    }

    if !summary.failed_records.is_empty() {
        let _ = writeln!(
            out,
            "  failed records:     {} (require manual reconciliation)",
            summary.failed_records.len()
        );
        for rec in &summary.failed_records {
            let _ = writeln!(
                out,
                "    {} game={} date={} disciplines={}: {}",
                rec.key, rec.game_id, rec.date, rec.disciplines, rec.reason
            );
        }
    }

    if summary.is_clean() {
        let _ = writeln!(out, "  all scheduled games fully persisted");
    }

    out
}

/// Emit the summary through tracing. Permanent failures go out at error
/// level with full reconciliation context.
pub fn log(summary: &RunSummary) {
    info!(
        games_scheduled = summary.games_scheduled,
        games_processed = summary.games_processed,
        records_written = summary.records_written,
        conflicts = summary.conflicts,
        baseline_refreshes = summary.baseline_refreshes,
        "run summary"
    );
    for game in &summary.failed_games {
        error!(
            game_id = %game.game_id,
            date = %game.date,
            reason = %game.reason,
            "game failed"
        );
    }
    for rec in &summary.failed_records {
        error!(
            key = %rec.key,
            game_id = %rec.game_id,
            date = %rec.date,
            disciplines = %rec.disciplines,
            reason = %rec.reason,
            "record permanently failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::FailedGame;
    use crate::store::RecordFailure;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn base_summary() -> RunSummary {
        RunSummary {
            games_scheduled: 10,
            games_processed: 9,
            records_written: 41,
            conflicts: 1,
            baseline_refreshes: 2,
            failed_games: Vec::new(),
            failed_records: Vec::new(),
            elapsed: Duration::from_millis(2500),
        }
    }

    #[test]
    fn clean_run_renders_totals() {
        let text = render(&base_summary());
        assert!(text.contains("games scheduled:    10"));
        assert!(text.contains("records written:    41"));
        assert!(text.contains("conflicts refused:  1"));
        assert!(text.contains("elapsed:            2.5s"));
        assert!(text.contains("fully persisted"));
    }

    #[test]
    fn failures_render_with_reconciliation_context() {
        let mut summary = base_summary();
        summary.failed_games.push(FailedGame {
            game_id: "g9".into(),
            date: NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(),
            reason: "box score missing".into(),
        });
        summary.failed_records.push(RecordFailure {
            key: "game:2025:judge99:2025-07-04:g9".into(),
            game_id: "g9".into(),
            date: NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(),
            disciplines: "batting+fielding".into(),
            reason: "disk full".into(),
        });

        let text = render(&summary);
        assert!(text.contains("failed games:       1"));
        assert!(text.contains("g9 (2025-07-04): box score missing"));
        assert!(text.contains("disciplines=batting+fielding"));
        assert!(!text.contains("fully persisted"));
    }
}
