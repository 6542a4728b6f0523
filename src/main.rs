// Boxline entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr, so the report stays clean on stdout)
// 2. Load config (boxline.toml, falling back to defaults)
// 3. Open the record store
// 4. Wire up game and salary sources
// 5. Run the season range
// 6. Print the run report

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use tracing::info;

use boxline::config::Config;
use boxline::ingest::{CsvSalarySource, DirectoryGameSource, SalaryBook, SeasonRunner};
use boxline::report;
use boxline::store::{KvStore, SqliteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("boxline starting up");

    // 2. Load config
    let config = Config::load_or_default(Path::new("boxline.toml"))
        .context("failed to load configuration")?;
    info!(
        season = config.season.year,
        data_dir = %config.season.data_dir,
        batch_size = config.effective_batch_size(),
        "config loaded"
    );

    // 3. Open the record store
    let store: Arc<dyn KvStore> =
        Arc::new(SqliteStore::open(&config.storage.path).context("failed to open record store")?);
    info!("record store opened at {}", config.storage.path);

    // 4. Wire up sources
    let source = Box::new(DirectoryGameSource::new(&config.season.data_dir));
    let salaries = match &config.season.salary_csv {
        Some(path) => {
            info!("salary data from {path}");
            SalaryBook::new(
                Some(Box::new(CsvSalarySource::new(path))),
                config.season.year,
            )
        }
        None => SalaryBook::empty(config.season.year),
    };

    let from = parse_date(&config.season.start, "season.start")?;
    let to = parse_date(&config.season.end, "season.end")?;

    // 5. Run the season range
    let mut runner = SeasonRunner::new(store, source, &config, salaries);
    let summary = runner.run(from, to).await.context("season run failed")?;

    // 6. Report
    report::log(&summary);
    print!("{}", report::render(&summary));

    if !summary.is_clean() {
        anyhow::bail!(
            "{} games and {} records failed; see report above",
            summary.failed_games.len(),
            summary.failed_records.len()
        );
    }
    Ok(())
}

fn parse_date(value: &str, field: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid {field} date: {value}"))
}

/// Initialize tracing to stderr; stdout carries the run report.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("boxline=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
