use anyhow::{Context, Result};
use clap::Parser;
use movies_etl::config::EtlConfig;
use movies_etl::pipeline;
use movies_etl::tracing::{init_tracing, DEFAULT_FILTER};
use movies_etl::util::env::init_env;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "sqlite_to_postgres",
    version,
    about = "Move the legacy SQLite movie catalogue into the normalized Postgres schema"
)]
struct Cli {
    /// Legacy database file (falls back to SQLITE_PATH, then ./db.sqlite)
    #[arg(long)]
    sqlite_path: Option<PathBuf>,
    /// Target Postgres DSN (falls back to DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_env();
    init_tracing(DEFAULT_FILTER)?;
    let cli = Cli::parse();

    let cfg = EtlConfig::from_env(cli.sqlite_path, cli.database_url)
        .context("configuration rejected")?;
    info!(config = ?cfg, "starting sqlite -> postgres transfer");

    let summary = match pipeline::run(&cfg).await {
        Ok(summary) => summary,
        Err(err) => {
            let stage = err.stage();
            return Err(err).with_context(|| format!("etl aborted during {stage} stage"));
        }
    };

    info!(
        rows_read = summary.rows_read,
        movies = summary.load.movies,
        people = summary.load.people,
        movie_people = summary.load.movie_people,
        genres = summary.load.genres,
        movie_genres = summary.load.movie_genres,
        took = %format!("{:.1}s", summary.elapsed.as_secs_f64()),
        "transfer complete"
    );
    Ok(())
}
