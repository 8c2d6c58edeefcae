//! One ETL run: read + transform every legacy row into staging, unify, load.

use std::time::{Duration, Instant};
use tracing::{info, instrument};

use crate::config::EtlConfig;
use crate::database_ops::db::Db;
use crate::database_ops::loader::{load_all, LoadSummary};
use crate::database_ops::sqlite_source::SqliteSource;
use crate::database_ops::staging::Staging;
use crate::database_ops::target::{MemoryTarget, TargetStore};
use crate::database_ops::transform::transform_row;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub rows_read: usize,
    pub load: LoadSummary,
    pub elapsed: Duration,
}

struct Progress {
    label: &'static str,
    every: usize,
    start: Instant,
    processed: usize,
}

impl Progress {
    fn new(label: &'static str, every: usize) -> Self {
        Self {
            label,
            every: every.max(1),
            start: Instant::now(),
            processed: 0,
        }
    }

    fn tick(&mut self) {
        self.processed += 1;
        if self.processed % self.every == 0 {
            self.log("progress");
        }
    }

    fn finish(&self) {
        self.log("done");
    }

    fn log(&self, what: &'static str) {
        let elapsed = self.start.elapsed().as_secs_f64().max(0.001);
        let rate = self.processed as f64 / elapsed;
        info!(
            target: "progress",
            label = self.label,
            processed = self.processed,
            rate = %format!("{rate:.1}/s"),
            took = %format!("{elapsed:.1}s"),
            "{what}"
        );
    }
}

/// Open both stores from `cfg`, run, and release the target connection on
/// every exit path.
pub async fn run(cfg: &EtlConfig) -> Result<RunSummary> {
    cfg.validate()?;
    let source = SqliteSource::open(&cfg.sqlite_path)?;

    if cfg.dry_run {
        let mut target = MemoryTarget::new();
        let summary = run_with_connections(source, &mut target, cfg).await?;
        info!(
            movies = target.committed().movies.len(),
            people = target.committed().people.len(),
            "dry run: nothing written to postgres"
        );
        return Ok(summary);
    }

    let mut db = Db::connect(&cfg.database_url, &cfg.target_schema, cfg.fast_ingest).await?;
    let result = run_with_connections(source, &mut db, cfg).await;
    db.close().await;
    result
}

/// Run against already-open stores. The source is consumed and closed as
/// soon as every row has been staged.
#[instrument(skip_all, fields(link_mode = ?cfg.link_mode, batch_size = cfg.batch_size))]
pub async fn run_with_connections<T>(
    source: SqliteSource,
    target: &mut T,
    cfg: &EtlConfig,
) -> Result<RunSummary>
where
    T: TargetStore + ?Sized,
{
    let started = Instant::now();
    let staging = stage_all(source, cfg.progress_interval)?;
    let rows_read = staging.len();

    let dataset = staging.into_unified(cfg.link_mode);
    info!(
        movies = dataset.movies.len(),
        people = dataset.people.len(),
        movie_people = dataset.movie_people.len(),
        genres = dataset.genres.len(),
        movie_genres = dataset.movie_genres.len(),
        "unified"
    );

    let load = load_all(target, dataset, cfg.batch_size).await?;
    Ok(RunSummary {
        rows_read,
        load,
        elapsed: started.elapsed(),
    })
}

fn stage_all(source: SqliteSource, progress_interval: usize) -> Result<Staging> {
    let writers = source.load_writer_identities()?;
    let mut rows = source.load_rows()?;
    let mut staging = Staging::default();
    let mut progress = Progress::new("transform", progress_interval);
    for row in rows.iter()? {
        staging.push(transform_row(&row?, &writers)?);
        progress.tick();
    }
    progress.finish();
    Ok(staging)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::sqlite_source::fixtures::legacy_db;
    use crate::database_ops::target::TargetTable;
    use crate::database_ops::unify::PersonLinkMode;
    use crate::error::{EtlError, Stage};

    fn cfg(link_mode: PersonLinkMode) -> EtlConfig {
        EtlConfig {
            dry_run: true,
            link_mode,
            batch_size: 2,
            ..EtlConfig::default()
        }
    }

    fn source() -> SqliteSource {
        SqliteSource::from_connection(legacy_db()).unwrap()
    }

    fn joins_for(target: &MemoryTarget, name: &str) -> usize {
        let tables = target.committed();
        let Some(id) = tables.person_id(name) else {
            return 0;
        };
        tables.movie_people.values().filter(|l| l.person_id == id).count()
    }

    #[tokio::test]
    async fn legacy_catalogue_loads_end_to_end() {
        let mut target = MemoryTarget::new();
        let summary = run_with_connections(source(), &mut target, &cfg(PersonLinkMode::FirstMention))
            .await
            .unwrap();

        assert_eq!(summary.rows_read, 2);
        assert_eq!(
            summary.load,
            LoadSummary {
                movies: 2,
                // Gene Roddenberry, D.C. Fontana, Jane Doe, John Roe, Ann Lee, Bob Stone
                people: 6,
                movie_people: 6,
                genres: 2,
                movie_genres: 3,
            }
        );
        assert_eq!(target.commits(), &TargetTable::LOAD_ORDER);

        let tables = target.committed();
        assert!(tables.person_id("N/A").is_none());
        assert!(tables.has_genre("Action") && tables.has_genre("Drama"));
        let second = tables
            .movies
            .values()
            .map(|(m, _)| m)
            .find(|m| m.title == "Second Look")
            .unwrap();
        assert_eq!(second.rating, None);
        assert_eq!(second.description, None);
    }

    #[tokio::test]
    async fn shared_actor_join_count_depends_on_link_mode() {
        let mut legacy = MemoryTarget::new();
        run_with_connections(source(), &mut legacy, &cfg(PersonLinkMode::FirstMention))
            .await
            .unwrap();
        assert_eq!(joins_for(&legacy, "Ann Lee"), 1);
        assert_eq!(legacy.committed().movie_people.len(), 6);

        let mut every = MemoryTarget::new();
        run_with_connections(source(), &mut every, &cfg(PersonLinkMode::EveryMention))
            .await
            .unwrap();
        assert_eq!(joins_for(&every, "Ann Lee"), 2);
        assert_eq!(joins_for(&every, "Gene Roddenberry"), 2);
        assert_eq!(every.committed().movie_people.len(), 8);
        assert_eq!(every.committed().people.len(), 6);
    }

    #[tokio::test]
    async fn rerun_adds_no_people_or_genres() {
        let mut target = MemoryTarget::new();
        let cfg = cfg(PersonLinkMode::EveryMention);
        run_with_connections(source(), &mut target, &cfg).await.unwrap();
        let again = run_with_connections(source(), &mut target, &cfg)
            .await
            .unwrap();

        assert_eq!(again.load.people, 0);
        assert_eq!(again.load.genres, 0);
        let tables = target.committed();
        assert_eq!(tables.people.len(), 6);
        assert_eq!(tables.genres.len(), 2);
        // movie ids are minted per run, so every legacy row lands again
        assert_eq!(tables.movies.len(), 4);
        assert!(tables
            .movie_people
            .values()
            .all(|l| tables.people.contains_key(&l.person_id)));
    }

    #[tokio::test]
    async fn dangling_writer_aborts_before_any_write() {
        let conn = legacy_db();
        conn.execute(
            "INSERT INTO movies VALUES ('tt09', 'Drama', 'N/A', 'w404', 'Ghost', 'N/A', '', '6', '')",
            [],
        )
        .unwrap();
        let mut target = MemoryTarget::new();
        let err = run_with_connections(
            SqliteSource::from_connection(conn).unwrap(),
            &mut target,
            &cfg(PersonLinkMode::FirstMention),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, EtlError::MalformedRow { ref row_id, .. } if row_id == "tt09"));
        assert_eq!(err.stage(), Stage::Transform);
        assert!(target.commits().is_empty());
    }

    #[tokio::test]
    async fn missing_sqlite_file_is_a_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EtlConfig {
            sqlite_path: dir.path().join("absent.sqlite"),
            ..cfg(PersonLinkMode::FirstMention)
        };
        let err = run(&cfg).await.unwrap_err();
        assert!(matches!(err, EtlError::Connection { .. }));
    }

    #[test]
    fn progress_counts_every_row() {
        let mut progress = Progress::new("test", 2);
        for _ in 0..5 {
            progress.tick();
        }
        progress.finish();
        assert_eq!(progress.processed, 5);
    }
}
