//! Ordered, batched writes of the unified dataset.
//!
//! Tables go in [`TargetTable::LOAD_ORDER`]; each table is one transaction
//! committed after its last batch, so a failure mid-table leaves earlier
//! tables committed and the failing one rolled back.

use chrono::Utc;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::database_ops::staging::UnifiedDataset;
use crate::database_ops::target::{TargetStore, TargetTable};
use crate::error::{EtlError, Result};
use crate::models::Person;

/// Rows written per table; conflicts ignored by the target are not counted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub movies: u64,
    pub people: u64,
    pub movie_people: u64,
    pub genres: u64,
    pub movie_genres: u64,
}

macro_rules! load_table {
    ($target:expr, $table:expr, $rows:expr, $batch:expr, |$chunk:ident| $insert:expr) => {{
        let table = $table;
        let started = Instant::now();
        $target.begin(table).await?;
        let mut written = 0u64;
        let mut batches = 0usize;
        for $chunk in $rows.chunks($batch) {
            written += $insert.await?;
            batches += 1;
            debug!(%table, batch = batches, "batch written");
        }
        $target.commit(table).await?;
        info!(
            %table,
            rows = $rows.len(),
            written,
            batches,
            ms = started.elapsed().as_millis(),
            "table committed"
        );
        written
    }};
}

#[instrument(skip(target, data), fields(movies = data.movies.len(), people = data.people.len()))]
pub async fn load_all<T>(target: &mut T, data: UnifiedDataset, batch_size: usize) -> Result<LoadSummary>
where
    T: TargetStore + ?Sized,
{
    if batch_size == 0 {
        return Err(EtlError::Config("batch size must be positive".into()));
    }
    let UnifiedDataset {
        movies,
        people,
        mut movie_people,
        genres,
        movie_genres,
    } = data;
    let created_at = Utc::now();

    let movies_written = load_table!(target, TargetTable::Movies, movies, batch_size, |chunk| {
        target.insert_movies(chunk, created_at)
    });
    drop(movies);

    let person_ids = write_people(target, &people, batch_size).await?;
    let people_written = people
        .iter()
        .filter(|p| person_ids.get(&p.id) == Some(&p.id))
        .count() as u64;
    drop(people);

    // Point joins at the ids the target actually holds.
    for link in movie_people.iter_mut() {
        if let Some(stored) = person_ids.get(&link.person_id) {
            link.person_id = *stored;
        }
    }
    let movie_people_written = load_table!(
        target,
        TargetTable::MoviePeople,
        movie_people,
        batch_size,
        |chunk| target.insert_movie_people(chunk)
    );
    drop(movie_people);

    let genres_written = load_table!(target, TargetTable::Genres, genres, batch_size, |chunk| {
        target.insert_genres(chunk)
    });
    drop(genres);

    let movie_genres_written = load_table!(
        target,
        TargetTable::MovieGenres,
        movie_genres,
        batch_size,
        |chunk| target.insert_movie_genres(chunk)
    );

    Ok(LoadSummary {
        movies: movies_written,
        people: people_written,
        movie_people: movie_people_written,
        genres: genres_written,
        movie_genres: movie_genres_written,
    })
}

/// Write canonical people and map each submitted id to the stored one.
async fn write_people<T>(
    target: &mut T,
    people: &[Person],
    batch_size: usize,
) -> Result<HashMap<Uuid, Uuid>>
where
    T: TargetStore + ?Sized,
{
    let table = TargetTable::People;
    let started = Instant::now();
    target.begin(table).await?;
    let mut ids = HashMap::with_capacity(people.len());
    let mut batches = 0usize;
    for chunk in people.chunks(batch_size) {
        let stored = target.insert_people(chunk).await?;
        let by_name: HashMap<&str, Uuid> =
            stored.iter().map(|p| (p.name.as_str(), p.id)).collect();
        for person in chunk {
            let id = by_name.get(person.name.as_str()).copied().ok_or_else(|| {
                EtlError::write(
                    table,
                    format!("target returned no row for person {:?}", person.name),
                )
            })?;
            ids.insert(person.id, id);
        }
        batches += 1;
        debug!(%table, batch = batches, "batch written");
    }
    target.commit(table).await?;
    let reused = ids.iter().filter(|(minted, stored)| minted != stored).count();
    info!(
        %table,
        rows = people.len(),
        reused,
        batches,
        ms = started.elapsed().as_millis(),
        "table committed"
    );
    Ok(ids)
}
