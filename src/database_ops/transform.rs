//! Row-level transformation: one legacy aggregate row in, one structured
//! record out. Entities minted here carry fresh ids; cross-row identity is
//! settled later in `unify`.

use itertools::{EitherOrBoth, Itertools};
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

use crate::database_ops::sqlite_source::WriterIdentities;
use crate::error::{EtlError, Result};
use crate::models::{
    FilmworkKind, Genre, GenresContext, Movie, PeopleContext, Person, RawRow, TransformedRecord,
};
use crate::normalization::sentinel::{is_sentinel, non_sentinel, parse_rating, split_list};
use crate::normalization::writers::parse_writer_refs;

pub fn transform_row(row: &RawRow, writers: &WriterIdentities) -> Result<TransformedRecord> {
    let movie_writers = resolve_writers(row, writers)?;
    let directors = split_directors(row.director.as_deref());
    let actors = zip_actors(row);

    // writers, then directors, then actors
    let mut people = movie_writers;
    people.extend(directors);
    people.extend(actors);

    let rating = parse_rating(row.imdb_rating.as_deref())
        .map_err(|reason| EtlError::malformed(&row.source_id, reason))?;
    let movie = Movie {
        id: Uuid::new_v4(),
        title: row.title.clone(),
        rating,
        description: non_sentinel(row.plot.as_deref()).map(str::to_string),
        kind: FilmworkKind::Movie,
    };

    let genres: Vec<Genre> = row
        .genre
        .as_deref()
        .map(|raw| split_list(raw).map(Genre::mint).collect())
        .unwrap_or_default();

    Ok(TransformedRecord {
        people_with_context: PeopleContext {
            movie_id: movie.id,
            people,
        },
        genres_with_context: GenresContext {
            movie_id: movie.id,
            genres: genres.clone(),
        },
        genres,
        movie,
    })
}

/// Writers referenced by the row, deduplicated by legacy id and without the
/// "unknown" writer.
fn resolve_writers(row: &RawRow, writers: &WriterIdentities) -> Result<Vec<Person>> {
    let refs = parse_writer_refs(&row.writers).map_err(|e| {
        EtlError::malformed(&row.source_id, format!("writers column is not valid JSON: {e}"))
    })?;

    let mut seen: HashSet<&str> = HashSet::new();
    let mut resolved = Vec::with_capacity(refs.len());
    for writer_ref in &refs {
        let writer = writers.get(&writer_ref.id).ok_or_else(|| {
            EtlError::malformed(
                &row.source_id,
                format!("writer id {:?} is not in the writers table", writer_ref.id),
            )
        })?;
        if is_sentinel(&writer.name) || !seen.insert(writer_ref.id.as_str()) {
            continue;
        }
        resolved.push(writer.clone());
    }
    Ok(resolved)
}

fn split_directors(raw: Option<&str>) -> Vec<Person> {
    match non_sentinel(raw) {
        Some(directors) => split_list(directors).map(Person::mint).collect(),
        None => Vec::new(),
    }
}

/// Pair the two `group_concat` lists positionally. The legacy actor id is
/// dropped; every mention gets a fresh id.
fn zip_actors(row: &RawRow) -> Vec<Person> {
    let (Some(ids), Some(names)) = (row.actors_ids.as_deref(), row.actors_names.as_deref()) else {
        return Vec::new();
    };

    let mut actors = Vec::new();
    for pair in ids.split(',').zip_longest(names.split(',')) {
        match pair {
            EitherOrBoth::Both(_id, name) => {
                let name = name.trim();
                if !is_sentinel(name) {
                    actors.push(Person::mint(name));
                }
            }
            EitherOrBoth::Left(_) | EitherOrBoth::Right(_) => {
                warn!(
                    row = %row.source_id,
                    "actor id and name lists differ in length; extra entries dropped"
                );
                break;
            }
        }
    }
    actors
}
