// Domain records flowing through the legacy -> content migration.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One row of the legacy aggregate query, columns kept as the source renders them.
///
/// `writers` already holds the normalized JSON array (see
/// `normalization::writers::normalize_writer_refs`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub source_id: String,
    pub genre: Option<String>,
    pub director: Option<String>,
    pub title: String,
    pub plot: Option<String>,
    pub imdb_rating: Option<String>,
    pub actors_ids: Option<String>,
    pub actors_names: Option<String>,
    pub writers: String,
}

/// Writer reference embedded in the `writers` JSON column.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WriterRef {
    #[serde(deserialize_with = "crate::normalization::writers::id_from_string_or_number")]
    pub id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilmworkKind {
    #[default]
    Movie,
    TvShow,
}

impl FilmworkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilmworkKind::Movie => "movie",
            FilmworkKind::TvShow => "tv_show",
        }
    }
}

impl fmt::Display for FilmworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Movie {
    pub id: Uuid,
    pub title: String,
    pub rating: Option<f64>,
    pub description: Option<String>,
    pub kind: FilmworkKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Person {
    pub id: Uuid,
    pub name: String,
}

impl Person {
    /// Mint a person with a fresh id; identity is settled later by name.
    pub fn mint(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Genre {
    pub id: Uuid,
    pub name: String,
}

impl Genre {
    pub fn mint(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// Join row `person_film_work`. The role is not carried by the legacy source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoviePerson {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub person_id: Uuid,
}

/// Join row `genre_film_work`, keyed by genre name rather than genre id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovieGenre {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub genre_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeopleContext {
    pub movie_id: Uuid,
    pub people: Vec<Person>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenresContext {
    pub movie_id: Uuid,
    pub genres: Vec<Genre>,
}

/// Output of the transformer for a single legacy row.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRecord {
    pub movie: Movie,
    pub genres: Vec<Genre>,
    pub people_with_context: PeopleContext,
    pub genres_with_context: GenresContext,
}
