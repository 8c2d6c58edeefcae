//! Write surface of the normalized `content` schema.
//!
//! [`TargetStore`] is what the loader drives; [`crate::database_ops::db::Db`]
//! implements it for Postgres and [`MemoryTarget`] keeps the same constraint
//! and conflict semantics in memory (dry runs, tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

use crate::error::{EtlError, Result};
use crate::models::{Genre, Movie, MovieGenre, MoviePerson, Person};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetTable {
    Movies,
    People,
    MoviePeople,
    Genres,
    MovieGenres,
}

impl TargetTable {
    /// Dependency order: parents before the joins referencing them.
    pub const LOAD_ORDER: [TargetTable; 5] = [
        TargetTable::Movies,
        TargetTable::People,
        TargetTable::MoviePeople,
        TargetTable::Genres,
        TargetTable::MovieGenres,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            TargetTable::Movies => "film_work",
            TargetTable::People => "person",
            TargetTable::MoviePeople => "person_film_work",
            TargetTable::Genres => "genre",
            TargetTable::MovieGenres => "genre_film_work",
        }
    }
}

impl fmt::Display for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Batched, per-table transactional writes with insert-or-ignore conflict
/// handling. Every insert happens between `begin` and `commit` of its table.
#[async_trait]
pub trait TargetStore: Send {
    async fn begin(&mut self, table: TargetTable) -> Result<()>;

    async fn insert_movies(&mut self, rows: &[Movie], created_at: DateTime<Utc>) -> Result<u64>;

    /// Returns the row the store holds for every name in `rows`; on a name
    /// conflict that is the previously stored id.
    async fn insert_people(&mut self, rows: &[Person]) -> Result<Vec<Person>>;

    async fn insert_movie_people(&mut self, rows: &[MoviePerson]) -> Result<u64>;

    async fn insert_genres(&mut self, rows: &[Genre]) -> Result<u64>;

    async fn insert_movie_genres(&mut self, rows: &[MovieGenre]) -> Result<u64>;

    async fn commit(&mut self, table: TargetTable) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryTables {
    pub movies: HashMap<Uuid, (Movie, DateTime<Utc>)>,
    pub people: HashMap<Uuid, Person>,
    pub movie_people: HashMap<Uuid, MoviePerson>,
    pub genres: HashMap<Uuid, Genre>,
    pub movie_genres: HashMap<Uuid, MovieGenre>,
    person_by_name: HashMap<String, Uuid>,
    movie_person_pairs: HashSet<(Uuid, Uuid)>,
    genre_names: HashSet<String>,
}

impl MemoryTables {
    pub fn person_id(&self, name: &str) -> Option<Uuid> {
        self.person_by_name.get(name).copied()
    }

    pub fn has_genre(&self, name: &str) -> bool {
        self.genre_names.contains(name)
    }
}

/// In-memory target: primary keys, `person.name` / `genre.genre` uniqueness,
/// `(film_work_id, person_id)` uniqueness and every foreign key are enforced.
/// Writes outside a committed transaction are discarded.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    committed: MemoryTables,
    open: Option<(TargetTable, MemoryTables)>,
    fail_on: Option<TargetTable>,
    commits: Vec<TargetTable>,
    batches: Vec<(TargetTable, usize)>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every insert into `table`, as a store refusing a batch would.
    pub fn failing_on(table: TargetTable) -> Self {
        Self {
            fail_on: Some(table),
            ..Self::default()
        }
    }

    pub fn committed(&self) -> &MemoryTables {
        &self.committed
    }

    /// Tables committed so far, in commit order.
    pub fn commits(&self) -> &[TargetTable] {
        &self.commits
    }

    /// Every insert call received, as (table, rows in batch).
    pub fn batches(&self) -> &[(TargetTable, usize)] {
        &self.batches
    }

    fn working(&mut self, table: TargetTable, rows: usize) -> Result<&mut MemoryTables> {
        self.batches.push((table, rows));
        if self.fail_on == Some(table) {
            return Err(EtlError::write(table, "batch rejected by target"));
        }
        match self.open.as_mut() {
            Some((open, tables)) if *open == table => Ok(tables),
            _ => Err(EtlError::write(table, "no open transaction for table")),
        }
    }
}

#[async_trait]
impl TargetStore for MemoryTarget {
    async fn begin(&mut self, table: TargetTable) -> Result<()> {
        self.open = Some((table, self.committed.clone()));
        Ok(())
    }

    async fn insert_movies(&mut self, rows: &[Movie], created_at: DateTime<Utc>) -> Result<u64> {
        let tables = self.working(TargetTable::Movies, rows.len())?;
        let mut written = 0;
        for movie in rows {
            if tables.movies.contains_key(&movie.id) {
                continue;
            }
            tables.movies.insert(movie.id, (movie.clone(), created_at));
            written += 1;
        }
        Ok(written)
    }

    async fn insert_people(&mut self, rows: &[Person]) -> Result<Vec<Person>> {
        let tables = self.working(TargetTable::People, rows.len())?;
        let mut stored = Vec::with_capacity(rows.len());
        for person in rows {
            if let Some(existing) = tables.person_by_name.get(&person.name) {
                stored.push(Person {
                    id: *existing,
                    name: person.name.clone(),
                });
                continue;
            }
            if tables.people.contains_key(&person.id) {
                return Err(EtlError::write(
                    TargetTable::People,
                    format!("duplicate key person.id = {}", person.id),
                ));
            }
            tables.person_by_name.insert(person.name.clone(), person.id);
            tables.people.insert(person.id, person.clone());
            stored.push(person.clone());
        }
        Ok(stored)
    }

    async fn insert_movie_people(&mut self, rows: &[MoviePerson]) -> Result<u64> {
        let tables = self.working(TargetTable::MoviePeople, rows.len())?;
        let mut written = 0;
        for link in rows {
            if !tables.movies.contains_key(&link.movie_id) {
                return Err(EtlError::write(
                    TargetTable::MoviePeople,
                    format!("film_work_id {} violates foreign key", link.movie_id),
                ));
            }
            if !tables.people.contains_key(&link.person_id) {
                return Err(EtlError::write(
                    TargetTable::MoviePeople,
                    format!("person_id {} violates foreign key", link.person_id),
                ));
            }
            if tables.movie_people.contains_key(&link.id)
                || !tables
                    .movie_person_pairs
                    .insert((link.movie_id, link.person_id))
            {
                continue;
            }
            tables.movie_people.insert(link.id, link.clone());
            written += 1;
        }
        Ok(written)
    }

    async fn insert_genres(&mut self, rows: &[Genre]) -> Result<u64> {
        let tables = self.working(TargetTable::Genres, rows.len())?;
        let mut written = 0;
        for genre in rows {
            if tables.genres.contains_key(&genre.id) || tables.genre_names.contains(&genre.name) {
                continue;
            }
            tables.genre_names.insert(genre.name.clone());
            tables.genres.insert(genre.id, genre.clone());
            written += 1;
        }
        Ok(written)
    }

    async fn insert_movie_genres(&mut self, rows: &[MovieGenre]) -> Result<u64> {
        let tables = self.working(TargetTable::MovieGenres, rows.len())?;
        let mut written = 0;
        for link in rows {
            if !tables.movies.contains_key(&link.movie_id) {
                return Err(EtlError::write(
                    TargetTable::MovieGenres,
                    format!("film_work_id {} violates foreign key", link.movie_id),
                ));
            }
            if !tables.genre_names.contains(&link.genre_name) {
                return Err(EtlError::write(
                    TargetTable::MovieGenres,
                    format!("genre {:?} violates foreign key", link.genre_name),
                ));
            }
            if tables.movie_genres.contains_key(&link.id) {
                continue;
            }
            tables.movie_genres.insert(link.id, link.clone());
            written += 1;
        }
        Ok(written)
    }

    async fn commit(&mut self, table: TargetTable) -> Result<()> {
        match self.open.take() {
            Some((open, tables)) if open == table => {
                self.committed = tables;
                self.commits.push(table);
                Ok(())
            }
            _ => Err(EtlError::write(table, "commit without open transaction")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FilmworkKind;

    fn movie(title: &str) -> Movie {
        Movie {
            id: Uuid::new_v4(),
            title: title.into(),
            rating: None,
            description: None,
            kind: FilmworkKind::Movie,
        }
    }

    #[test]
    fn load_order_puts_parents_first() {
        let order = TargetTable::LOAD_ORDER;
        let pos = |t| order.iter().position(|o| *o == t).unwrap();
        assert!(pos(TargetTable::Movies) < pos(TargetTable::MoviePeople));
        assert!(pos(TargetTable::People) < pos(TargetTable::MoviePeople));
        assert!(pos(TargetTable::Genres) < pos(TargetTable::MovieGenres));
    }

    #[tokio::test]
    async fn uncommitted_rows_are_discarded() {
        let mut target = MemoryTarget::new();
        target.begin(TargetTable::Movies).await.unwrap();
        target
            .insert_movies(&[movie("Lost")], Utc::now())
            .await
            .unwrap();
        target.begin(TargetTable::People).await.unwrap();
        assert!(target.committed().movies.is_empty());
    }

    #[tokio::test]
    async fn people_conflict_on_name_returns_stored_id() {
        let mut target = MemoryTarget::new();
        let first = Person::mint("Ann Lee");
        target.begin(TargetTable::People).await.unwrap();
        target.insert_people(&[first.clone()]).await.unwrap();
        let again = target.insert_people(&[Person::mint("Ann Lee")]).await.unwrap();
        target.commit(TargetTable::People).await.unwrap();

        assert_eq!(again, vec![first.clone()]);
        assert_eq!(target.committed().people.len(), 1);
        assert_eq!(target.committed().person_id("Ann Lee"), Some(first.id));
    }

    #[tokio::test]
    async fn dangling_join_is_rejected() {
        let mut target = MemoryTarget::new();
        target.begin(TargetTable::MoviePeople).await.unwrap();
        let err = target
            .insert_movie_people(&[MoviePerson {
                id: Uuid::new_v4(),
                movie_id: Uuid::new_v4(),
                person_id: Uuid::new_v4(),
            }])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EtlError::Write {
                table: TargetTable::MoviePeople,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn insert_outside_its_table_transaction_fails() {
        let mut target = MemoryTarget::new();
        target.begin(TargetTable::Movies).await.unwrap();
        assert!(target.insert_genres(&[Genre::mint("Drama")]).await.is_err());
        assert!(target.commit(TargetTable::Genres).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_genre_names_are_ignored() {
        let mut target = MemoryTarget::new();
        target.begin(TargetTable::Genres).await.unwrap();
        let written = target
            .insert_genres(&[Genre::mint("Drama"), Genre::mint("Drama")])
            .await
            .unwrap();
        target.commit(TargetTable::Genres).await.unwrap();
        assert_eq!(written, 1);
        assert!(target.committed().has_genre("Drama"));
        assert_eq!(target.commits(), &[TargetTable::Genres]);
    }
}
