use crate::database_ops::unify::{unify_genres, unify_people, PersonLinkMode};
use crate::models::{Genre, Movie, MovieGenre, MoviePerson, Person, TransformedRecord};

/// Append-only collection of every transformed record of the run. The
/// unifier needs all of it before any entity can be called unique.
#[derive(Debug, Default)]
pub struct Staging {
    records: Vec<TransformedRecord>,
}

/// Final entity tables, in the order the loader writes them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnifiedDataset {
    pub movies: Vec<Movie>,
    pub people: Vec<Person>,
    pub movie_people: Vec<MoviePerson>,
    pub genres: Vec<Genre>,
    pub movie_genres: Vec<MovieGenre>,
}

impl Staging {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: TransformedRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TransformedRecord] {
        &self.records
    }

    /// Run the global reduction and release the staged records.
    pub fn into_unified(self, mode: PersonLinkMode) -> UnifiedDataset {
        let people = unify_people(self.records.iter().map(|r| &r.people_with_context), mode);
        let genres = unify_genres(
            self.records.iter().map(|r| r.genres.as_slice()),
            self.records.iter().map(|r| &r.genres_with_context),
        );
        let movies = self.records.into_iter().map(|r| r.movie).collect();
        UnifiedDataset {
            movies,
            people: people.people,
            movie_people: people.links,
            genres: genres.genres,
            movie_genres: genres.links,
        }
    }
}

impl Extend<TransformedRecord> for Staging {
    fn extend<T: IntoIterator<Item = TransformedRecord>>(&mut self, iter: T) {
        self.records.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::sqlite_source::WriterIdentities;
    use crate::database_ops::transform::transform_row;
    use crate::models::RawRow;

    fn raw(id: &str, genre: &str, actors: &str) -> RawRow {
        let ids = (1..=actors.split(',').count())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",");
        RawRow {
            source_id: id.into(),
            genre: Some(genre.into()),
            director: Some("N/A".into()),
            title: format!("Movie {id}"),
            plot: None,
            imdb_rating: None,
            actors_ids: Some(ids),
            actors_names: Some(actors.into()),
            writers: "[]".into(),
        }
    }

    fn staged() -> Staging {
        let writers = WriterIdentities::new();
        let mut staging = Staging::default();
        staging.extend(
            [
                raw("tt01", "Action, Drama", "Ann Lee,Bob Stone"),
                raw("tt02", "Drama", "Ann Lee"),
            ]
            .iter()
            .map(|r| transform_row(r, &writers).unwrap()),
        );
        staging
    }

    #[test]
    fn unified_dataset_keeps_every_movie_in_order() {
        let staging = staged();
        assert_eq!(staging.len(), 2);
        let expected: Vec<_> = staging.records().iter().map(|r| r.movie.id).collect();
        let out = staging.into_unified(PersonLinkMode::FirstMention);
        let ids: Vec<_> = out.movies.iter().map(|m| m.id).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn shared_names_collapse_across_records() {
        let out = staged().into_unified(PersonLinkMode::FirstMention);
        let people: Vec<&str> = out.people.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(people, vec!["Ann Lee", "Bob Stone"]);
        assert_eq!(out.movie_people.len(), 2);
        let genres: Vec<&str> = out.genres.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(genres, vec!["Action", "Drama"]);
        assert_eq!(out.movie_genres.len(), 3);
    }

    #[test]
    fn every_mention_mode_links_the_second_movie() {
        let out = staged().into_unified(PersonLinkMode::EveryMention);
        assert_eq!(out.people.len(), 2);
        assert_eq!(out.movie_people.len(), 3);
    }

    #[test]
    fn empty_staging_unifies_to_empty_tables() {
        let staging = Staging::with_capacity(8);
        assert!(staging.is_empty());
        assert_eq!(
            staging.into_unified(PersonLinkMode::default()),
            UnifiedDataset::default()
        );
    }
}
