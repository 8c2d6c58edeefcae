//! Global deduplication over the staged records.
//!
//! People and genres are minted once per mention by the transformer; here the
//! first mention of each name becomes canonical and join rows are emitted
//! against the canonical id.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::models::{Genre, GenresContext, MovieGenre, MoviePerson, PeopleContext, Person};

/// How `person_film_work` rows are derived from mentions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersonLinkMode {
    /// Legacy behaviour: a name is linked only at its first sighting, so the
    /// whole run yields one join per distinct name.
    #[default]
    FirstMention,
    /// One join per distinct (movie, canonical person) pair.
    EveryMention,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnifiedPeople {
    pub people: Vec<Person>,
    pub links: Vec<MoviePerson>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnifiedGenres {
    pub genres: Vec<Genre>,
    pub links: Vec<MovieGenre>,
}

/// Identity state for the people reduction: name -> canonical id, plus the
/// pairs already linked.
#[derive(Debug, Default)]
pub struct PersonIndex {
    canonical: HashMap<String, Uuid>,
    linked: HashSet<(Uuid, Uuid)>,
}

impl PersonIndex {
    pub fn canonical_id(&self, name: &str) -> Option<Uuid> {
        self.canonical.get(name).copied()
    }

    fn absorb(
        mut self,
        mut out: UnifiedPeople,
        ctx: &PeopleContext,
        mode: PersonLinkMode,
    ) -> (Self, UnifiedPeople) {
        for person in &ctx.people {
            match mode {
                PersonLinkMode::FirstMention => {
                    if self.canonical.contains_key(&person.name) {
                        continue;
                    }
                    self.canonical.insert(person.name.clone(), person.id);
                    out.links.push(link(ctx.movie_id, person.id));
                    out.people.push(person.clone());
                }
                PersonLinkMode::EveryMention => {
                    let id = match self.canonical.get(&person.name) {
                        Some(id) => *id,
                        None => {
                            self.canonical.insert(person.name.clone(), person.id);
                            out.people.push(person.clone());
                            person.id
                        }
                    };
                    if self.linked.insert((ctx.movie_id, id)) {
                        out.links.push(link(ctx.movie_id, id));
                    }
                }
            }
        }
        (self, out)
    }
}

fn link(movie_id: Uuid, person_id: Uuid) -> MoviePerson {
    MoviePerson {
        id: Uuid::new_v4(),
        movie_id,
        person_id,
    }
}

/// Collapse people by exact name, first occurrence wins.
pub fn unify_people<'a, I>(contexts: I, mode: PersonLinkMode) -> UnifiedPeople
where
    I: IntoIterator<Item = &'a PeopleContext>,
{
    let (_index, unified) = contexts.into_iter().fold(
        (PersonIndex::default(), UnifiedPeople::default()),
        |(index, out), ctx| index.absorb(out, ctx, mode),
    );
    unified
}

/// Collapse genres by name and emit one join per mention, repeats included.
pub fn unify_genres<'a, L, C>(genre_lists: L, contexts: C) -> UnifiedGenres
where
    L: IntoIterator<Item = &'a [Genre]>,
    C: IntoIterator<Item = &'a GenresContext>,
{
    let (_seen, genres) = genre_lists.into_iter().flatten().fold(
        (HashSet::<&str>::new(), Vec::new()),
        |(mut seen, mut genres), genre| {
            if seen.insert(genre.name.as_str()) {
                genres.push(genre.clone());
            }
            (seen, genres)
        },
    );

    let links = contexts
        .into_iter()
        .flat_map(|ctx| {
            ctx.genres.iter().map(move |genre| MovieGenre {
                id: Uuid::new_v4(),
                movie_id: ctx.movie_id,
                genre_name: genre.name.clone(),
            })
        })
        .collect();

    UnifiedGenres { genres, links }
}
