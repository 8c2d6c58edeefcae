//! Reader over the legacy SQLite catalogue.
//!
//! Two read-only queries: the writer lookup (the legacy schema cannot join
//! writers into the movie aggregate) and one aggregate row per movie with the
//! actors folded into two parallel `group_concat` lists.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row, Statement};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::error::{EtlError, Result, Store};
use crate::models::{Person, RawRow};
use crate::normalization::writers::normalize_writer_refs;

const REQUIRED_TABLES: [&str; 4] = ["movies", "actors", "movie_actors", "writers"];

const WRITERS_SQL: &str = "SELECT DISTINCT id, name FROM writers";

// Actor ids and names are aggregated over the same joined rows, so their
// positions line up.
const MOVIES_SQL: &str = r#"
WITH x AS (
    SELECT m.id, group_concat(a.id) AS actors_ids, group_concat(a.name) AS actors_names
    FROM movies m
    LEFT JOIN movie_actors ma ON m.id = ma.movie_id
    LEFT JOIN actors a ON ma.actor_id = a.id
    GROUP BY m.id
)
SELECT m.id, m.genre, m.director, m.title, m.plot, m.imdb_rating,
       x.actors_ids, x.actors_names, m.writer, m.writers
FROM movies m
LEFT JOIN x ON m.id = x.id
ORDER BY m.rowid
"#;

/// Writer lookup keyed by the legacy writer id.
pub type WriterIdentities = HashMap<String, Person>;

pub struct SqliteSource {
    conn: Connection,
}

impl SqliteSource {
    /// Open the legacy database read-only and check the expected tables exist.
    #[instrument]
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| EtlError::connection(Store::Source, e))?;
        let source = Self::from_connection(conn)?;
        info!(path = %path.display(), "opened legacy sqlite database");
        Ok(source)
    }

    /// Wrap an already-open connection (in-memory fixtures, custom pragmas).
    pub fn from_connection(conn: Connection) -> Result<Self> {
        for table in REQUIRED_TABLES {
            if !table_exists(&conn, table).map_err(|e| EtlError::connection(Store::Source, e))? {
                return Err(EtlError::connection(
                    Store::Source,
                    format!("legacy table `{table}` not found"),
                ));
            }
        }
        Ok(Self { conn })
    }

    /// Load every writer once, minting the id it will carry for the whole run.
    pub fn load_writer_identities(&self) -> Result<WriterIdentities> {
        let mut stmt = self.conn.prepare(WRITERS_SQL)?;
        let mut rows = stmt.query([])?;
        let mut writers = WriterIdentities::new();
        while let Some(row) = rows.next()? {
            let Some(key) = text_at(row, 0)? else {
                continue;
            };
            let name = text_at(row, 1)?.unwrap_or_default();
            writers.insert(key, Person::mint(name));
        }
        debug!(count = writers.len(), "loaded writer identities");
        Ok(writers)
    }

    /// Prepare the aggregate movie query. Each call to [`MovieRows::iter`]
    /// re-executes it; a single iteration is a single pass over the source.
    pub fn load_rows(&self) -> Result<MovieRows<'_>> {
        let stmt = self.conn.prepare(MOVIES_SQL)?;
        Ok(MovieRows { stmt })
    }
}

pub struct MovieRows<'conn> {
    stmt: Statement<'conn>,
}

impl<'conn> MovieRows<'conn> {
    pub fn iter(&mut self) -> Result<impl Iterator<Item = Result<RawRow>> + '_> {
        let rows = self.stmt.query_map([], raw_row)?;
        Ok(rows.map(|r| r.map_err(EtlError::from)))
    }
}

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    let writer = text_at(row, 8)?;
    let writers = text_at(row, 9)?;
    Ok(RawRow {
        source_id: text_at(row, 0)?.unwrap_or_default(),
        genre: text_at(row, 1)?,
        director: text_at(row, 2)?,
        title: text_at(row, 3)?.unwrap_or_default(),
        plot: text_at(row, 4)?,
        imdb_rating: text_at(row, 5)?,
        actors_ids: text_at(row, 6)?,
        actors_names: text_at(row, 7)?,
        writers: normalize_writer_refs(writer.as_deref(), writers.as_deref()),
    })
}

/// Render a dynamically typed SQLite column as text; NULL stays `None`.
fn text_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    })
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?) LIMIT 1",
    )?;
    let mut rows = stmt.query([table])?;
    Ok(rows.next()?.is_some())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use rusqlite::Connection;

    pub const LEGACY_SCHEMA: &str = r#"
        CREATE TABLE movies (
            id TEXT PRIMARY KEY,
            genre TEXT,
            director TEXT,
            writer TEXT,
            title TEXT,
            plot TEXT,
            ratings TEXT,
            imdb_rating TEXT,
            writers TEXT
        );
        CREATE TABLE actors (id INTEGER PRIMARY KEY, name TEXT);
        CREATE TABLE movie_actors (movie_id TEXT, actor_id INTEGER);
        CREATE TABLE writers (id TEXT PRIMARY KEY, name TEXT);
    "#;

    /// Two movies sharing actor "Ann Lee" and writer "w1"; the second uses
    /// the scalar `writer` column.
    pub fn legacy_db() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory sqlite");
        conn.execute_batch(LEGACY_SCHEMA).expect("schema");
        conn.execute_batch(
            r#"
            INSERT INTO writers VALUES ('w1', 'Gene Roddenberry'), ('w2', 'N/A'), ('w3', 'D.C. Fontana');
            INSERT INTO actors VALUES (1, 'Ann Lee'), (2, 'N/A'), (3, 'Bob Stone');
            INSERT INTO movies VALUES
                ('tt01', 'Action, Drama', 'Jane Doe, John Roe', '', 'First Contact', 'Borg arrive.', '', '7.6',
                 '[{"id": "w1"}, {"id": "w2"}, {"id": "w1"}, {"id": "w3"}]'),
                ('tt02', 'Drama', 'N/A', 'w1', 'Second Look', 'N/A', '', 'N/A', '');
            INSERT INTO movie_actors VALUES ('tt01', 1), ('tt01', 2), ('tt02', 1), ('tt02', 3);
            "#,
        )
        .expect("fixture rows");
        conn
    }
}
