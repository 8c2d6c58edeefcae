use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool, Postgres, QueryBuilder, Row, Transaction,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::database_ops::target::{TargetStore, TargetTable};
use crate::error::{EtlError, Result, Store};
use crate::models::{Genre, Movie, MovieGenre, MoviePerson, Person};

/// Postgres target. The pool is capped at a single connection; each table is
/// written inside its own transaction.
pub struct Db {
    pub pool: PgPool,
    schema: String,
    tx: Option<Transaction<'static, Postgres>>,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, schema: &str, fast_ingest: bool) -> Result<Self> {
        let mut connect_options = PgConnectOptions::from_str(database_url)
            .map_err(|e| EtlError::connection(Store::Target, e))?
            .statement_cache_capacity(0);

        // Ensure TLS is enabled when DSN contains sslmode=require
        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if fast_ingest {
                        sqlx::query("SET synchronous_commit = 'off'")
                            .execute(&mut *conn)
                            .await?;
                    }
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await
            .map_err(|e| EtlError::connection(Store::Target, e))?;
        info!(fast_ingest, "connected to target db");

        let db = Self {
            pool,
            schema: schema.to_string(),
            tx: None,
        };
        db.ensure_target_tables().await?;
        Ok(db)
    }

    /// Fail early when the content schema has not been created.
    async fn ensure_target_tables(&self) -> Result<()> {
        for table in TargetTable::LOAD_ORDER {
            let name = self.qualified(table);
            let visible: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
                .persistent(false)
                .bind(&name)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| EtlError::connection(Store::Target, e))?;
            if !visible {
                return Err(EtlError::connection(
                    Store::Target,
                    format!("target table {name} not found"),
                ));
            }
        }
        Ok(())
    }

    pub fn qualified(&self, table: TargetTable) -> String {
        format!("{}.{}", self.schema, table.table_name())
    }

    /// Roll back anything still open and release the connection.
    pub async fn close(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.rollback().await;
        }
        self.pool.close().await;
        debug!("target pool closed");
    }

    fn tx(&mut self, table: TargetTable) -> Result<&mut Transaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| EtlError::write(table, "no open transaction for table"))
    }
}

#[async_trait]
impl TargetStore for Db {
    async fn begin(&mut self, table: TargetTable) -> Result<()> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EtlError::write(table, e))?;
        self.tx = Some(tx);
        Ok(())
    }

    #[instrument(skip(self, rows), fields(row_count = rows.len()))]
    async fn insert_movies(&mut self, rows: &[Movie], created_at: DateTime<Utc>) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let table = TargetTable::Movies;
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} (id, title, rating, description, type, created_at) ",
            self.qualified(table)
        ));
        qb.push_values(rows, |mut b, m| {
            b.push_bind(m.id)
                .push_bind(&m.title)
                .push_bind(m.rating)
                .push_bind(m.description.as_deref())
                .push_bind(m.kind.as_str())
                .push_bind(created_at);
        });
        qb.push(" ON CONFLICT DO NOTHING");
        let tx = self.tx(table)?;
        let done = qb
            .build()
            .persistent(false)
            .execute(&mut **tx)
            .await
            .map_err(|e| EtlError::write(table, e))?;
        Ok(done.rows_affected())
    }

    #[instrument(skip(self, rows), fields(row_count = rows.len()))]
    async fn insert_people(&mut self, rows: &[Person]) -> Result<Vec<Person>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let table = TargetTable::People;
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} (id, name) ", self.qualified(table)));
        qb.push_values(rows, |mut b, p| {
            b.push_bind(p.id).push_bind(&p.name);
        });
        // No-op update so RETURNING also reports rows that already existed.
        qb.push(" ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING id, name");
        let tx = self.tx(table)?;
        let stored = qb
            .build()
            .persistent(false)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| EtlError::write(table, e))?;
        stored
            .iter()
            .map(|r| {
                Ok(Person {
                    id: r.try_get::<Uuid, _>("id")?,
                    name: r.try_get::<String, _>("name")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| EtlError::write(table, e))
    }

    #[instrument(skip(self, rows), fields(row_count = rows.len()))]
    async fn insert_movie_people(&mut self, rows: &[MoviePerson]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let table = TargetTable::MoviePeople;
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} (id, film_work_id, person_id) ",
            self.qualified(table)
        ));
        qb.push_values(rows, |mut b, l| {
            b.push_bind(l.id).push_bind(l.movie_id).push_bind(l.person_id);
        });
        qb.push(" ON CONFLICT DO NOTHING");
        let tx = self.tx(table)?;
        let done = qb
            .build()
            .persistent(false)
            .execute(&mut **tx)
            .await
            .map_err(|e| EtlError::write(table, e))?;
        Ok(done.rows_affected())
    }

    #[instrument(skip(self, rows), fields(row_count = rows.len()))]
    async fn insert_genres(&mut self, rows: &[Genre]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let table = TargetTable::Genres;
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} (id, genre) ", self.qualified(table)));
        qb.push_values(rows, |mut b, g| {
            b.push_bind(g.id).push_bind(&g.name);
        });
        qb.push(" ON CONFLICT DO NOTHING");
        let tx = self.tx(table)?;
        let done = qb
            .build()
            .persistent(false)
            .execute(&mut **tx)
            .await
            .map_err(|e| EtlError::write(table, e))?;
        Ok(done.rows_affected())
    }

    #[instrument(skip(self, rows), fields(row_count = rows.len()))]
    async fn insert_movie_genres(&mut self, rows: &[MovieGenre]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let table = TargetTable::MovieGenres;
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} (id, film_work_id, genre) ",
            self.qualified(table)
        ));
        qb.push_values(rows, |mut b, l| {
            b.push_bind(l.id)
                .push_bind(l.movie_id)
                .push_bind(&l.genre_name);
        });
        qb.push(" ON CONFLICT DO NOTHING");
        let tx = self.tx(table)?;
        let done = qb
            .build()
            .persistent(false)
            .execute(&mut **tx)
            .await
            .map_err(|e| EtlError::write(table, e))?;
        Ok(done.rows_affected())
    }

    async fn commit(&mut self, table: TargetTable) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| EtlError::write(table, "commit without open transaction"))?;
        tx.commit().await.map_err(|e| EtlError::write(table, e))
    }
}
