use std::fmt;
use thiserror::Error;

use crate::database_ops::target::TargetTable;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which store a connection failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    Source,
    Target,
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Store::Source => f.write_str("source (sqlite)"),
            Store::Target => f.write_str("target (postgres)"),
        }
    }
}

/// Pipeline stage a fatal error surfaced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Read,
    Transform,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Config => "config",
            Stage::Read => "read",
            Stage::Transform => "transform",
            Stage::Load => "load",
        };
        f.write_str(s)
    }
}

/// Every variant aborts the whole run; there is no local recovery.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("cannot connect to {store} store: {source}")]
    Connection {
        store: Store,
        #[source]
        source: BoxError,
    },

    #[error("source query failed: {0}")]
    Read(#[from] rusqlite::Error),

    #[error("malformed row {row_id}: {reason}")]
    MalformedRow { row_id: String, reason: String },

    #[error("write to {table} failed: {source}")]
    Write {
        table: TargetTable,
        #[source]
        source: BoxError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EtlError {
    pub fn connection(store: Store, source: impl Into<BoxError>) -> Self {
        EtlError::Connection {
            store,
            source: source.into(),
        }
    }

    pub fn malformed(row_id: impl Into<String>, reason: impl Into<String>) -> Self {
        EtlError::MalformedRow {
            row_id: row_id.into(),
            reason: reason.into(),
        }
    }

    pub fn write(table: TargetTable, source: impl Into<BoxError>) -> Self {
        EtlError::Write {
            table,
            source: source.into(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            EtlError::Connection {
                store: Store::Source,
                ..
            }
            | EtlError::Read(_) => Stage::Read,
            EtlError::Connection {
                store: Store::Target,
                ..
            } => Stage::Load,
            EtlError::MalformedRow { .. } => Stage::Transform,
            EtlError::Write { .. } => Stage::Load,
            EtlError::Config(_) => Stage::Config,
        }
    }
}

pub type Result<T, E = EtlError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_follow_error_class() {
        assert_eq!(
            EtlError::malformed("tt001", "bad writers json").stage(),
            Stage::Transform
        );
        assert_eq!(
            EtlError::connection(Store::Source, "unable to open database file").stage(),
            Stage::Read
        );
        assert_eq!(
            EtlError::write(TargetTable::People, "duplicate key").stage(),
            Stage::Load
        );
    }

    #[test]
    fn write_error_names_the_table() {
        let err = EtlError::write(TargetTable::MovieGenres, "violates foreign key");
        assert!(err.to_string().contains("genre_film_work"));
    }
}
