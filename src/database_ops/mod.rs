pub mod db;
pub mod loader;
pub mod sqlite_source;
pub mod staging;
pub mod target;
pub mod transform;
pub mod unify;
