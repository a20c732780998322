pub mod db;
pub mod migrations;

pub use db::{Database, ListIngest, SongUpsert};
pub use migrations::{current_version, migrate, SCHEMA_VERSION};
