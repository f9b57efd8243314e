//! Persistence layer modules.

pub mod db;
pub mod schema;
pub mod session_repo;
pub mod timeline_repo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
