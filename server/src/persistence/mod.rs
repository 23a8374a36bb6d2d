//! Session persistence: connection pool/migrations, the repository trait,
//! and its SQLite implementation.

pub mod database;
pub mod repository;
pub mod sqlite;

pub use database::Database;
pub use repository::SessionRepository;
pub use sqlite::SqliteSessionRepository;
