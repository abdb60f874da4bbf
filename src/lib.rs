use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

/// Shared SQLite connection pool handed to every handler via `web::Data`.
pub type DbPool = Pool<SqliteConnectionManager>;

pub mod config;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;
