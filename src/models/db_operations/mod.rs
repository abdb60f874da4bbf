use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod comments_db_operations;
pub mod event_logs_db_operations;
pub mod events_db_operations;
pub mod posts_db_operations;
pub mod users_db_operations;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Item not found in database: {0}")]
    NotFound(String),
    #[error("Unsupported order-by field: {0}")]
    InvalidField(String),
    #[error("Unique constraint violated: {0}")]
    Conflict(String),
}

/// Translates a SQLite unique-constraint failure into a named conflict so
/// callers can branch on it instead of seeing a generic database error.
pub(crate) fn map_unique_violation(err: rusqlite::Error, what: &str) -> DbError {
    if let rusqlite::Error::SqliteFailure(inner, _) = &err {
        if inner.code == rusqlite::ErrorCode::ConstraintViolation {
            return DbError::Conflict(what.to_string());
        }
    }
    DbError::Rusqlite(err)
}

/// Appends LIMIT/OFFSET to a query. Absent limit means the full result
/// set; SQLite needs `LIMIT -1` to express an offset without a bound.
pub(crate) fn append_limit_offset(
    sql: &mut String,
    values: &mut Vec<Box<dyn rusqlite::types::ToSql>>,
    limit: Option<i64>,
    offset: Option<i64>,
) {
    if let Some(limit) = limit {
        values.push(Box::new(limit));
        sql.push_str(&format!(" LIMIT ?{}", values.len()));
        if let Some(offset) = offset {
            values.push(Box::new(offset));
            sql.push_str(&format!(" OFFSET ?{}", values.len()));
        }
    } else if let Some(offset) = offset {
        values.push(Box::new(offset));
        sql.push_str(&format!(" LIMIT -1 OFFSET ?{}", values.len()));
    }
}

/// Timestamps are stored as RFC 3339 text; parse failures surface as
/// conversion errors on the offending column.
pub(crate) fn parse_timestamp(value: String, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_opt_timestamp(
    value: Option<String>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(v, idx)).transpose()
}
