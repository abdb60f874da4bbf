use crate::models::User;
use crate::models::db_operations::{map_unique_violation, parse_opt_timestamp, parse_timestamp, DbError};
use bcrypt::{hash, verify, BcryptError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Error as RusqliteError, Row};

const USER_COLUMNS: &str = "id, email, password_hash, roles, first_name, last_name, bio, avatar, \
     is_active, is_email_verified, email_verification_token, \
     email_verification_token_expires_at, created_at, updated_at";

fn bcrypt_to_rusqlite_error(e: BcryptError) -> RusqliteError {
    RusqliteError::ToSqlConversionFailure(Box::new(e))
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let roles_json: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        roles: serde_json::from_str(&roles_json).unwrap_or_default(),
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        bio: row.get(6)?,
        avatar: row.get(7)?,
        is_active: row.get(8)?,
        is_email_verified: row.get(9)?,
        email_verification_token: row.get(10)?,
        email_verification_token_expires_at: parse_opt_timestamp(row.get(11)?, 11)?,
        created_at: parse_timestamp(row.get(12)?, 12)?,
        updated_at: parse_timestamp(row.get(13)?, 13)?,
    })
}

/// Creates a user in the initial registration state: inactive, unverified,
/// no token. Returns `DbError::Conflict("email")` for a duplicate address.
pub fn create_user(
    conn: &Connection,
    email: &str,
    password: &str,
    roles: &[String],
) -> Result<i64, DbError> {
    let hashed_password = hash(password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
    let roles_json = serde_json::to_string(roles)?;
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO users (email, password_hash, roles, is_active, is_email_verified, created_at, updated_at)
         VALUES (?1, ?2, ?3, 0, 0, ?4, ?4)",
        params![email, hashed_password, roles_json, now],
    )
    .map_err(|e| map_unique_violation(e, "email"))?;
    Ok(conn.last_insert_rowid())
}

pub fn read_user_by_id(conn: &Connection, user_id: i64) -> Option<User> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
        [user_id],
        row_to_user,
    )
    .ok()
}

pub fn read_user_by_email(conn: &Connection, email: &str) -> Option<User> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
        [email],
        row_to_user,
    )
    .ok()
}

/// Token lookup is by exact value; no normalization of any kind.
pub fn read_user_by_verification_token(conn: &Connection, token: &str) -> Option<User> {
    conn.query_row(
        &format!(
            "SELECT {} FROM users WHERE email_verification_token = ?1",
            USER_COLUMNS
        ),
        [token],
        row_to_user,
    )
    .ok()
}

/// Returns the user when the password matches the stored hash. Account
/// status (verified/active) is checked by the caller so it can report the
/// precise reason a login is refused.
pub fn verify_credentials(conn: &Connection, email: &str, password: &str) -> Option<User> {
    let user = read_user_by_email(conn, email)?;
    if verify(password, &user.password_hash).unwrap_or(false) {
        Some(user)
    } else {
        None
    }
}

pub fn update_profile(
    conn: &Connection,
    user_id: i64,
    first_name: Option<&str>,
    last_name: Option<&str>,
    bio: Option<&str>,
    avatar: Option<&str>,
) -> Result<(), DbError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE users SET first_name = ?1, last_name = ?2, bio = ?3, avatar = ?4, updated_at = ?5
         WHERE id = ?6",
        params![first_name, last_name, bio, avatar, now, user_id],
    )?;
    Ok(())
}

/// Stores a fresh verification token, overwriting any outstanding one.
pub fn set_verification_token(
    conn: &Connection,
    user_id: i64,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), DbError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE users SET email_verification_token = ?1,
                email_verification_token_expires_at = ?2, updated_at = ?3
         WHERE id = ?4",
        params![token, expires_at.to_rfc3339(), now, user_id],
    )?;
    Ok(())
}

/// Flips verified+active together and clears the token pair in one
/// statement, so a consumed token can never be replayed.
pub fn mark_email_verified(conn: &Connection, user_id: i64) -> Result<(), DbError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE users SET is_email_verified = 1, is_active = 1,
                email_verification_token = NULL,
                email_verification_token_expires_at = NULL, updated_at = ?1
         WHERE id = ?2",
        params![now, user_id],
    )?;
    Ok(())
}
