use crate::helper::mail_helpers::{MailError, Mailer};
use crate::models::db_operations::users_db_operations::{
    mark_email_verified, read_user_by_verification_token, set_verification_token,
};
use crate::models::db_operations::DbError;
use crate::models::User;
use chrono::{Duration, Utc};
use rand::RngCore;
use rusqlite::Connection;
use thiserror::Error;

pub const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("This account is already verified.")]
    AlreadyVerified,
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Mail(#[from] MailError),
}

/// 256 bits of randomness, hex encoded. Issuing a new token invalidates any
/// outstanding one for the same user.
pub fn generate_token(conn: &Connection, user: &User) -> Result<String, VerificationError> {
    if user.is_email_verified {
        return Err(VerificationError::AlreadyVerified);
    }
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    set_verification_token(conn, user.id, &token, Utc::now() + Duration::hours(TOKEN_TTL_HOURS))?;
    Ok(token)
}

pub fn verification_link(base_url: &str, token: &str) -> String {
    format!("{}/verify-email/{}", base_url.trim_end_matches('/'), token)
}

/// Issues a fresh token and mails the confirmation link.
pub fn send_verification_email(
    conn: &Connection,
    mailer: &dyn Mailer,
    base_url: &str,
    user: &User,
) -> Result<(), VerificationError> {
    let token = generate_token(conn, user)?;
    mailer.send_verification(&user.email, &verification_link(base_url, &token))?;
    Ok(())
}

/// Consumes a verification token. `Ok(true)` means the account is verified
/// after the call, `Ok(false)` that the token was unknown or expired. The
/// welcome mail is best effort; a mail failure never undoes the verification.
pub fn verify_email_with_token(
    conn: &Connection,
    mailer: &dyn Mailer,
    token: &str,
) -> Result<bool, DbError> {
    let user = match read_user_by_verification_token(conn, token) {
        Some(user) => user,
        None => return Ok(false),
    };
    if user.is_email_verified {
        return Ok(true);
    }
    if user.is_verification_token_expired() {
        return Ok(false);
    }
    mark_email_verified(conn, user.id)?;
    if let Err(e) = mailer.send_welcome(&user.email) {
        log::error!("Failed to send welcome mail to {}: {}", user.email, e);
    }
    Ok(true)
}
