use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

/// Creates the full application schema inside one transaction. Safe to call
/// repeatedly; every statement is IF NOT EXISTS.
pub fn setup_database(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;

    println!("- Creating 'users' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            roles TEXT NOT NULL DEFAULT '[]',
            first_name TEXT,
            last_name TEXT,
            bio TEXT,
            avatar TEXT,
            is_active INTEGER NOT NULL DEFAULT 0,
            is_email_verified INTEGER NOT NULL DEFAULT 0,
            email_verification_token TEXT,
            email_verification_token_expires_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    tx.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_verification_token
         ON users(email_verification_token)",
        [],
    )?;

    println!("- Creating 'events' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'planned'
                CHECK(status IN ('planned', 'ongoing', 'completed', 'cancelled')),
            location TEXT,
            start_date TEXT NOT NULL,
            end_date TEXT,
            max_participants INTEGER NOT NULL DEFAULT 0,
            is_public INTEGER NOT NULL DEFAULT 1,
            created_by INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE CASCADE
        )",
        [],
    )?;

    println!("- Creating 'event_participants' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS event_participants (
            event_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            PRIMARY KEY (event_id, user_id),
            FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
        [],
    )?;

    println!("- Creating 'posts' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            excerpt TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            author_id INTEGER NOT NULL,
            is_published INTEGER NOT NULL DEFAULT 0,
            featured_image TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
        )",
        [],
    )?;

    println!("- Creating 'comments' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS comments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id INTEGER NOT NULL,
            author_id INTEGER NOT NULL,
            parent_id INTEGER,
            content TEXT NOT NULL,
            is_hidden INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
            FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (parent_id) REFERENCES comments(id) ON DELETE CASCADE
        )",
        [],
    )?;

    println!("- Creating 'event_logs' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS event_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            payload TEXT NOT NULL DEFAULT '{}',
            user_id INTEGER,
            ip_address TEXT,
            user_agent TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    tx.execute(
        "CREATE INDEX IF NOT EXISTS idx_event_logs_type ON event_logs(event_type)",
        [],
    )?;
    tx.execute(
        "CREATE INDEX IF NOT EXISTS idx_event_logs_created_at ON event_logs(created_at)",
        [],
    )?;

    tx.commit()?;
    Ok(())
}

/// Opens an in-memory database with the full schema and foreign keys on.
/// Test-support only.
#[cfg(test)]
pub fn in_memory_db() -> Connection {
    let mut conn = Connection::open_in_memory().expect("in-memory db");
    conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    setup_database(&mut conn).expect("schema setup");
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_is_idempotent() {
        let mut conn = in_memory_db();
        setup_database(&mut conn).expect("second setup run");
    }
}
