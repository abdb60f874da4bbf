use crate::models::db_operations::{parse_timestamp, DbError};
use crate::models::{EventLogEntry, RequestMetadata};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, Row};

const LOG_COLUMNS: &str = "id, event_type, payload, user_id, ip_address, user_agent, created_at";

fn row_to_entry(row: &Row) -> rusqlite::Result<EventLogEntry> {
    let payload_json: String = row.get(2)?;
    Ok(EventLogEntry {
        id: row.get(0)?,
        event_type: row.get(1)?,
        payload: serde_json::from_str(&payload_json).unwrap_or(serde_json::Value::Null),
        user_id: row.get(3)?,
        ip_address: row.get(4)?,
        user_agent: row.get(5)?,
        created_at: parse_timestamp(row.get(6)?, 6)?,
    })
}

/// Appends one immutable audit record. Rows are never updated afterwards.
pub fn append_log(
    conn: &Connection,
    event_type: &str,
    payload: &serde_json::Value,
    user_id: Option<i64>,
    metadata: &RequestMetadata,
) -> Result<i64, DbError> {
    let payload_json = serde_json::to_string(payload)?;
    conn.execute(
        "INSERT INTO event_logs (event_type, payload, user_id, ip_address, user_agent, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event_type,
            payload_json,
            user_id,
            metadata.ip_address,
            metadata.user_agent,
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_recent(conn: &Connection, limit: i64) -> Result<Vec<EventLogEntry>, DbError> {
    let sql = format!(
        "SELECT {} FROM event_logs ORDER BY created_at DESC, id DESC LIMIT ?1",
        LOG_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map([limit], row_to_entry)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

pub fn find_by_type(
    conn: &Connection,
    event_type: &str,
    limit: i64,
) -> Result<Vec<EventLogEntry>, DbError> {
    let sql = format!(
        "SELECT {} FROM event_logs WHERE event_type = ?1
         ORDER BY created_at DESC, id DESC LIMIT ?2",
        LOG_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map(params![event_type, limit], row_to_entry)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

pub fn find_by_user(
    conn: &Connection,
    user_id: i64,
    limit: i64,
) -> Result<Vec<EventLogEntry>, DbError> {
    let sql = format!(
        "SELECT {} FROM event_logs WHERE user_id = ?1
         ORDER BY created_at DESC, id DESC LIMIT ?2",
        LOG_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map(params![user_id, limit], row_to_entry)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

pub fn find_by_date_range(
    conn: &Connection,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<EventLogEntry>, DbError> {
    let sql = format!(
        "SELECT {} FROM event_logs WHERE created_at >= ?1 AND created_at <= ?2
         ORDER BY created_at ASC, id ASC",
        LOG_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map(params![from.to_rfc3339(), to.to_rfc3339()], row_to_entry)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

/// Occurrences per event type over the trailing window, busiest first.
pub fn stats_by_type(conn: &Connection, days: i64) -> Result<Vec<(String, i64)>, DbError> {
    let since = (Utc::now() - Duration::days(days)).to_rfc3339();
    let mut stmt = conn.prepare(
        "SELECT event_type, COUNT(*) FROM event_logs WHERE created_at >= ?1
         GROUP BY event_type ORDER BY COUNT(*) DESC, event_type ASC",
    )?;
    let stats = stmt
        .query_map([since], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(stats)
}

/// Occurrences per event type for one user, all time.
pub fn user_activity_stats(conn: &Connection, user_id: i64) -> Result<Vec<(String, i64)>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT event_type, COUNT(*) FROM event_logs WHERE user_id = ?1
         GROUP BY event_type ORDER BY COUNT(*) DESC, event_type ASC",
    )?;
    let stats = stmt
        .query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(stats)
}

/// Deletes records older than the retention window. Returns how many went.
pub fn prune_old_logs(conn: &Connection, retention_days: i64) -> Result<usize, DbError> {
    let cutoff = (Utc::now() - Duration::days(retention_days)).to_rfc3339();
    let deleted = conn.execute("DELETE FROM event_logs WHERE created_at < ?1", [cutoff])?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogEventType;
    use crate::setup::db_setup::in_memory_db;
    use serde_json::json;

    fn meta() -> RequestMetadata {
        RequestMetadata {
            ip_address: Some("203.0.113.9".to_string()),
            user_agent: Some("test-agent".to_string()),
        }
    }

    #[test]
    fn append_and_read_back() {
        let conn = in_memory_db();
        append_log(
            &conn,
            LogEventType::UserLogin.as_str(),
            &json!({ "email": "alice@example.com" }),
            Some(7),
            &meta(),
        )
        .unwrap();

        let entries = find_recent(&conn, 10).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.event_type, "user.login");
        assert_eq!(entry.payload["email"], "alice@example.com");
        assert_eq!(entry.user_id, Some(7));
        assert_eq!(entry.ip_address.as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn queries_filter_by_type_and_user() {
        let conn = in_memory_db();
        for _ in 0..3 {
            append_log(&conn, "user.login", &json!({}), Some(1), &meta()).unwrap();
        }
        append_log(&conn, "user.logout", &json!({}), Some(1), &meta()).unwrap();
        append_log(&conn, "user.login", &json!({}), Some(2), &meta()).unwrap();

        assert_eq!(find_by_type(&conn, "user.login", 50).unwrap().len(), 4);
        assert_eq!(find_by_user(&conn, 1, 50).unwrap().len(), 4);

        let stats = stats_by_type(&conn, 7).unwrap();
        assert_eq!(stats[0], ("user.login".to_string(), 4));
        assert_eq!(stats[1], ("user.logout".to_string(), 1));

        let per_user = user_activity_stats(&conn, 1).unwrap();
        assert_eq!(per_user, vec![("user.login".to_string(), 3), ("user.logout".to_string(), 1)]);
    }

    #[test]
    fn date_range_and_pruning_use_created_at() {
        let conn = in_memory_db();
        append_log(&conn, "user.login", &json!({}), None, &RequestMetadata::empty()).unwrap();
        // Backdate one row past the retention window.
        conn.execute(
            "UPDATE event_logs SET created_at = ?1 WHERE id = 1",
            [(Utc::now() - Duration::days(120)).to_rfc3339()],
        )
        .unwrap();
        append_log(&conn, "user.login", &json!({}), None, &RequestMetadata::empty()).unwrap();

        let recent = find_by_date_range(&conn, Utc::now() - Duration::days(1), Utc::now()).unwrap();
        assert_eq!(recent.len(), 1);

        assert_eq!(prune_old_logs(&conn, 90).unwrap(), 1);
        assert_eq!(find_recent(&conn, 10).unwrap().len(), 1);
    }
}
