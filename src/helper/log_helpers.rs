use crate::models::db_operations::event_logs_db_operations::append_log;
use crate::models::{Event, LogEventType, RequestMetadata};
use rusqlite::Connection;
use serde_json::json;

/// Writes one audit record. A failing write is logged and swallowed; the
/// action being audited must never fail because its audit trail did.
pub fn record(
    conn: &Connection,
    event_type: LogEventType,
    payload: serde_json::Value,
    user_id: Option<i64>,
    metadata: &RequestMetadata,
) {
    if let Err(e) = append_log(conn, event_type.as_str(), &payload, user_id, metadata) {
        log::error!("Failed to write audit record '{}': {}", event_type, e);
    }
}

fn event_snapshot(event: &Event) -> serde_json::Value {
    json!({
        "event_id": event.id,
        "title": event.title,
        "status": event.status.as_str(),
        "location": event.location,
        "start_date": event.start_date.to_rfc3339(),
        "max_participants": event.max_participants,
        "participant_count": event.participant_count,
    })
}

pub fn record_user_registered(
    conn: &Connection,
    user_id: i64,
    email: &str,
    metadata: &RequestMetadata,
) {
    record(
        conn,
        LogEventType::UserRegistered,
        json!({ "email": email }),
        Some(user_id),
        metadata,
    );
}

pub fn record_user_login(conn: &Connection, user_id: i64, email: &str, metadata: &RequestMetadata) {
    record(
        conn,
        LogEventType::UserLogin,
        json!({ "email": email }),
        Some(user_id),
        metadata,
    );
}

pub fn record_user_logout(conn: &Connection, user_id: i64, metadata: &RequestMetadata) {
    record(conn, LogEventType::UserLogout, json!({}), Some(user_id), metadata);
}

pub fn record_event_created(
    conn: &Connection,
    actor_id: i64,
    event: &Event,
    metadata: &RequestMetadata,
) {
    record(
        conn,
        LogEventType::EventCreated,
        event_snapshot(event),
        Some(actor_id),
        metadata,
    );
}

pub fn record_event_updated(
    conn: &Connection,
    actor_id: i64,
    event: &Event,
    metadata: &RequestMetadata,
) {
    record(
        conn,
        LogEventType::EventUpdated,
        event_snapshot(event),
        Some(actor_id),
        metadata,
    );
}

/// Takes the snapshot captured before the row was removed.
pub fn record_event_deleted(
    conn: &Connection,
    actor_id: i64,
    snapshot: &Event,
    metadata: &RequestMetadata,
) {
    record(
        conn,
        LogEventType::EventDeleted,
        event_snapshot(snapshot),
        Some(actor_id),
        metadata,
    );
}

pub fn record_participant_added(
    conn: &Connection,
    user_id: i64,
    event_id: i64,
    metadata: &RequestMetadata,
) {
    record(
        conn,
        LogEventType::EventParticipantAdded,
        json!({ "event_id": event_id }),
        Some(user_id),
        metadata,
    );
}

pub fn record_participant_removed(
    conn: &Connection,
    user_id: i64,
    event_id: i64,
    metadata: &RequestMetadata,
) {
    record(
        conn,
        LogEventType::EventParticipantRemoved,
        json!({ "event_id": event_id }),
        Some(user_id),
        metadata,
    );
}

pub fn record_post_activity(
    conn: &Connection,
    event_type: LogEventType,
    actor_id: i64,
    post_id: i64,
    title: &str,
    metadata: &RequestMetadata,
) {
    record(
        conn,
        event_type,
        json!({ "post_id": post_id, "title": title }),
        Some(actor_id),
        metadata,
    );
}

pub fn record_comment_activity(
    conn: &Connection,
    event_type: LogEventType,
    actor_id: i64,
    comment_id: i64,
    post_id: i64,
    metadata: &RequestMetadata,
) {
    record(
        conn,
        event_type,
        json!({ "comment_id": comment_id, "post_id": post_id }),
        Some(actor_id),
        metadata,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::event_logs_db_operations::find_recent;
    use crate::setup::db_setup::in_memory_db;

    #[test]
    fn records_land_in_the_log() {
        let conn = in_memory_db();
        record_user_login(&conn, 5, "alice@example.com", &RequestMetadata::empty());

        let entries = find_recent(&conn, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, "user.login");
        assert_eq!(entries[0].user_id, Some(5));
    }

    #[test]
    fn broken_sink_does_not_panic_or_propagate() {
        let conn = in_memory_db();
        conn.execute_batch("DROP TABLE event_logs").unwrap();
        // Must return normally even though every insert now fails.
        record_user_logout(&conn, 5, &RequestMetadata::empty());
    }
}
