use crate::models::db_operations::{
    append_limit_offset, map_unique_violation, parse_opt_timestamp, parse_timestamp, DbError,
};
use crate::models::{Event, EventInput, EventStatus};
use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::Serialize;

const EVENT_COLUMNS: &str = "e.id, e.title, e.description, e.status, e.location, e.start_date, \
     e.end_date, e.max_participants, e.is_public, e.created_by, u.email, \
     (SELECT COUNT(*) FROM event_participants ep WHERE ep.event_id = e.id), \
     e.created_at, e.updated_at";

const EVENT_FROM: &str = "FROM events e JOIN users u ON u.id = e.created_by";

/// Sortable columns; anything else is rejected with `DbError::InvalidField`
/// instead of being spliced into SQL.
const ORDERABLE_FIELDS: [&str; 5] = ["title", "start_date", "end_date", "created_at", "status"];

fn row_to_event(row: &Row) -> rusqlite::Result<Event> {
    let status_raw: String = row.get(3)?;
    let status = EventStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown event status '{}'", status_raw).into(),
        )
    })?;
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status,
        location: row.get(4)?,
        start_date: parse_timestamp(row.get(5)?, 5)?,
        end_date: parse_opt_timestamp(row.get(6)?, 6)?,
        max_participants: row.get(7)?,
        is_public: row.get(8)?,
        created_by: row.get(9)?,
        created_by_email: row.get(10)?,
        participant_count: row.get(11)?,
        created_at: parse_timestamp(row.get(12)?, 12)?,
        updated_at: parse_timestamp(row.get(13)?, 13)?,
    })
}

/// All criteria combine with AND; a `None` field filters nothing.
#[derive(Debug, Default, Clone)]
pub struct EventFilter {
    pub public_only: bool,
    pub status: Option<EventStatus>,
    /// Keep events starting on or after this instant.
    pub start_from: Option<DateTime<Utc>>,
    /// Keep events starting on or before this instant.
    pub start_until: Option<DateTime<Utc>>,
    /// Substring match on location.
    pub location: Option<String>,
    /// Substring match on title OR description.
    pub search: Option<String>,
    pub order_by: Option<String>,
    pub descending: bool,
}

fn build_where(filter: &EventFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if filter.public_only {
        clauses.push("e.is_public = 1".to_string());
    }
    if let Some(status) = filter.status {
        values.push(Box::new(status.as_str().to_string()));
        clauses.push(format!("e.status = ?{}", values.len()));
    }
    if let Some(from) = filter.start_from {
        values.push(Box::new(from.to_rfc3339()));
        clauses.push(format!("e.start_date >= ?{}", values.len()));
    }
    if let Some(until) = filter.start_until {
        values.push(Box::new(until.to_rfc3339()));
        clauses.push(format!("e.start_date <= ?{}", values.len()));
    }
    if let Some(location) = &filter.location {
        values.push(Box::new(format!("%{}%", location)));
        clauses.push(format!("e.location LIKE ?{}", values.len()));
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", search);
        values.push(Box::new(pattern.clone()));
        let first = values.len();
        values.push(Box::new(pattern));
        clauses.push(format!(
            "(e.title LIKE ?{} OR e.description LIKE ?{})",
            first,
            values.len()
        ));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn build_order(filter: &EventFilter) -> Result<String, DbError> {
    let field = filter.order_by.as_deref().unwrap_or("start_date");
    if !ORDERABLE_FIELDS.contains(&field) {
        return Err(DbError::InvalidField(field.to_string()));
    }
    let direction = if filter.descending { "DESC" } else { "ASC" };
    // Secondary id sort keeps pagination stable across equal keys.
    Ok(format!(" ORDER BY e.{} {}, e.id ASC", field, direction))
}

pub fn count_with_filters(conn: &Connection, filter: &EventFilter) -> Result<i64, DbError> {
    let (where_sql, values) = build_where(filter);
    let sql = format!("SELECT COUNT(*) {}{}", EVENT_FROM, where_sql);
    let count = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
    Ok(count)
}

/// No limit means the full filtered set.
pub fn find_with_filters(
    conn: &Connection,
    filter: &EventFilter,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<Vec<Event>, DbError> {
    let (where_sql, mut values) = build_where(filter);
    let order_sql = build_order(filter)?;
    let mut sql = format!(
        "SELECT {} {}{}{}",
        EVENT_COLUMNS, EVENT_FROM, where_sql, order_sql
    );
    append_limit_offset(&mut sql, &mut values, limit, offset);
    let mut stmt = conn.prepare(&sql)?;
    let events = stmt
        .query_map(params_from_iter(values.iter()), row_to_event)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

#[derive(Debug, Serialize)]
pub struct EventPage {
    pub events: Vec<Event>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

/// Filtered, ordered page of events. Page numbers below 1 are clamped to 1.
pub fn find_page(
    conn: &Connection,
    filter: &EventFilter,
    page: i64,
    limit: i64,
) -> Result<EventPage, DbError> {
    let page = page.max(1);
    let total = count_with_filters(conn, filter)?;
    let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
    let events = find_with_filters(conn, filter, Some(limit), Some((page - 1) * limit))?;
    Ok(EventPage {
        events,
        total,
        page,
        limit,
        total_pages,
    })
}

pub fn read_event(conn: &Connection, event_id: i64) -> Option<Event> {
    conn.query_row(
        &format!("SELECT {} {} WHERE e.id = ?1", EVENT_COLUMNS, EVENT_FROM),
        [event_id],
        row_to_event,
    )
    .ok()
}

pub fn create_event(conn: &Connection, input: &EventInput, created_by: i64) -> Result<i64, DbError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO events (title, description, status, location, start_date, end_date,
                max_participants, is_public, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            input.title.trim(),
            input.description,
            input.status.as_str(),
            input.location,
            input.start_date.to_rfc3339(),
            input.end_date.map(|d| d.to_rfc3339()),
            input.max_participants,
            input.is_public,
            created_by,
            now
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_event(conn: &Connection, event_id: i64, input: &EventInput) -> Result<(), DbError> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE events SET title = ?1, description = ?2, status = ?3, location = ?4,
                start_date = ?5, end_date = ?6, max_participants = ?7, is_public = ?8,
                updated_at = ?9
         WHERE id = ?10",
        params![
            input.title.trim(),
            input.description,
            input.status.as_str(),
            input.location,
            input.start_date.to_rfc3339(),
            input.end_date.map(|d| d.to_rfc3339()),
            input.max_participants,
            input.is_public,
            now,
            event_id
        ],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("event {}", event_id)));
    }
    Ok(())
}

/// Participant rows go with the event via ON DELETE CASCADE.
pub fn delete_event(conn: &Connection, event_id: i64) -> Result<(), DbError> {
    let changed = conn.execute("DELETE FROM events WHERE id = ?1", [event_id])?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("event {}", event_id)));
    }
    Ok(())
}

pub fn is_participant(conn: &Connection, event_id: i64, user_id: i64) -> bool {
    conn.query_row(
        "SELECT 1 FROM event_participants WHERE event_id = ?1 AND user_id = ?2",
        params![event_id, user_id],
        |_| Ok(()),
    )
    .is_ok()
}

pub fn participant_count(conn: &Connection, event_id: i64) -> Result<i64, DbError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM event_participants WHERE event_id = ?1",
        [event_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// The composite primary key makes a double registration a conflict, not a
/// duplicate row.
pub fn add_participant(conn: &Connection, event_id: i64, user_id: i64) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO event_participants (event_id, user_id) VALUES (?1, ?2)",
        params![event_id, user_id],
    )
    .map_err(|e| map_unique_violation(e, "participant"))?;
    Ok(())
}

/// Returns whether a registration was actually removed.
pub fn remove_participant(conn: &Connection, event_id: i64, user_id: i64) -> Result<bool, DbError> {
    let changed = conn.execute(
        "DELETE FROM event_participants WHERE event_id = ?1 AND user_id = ?2",
        params![event_id, user_id],
    )?;
    Ok(changed > 0)
}

pub fn find_upcoming(conn: &Connection, limit: i64) -> Result<Vec<Event>, DbError> {
    let sql = format!(
        "SELECT {} {} WHERE e.is_public = 1 AND e.status = 'planned' AND e.start_date > ?1
         ORDER BY e.start_date ASC, e.id ASC LIMIT ?2",
        EVENT_COLUMNS, EVENT_FROM
    );
    let mut stmt = conn.prepare(&sql)?;
    let events = stmt
        .query_map(params![Utc::now().to_rfc3339(), limit], row_to_event)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

pub fn find_by_creator(conn: &Connection, user_id: i64) -> Result<Vec<Event>, DbError> {
    let sql = format!(
        "SELECT {} {} WHERE e.created_by = ?1 ORDER BY e.start_date DESC, e.id ASC",
        EVENT_COLUMNS, EVENT_FROM
    );
    let mut stmt = conn.prepare(&sql)?;
    let events = stmt
        .query_map([user_id], row_to_event)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

pub fn find_by_participant(conn: &Connection, user_id: i64) -> Result<Vec<Event>, DbError> {
    let sql = format!(
        "SELECT {} {} JOIN event_participants p ON p.event_id = e.id
         WHERE p.user_id = ?1 ORDER BY e.start_date ASC, e.id ASC",
        EVENT_COLUMNS, EVENT_FROM
    );
    let mut stmt = conn.prepare(&sql)?;
    let events = stmt
        .query_map([user_id], row_to_event)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

#[derive(Debug, Serialize, Default)]
pub struct EventStats {
    pub total: i64,
    pub planned: i64,
    pub ongoing: i64,
    pub completed: i64,
    pub cancelled: i64,
}

pub fn event_stats(conn: &Connection) -> Result<EventStats, DbError> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM events GROUP BY status")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    let mut stats = EventStats::default();
    for row in rows {
        let (status, count) = row?;
        stats.total += count;
        match status.as_str() {
            "planned" => stats.planned = count,
            "ongoing" => stats.ongoing = count,
            "completed" => stats.completed = count,
            "cancelled" => stats.cancelled = count,
            _ => {}
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::users_db_operations::create_user;
    use crate::setup::db_setup::in_memory_db;
    use chrono::Duration;

    fn seed_user(conn: &Connection, email: &str) -> i64 {
        create_user(conn, email, "secret123", &[]).unwrap()
    }

    fn sample_input(title: &str, start_offset: Duration) -> EventInput {
        let start = Utc::now() + start_offset;
        EventInput {
            title: title.to_string(),
            description: Some("An evening of talks".to_string()),
            status: EventStatus::Planned,
            location: Some("Berlin".to_string()),
            start_date: start,
            end_date: Some(start + Duration::hours(3)),
            max_participants: 0,
            is_public: true,
        }
    }

    #[test]
    fn create_read_update_delete() {
        let conn = in_memory_db();
        let user_id = seed_user(&conn, "alice@example.com");
        let event_id = create_event(&conn, &sample_input("Rust meetup", Duration::days(3)), user_id)
            .unwrap();

        let event = read_event(&conn, event_id).expect("event exists");
        assert_eq!(event.title, "Rust meetup");
        assert_eq!(event.created_by_email, "alice@example.com");
        assert_eq!(event.participant_count, 0);

        let mut input = sample_input("Rust meetup XXL", Duration::days(3));
        input.status = EventStatus::Cancelled;
        update_event(&conn, event_id, &input).unwrap();
        let event = read_event(&conn, event_id).unwrap();
        assert_eq!(event.title, "Rust meetup XXL");
        assert_eq!(event.status, EventStatus::Cancelled);

        delete_event(&conn, event_id).unwrap();
        assert!(read_event(&conn, event_id).is_none());
        assert!(matches!(
            delete_event(&conn, event_id),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn filters_combine_with_and() {
        let conn = in_memory_db();
        let user_id = seed_user(&conn, "alice@example.com");

        let mut berlin = sample_input("Rust meetup", Duration::days(3));
        berlin.location = Some("Berlin".to_string());
        create_event(&conn, &berlin, user_id).unwrap();

        let mut paris = sample_input("Rust workshop", Duration::days(5));
        paris.location = Some("Paris".to_string());
        create_event(&conn, &paris, user_id).unwrap();

        let mut cancelled = sample_input("Go meetup", Duration::days(7));
        cancelled.location = Some("Berlin".to_string());
        cancelled.status = EventStatus::Cancelled;
        create_event(&conn, &cancelled, user_id).unwrap();

        let filter = EventFilter {
            status: Some(EventStatus::Planned),
            location: Some("berl".to_string()),
            ..Default::default()
        };
        let events = find_with_filters(&conn, &filter, None, None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Rust meetup");

        let filter = EventFilter {
            search: Some("meetup".to_string()),
            ..Default::default()
        };
        assert_eq!(count_with_filters(&conn, &filter).unwrap(), 2);
    }

    #[test]
    fn search_matches_description_too() {
        let conn = in_memory_db();
        let user_id = seed_user(&conn, "alice@example.com");
        create_event(&conn, &sample_input("Quarterly review", Duration::days(1)), user_id)
            .unwrap();

        let filter = EventFilter {
            search: Some("evening of talks".to_string()),
            ..Default::default()
        };
        assert_eq!(count_with_filters(&conn, &filter).unwrap(), 1);
    }

    #[test]
    fn order_by_is_whitelisted() {
        let conn = in_memory_db();
        let filter = EventFilter {
            order_by: Some("id; DROP TABLE events".to_string()),
            ..Default::default()
        };
        let err = find_with_filters(&conn, &filter, Some(10), None).unwrap_err();
        assert!(matches!(err, DbError::InvalidField(_)));
    }

    #[test]
    fn no_limit_returns_the_full_filtered_set() {
        let conn = in_memory_db();
        let user_id = seed_user(&conn, "alice@example.com");
        for i in 0..5 {
            create_event(
                &conn,
                &sample_input(&format!("Event {}", i), Duration::days(i + 1)),
                user_id,
            )
            .unwrap();
        }

        let filter = EventFilter::default();
        assert_eq!(find_with_filters(&conn, &filter, None, None).unwrap().len(), 5);

        // Offset without a limit still means "everything after the offset".
        let rest = find_with_filters(&conn, &filter, None, Some(2)).unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0].title, "Event 2");
    }

    #[test]
    fn pagination_clamps_and_counts_pages() {
        let conn = in_memory_db();
        let user_id = seed_user(&conn, "alice@example.com");
        for i in 0..7 {
            create_event(
                &conn,
                &sample_input(&format!("Event {}", i), Duration::days(i + 1)),
                user_id,
            )
            .unwrap();
        }

        let filter = EventFilter::default();
        let page = find_page(&conn, &filter, 0, 3).unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.total, 7);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.events.len(), 3);

        let last = find_page(&conn, &filter, 3, 3).unwrap();
        assert_eq!(last.events.len(), 1);

        let beyond = find_page(&conn, &filter, 9, 3).unwrap();
        assert!(beyond.events.is_empty());
        assert_eq!(beyond.total_pages, 3);
    }

    #[test]
    fn participant_set_is_deduplicated() {
        let conn = in_memory_db();
        let alice = seed_user(&conn, "alice@example.com");
        let bob = seed_user(&conn, "bob@example.com");
        let event_id = create_event(&conn, &sample_input("Meetup", Duration::days(2)), alice)
            .unwrap();

        add_participant(&conn, event_id, bob).unwrap();
        assert!(is_participant(&conn, event_id, bob));
        assert_eq!(participant_count(&conn, event_id).unwrap(), 1);

        let err = add_participant(&conn, event_id, bob).unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
        assert_eq!(participant_count(&conn, event_id).unwrap(), 1);

        assert!(remove_participant(&conn, event_id, bob).unwrap());
        assert!(!remove_participant(&conn, event_id, bob).unwrap());
        assert_eq!(participant_count(&conn, event_id).unwrap(), 0);
    }

    #[test]
    fn upcoming_excludes_past_and_non_planned() {
        let conn = in_memory_db();
        let user_id = seed_user(&conn, "alice@example.com");
        create_event(&conn, &sample_input("Future", Duration::days(2)), user_id).unwrap();
        create_event(&conn, &sample_input("Past", Duration::days(-2)), user_id).unwrap();
        let mut cancelled = sample_input("Cancelled", Duration::days(4));
        cancelled.status = EventStatus::Cancelled;
        create_event(&conn, &cancelled, user_id).unwrap();

        let upcoming = find_upcoming(&conn, 10).unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].title, "Future");
    }

    #[test]
    fn stats_count_by_status() {
        let conn = in_memory_db();
        let user_id = seed_user(&conn, "alice@example.com");
        create_event(&conn, &sample_input("A", Duration::days(1)), user_id).unwrap();
        create_event(&conn, &sample_input("B", Duration::days(2)), user_id).unwrap();
        let mut done = sample_input("C", Duration::days(-9));
        done.status = EventStatus::Completed;
        create_event(&conn, &done, user_id).unwrap();

        let stats = event_stats(&conn).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.planned, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.cancelled, 0);
    }
}
