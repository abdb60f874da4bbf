use crate::models::db_operations::events_db_operations::{
    add_participant, delete_event, is_participant, participant_count, read_event,
    remove_participant, update_event,
};
use crate::models::db_operations::DbError;
use crate::models::{Event, EventInput, EventStatus, ROLE_ADMIN};
use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventActionError {
    #[error("Registration is not open for this event.")]
    IneligibleRegistration,
    #[error("You are already registered for this event.")]
    AlreadyRegistered,
    #[error("You are not registered for this event.")]
    NotRegistered,
    #[error("You are not allowed to modify this event.")]
    Forbidden,
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Open for registration: still planned, has room, and has not started yet.
pub fn can_register(event: &Event) -> bool {
    event.status == EventStatus::Planned
        && event.can_accept_more_participants()
        && event.is_upcoming()
}

/// Only the creator and admins may edit or delete an event.
pub fn can_edit(actor_id: i64, actor_roles: &[String], event: &Event) -> bool {
    event.created_by == actor_id || actor_roles.iter().any(|r| r == ROLE_ADMIN)
}

/// Registers a user, holding eligibility check and insert in one transaction
/// so two concurrent registrations cannot both claim the last seat. The
/// post-insert recount aborts the transaction if capacity was overshot.
pub fn register(conn: &mut Connection, event_id: i64, user_id: i64) -> Result<(), EventActionError> {
    let tx = conn.transaction().map_err(DbError::from)?;
    let event = read_event(&tx, event_id)
        .ok_or_else(|| DbError::NotFound(format!("event {}", event_id)))?;
    if is_participant(&tx, event_id, user_id) {
        return Err(EventActionError::AlreadyRegistered);
    }
    if !can_register(&event) {
        return Err(EventActionError::IneligibleRegistration);
    }
    add_participant(&tx, event_id, user_id).map_err(|e| match e {
        DbError::Conflict(_) => EventActionError::AlreadyRegistered,
        other => EventActionError::Db(other),
    })?;
    if event.max_participants > 0
        && participant_count(&tx, event_id)? > event.max_participants
    {
        return Err(EventActionError::IneligibleRegistration);
    }
    tx.commit().map_err(DbError::from)?;
    Ok(())
}

pub fn unregister(conn: &Connection, event_id: i64, user_id: i64) -> Result<(), EventActionError> {
    read_event(conn, event_id).ok_or_else(|| DbError::NotFound(format!("event {}", event_id)))?;
    if !remove_participant(conn, event_id, user_id)? {
        return Err(EventActionError::NotRegistered);
    }
    Ok(())
}

/// Permission-checked update. Returns the event as it stands after the edit.
pub fn update_event_for(
    conn: &Connection,
    event_id: i64,
    input: &EventInput,
    actor_id: i64,
    actor_roles: &[String],
) -> Result<Event, EventActionError> {
    let event = read_event(conn, event_id)
        .ok_or_else(|| DbError::NotFound(format!("event {}", event_id)))?;
    if !can_edit(actor_id, actor_roles, &event) {
        return Err(EventActionError::Forbidden);
    }
    update_event(conn, event_id, input)?;
    let updated = read_event(conn, event_id)
        .ok_or_else(|| DbError::NotFound(format!("event {}", event_id)))?;
    Ok(updated)
}

/// Permission-checked delete. Returns the snapshot taken before removal so
/// the audit trail can keep what the event looked like.
pub fn delete_event_for(
    conn: &Connection,
    event_id: i64,
    actor_id: i64,
    actor_roles: &[String],
) -> Result<Event, EventActionError> {
    let event = read_event(conn, event_id)
        .ok_or_else(|| DbError::NotFound(format!("event {}", event_id)))?;
    if !can_edit(actor_id, actor_roles, &event) {
        return Err(EventActionError::Forbidden);
    }
    delete_event(conn, event_id)?;
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::events_db_operations::create_event;
    use crate::models::db_operations::users_db_operations::create_user;
    use crate::models::ROLE_USER;
    use crate::setup::db_setup::in_memory_db;
    use chrono::{Duration, Utc};

    fn seed_user(conn: &Connection, email: &str) -> i64 {
        create_user(conn, email, "secret123", &[]).unwrap()
    }

    fn seed_event(conn: &Connection, creator: i64, max_participants: i64) -> i64 {
        let start = Utc::now() + Duration::days(2);
        let input = EventInput {
            title: "Meetup".to_string(),
            description: None,
            status: EventStatus::Planned,
            location: None,
            start_date: start,
            end_date: Some(start + Duration::hours(2)),
            max_participants,
            is_public: true,
        };
        create_event(conn, &input, creator).unwrap()
    }

    #[test]
    fn register_then_unregister_changes_the_count_by_one() {
        let mut conn = in_memory_db();
        let alice = seed_user(&conn, "alice@example.com");
        let bob = seed_user(&conn, "bob@example.com");
        let event_id = seed_event(&conn, alice, 0);

        register(&mut conn, event_id, bob).unwrap();
        assert_eq!(participant_count(&conn, event_id).unwrap(), 1);

        let err = register(&mut conn, event_id, bob).unwrap_err();
        assert!(matches!(err, EventActionError::AlreadyRegistered));
        assert_eq!(participant_count(&conn, event_id).unwrap(), 1);

        unregister(&conn, event_id, bob).unwrap();
        assert_eq!(participant_count(&conn, event_id).unwrap(), 0);

        let err = unregister(&conn, event_id, bob).unwrap_err();
        assert!(matches!(err, EventActionError::NotRegistered));
    }

    #[test]
    fn full_events_refuse_registration() {
        let mut conn = in_memory_db();
        let alice = seed_user(&conn, "alice@example.com");
        let bob = seed_user(&conn, "bob@example.com");
        let carol = seed_user(&conn, "carol@example.com");
        let event_id = seed_event(&conn, alice, 1);

        register(&mut conn, event_id, bob).unwrap();
        let err = register(&mut conn, event_id, carol).unwrap_err();
        assert!(matches!(err, EventActionError::IneligibleRegistration));
        assert_eq!(participant_count(&conn, event_id).unwrap(), 1);
    }

    #[test]
    fn past_and_cancelled_events_refuse_registration() {
        let mut conn = in_memory_db();
        let alice = seed_user(&conn, "alice@example.com");
        let bob = seed_user(&conn, "bob@example.com");

        let start = Utc::now() - Duration::days(1);
        let past = create_event(
            &conn,
            &EventInput {
                title: "Yesterday".to_string(),
                description: None,
                status: EventStatus::Planned,
                location: None,
                start_date: start,
                end_date: None,
                max_participants: 0,
                is_public: true,
            },
            alice,
        )
        .unwrap();
        assert!(matches!(
            register(&mut conn, past, bob),
            Err(EventActionError::IneligibleRegistration)
        ));

        let cancelled = seed_event(&conn, alice, 0);
        let snapshot = read_event(&conn, cancelled).unwrap();
        let mut input = EventInput {
            title: snapshot.title,
            description: snapshot.description,
            status: EventStatus::Cancelled,
            location: snapshot.location,
            start_date: snapshot.start_date,
            end_date: snapshot.end_date,
            max_participants: snapshot.max_participants,
            is_public: snapshot.is_public,
        };
        update_event_for(&conn, cancelled, &input, alice, &[]).unwrap();
        assert!(matches!(
            register(&mut conn, cancelled, bob),
            Err(EventActionError::IneligibleRegistration)
        ));

        // The permissive lifecycle allows moving straight back to planned.
        input.status = EventStatus::Planned;
        update_event_for(&conn, cancelled, &input, alice, &[]).unwrap();
        register(&mut conn, cancelled, bob).unwrap();
    }

    #[test]
    fn edits_may_shrink_capacity_below_the_current_count() {
        let mut conn = in_memory_db();
        let alice = seed_user(&conn, "alice@example.com");
        let bob = seed_user(&conn, "bob@example.com");
        let carol = seed_user(&conn, "carol@example.com");
        let dave = seed_user(&conn, "dave@example.com");
        let event_id = seed_event(&conn, alice, 0);

        register(&mut conn, event_id, bob).unwrap();
        register(&mut conn, event_id, carol).unwrap();

        // Shrinking below the headcount is accepted; existing registrations
        // stay in place and only new ones are refused.
        let snapshot = read_event(&conn, event_id).unwrap();
        let input = EventInput {
            title: snapshot.title,
            description: snapshot.description,
            status: snapshot.status,
            location: snapshot.location,
            start_date: snapshot.start_date,
            end_date: snapshot.end_date,
            max_participants: 1,
            is_public: snapshot.is_public,
        };
        let updated = update_event_for(&conn, event_id, &input, alice, &[]).unwrap();
        assert_eq!(updated.max_participants, 1);
        assert_eq!(participant_count(&conn, event_id).unwrap(), 2);
        assert!(is_participant(&conn, event_id, bob));
        assert!(is_participant(&conn, event_id, carol));

        assert!(matches!(
            register(&mut conn, event_id, dave),
            Err(EventActionError::IneligibleRegistration)
        ));
    }

    #[test]
    fn registration_survives_a_failed_audit_write() {
        use crate::helper::log_helpers::record_participant_added;
        use crate::models::RequestMetadata;

        let mut conn = in_memory_db();
        let alice = seed_user(&conn, "alice@example.com");
        let bob = seed_user(&conn, "bob@example.com");
        let event_id = seed_event(&conn, alice, 0);

        conn.execute_batch("DROP TABLE event_logs").unwrap();

        register(&mut conn, event_id, bob).unwrap();
        // The audit write fails against the missing table but only logs;
        // the membership row stays committed.
        record_participant_added(&conn, bob, event_id, &RequestMetadata::empty());
        assert!(is_participant(&conn, event_id, bob));
        assert_eq!(participant_count(&conn, event_id).unwrap(), 1);
    }

    #[test]
    fn editing_is_creator_or_admin_only() {
        let conn = in_memory_db();
        let alice = seed_user(&conn, "alice@example.com");
        let mallory = seed_user(&conn, "mallory@example.com");
        let event_id = seed_event(&conn, alice, 0);
        let event = read_event(&conn, event_id).unwrap();

        assert!(can_edit(alice, &[ROLE_USER.to_string()], &event));
        assert!(!can_edit(mallory, &[ROLE_USER.to_string()], &event));
        assert!(can_edit(mallory, &[ROLE_ADMIN.to_string()], &event));

        let input = EventInput {
            title: "Taken over".to_string(),
            description: None,
            status: EventStatus::Planned,
            location: None,
            start_date: event.start_date,
            end_date: event.end_date,
            max_participants: 0,
            is_public: true,
        };
        assert!(matches!(
            update_event_for(&conn, event_id, &input, mallory, &[ROLE_USER.to_string()]),
            Err(EventActionError::Forbidden)
        ));
        assert!(matches!(
            delete_event_for(&conn, event_id, mallory, &[ROLE_USER.to_string()]),
            Err(EventActionError::Forbidden)
        ));

        let snapshot = delete_event_for(&conn, event_id, mallory, &[ROLE_ADMIN.to_string()])
            .unwrap();
        assert_eq!(snapshot.title, "Meetup");
        assert!(read_event(&conn, event_id).is_none());
    }
}
