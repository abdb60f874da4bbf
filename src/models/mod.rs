use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod db_operations;

pub const ROLE_USER: &str = "ROLE_USER";
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Stored role set; read through `effective_roles()` which guarantees
    /// the base role is always present.
    pub roles: Vec<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub is_email_verified: bool,
    #[serde(skip_serializing)]
    pub email_verification_token: Option<String>,
    pub email_verification_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Every user carries the base role, whether or not it was stored.
    pub fn effective_roles(&self) -> Vec<String> {
        let mut roles = self.roles.clone();
        if !roles.iter().any(|r| r == ROLE_USER) {
            roles.push(ROLE_USER.to_string());
        }
        roles
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ROLE_ADMIN)
    }

    pub fn full_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let name = name.trim().to_string();
        if name.is_empty() {
            self.email.clone()
        } else {
            name
        }
    }

    /// Absence of a token counts as expired (fail-closed).
    pub fn is_verification_token_expired(&self) -> bool {
        match self.email_verification_token_expires_at {
            Some(expires_at) => expires_at < Utc::now(),
            None => true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Planned,
    Ongoing,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Planned => "planned",
            EventStatus::Ongoing => "ongoing",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<EventStatus> {
        match value {
            "planned" => Some(EventStatus::Planned),
            "ongoing" => Some(EventStatus::Ongoing),
            "completed" => Some(EventStatus::Completed),
            "cancelled" => Some(EventStatus::Cancelled),
            _ => None,
        }
    }

    pub fn all() -> [&'static str; 4] {
        ["planned", "ongoing", "completed", "cancelled"]
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: EventStatus,
    pub location: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_participants: i64,
    pub is_public: bool,
    pub created_by: i64,
    pub created_by_email: String,
    pub participant_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn is_upcoming(&self) -> bool {
        self.start_date > Utc::now()
    }

    pub fn is_ongoing(&self) -> bool {
        let now = Utc::now();
        self.start_date <= now && self.end_date.map_or(false, |end| end >= now)
    }

    pub fn is_past(&self) -> bool {
        self.end_date.map_or(false, |end| end < Utc::now())
    }

    /// `max_participants == 0` means unlimited capacity.
    pub fn can_accept_more_participants(&self) -> bool {
        self.max_participants == 0 || self.participant_count < self.max_participants
    }
}

/// Validated input for creating or editing an event. Status is an open
/// field: any edit may move an event to any of the four states.
#[derive(Debug, Clone)]
pub struct EventInput {
    pub title: String,
    pub description: Option<String>,
    pub status: EventStatus,
    pub location: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_participants: i64,
    pub is_public: bool,
}

impl EventInput {
    pub fn validate(&self) -> Result<(), String> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err("Title must not be blank.".to_string());
        }
        if title.len() < 3 || title.len() > 255 {
            return Err("Title must be between 3 and 255 characters.".to_string());
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err("End date must not be before the start date.".to_string());
            }
        }
        if self.max_participants < 0 {
            return Err("Maximum participants must be zero or a positive number.".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub tags: Vec<String>,
    pub author_id: i64,
    pub author_email: String,
    pub is_published: bool,
    pub featured_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub author_email: String,
    pub parent_id: Option<i64>,
    pub content: String,
    pub is_hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Closed set of audit-log event types, grouped by subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEventType {
    UserRegistered,
    UserLogin,
    UserLogout,
    EventCreated,
    EventUpdated,
    EventDeleted,
    EventParticipantAdded,
    EventParticipantRemoved,
    PostCreated,
    PostUpdated,
    PostPublished,
    PostDeleted,
    CommentCreated,
    CommentUpdated,
    CommentHidden,
    CommentDeleted,
}

impl LogEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEventType::UserRegistered => "user.registered",
            LogEventType::UserLogin => "user.login",
            LogEventType::UserLogout => "user.logout",
            LogEventType::EventCreated => "event.created",
            LogEventType::EventUpdated => "event.updated",
            LogEventType::EventDeleted => "event.deleted",
            LogEventType::EventParticipantAdded => "event.participant.added",
            LogEventType::EventParticipantRemoved => "event.participant.removed",
            LogEventType::PostCreated => "post.created",
            LogEventType::PostUpdated => "post.updated",
            LogEventType::PostPublished => "post.published",
            LogEventType::PostDeleted => "post.deleted",
            LogEventType::CommentCreated => "comment.created",
            LogEventType::CommentUpdated => "comment.updated",
            LogEventType::CommentHidden => "comment.hidden",
            LogEventType::CommentDeleted => "comment.deleted",
        }
    }
}

impl std::fmt::Display for LogEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable, append-only activity record.
#[derive(Debug, Serialize, Clone)]
pub struct EventLogEntry {
    pub id: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub user_id: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Client metadata passed explicitly into audit-log calls. Both fields are
/// absent when an action runs outside a web request (setup_cli, tests).
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMetadata {
    pub fn empty() -> Self {
        RequestMetadata::default()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub message: String,
    pub r#type: String, // 'success', 'error', 'warning' or 'info'
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_user(roles: Vec<String>) -> User {
        let now = Utc::now();
        User {
            id: 1,
            email: "alice@example.com".to_string(),
            password_hash: "$2b$12$hash".to_string(),
            roles,
            first_name: None,
            last_name: None,
            bio: None,
            avatar: None,
            is_active: false,
            is_email_verified: false,
            email_verification_token: None,
            email_verification_token_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_event(start_offset: Duration, end_offset: Option<Duration>) -> Event {
        let now = Utc::now();
        Event {
            id: 1,
            title: "Team day".to_string(),
            description: None,
            status: EventStatus::Planned,
            location: None,
            start_date: now + start_offset,
            end_date: end_offset.map(|o| now + o),
            max_participants: 0,
            is_public: true,
            created_by: 1,
            created_by_email: "alice@example.com".to_string(),
            participant_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn roles_always_include_base_role() {
        let user = sample_user(vec![]);
        assert!(user.effective_roles().iter().any(|r| r == ROLE_USER));

        let admin = sample_user(vec![ROLE_ADMIN.to_string()]);
        let roles = admin.effective_roles();
        assert!(roles.iter().any(|r| r == ROLE_ADMIN));
        assert!(roles.iter().any(|r| r == ROLE_USER));
        assert!(admin.is_admin());
    }

    #[test]
    fn full_name_falls_back_to_email() {
        let mut user = sample_user(vec![]);
        assert_eq!(user.full_name(), "alice@example.com");
        user.first_name = Some("Alice".to_string());
        user.last_name = Some("Kim".to_string());
        assert_eq!(user.full_name(), "Alice Kim");
    }

    #[test]
    fn missing_token_counts_as_expired() {
        let mut user = sample_user(vec![]);
        assert!(user.is_verification_token_expired());

        user.email_verification_token_expires_at = Some(Utc::now() + Duration::hours(1));
        assert!(!user.is_verification_token_expired());

        user.email_verification_token_expires_at = Some(Utc::now() - Duration::hours(1));
        assert!(user.is_verification_token_expired());
    }

    #[test]
    fn event_time_predicates() {
        let upcoming = sample_event(Duration::hours(2), Some(Duration::hours(4)));
        assert!(upcoming.is_upcoming());
        assert!(!upcoming.is_ongoing());
        assert!(!upcoming.is_past());

        let ongoing = sample_event(Duration::hours(-1), Some(Duration::hours(1)));
        assert!(!ongoing.is_upcoming());
        assert!(ongoing.is_ongoing());
        assert!(!ongoing.is_past());

        let past = sample_event(Duration::hours(-4), Some(Duration::hours(-2)));
        assert!(past.is_past());
        assert!(!past.is_ongoing());
    }

    #[test]
    fn capacity_predicate_treats_zero_as_unlimited() {
        let mut event = sample_event(Duration::hours(2), None);
        event.participant_count = 10_000;
        assert!(event.can_accept_more_participants());

        event.max_participants = 3;
        event.participant_count = 2;
        assert!(event.can_accept_more_participants());
        event.participant_count = 3;
        assert!(!event.can_accept_more_participants());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for name in EventStatus::all() {
            let status = EventStatus::parse(name).unwrap();
            assert_eq!(status.as_str(), name);
        }
        assert!(EventStatus::parse("archived").is_none());
    }

    #[test]
    fn event_input_validation() {
        let now = Utc::now();
        let mut input = EventInput {
            title: "Hackathon".to_string(),
            description: None,
            status: EventStatus::Planned,
            location: None,
            start_date: now,
            end_date: Some(now + Duration::hours(8)),
            max_participants: 0,
            is_public: true,
        };
        assert!(input.validate().is_ok());

        input.title = "ab".to_string();
        assert!(input.validate().is_err());

        input.title = "Hackathon".to_string();
        input.end_date = Some(now - Duration::hours(1));
        assert!(input.validate().is_err());
    }
}
