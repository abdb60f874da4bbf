use crate::helper::event_helpers::{self, EventActionError};
use crate::helper::form_helpers::{checkbox_checked, non_blank, parse_datetime_local};
use crate::helper::log_helpers;
use crate::middleware::{request_metadata, AuthenticatedUser};
use crate::models::db_operations::events_db_operations::{self, EventFilter};
use crate::models::{EventInput, EventStatus};
use crate::routes::{redirect, render, set_notification, take_notification};
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_session::Session;
use actix_web::{web, HttpRequest, Responder};
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use tera::{Context, Tera};

const PAGE_SIZE: i64 = 10;

#[derive(Deserialize)]
pub struct EventListQuery {
    status: Option<String>,
    location: Option<String>,
    q: Option<String>,
    from: Option<String>,
    to: Option<String>,
    order_by: Option<String>,
    order: Option<String>,
    page: Option<i64>,
}

#[derive(Deserialize)]
struct EventForm {
    csrf_token: CsrfToken,
    title: String,
    description: Option<String>,
    status: String,
    location: Option<String>,
    start_date: String,
    end_date: Option<String>,
    max_participants: Option<String>,
    is_public: Option<String>,
}

impl CsrfGuarded for EventForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct ActionForm {
    csrf_token: CsrfToken,
}

impl CsrfGuarded for ActionForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

pub fn config_events(cfg: &mut web::ServiceConfig) {
    cfg.route("/events", web::get().to(list_events))
        .route("/events/new", web::get().to(show_new_form))
        .route("/events", web::post().to(handle_create))
        .route("/events/{id}", web::get().to(show_event))
        .route("/events/{id}/edit", web::get().to(show_edit_form))
        .route("/events/{id}", web::post().to(handle_update))
        .route("/events/{id}/delete", web::post().to(handle_delete))
        .route("/events/{id}/register", web::post().to(handle_register))
        .route("/events/{id}/unregister", web::post().to(handle_unregister));
}

fn parse_day_start(value: &str) -> Option<chrono::DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0)?))
}

fn parse_day_end(value: &str) -> Option<chrono::DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&day.and_hms_opt(23, 59, 59)?))
}

fn filter_from_query(query: &EventListQuery) -> EventFilter {
    EventFilter {
        public_only: true,
        status: query.status.as_deref().and_then(EventStatus::parse),
        start_from: query.from.as_deref().and_then(parse_day_start),
        start_until: query.to.as_deref().and_then(parse_day_end),
        location: non_blank(query.location.as_deref()),
        search: non_blank(query.q.as_deref()),
        order_by: non_blank(query.order_by.as_deref()),
        descending: query.order.as_deref() == Some("desc"),
    }
}

fn input_from_form(form: &EventForm) -> Result<EventInput, String> {
    let start_date = parse_datetime_local(&form.start_date)
        .ok_or_else(|| "Please provide a valid start date.".to_string())?;
    let end_date = match form.end_date.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Some(
            parse_datetime_local(value).ok_or_else(|| "Please provide a valid end date.".to_string())?,
        ),
        _ => None,
    };
    let status = EventStatus::parse(form.status.trim())
        .ok_or_else(|| "Unknown event status.".to_string())?;
    let max_participants = match form.max_participants.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => value
            .parse::<i64>()
            .map_err(|_| "Maximum participants must be a whole number.".to_string())?,
        _ => 0,
    };

    let input = EventInput {
        title: form.title.trim().to_string(),
        description: non_blank(form.description.as_deref()),
        status,
        location: non_blank(form.location.as_deref()),
        start_date,
        end_date,
        max_participants,
        is_public: checkbox_checked(form.is_public.as_deref()),
    };
    input.validate()?;
    Ok(input)
}

async fn list_events(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<crate::DbPool>,
    query: web::Query<EventListQuery>,
) -> impl Responder {
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for event list: {}", e);
            let mut ctx = Context::new();
            ctx.insert("events", &Vec::<crate::models::Event>::new());
            ctx.insert("statuses", &EventStatus::all());
            return render(&tera, "event/index.html", &ctx);
        }
    };

    let filter = filter_from_query(&query);
    let page = query.page.unwrap_or(1);
    let mut ctx = Context::new();
    match events_db_operations::find_page(&conn, &filter, page, PAGE_SIZE) {
        Ok(result) => {
            ctx.insert("events", &result.events);
            ctx.insert("total", &result.total);
            ctx.insert("page", &result.page);
            ctx.insert("total_pages", &result.total_pages);
        }
        Err(e) => {
            log::error!("Failed to list events: {}", e);
            ctx.insert("events", &Vec::<crate::models::Event>::new());
        }
    }
    ctx.insert("statuses", &EventStatus::all());
    if let Ok(Some(user_id)) = session.get::<i64>("user_id") {
        ctx.insert("user_id", &user_id);
    }
    take_notification(&session, &mut ctx);
    render(&tera, "event/index.html", &ctx)
}

async fn show_event(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<crate::DbPool>,
    path: web::Path<i64>,
    token: CsrfToken,
) -> impl Responder {
    let event_id = path.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for event {}: {}", event_id, e);
            return redirect("/events");
        }
    };

    let event = match events_db_operations::read_event(&conn, event_id) {
        Some(event) => event,
        None => {
            set_notification(&session, "This event does not exist.", "error");
            return redirect("/events");
        }
    };

    let user_id = session.get::<i64>("user_id").unwrap_or(None);
    let roles = session
        .get::<Vec<String>>("user_roles")
        .unwrap_or(None)
        .unwrap_or_default();

    // Private events stay between their creator and admins.
    let may_view = event.is_public
        || user_id.map_or(false, |id| event_helpers::can_edit(id, &roles, &event));
    if !may_view {
        set_notification(&session, "This event does not exist.", "error");
        return redirect("/events");
    }

    let mut ctx = Context::new();
    ctx.insert("event", &event);
    ctx.insert("csrf_token", token.get());
    ctx.insert("can_register", &event_helpers::can_register(&event));
    if let Some(id) = user_id {
        ctx.insert("user_id", &id);
        ctx.insert("is_participant", &events_db_operations::is_participant(&conn, event_id, id));
        ctx.insert("can_edit", &event_helpers::can_edit(id, &roles, &event));
    }
    take_notification(&session, &mut ctx);
    render(&tera, "event/show.html", &ctx)
}

async fn show_new_form(
    user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    token: CsrfToken,
) -> impl Responder {
    let mut ctx = Context::new();
    ctx.insert("csrf_token", token.get());
    ctx.insert("user", &user);
    ctx.insert("statuses", &EventStatus::all());
    take_notification(&session, &mut ctx);
    render(&tera, "event/form.html", &ctx)
}

async fn handle_create(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<crate::DbPool>,
    form: Csrf<web::Form<EventForm>>,
) -> impl Responder {
    let form = form.into_inner();
    let input = match input_from_form(&form) {
        Ok(input) => input,
        Err(message) => {
            set_notification(&session, &message, "error");
            return redirect("/events/new");
        }
    };

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for event creation: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect("/events/new");
        }
    };

    match events_db_operations::create_event(&conn, &input, user.id) {
        Ok(event_id) => {
            if let Some(event) = events_db_operations::read_event(&conn, event_id) {
                log_helpers::record_event_created(&conn, user.id, &event, &request_metadata(&req));
            }
            set_notification(&session, "Event created.", "success");
            redirect(&format!("/events/{}", event_id))
        }
        Err(e) => {
            log::error!("Failed to create event: {}", e);
            set_notification(&session, "The event could not be created.", "error");
            redirect("/events/new")
        }
    }
}

async fn show_edit_form(
    user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<crate::DbPool>,
    path: web::Path<i64>,
    token: CsrfToken,
) -> impl Responder {
    let event_id = path.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for event edit: {}", e);
            return redirect("/events");
        }
    };

    let event = match events_db_operations::read_event(&conn, event_id) {
        Some(event) => event,
        None => {
            set_notification(&session, "This event does not exist.", "error");
            return redirect("/events");
        }
    };
    if !event_helpers::can_edit(user.id, &user.roles, &event) {
        set_notification(&session, "You are not allowed to edit this event.", "error");
        return redirect(&format!("/events/{}", event_id));
    }

    let mut ctx = Context::new();
    ctx.insert("csrf_token", token.get());
    ctx.insert("user", &user);
    ctx.insert("event", &event);
    ctx.insert("statuses", &EventStatus::all());
    take_notification(&session, &mut ctx);
    render(&tera, "event/form.html", &ctx)
}

async fn handle_update(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<crate::DbPool>,
    path: web::Path<i64>,
    form: Csrf<web::Form<EventForm>>,
) -> impl Responder {
    let event_id = path.into_inner();
    let form = form.into_inner();
    let input = match input_from_form(&form) {
        Ok(input) => input,
        Err(message) => {
            set_notification(&session, &message, "error");
            return redirect(&format!("/events/{}/edit", event_id));
        }
    };

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for event update: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect(&format!("/events/{}/edit", event_id));
        }
    };

    match event_helpers::update_event_for(&conn, event_id, &input, user.id, &user.roles) {
        Ok(event) => {
            log_helpers::record_event_updated(&conn, user.id, &event, &request_metadata(&req));
            set_notification(&session, "Event updated.", "success");
            redirect(&format!("/events/{}", event_id))
        }
        Err(EventActionError::Forbidden) => {
            set_notification(&session, "You are not allowed to edit this event.", "error");
            redirect(&format!("/events/{}", event_id))
        }
        Err(e) => {
            log::error!("Failed to update event {}: {}", event_id, e);
            set_notification(&session, "The event could not be updated.", "error");
            redirect(&format!("/events/{}/edit", event_id))
        }
    }
}

async fn handle_delete(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<crate::DbPool>,
    path: web::Path<i64>,
    _form: Csrf<web::Form<ActionForm>>,
) -> impl Responder {
    let event_id = path.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for event deletion: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect(&format!("/events/{}", event_id));
        }
    };

    match event_helpers::delete_event_for(&conn, event_id, user.id, &user.roles) {
        Ok(snapshot) => {
            log_helpers::record_event_deleted(&conn, user.id, &snapshot, &request_metadata(&req));
            set_notification(&session, "Event deleted.", "success");
            redirect("/events")
        }
        Err(EventActionError::Forbidden) => {
            set_notification(&session, "You are not allowed to delete this event.", "error");
            redirect(&format!("/events/{}", event_id))
        }
        Err(e) => {
            log::error!("Failed to delete event {}: {}", event_id, e);
            set_notification(&session, "The event could not be deleted.", "error");
            redirect(&format!("/events/{}", event_id))
        }
    }
}

async fn handle_register(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<crate::DbPool>,
    path: web::Path<i64>,
    _form: Csrf<web::Form<ActionForm>>,
) -> impl Responder {
    let event_id = path.into_inner();
    let mut conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for registration: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect(&format!("/events/{}", event_id));
        }
    };

    match event_helpers::register(&mut conn, event_id, user.id) {
        Ok(()) => {
            log_helpers::record_participant_added(&conn, user.id, event_id, &request_metadata(&req));
            set_notification(&session, "You are registered for this event.", "success");
        }
        Err(EventActionError::AlreadyRegistered) => {
            set_notification(&session, "You are already registered for this event.", "warning");
        }
        Err(EventActionError::IneligibleRegistration) => {
            set_notification(&session, "Registration is not open for this event.", "error");
        }
        Err(e) => {
            log::error!("Registration for event {} failed: {}", event_id, e);
            set_notification(&session, "Registration failed. Please try again.", "error");
        }
    }
    redirect(&format!("/events/{}", event_id))
}

async fn handle_unregister(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<crate::DbPool>,
    path: web::Path<i64>,
    _form: Csrf<web::Form<ActionForm>>,
) -> impl Responder {
    let event_id = path.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for unregistration: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect(&format!("/events/{}", event_id));
        }
    };

    match event_helpers::unregister(&conn, event_id, user.id) {
        Ok(()) => {
            log_helpers::record_participant_removed(&conn, user.id, event_id, &request_metadata(&req));
            set_notification(&session, "Your registration was cancelled.", "success");
        }
        Err(EventActionError::NotRegistered) => {
            set_notification(&session, "You are not registered for this event.", "warning");
        }
        Err(e) => {
            log::error!("Unregistration from event {} failed: {}", event_id, e);
            set_notification(&session, "Cancellation failed. Please try again.", "error");
        }
    }
    redirect(&format!("/events/{}", event_id))
}
