use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::{event_logs_db_operations, events_db_operations};
use crate::routes::{redirect, render, set_notification, take_notification};
use actix_session::Session;
use actix_web::{web, Responder};
use serde::Deserialize;
use tera::{Context, Tera};

const STATS_WINDOW_DAYS: i64 = 30;
const RECENT_LOG_LIMIT: i64 = 50;

#[derive(Deserialize)]
pub struct ActivityQuery {
    event_type: Option<String>,
    user_id: Option<i64>,
}

pub fn config_admin(cfg: &mut web::ServiceConfig) {
    cfg.route("/admin/activity", web::get().to(show_activity));
}

/// Activity dashboard: per-type counts over the last 30 days, event status
/// totals, and the newest audit records, optionally narrowed by type or user.
async fn show_activity(
    user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<crate::DbPool>,
    query: web::Query<ActivityQuery>,
) -> impl Responder {
    if !user.is_admin() {
        set_notification(&session, "This area is for administrators.", "error");
        return redirect("/events");
    }

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for activity dashboard: {}", e);
            return redirect("/events");
        }
    };

    let mut ctx = Context::new();
    ctx.insert("user", &user);

    match event_logs_db_operations::stats_by_type(&conn, STATS_WINDOW_DAYS) {
        Ok(stats) => ctx.insert("stats_by_type", &stats),
        Err(e) => log::error!("Failed to load activity stats: {}", e),
    }
    match events_db_operations::event_stats(&conn) {
        Ok(stats) => ctx.insert("event_stats", &stats),
        Err(e) => log::error!("Failed to load event stats: {}", e),
    }

    let entries = if let Some(event_type) = query.event_type.as_deref().filter(|s| !s.is_empty()) {
        ctx.insert("filter_event_type", event_type);
        event_logs_db_operations::find_by_type(&conn, event_type, RECENT_LOG_LIMIT)
    } else if let Some(user_id) = query.user_id {
        ctx.insert("filter_user_id", &user_id);
        event_logs_db_operations::find_by_user(&conn, user_id, RECENT_LOG_LIMIT)
    } else {
        event_logs_db_operations::find_recent(&conn, RECENT_LOG_LIMIT)
    };
    match entries {
        Ok(entries) => ctx.insert("entries", &entries),
        Err(e) => {
            log::error!("Failed to load audit records: {}", e);
            ctx.insert("entries", &Vec::<crate::models::EventLogEntry>::new());
        }
    }

    take_notification(&session, &mut ctx);
    render(&tera, "admin/activity.html", &ctx)
}
