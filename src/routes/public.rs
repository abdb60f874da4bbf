use crate::models::db_operations::posts_db_operations::{self, PostFilter};
use crate::models::db_operations::events_db_operations;
use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct ApiQuery {
    limit: Option<u32>,
    q: Option<String>,
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/is_server_active", web::get().to(is_server_active))
            .route("/events/upcoming", web::get().to(get_upcoming_events))
            .route("/posts/recent", web::get().to(get_recent_posts))
            .route("/posts/search", web::get().to(search_posts))
            .route("/tags/available", web::get().to(get_available_tags)),
    );
}

async fn is_server_active() -> impl Responder {
    HttpResponse::Ok().body("active")
}

async fn get_upcoming_events(
    pool: web::Data<crate::DbPool>,
    query: web::Query<ApiQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(10).min(100) as i64;
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for upcoming events: {}", e);
            return HttpResponse::InternalServerError().finish();
        }
    };
    match events_db_operations::find_upcoming(&conn, limit) {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => {
            log::error!("Failed to fetch upcoming events: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn get_recent_posts(
    pool: web::Data<crate::DbPool>,
    query: web::Query<ApiQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(10).min(100) as i64;
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for recent posts: {}", e);
            return HttpResponse::InternalServerError().finish();
        }
    };
    match posts_db_operations::find_recent(&conn, limit) {
        Ok(posts) => HttpResponse::Ok().json(posts),
        Err(e) => {
            log::error!("Failed to fetch recent posts: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn search_posts(
    pool: web::Data<crate::DbPool>,
    query: web::Query<ApiQuery>,
) -> impl Responder {
    let keyword = match query.q.as_deref() {
        Some(q) if !q.trim().is_empty() => q.trim().to_string(),
        _ => {
            return HttpResponse::BadRequest()
                .json("A non-empty 'q' query parameter is required for search.")
        }
    };
    let limit = query.limit.unwrap_or(10).min(100) as i64;

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for post search: {}", e);
            return HttpResponse::InternalServerError().finish();
        }
    };
    let filter = PostFilter {
        published_only: true,
        search: Some(keyword.clone()),
        ..Default::default()
    };
    match posts_db_operations::find_with_filters(&conn, &filter, Some(limit), None) {
        Ok(posts) => HttpResponse::Ok().json(posts),
        Err(e) => {
            log::error!("Failed to search posts for '{}': {}", keyword, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn get_available_tags(pool: web::Data<crate::DbPool>) -> impl Responder {
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for tag list: {}", e);
            return HttpResponse::InternalServerError().finish();
        }
    };
    match posts_db_operations::all_tags(&conn) {
        Ok(tags) => HttpResponse::Ok().json(tags),
        Err(e) => {
            log::error!("Failed to fetch available tags: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}
