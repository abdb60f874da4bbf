use crate::models::Notification;
use actix_session::Session;
use actix_web::HttpResponse;
use tera::{Context, Tera};

pub mod admin;
pub mod auth;
pub mod events;
pub mod posts;
pub mod profile;
pub mod public;

pub(crate) fn set_notification(session: &Session, message: &str, r#type: &str) {
    session
        .insert(
            "notification",
            &Notification {
                message: message.to_string(),
                r#type: r#type.to_string(),
            },
        )
        .unwrap();
}

/// Moves a pending flash notification from the session into the template
/// context. Flashes show exactly once.
pub(crate) fn take_notification(session: &Session, ctx: &mut Context) {
    if let Ok(Some(notification)) = session.get::<Notification>("notification") {
        ctx.insert("notification", &notification);
        session.remove("notification");
    }
}

pub(crate) fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .append_header(("location", location.to_string()))
        .finish()
}

pub(crate) fn render(tera: &Tera, template: &str, ctx: &Context) -> HttpResponse {
    match tera.render(template, ctx) {
        Ok(rendered) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(rendered),
        Err(err) => {
            log::error!("Template rendering error in '{}': {}", template, err);
            HttpResponse::InternalServerError().body("Error rendering page.")
        }
    }
}
