use crate::helper::form_helpers::non_blank;
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::{events_db_operations, posts_db_operations, users_db_operations};
use crate::models::db_operations::posts_db_operations::PostFilter;
use crate::routes::{redirect, render, set_notification, take_notification};
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_session::Session;
use actix_web::{web, Responder};
use serde::Deserialize;
use tera::{Context, Tera};

#[derive(Deserialize)]
struct ProfileForm {
    csrf_token: CsrfToken,
    first_name: Option<String>,
    last_name: Option<String>,
    bio: Option<String>,
    avatar: Option<String>,
}

impl CsrfGuarded for ProfileForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

pub fn config_profile(cfg: &mut web::ServiceConfig) {
    cfg.route("/profile", web::get().to(show_profile))
        .route("/profile", web::post().to(handle_update));
}

async fn show_profile(
    user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<crate::DbPool>,
    token: CsrfToken,
) -> impl Responder {
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for profile: {}", e);
            return redirect("/events");
        }
    };

    let account = match users_db_operations::read_user_by_id(&conn, user.id) {
        Some(account) => account,
        None => {
            session.clear();
            return redirect("/login");
        }
    };

    let mut ctx = Context::new();
    ctx.insert("user", &user);
    ctx.insert("account", &account);
    ctx.insert("full_name", &account.full_name());
    ctx.insert("csrf_token", token.get());

    match events_db_operations::find_by_creator(&conn, user.id) {
        Ok(events) => ctx.insert("created_events", &events),
        Err(e) => log::error!("Failed to load created events: {}", e),
    }
    match events_db_operations::find_by_participant(&conn, user.id) {
        Ok(events) => ctx.insert("registered_events", &events),
        Err(e) => log::error!("Failed to load registered events: {}", e),
    }
    let own_posts = PostFilter {
        author_id: Some(user.id),
        ..Default::default()
    };
    match posts_db_operations::find_with_filters(&conn, &own_posts, None, None) {
        Ok(posts) => ctx.insert("own_posts", &posts),
        Err(e) => log::error!("Failed to load own posts: {}", e),
    }

    take_notification(&session, &mut ctx);
    render(&tera, "user/profile.html", &ctx)
}

async fn handle_update(
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<crate::DbPool>,
    form: Csrf<web::Form<ProfileForm>>,
) -> impl Responder {
    let form = form.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for profile update: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect("/profile");
        }
    };

    let result = users_db_operations::update_profile(
        &conn,
        user.id,
        non_blank(form.first_name.as_deref()).as_deref(),
        non_blank(form.last_name.as_deref()).as_deref(),
        non_blank(form.bio.as_deref()).as_deref(),
        non_blank(form.avatar.as_deref()).as_deref(),
    );
    match result {
        Ok(()) => set_notification(&session, "Profile updated.", "success"),
        Err(e) => {
            log::error!("Failed to update profile for user {}: {}", user.id, e);
            set_notification(&session, "The profile could not be updated.", "error");
        }
    }
    redirect("/profile")
}
