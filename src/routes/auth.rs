use crate::helper::log_helpers;
use crate::helper::mail_helpers::SharedMailer;
use crate::helper::verification_helpers::{send_verification_email, verify_email_with_token, VerificationError};
use crate::middleware::request_metadata;
use crate::models::db_operations::users_db_operations;
use crate::models::db_operations::DbError;
use crate::config::Config;
use crate::routes::{redirect, render, set_notification, take_notification};
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_session::Session;
use actix_web::{web, HttpRequest, Responder};
use serde::Deserialize;
use tera::{Context, Tera};

#[derive(Deserialize)]
struct RegisterForm {
    csrf_token: CsrfToken,
    email: String,
    password: String,
    password_confirm: String,
    first_name: Option<String>,
    last_name: Option<String>,
}

impl CsrfGuarded for RegisterForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct LoginForm {
    csrf_token: CsrfToken,
    email: String,
    password: String,
}

impl CsrfGuarded for LoginForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct ResendForm {
    csrf_token: CsrfToken,
    email: String,
}

impl CsrfGuarded for ResendForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

pub fn config_auth(cfg: &mut web::ServiceConfig) {
    cfg.route("/register", web::get().to(show_register_form))
        .route("/register", web::post().to(handle_register))
        .route("/login", web::get().to(show_login_form))
        .route("/login", web::post().to(handle_login))
        .route("/logout", web::post().to(handle_logout))
        .route("/verify-email/{token}", web::get().to(handle_verify_email))
        .route("/verification-pending", web::get().to(show_verification_pending))
        .route("/resend-verification", web::post().to(handle_resend_verification));
}

async fn show_register_form(session: Session, tera: web::Data<Tera>, token: CsrfToken) -> impl Responder {
    let mut ctx = Context::new();
    ctx.insert("csrf_token", token.get());
    take_notification(&session, &mut ctx);
    render(&tera, "auth/register.html", &ctx)
}

async fn handle_register(
    req: HttpRequest,
    session: Session,
    pool: web::Data<crate::DbPool>,
    mailer: web::Data<SharedMailer>,
    config: web::Data<Config>,
    form: Csrf<web::Form<RegisterForm>>,
) -> impl Responder {
    let form = form.into_inner();
    let email = form.email.trim().to_lowercase();

    if !email.contains('@') {
        set_notification(&session, "Please enter a valid email address.", "error");
        return redirect("/register");
    }
    if form.password.len() < 8 {
        set_notification(&session, "The password must be at least 8 characters long.", "error");
        return redirect("/register");
    }
    if form.password != form.password_confirm {
        set_notification(&session, "The passwords do not match.", "error");
        return redirect("/register");
    }

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for registration: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect("/register");
        }
    };

    let user_id = match users_db_operations::create_user(&conn, &email, &form.password, &[]) {
        Ok(id) => id,
        Err(DbError::Conflict(_)) => {
            set_notification(&session, "An account with this email already exists.", "error");
            return redirect("/register");
        }
        Err(e) => {
            log::error!("Failed to create user '{}': {}", email, e);
            set_notification(&session, "Registration failed. Please try again.", "error");
            return redirect("/register");
        }
    };

    let first_name = form.first_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let last_name = form.last_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if first_name.is_some() || last_name.is_some() {
        if let Err(e) = users_db_operations::update_profile(&conn, user_id, first_name, last_name, None, None) {
            log::error!("Failed to store profile names for '{}': {}", email, e);
        }
    }

    log_helpers::record_user_registered(&conn, user_id, &email, &request_metadata(&req));

    match users_db_operations::read_user_by_id(&conn, user_id) {
        Some(user) => {
            if let Err(e) = send_verification_email(&conn, mailer.get_ref().as_ref(), &config.base_url, &user) {
                log::error!("Failed to send verification mail to '{}': {}", email, e);
                set_notification(
                    &session,
                    "Your account was created, but the verification mail could not be sent. Use the resend form below.",
                    "warning",
                );
                return redirect("/verification-pending");
            }
        }
        None => log::error!("User '{}' vanished right after creation.", email),
    }

    set_notification(
        &session,
        "Your account was created. Please check your inbox for the verification link.",
        "success",
    );
    redirect("/verification-pending")
}

async fn show_login_form(session: Session, tera: web::Data<Tera>, token: CsrfToken) -> impl Responder {
    let mut ctx = Context::new();
    ctx.insert("csrf_token", token.get());
    take_notification(&session, &mut ctx);
    render(&tera, "auth/login.html", &ctx)
}

async fn handle_login(
    req: HttpRequest,
    session: Session,
    pool: web::Data<crate::DbPool>,
    form: Csrf<web::Form<LoginForm>>,
) -> impl Responder {
    let form = form.into_inner();
    let email = form.email.trim().to_lowercase();

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for login: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect("/login");
        }
    };

    let user = match users_db_operations::verify_credentials(&conn, &email, &form.password) {
        Some(user) => user,
        None => {
            set_notification(&session, "Invalid email or password.", "error");
            return redirect("/login");
        }
    };

    // Unverified comes before inactive: a fresh account is both, and the
    // actionable problem is the missing verification.
    if !user.is_email_verified {
        set_notification(
            &session,
            "Please verify your email address before logging in.",
            "warning",
        );
        return redirect("/verification-pending");
    }
    if !user.is_active {
        set_notification(&session, "This account has been deactivated.", "error");
        return redirect("/login");
    }

    if let Err(e) = crate::middleware::store_login(&session, &user) {
        log::error!("Failed to store session for '{}': {}", email, e);
        set_notification(&session, "Login failed. Please try again.", "error");
        return redirect("/login");
    }
    log_helpers::record_user_login(&conn, user.id, &user.email, &request_metadata(&req));
    redirect("/events")
}

async fn handle_logout(
    req: HttpRequest,
    session: Session,
    pool: web::Data<crate::DbPool>,
) -> impl Responder {
    if let Ok(Some(user_id)) = session.get::<i64>("user_id") {
        match pool.get() {
            Ok(conn) => log_helpers::record_user_logout(&conn, user_id, &request_metadata(&req)),
            Err(e) => log::error!("Could not get DB connection for logout audit: {}", e),
        }
    }
    session.clear();
    redirect("/login")
}

async fn handle_verify_email(
    session: Session,
    pool: web::Data<crate::DbPool>,
    mailer: web::Data<SharedMailer>,
    token: web::Path<String>,
) -> impl Responder {
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for email verification: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect("/verification-pending");
        }
    };

    match verify_email_with_token(&conn, mailer.get_ref().as_ref(), &token) {
        Ok(true) => {
            set_notification(&session, "Your email has been verified. You can now log in.", "success");
            redirect("/login")
        }
        Ok(false) => {
            set_notification(&session, "This verification link is invalid or has expired.", "error");
            redirect("/verification-pending")
        }
        Err(e) => {
            log::error!("Email verification failed: {}", e);
            set_notification(&session, "Verification failed. Please try again.", "error");
            redirect("/verification-pending")
        }
    }
}

async fn show_verification_pending(session: Session, tera: web::Data<Tera>, token: CsrfToken) -> impl Responder {
    let mut ctx = Context::new();
    ctx.insert("csrf_token", token.get());
    take_notification(&session, &mut ctx);
    render(&tera, "auth/verification_pending.html", &ctx)
}

async fn handle_resend_verification(
    session: Session,
    pool: web::Data<crate::DbPool>,
    mailer: web::Data<SharedMailer>,
    config: web::Data<Config>,
    form: Csrf<web::Form<ResendForm>>,
) -> impl Responder {
    let form = form.into_inner();
    let email = form.email.trim().to_lowercase();

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for resend: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect("/verification-pending");
        }
    };

    // The answer is identical whether or not the account exists, so the
    // form cannot be used to probe for registered addresses.
    if let Some(user) = users_db_operations::read_user_by_email(&conn, &email) {
        match send_verification_email(&conn, mailer.get_ref().as_ref(), &config.base_url, &user) {
            Ok(()) | Err(VerificationError::AlreadyVerified) => {}
            Err(e) => log::error!("Failed to resend verification mail to '{}': {}", email, e),
        }
    }

    set_notification(
        &session,
        "If an account exists for this address, a new verification mail has been sent.",
        "success",
    );
    redirect("/verification-pending")
}
