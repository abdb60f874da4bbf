use actix_cors::Cors;
use actix_csrf::CsrfMiddleware;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{
    cookie::Key,
    middleware::{DefaultHeaders, Logger},
    web, App, HttpResponse, HttpServer, Responder,
};
use clap::Parser;
use event_manager_backend::{
    config::Config,
    helper::mail_helpers::{LogMailer, Mailer, SharedMailer, SmtpMailer},
    routes,
};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rand::prelude::StdRng;
use std::convert::TryFrom;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tera::Tera;

async fn root_handler() -> impl Responder {
    HttpResponse::Found()
        .append_header(("location", "/events"))
        .finish()
}

#[derive(Parser, Debug)]
#[command(
    name = "event_manager_server",
    author,
    version,
    about = "Starts the event manager web server."
)]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file)
        .expect("FATAL: Failed to load or parse configuration.");

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    let tera = Tera::new("templates/**/*.html").expect("Tera initialization failed");

    fs::create_dir_all(&config.database_path).expect("Failed to create database directory");

    let manager = SqliteConnectionManager::file(config.db_path())
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = Pool::builder()
        .build(manager)
        .expect("FATAL: Failed to create Rusqlite connection pool.");

    let mailer: SharedMailer = if config.smtp_host.is_some() {
        let smtp = SmtpMailer::from_config(&config, tera.clone())
            .expect("FATAL: Failed to build the SMTP transport.");
        Arc::new(smtp) as Arc<dyn Mailer>
    } else {
        log::warn!("SMTP_HOST is not set. Outbound mail will be written to the log instead.");
        Arc::new(LogMailer) as Arc<dyn Mailer>
    };

    let session_key_bytes = hex::decode(&config.session_secret_key)
        .expect("FATAL: SESSION_SECRET_KEY in .env is not a valid hex string.");
    let session_key = Key::try_from(session_key_bytes.as_slice())
        .expect("FATAL: The decoded SESSION_SECRET_KEY is not long enough (minimum 64 bytes required).");

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    println!("🚀 Server starting at http://{}", server_address);

    HttpServer::new(move || {
        let session_mw =
            SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
                .cookie_secure(config.use_secure_cookies)
                .cookie_http_only(true)
                .cookie_same_site(actix_web::cookie::SameSite::Lax)
                .build();

        let cors = {
            let allowed_origins_str = &config.allowed_origins;
            if allowed_origins_str.trim() == "*" {
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .supports_credentials()
                    .max_age(3600)
            } else {
                let mut cors = Cors::default();
                let origins: Vec<&str> = allowed_origins_str
                    .split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .collect();
                for origin in origins {
                    cors = cors.allowed_origin(origin);
                }
                cors.allowed_methods(vec!["GET", "POST"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .supports_credentials()
                    .max_age(3600)
            }
        };

        // Cookies for CSRF tokens are issued on the GET pages that render
        // forms; every mutating POST is validated against them.
        let csrf_mw = CsrfMiddleware::<StdRng>::new()
            .set_cookie(actix_web::http::Method::GET, "/register")
            .set_cookie(actix_web::http::Method::GET, "/login")
            .set_cookie(actix_web::http::Method::GET, "/verification-pending")
            .set_cookie(actix_web::http::Method::GET, "/events/new")
            .set_cookie(actix_web::http::Method::GET, "/events/{id}")
            .set_cookie(actix_web::http::Method::GET, "/events/{id}/edit")
            .set_cookie(actix_web::http::Method::GET, "/posts/new")
            .set_cookie(actix_web::http::Method::GET, "/posts/{slug}")
            .set_cookie(actix_web::http::Method::GET, "/posts/{id}/edit")
            .set_cookie(actix_web::http::Method::GET, "/profile");

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block")),
            )
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(tera.clone()))
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(mailer.clone()))
            .configure(routes::public::config_api)
            .service(actix_files::Files::new("/static", "./static"))
            .route("/", web::get().to(root_handler))
            .service(
                web::scope("")
                    .wrap(session_mw)
                    .service(
                        web::scope("")
                            .wrap(csrf_mw)
                            .configure(routes::auth::config_auth)
                            .configure(routes::events::config_events)
                            .configure(routes::posts::config_posts)
                            .configure(routes::profile::config_profile)
                            .configure(routes::admin::config_admin),
                    ),
            )
    })
    .bind(server_address)?
    .run()
    .await
}
