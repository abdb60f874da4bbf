use clap::{Parser, Subcommand};
use event_manager_backend::config::Config;
use event_manager_backend::models::db_operations::event_logs_db_operations;
use event_manager_backend::models::db_operations::users_db_operations;
use event_manager_backend::models::{ROLE_ADMIN, ROLE_USER};
use event_manager_backend::setup::db_setup;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "A CLI for initial application setup.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    Logs {
        #[command(subcommand)]
        action: LogsAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    Setup,
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum LogsAction {
    /// Deletes audit records older than the retention window.
    Prune {
        #[arg(long, default_value_t = 90)]
        retention_days: i64,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file)
        .expect("FATAL: Failed to load or parse configuration.");

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup => setup_database(&config),
        },
        Commands::Admin { action } => match action {
            AdminAction::Create { email, password } => create_admin_user(&config, email, password),
            AdminAction::List => list_admin_users(&config),
        },
        Commands::Logs { action } => match action {
            LogsAction::Prune { retention_days } => prune_logs(&config, *retention_days),
        },
    }
}

fn open_existing_db(config: &Config) -> Option<Connection> {
    let db_path = config.db_path();
    if !db_path.exists() {
        eprintln!(
            "❌ Error: Database not found at '{}'. Please run `setup_cli db setup` first.",
            db_path.display()
        );
        return None;
    }
    Some(Connection::open(&db_path).expect("Could not open the database."))
}

fn setup_database(config: &Config) {
    let db_path = config.db_path();
    if db_path.exists() {
        println!(
            "ℹ️ Database already exists at '{}'. Skipping creation.",
            db_path.display()
        );
        return;
    }
    println!("\nSetting up database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }

    let mut conn = Connection::open(&db_path).expect("Could not create the database file.");
    match db_setup::setup_database(&mut conn) {
        Ok(_) => println!("✅ Database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up database: {}", e),
    }
}

fn create_admin_user(config: &Config, email: &str, password: &str) {
    let conn = match open_existing_db(config) {
        Some(conn) => conn,
        None => return,
    };

    let roles = vec![ROLE_USER.to_string(), ROLE_ADMIN.to_string()];
    let user_id = match users_db_operations::create_user(&conn, email, password, &roles) {
        Ok(id) => id,
        Err(e) => {
            eprintln!(
                "❌ Error creating admin user: {}. The email address may already be registered.",
                e
            );
            return;
        }
    };

    // Accounts created from the CLI skip email verification.
    match users_db_operations::mark_email_verified(&conn, user_id) {
        Ok(_) => println!("✅ Admin user '{}' created and activated.", email),
        Err(e) => eprintln!("❌ Error activating admin user '{}': {}", email, e),
    }
}

fn list_admin_users(config: &Config) {
    let conn = match open_existing_db(config) {
        Some(conn) => conn,
        None => return,
    };

    let mut stmt = conn
        .prepare("SELECT email, is_active, roles FROM users ORDER BY email ASC")
        .expect("Could not query the users table.");
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .expect("Could not read the users table.");

    println!("Administrators:");
    let mut found = false;
    for row in rows {
        let (email, is_active, roles_json) = row.expect("Could not read user row.");
        let roles: Vec<String> = serde_json::from_str(&roles_json).unwrap_or_default();
        if roles.iter().any(|r| r == ROLE_ADMIN) {
            found = true;
            let state = if is_active { "active" } else { "inactive" };
            println!("  - {} ({})", email, state);
        }
    }
    if !found {
        println!("  (none)");
    }
}

fn prune_logs(config: &Config, retention_days: i64) {
    let conn = match open_existing_db(config) {
        Some(conn) => conn,
        None => return,
    };

    match event_logs_db_operations::prune_old_logs(&conn, retention_days) {
        Ok(deleted) => println!(
            "✅ Pruned {} audit record(s) older than {} days.",
            deleted, retention_days
        ),
        Err(e) => eprintln!("❌ Error pruning audit records: {}", e),
    }
}
