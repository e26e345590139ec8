use clap::{Parser, Subcommand};
use redb::Database;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;
use vidfeed_backend::config::Config;
use vidfeed_backend::helper::form_helpers;
use vidfeed_backend::models::db_operations::users_db_operations;
use vidfeed_backend::models::Role;
use vidfeed_backend::setup::db_setup;

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
    Subadmin {
        #[command(subcommand)]
        action: SubadminAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Creates the content and identity databases. Pass `content` or `identity` to create only one.
    Setup { db_type: Option<String> },
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    /// Creates the admin account. Refused once an admin exists.
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        username: Option<String>,
    },
    List,
    ChangePassword {
        #[arg(long)]
        email: String,
        #[arg(long)]
        new_password: String,
    },
}

#[derive(Subcommand, Debug)]
enum SubadminAction {
    List,
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file).expect("FATAL: Failed to load or parse configuration.");

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup { db_type } => match db_type.as_deref() {
                Some("identity") => setup_identity_database(&config),
                Some("content") => setup_content_database(&config),
                Some(other) => {
                    eprintln!("❌ Error: Unknown database type '{}'. Use 'identity' or 'content'.", other)
                }
                None => {
                    setup_identity_database(&config);
                    setup_content_database(&config);
                }
            },
        },
        Commands::Admin { action } => match action {
            AdminAction::Create { email, password, username } => {
                create_admin_user(&config, email, password, username.as_deref())
            }
            AdminAction::List => list_accounts(&config, Role::Admin),
            AdminAction::ChangePassword { email, new_password } => change_password(&config, email, new_password),
        },
        Commands::Subadmin { action } => match action {
            SubadminAction::List => list_accounts(&config, Role::Subadmin),
        },
    }
}

fn setup_identity_database(config: &Config) {
    let db_path = config.identity_db_path();
    if db_path.exists() {
        println!("ℹ️ Identity database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up identity database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }

    let mut conn = Connection::open(&db_path).expect("Could not create identity database file.");
    match db_setup::setup_identity_db(&mut conn) {
        Ok(_) => println!("✅ Identity database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up identity database: {}", e),
    }
}

fn setup_content_database(config: &Config) {
    let db_path = config.content_db_path();
    if db_path.exists() {
        println!("ℹ️ Content database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up content database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }

    let db = Database::create(&db_path).expect("Failed to create content database file.");
    match db_setup::setup_content_db(&db) {
        Ok(_) => println!("✅ Content database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up content database: {}", e),
    }
}

fn open_identity_db(config: &Config) -> Option<Connection> {
    let db_path = config.identity_db_path();
    if !db_path.exists() {
        eprintln!(
            "❌ Error: Identity database not found at '{}'. Please run `setup_cli db setup` first.",
            db_path.display()
        );
        return None;
    }
    match Connection::open(&db_path) {
        Ok(conn) => match conn.execute_batch("PRAGMA foreign_keys = ON;") {
            Ok(_) => Some(conn),
            Err(e) => {
                eprintln!("❌ Error configuring identity database: {}", e);
                None
            }
        },
        Err(e) => {
            eprintln!("❌ Error opening identity database: {}", e);
            None
        }
    }
}

fn create_admin_user(config: &Config, email: &str, password: &str, username: Option<&str>) {
    let email = email.trim();
    let checks = form_helpers::validate_email(email)
        .and_then(|_| form_helpers::validate_password(password))
        .and_then(|_| username.map(form_helpers::validate_username).unwrap_or(Ok(())));
    if let Err(message) = checks {
        eprintln!("❌ Error: {}", message);
        return;
    }

    let mut conn = match open_identity_db(config) {
        Some(conn) => conn,
        None => return,
    };
    match users_db_operations::admin_exists(&conn) {
        Ok(true) => {
            eprintln!("❌ Error: An admin account already exists. Create sub-admins from the dashboard instead.");
            return;
        }
        Ok(false) => {}
        Err(e) => {
            eprintln!("❌ Error checking for an existing admin: {}", e);
            return;
        }
    }

    match users_db_operations::create_user_with_role(&mut conn, email, password, username, Role::Admin, None) {
        Ok(user) => println!("✅ Admin user '{}' created successfully (id {}).", user.email, user.id),
        Err(e) => eprintln!("❌ Error creating admin user: {}. It might be because the email already exists.", e),
    }
}

fn list_accounts(config: &Config, role: Role) {
    let conn = match open_identity_db(config) {
        Some(conn) => conn,
        None => return,
    };
    match users_db_operations::read_all_users(&conn) {
        Ok(users) => {
            println!("Listing {} accounts:", role.as_str());
            for (user, _) in users.iter().filter(|(_, user_role)| *user_role == Some(role)) {
                println!("- {} (created {})", user.email, user.created_at);
            }
        }
        Err(e) => eprintln!("❌ Error fetching accounts: {}", e),
    }
}

fn change_password(config: &Config, email: &str, new_password: &str) {
    if let Err(message) = form_helpers::validate_password(new_password) {
        eprintln!("❌ Error: {}", message);
        return;
    }
    let conn = match open_identity_db(config) {
        Some(conn) => conn,
        None => return,
    };
    match users_db_operations::update_password(&conn, email.trim(), new_password) {
        Ok(0) => eprintln!("❌ Error: No account with email '{}' found.", email),
        Ok(_) => {
            // Sign out every existing session.
            if let Ok(Some(user)) = users_db_operations::read_user_by_email(&conn, email.trim()) {
                if let Err(e) = users_db_operations::delete_user_tokens(&conn, &user.id) {
                    eprintln!("⚠️ Password changed but old sessions could not be revoked: {}", e);
                }
            }
            println!("✅ Password for '{}' changed successfully.", email);
        }
        Err(e) => eprintln!("❌ Error updating password: {}", e),
    }
}
