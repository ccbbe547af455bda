use std::io::{BufRead, IsTerminal, Write};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use internconnect::auth::models::{Role, UserStatus};
use internconnect::auth::password::{hash_password, validate_password};
use internconnect::config::AppConfig;
use internconnect::db::indexes::ensure_indexes;
use internconnect::db::models::{new_id, User};
use internconnect::db::user_repository::{MongoUserRepository, UserRepository};

const PASSWORD_ENV: &str = "INTERNCONNECT_ADMIN_PASSWORD";

/// Operator tasks for an InternConnect deployment.
#[derive(Parser)]
#[command(name = "internconnect-admin", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an active admin account, or promote an existing one.
    ///
    /// The password is taken from INTERNCONNECT_ADMIN_PASSWORD, otherwise read
    /// from stdin.
    CreateAdmin {
        #[arg(long)]
        email: String,
    },
    /// Create the MongoDB indexes the server relies on.
    EnsureIndexes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "internconnect=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("Failed to load configuration")?;
    let client = mongodb::Client::with_uri_str(&config.mongodb_uri)
        .await
        .context("Failed to connect to MongoDB")?;
    let db = client.database(&config.mongodb_database);

    match cli.command {
        Command::CreateAdmin { email } => {
            let stdin = std::io::stdin();
            if std::env::var_os(PASSWORD_ENV).is_none() && stdin.is_terminal() {
                eprint!("Password for {email}: ");
                std::io::stderr().flush()?;
            }
            let password = read_password(std::env::var(PASSWORD_ENV).ok(), stdin.lock())?;
            ensure_indexes(&db).await?;
            create_admin(&MongoUserRepository::new(&db), &email, &password).await?;
        }
        Command::EnsureIndexes => {
            ensure_indexes(&db).await?;
            tracing::info!(database = %config.mongodb_database, "Indexes ensured");
        }
    }
    Ok(())
}

/// The admin password from the environment, else the first line of `input`.
fn read_password(from_env: Option<String>, mut input: impl BufRead) -> anyhow::Result<String> {
    if let Some(password) = from_env.filter(|p| !p.is_empty()) {
        return Ok(password);
    }
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        anyhow::bail!("No password given: set {PASSWORD_ENV} or pass it on stdin");
    }
    Ok(password.to_string())
}

async fn create_admin(
    users: &dyn UserRepository,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    let email = email.trim().to_lowercase();
    if !email.contains('@') {
        anyhow::bail!("'{email}' is not a valid email address");
    }
    validate_password(password)?;
    let password_hash = hash_password(password)?;

    if let Some(existing) = users.find_by_email(&email).await? {
        users.set_role(&existing.id, Role::Admin).await?;
        users.set_status(&existing.id, UserStatus::Active).await?;
        users.set_password_hash(&existing.id, &password_hash).await?;
        tracing::info!(user_id = %existing.id, %email, "Promoted existing user to admin");
        return Ok(());
    }

    let now = Utc::now();
    let user = User {
        id: new_id(),
        email: email.clone(),
        password_hash,
        role: Role::Admin,
        status: UserStatus::Active,
        created_at: now,
        updated_at: now,
    };
    let user_id = user.id.clone();
    users.insert(user).await?;
    tracing::info!(%user_id, %email, "Created admin account");
    Ok(())
}
