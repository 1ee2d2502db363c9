use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use staffgate::api::{self, AppState};
use staffgate::auth::{
    AuthConfig, AuthState, CredentialVerifier, RouteGate, SignInFlow, TokenIssuer, hash_password,
};
use staffgate::db::Database;
use staffgate::user::{NewUser, Role, SqliteUserStore, UserStore};

const APP_NAME: &str = "staffgate";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.common);

    let config = load_config(cli.common.config.as_deref())?;

    match cli.command {
        Command::Serve(cmd) => async_main(config, cmd),
        Command::InitAdmin(cmd) => async_init_admin(config, cmd),
        Command::Config { command } => handle_config(&cli.common, &config, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[tokio::main]
async fn async_main(config: AppConfig, cmd: ServeCommand) -> Result<()> {
    handle_serve(config, cmd).await
}

#[tokio::main]
async fn async_init_admin(config: AppConfig, cmd: InitAdminCommand) -> Result<()> {
    handle_init_admin(config, cmd).await
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Staffgate - HR platform authentication server.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve(ServeCommand),
    /// Create an admin user with credentials
    InitAdmin(InitAdminCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Host address to bind to
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
    /// Path to the sqlite database
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct InitAdminCommand {
    /// Admin email address
    #[arg(long)]
    email: String,
    /// Admin password (min 8 characters)
    #[arg(long)]
    password: String,
    /// Display name
    #[arg(long, default_value = "Administrator")]
    display_name: String,
    /// Path to the sqlite database
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Write a default config file with a generated signing secret
    Init,
}

/// Application configuration, layered from the config file and environment
/// variables prefixed with STAFFGATE__.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    host: String,
    port: u16,
    database_path: PathBuf,
    auth: AuthConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_path: default_database_path(),
            auth: AuthConfig::default(),
        }
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join("staffgate.toml")
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("./data"))
        .join(APP_NAME)
        .join("staffgate.db")
}

fn init_logging(common: &CommonOpts) {
    let default_level = if common.quiet {
        "error"
    } else {
        match common.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    let config = Config::builder()
        .add_source(
            File::from(path.as_path())
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(Environment::with_prefix("STAFFGATE").separator("__"))
        .build()
        .context("loading configuration")?;

    config
        .try_deserialize()
        .context("deserializing configuration")
}

async fn handle_serve(config: AppConfig, cmd: ServeCommand) -> Result<()> {
    config
        .auth
        .validate()
        .map_err(|e| anyhow!("invalid auth configuration: {e}"))?;
    let secret = config
        .auth
        .resolve_signing_secret()
        .map_err(|e| anyhow!("resolving signing secret: {e}"))?
        .ok_or_else(|| anyhow!("signing secret missing after validation"))?;

    let database_path = cmd.database.unwrap_or_else(|| config.database_path.clone());
    let db = Database::new(&database_path).await?;

    let store: Arc<dyn UserStore> = Arc::new(SqliteUserStore::new(db.pool().clone()));
    let issuer = Arc::new(TokenIssuer::new(
        store.clone(),
        &secret,
        config.auth.token_ttl_secs,
    ));
    let verifier = CredentialVerifier::new(store.clone());
    let sign_in = SignInFlow::new(store.clone(), verifier, issuer.clone());
    let auth_state = AuthState::new(issuer.clone(), RouteGate::default());

    let state = AppState::new(store, sign_in, issuer, auth_state, config.auth.clone());
    let router = api::create_router(state);

    let host = cmd.host.unwrap_or_else(|| config.host.clone());
    let port = cmd.port.unwrap_or(config.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("parsing bind address {host}:{port}"))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, database = %database_path.display(), "staffgate listening");

    axum::serve(listener, router)
        .await
        .context("serving HTTP API")?;

    Ok(())
}

async fn handle_init_admin(config: AppConfig, cmd: InitAdminCommand) -> Result<()> {
    if cmd.password.len() < 8 {
        anyhow::bail!("Password must be at least 8 characters.");
    }

    let database_path = cmd.database.unwrap_or_else(|| config.database_path.clone());
    let db = Database::new(&database_path).await?;
    let store = SqliteUserStore::new(db.pool().clone());

    let user = store
        .create(NewUser {
            email: cmd.email,
            password_hash: Some(hash_password(&cmd.password)?),
            display_name: cmd.display_name,
            role: Some(Role::Admin),
        })
        .await
        .context("creating admin user")?;

    println!("Created admin user {} ({})", user.email, user.id);
    Ok(())
}

fn handle_config(common: &CommonOpts, config: &AppConfig, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let rendered = toml::to_string_pretty(config).context("rendering configuration")?;
            print!("{rendered}");
            Ok(())
        }
        ConfigCommand::Init => {
            let path = common
                .config
                .clone()
                .unwrap_or_else(default_config_path);
            if path.exists() {
                anyhow::bail!("Config file already exists: {}", path.display());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating config directory: {}", parent.display()))?;
            }

            let defaults = AppConfig {
                auth: AuthConfig {
                    signing_secret: Some(AuthConfig::generate_signing_secret()),
                    ..AuthConfig::default()
                },
                ..AppConfig::default()
            };
            let rendered =
                toml::to_string_pretty(&defaults).context("rendering default configuration")?;
            std::fs::write(&path, rendered)
                .with_context(|| format!("writing config file: {}", path.display()))?;

            println!("Wrote default config to {}", path.display());
            Ok(())
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    clap_complete::generate(shell, &mut Cli::command(), APP_NAME, &mut io::stdout());
    Ok(())
}
