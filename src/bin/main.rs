use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use fintrack_auth::server::{self, AdminSeed, DEFAULT_BIND, DEFAULT_TOKEN_TTL_HOURS, ServerConfig};
use fintrack_auth::{
    AuthContext, AuthOptions, AuthPhase, ClientConfig, FileTokenStore, HttpAuthApi, UserProfile,
    load_client_config,
};

#[derive(Parser)]
#[command(name = "fintrack")]
#[command(about = "FinTrack session client and reference auth server")]
struct Cli {
    /// Override the auth API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Override the session store file
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reference auth server
    Serve {
        #[arg(long, default_value = DEFAULT_BIND)]
        bind: String,
        /// HMAC secret for issued tokens (random per run if omitted)
        #[arg(long, env = "FINTRACK_JWT_SECRET", hide_env_values = true)]
        jwt_secret: Option<String>,
        #[arg(long, default_value_t = DEFAULT_TOKEN_TTL_HOURS)]
        token_ttl_hours: i64,
        #[arg(long, env = "FINTRACK_ADMIN_NAME", default_value = "Admin")]
        admin_name: String,
        /// Seed (or promote) this account as admin at startup
        #[arg(long, env = "FINTRACK_ADMIN_EMAIL")]
        admin_email: Option<String>,
        #[arg(long, env = "FINTRACK_ADMIN_PASSWORD", hide_env_values = true)]
        admin_password: Option<String>,
    },
    /// Log in and store the session
    Login {
        email: String,
        #[arg(long, env = "FINTRACK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and store the session
    Register {
        name: String,
        email: String,
        #[arg(long, env = "FINTRACK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Confirm the stored session with the server
    Whoami,
    /// Forget the stored session
    Logout,
    /// Show the stored session without contacting the server
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("fintrack_auth=info".parse()?)
                .add_directive("fintrack=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            jwt_secret,
            token_ttl_hours,
            admin_name,
            admin_email,
            admin_password,
        } => {
            let jwt_secret = jwt_secret.unwrap_or_else(|| {
                warn!("No JWT secret configured, tokens will not survive a restart");
                format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
            });

            let admin = match (admin_email, admin_password) {
                (Some(email), Some(password)) => Some(AdminSeed {
                    name: admin_name,
                    email,
                    password,
                }),
                (Some(_), None) => {
                    anyhow::bail!("--admin-email requires --admin-password");
                }
                _ => None,
            };

            info!("Starting auth server on {}", bind);
            server::serve(ServerConfig {
                bind,
                jwt_secret,
                token_ttl_hours,
                admin,
            })
            .await?;
        }
        Commands::Login { email, password } => {
            let ctx = open_context(&cli.api_url, &cli.store)?;
            let user = ctx
                .login(&email, &password)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;
            println!("Logged in as {}", describe(&user));
        }
        Commands::Register {
            name,
            email,
            password,
        } => {
            let ctx = open_context(&cli.api_url, &cli.store)?;
            let user = ctx
                .register(&name, &email, &password)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;
            println!("Registered {}", describe(&user));
        }
        Commands::Whoami => {
            let ctx = open_context(&cli.api_url, &cli.store)?;
            if ctx.phase() == AuthPhase::Anonymous {
                println!("Not logged in");
                return Ok(());
            }

            ctx.load_user().await;
            match ctx.user() {
                Some(user) => println!("{}", describe(&user)),
                None => println!("Session expired, please log in again"),
            }
        }
        Commands::Logout => {
            let ctx = open_context(&cli.api_url, &cli.store)?;
            let was_authenticated = ctx.phase() != AuthPhase::Anonymous;
            ctx.logout();
            if was_authenticated {
                println!("Logged out");
            } else {
                println!("Not logged in");
            }
        }
        Commands::Status => {
            let config = client_config(&cli.api_url, &cli.store)?;
            let ctx = open_context_with(&config)?;
            println!("Server:  {}", config.api_base_url);
            println!("Store:   {}", config.store_path.display());
            match (ctx.phase(), ctx.user()) {
                (AuthPhase::Authenticated, Some(user)) => {
                    println!("Session: {}", describe(&user))
                }
                (AuthPhase::Resolving, _) => {
                    println!("Session: token stored, profile not yet confirmed")
                }
                _ => println!("Session: none"),
            }
        }
    }

    Ok(())
}

fn client_config(api_url: &Option<String>, store: &Option<PathBuf>) -> Result<ClientConfig> {
    let mut config = load_client_config()?;
    if let Some(url) = api_url {
        config.api_base_url = url.clone();
        config.validate()?;
    }
    if let Some(path) = store {
        config.store_path = path.clone();
    }
    Ok(config)
}

fn open_context(api_url: &Option<String>, store: &Option<PathBuf>) -> Result<AuthContext> {
    let config = client_config(api_url, store)?;
    open_context_with(&config)
}

fn open_context_with(config: &ClientConfig) -> Result<AuthContext> {
    let store = Arc::new(FileTokenStore::new(config.store_path.clone()));
    let api = Arc::new(HttpAuthApi::new(config)?);
    Ok(AuthContext::init(store, api, AuthOptions::from(config)))
}

fn describe(user: &UserProfile) -> String {
    format!("{} <{}> ({})", user.name, user.email, user.role)
}
