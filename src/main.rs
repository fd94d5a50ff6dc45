use anyhow::Result;
use clap::{Parser, Subcommand};
use linglear_api::ApiClient;
use linglear_auth::{
    Endpoints, ExpiryPolicy, LoopbackTransport, SessionController, SessionState, flow, loopback,
};
use linglear_config::Config;
use linglear_store::{JsonFileStore, TokenStore};
use linglear_types::{Navigator, SessionView, TokenKind};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Parser, Debug)]
#[command(name = "linglear", about = "linglear: Linglear account session from the command line")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Print provider URLs instead of opening the browser.
    #[arg(long, global = true)]
    no_browser: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in through the hosted login page.
    Login,
    /// Log out locally and at the identity provider.
    Logout {
        /// Only clear local credentials.
        #[arg(long)]
        local: bool,
    },
    /// Show the current session.
    Status,
    /// Make sure the stored tokens are fresh, refreshing silently if needed.
    Refresh,
    /// Complete a login from a redirect URL carrying tokens in its fragment.
    Callback {
        /// The full redirect URL, including `#access_token=...`.
        url: String,
    },
    /// Show or change the backend base URL.
    Backend {
        /// New base URL; an empty string restores the default.
        url: Option<String>,
    },
    /// Call the backend with the session's credentials.
    Api {
        /// HTTP method (GET, POST, PUT, DELETE).
        method: String,
        /// Request path, e.g. `/api/me`.
        path: String,
        /// JSON request body.
        #[arg(long)]
        body: Option<String>,
    },
}

/// Reports session changes on stderr.
struct ConsoleView;

impl SessionView for ConsoleView {
    fn show_logged_in(&self, identity: &str) {
        if identity.is_empty() {
            eprintln!("Logged in");
        } else {
            eprintln!("Logged in as {identity}");
        }
    }

    fn show_logged_out(&self, notice: Option<&str>) {
        eprintln!("{}", notice.unwrap_or("Logged out"));
    }
}

/// Sends the user to provider pages in the system browser.
struct BrowserNavigator {
    open_browser: bool,
}

impl Navigator for BrowserNavigator {
    fn navigate(&self, url: &str) {
        if self.open_browser && open::that(url).is_ok() {
            return;
        }
        eprintln!("Open this URL in your browser:\n{url}");
    }

    fn replace_url(&self, url: &str) {
        tracing::debug!(%url, "history entry replaced");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let session = build_session(&config, cli.no_browser)?;

    match cli.command {
        Commands::Login => cmd_login(&session, &config, cli.no_browser).await,
        Commands::Logout { local } => {
            if local {
                session.force_logout(None);
            } else {
                session.logout();
            }
            Ok(())
        }
        Commands::Status => cmd_status(&session),
        Commands::Refresh => {
            session
                .ensure_fresh_tokens()
                .await
                .map_err(|e| anyhow::anyhow!("refresh failed: {e}"))?;
            cmd_status(&session)
        }
        Commands::Callback { url } => match session.start(&url).await {
            SessionState::LoggedOut => anyhow::bail!("no session could be established"),
            _ => Ok(()),
        },
        Commands::Backend { url } => {
            let api = ApiClient::new(rquest::Client::new(), session.scheduler().clone(), &config.api)?;
            let base = match url {
                Some(url) => api.set_backend(&url),
                None => api.backend(),
            };
            println!("{base}");
            Ok(())
        }
        Commands::Api { method, path, body } => {
            cmd_api(&session, &config, &method, &path, body.as_deref()).await
        }
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}

/// Load configuration and point the redirect URIs at the loopback listener,
/// which is where the command-line flows receive tokens.
fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let mut config = Config::load(path).map_err(|e| anyhow::anyhow!("config error: {e}"))?;
    let port = config.loopback.port;
    let identity = &mut config.identity;
    if identity.logout_uri.is_none() {
        identity.logout_uri = Some(identity.redirect_uri.clone());
    }
    identity.redirect_uri = loopback::redirect_uri(port);
    identity.silent_redirect_uri = loopback::redirect_uri(port);
    identity.app_origin = loopback::loopback_origin(port);
    Ok(config)
}

fn build_session(config: &Config, no_browser: bool) -> Result<SessionController> {
    let endpoints = Arc::new(Endpoints::from_config(&config.identity)?);
    let path = config.storage.path.clone().unwrap_or_else(default_store_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = TokenStore::new(Arc::new(JsonFileStore::new(path)));
    Ok(SessionController::new(
        endpoints,
        store,
        Arc::new(transport(config, no_browser)),
        Arc::new(BrowserNavigator {
            open_browser: !no_browser,
        }),
        Arc::new(ConsoleView),
        &config.refresh,
    ))
}

fn transport(config: &Config, no_browser: bool) -> LoopbackTransport {
    let transport = LoopbackTransport::new(config.loopback.port);
    if no_browser {
        transport.without_browser()
    } else {
        transport
    }
}

async fn cmd_login(session: &SessionController, config: &Config, no_browser: bool) -> Result<()> {
    flow::interactive_login(session, &transport(config, no_browser), flow::LOGIN_TIMEOUT)
        .await
        .map_err(|e| anyhow::anyhow!("login failed: {e}"))?;
    Ok(())
}

fn cmd_status(session: &SessionController) -> Result<()> {
    match session.state() {
        SessionState::LoggedOut => println!("not logged in"),
        SessionState::Refreshing => println!("refreshing"),
        SessionState::LoggedIn { identity } => {
            let who = if identity.is_empty() { "(unknown)" } else { &identity };
            println!("logged in as {who}");
            if let Some(access) = session.store().get(TokenKind::Access) {
                match ExpiryPolicy::seconds_remaining(&access) {
                    left if left > 0 => println!("access token expires in {left}s"),
                    _ => println!("access token expired or without expiry"),
                }
            }
        }
    }
    Ok(())
}

async fn cmd_api(
    session: &SessionController,
    config: &Config,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<()> {
    let method: rquest::Method = method
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid HTTP method '{method}'"))?;
    let body = body
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid JSON body: {e}"))?;
    let api = ApiClient::new(rquest::Client::new(), session.scheduler().clone(), &config.api)?;
    let data = api.request(method, path, body.as_ref()).await?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

fn default_store_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".linglear").join("store.json")
}
