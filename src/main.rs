use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use pictora::config::{ClientConfig, ConfigError};
use pictora::net::types::{ImageUpload, StyleQuery, TaskStatus};
use pictora::net::{ApiClient, ApiError};
use pictora::router::{Navigation, Router, TitleCell};
use pictora::state::SessionStore;
use pictora::state::session::{
    CREATE_TASK_FAILED, LOGIN_FAILED, PROFILE_FAILED, REGISTER_FAILED, RETRY_TASK_FAILED, STYLES_FAILED,
    TASKS_FAILED, VIP_FAILED,
};
use pictora::storage::TokenStore;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("client setup failed: {0}")]
    Api(#[from] ApiError),
    #[error("login required; run `pictora login <username>` first")]
    LoginRequired,
    #[error("{0}")]
    Session(String),
    #[error("failed to read {path}: {source}")]
    ReadFile { path: String, source: io::Error },
    #[error("failed to read password: {0}")]
    Prompt(io::Error),
    #[error("invalid JSON output: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "pictora", about = "Pictora photo-styling client")]
struct Cli {
    #[arg(long, env = "PICTORA_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "PICTORA_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session token.
    Login {
        username: String,
        #[arg(long, env = "PICTORA_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account.
    Register {
        username: String,
        email: String,
        #[arg(long, env = "PICTORA_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored session.
    Logout,
    /// Show the signed-in user, credits and VIP status.
    Profile,
    /// List style effects.
    Styles {
        #[arg(long)]
        category: Option<i64>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },
    /// List style categories.
    Categories {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },
    /// Styles used recently by this account.
    Recent,
    /// List generation tasks.
    Tasks {
        /// pending, processing, completed or failed
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one task.
    Task { id: String },
    /// Retry a failed task.
    Retry { id: String },
    /// Upload a photo and apply a style.
    Generate {
        #[arg(long)]
        style: String,
        #[arg(long)]
        prompt: Option<String>,
        file: PathBuf,
    },
    /// Subscribe to VIP.
    Vip,
    /// Resolve a route through the navigation guard.
    Open { path: String },
}

impl Command {
    /// Route the web UI would show for this command.
    fn route(&self) -> &str {
        match self {
            Self::Login { .. } => "/login",
            Self::Register { .. } => "/register",
            Self::Logout => "/",
            Self::Profile | Self::Vip => "/profile",
            Self::Styles { .. } | Self::Categories { .. } | Self::Recent => "/styles",
            Self::Tasks { .. } | Self::Task { .. } | Self::Retry { .. } => "/tasks",
            Self::Generate { .. } => "/generate",
            Self::Open { path } => path,
        }
    }

    /// Commands that run regardless of where the guard sends them.
    fn ignores_guard(&self) -> bool {
        matches!(self, Self::Logout | Self::Open { .. })
    }
}

struct App {
    store: SessionStore,
    router: Router,
    title: Arc<TitleCell>,
}

impl App {
    fn build(api_url: Option<&str>, token_file: Option<PathBuf>) -> Result<Self, CliError> {
        let mut config = ClientConfig::from_env()?;
        if let Some(api_url) = api_url {
            config = config.with_api_url(api_url);
        }
        if let Some(token_file) = token_file {
            config = config.with_token_file(token_file);
        }
        tracing::debug!(api_url = %config.api_url, token_file = %config.token_file.display(), "client configured");

        let tokens = TokenStore::file(config.token_file.clone());
        let api = ApiClient::new(&config, tokens.clone())?;
        let title = Arc::new(TitleCell::default());
        Ok(Self {
            store: SessionStore::new(Arc::new(api), tokens.clone()),
            router: Router::new(tokens, title.clone()),
            title,
        })
    }

    fn failure(&self, fallback: &str) -> CliError {
        CliError::Session(self.store.error().unwrap_or_else(|| fallback.to_owned()))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pictora=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let app = App::build(cli.api_url.as_deref(), cli.token_file)?;
    run(&app, cli.command).await
}

async fn run(app: &App, command: Command) -> Result<(), CliError> {
    let navigation = app.router.navigate(command.route());
    tracing::debug!(title = %app.title.get(), path = navigation.path(), "navigated");
    if matches!(navigation, Navigation::Redirected { .. }) && !command.ignores_guard() {
        return Err(CliError::LoginRequired);
    }

    match command {
        Command::Login { username, password } => {
            let password = password_or_prompt(password)?;
            if !app.store.login(&username, &password).await {
                return Err(app.failure(LOGIN_FAILED));
            }
            print_json(&app.store.user())
        }
        Command::Register { username, email, password } => {
            let password = password_or_prompt(password)?;
            if !app.store.register(&username, &password, &email).await {
                return Err(app.failure(REGISTER_FAILED));
            }
            print_json(&serde_json::json!({ "registered": username, "message": app.store.snapshot().notice }))
        }
        Command::Logout => {
            app.store.logout();
            println!("signed out");
            Ok(())
        }
        Command::Profile => {
            app.store.fetch_user_profile().await;
            let state = app.store.snapshot();
            let Some(user) = state.user.as_ref() else {
                return Err(app.failure(PROFILE_FAILED));
            };
            print_json(&serde_json::json!({
                "username": user.username,
                "email": user.email,
                "is_vip": state.is_vip(),
                "credits": state.credits(),
            }))
        }
        Command::Styles { category, limit, offset } => {
            let query = StyleQuery { category_id: category, limit, offset };
            let styles = app.store.styles(query).await.ok_or_else(|| app.failure(STYLES_FAILED))?;
            print_json(&styles)
        }
        Command::Categories { limit, offset } => {
            let categories =
                app.store.style_categories(limit, offset).await.ok_or_else(|| app.failure(STYLES_FAILED))?;
            print_json(&categories)
        }
        Command::Recent => {
            let styles = app.store.recent_styles().await.ok_or_else(|| app.failure(STYLES_FAILED))?;
            print_json(&styles)
        }
        Command::Tasks { status } => {
            let status = status.map(|s| s.parse::<TaskStatus>().unwrap_or_else(|never| match never {}));
            let tasks = app.store.tasks(status.as_ref()).await.ok_or_else(|| app.failure(TASKS_FAILED))?;
            print_json(&tasks)
        }
        Command::Task { id } => {
            let task = app.store.task(&id).await.ok_or_else(|| app.failure(TASKS_FAILED))?;
            print_json(&task)
        }
        Command::Retry { id } => {
            let submission = app.store.retry_task(&id).await.ok_or_else(|| app.failure(RETRY_TASK_FAILED))?;
            print_json(&submission)
        }
        Command::Generate { style, prompt, file } => {
            let upload = read_upload(&file).await?;
            let submission = app
                .store
                .create_task(&style, prompt.as_deref(), upload)
                .await
                .ok_or_else(|| app.failure(CREATE_TASK_FAILED))?;
            print_json(&submission)
        }
        Command::Vip => {
            if !app.store.subscribe_vip().await {
                return Err(app.failure(VIP_FAILED));
            }
            let state = app.store.snapshot();
            print_json(&serde_json::json!({
                "message": state.notice,
                "is_vip": state.is_vip(),
                "credits": state.credits(),
            }))
        }
        Command::Open { .. } => {
            let redirected_from = match &navigation {
                Navigation::Redirected { from, .. } => Some(from.as_str()),
                _ => None,
            };
            print_json(&serde_json::json!({
                "path": navigation.path(),
                "view": navigation.view().map(|v| format!("{v:?}")),
                "title": app.title.get(),
                "redirected_from": redirected_from,
            }))
        }
    }
}

async fn read_upload(path: &std::path::Path) -> Result<ImageUpload, CliError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| CliError::ReadFile { path: path.display().to_string(), source })?;
    let file_name = path.file_name().map_or_else(|| "upload".to_owned(), |n| n.to_string_lossy().into_owned());
    let content_type = ImageUpload::content_type_for(&file_name);
    Ok(ImageUpload::new(file_name, content_type, bytes))
}

fn password_or_prompt(password: Option<String>) -> Result<String, CliError> {
    if let Some(password) = password {
        return Ok(password);
    }
    eprint!("password: ");
    io::stderr().flush().map_err(CliError::Prompt)?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).map_err(CliError::Prompt)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
