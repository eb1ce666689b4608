use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miguafi_session::config::{API_BASE_VAR, SESSION_FILE_VAR};
use miguafi_session::guard::RouteTable;
use miguafi_session::multipart::{Form, Part};
use miguafi_session::resources::{self, NewAccount, NotificationQuery, UserBadge};
use miguafi_session::{ApiClient, ApiError, ClientConfig, FileSessionStore, RouteGuard, SessionController};
use serde_json::Value;


#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("cannot read {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
}

#[derive(Parser, Debug)]
#[command(name = "miguafi-cli", about = "Miguafi session and API CLI")]
struct Cli {
    #[arg(long, env = API_BASE_VAR)]
    base_url: Option<String>,

    #[arg(long, env = SESSION_FILE_VAR)]
    session_file: Option<PathBuf>,

    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Exchange email + password for a session token and persist it.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MIGUAFI_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the persisted session token.
    Logout,
    /// Print whether a session token is persisted.
    Status,
    /// Print the signed-in user's email.
    Whoami,
    Register(RegisterArgs),
    /// Show how the route guard resolves a client path for the current session.
    Route { path: String },
    Notifications {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        page_size: u32,
        #[arg(long, default_value_t = false)]
        unread_only: bool,
    },
    Api(ApiCommand),
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    email: String,
    #[arg(long, env = "MIGUAFI_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long)]
    dog_name: Option<String>,
    #[arg(long)]
    dog_photo_url: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    lng: Option<f64>,
}

#[derive(Args, Debug)]
struct ApiCommand {
    #[command(subcommand)]
    command: ApiSubcommand,
}

#[derive(Subcommand, Debug)]
enum ApiSubcommand {
    Get {
        path: String,
    },
    Post {
        path: String,
        #[arg(long)]
        data: Option<String>,
    },
    Put {
        path: String,
        #[arg(long)]
        data: Option<String>,
    },
    Delete {
        path: String,
    },
    Upload {
        path: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "file")]
        field: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN })
        .init();

    let config = resolve_config(ClientConfig::from_env(), cli.base_url.as_deref(), cli.session_file);
    let api = ApiClient::from_config(&config)?;
    let controller = SessionController::new(api, Arc::new(FileSessionStore::new(&config.session_file)));

    match cli.command {
        Command::Login { email, password } => {
            controller.login(&email, &password).await?;
            println!("logged in");
            Ok(())
        }
        Command::Logout => {
            controller.logout();
            println!("logged out");
            Ok(())
        }
        Command::Status => {
            let state = if controller.is_authenticated() { "logged in" } else { "logged out" };
            println!("{state} ({})", config.session_file.display());
            Ok(())
        }
        Command::Whoami => run_whoami(&controller).await,
        Command::Register(args) => run_register(&controller, args).await,
        Command::Route { path } => {
            run_route(&controller, &path);
            Ok(())
        }
        Command::Notifications { page, page_size, unread_only } => {
            let credential = require_credential(&controller)?;
            let query = NotificationQuery { page, page_size, unread_only };
            let page = resources::notifications(controller.api(), &credential, &query).await?;
            for item in &page.items {
                let marker = if item.is_read { " " } else { "*" };
                println!("{marker} [{}] {} ({})", item.id, item.message, item.created_at);
            }
            println!("{} of {} total", page.items.len(), page.total);
            Ok(())
        }
        Command::Api(api) => run_api(&controller, api).await,
    }
}

fn resolve_config(base: ClientConfig, base_url: Option<&str>, session_file: Option<PathBuf>) -> ClientConfig {
    let config = match base_url {
        Some(url) => base.with_base_url(url),
        None => base,
    };
    match session_file {
        Some(session_file) => ClientConfig { session_file, ..config },
        None => config,
    }
}

fn require_credential(controller: &SessionController) -> Result<String, CliError> {
    controller.credential().ok_or(CliError::Api(ApiError::Unauthenticated))
}

async fn run_whoami(controller: &SessionController) -> Result<(), CliError> {
    require_credential(controller)?;
    let badge = UserBadge::new(controller.clone());
    badge.refresh().await?;
    println!("{}", badge.email().unwrap_or_default());
    Ok(())
}

async fn run_register(controller: &SessionController, args: RegisterArgs) -> Result<(), CliError> {
    let account = NewAccount {
        email: args.email,
        password: args.password,
        dog_name: args.dog_name,
        dog_photo_url: args.dog_photo_url,
        location_lat: args.lat,
        location_lng: args.lng,
    };
    let user = resources::register(controller.api(), &account).await?;
    println!("registered {} ({})", user.email, user.id);
    Ok(())
}

fn run_route(controller: &SessionController, path: &str) {
    let guard = RouteGuard::new(controller.clone(), RouteTable::default());
    let navigator = guard.navigator(path);
    let screen = navigator.screen();
    let kind = if screen.protected { "protected" } else { "public" };
    println!("render {} ({kind})", screen.location);
    if let Some(origin) = navigator.return_to() {
        println!("return to {origin} after login");
    }
}

async fn run_api(controller: &SessionController, api: ApiCommand) -> Result<(), CliError> {
    let credential = controller.credential();
    let credential = credential.as_deref();
    let client = controller.api();
    match api.command {
        ApiSubcommand::Get { path } => {
            let json: Value = client.get(&path, credential).await?;
            print_json(&json)
        }
        ApiSubcommand::Post { path, data } => {
            let json: Value = match data {
                Some(data) => client.post(&path, &parse_body(&data)?, credential).await?,
                None => {
                    client.post_void(&path, credential).await?;
                    Value::Null
                }
            };
            print_json(&json)
        }
        ApiSubcommand::Put { path, data } => {
            let json: Value = match data {
                Some(data) => client.put(&path, &parse_body(&data)?, credential).await?,
                None => {
                    client.put_void(&path, credential).await?;
                    Value::Null
                }
            };
            print_json(&json)
        }
        ApiSubcommand::Delete { path } => {
            client.delete_void(&path, credential).await?;
            println!("deleted");
            Ok(())
        }
        ApiSubcommand::Upload { path, file, field } => {
            let bytes = std::fs::read(&file).map_err(|source| CliError::ReadFile { path: file.clone(), source })?;
            let part = Part::bytes(bytes).file_name(upload_file_name(&file));
            let json: Value = client.upload(&path, Form::new().part(field, part), credential).await?;
            print_json(&json)
        }
    }
}

fn parse_body(data: &str) -> Result<Value, CliError> {
    Ok(serde_json::from_str::<Value>(data)?)
}

fn upload_file_name(path: &Path) -> String {
    path.file_name().map_or_else(|| "upload".to_owned(), |name| name.to_string_lossy().into_owned())
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
