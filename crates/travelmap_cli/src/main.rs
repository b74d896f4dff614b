//! CLI diagnostic entry point.
//!
//! # Responsibility
//! - Provide a small executable that drives `travelmap_core` end to end.
//! - Talk to the local SQLite store or the hosted backend.
//!
//! # Invariants
//! - Output is one record per line, newest first, for quick sanity checks.
//! - Access tokens are read from flags/env and never echoed.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use travelmap_core::{
    AccessResult, Category, ClientConfig, Destination, DestinationDraft, DestinationFilter,
    DestinationPatch,
    DestinationRepository, DestinationService, Identity, RestDestinationRepository,
    SessionIdentity, SqliteDestinationRepository,
};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "travelmap", version, about = "Inspect and edit saved travel destinations")]
struct Cli {
    /// Record backend to talk to.
    #[arg(long, value_enum, default_value_t = Backend::Local)]
    backend: Backend,
    /// SQLite file used by the local backend.
    #[arg(long, env = "TRAVELMAP_DB", default_value = "travelmap.db")]
    db: PathBuf,
    /// JSON client config for the hosted backend; env vars are used when unset.
    #[arg(long, env = "TRAVELMAP_CONFIG")]
    config: Option<PathBuf>,
    /// Owner id for the hosted backend.
    #[arg(long, env = "TRAVELMAP_USER_ID")]
    user_id: Option<Uuid>,
    /// Bearer token for the hosted backend.
    #[arg(long, env = "TRAVELMAP_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
    /// Absolute directory for rolling log files; logging is off when unset.
    #[arg(long, env = "TRAVELMAP_LOG_DIR")]
    log_dir: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Local,
    Remote,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Prints core linkage info.
    Ping,
    /// Lists destinations, newest first.
    List(ListArgs),
    /// Adds a destination.
    Add(AddArgs),
    /// Rates or marks a destination as visited.
    Update(UpdateArgs),
    /// Deletes a destination.
    Delete { id: Uuid },
}

#[derive(Debug, Args)]
struct ListArgs {
    /// Case-insensitive text matched against names and notes.
    #[arg(long, default_value = "")]
    search: String,
    #[arg(long, value_parser = parse_category)]
    category: Option<Category>,
}

#[derive(Debug, Args)]
struct AddArgs {
    name: String,
    #[arg(allow_negative_numbers = true)]
    latitude: f64,
    #[arg(allow_negative_numbers = true)]
    longitude: f64,
    #[arg(long, value_parser = parse_category, default_value = "other")]
    category: Category,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    id: Uuid,
    #[arg(long)]
    rating: Option<u8>,
    #[arg(long)]
    visited: Option<bool>,
    /// `YYYY-MM-DD`; an empty value clears it.
    #[arg(long)]
    visit_date: Option<String>,
    /// An empty value clears the notes.
    #[arg(long)]
    notes: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        if let Err(err) = travelmap_core::init_logging(travelmap_core::default_log_level(), log_dir)
        {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    if let Command::Ping = cli.command {
        println!("travelmap_core ping={}", travelmap_core::ping());
        println!("travelmap_core version={}", travelmap_core::core_version());
        return Ok(());
    }

    match cli.backend {
        Backend::Local => {
            let repo = SqliteDestinationRepository::open(&cli.db).map_err(|err| err.to_string())?;
            let service = DestinationService::new(repo, SessionIdentity::signed_in(Identity::local()));
            execute(&service, cli.command).await
        }
        Backend::Remote => {
            let config = match cli.config.as_deref() {
                Some(path) => ClientConfig::from_json_file(path),
                None => ClientConfig::from_env(),
            }
            .map_err(|err| err.to_string())?;
            let user_id = cli
                .user_id
                .ok_or("--user-id is required for the remote backend")?;
            let identity = Identity::new(user_id, cli.access_token.unwrap_or_default());
            let repo = RestDestinationRepository::new(config).map_err(|err| err.to_string())?;
            let service = DestinationService::new(repo, SessionIdentity::signed_in(identity));
            execute(&service, cli.command).await
        }
    }
}

async fn execute<R: DestinationRepository>(
    service: &DestinationService<R, SessionIdentity>,
    command: Command,
) -> Result<(), String> {
    report(match command {
        Command::Ping => Ok(()),
        Command::List(args) => {
            let filter = DestinationFilter::new(args.search).with_category(args.category);
            service.list().await.map(|destinations| {
                if destinations.is_empty() {
                    println!("no destinations yet");
                }
                destinations
                    .iter()
                    .filter(|destination| filter.matches(destination))
                    .for_each(print_destination);
            })
        }
        Command::Add(args) => {
            let mut draft = DestinationDraft::new(args.name, args.latitude, args.longitude)
                .with_category(args.category);
            draft.notes = args.notes;
            draft.tags = args.tags;
            service.create(draft).await.map(|created| print_destination(&created))
        }
        Command::Update(args) => {
            let patch = DestinationPatch {
                visited: args.visited,
                visit_date: args.visit_date.map(Some),
                notes: args.notes.map(Some),
                rating: args.rating.map(Some),
                ..DestinationPatch::default()
            };
            service
                .update(args.id, patch)
                .await
                .map(|updated| print_destination(&updated))
        }
        Command::Delete { id } => service.delete(id).await.map(|()| println!("deleted {id}")),
    })
}

fn report(result: AccessResult<()>) -> Result<(), String> {
    result.map_err(|err| err.to_string())
}

fn print_destination(destination: &Destination) {
    let rating = destination
        .rating
        .map_or_else(|| "-".to_string(), |value| value.to_string());
    println!(
        "{} {:<10} {:>11.6} {:>11.6} visited={} rating={} {}",
        destination.id,
        destination.category.as_str(),
        destination.latitude,
        destination.longitude,
        destination.visited,
        rating,
        destination.name
    );
}

fn parse_category(value: &str) -> Result<Category, String> {
    Category::parse(value).ok_or_else(|| {
        let known = Category::ALL.map(Category::as_str).join("|");
        format!("unknown category `{value}`; expected {known}")
    })
}
