use clap::{Parser, Subcommand};
use doclayer::cli::{self as prog_cli, App};
use doclayer::config::AppConfig;
use doclayer::locale::Locale;
use doclayer::response::Responses;
use doclayer::store::MemoryStore;
use doclayer::utils::logger;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "doclayer", version, about = "Users over an embedded document store", long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a config file (TOML). Defaults to ./doclayer.toml when present.")]
    config: Option<PathBuf>,
    #[arg(long, help = "Snapshot file holding the data. Takes precedence over config/env.")]
    data: Option<PathBuf>,
    #[arg(long, help = "Response language (e.g. en, hi).")]
    lang: Option<String>,
    #[arg(long, help = "Log every store command with its duration.")]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(subcommand, about = "Manage users")]
    Users(UserCommands),
    #[command(about = "Insert generated demo users")]
    Seed {
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
    #[command(about = "Run an aggregation pipeline over users; paginated when --page or --limit is given")]
    Aggregate {
        #[arg(help = "Pipeline JSON (e.g., [{\"$match\": {\"name\": \"Ann\"}}])")]
        pipeline: String,
        #[arg(long)]
        page: Option<i64>,
        #[arg(long)]
        limit: Option<i64>,
    },
    #[command(about = "List collection names")]
    Collections,
}

#[derive(Subcommand, Debug)]
enum UserCommands {
    #[command(about = "List users, optionally filtered by a name search")]
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        page: Option<i64>,
        #[arg(long)]
        limit: Option<i64>,
    },
    Create { name: String, email: String },
    Get { id: String },
    #[command(name = "find-by-email")]
    FindByEmail { email: String },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    Delete { id: String },
    Count {
        #[arg(long, help = "Filter JSON; counts every user when omitted")]
        filter: Option<String>,
    },
}

impl From<Commands> for prog_cli::Command {
    fn from(c: Commands) -> Self {
        match c {
            Commands::Users(u) => match u {
                UserCommands::List { search, page, limit } => Self::UsersList { search, page, limit },
                UserCommands::Create { name, email } => Self::UsersCreate { name, email },
                UserCommands::Get { id } => Self::UsersGet { id },
                UserCommands::FindByEmail { email } => Self::UsersFindByEmail { email },
                UserCommands::Update { id, name, email } => Self::UsersUpdate { id, name, email },
                UserCommands::Delete { id } => Self::UsersDelete { id },
                UserCommands::Count { filter } => Self::UsersCount { filter_json: filter },
            },
            Commands::Seed { count } => Self::Seed { count },
            Commands::Aggregate { pipeline, page, limit } => Self::Aggregate { pipeline_json: pipeline, page, limit },
            Commands::Collections => Self::Collections,
        }
    }
}

fn real_main() -> Result<u16, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    // Precedence: CLI > env > config file > defaults
    let mut cfg = AppConfig::load(cli.config.as_deref())?;
    if let Some(p) = cli.data {
        cfg.data_path = Some(p);
    }
    if let Some(l) = cli.lang {
        cfg.default_lang = l;
    }
    cfg.debug |= cli.debug;

    if let Err(e) = logger::configure_from_env(cfg.log_dir.as_deref(), &cfg.log_level) {
        eprintln!("logging disabled: {e}");
    }

    let store = match &cfg.data_path {
        Some(path) => MemoryStore::open(path, &cfg.db_name)?,
        None => MemoryStore::new(&cfg.db_name),
    }
    .with_command_logging(cfg.debug);
    let store = Arc::new(store);

    let locale = Arc::new(Locale::embedded());
    locale.set_default_language(&cfg.default_lang);
    let app = App::new(Arc::clone(&store), Responses::new(locale, &cfg.default_lang), cfg.query_timeout())?;

    let mut stdout = std::io::stdout().lock();
    let outcome = prog_cli::run(&app, cli.command.into(), &mut stdout)?;
    if outcome.wrote
        && let Some(path) = &cfg.data_path
    {
        store.save_snapshot(path)?;
    }
    Ok(outcome.status_code)
}

fn main() {
    match real_main() {
        Ok(code) if code < 400 => {}
        Ok(_) => std::process::exit(2),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
