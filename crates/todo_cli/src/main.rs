//! `todo` command-line entry point.
//!
//! # Responsibility
//! - Wire config, logging, the local document store and the task service.
//! - Translate task use-case results into terminal output and exit status.

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use todo_core::db::open_db;
use todo_core::{
    default_log_level, init_logging, AppConfig, ItemRepository, LoggingOptions,
    SqliteDocumentClient, Task, TaskService,
};

#[derive(Parser)]
#[command(name = "todo")]
#[command(version)]
#[command(about = "Keep a to-do list in a document store")]
struct Cli {
    /// Document store file
    #[arg(long, global = true, env = "TODO_STORE_PATH", default_value = "todo_store.sqlite3")]
    store: PathBuf,

    /// Absolute directory for log files (defaults to the system temp dir)
    #[arg(long, global = true, env = "TODO_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// trace|debug|info|warn|error
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and collection if they do not exist
    Init,

    /// List open tasks
    List {
        /// Include completed tasks
        #[arg(short, long)]
        all: bool,
    },

    /// Add a task
    Add {
        #[arg(short, long)]
        name: String,

        #[arg(short, long, default_value = "")]
        category: String,
    },

    /// Show one task
    Get { id: String },

    /// Mark tasks completed
    Complete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env();

    let log_dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("todo-logs"));
    let mut logging = LoggingOptions::new(
        cli.log_level.as_deref().unwrap_or(default_log_level()),
        log_dir.to_string_lossy(),
    );
    logging.echo_to_stderr = true;
    init_logging(&logging).context("failed to initialize logging")?;

    if config.uses_placeholder_credentials() {
        warn!("event=config_load module=cli status=placeholder host_or_key=default");
    }
    info!("event=config_load module=cli status=ok config={config:?}");

    let conn = open_db(&cli.store)
        .with_context(|| format!("failed to open store `{}`", cli.store.display()))?;
    let client = SqliteDocumentClient::connect(&conn, &config.host, &config.auth_key)
        .context("failed to authorize against the store")?;

    let mut repo = ItemRepository::from_config(client, &config);
    repo.initialize()
        .context("failed to provision database and collection")?;
    let service = TaskService::new(repo);

    match cli.command {
        Commands::Init => {
            if let Some(collection) = service.repository().collection() {
                println!("ready: {}", collection.self_link);
            }
        }
        Commands::List { all } => {
            let tasks = if all {
                service.list_tasks()?
            } else {
                service.list_open_tasks()?
            };
            if tasks.is_empty() {
                println!("No tasks.");
            }
            for task in &tasks {
                print_task(task);
            }
        }
        Commands::Add { name, category } => {
            let task = service.add_task(&name, &category)?;
            println!("added {}", task.id);
        }
        Commands::Get { id } => match service.get_task(&id)? {
            Some(task) => print_task(&task),
            None => anyhow::bail!("task not found: {id}"),
        },
        Commands::Complete { ids } => {
            for task in service.complete_tasks(ids.as_slice())? {
                println!("completed {}", task.id);
            }
        }
    }

    Ok(())
}

fn print_task(task: &Task) {
    let mark = if task.completed { "x" } else { " " };
    let category = if task.category.is_empty() {
        String::new()
    } else {
        format!(" [{}]", task.category)
    };
    println!("[{mark}] {} {}{category}", task.id, task.name);
}
