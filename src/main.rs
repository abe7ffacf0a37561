use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use tasktrail::classifier::ClassifierKind;
use tasktrail::cli::{classify, find, ingest, related, rename, show, tasks};
use tasktrail::config::Config;
use tasktrail::model::{SearchId, TaskId};
use tasktrail::store::SqliteStore;

#[derive(Parser)]
#[command(name = "tasktrail")]
#[command(about = "Groups web searches and visited pages into search tasks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "tasktrail.yaml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay activity logs (and optionally live events from stdin) into the model
    Ingest {
        /// Activity log glob pattern, may be repeated (.jsonl or .jsonl.zst)
        #[arg(short, long = "log")]
        logs: Vec<String>,

        /// Read live JSON events from stdin after the logs are replayed
        #[arg(long)]
        stdin: bool,
    },

    /// List tasks, most recently active first
    Tasks {
        /// Maximum number of tasks to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Show the searches and pages of a task
    Show {
        /// Task ID
        task_id: TaskId,
    },

    /// Rank tasks by similarity to a search
    Related {
        /// Search ID
        search_id: SearchId,

        /// Maximum number of tasks to show
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },

    /// Score two queries with the same-task classifier
    Classify {
        q1: String,
        q2: String,

        /// Classifier strategy (logistic, average-distance)
        #[arg(short, long)]
        strategy: Option<ClassifierKind>,
    },

    /// Find searches and pages whose text matches a regex
    Find {
        /// Case-insensitive regular expression
        pattern: String,
    },

    /// Rename a task
    Rename {
        /// Task ID
        task_id: TaskId,
        /// New display name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "tasktrail=debug"
    } else {
        "tasktrail=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load config
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }
    };

    match cli.command {
        Commands::Ingest { logs, stdin } => {
            ingest::run(&config, &logs, stdin).await?;
        }
        Commands::Tasks { limit } => {
            tasks::run(&open_store(&config)?, limit)?;
        }
        Commands::Show { task_id } => {
            show::run(&open_store(&config)?, task_id)?;
        }
        Commands::Related { search_id, limit } => {
            related::run(&mut open_store(&config)?, &config, search_id, limit)?;
        }
        Commands::Classify { q1, q2, strategy } => {
            classify::run(&config, &q1, &q2, strategy)?;
        }
        Commands::Find { pattern } => {
            find::run(&mut open_store(&config)?, &pattern)?;
        }
        Commands::Rename { task_id, name } => {
            rename::run(&open_store(&config)?, task_id, &name)?;
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = config.database_path();
    SqliteStore::open(&path).with_context(|| format!("Failed to open database {}", path.display()))
}
