use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use nextup_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "nextup", version, about = "Nextup task chain CLI")]
pub struct Cli {
    /// SQLite database to use instead of the configured one
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Task management
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Show the task to work on now
    Current {
        /// Evaluate at this local time (YYYY-MM-DD HH:MM) instead of now
        #[arg(long)]
        at: Option<String>,
    },
    /// List tasks that can be chosen as a parent
    Parents {
        /// Case-insensitive name filter
        #[arg(default_value = "")]
        query: String,
        /// Leave out the chain of this task
        #[arg(long = "for", value_name = "ID")]
        for_task: Option<nextup_core::TaskId>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing() {
    let level = Config::load_or_default().log.level;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let db = cli.db.as_deref();
    let result = match cli.command {
        Commands::Task { action } => commands::task::run(action, db),
        Commands::Current { at } => commands::current::run(at.as_deref(), db),
        Commands::Parents { query, for_task } => commands::parents::run(&query, for_task, db),
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => {
            commands::completions::run(shell);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
