mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use coderun_common::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "coderun-cli")]
#[command(about = "coderun CLI - Run code and manage the language table", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a source file through the execution service
    Run {
        /// Language id or alias (e.g., python, js, c++)
        #[arg(short, long)]
        language: String,

        /// Source file to execute
        #[arg(short, long)]
        file: PathBuf,

        /// File whose contents are passed as stdin
        #[arg(short, long)]
        stdin: Option<PathBuf>,

        /// Skip remote endpoints and simulate locally
        #[arg(long)]
        offline: bool,

        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List all configured languages
    ListLangs,

    /// Add a new language to the table
    AddLang {
        /// Logical language id (e.g., elixir)
        #[arg(short, long)]
        name: String,

        /// Runtime name the backend expects
        #[arg(short, long)]
        runtime: String,

        /// Runtime version (e.g., 1.11.3)
        #[arg(short, long)]
        version: String,

        /// Alternative names, repeatable
        #[arg(short, long = "alias")]
        alias: Vec<String>,

        /// Preview-only (html and css): echo the code back instead of executing it
        #[arg(long)]
        preview: bool,

        /// Local simulator for offline fallback (javascript, python, cpp)
        #[arg(long)]
        simulator: Option<String>,
    },

    /// Remove a language from the table
    RemoveLang {
        /// Language id or alias to remove
        #[arg(short, long)]
        name: String,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let table = commands::languages_path(&config);

    match cli.command {
        Commands::Run {
            language,
            file,
            stdin,
            offline,
            json,
        } => {
            let success = commands::run_file(&config, &language, &file, stdin.as_deref(), offline, json).await?;
            if !success {
                std::process::exit(1);
            }
        }
        Commands::ListLangs => {
            commands::list_languages(&table)?;
        }
        Commands::AddLang {
            name,
            runtime,
            version,
            alias,
            preview,
            simulator,
        } => {
            commands::add_language(&table, &name, &runtime, &version, &alias, preview, simulator.as_deref())?;
        }
        Commands::RemoveLang { name, yes } => {
            commands::remove_language(&table, &name, yes)?;
        }
    }

    Ok(())
}
