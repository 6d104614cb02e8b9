use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ConfigLoader;
use crate::storage;

pub mod commands;

use self::commands::{
    DeleteArgs, DetectArgs, FormatArgs, NewArgs, SettingsCommand, ShowArgs,
};

const LOG_FILE_NAME: &str = "flick.log";

#[derive(Parser, Debug)]
#[command(
    name = "flick",
    version,
    about = "Scratchpad notes with language detection and code formatting"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over FLICK_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over FLICK_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive editor (default)
    Tui,
    /// Append a new flick
    New(NewArgs),
    /// List stored flicks
    List,
    /// Print one buffer of a flick
    Show(ShowArgs),
    /// Delete a flick
    Delete(DeleteArgs),
    /// Guess the language of a file or of stdin
    Detect(DetectArgs),
    /// Pretty-print a file or stdin
    Format(FormatArgs),
    /// Inspect or change persistent settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

enum LogTarget<'a> {
    Stderr,
    File(&'a Path),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("FLICK_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("FLICK_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    let command = cli.command.unwrap_or(Commands::Tui);

    // Log lines would tear the alternate screen, so the editor logs to a file.
    let log_file = paths.log_dir.join(LOG_FILE_NAME);
    let target = match command {
        Commands::Tui => LogTarget::File(&log_file),
        _ => LogTarget::Stderr,
    };
    init_tracing(&cli.log_level, target)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;

    let config = loader.load_or_init()?;

    match command {
        Commands::Tui => {
            let storage = storage::init(&paths, &config.storage)?;
            commands::run_tui(loader, config, storage)
        }
        Commands::New(args) => {
            let mut store = commands::open_store(&paths, &config)?;
            print!("{}", commands::new_note(&mut store, args)?);
            Ok(())
        }
        Commands::List => {
            let store = commands::open_store(&paths, &config)?;
            print!("{}", commands::list_notes(&store));
            Ok(())
        }
        Commands::Show(args) => {
            let store = commands::open_store(&paths, &config)?;
            print!("{}", commands::show_note(&store, &args)?);
            Ok(())
        }
        Commands::Delete(args) => {
            let mut store = commands::open_store(&paths, &config)?;
            print!("{}", commands::delete_note(&mut store, &args)?);
            Ok(())
        }
        Commands::Detect(args) => {
            print!("{}", commands::detect(&args)?);
            Ok(())
        }
        Commands::Format(args) => {
            print!("{}", commands::format(&config, &args)?);
            Ok(())
        }
        Commands::Settings { command } => {
            print!("{}", commands::settings(&loader, config, command)?);
            Ok(())
        }
    }
}

fn init_tracing(level: &str, target: LogTarget<'_>) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        match target {
            LogTarget::Stderr => {
                fmt()
                    .with_env_filter(env_filter)
                    .with_writer(std::io::stderr)
                    .init();
            }
            LogTarget::File(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {}", path.display()))?;
                fmt()
                    .with_env_filter(env_filter)
                    .with_timer(UtcTime::rfc_3339())
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .init();
            }
        }
        Ok::<(), anyhow::Error>(())
    })
    .map(|_| ())
}
