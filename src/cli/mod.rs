use std::env;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::ConfigLoader;
use crate::storage;

pub mod commands;

use self::commands::{
    DuplicateArgs, ExportArgs, ImportArgs, NewArgs, OpenArgs, PrefsArgs, ReplaceArgs, ShareArgs,
    TuiArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "notepad",
    version,
    about = "Notepad with up to ten notes, autosave, and share links"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over NOTEPAD_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over NOTEPAD_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive editor (default)
    Tui(TuiArgs),
    /// Print the sidebar: every note with its position and title
    List,
    /// Create a new note and make it active
    New(NewArgs),
    /// Import a shared note from a share URL or bare token
    Open(OpenArgs),
    /// Print the share URL for a note
    Share(ShareArgs),
    /// Import a .txt or .html file as a new note
    Import(ImportArgs),
    /// Write a note's plain text to a file
    Export(ExportArgs),
    /// Copy a note into a new note at the top of the list
    Duplicate(DuplicateArgs),
    /// Find and replace text in a note, leaving markup tags alone
    Replace(ReplaceArgs),
    /// Show or change the dark mode and view lock preferences
    Prefs(PrefsArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("NOTEPAD_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("NOTEPAD_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();

    let command = cli.command.unwrap_or(Commands::Tui(TuiArgs::default()));
    // The terminal belongs to the editor, so it logs to a file instead.
    let log_file = matches!(command, Commands::Tui(_)).then(|| paths.log_file());
    init_tracing(&cli.log_level, log_file.as_deref())
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;

    let config = loader.load_or_init()?;
    let storage = storage::init(&paths, &config.storage)?;
    let config = Arc::new(config);

    match command {
        Commands::Tui(args) => {
            let launch_url = args.launch_url()?;
            let mut app = App::new(config, storage, launch_url)?;
            app.run()
        }
        Commands::List => commands::list_notes(&config, storage),
        Commands::New(args) => commands::new_note(&config, storage, args),
        Commands::Open(args) => commands::open_shared(&config, storage, args),
        Commands::Share(args) => commands::share_note(&config, storage, args),
        Commands::Import(args) => commands::import_document(&config, storage, args),
        Commands::Export(args) => commands::export_note(&config, storage, args),
        Commands::Duplicate(args) => commands::duplicate_note(&config, storage, args),
        Commands::Replace(args) => commands::replace_text(&config, storage, args),
        Commands::Prefs(args) => commands::preferences(&config, storage, args),
    }
}

fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        match log_file {
            Some(path) => {
                let file = open_log(path)?;
                fmt()
                    .with_env_filter(env_filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .init();
            }
            None => {
                fmt()
                    .with_env_filter(env_filter)
                    .with_writer(std::io::stderr)
                    .init();
            }
        }
        Ok(())
    })
    .map(|_| ())
}

fn open_log(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}
