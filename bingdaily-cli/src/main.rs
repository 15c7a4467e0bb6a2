use anyhow::Result;
use bingdaily_cli::BingDailyApp;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bingdaily")]
#[command(about = "Bing wallpaper of the day, with a bounded local history")]
#[command(version)]
struct Cli {
    /// Use this directory for settings instead of the platform default
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch today's wallpaper once
    Refresh,
    /// Keep the wallpaper updated until 'q' is entered
    Run,
    /// List downloaded images, oldest first
    History,
    /// Mark a history image as favourite
    Favourite { file: String },
    /// Remove the favourite mark from a history image
    Unfavourite { file: String },
    /// Set a random image from the history
    Random {
        #[arg(long)]
        favourites: bool,
    },
    /// Print one setting, or all of them
    Get { key: Option<String> },
    /// Change a setting
    Set { key: String, value: String },
    /// List known market codes
    Markets,
    /// Show release notes for a version
    Changelog { version: String },
}

fn init_logging() {
    let default_level = if cfg!(debug_assertions) { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let app = BingDailyApp::new(cli.config_dir.as_deref())?;

    match cli.command.unwrap_or(Command::Refresh) {
        Command::Refresh => app.refresh_once()?,
        Command::Run => app.run()?,
        Command::History => app.show_history(),
        Command::Favourite { file } => app.set_favourite(&file, true)?,
        Command::Unfavourite { file } => app.set_favourite(&file, false)?,
        Command::Random { favourites } => {
            app.set_random(favourites)?;
        }
        Command::Get { key } => app.get(key.as_deref())?,
        Command::Set { key, value } => app.set(&key, &value)?,
        Command::Markets => app.show_markets(),
        Command::Changelog { version } => app.show_changelog(&version)?,
    }

    Ok(())
}
