use std::fs;
use std::path::{Path, PathBuf};

use carousel::config::CarouselConfig;
use carousel::error::CarouselError;
use carousel::geometry::{ItemTransform, angle_between_items, layout, radius_for_viewport};
use clap::{Parser, Subcommand};
use serde::Serialize;

mod replay;

use replay::{Script, Session};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid JSON in {path}: {source}")]
    InvalidJson { path: PathBuf, source: serde_json::Error },
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Carousel(#[from] CarouselError),
}

#[derive(Parser, Debug)]
#[command(name = "carousel-cli", about = "Headless story carousel layout and replay tool")]
struct Cli {
    /// JSON carousel config; defaults to the overlay version.
    #[arg(long, env = "CAROUSEL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Use the first widget version (slow wheel, clicks scroll to the story).
    #[arg(long, global = true, conflicts_with = "config")]
    classic: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the item transforms for a carousel.
    Layout {
        #[arg(long)]
        items: usize,
        #[arg(long, default_value_t = 1280.0)]
        width: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        rotation: f64,
    },
    /// Replay a JSON event script and print the resulting state.
    Replay {
        script: PathBuf,
        /// Include the controller state after every event.
        #[arg(long)]
        steps: bool,
    },
}

#[derive(Serialize)]
struct LayoutReport {
    radius: f64,
    angle_between_items: f64,
    rotation: f64,
    items: Vec<ItemTransform>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Read { path: path.to_path_buf(), source })?;
    serde_json::from_str(&text).map_err(|source| CliError::InvalidJson { path: path.to_path_buf(), source })
}

fn load_config(cli: &Cli) -> Result<CarouselConfig, CliError> {
    if cli.classic {
        return Ok(CarouselConfig::classic());
    }
    let Some(path) = &cli.config else {
        return Ok(CarouselConfig::default());
    };
    let config: CarouselConfig = read_json(path)?;
    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_layout(items: usize, width: f64, rotation: f64) -> Result<(), CliError> {
    if items == 0 {
        return Err(CarouselError::NoItems.into());
    }
    let radius = radius_for_viewport(width);
    print_json(&LayoutReport {
        radius,
        angle_between_items: angle_between_items(items),
        rotation,
        items: layout(items, rotation, radius),
    })
}

fn run_replay(config: CarouselConfig, path: &Path, with_steps: bool) -> Result<(), CliError> {
    let script: Script = read_json(path)?;
    tracing::info!(events = script.events.len(), items = script.items.len(), "replaying {}", path.display());
    let session = Session::new(config, &script)?;
    let mut report = session.run(&script.events);
    if !with_steps {
        report.steps.clear();
    }
    print_json(&report)
}

fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Layout { items, width, rotation } => run_layout(items, width, rotation),
        Command::Replay { ref script, steps } => run_replay(config, script, steps),
    }
}
