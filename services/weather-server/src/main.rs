//! Weather fusion server.
//!
//! Decodes forecast grids and surface observations as they land on disk and
//! publishes the fused weather at the aircraft position.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use weather_server::{parse_position, PositionFeed, ServerConfig, StateWriter, WeatherServer};

#[derive(Parser, Debug)]
#[command(name = "weather-server")]
#[command(about = "Fuses forecast grids and observations into the weather at the aircraft")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "WEATHER_CONFIG", default_value = "config/weather.yaml")]
    config: PathBuf,

    /// Decode what is on disk, tick once, print the state and exit
    #[arg(long)]
    once: bool,

    /// Fixed aircraft position as lat,lon,altitude_ft
    #[arg(long, conflicts_with = "track", allow_hyphen_values = true)]
    position: Option<String>,

    /// JSON-lines track of positions to replay
    #[arg(long)]
    track: Option<PathBuf>,

    /// Output file for published states (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so stdout stays clean for state output
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = ServerConfig::load(&args.config)?;
    info!(
        config = %args.config.display(),
        grid_dir = %config.grid_dir.display(),
        observation_dir = %config.observation_dir.display(),
        source = %config.fusion.observation_source,
        "Loaded configuration"
    );

    // Command line wins over the configuration file
    let (position, track) = match (args.position, args.track) {
        (None, None) => (config.position.clone(), config.track.clone()),
        cli => cli,
    };
    let mut feed = match (position, track) {
        (Some(position), _) => PositionFeed::Fixed(parse_position(&position)?),
        (None, Some(track)) => PositionFeed::load_track(&track)?,
        (None, None) => bail!("no aircraft position: pass --position or --track, or set one in the config"),
    };

    let output = args.output.clone().or_else(|| config.output.clone());
    let mut writer = StateWriter::open(output.as_deref())?;
    let mut server = WeatherServer::new(config)?;

    if args.once {
        let state = server.run_once(&mut feed).await?;
        writer.write(&state)?;
        return Ok(());
    }

    server.run(feed, writer).await
}
