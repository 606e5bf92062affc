mod agent;
mod collector;
mod config;
mod dashboard;
mod endpoint;
mod host;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use events::FailureAlert;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{Level, info, warn};
use uuid::Uuid;

use crate::agent::Agent;
use crate::config::{AgentConfig, ConfigError, ConfigOverrides};
use crate::dashboard::client::{self, ApiClient, DashboardError};
use crate::dashboard::{LiveFeed, Replay, render, replay};

const DEFAULT_SERVER: &str = "ws://localhost:8000";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dashboard(#[from] DashboardError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("server at {server} reported status `{status}`")]
    Unhealthy { server: String, status: String },
}

#[derive(Parser, Debug)]
#[command(name = "rbb", version, about = "RobotBlackBox: flight recorder for robot fleets")]
struct Cli {
    #[arg(short, long, global = true, help = "Log at debug level")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the agent and stream telemetry to the server.
    Start(StartArgs),
    /// Create or show the agent config file.
    Config(ConfigArgs),
    /// Print the version.
    Version,
    /// Check that the server answers its health endpoint.
    TestConnection(ServerArgs),
    /// Follow one robot's live telemetry and failures.
    Watch(WatchArgs),
    /// List recorded sessions.
    Sessions(ListArgs),
    /// List detected failures, newest first.
    Failures(ListArgs),
    /// List currently connected robots.
    Robots(RobotsArgs),
    /// Replay a recorded session.
    Replay(ReplayArgs),
}

#[derive(Args, Debug)]
struct ServerArgs {
    #[arg(short, long, env = "RBB_SERVER", default_value = DEFAULT_SERVER)]
    server: String,
}

#[derive(Args, Debug)]
struct StartArgs {
    #[arg(short, long, env = "RBB_ROBOT_ID")]
    robot_id: Option<String>,

    #[arg(short, long, env = "RBB_SERVER")]
    server: Option<String>,

    #[arg(short, long, env = "RBB_MOCK", help = "Use the simulated arm")]
    mock: bool,

    #[arg(long, env = "RBB_HZ", help = "Collection frequency in Hz")]
    hz: Option<f64>,

    #[arg(long, env = "RBB_BUFFER_MAX", help = "Events held while disconnected")]
    buffer_max: Option<usize>,

    #[arg(short, long, env = "RBB_CONFIG", help = "Config file (defaults to ~/.robotblackbox/config.json if present)")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(long, help = "Write a default config file")]
    init: bool,

    #[arg(long, help = "Print the effective config")]
    show: bool,

    #[arg(short, long)]
    path: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[arg(short, long, env = "RBB_ROBOT_ID", default_value = "robot_001")]
    robot_id: String,

    #[command(flatten)]
    server: ServerArgs,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(short, long)]
    robot_id: Option<String>,

    #[arg(long, default_value_t = 50)]
    limit: usize,

    #[arg(long, help = "Print the raw JSON")]
    json: bool,

    #[command(flatten)]
    server: ServerArgs,
}

#[derive(Args, Debug)]
struct RobotsArgs {
    #[arg(long, help = "Print the raw JSON")]
    json: bool,

    #[command(flatten)]
    server: ServerArgs,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    session_id: Uuid,

    #[arg(long, default_value_t = 0, help = "Start at this point index")]
    from: usize,

    #[arg(long, help = "Milliseconds between points [default: 100]")]
    step_ms: Option<u64>,

    #[arg(long, help = "Maximum points to fetch")]
    limit: Option<usize>,

    #[command(flatten)]
    server: ServerArgs,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Start(args) => run_start(args).await,
        Command::Config(args) => run_config(args),
        Command::Version => {
            println!("RobotBlackBox v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::TestConnection(args) => run_test_connection(&args.server).await,
        Command::Watch(args) => run_watch(args).await,
        Command::Sessions(args) => run_sessions(args).await,
        Command::Failures(args) => run_failures(args).await,
        Command::Robots(args) => run_robots(args).await,
        Command::Replay(args) => run_replay(args).await,
    }
}

/// Shutdown channel flipped by Ctrl-C.
fn ctrl_c_shutdown() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutting down");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "ctrl-c handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

fn load_config(path: Option<PathBuf>) -> Result<AgentConfig, ConfigError> {
    match path {
        Some(path) => AgentConfig::from_file(&path),
        None => {
            let path = config::default_path();
            if path.exists() { AgentConfig::from_file(&path) } else { Ok(AgentConfig::default()) }
        }
    }
}

async fn run_start(args: StartArgs) -> Result<(), CliError> {
    let config = load_config(args.config)?.with_overrides(ConfigOverrides {
        robot_id: args.robot_id,
        server_url: args.server,
        collection_hz: args.hz,
        buffer_max: args.buffer_max,
        use_mock: args.mock,
    });
    config.validate()?;

    println!("RobotBlackBox v{}", env!("CARGO_PKG_VERSION"));
    println!("   Robot:  {}", config.robot_id);
    println!("   Server: {}", config.server_url);
    println!("   Mode:   {}", if config.use_mock { "mock" } else { "hardware" });

    let collector = collector::from_config(&config);
    let agent = Agent::new(config);
    println!("   Session: {}", agent.session_id());
    agent.run(collector, ctrl_c_shutdown()).await;
    Ok(())
}

fn run_config(args: ConfigArgs) -> Result<(), CliError> {
    let path = args.path.unwrap_or_else(config::default_path);
    if args.init {
        let saved = AgentConfig::default().save(Some(&path))?;
        println!("config saved to {}", saved.display());
    }
    if args.show || !args.init {
        let config = if path.exists() { AgentConfig::from_file(&path)? } else { AgentConfig::default() };
        print_json(&config)?;
    }
    Ok(())
}

async fn run_test_connection(server: &str) -> Result<(), CliError> {
    let health = ApiClient::new(server)?.health().await?;
    if health.status != "ok" {
        return Err(CliError::Unhealthy { server: server.to_owned(), status: health.status });
    }
    println!("ok: server reachable at {server}");
    Ok(())
}

async fn run_watch(args: WatchArgs) -> Result<(), CliError> {
    let server = args.server.server;
    let api = ApiClient::new(&server)?;
    let mut feed = LiveFeed::new();

    match api.failures(Some(&args.robot_id), client::SEED_FAILURES).await {
        Ok(records) => feed.set_failures(&records),
        Err(e) => warn!(error = %e, "could not load recent failures"),
    }
    match api.sessions(Some(&args.robot_id), 50).await {
        Ok(sessions) => feed.set_sessions(sessions),
        Err(e) => warn!(error = %e, "could not load sessions"),
    }

    println!("{} sessions recorded for {}", feed.sessions().len(), args.robot_id);
    let recent = feed
        .failures()
        .map(|entry| render::failure_line(&entry.robot_id, &entry.alert))
        .collect::<Vec<_>>();
    if !recent.is_empty() {
        println!("recent failures:");
        for line in recent {
            println!("  {line}");
        }
    }

    client::watch_live(
        &server,
        &args.robot_id,
        &mut feed,
        client::RECONNECT_DELAY,
        ctrl_c_shutdown(),
        |line| println!("{line}"),
    )
    .await?;
    info!(samples = feed.telemetry().len(), failures = feed.failures().len(), "watch ended");
    Ok(())
}

async fn run_sessions(args: ListArgs) -> Result<(), CliError> {
    let api = ApiClient::new(&args.server.server)?;
    let sessions = api.sessions(args.robot_id.as_deref(), args.limit).await?;
    if args.json {
        return print_json(&sessions);
    }
    for session in &sessions {
        println!("{}", render::session_line(session));
    }
    Ok(())
}

async fn run_failures(args: ListArgs) -> Result<(), CliError> {
    let api = ApiClient::new(&args.server.server)?;
    let failures = api.failures(args.robot_id.as_deref(), args.limit).await?;
    if args.json {
        return print_json(&failures);
    }
    for record in &failures {
        println!("{}", render::failure_line(&record.robot_id, &FailureAlert::from(record)));
    }
    Ok(())
}

async fn run_robots(args: RobotsArgs) -> Result<(), CliError> {
    let robots = ApiClient::new(&args.server.server)?.robots().await?;
    if args.json {
        return print_json(&robots);
    }
    if robots.is_empty() {
        println!("no robots connected");
    }
    for robot in &robots {
        println!("{}", render::robot_line(robot));
    }
    Ok(())
}

async fn run_replay(args: ReplayArgs) -> Result<(), CliError> {
    let api = ApiClient::new(&args.server.server)?;
    let response = api.telemetry(args.session_id, args.limit).await?;

    let mut replay = Replay::new();
    replay.load(response.telemetry);
    let (_, total) = replay.position();
    println!("session {}: {total} points", response.session_id);

    client::play(
        &mut replay,
        args.from,
        args.step_ms.map_or(replay::DEFAULT_STEP, |ms| Duration::from_millis(ms.max(1))),
        ctrl_c_shutdown(),
        |line| println!("{line}"),
    )
    .await;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
