//! Depthwall - depth fusion service
//!
//! Main entry point for the CLI application.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use depthwall::{config::Config, Wall};

/// Depthwall - fuse pose/hand/face tracker depth into one stable value
#[derive(Parser, Debug)]
#[command(name = "depthwall", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tracker server host for every wall (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Consumer ticks per second (overrides config)
    #[arg(short, long)]
    tick_hz: Option<u32>,

    /// Do not connect feeds on startup
    #[arg(long)]
    no_connect: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", depthwall::NAME, depthwall::VERSION);

    let config = load_config(&args)?;
    let runtime = tokio::runtime::Runtime::new()?;

    let mut walls = Wall::from_config(&config);
    for wall in &mut walls {
        if wall.auto_connect() && !args.no_connect {
            let failed = wall.connect().len();
            if failed > 0 {
                warn!(
                    "[{}] {} feed(s) failed to connect; they stay unavailable until reconnected",
                    wall.name(),
                    failed
                );
            }
        }
    }

    runtime.block_on(run_tick_loop(&mut walls, config.runtime.tick_hz));

    for wall in &mut walls {
        wall.close();
    }

    info!("Depthwall stopped");
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if let Some(ref path) = args.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    if let Some(ref host) = args.host {
        for wall in &mut config.walls {
            wall.host = host.clone();
        }
    }
    if let Some(tick_hz) = args.tick_hz {
        config.runtime.tick_hz = tick_hz;
    }

    config.validate()?;

    info!("Tick rate: {} Hz", config.runtime.tick_hz);
    for wall in &config.walls {
        let feeds: Vec<String> = wall
            .modalities
            .iter()
            .map(|m| format!("{}@{}", m, wall.ports.port_for(*m)))
            .collect();
        info!("Wall '{}': {} [{}]", wall.name, wall.host, feeds.join(", "));
    }

    Ok(config)
}

/// Fixed-cadence consumer loop. Never blocks on network I/O.
async fn run_tick_loop(walls: &mut [Wall], tick_hz: u32) {
    let period = Duration::from_secs_f64(1.0 / f64::from(tick_hz));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for wall in walls.iter_mut() {
                    let fused = wall.tick();

                    // Roughly once a second
                    if wall.ticks() % u64::from(tick_hz) == 0 {
                        let feeds: Vec<String> = wall
                            .pipelines()
                            .iter()
                            .map(|p| {
                                let r = p.filter().reading();
                                format!("{}={:+.4}{}", p.modality(), r.depth, if r.has_depth { "" } else { "?" })
                            })
                            .collect();
                        debug!(
                            "[{}] fused={:+.4} has_depth={} ({})",
                            wall.name(),
                            fused.depth,
                            fused.has_depth,
                            feeds.join(" ")
                        );
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
