// src/main.rs - roaster host: connect, optionally roast, serve the status API
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use roastero_rs::hardware::{RoasterHardware, SerialRoaster, SimulatedRoaster};
use roastero_rs::{Recipe, Roaster, web};
use roastero_shared::{Config, ConfigError, load_config};
use tokio::sync::watch;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coffee roaster controller
#[derive(Parser, Debug)]
#[command(name = "roastero", about = "Drives a serial coffee roaster: PID heater control, roast timer and status API.")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "roaster.toml")]
    config: PathBuf,

    /// Use the built-in simulated roaster instead of the serial port
    #[arg(long)]
    simulate: bool,

    /// Recipe JSON to start roasting right after connecting
    #[arg(long)]
    recipe: Option<PathBuf>,

    /// Address for the HTTP status API
    #[arg(long, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Log per-cycle debug output
    #[arg(short, long)]
    verbose: bool,
}

async fn shutdown_signal(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}

fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
    match load_config(&path.to_string_lossy()) {
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Config '{}' not found, using defaults", path.display());
            Ok(Config::default())
        }
        other => other,
    }
}

fn load_recipe(path: &Path) -> Result<Recipe, BoxError> {
    let text = std::fs::read_to_string(path)?;
    let mut recipe: Recipe = serde_json::from_str(&text)?;
    if recipe.total_time == 0 {
        recipe.total_time = recipe.steps.iter().map(|s| s.section_time).sum();
    }
    Ok(recipe)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .init();

    tracing::info!("Starting roastero {}", env!("CARGO_PKG_VERSION"));

    let config = load_or_default(&cli.config).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", cli.config.display(), e);
        Box::new(e) as BoxError
    })?;

    let hardware: Arc<dyn RoasterHardware> = if cli.simulate {
        tracing::info!("Using simulated roaster");
        Arc::new(SimulatedRoaster::new(f64::from(config.roast.idle_temp)).with_noise(1.0))
    } else {
        tracing::info!("Roaster on {} @ {} baud", config.serial.port, config.serial.baud);
        Arc::new(SerialRoaster::from_config(&config.serial))
    };

    let roaster = Arc::new(Roaster::new(config, hardware));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
        tracing::info!("Ctrl-C received");
        let _ = shutdown_tx.send(true);
    });

    run(&cli, roaster, shutdown_rx).await
}

/// Connect and serve until `shutdown_rx` fires or something fails. The roaster
/// is shut down, heater off, before this returns either way.
async fn run(cli: &Cli, roaster: Arc<Roaster>, shutdown_rx: watch::Receiver<bool>) -> Result<(), BoxError> {
    if let Err(e) = roaster.connect().await {
        tracing::error!("{}; retrying in the background", e);
        roaster.start_loops().await;
    }
    let result = serve(cli, roaster.clone(), shutdown_rx).await;
    if let Err(e) = &result {
        tracing::error!("Stopping: {}", e);
    }
    roaster.shutdown().await;
    result
}

async fn serve(cli: &Cli, roaster: Arc<Roaster>, shutdown_rx: watch::Receiver<bool>) -> Result<(), BoxError> {
    if let Some(path) = &cli.recipe {
        let recipe = load_recipe(path)?;
        roaster.start_roast(&recipe).await?;
    }

    let app = web::create_router(roaster.clone());
    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);

    let reporter = {
        let roaster = roaster.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(5));
            loop {
                tokio::select! {
                    _ = shutdown_signal(&mut shutdown_rx) => break,
                    _ = ticker.tick() => {
                        let s = roaster.get_status().await;
                        tracing::info!(
                            "{} | {}°F -> {}°F | section {}s | total {}s | fan {} | power {}% | {}",
                            s.phase,
                            s.current_temp,
                            s.target_temp,
                            s.section_time,
                            s.total_time,
                            s.fan_speed,
                            s.heater_power,
                            if s.connected { "connected" } else { "disconnected" }
                        );
                    }
                }
            }
        })
    };

    let mut server_shutdown = shutdown_rx;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_signal(&mut server_shutdown).await })
        .await;
    reporter.abort();
    let _ = reporter.await;
    served?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roastero_rs::RoastStep;

    fn sim_roaster() -> (Arc<SimulatedRoaster>, Arc<Roaster>) {
        let sim = Arc::new(SimulatedRoaster::new(150.0));
        let hardware: Arc<dyn RoasterHardware> = sim.clone();
        (sim, Arc::new(Roaster::new(Config::default(), hardware)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_bind_still_turns_heater_off() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let cli = Cli::parse_from(["roastero", "--simulate", "--listen", addr.as_str()]);

        let (sim, roaster) = sim_roaster();
        roaster.connect().await.unwrap();
        roaster.start_roast(&Recipe::new(vec![RoastStep::heating(400, 5, 60)])).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(sim.power().await > 0);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        assert!(run(&cli, roaster.clone(), shutdown_rx).await.is_err());
        assert_eq!(sim.power().await, 0);
        assert!(!sim.igniter().await);
        assert!(!sim.is_connected().await);
        assert!(!roaster.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_recipe_file_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let recipe = dir.path().join("absent.json");
        let cli = Cli::parse_from([
            "roastero",
            "--simulate",
            "--listen",
            "127.0.0.1:0",
            "--recipe",
            recipe.to_str().unwrap(),
        ]);
        let (sim, roaster) = sim_roaster();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        assert!(run(&cli, roaster.clone(), shutdown_rx).await.is_err());
        assert!(!sim.is_connected().await);
        assert!(!roaster.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_roaster_is_not_fatal() {
        let cli = Cli::parse_from(["roastero", "--simulate", "--listen", "127.0.0.1:0"]);
        let (sim, roaster) = sim_roaster();
        sim.set_unreachable(true).await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);
        run(&cli, roaster.clone(), shutdown_rx).await.unwrap();
        assert!(sim.connect_calls().await >= 1);
        assert!(!roaster.is_running().await);
    }
}
