use std::sync::Arc;

use anyhow::Context;
use parking_lot::RwLock;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use arena_sim_server::config::SimConfig;
use arena_sim_server::game::catalog::WeaponCatalog;
use arena_sim_server::game::game_loop::{run_headless, Simulation};
use arena_sim_server::game::snapshot::WorldSnapshot;
use arena_sim_server::game::state::{PlayerKind, Team};
use arena_sim_server::game::world::{TileMap, DEMO_MAP};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Arena Sim Server v{}", env!("CARGO_PKG_VERSION"));

    let config = SimConfig::load_or_default();
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;
    info!(
        "Configuration loaded: bots={}, level={}, teamplay={}, hammer_fight={}, seed={}",
        config.bot_count,
        config.tunables.bot_level,
        config.tunables.teamplay,
        config.tunables.hammer_fight,
        config.seed
    );

    let catalog = match &config.weapon_catalog_path {
        Some(path) => WeaponCatalog::from_file(path)
            .with_context(|| format!("loading weapon catalog {}", path))?,
        None => WeaponCatalog::builtin().context("building weapon catalog")?,
    };
    info!("{} weapons loaded", catalog.len());

    let map = match &config.map_path {
        Some(path) => TileMap::from_file(path).with_context(|| format!("loading map {}", path))?,
        None => TileMap::from_ascii(DEMO_MAP).context("parsing demo map")?,
    };
    info!("Map {}x{} tiles", map.width(), map.height());

    let mut sim = Simulation::new(map, Arc::new(catalog), &config);
    for i in 0..config.bot_count {
        let team = if config.tunables.teamplay {
            if i % 2 == 0 { Team::Red } else { Team::Blue }
        } else {
            Team::Free
        };
        sim.add_player(PlayerKind::Bot, team, None);
    }

    #[cfg(feature = "metrics_endpoint")]
    {
        let metrics = sim.metrics();
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = arena_sim_server::metrics::start_metrics_server(metrics, port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let latest = Arc::new(RwLock::new(WorldSnapshot::default()));
    let runner = run_headless(sim, latest.clone(), config.snapshot_log_interval, None);

    // Shutdown signal handler
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        _ = runner => {}
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    let last = latest.read();
    info!(
        "Stopped at tick {} with {} characters alive",
        last.tick,
        last.characters.len()
    );

    Ok(())
}
