mod sim;

use std::{
    fs::{self, OpenOptions},
    sync::Arc,
};

use adshell_core::{
    ads::{AdBatchPreloader, AdLifecycleManager, AdViewPool},
    clock::{Clock, SystemClock},
    config::{self, AppConfig},
    network::{AdNetwork, Host},
    settings::AdsEnabledFlag,
};
use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::sim::{SimProfile, SimulatedNetwork};

const FOREGROUND_ROUNDS: usize = 3;

struct ConsoleHost;

impl Host for ConsoleHost {
    fn label(&self) -> &str {
        "console"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config_path = config::ensure_default_config()?;
    let config = AppConfig::load()?;
    info!("using configuration at {}", config_path.display());

    let profile = SimProfile::default();
    let settle = profile.load_latency * 2;
    let network: Arc<dyn AdNetwork> =
        SimulatedNetwork::new(tokio::runtime::Handle::current(), profile.clone());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ads_enabled = AdsEnabledFlag::new(config.ads_enabled);

    let manager = AdLifecycleManager::new(
        Arc::clone(&network),
        Arc::new(ads_enabled.clone()),
        Arc::clone(&clock),
    )
    .with_ttl(config.ttl());
    manager.initialize(&config.app_open_unit_id);
    tokio::time::sleep(settle).await;
    report(&manager)?;

    for round in 1..=FOREGROUND_ROUNDS {
        info!(round, "app moved to foreground");
        foreground(&manager).await?;
        report(&manager)?;
        tokio::time::sleep(settle).await;
    }

    if ads_enabled.get() {
        preload_native(&config, network, clock).await?;
    } else {
        info!("ads disabled, skipping native ads");
    }

    manager.shutdown();
    Ok(())
}

async fn foreground(manager: &AdLifecycleManager) -> Result<()> {
    let (done_tx, done_rx) = oneshot::channel();
    manager.show_if_available(
        &ConsoleHost,
        Box::new(move || {
            let _ = done_tx.send(());
        }),
    );
    done_rx
        .await
        .context("app open completion was dropped")
}

fn report(manager: &AdLifecycleManager) -> Result<()> {
    let status =
        serde_json::to_string(&manager.status()).context("failed to serialize cache status")?;
    info!("app open cache: {status}");
    Ok(())
}

async fn preload_native(
    config: &AppConfig,
    network: Arc<dyn AdNetwork>,
    clock: Arc<dyn Clock>,
) -> Result<()> {
    let unit = config.native_unit_id.as_str();
    let mut pool = AdViewPool::new();
    pool.preload(unit, config.view_pool_size);

    let preloader = AdBatchPreloader::new(network, clock);
    let (batch_tx, batch_rx) = oneshot::channel();
    preloader.preload(
        unit,
        config.native_batch_size,
        Box::new(move |handles| {
            let _ = batch_tx.send(handles);
        }),
        Box::new(|err| warn!("native batch cut short: {err}")),
    );
    let handles = batch_rx
        .await
        .context("native batch finished without a result")?;
    info!(
        loaded = handles.len(),
        requested = config.native_batch_size,
        "native ads ready"
    );

    let mut views = Vec::with_capacity(handles.len());
    for handle in handles {
        let mut view = pool.acquire(unit);
        info!(view = %view.id(), handle = %handle.id(), "binding native ad");
        view.bind(handle);
        views.push(view);
    }
    for view in views {
        pool.release(unit, view);
    }
    info!(queued = pool.queued(unit), "native views back in pool");

    pool.clear();
    Ok(())
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("adshell.log");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stdout);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact()
        .with_ansi(false)
        .with_writer(move || {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .expect("failed to open log file")
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}
