mod bot;
mod command;
mod config;
mod console;
mod cron;
mod db;
mod error;
mod message;
mod monitor;
mod plugin;
mod plugins;
mod transport;
mod util;
mod web;

#[cfg(test)]
mod test_support;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bot::Bot;
use config::Config;
use console::ConsoleTransport;
use cron::JobRunner;
use db::{Db, KvStore};
use monitor::Monitor;
use web::Webhooks;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ludolph.toml".to_string());

    let path = Path::new(&config_path);
    if !path.exists() {
        eprintln!("Config file not found: {}", config_path);
        eprintln!("Copy the example and edit it:");
        eprintln!("  cp config.example.toml ludolph.toml");
        std::process::exit(1);
    }

    let config = Arc::new(Config::load(path)?);

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.bot.log_level.as_str()),
    )
    .init();
    log::info!("Loaded config from {}", config_path);

    let db: Arc<dyn KvStore> = Arc::new(Db::open(Path::new(&config.bot.db_path))?);

    let transport = Arc::new(ConsoleTransport::new(&config));
    let bot = Arc::new(Bot::new(
        Arc::clone(&config),
        transport.clone(),
        Some(db),
    ));
    bot.start(plugins::build_plugins(&config));

    if config.cron.enabled {
        let runner: Arc<dyn JobRunner> = bot.clone();
        tokio::spawn(Arc::clone(bot.cron()).run(runner));
    }

    if let Some(pipe_file) = &config.monitor.pipe_file {
        let monitor = Monitor::new(Arc::clone(&bot), pipe_file);
        tokio::spawn(async move {
            if let Err(e) = monitor.run().await {
                log::error!("Monitoring pipe error: {}", e);
            }
        });
    }

    if config.webhooks.enabled {
        let webhooks = Webhooks::new(Arc::clone(&bot), config.webhooks.bind_address.clone());
        tokio::spawn(async move {
            if let Err(e) = webhooks.run().await {
                log::error!("Webhook server error: {}", e);
            }
        });
    }

    spawn_reload_handler(Arc::clone(&bot), PathBuf::from(&config_path));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Requested shutdown (SIGINT)");
        }
        result = transport.run(Arc::clone(&bot)) => {
            if let Err(e) = result {
                log::error!("Console transport error: {}", e);
            }
        }
    }

    bot.cron().stop().await;
    log::info!("Shutdown complete");
    Ok(())
}

/// Reload config and plugins on SIGHUP. Membership lists are owned by the
/// transport and only change on restart.
#[cfg(unix)]
fn spawn_reload_handler(bot: Arc<Bot>, path: PathBuf) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                log::error!("Could not install SIGHUP handler: {}", e);
                return;
            }
        };

        while hangup.recv().await.is_some() {
            log::info!("Requested reload (SIGHUP) of {}", path.display());
            match Config::load(&path) {
                Ok(config) => {
                    let config = Arc::new(config);
                    bot.reload(Arc::clone(&config), plugins::build_plugins(&config));
                }
                Err(e) => log::error!("Could not reload config: {}", e),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_handler(_bot: Arc<Bot>, _path: PathBuf) {}
