use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::command::{Command, CommandRegistry};
use crate::config::Config;
use crate::cron::Cron;
use crate::db::KvStore;
use crate::message::{ConversationType, Jid};
use crate::plugin::{Plugin, PluginRegistry};
use crate::transport::Transport;

mod dispatch;
mod invoke;
mod jobs;
mod reload;


pub use jobs::{parse_run_at, JobKind};

pub struct Bot {
    config: RwLock<Arc<Config>>,
    transport: Arc<dyn Transport>,
    commands: RwLock<CommandRegistry>,
    /// Live plugin instances; commands and cron jobs refer to them by name.
    plugins: RwLock<PluginRegistry>,
    cron: Arc<Cron>,
    started: Instant,
}

impl Bot {
    pub fn new(
        config: Arc<Config>,
        transport: Arc<dyn Transport>,
        store: Option<Arc<dyn KvStore>>,
    ) -> Self {
        let cron = Cron::new(store)
            .with_poll_interval(Duration::from_millis(config.cron.poll_interval_ms));
        Self {
            config: RwLock::new(config),
            transport,
            commands: RwLock::new(CommandRegistry::new()),
            plugins: RwLock::new(PluginRegistry::new()),
            cron: Arc::new(cron),
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config.read().unwrap())
    }

    pub fn nick(&self) -> String {
        self.config().bot.nick.clone()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn cron(&self) -> &Arc<Cron> {
        &self.cron
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn resolve_command(&self, token: &str) -> Option<Arc<Command>> {
        self.commands.read().unwrap().resolve(token)
    }

    /// Every registered command in name order.
    pub fn commands(&self) -> Vec<Arc<Command>> {
        let registry = self.commands.read().unwrap();
        registry
            .list_sorted()
            .iter()
            .filter_map(|name| registry.get(name))
            .collect()
    }

    pub fn resolve_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.read().unwrap().resolve(name)
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.read().unwrap().names()
    }

    /// Deliver text through the transport. Failures are logged, never
    /// returned: a lost reply does not undo the command that produced it.
    pub async fn send(&self, to: &Jid, text: &str, kind: ConversationType) {
        if let Err(e) = self.transport.send(to, text, kind).await {
            log::error!("Failed to send message to {}: {}", to, e);
        }
    }
}
