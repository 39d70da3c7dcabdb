use crate::config::CronJobConfig;
use crate::cron::{DeferredCommand, JobAction};
use crate::message::{Jid, Message, MessageSnapshot};
use crate::plugin::HandlerError;

use super::*;

impl Bot {
    /// Register a plugin together with its commands and recurring jobs.
    /// Duplicate commands or jobs are logged and skipped; the plugin still
    /// loads.
    pub fn load_plugin(&self, plugin: Arc<dyn Plugin>) {
        let name = plugin.name().to_string();
        log::info!("Loading plugin: {} ({})", name, plugin.description());

        {
            let mut commands = self.commands.write().unwrap();
            for cmd in plugin.commands() {
                // already logged by the registry
                let _ = commands.register(&name, cmd);
            }
        }

        for job in plugin.cronjobs() {
            let action = JobAction::Plugin {
                plugin: name.clone(),
                function: job.function.clone(),
                args: Vec::new(),
            };
            if let Err(e) = self.cron.add_recurring(&job.function, action, &job.schedule, None) {
                log::error!(
                    "Cron job \"{}\" from plugin \"{}\" not registered: {}",
                    job.function,
                    name,
                    e
                );
            }
        }

        self.plugins.write().unwrap().register(plugin);
    }

    /// Drop a plugin's commands and cron jobs. Returns false if it was not
    /// loaded.
    pub fn unload_plugin(&self, name: &str) -> bool {
        let removed = self.commands.write().unwrap().unregister_module(name);
        self.cron.reset(Some(name));
        let existed = self.plugins.write().unwrap().remove(name).is_some();
        log::info!("Unloaded plugin {} ({} command(s))", name, removed);
        existed
    }

    pub fn load_config_jobs(&self, config: &Config) {
        for job in &config.cron.jobs {
            if let Err(e) = self.add_config_job(job) {
                log::error!("Cron job \"{}\" from config not registered: {}", job.name, e);
            }
        }
    }

    fn add_config_job(&self, job: &CronJobConfig) -> Result<(), HandlerError> {
        let mut words = shell_words::split(&job.command)?;
        if words.is_empty() {
            return Err("Empty command".into());
        }
        let token = words.remove(0);
        let cmd = self
            .resolve_command(&token)
            .ok_or_else(|| format!("Unknown command \"{}\"", token))?;

        let owner = Jid::parse(&job.owner);
        self.check_permissions(&cmd.permissions, Some(&owner))?;

        let msg = Message::direct(owner.clone(), job.command.clone());
        let line = shell_words::join(
            std::iter::once(cmd.name.as_str()).chain(words.iter().map(|w| w.as_str())),
        );
        let deferred = DeferredCommand {
            command: cmd.name.clone(),
            args: words,
            snapshot: MessageSnapshot::capture(&msg, &owner, line),
            notify_owner: true,
        };

        self.cron
            .add_recurring(&job.name, JobAction::Command(deferred), &job.schedule, Some(owner.bare()))?;
        Ok(())
    }

    /// Initial load: plugins, config-declared jobs and persisted one-time
    /// jobs.
    pub fn start(&self, plugins: Vec<Arc<dyn Plugin>>) {
        for plugin in plugins {
            self.load_plugin(plugin);
        }

        let config = self.config();
        if config.cron.enabled {
            self.load_config_jobs(&config);
            self.cron.load();
        }

        if self.commands.read().unwrap().is_empty() {
            log::warn!("No commands registered; check the [plugins] config");
        }
        log::info!(
            "Bot {} ready with {} command(s) from {} plugin(s)",
            config.bot.nick,
            self.commands.read().unwrap().len(),
            self.plugins.read().unwrap().len()
        );
        for line in self.cron.display_cronjobs() {
            log::debug!("Cron job {}", line);
        }
    }

    /// Swap in a new config and plugin set. Pending one-time jobs survive;
    /// recurring jobs are declared again by whatever gets loaded.
    pub fn reload(&self, config: Arc<Config>, plugins: Vec<Arc<dyn Plugin>>) {
        log::info!("Reloading plugins and configuration");

        let names = self.plugin_names();
        for name in &names {
            self.unload_plugin(name);
        }
        self.cron.reset(None);
        self.commands.write().unwrap().clear();

        *self.config.write().unwrap() = Arc::clone(&config);

        for plugin in plugins {
            self.load_plugin(plugin);
        }
        if config.cron.enabled {
            self.load_config_jobs(&config);
        }
    }
}
