mod base;
mod commands;
mod jobs;

use std::sync::Arc;

use crate::config::Config;
use crate::plugin::Plugin;

pub use base::BasePlugin;
pub use commands::CommandsPlugin;
pub use jobs::JobsPlugin;

pub fn build_plugins(config: &Config) -> Vec<Arc<dyn Plugin>> {
    let mut plugins: Vec<Arc<dyn Plugin>> = Vec::new();

    if config.is_plugin_enabled("base") {
        plugins.push(Arc::new(BasePlugin));
    }
    // One-time jobs only fire while cron runs
    if config.is_plugin_enabled("jobs") && config.cron.enabled {
        plugins.push(Arc::new(JobsPlugin));
    }
    if config.is_plugin_enabled("commands") {
        if let Some(plugin_config) = config.plugin("commands") {
            plugins.push(Arc::new(CommandsPlugin::new(plugin_config)));
        }
    }

    plugins
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(config: &Config) -> Vec<String> {
        build_plugins(config)
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    #[test]
    fn test_default_plugins() {
        let config = Config::parse("[bot]\n").unwrap();
        assert_eq!(names(&config), vec!["base", "jobs"]);
    }

    #[test]
    fn test_jobs_plugin_needs_cron() {
        let config = Config::parse("[bot]\n[cron]\nenabled = false\n").unwrap();
        assert_eq!(names(&config), vec!["base"]);
    }

    #[test]
    fn test_commands_plugin_from_config() {
        let config = Config::parse(
            "[bot]\n[plugins.commands.commands]\nhello = \"echo hello, Say hello.\"\n",
        )
        .unwrap();
        assert_eq!(names(&config), vec!["base", "jobs", "commands"]);
    }
}
