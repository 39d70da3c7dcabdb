use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::cron::CronSpec;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub bot: BotConfig,
    #[serde(default)]
    pub xmpp: XmppConfig,
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub plugins: HashMap<String, PluginConfig>,
}

#[derive(Debug, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_nick")]
    pub nick: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_about")]
    pub about: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            nick: default_nick(),
            db_path: default_db_path(),
            log_level: default_log_level(),
            about: default_about(),
        }
    }
}

fn default_nick() -> String {
    "ludolph".to_string()
}

fn default_db_path() -> String {
    "ludolph.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_about() -> String {
    "Ludolph: Monitoring Jabber bot".to_string()
}

/// Account and membership lists. An empty list admits everyone.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct XmppConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub room_users: Vec<String>,
    #[serde(default)]
    pub room_admins: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CronConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub jobs: Vec<CronJobConfig>,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval_ms(),
            jobs: Vec::new(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

/// Recurring command job declared in the config file.
#[derive(Debug, Deserialize, Clone)]
pub struct CronJobConfig {
    pub name: String,
    /// Command line run as `owner`, e.g. `"uptime"` or `"status web01"`.
    pub command: String,
    pub owner: String,
    #[serde(flatten)]
    pub schedule: CronSpec,
}

#[derive(Debug, Deserialize, Default)]
pub struct MonitorConfig {
    #[serde(default)]
    pub pipe_file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhooksConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_webhooks_bind")]
    pub bind_address: String,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_webhooks_bind(),
        }
    }
}

fn default_webhooks_bind() -> String {
    "127.0.0.1:8922".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_console_user")]
    pub user: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            user: default_console_user(),
        }
    }
}

fn default_console_user() -> String {
    "console@localhost".to_string()
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PluginConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Dynamic commands (`commands` plugin only): name to config line.
    #[serde(default)]
    pub commands: BTreeMap<String, String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Plugins without a section are off, except the built-in `base` and
    /// `jobs`.
    pub fn is_plugin_enabled(&self, name: &str) -> bool {
        self.plugins
            .get(name)
            .map(|p| p.enabled)
            .unwrap_or(matches!(name, "base" | "jobs"))
    }

    pub fn plugin(&self, name: &str) -> Option<&PluginConfig> {
        self.plugins.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::parse("[bot]\n").unwrap();
        assert_eq!(config.bot.nick, "ludolph");
        assert_eq!(config.bot.db_path, "ludolph.db");
        assert!(config.cron.enabled);
        assert_eq!(config.cron.poll_interval_ms, 1000);
        assert!(!config.webhooks.enabled);
        assert_eq!(config.console.user, "console@localhost");
        assert!(config.xmpp.room.is_none());
    }

    #[test]
    fn test_plugin_enabled_defaults() {
        let config = Config::parse(
            r#"
            [bot]
            [plugins.base]
            enabled = false
            [plugins.commands]
            "#,
        )
        .unwrap();
        assert!(!config.is_plugin_enabled("base"));
        assert!(config.is_plugin_enabled("jobs"));
        assert!(config.is_plugin_enabled("commands"));
        assert!(!config.is_plugin_enabled("zabbix"));
    }

    #[test]
    fn test_cron_jobs_and_commands() {
        let config = Config::parse(
            r#"
            [bot]
            nick = "ops"

            [[cron.jobs]]
            name = "morning-uptime"
            command = "uptime"
            owner = "admin@example.com"
            minute = [0]
            hour = [8]

            [plugins.commands.commands]
            df = "df -h, admin_required, Show disk usage."
            "#,
        )
        .unwrap();

        let job = &config.cron.jobs[0];
        assert_eq!(job.name, "morning-uptime");
        assert_eq!(job.schedule.hour, Some(vec![8]));
        assert_eq!(job.schedule.day, None);

        let cmds = &config.plugin("commands").unwrap().commands;
        assert_eq!(cmds["df"], "df -h, admin_required, Show disk usage.");
    }

    #[test]
    fn test_missing_bot_section_fails() {
        assert!(Config::parse("[xmpp]\nusername = \"bot@example.com\"\n").is_err());
    }
}
