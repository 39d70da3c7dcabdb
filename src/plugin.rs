use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::bot::Bot;
use crate::command::{Args, Command};
use crate::cron::CronSpec;
use crate::message::Message;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Lazy, finite sequence of output lines.
pub type LineStream = BoxStream<'static, Result<String, HandlerError>>;

pub enum CommandOutput {
    Text(String),
    Lines(LineStream),
}

impl fmt::Debug for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutput::Text(text) => f.debug_tuple("Text").field(text).finish(),
            CommandOutput::Lines(_) => f.write_str("Lines(..)"),
        }
    }
}

impl From<String> for CommandOutput {
    fn from(text: String) -> Self {
        CommandOutput::Text(text)
    }
}

impl From<&str> for CommandOutput {
    fn from(text: &str) -> Self {
        CommandOutput::Text(text.to_string())
    }
}

/// Recurring job a plugin declares at load time.
pub struct PluginCronJob {
    pub function: String,
    pub schedule: CronSpec,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Commands to register when the plugin loads. `Command::handler` is the
    /// identifier passed back to [`Plugin::handle_command`].
    fn commands(&self) -> Vec<Command>;

    fn cronjobs(&self) -> Vec<PluginCronJob> {
        Vec::new()
    }

    async fn handle_command(
        &self,
        handler: &str,
        args: Args,
        msg: &Message,
        bot: &Bot,
    ) -> Result<CommandOutput, HandlerError>;

    async fn run_cronjob(
        &self,
        function: &str,
        _args: &[String],
        _bot: &Bot,
    ) -> Result<Option<String>, HandlerError> {
        Err(format!("Plugin {} has no cron job \"{}\"", self.name(), function).into())
    }
}

/// Live plugin instances by name. Instances are replaced on reload, so
/// callers look them up every time instead of keeping a handle.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Option<Arc<dyn Plugin>> {
        log::info!("Registered plugin: {}", plugin.name());
        self.plugins.insert(plugin.name().to_string(), plugin)
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.remove(name)
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }
}
