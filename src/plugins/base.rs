use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bot::Bot;
use crate::command::{Args, Command};
use crate::message::Message;
use crate::plugin::{CommandOutput, HandlerError, Plugin};
use crate::util::{dedent, format_uptime, listing_summary};

pub struct BasePlugin;

/// `help` without a topic: commands grouped by plugin.
pub fn format_help(commands: &[Arc<Command>]) -> String {
    let mut by_plugin: BTreeMap<&str, Vec<&Command>> = BTreeMap::new();
    for cmd in commands {
        by_plugin.entry(cmd.plugin.as_str()).or_default().push(cmd);
    }

    let mut out = String::from("List of available Ludolph commands:\n");
    for (plugin, cmds) in by_plugin {
        out.push_str(&format!("\n* {}\n\n", plugin));
        for cmd in cmds {
            let summary = listing_summary(cmd.summary());
            if summary.is_empty() {
                out.push_str(&format!("  * **{}**\n", cmd.name));
            } else {
                out.push_str(&format!("  * **{}** - {}\n", cmd.name, summary));
            }
        }
    }
    out.push_str("\nUse \"help <command>\" for more information about the command usage");
    out
}

pub fn format_command_help(cmd: &Command) -> String {
    format!("**{}** ({})\n\n{}", cmd.name, cmd.plugin, dedent(&cmd.doc))
}

#[async_trait]
impl Plugin for BasePlugin {
    fn name(&self) -> &str {
        "base"
    }

    fn description(&self) -> &str {
        "Ludolph jabber bot base commands"
    }

    fn commands(&self) -> Vec<Command> {
        vec![
            Command::new("help", "Show this help.\n\nUsage: help [command]").optional(1),
            Command::new("version", "Display Ludolph version.\n\nUsage: version"),
            Command::new("about", "Details about this project.\n\nUsage: about"),
            Command::new("uptime", "Show Ludolph uptime.\n\nUsage: uptime"),
        ]
    }

    async fn handle_command(
        &self,
        handler: &str,
        args: Args,
        _msg: &Message,
        bot: &Bot,
    ) -> Result<CommandOutput, HandlerError> {
        let text = match handler {
            "help" => {
                let topic = args
                    .get(0)
                    .filter(|t| !t.is_empty())
                    .and_then(|t| bot.resolve_command(t));
                match topic {
                    Some(cmd) => format_command_help(&cmd),
                    None => format_help(&bot.commands()),
                }
            }
            "version" => format!("Version: {}", env!("CARGO_PKG_VERSION")),
            "about" => bot.config().bot.about.trim().to_string(),
            "uptime" => format_uptime(bot.uptime().as_secs()),
            other => return Err(format!("Unknown handler \"{}\"", other).into()),
        };
        Ok(text.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(name: &str, plugin: &str, doc: &str) -> Arc<Command> {
        let mut cmd = Command::new(name, doc);
        cmd.plugin = plugin.to_string();
        Arc::new(cmd)
    }

    #[test]
    fn test_base_plugin_metadata() {
        let names: Vec<String> = BasePlugin.commands().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["help", "version", "about", "uptime"]);
        assert_eq!(BasePlugin.name(), "base");
    }

    #[test]
    fn test_format_help_groups_by_plugin() {
        let commands = vec![
            registered("about", "base", "Details about this project.\n\nUsage: about"),
            registered("at", "jobs", "Schedule a command."),
            registered("uptime", "base", "Show Ludolph uptime."),
        ];
        let help = format_help(&commands);

        assert!(help.starts_with("List of available Ludolph commands:\n"));
        assert!(help.contains("\n* base\n\n  * **about** - details about this project\n  * **uptime** - show Ludolph uptime\n"));
        assert!(help.contains("\n* jobs\n\n  * **at** - schedule a command\n"));
        assert!(help.ends_with("for more information about the command usage"));
    }

    #[test]
    fn test_format_command_help() {
        let cmd = registered("help", "base", "Show this help.\n\n    Usage: help [command]");
        assert_eq!(
            format_command_help(&cmd),
            "**help** (base)\n\nShow this help.\n\nUsage: help [command]"
        );
    }
}
