//! Chat commands backed by OS commands and scripts, declared in the
//! `[plugins.commands.commands]` table:
//!
//! ```toml
//! df = "df -h, admin_required, Show disk usage."
//! ```
//!
//! A value is the command line, then any number of flags, then the
//! documentation. Everything after the first word that is not a flag is
//! documentation, commas included.

use std::collections::BTreeMap;
use std::process::Stdio;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command as Process};
use tokio_stream::wrappers::LinesStream;

use crate::bot::Bot;
use crate::command::{Args, Command};
use crate::config::PluginConfig;
use crate::error::CommandError;
use crate::message::Message;
use crate::plugin::{CommandOutput, HandlerError, Plugin};

/// Apply a config flag to a command. Returns `None` for words that are not
/// flags.
fn apply_flag(cmd: Command, flag: &str) -> Option<Command> {
    let mut cmd = cmd;
    match flag {
        "command" => {}
        "stream_output" => cmd.stream_output = true,
        "reply_output" => cmd.reply_output = true,
        "ignore_output" => cmd.reply_output = false,
        "user_required" => cmd.permissions.user_required = true,
        "user_not_required" => cmd.permissions.user_required = false,
        "admin_required" => cmd.permissions.admin_required = true,
        "room_user_required" => cmd.permissions.room_user_required = true,
        "room_admin_required" => cmd.permissions.room_admin_required = true,
        _ => return None,
    }
    Some(cmd)
}

#[derive(Debug, Clone)]
pub struct DynamicCommand {
    pub argv: Vec<String>,
    pub command: Command,
}

pub fn parse_config_line(name: &str, line: &str) -> Result<DynamicCommand, CommandError> {
    let mut parts = line.trim().split(',');
    let os_command = parts.next().unwrap_or("").trim();
    let argv = shell_words::split(os_command)
        .map_err(|_| CommandError::new("Could not parse command parameters"))?;
    if argv.is_empty() {
        return Err(CommandError::new("Empty command"));
    }

    let rest: Vec<&str> = parts.collect();
    let mut flags = Command::new(name, "").variadic();
    let mut doc = String::new();

    for (i, opt) in rest.iter().enumerate() {
        match apply_flag(flags.clone(), opt.trim()) {
            Some(cmd) => flags = cmd,
            None => {
                doc = rest[i..].join(",").trim().to_string();
                break;
            }
        }
    }

    let mut command = flags;
    command.doc = doc;
    Ok(DynamicCommand { argv, command })
}

async fn exit_status(mut child: Child, name: String) -> Option<Result<String, HandlerError>> {
    match child.wait().await {
        Ok(status) if status.success() => None,
        Ok(status) => Some(Err(CommandError::new(format!(
            "Command \"{}\" exited with non-zero status {}",
            name,
            status.code().unwrap_or(-1)
        ))
        .into())),
        Err(e) => Some(Err(e.into())),
    }
}

pub struct CommandsPlugin {
    commands: BTreeMap<String, DynamicCommand>,
}

impl CommandsPlugin {
    pub fn new(config: &PluginConfig) -> Self {
        log::debug!("Initializing dynamic commands");
        let mut commands = BTreeMap::new();

        for (name, line) in &config.commands {
            match parse_config_line(name, line) {
                Ok(dynamic) => {
                    log::info!("Registering dynamic command: {}", dynamic.command.name);
                    commands.insert(dynamic.command.handler.clone(), dynamic);
                }
                Err(e) => log::error!("Dynamic command \"{}\" could not be registered ({})", name, e),
            }
        }

        Self { commands }
    }

    fn process(argv: &[String]) -> Process {
        let mut process = Process::new(&argv[0]);
        process.args(&argv[1..]).stdin(Stdio::null()).kill_on_drop(true);
        process
    }

    async fn run(name: &str, argv: Vec<String>) -> Result<CommandOutput, HandlerError> {
        let output = Self::process(&argv)
            .output()
            .await
            .map_err(|e| CommandError::new(format!("Could not run command ({})", e)))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let text = text.trim_end_matches('\n').to_string();

        if output.status.success() {
            Ok(text.into())
        } else if text.is_empty() {
            Err(CommandError::new(format!(
                "Command \"{}\" exited with non-zero status {}",
                name,
                output.status.code().unwrap_or(-1)
            ))
            .into())
        } else {
            Err(CommandError::new(text).into())
        }
    }

    fn run_streamed(name: &str, argv: Vec<String>) -> Result<CommandOutput, HandlerError> {
        let mut child = Self::process(&argv)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CommandError::new(format!("Could not run command ({})", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CommandError::new("Could not capture command output"))?;

        let lines = LinesStream::new(BufReader::new(stdout).lines())
            .map(|line| line.map_err(|e| Box::new(e) as HandlerError));
        let status = futures_util::stream::once(exit_status(child, name.to_string()))
            .filter_map(|result| async move { result });

        Ok(CommandOutput::Lines(lines.chain(status).boxed()))
    }
}

#[async_trait]
impl Plugin for CommandsPlugin {
    fn name(&self) -> &str {
        "commands"
    }

    fn description(&self) -> &str {
        "Dynamic commands associated with OS commands and scripts"
    }

    fn commands(&self) -> Vec<Command> {
        self.commands.values().map(|d| d.command.clone()).collect()
    }

    async fn handle_command(
        &self,
        handler: &str,
        args: Args,
        msg: &Message,
        _bot: &Bot,
    ) -> Result<CommandOutput, HandlerError> {
        let dynamic = self
            .commands
            .get(handler)
            .ok_or_else(|| format!("Unknown dynamic command \"{}\"", handler))?;

        let mut argv = dynamic.argv.clone();
        argv.extend(args.into_vec());
        log::info!("Running dynamic command: {:?}", argv);

        if msg.stream_output {
            Self::run_streamed(&dynamic.command.name, argv)
        } else {
            Self::run(&dynamic.command.name, argv).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_line_flags_and_doc() {
        let dynamic =
            parse_config_line("disk_usage", "df -h /, admin_required, stream_output, Show disk usage, per mount.")
                .unwrap();

        assert_eq!(dynamic.argv, vec!["df", "-h", "/"]);
        assert_eq!(dynamic.command.name, "disk-usage");
        assert!(dynamic.command.permissions.admin_required);
        assert!(dynamic.command.permissions.user_required);
        assert!(dynamic.command.stream_output);
        assert!(dynamic.command.params.variadic);
        assert_eq!(dynamic.command.doc, "Show disk usage, per mount.");
    }

    #[test]
    fn test_parse_config_line_ignore_output_and_no_user() {
        let dynamic =
            parse_config_line("restart", "systemctl restart app, command, ignore_output, user_not_required")
                .unwrap();

        assert!(!dynamic.command.reply_output);
        assert!(!dynamic.command.permissions.user_required);
        assert_eq!(dynamic.command.doc, "");
    }

    #[test]
    fn test_parse_config_line_errors() {
        assert!(parse_config_line("empty", " , admin_required").is_err());
        assert!(parse_config_line("quote", "echo \"unbalanced, Doc.").is_err());
    }

    #[test]
    fn test_plugin_skips_bad_lines() {
        let mut config = PluginConfig::default();
        config.commands.insert("hello".into(), "echo hello, Say hello.".into());
        config.commands.insert("broken".into(), "".into());

        let plugin = CommandsPlugin::new(&config);
        let names: Vec<String> = plugin.commands().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["hello"]);
    }

    #[tokio::test]
    async fn test_run_collects_output() {
        let out = CommandsPlugin::run("hello", vec!["echo".into(), "hello".into(), "world".into()])
            .await
            .unwrap();
        match out {
            CommandOutput::Text(text) => assert_eq!(text, "hello world"),
            CommandOutput::Lines(_) => panic!("expected text output"),
        }
    }

    #[tokio::test]
    async fn test_run_non_zero_exit_is_command_error() {
        let err = CommandsPlugin::run("fail", vec!["false".into()]).await.unwrap_err();
        let err = err.downcast::<CommandError>().unwrap();
        assert!(err.to_string().contains("non-zero status 1"));
    }

    #[tokio::test]
    async fn test_run_missing_binary() {
        let err = CommandsPlugin::run("nope", vec!["/nonexistent/ludolph-test".into()])
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Could not run command"));
    }

    #[tokio::test]
    async fn test_run_streamed_yields_lines() {
        let argv = vec!["printf".into(), "a\\nb\\nc\\n".into()];
        let out = CommandsPlugin::run_streamed("abc", argv).unwrap();
        let lines = match out {
            CommandOutput::Lines(lines) => lines,
            CommandOutput::Text(_) => panic!("expected streamed output"),
        };
        let lines: Vec<String> = lines.map(|l| l.unwrap()).collect().await;
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_run_streamed_failure_after_output() {
        let argv = vec!["sh".into(), "-c".into(), "echo partial; exit 3".into()];
        let out = CommandsPlugin::run_streamed("partial", argv).unwrap();
        let mut lines = match out {
            CommandOutput::Lines(lines) => lines,
            CommandOutput::Text(_) => panic!("expected streamed output"),
        };

        assert_eq!(lines.next().await.unwrap().unwrap(), "partial");
        let err = lines.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("non-zero status 3"));
        assert!(lines.next().await.is_none());
    }
}
