use async_trait::async_trait;
use chrono::Local;

use crate::bot::{parse_run_at, Bot, JobKind};
use crate::command::{Args, Command};
use crate::cron::TIME_FORMAT;
use crate::error::CommandError;
use crate::message::{Jid, Message};
use crate::plugin::{CommandOutput, HandlerError, Plugin};

/// Deferred commands, reminders and the cron job listing.
pub struct JobsPlugin;

fn caller(msg: &Message) -> Result<Jid, CommandError> {
    msg.identity.clone().ok_or(CommandError::PermissionDenied)
}

fn listing(lines: Vec<String>, empty: &str) -> String {
    if lines.is_empty() {
        empty.to_string()
    } else {
        lines.join("\n")
    }
}

impl JobsPlugin {
    fn at(&self, args: &Args, msg: &Message, bot: &Bot) -> Result<String, CommandError> {
        let identity = caller(msg)?;

        match args.get(0) {
            None | Some("") => Ok(listing(
                bot.list_jobs(&identity, JobKind::Command),
                "(no scheduled commands)",
            )),
            Some("add") => {
                let run_at = parse_run_at(args.require(1)?, Local::now().naive_local())?;
                let command = args.require(2)?;
                let rest = args[3..].to_vec();
                let id = bot.schedule_command(msg, &identity, command, rest, run_at, true)?;
                Ok(format!(
                    "Scheduled job ID **{}** at {}",
                    id,
                    run_at.format(TIME_FORMAT)
                ))
            }
            Some("del") => {
                let id = bot.delete_job(&identity, args.require(1)?, JobKind::Command)?;
                Ok(format!("Scheduled job ID **{}** deleted", id))
            }
            Some(other) => Err(CommandError::new(format!(
                "Invalid action \"{}\" (expected add or del)",
                other
            ))),
        }
    }

    fn remind(&self, args: &Args, msg: &Message, bot: &Bot) -> Result<String, CommandError> {
        let identity = caller(msg)?;

        match args.get(0) {
            None | Some("") => Ok(listing(
                bot.list_jobs(&identity, JobKind::Reminder),
                "(no reminders)",
            )),
            Some("add") => {
                let run_at = parse_run_at(args.require(1)?, Local::now().naive_local())?;
                args.require(2)?;
                let text = args[2..].join(" ");
                let id = bot.schedule_reminder(&identity, &text, run_at);
                Ok(format!(
                    "Reminder ID **{}** scheduled at {}",
                    id,
                    run_at.format(TIME_FORMAT)
                ))
            }
            Some("del") => {
                let id = bot.delete_job(&identity, args.require(1)?, JobKind::Reminder)?;
                Ok(format!("Reminder ID **{}** deleted", id))
            }
            Some(other) => Err(CommandError::new(format!(
                "Invalid action \"{}\" (expected add or del)",
                other
            ))),
        }
    }
}

#[async_trait]
impl Plugin for JobsPlugin {
    fn name(&self) -> &str {
        "jobs"
    }

    fn description(&self) -> &str {
        "Scheduled commands and reminders"
    }

    fn commands(&self) -> Vec<Command> {
        vec![
            Command::new(
                "at",
                "List, schedule or delete commands to run later.\n\n\
                 Usage: at [add <+minutes|YYYY-MM-DD-HH-MM> <command> [parameters]]\n\
                 Usage: at del <job ID>",
            )
            .variadic(),
            Command::new(
                "remind",
                "List, schedule or delete reminders.\n\n\
                 Usage: remind [add <+minutes|YYYY-MM-DD-HH-MM> <text>]\n\
                 Usage: remind del <reminder ID>",
            )
            .variadic(),
            Command::new(
                "cron-list",
                "List all cron jobs (admin only).\n\nUsage: cron-list",
            )
            .admin_required(),
        ]
    }

    async fn handle_command(
        &self,
        handler: &str,
        args: Args,
        msg: &Message,
        bot: &Bot,
    ) -> Result<CommandOutput, HandlerError> {
        let text = match handler {
            "at" => self.at(&args, msg, bot)?,
            "remind" => self.remind(&args, msg, bot)?,
            "cron-list" => listing(bot.cron().display_cronjobs(), "(no cron jobs)"),
            other => return Err(format!("Unknown handler \"{}\"", other).into()),
        };
        Ok(text.into())
    }
}
