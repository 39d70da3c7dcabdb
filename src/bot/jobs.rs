use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::cron::{
    now_minute, truncate_to_minute, CronJob, DeferredCommand, JobAction, JobId, JobRunner,
    TIME_FORMAT,
};
use crate::error::CommandError;
use crate::message::{ConversationType, Jid, Message, MessageSnapshot};
use crate::plugin::HandlerError;

use super::invoke::Authorization;
use super::*;

/// Absolute time format accepted by `at add` and `remind add`.
pub const RUN_AT_FORMAT: &str = "%Y-%m-%d-%H-%M";

/// Which one-time jobs a listing or deletion applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Command,
    Reminder,
}

impl JobKind {
    fn matches(self, job: &CronJob) -> bool {
        if !job.is_onetime() {
            return false;
        }
        match self {
            JobKind::Command => matches!(job.action, JobAction::Command(_)),
            JobKind::Reminder => matches!(job.action, JobAction::Reminder { .. }),
        }
    }
}

/// Parse `+<minutes>` relative to `now`, or an absolute
/// `YYYY-MM-DD-HH-MM` timestamp. The result is truncated to the minute.
pub fn parse_run_at(value: &str, now: NaiveDateTime) -> Result<NaiveDateTime, CommandError> {
    let invalid = || {
        CommandError::new("Invalid date format (required: +<minutes> or YYYY-MM-DD-HH-MM)")
    };
    let now = truncate_to_minute(now);

    let at = match value.strip_prefix('+') {
        Some(offset) => {
            let minutes: u32 = offset.parse().map_err(|_| invalid())?;
            now + chrono::Duration::minutes(i64::from(minutes))
        }
        None => NaiveDateTime::parse_from_str(value, RUN_AT_FORMAT).map_err(|_| invalid())?,
    };

    if at < now {
        return Err(CommandError::new(format!(
            "Date {} is in the past",
            at.format(TIME_FORMAT)
        )));
    }
    Ok(at)
}

fn format_job(job: &CronJob) -> String {
    let owner = job
        .owner
        .as_ref()
        .map(|o| o.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "**{}** [{}] ({}) {}",
        job.name,
        job.schedule,
        owner,
        job.action.describe()
    )
}

impl Bot {
    /// Schedule `command` to run at `run_at` on behalf of `owner`.
    ///
    /// Permissions are checked now, against the owner, and not again when
    /// the job fires.
    pub fn schedule_command(
        &self,
        msg: &Message,
        owner: &Jid,
        command: &str,
        args: Vec<String>,
        run_at: NaiveDateTime,
        notify_owner: bool,
    ) -> Result<JobId, CommandError> {
        let cmd = self
            .resolve_command(command)
            .ok_or_else(|| CommandError::new(format!("Invalid command \"{}\"", command)))?;
        self.check_permissions(&cmd.permissions, Some(owner))?;

        let line = shell_words::join(
            std::iter::once(cmd.name.as_str()).chain(args.iter().map(|a| a.as_str())),
        );
        let deferred = DeferredCommand {
            command: cmd.name.clone(),
            args,
            snapshot: MessageSnapshot::capture(msg, owner, line),
            notify_owner,
        };

        let id = self
            .cron
            .add_onetime(JobAction::Command(deferred), run_at, Some(owner.bare()));
        log::info!(
            "{} scheduled command \"{}\" as job {} at {}",
            owner,
            cmd.name,
            id,
            run_at.format(TIME_FORMAT)
        );
        Ok(id)
    }

    pub fn schedule_reminder(&self, owner: &Jid, text: &str, run_at: NaiveDateTime) -> JobId {
        let action = JobAction::Reminder {
            text: text.to_string(),
        };
        self.cron.add_onetime(action, run_at, Some(owner.bare()))
    }

    /// One-time jobs of `kind`; admins see everyone's, others their own.
    pub fn list_jobs(&self, identity: &Jid, kind: JobKind) -> Vec<String> {
        let admin = self.transport.is_admin(identity);
        self.cron
            .jobs()
            .iter()
            .filter(|job| kind.matches(job))
            .filter(|job| admin || job.is_owned_by(identity))
            .map(format_job)
            .collect()
    }

    pub fn delete_job(&self, identity: &Jid, id: &str, kind: JobKind) -> Result<JobId, CommandError> {
        let id: JobId = id.parse().unwrap_or_else(|never| match never {});
        let job = self
            .cron
            .get(&id)
            .filter(|job| kind.matches(job))
            .ok_or_else(|| CommandError::new("Non-existent job ID"))?;

        if !job.is_owned_by(identity) && !self.transport.is_admin(identity) {
            return Err(CommandError::PermissionDenied);
        }

        self.cron.remove(&id);
        log::info!("{} deleted job {}", identity, id);
        Ok(id)
    }

    async fn run_deferred(
        &self,
        job: &CronJob,
        deferred: &DeferredCommand,
    ) -> Result<String, HandlerError> {
        let cmd = self
            .commands
            .read()
            .unwrap()
            .get(&deferred.command)
            .ok_or_else(|| format!("Command \"{}\" is no longer available", deferred.command))?;

        // The owner gets a summary instead of the usual reply
        let mut msg = deferred.snapshot.restore();
        msg.reply_output = false;

        let started = now_minute();
        let output = self
            .invoke_as(
                &cmd,
                msg,
                &shell_words::join(&deferred.args),
                Authorization::Granted,
            )
            .await;

        if deferred.notify_owner {
            let text = format!(
                "Scheduled job **{}** run at {} finished with output:\n{}",
                job.name,
                started.format(TIME_FORMAT),
                output
            );
            self.send(&deferred.snapshot.identity, &text, ConversationType::Direct)
                .await;
        }

        Ok(output)
    }
}

#[async_trait]
impl JobRunner for Bot {
    async fn run_job(&self, job: &CronJob) -> Result<Option<String>, HandlerError> {
        match &job.action {
            JobAction::Plugin {
                plugin,
                function,
                args,
            } => {
                let instance = self
                    .resolve_plugin(plugin)
                    .ok_or_else(|| format!("Plugin {} is not loaded", plugin))?;
                instance.run_cronjob(function, args, self).await
            }
            JobAction::Command(deferred) => self.run_deferred(job, deferred).await.map(Some),
            JobAction::Reminder { text } => {
                let owner = job.owner.as_ref().ok_or("Reminder without owner")?;
                self.send(owner, &format!("Reminder: {}", text), ConversationType::Direct)
                    .await;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 15)
            .unwrap()
            .and_hms_opt(9, 41, 27)
            .unwrap()
    }

    #[test]
    fn test_parse_run_at_relative() {
        let at = parse_run_at("+5", now()).unwrap();
        assert_eq!(at.format(TIME_FORMAT).to_string(), "2026-10-15 09:46");
        assert_eq!(parse_run_at("+0", now()).unwrap(), truncate_to_minute(now()));
    }

    #[test]
    fn test_parse_run_at_absolute() {
        let at = parse_run_at("2026-12-24-18-00", now()).unwrap();
        assert_eq!(at.format(TIME_FORMAT).to_string(), "2026-12-24 18:00");
    }

    #[test]
    fn test_parse_run_at_invalid_names_format() {
        for value in ["5", "+five", "+-3", "2026-12-24 18:00", "tomorrow"] {
            let err = parse_run_at(value, now()).unwrap_err();
            assert!(err.to_string().contains("YYYY-MM-DD-HH-MM"), "{}", value);
        }
    }

    #[test]
    fn test_parse_run_at_past_rejected() {
        let err = parse_run_at("2026-10-15-09-40", now()).unwrap_err();
        assert!(err.to_string().contains("in the past"));
        // the current minute itself is accepted
        assert!(parse_run_at("2026-10-15-09-41", now()).is_ok());
    }
}
