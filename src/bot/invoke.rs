use std::panic::AssertUnwindSafe;

use futures_util::{FutureExt, StreamExt};

use crate::command::{parse_args, Args, Command, Permissions};
use crate::error::CommandError;
use crate::message::{Jid, Message};
use crate::plugin::{CommandOutput, HandlerError};
use crate::transport::Transport;
use crate::util::panic_message;

use super::*;

type MembershipCheck = fn(&dyn Transport, &Jid) -> bool;

/// Whether an invocation evaluates the command's permission predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Check,
    /// Checked once already, when the deferred job was scheduled.
    Granted,
}

impl Bot {
    /// Evaluate the permission predicates of a command in order, stopping at
    /// the first that fails. An unknown identity fails every predicate.
    pub fn check_permissions(
        &self,
        permissions: &Permissions,
        identity: Option<&Jid>,
    ) -> Result<(), CommandError> {
        let transport = self.transport.as_ref();
        let checks: [(bool, MembershipCheck); 4] = [
            (permissions.user_required, |t, jid| t.is_user(jid)),
            (permissions.admin_required, |t, jid| t.is_admin(jid)),
            (permissions.room_user_required, |t, jid| t.is_room_user(jid)),
            (permissions.room_admin_required, |t, jid| t.is_room_admin(jid)),
        ];

        for (required, check) in checks {
            if required && !identity.map(|jid| check(transport, jid)).unwrap_or(false) {
                return Err(CommandError::PermissionDenied);
            }
        }
        Ok(())
    }

    /// Run `cmd` for `msg` and deliver the result. Returns the output text,
    /// including `ERROR:` replies.
    pub async fn invoke(&self, cmd: &Command, msg: Message, raw_args: &str) -> String {
        self.invoke_as(cmd, msg, raw_args, Authorization::Check).await
    }

    pub(super) async fn invoke_as(
        &self,
        cmd: &Command,
        mut msg: Message,
        raw_args: &str,
        auth: Authorization,
    ) -> String {
        let identity = msg
            .identity
            .clone()
            .or_else(|| self.transport.identity(&msg));
        let caller = identity
            .as_ref()
            .map(|jid| jid.to_string())
            .unwrap_or_else(|| msg.from.to_string());
        log::info!(
            "{} requested command \"{}\" ({}) with parameters \"{}\"",
            caller,
            cmd.name,
            cmd.plugin,
            raw_args
        );

        msg.identity = identity;
        msg.stream_output = cmd.stream_output;
        msg.reply_output = msg.reply_output && cmd.reply_output;

        let mut streamed = false;
        let output = match self.run_handler(cmd, &msg, raw_args, auth, &mut streamed).await {
            Ok(text) => text,
            Err(e) => error_reply(cmd, &caller, e),
        };

        if msg.reply_output && !streamed && !output.is_empty() {
            self.send(&msg.reply_to(), &output, msg.kind).await;
        }

        output
    }

    async fn run_handler(
        &self,
        cmd: &Command,
        msg: &Message,
        raw_args: &str,
        auth: Authorization,
        streamed: &mut bool,
    ) -> Result<String, HandlerError> {
        if auth == Authorization::Check {
            self.check_permissions(&cmd.permissions, msg.identity.as_ref())?;
        }
        let args = parse_args(&cmd.params, raw_args)?;

        let plugin = self
            .resolve_plugin(&cmd.plugin)
            .ok_or_else(|| format!("Plugin {} is not loaded", cmd.plugin))?;

        // A panicking handler is reported like any other internal error
        match AssertUnwindSafe(self.call_handler(plugin.as_ref(), cmd, args, msg, streamed))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                log::error!("Handler of command \"{}\" ({}) panicked", cmd.name, cmd.plugin);
                Err(panic_message(&*panic).into())
            }
        }
    }

    async fn call_handler(
        &self,
        plugin: &dyn Plugin,
        cmd: &Command,
        args: Args,
        msg: &Message,
        streamed: &mut bool,
    ) -> Result<String, HandlerError> {
        match plugin.handle_command(&cmd.handler, args, msg, self).await? {
            CommandOutput::Text(text) => Ok(text),
            CommandOutput::Lines(mut lines) => {
                let deliver = msg.stream_output && msg.reply_output;
                let reply_to = msg.reply_to();
                let mut out = Vec::new();

                while let Some(line) = lines.next().await {
                    let line = line?;
                    if deliver && !line.is_empty() {
                        self.send(&reply_to, &line, msg.kind).await;
                    }
                    out.push(line);
                }

                *streamed = deliver;
                Ok(out.join("\n"))
            }
        }
    }
}

fn error_reply(cmd: &Command, caller: &str, err: HandlerError) -> String {
    match err.downcast::<CommandError>() {
        Ok(e) => {
            match *e {
                CommandError::PermissionDenied | CommandError::MissingParameter => log::warn!(
                    "Command \"{}\" requested by {} failed: {}",
                    cmd.name,
                    caller,
                    e
                ),
                CommandError::Failed(_) => log::info!(
                    "Command \"{}\" requested by {} failed: {}",
                    cmd.name,
                    caller,
                    e
                ),
            }
            format!("ERROR: {}", e)
        }
        Err(e) => {
            log::error!(
                "Command \"{}\" ({}) requested by {} crashed: {:?}",
                cmd.name,
                cmd.plugin,
                caller,
                e
            );
            format!("ERROR: Command failed due to internal programming error: {}", e)
        }
    }
}
