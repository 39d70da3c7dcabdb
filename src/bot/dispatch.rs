use std::sync::Arc;

use crate::message::{ConversationType, Jid, Message};

use super::*;

impl Bot {
    /// Handle one inbound message on its own task so a slow command never
    /// holds up the next message.
    pub fn spawn_message(self: &Arc<Self>, msg: Message) -> tokio::task::JoinHandle<Option<String>> {
        let bot = Arc::clone(self);
        tokio::spawn(async move { bot.handle_message(msg).await })
    }

    /// Turn a message body into a command invocation. Returns the text
    /// produced, or `None` when the message was not meant for the bot.
    pub async fn handle_message(&self, mut msg: Message) -> Option<String> {
        if msg.kind == ConversationType::Group {
            let nick = self.nick();
            if msg.from.resource() == Some(nick.as_str()) {
                return None;
            }
            // In a room the bot only answers when addressed as "nick: ..."
            let body = msg.body.trim_start().strip_prefix(&format!("{}:", nick))?;
            msg.body = body.trim().to_string();
        }

        let (token, raw_args) = match msg.command_line() {
            Some((token, raw)) => (token.to_string(), raw.to_string()),
            None => return None,
        };

        match self.resolve_command(&token) {
            Some(cmd) => Some(self.invoke(&cmd, msg, &raw_args).await),
            None => {
                log::debug!("Unknown command \"{}\" from {}", token, msg.from);
                let reply = format!(
                    "Sorry, I don't understand \"{}\"\nPlease type \"help\" for more info",
                    msg.body
                );
                self.send(&msg.reply_to(), &reply, msg.kind).await;
                Some(reply)
            }
        }
    }

    /// Send text to an arbitrary recipient, as a room message when the
    /// recipient is the bot's room.
    pub async fn relay(&self, to: &Jid, text: &str) {
        let kind = match self.transport.room() {
            Some(room) if room.as_bare_str() == to.as_bare_str() => ConversationType::Group,
            _ => ConversationType::Direct,
        };
        log::info!("Relaying message to {}", to);
        self.send(to, text, kind).await;
    }
}
