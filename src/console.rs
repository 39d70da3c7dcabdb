use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::bot::Bot;
use crate::config::Config;
use crate::message::{ConversationType, Jid, Message};
use crate::transport::{Acl, Transport};

/// Line-oriented stdin/stdout transport. Every input line is a direct
/// message from the configured console user.
pub struct ConsoleTransport {
    acl: Acl,
    user: Jid,
    room: Option<Jid>,
}

impl ConsoleTransport {
    pub fn new(config: &Config) -> Self {
        Self {
            acl: Acl::from_config(&config.xmpp),
            user: Jid::parse(&config.console.user),
            room: config.xmpp.room.as_deref().map(Jid::parse),
        }
    }

    /// Read commands until stdin closes.
    pub async fn run(&self, bot: Arc<Bot>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        log::info!("Reading commands from stdin as {}", self.user);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            bot.spawn_message(Message::direct(self.user.clone(), line));
        }

        log::info!("Console input closed");
        Ok(())
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn identity(&self, msg: &Message) -> Option<Jid> {
        match msg.kind {
            ConversationType::Direct => Some(msg.from.bare()),
            // No room roster on the console
            ConversationType::Group => None,
        }
    }

    fn is_user(&self, jid: &Jid) -> bool {
        self.acl.is_user(jid)
    }

    fn is_admin(&self, jid: &Jid) -> bool {
        self.acl.is_admin(jid)
    }

    fn is_room_user(&self, jid: &Jid) -> bool {
        self.acl.is_room_user(jid)
    }

    fn is_room_admin(&self, jid: &Jid) -> bool {
        self.acl.is_room_admin(jid)
    }

    fn room(&self) -> Option<Jid> {
        self.room.clone()
    }

    async fn send(
        &self,
        to: &Jid,
        text: &str,
        kind: ConversationType,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let marker = match kind {
            ConversationType::Direct => "",
            ConversationType::Group => "#",
        };
        println!("[{}{}] {}", marker, to, text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_of_direct_message() {
        let config = Config::parse("[bot]\n[console]\nuser = \"Admin@Example.com\"\n").unwrap();
        let transport = ConsoleTransport::new(&config);

        let msg = Message::direct(transport.user.clone(), "help");
        assert_eq!(transport.identity(&msg).unwrap().to_string(), "admin@example.com");

        let msg = Message::group(Jid::parse("ops@conference.example.com/admin"), "help");
        assert_eq!(transport.identity(&msg), None);
    }
}
