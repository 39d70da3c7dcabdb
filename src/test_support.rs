use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::bot::Bot;
use crate::config::Config;
use crate::message::{ConversationType, Jid, Message};
use crate::transport::{Acl, Transport};

pub type Sent = (Jid, String, ConversationType);

/// Transport that records every outgoing message and resolves room nicks
/// through a fixed occupant table.
pub struct RecordingTransport {
    acl: Acl,
    room: Option<Jid>,
    occupants: Mutex<HashMap<String, Jid>>,
    sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    pub fn new(config: &Config) -> Self {
        Self {
            acl: Acl::from_config(&config.xmpp),
            room: config.xmpp.room.as_deref().map(Jid::parse),
            occupants: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn add_occupant(&self, nick: &str, jid: &str) {
        self.occupants
            .lock()
            .unwrap()
            .insert(nick.to_string(), Jid::parse(jid));
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, text, _)| text).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn identity(&self, msg: &Message) -> Option<Jid> {
        match msg.kind {
            ConversationType::Direct => Some(msg.from.bare()),
            ConversationType::Group => {
                let nick = msg.from.resource()?;
                self.occupants.lock().unwrap().get(nick).map(|j| j.bare())
            }
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
        self.sent
            .lock()
            .unwrap()
            .push((to.clone(), text.to_string(), kind));
        Ok(())
    }
}

/// Users alice and bob; only alice is an admin.
pub fn test_config() -> Config {
    Config::parse(
        r#"
        [bot]
        nick = "ludolph"
        db_path = ":memory:"
        about = "Ludolph test instance"

        [xmpp]
        username = "ludolph@example.com"
        users = ["alice@example.com", "bob@example.com"]
        admins = ["alice@example.com"]
        "#,
    )
    .unwrap()
}

pub fn test_config_with_room() -> Config {
    let mut config = test_config();
    config.xmpp.room = Some("ops@conference.example.com".to_string());
    config
}

pub fn test_bot(config: Config) -> (Arc<Bot>, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::new(&config));
    let bot = Bot::new(Arc::new(config), transport.clone(), None);
    (Arc::new(bot), transport)
}
