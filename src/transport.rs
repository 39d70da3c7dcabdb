use std::collections::HashSet;

use async_trait::async_trait;

use crate::config::XmppConfig;
use crate::message::{ConversationType, Jid, Message};

/// Chat-side collaborator of the command engine: who sent a message, what
/// they are allowed to do, and how to reach them.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Bare identity behind a message. For group messages this is the real
    /// account of the room occupant, or `None` when it cannot be resolved.
    fn identity(&self, msg: &Message) -> Option<Jid>;

    fn is_user(&self, jid: &Jid) -> bool;
    fn is_admin(&self, jid: &Jid) -> bool;
    fn is_room_user(&self, jid: &Jid) -> bool;
    fn is_room_admin(&self, jid: &Jid) -> bool;

    /// Multi-user chat room the bot sits in, if any.
    fn room(&self) -> Option<Jid>;

    async fn send(
        &self,
        to: &Jid,
        text: &str,
        kind: ConversationType,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Default, Clone)]
struct Members(HashSet<String>);

impl Members {
    fn from_list(list: &[String]) -> Self {
        Members(
            list.iter()
                .map(|s| Jid::parse(s).as_bare_str().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    /// An empty set admits everyone.
    fn admits(&self, jid: &Jid) -> bool {
        self.0.is_empty() || self.0.contains(jid.as_bare_str())
    }
}

/// Membership sets from the `[xmpp]` config section.
#[derive(Debug, Default, Clone)]
pub struct Acl {
    users: Members,
    admins: Members,
    room_users: Members,
    room_admins: Members,
}

impl Acl {
    pub fn from_config(config: &XmppConfig) -> Self {
        let acl = Self {
            users: Members::from_list(&config.users),
            admins: Members::from_list(&config.admins),
            room_users: Members::from_list(&config.room_users),
            room_admins: Members::from_list(&config.room_admins),
        };
        log::info!(
            "Loaded ACL: {} user(s), {} admin(s), {} room user(s), {} room admin(s)",
            acl.users.0.len(),
            acl.admins.0.len(),
            acl.room_users.0.len(),
            acl.room_admins.0.len()
        );
        acl
    }

    pub fn is_user(&self, jid: &Jid) -> bool {
        self.users.admits(jid)
    }

    pub fn is_admin(&self, jid: &Jid) -> bool {
        self.admins.admits(jid)
    }

    pub fn is_room_user(&self, jid: &Jid) -> bool {
        self.room_users.admits(jid)
    }

    pub fn is_room_admin(&self, jid: &Jid) -> bool {
        self.room_admins.admits(jid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xmpp(users: &[&str], admins: &[&str]) -> XmppConfig {
        XmppConfig {
            users: users.iter().map(|s| s.to_string()).collect(),
            admins: admins.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_list_admits_everyone() {
        let acl = Acl::from_config(&XmppConfig::default());
        let anyone = Jid::parse("random@example.org");
        assert!(acl.is_user(&anyone));
        assert!(acl.is_admin(&anyone));
        assert!(acl.is_room_user(&anyone));
        assert!(acl.is_room_admin(&anyone));
    }

    #[test]
    fn test_membership_uses_bare_identity() {
        let acl = Acl::from_config(&xmpp(&["alice@example.com", "Bob@Example.com"], &["alice@example.com"]));

        assert!(acl.is_user(&Jid::parse("alice@example.com/laptop")));
        assert!(acl.is_user(&Jid::parse("bob@example.com")));
        assert!(!acl.is_user(&Jid::parse("mallory@example.com")));

        assert!(acl.is_admin(&Jid::parse("alice@example.com/phone")));
        assert!(!acl.is_admin(&Jid::parse("bob@example.com")));
    }
}
