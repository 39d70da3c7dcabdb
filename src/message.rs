use std::fmt;

use serde::{Deserialize, Serialize};

/// Chat address: `user@domain` with an optional `/resource` (or room nick).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Jid {
    bare: String,
    resource: Option<String>,
}

impl Jid {
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s.split_once('/') {
            Some((bare, resource)) if !resource.is_empty() => Self {
                bare: bare.to_lowercase(),
                resource: Some(resource.to_string()),
            },
            Some((bare, _)) => Self {
                bare: bare.to_lowercase(),
                resource: None,
            },
            None => Self {
                bare: s.to_lowercase(),
                resource: None,
            },
        }
    }

    /// The stable account identifier without any resource qualifier.
    pub fn bare(&self) -> Jid {
        Jid {
            bare: self.bare.clone(),
            resource: None,
        }
    }

    pub fn as_bare_str(&self) -> &str {
        &self.bare
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(r) => write!(f, "{}/{}", self.bare, r),
            None => write!(f, "{}", self.bare),
        }
    }
}

impl From<String> for Jid {
    fn from(s: String) -> Self {
        Jid::parse(&s)
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationType {
    Direct,
    Group,
}

/// Inbound chat event, plus the per-message delivery flags the invocation
/// wrapper sets before a handler runs.
#[derive(Debug, Clone)]
pub struct Message {
    /// Sender address; for group messages this is `room/nick`.
    pub from: Jid,
    pub kind: ConversationType,
    pub body: String,
    /// Identity already known for this message. Skips the transport lookup.
    pub identity: Option<Jid>,
    /// Send the result back to the sender at all.
    pub reply_output: bool,
    /// Flush streamed results line by line instead of buffering.
    pub stream_output: bool,
}

impl Message {
    pub fn new(from: Jid, kind: ConversationType, body: impl Into<String>) -> Self {
        Self {
            from,
            kind,
            body: body.into(),
            identity: None,
            reply_output: true,
            stream_output: false,
        }
    }

    pub fn direct(from: Jid, body: impl Into<String>) -> Self {
        Self::new(from, ConversationType::Direct, body)
    }

    pub fn group(from: Jid, body: impl Into<String>) -> Self {
        Self::new(from, ConversationType::Group, body)
    }

    /// Where a reply goes: into the room for group messages, to the sender
    /// otherwise.
    pub fn reply_to(&self) -> Jid {
        match self.kind {
            ConversationType::Group => self.from.bare(),
            ConversationType::Direct => self.from.clone(),
        }
    }

    /// Split the body into the command token and the raw remainder.
    pub fn command_line(&self) -> Option<(&str, &str)> {
        let trimmed = self.body.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.split_once(char::is_whitespace) {
            Some((cmd, rest)) => Some((cmd, rest.trim())),
            None => Some((trimmed, "")),
        }
    }
}

pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable copy of a message, stored with deferred command jobs and
/// turned back into a [`Message`] when the job fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    pub version: u32,
    pub from: Jid,
    pub identity: Jid,
    pub kind: ConversationType,
    pub body: String,
    pub reply_output: bool,
    pub stream_output: bool,
}

impl MessageSnapshot {
    pub fn capture(msg: &Message, identity: &Jid, body: impl Into<String>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            from: msg.from.clone(),
            identity: identity.bare(),
            kind: msg.kind,
            body: body.into(),
            reply_output: msg.reply_output,
            stream_output: msg.stream_output,
        }
    }

    pub fn restore(&self) -> Message {
        Message {
            from: self.from.clone(),
            kind: self.kind,
            body: self.body.clone(),
            identity: Some(self.identity.clone()),
            reply_output: self.reply_output,
            stream_output: self.stream_output,
        }
    }
}
