//! Log messages.
//!
//! Content is an open JSON object with a required string `type`. The two
//! shapes the harness writes, `about` and `contact`, have typed views
//! ([`About`], [`Contact`]) built on top of it.

use crate::error::{Error, Result};
use crate::identity::FeedId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const ABOUT: &str = "about";
pub const CONTACT: &str = "contact";

/// Message content: a JSON object carrying a non-empty `type` string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Content(Map<String, Value>);

impl Content {
    /// Validate a raw JSON value as message content.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::Publish("content must be a JSON object".to_string()));
        };
        match map.get("type") {
            Some(Value::String(t)) if !t.is_empty() => Ok(Self(map)),
            Some(_) => Err(Error::Publish("content type must be a non-empty string".to_string())),
            None => Err(Error::Publish("content is missing its type".to_string())),
        }
    }

    /// Self-description: `subject` is called `name`.
    pub fn about(subject: &FeedId, name: impl Into<String>) -> Self {
        Self::typed(&About {
            about: subject.clone(),
            name: Some(name.into()),
        })
    }

    /// Follow-state edge towards `target`.
    pub fn contact(target: &FeedId, following: bool) -> Self {
        Self::typed(&Contact {
            contact: target.clone(),
            following,
        })
    }

    fn typed<R: TypedContent>(record: &R) -> Self {
        let mut map = match serde_json::to_value(record) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        map.insert("type".to_string(), Value::String(R::TYPE.to_string()));
        Self(map)
    }

    pub fn msg_type(&self) -> &str {
        self.0.get("type").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Decode into a typed view, if the type matches.
    pub fn parse<R: TypedContent>(&self) -> Option<R> {
        if self.msg_type() != R::TYPE {
            return None;
        }
        serde_json::from_value(Value::Object(self.0.clone())).ok()
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

impl TryFrom<Value> for Content {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl From<Content> for Value {
    fn from(content: Content) -> Self {
        Value::Object(content.0)
    }
}

/// A content shape with a fixed `type`.
pub trait TypedContent: Serialize + for<'de> Deserialize<'de> {
    const TYPE: &'static str;
}

/// `about` record: names a feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct About {
    pub about: FeedId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TypedContent for About {
    const TYPE: &'static str = ABOUT;
}

/// `contact` record: the author's follow state towards `contact`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub contact: FeedId,
    #[serde(default)]
    pub following: bool,
}

impl TypedContent for Contact {
    const TYPE: &'static str = CONTACT;
}

/// Content-hash key of a log entry, `%<hex>.blake3`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageKey(String);

impl MessageKey {
    /// Key for an entry given its author, sequence, predecessor and content.
    pub fn compute(
        author: &FeedId,
        sequence: u64,
        previous: Option<&MessageKey>,
        content: &Content,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(author.as_str().as_bytes());
        hasher.update(&sequence.to_be_bytes());
        if let Some(previous) = previous {
            hasher.update(previous.0.as_bytes());
        }
        hasher.update(content.to_json().as_bytes());
        Self(format!("%{}.blake3", hasher.finalize().to_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A published log entry. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub key: MessageKey,
    pub author: FeedId,
    /// Position in the author's log, starting at 1.
    pub sequence: u64,
    pub previous: Option<MessageKey>,
    /// Milliseconds since the Unix epoch, as claimed by the author.
    pub timestamp: u64,
    pub content: Content,
}

impl Message {
    pub fn msg_type(&self) -> &str {
        self.content.msg_type()
    }

    pub fn entry_ref(&self) -> LogEntryRef {
        LogEntryRef {
            sequence: self.sequence,
            key: self.key.clone(),
        }
    }
}

/// Reference to an appended entry, handed back by a publish.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct LogEntryRef {
    pub sequence: u64,
    pub key: MessageKey,
}

impl fmt::Display for LogEntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.sequence, self.key)
    }
}
