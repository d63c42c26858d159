//! Identities and message payloads.
//!
//! - [`ClientId`] is derived by the routing hook and must be stable across
//!   reconnects for sticky routing to work.
//! - [`RouterId`] and [`WorkerId`] name actor instances; they are minted by
//!   an [`ActorNamespace`](super::ActorNamespace).
//! - [`Message`] is what sockets exchange; JSON values are serialized to
//!   text before delivery.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// An identity usable as the key of an actor namespace.
pub trait ActorIdentity:
    Clone + Eq + Hash + Ord + fmt::Debug + fmt::Display + From<String> + 'static
{
    /// The identity as a string.
    fn as_str(&self) -> &str;
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Debug)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a string identity.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The identity as a string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Stable identity of one logical client.
    ClientId
}

string_id! {
    /// Identity of a RoutingActor instance.
    RouterId
}

string_id! {
    /// Identity of a WorkerActor instance.
    WorkerId
}

impl ActorIdentity for RouterId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

impl ActorIdentity for WorkerId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of one socket within a worker.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A socket message: plain text or structured JSON.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Sent as-is.
    Text(String),
    /// Serialized to JSON text before sending.
    Json(serde_json::Value),
}

impl Message {
    /// The wire text of this message.
    pub fn into_text(self) -> String {
        match self {
            Message::Text(text) => text,
            Message::Json(value) => value.to_string(),
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<serde_json::Value> for Message {
    fn from(value: serde_json::Value) -> Self {
        Message::Json(value)
    }
}
