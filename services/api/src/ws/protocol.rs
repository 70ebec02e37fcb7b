//! Messages the relay itself reads or writes. Everything else crossing the
//! relay is opaque and forwarded untouched.

use serde::{Deserialize, Serialize};

/// `type` of the client's configuration frame and of the upstream session
/// configuration message.
pub const SESSION_UPDATE: &str = "session.update";

/// Largest first client frame inspected for an agent id.
pub const MAX_HELLO_BYTES: usize = 64 * 1024;

/// The client's first frame, decoded tolerantly. Every field is optional;
/// a frame of any other shape simply carries no agent id.
#[derive(Deserialize, Debug, Default)]
pub struct ClientHello {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub session: Option<HelloSession>,
}

#[derive(Deserialize, Debug, Default)]
pub struct HelloSession {
    #[serde(default)]
    pub agent_id: Option<String>,
}

impl ClientHello {
    /// Extracts the agent id from a first text frame, if it has one.
    pub fn agent_id(text: &str) -> Option<String> {
        if text.len() > MAX_HELLO_BYTES {
            return None;
        }
        let hello: ClientHello = serde_json::from_str(text).ok()?;
        if hello.kind.as_deref() != Some(SESSION_UPDATE) {
            return None;
        }
        hello
            .session?
            .agent_id
            .filter(|id| !id.trim().is_empty())
    }
}

/// Frames the relay sends to the client on its own behalf.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// The upstream session is configured and forwarding is about to start.
    #[serde(rename = "proxy.connected")]
    ProxyConnected { message: String },
    /// The session failed and is being closed.
    #[serde(rename = "error")]
    Error { error: ErrorBody },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub message: String,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: ErrorBody {
                message: message.into(),
            },
        }
    }
}
