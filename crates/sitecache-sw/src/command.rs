//! Control messages from controlled pages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A command posted by a controlled page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Delete every cache, then reply `{success: true}`.
    ClearCache,
    /// Run content sync. No reply.
    SyncContent,
    /// Send the skip-waiting signal. No reply.
    SkipWaiting,
}

impl Command {
    /// Parse a posted message. Anything that is not a known command is
    /// logged and ignored.
    pub fn parse(message: &Value) -> Option<Self> {
        match Command::deserialize(message) {
            Ok(command) => Some(command),
            Err(e) => {
                let kind = message
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("<none>");
                warn!(
                    kind,
                    error = %e,
                    "Ignoring unrecognized message"
                );
                None
            }
        }
    }
}

/// Acknowledgement sent on a command's reply channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    pub success: bool,
}
