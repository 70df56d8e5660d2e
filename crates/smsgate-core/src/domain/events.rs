//! Send notifications relayed to subscribers.
//!
//! Every accepted `SendMessage` call produces exactly one `Starting` event
//! followed by exactly one `Complete` or `Failed` event.  All of them carry the
//! caller identity captured when the call entered the gateway, never the
//! identity of whatever thread happens to raise the notification.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identity::CallerIdentity;

/// Which point of the send lifecycle an event reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SendEventKind {
    /// The modem is about to transmit the unit.
    Starting,
    /// The modem accepted the unit.
    Complete,
    /// The transmission failed.
    Failed {
        /// Human-readable failure cause reported by the driver.
        cause: String,
    },
}

impl SendEventKind {
    /// Short name used in log output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Complete => "complete",
            Self::Failed { .. } => "failed",
        }
    }
}

/// A caller-attributed send notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendEvent {
    pub kind: SendEventKind,
    /// Correlates the `Starting` event with its outcome.
    pub call_id: Uuid,
    pub message: String,
    pub destination: String,
    pub caller: CallerIdentity,
}

impl SendEvent {
    /// Principal name of the caller, `""` when anonymous.
    pub fn caller_name(&self) -> &str {
        self.caller.name()
    }

    /// Failure cause for `Failed` events.
    pub fn failure_cause(&self) -> Option<&str> {
        match &self.kind {
            SendEventKind::Failed { cause } => Some(cause),
            _ => None,
        }
    }
}
