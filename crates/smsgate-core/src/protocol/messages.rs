//! Request and reply messages of the session protocol.
//!
//! Both enums are serialised as JSON objects with a `type` tag, e.g.
//!
//! ```json
//! {"type":"send_message","id":7,"message":"hi","destination":"+491701234567","unicode":false}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::identity::CallerIdentity;
use crate::domain::request::SendRequest;

/// Messages sent from a client to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Opens a session against a published service.
    Hello {
        service: String,
        /// Principal name; absent for anonymous callers.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identity: Option<String>,
    },
    /// Requests one outbound short message.
    SendMessage {
        id: u64,
        message: String,
        destination: String,
        /// `true` selects UCS-2; omitted means the default alphabet.
        #[serde(default)]
        unicode: bool,
    },
    /// Ends the session.
    Goodbye,
}

impl ClientRequest {
    /// Caller identity announced by a `hello`.
    pub fn hello_identity(&self) -> Option<CallerIdentity> {
        match self {
            Self::Hello { identity, .. } => Some(CallerIdentity::from_name(identity.as_deref())),
            _ => None,
        }
    }

    /// Builds the domain request carried by a `send_message`.
    pub fn as_send_request(&self) -> Option<(u64, SendRequest)> {
        match self {
            Self::SendMessage {
                id,
                message,
                destination,
                unicode,
            } => Some((
                *id,
                SendRequest::new(message.clone(), destination.clone()).unicode(*unicode),
            )),
            _ => None,
        }
    }

    /// Short type name for log output; never includes field values.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::SendMessage { .. } => "send_message",
            Self::Goodbye => "goodbye",
        }
    }
}

/// Category of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The service has been shut down.
    ResourceDisposed,
    /// The modem reported a failure while transmitting.
    SendFailure,
    /// The message or destination could not be encoded.
    InvalidMessage,
    /// No service is currently published under the requested name.
    ServiceUnavailable,
}

/// Messages sent from the gateway to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerReply {
    Welcome { service: String },
    Refused { reason: String },
    SendOk { id: u64 },
    SendError {
        id: u64,
        kind: RemoteErrorKind,
        detail: String,
    },
}
