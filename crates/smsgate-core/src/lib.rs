//! # smsgate-core
//!
//! Shared library for the SMS gateway containing the domain values exchanged
//! between the gateway server and its callers, the SMS-SUBMIT PDU encoder, and
//! the line-delimited JSON wire protocol.
//!
//! This crate is used by both the server and the client.  It has no
//! dependencies on sockets, serial devices, or the async runtime.
//!
//! # Architecture overview
//!
//! The gateway exposes one GSM modem attached to the server machine as a
//! network endpoint.  Remote callers ask it to send short messages; the server
//! serialises those requests onto the modem and reports the outcome back as
//! notifications.
//!
//! - **`domain`** – Caller identities, send requests and the send notification
//!   events relayed to subscribers.
//!
//! - **`pdu`** – Turns a message text and a destination number into the
//!   GSM 03.40 SMS-SUBMIT unit the modem transmits.  The encoding mode picks
//!   the data coding scheme: GSM 7-bit default alphabet or UCS-2.
//!
//! - **`protocol`** – The session messages spoken over TCP and the codec that
//!   frames them as one JSON object per line.

pub mod domain;
pub mod pdu;
pub mod protocol;

pub use domain::events::{SendEvent, SendEventKind};
pub use domain::identity::{CallerIdentity, ConnectionEndpoint};
pub use domain::request::{EncodingMode, SendRequest};
pub use pdu::encoder::{EncodeError, OutgoingPdu, PduEncoder, SubmitPduEncoder};
pub use protocol::codec::{decode_frame, encode_frame, ProtocolError};
pub use protocol::messages::{ClientRequest, RemoteErrorKind, ServerReply};
