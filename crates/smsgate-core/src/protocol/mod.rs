//! Session protocol spoken between gateway clients and the server.
//!
//! A session starts with a `hello` naming the published service and,
//! optionally, the caller's principal.  The server answers `welcome` or
//! `refused`.  After a `welcome` the client may issue any number of
//! `send_message` calls, each answered by `send_ok` or `send_error` carrying
//! the same `id`.
//!
//! ```text
//! client                               server
//! hello {service, identity}      ──►
//!                                ◄──   welcome {service} | refused {reason}
//! send_message {id, ...}         ──►
//!                                ◄──   send_ok {id} | send_error {id, kind, detail}
//! goodbye                        ──►
//! ```

pub mod codec;
pub mod messages;

pub use codec::{decode_frame, encode_frame, ProtocolError, MAX_FRAME_LEN};
pub use messages::{ClientRequest, RemoteErrorKind, ServerReply};
