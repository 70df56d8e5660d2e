//! smsgate-server library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! ```text
//! caller ──TCP──► RpcListener (AuthorizationGate) ──► RemoteSendService ──► ModemDriver
//!                                                            │
//!   external subscribers ◄── ServerHost ◄── SendNotifications┘
//! ```

pub mod application;
pub mod host;
pub mod infrastructure;

pub use host::{HostError, ServerHost};
