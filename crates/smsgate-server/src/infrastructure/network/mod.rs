//! Network infrastructure for the gateway server.
//!
//! # Sub-modules
//!
//! - **`listener`** – Binds the TCP port, accepts connections on a dedicated
//!   thread and serves each caller on its own thread: `hello` handshake
//!   (checked by the authorization gate when the server is secured), then
//!   `send_message` calls dispatched to the published `RemoteSendService`.

pub mod listener;

pub use listener::{ListenerConfig, NetworkError, RpcListener};
