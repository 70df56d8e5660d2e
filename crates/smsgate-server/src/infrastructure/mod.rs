//! Infrastructure layer for the gateway server.
//!
//! Contains the OS-facing adapters: the TCP listener, the modem drivers, the
//! authorization gate installed on the listener, and file-system storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `smsgate_core`, but MUST NOT be imported by the `application` layer
//! (tests excepted).

pub mod auth;
pub mod modem;
pub mod network;
pub mod storage;
