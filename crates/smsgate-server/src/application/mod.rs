//! Application layer of the gateway server.
//!
//! Use cases in this layer orchestrate the modem through abstractions and
//! contain no socket, file or device access of their own.
//!
//! # Sub-modules
//!
//! - **`driver`** – The `ModemDriver` port: what the send service needs from a
//!   modem implementation, plus the notifications a driver raises.
//!
//! - **`subscribers`** – Ordered callback lists with add/remove by handle, used
//!   to relay send notifications.
//!
//! - **`send_service`** – `RemoteSendService`: the exclusive, disposal-aware
//!   wrapper that serialises sends onto the one modem and attributes each
//!   notification to the caller that caused it.

pub mod driver;
pub mod send_service;
pub mod subscribers;
