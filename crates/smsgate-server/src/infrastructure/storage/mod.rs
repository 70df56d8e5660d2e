//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration from the platform
//! config directory (or an explicit path), writes it back, and supplies the
//! documented defaults when no file exists yet.

pub mod config;
