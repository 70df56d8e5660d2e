//! Caller identity and connection endpoint descriptors.

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// The principal associated with one remote invocation.
///
/// The identity is captured when a call enters the gateway and travels with
/// every notification produced for that call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallerIdentity {
    /// No principal was presented.
    #[default]
    Anonymous,
    /// A named principal.
    Named(String),
}

impl CallerIdentity {
    /// Builds an identity from an optional principal name.
    ///
    /// `None` and blank names both map to [`CallerIdentity::Anonymous`].
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some(n) if !n.is_empty() => Self::Named(n.to_string()),
            _ => Self::Anonymous,
        }
    }

    /// Returns `true` for the anonymous identity.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Returns the principal name, or `""` for the anonymous identity.
    pub fn name(&self) -> &str {
        match self {
            Self::Anonymous => "",
            Self::Named(name) => name,
        }
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("<anonymous>"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Network-level description of a connecting caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEndpoint {
    /// Address of the remote peer.
    pub peer: SocketAddr,
    /// Local address the connection was accepted on.
    pub local: SocketAddr,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_maps_none_to_anonymous() {
        assert_eq!(CallerIdentity::from_name(None), CallerIdentity::Anonymous);
    }

    #[test]
    fn test_from_name_maps_blank_to_anonymous() {
        assert_eq!(CallerIdentity::from_name(Some("   ")), CallerIdentity::Anonymous);
    }

    #[test]
    fn test_from_name_trims_named_principal() {
        let identity = CallerIdentity::from_name(Some(" alice "));
        assert_eq!(identity, CallerIdentity::Named("alice".to_string()));
        assert!(!identity.is_anonymous());
    }

    #[test]
    fn test_anonymous_name_is_empty() {
        assert_eq!(CallerIdentity::Anonymous.name(), "");
        assert_eq!(CallerIdentity::Anonymous.to_string(), "<anonymous>");
    }

    #[test]
    fn test_identity_serializes_as_tagged_value() {
        let json = serde_json::to_string(&CallerIdentity::Named("bob".into())).unwrap();
        assert_eq!(json, r#"{"named":"bob"}"#);
        let json = serde_json::to_string(&CallerIdentity::Anonymous).unwrap();
        assert_eq!(json, r#""anonymous""#);
    }
}
