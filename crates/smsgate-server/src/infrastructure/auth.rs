//! Connection authorization.
//!
//! The listener consults a [`ConnectionAuthorizer`] twice per connection: once
//! with the network endpoint as soon as the socket is accepted, and once with
//! the caller identity carried by the `hello` frame.  A `false` answer from
//! either check is turned into a `refused` reply and the connection is closed;
//! denial is never an error at this layer.
//!
//! The identity is asserted by the client, not authenticated.  The session
//! protocol carries no credentials, so a secured gateway only separates
//! anonymous callers from callers that claim a name; any caller can claim any
//! name.  Deployments that need real authentication must put it in front of
//! the listener, e.g. a TLS-terminating proxy with client certificates, or in
//! a custom [`ConnectionAuthorizer`] that checks endpoints.

use smsgate_core::{CallerIdentity, ConnectionEndpoint};

/// Decides which callers may use the published service.
///
/// Implementations must be stateless after construction; the listener calls
/// them concurrently from every connection thread.
pub trait ConnectionAuthorizer: Send + Sync {
    /// Network-level admission check.
    fn is_endpoint_authorized(&self, endpoint: &ConnectionEndpoint) -> bool;

    /// Identity-level admission check.
    fn is_identity_authorized(&self, identity: &CallerIdentity, allow_anonymous: bool) -> bool;

    /// The `allow_anonymous` flag captured at construction.
    fn allow_anonymous(&self) -> bool;

    /// Applies [`Self::is_identity_authorized`] with the captured flag.
    fn admits(&self, identity: &CallerIdentity) -> bool {
        self.is_identity_authorized(identity, self.allow_anonymous())
    }
}

/// Baseline gate installed when the server runs secured.
///
/// Every endpoint is admitted.  Identities are admitted unless they are
/// anonymous and anonymous access is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationGate {
    allow_anonymous: bool,
}

impl AuthorizationGate {
    pub fn new(allow_anonymous: bool) -> Self {
        Self { allow_anonymous }
    }
}

impl ConnectionAuthorizer for AuthorizationGate {
    fn is_endpoint_authorized(&self, _endpoint: &ConnectionEndpoint) -> bool {
        true
    }

    fn is_identity_authorized(&self, identity: &CallerIdentity, allow_anonymous: bool) -> bool {
        !identity.is_anonymous() || allow_anonymous
    }

    fn allow_anonymous(&self) -> bool {
        self.allow_anonymous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> ConnectionEndpoint {
        ConnectionEndpoint {
            peer: "203.0.113.7:51234".parse().unwrap(),
            local: "127.0.0.1:2000".parse().unwrap(),
        }
    }

    #[test]
    fn test_identity_truth_table() {
        let gate = AuthorizationGate::new(false);
        let named = CallerIdentity::Named("alice".to_string());

        assert!(!gate.is_identity_authorized(&CallerIdentity::Anonymous, false));
        assert!(gate.is_identity_authorized(&CallerIdentity::Anonymous, true));
        assert!(gate.is_identity_authorized(&named, false));
        assert!(gate.is_identity_authorized(&named, true));
    }

    #[test]
    fn test_every_endpoint_is_admitted() {
        assert!(AuthorizationGate::new(false).is_endpoint_authorized(&endpoint()));
        assert!(AuthorizationGate::new(true).is_endpoint_authorized(&endpoint()));
    }

    #[test]
    fn test_admits_uses_captured_flag() {
        // Arrange
        let strict = AuthorizationGate::new(false);
        let relaxed = AuthorizationGate::new(true);

        // Act / Assert
        assert!(!strict.admits(&CallerIdentity::Anonymous));
        assert!(relaxed.admits(&CallerIdentity::Anonymous));
        assert!(strict.admits(&CallerIdentity::from_name(Some("bob"))));
    }

    #[test]
    fn test_blank_claimed_name_counts_as_anonymous() {
        let gate = AuthorizationGate::new(false);

        assert!(!gate.admits(&CallerIdentity::from_name(Some("   "))));
        assert!(gate.admits(&CallerIdentity::from_name(Some("anyone"))));
    }

    #[test]
    fn test_gate_is_shareable_across_threads() {
        use std::sync::Arc;

        let gate: Arc<dyn ConnectionAuthorizer> = Arc::new(AuthorizationGate::new(false));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || gate.admits(&CallerIdentity::Named(format!("user{i}"))))
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
