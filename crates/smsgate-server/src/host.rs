//! `ServerHost`: owns the configuration and the Running/Stopped lifecycle.
//!
//! Start builds, in order: the authorization gate (secured only), the bound
//! listener, the send service with its open modem, the relay subscriptions
//! that re-raise the service's notifications to the host's own subscribers,
//! and finally the publication under the service name.  The relays exist
//! before any remote call can reach the service.  A failure at any step
//! releases whatever the attempt already acquired.
//!
//! Stop releases the same pieces in reverse.  Each release step runs even if
//! an earlier one failed; the host always ends up Stopped and reports the
//! failed steps afterwards.
//!
//! `start`/`stop` take `&mut self`, so concurrent lifecycle calls on one host
//! are ruled out by the borrow checker rather than by an internal lock.

use std::net::SocketAddr;
use std::sync::Arc;

use smsgate_core::{PduEncoder, SendEvent, SubmitPduEncoder};
use thiserror::Error;
use tracing::{info, warn};

use crate::application::driver::DriverFactory;
use crate::application::send_service::{RemoteSendService, ServiceError};
use crate::application::subscribers::{
    NotificationKind, SendCallback, SendNotifications, SubscriptionId,
};
use crate::infrastructure::auth::{AuthorizationGate, ConnectionAuthorizer};
use crate::infrastructure::network::{NetworkError, RpcListener};
use crate::infrastructure::storage::config::GatewayConfig;

/// Errors returned by [`ServerHost`] lifecycle operations.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("the gateway is already running")]
    AlreadyRunning,

    #[error("the gateway is not running")]
    NotRunning,

    #[error("failed to bind the listener: {0}")]
    ListenerBindFailure(#[source] NetworkError),

    #[error("failed to start the send service: {0}")]
    Service(#[from] ServiceError),

    /// Stop completed but some release steps failed.
    #[error("gateway stopped with {} cleanup failure(s): {}", .failures.len(), .failures.join("; "))]
    Cleanup { failures: Vec<String> },
}

/// Everything that exists only while the host is Running.
struct RunningGateway {
    service_name: String,
    listener: RpcListener,
    service: Arc<RemoteSendService>,
    relays: Vec<(NotificationKind, SubscriptionId)>,
}

impl RunningGateway {
    /// Best-effort teardown.  Returns a description of every step that failed.
    fn release(mut self) -> Vec<String> {
        let mut failures = Vec::new();

        if !self.listener.unpublish(&self.service_name) {
            failures.push(format!("service {:?} was not published", self.service_name));
        }
        if let Err(e) = self.service.shutdown() {
            failures.push(e.to_string());
        }
        for (kind, id) in self.relays.drain(..) {
            if !self.service.unsubscribe(kind, id) {
                failures.push(format!("relay subscription for {kind:?} was already gone"));
            }
        }
        self.listener.shutdown();

        for failure in &failures {
            warn!("cleanup: {failure}");
        }
        failures
    }
}

/// Hosts one [`RemoteSendService`] on one listener.
pub struct ServerHost {
    config: GatewayConfig,
    driver_factory: Arc<dyn DriverFactory>,
    encoder: Arc<dyn PduEncoder>,
    notifications: Arc<SendNotifications>,
    running: Option<RunningGateway>,
}

impl ServerHost {
    /// Creates a stopped host.  `driver_factory` is asked for a fresh modem
    /// driver on every start.
    pub fn new(config: GatewayConfig, driver_factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            config,
            driver_factory,
            encoder: Arc::new(SubmitPduEncoder::new()),
            notifications: Arc::new(SendNotifications::new()),
            running: None,
        }
    }

    /// Replaces the PDU encoder used from the next start on.
    pub fn with_encoder(mut self, encoder: Arc<dyn PduEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Mutable access to the configuration.  Changes made while running take
    /// effect at the next [`Self::start`].
    pub fn config_mut(&mut self) -> &mut GatewayConfig {
        &mut self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The bound listener address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|gw| gw.listener.local_addr())
    }

    /// Registers an external subscriber.  Subscriptions survive restarts.
    pub fn subscribe(&self, kind: NotificationKind, callback: SendCallback) -> SubscriptionId {
        self.notifications.subscribe(kind, callback)
    }

    pub fn unsubscribe(&self, kind: NotificationKind, id: SubscriptionId) -> bool {
        self.notifications.unsubscribe(kind, id)
    }

    /// Brings the gateway up.
    ///
    /// # Errors
    ///
    /// - [`HostError::AlreadyRunning`] if already running; nothing changes.
    /// - [`HostError::ListenerBindFailure`] if the port cannot be bound.
    /// - [`HostError::Service`] if the modem cannot be opened; the listener
    ///   has been released again.
    pub fn start(&mut self) -> Result<(), HostError> {
        if self.running.is_some() {
            return Err(HostError::AlreadyRunning);
        }
        let server = &self.config.server;

        let gate: Option<Arc<dyn ConnectionAuthorizer>> = if server.secured {
            Some(Arc::new(AuthorizationGate::new(server.allow_anonymous)))
        } else {
            None
        };

        let mut listener = RpcListener::bind(&server.listener_config(), gate)
            .map_err(HostError::ListenerBindFailure)?;

        let service = match RemoteSendService::open(
            self.driver_factory.create(),
            Arc::clone(&self.encoder),
            &self.config.modem.port_settings(),
        ) {
            Ok(service) => Arc::new(service),
            Err(e) => {
                listener.shutdown();
                return Err(e.into());
            }
        };

        let relays = NotificationKind::ALL
            .iter()
            .map(|&kind| {
                let external = Arc::clone(&self.notifications);
                let relay: SendCallback = Arc::new(move |event: &SendEvent| external.emit(event));
                (kind, service.subscribe(kind, relay))
            })
            .collect();
        listener.publish(&server.service_name, &service);

        info!(
            service = %server.service_name,
            addr = %listener.local_addr(),
            secured = server.secured,
            "gateway running"
        );
        self.running = Some(RunningGateway {
            service_name: server.service_name.clone(),
            listener,
            service,
            relays,
        });
        Ok(())
    }

    /// Takes the gateway down.
    ///
    /// # Errors
    ///
    /// - [`HostError::NotRunning`] if the host is stopped.
    /// - [`HostError::Cleanup`] if any release step failed.  The host is
    ///   Stopped regardless.
    pub fn stop(&mut self) -> Result<(), HostError> {
        let gateway = self.running.take().ok_or(HostError::NotRunning)?;
        let failures = gateway.release();
        info!("gateway stopped");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(HostError::Cleanup { failures })
        }
    }
}

impl Drop for ServerHost {
    fn drop(&mut self) {
        if let Some(gateway) = self.running.take() {
            gateway.release();
            info!("gateway released on drop");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::modem::simulated::{SimulatedBehaviour, SimulatedModemFactory};

    fn test_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.port = 0;
        config
    }

    #[test]
    fn test_new_host_is_stopped() {
        let host = ServerHost::new(test_config(), Arc::new(SimulatedModemFactory::default()));
        assert!(!host.is_running());
        assert!(host.local_addr().is_none());
    }

    #[test]
    fn test_stop_on_fresh_host_is_not_running() {
        let mut host = ServerHost::new(test_config(), Arc::new(SimulatedModemFactory::default()));
        assert!(matches!(host.stop(), Err(HostError::NotRunning)));
    }

    #[test]
    fn test_second_start_is_already_running_and_changes_nothing() {
        // Arrange
        let factory = SimulatedModemFactory::default();
        let probe = factory.probe();
        let mut host = ServerHost::new(test_config(), Arc::new(factory));
        host.start().unwrap();
        let addr = host.local_addr();

        // Act
        let second = host.start();

        // Assert
        assert!(matches!(second, Err(HostError::AlreadyRunning)));
        assert!(host.is_running());
        assert_eq!(host.local_addr(), addr);
        assert_eq!(probe.open_count(), 1);
        assert!(probe.is_open());
    }

    #[test]
    fn test_stop_closes_modem_and_detaches_driver_handler() {
        let factory = SimulatedModemFactory::default();
        let probe = factory.probe();
        let mut host = ServerHost::new(test_config(), Arc::new(factory));
        host.start().unwrap();
        assert_eq!(probe.handler_count(), 1);

        host.stop().unwrap();

        assert!(!host.is_running());
        assert!(!probe.is_open());
        assert_eq!(probe.handler_count(), 0);
    }

    #[test]
    fn test_open_failure_leaves_host_stopped_and_port_free() {
        // Arrange
        let factory = SimulatedModemFactory::new(SimulatedBehaviour {
            fail_open: true,
            ..SimulatedBehaviour::default()
        });
        let probe = factory.probe();
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut config = test_config();
        config.server.port = port;
        let mut host = ServerHost::new(config, Arc::new(factory));

        // Act
        let result = host.start();

        // Assert
        assert!(matches!(
            result,
            Err(HostError::Service(ServiceError::ResourceOpenFailure { .. }))
        ));
        assert!(!host.is_running());
        assert_eq!(probe.handler_count(), 0);
        assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());
    }

    #[test]
    fn test_bind_failure_is_reported_without_opening_modem() {
        // Arrange
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let factory = SimulatedModemFactory::default();
        let probe = factory.probe();
        let mut config = test_config();
        config.server.port = blocker.local_addr().unwrap().port();
        let mut host = ServerHost::new(config, Arc::new(factory));

        // Act
        let result = host.start();

        // Assert
        assert!(matches!(result, Err(HostError::ListenerBindFailure(_))));
        assert_eq!(probe.open_count(), 0);
        assert!(!host.is_running());
    }

    #[test]
    fn test_config_changes_apply_on_next_start() {
        let mut host = ServerHost::new(test_config(), Arc::new(SimulatedModemFactory::default()));
        host.start().unwrap();

        host.config_mut().server.service_name = "Renamed".to_string();
        assert_eq!(host.config().server.service_name, "Renamed");
        host.stop().unwrap();
        host.start().unwrap();

        assert!(host.is_running());
    }

    #[test]
    fn test_drop_releases_running_gateway() {
        let factory = SimulatedModemFactory::default();
        let probe = factory.probe();
        {
            let mut host = ServerHost::new(test_config(), Arc::new(factory));
            host.start().unwrap();
            assert!(probe.is_open());
        }
        assert!(!probe.is_open());
        assert_eq!(probe.handler_count(), 0);
    }

    #[test]
    fn test_failing_close_still_completes_stop_and_allows_restart() {
        // Arrange
        let factory = SimulatedModemFactory::new(SimulatedBehaviour {
            fail_close: true,
            ..SimulatedBehaviour::default()
        });
        let probe = factory.probe();
        let mut host = ServerHost::new(test_config(), Arc::new(factory));
        host.start().unwrap();
        let addr = host.local_addr().unwrap();

        // Act
        let stopped = host.stop();

        // Assert
        match stopped {
            Err(HostError::Cleanup { failures }) => {
                assert_eq!(failures, vec!["failed to close modem".to_string()]);
            }
            other => panic!("expected cleanup failure, got {other:?}"),
        }
        assert!(!host.is_running());
        assert_eq!(probe.handler_count(), 0);
        assert!(std::net::TcpListener::bind(addr).is_ok());

        host.start().unwrap();
        assert!(host.is_running());
        assert_eq!(probe.open_count(), 2);
        assert_eq!(probe.handler_count(), 1);
    }

    #[test]
    fn test_cleanup_error_lists_failures() {
        let err = HostError::Cleanup {
            failures: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "gateway stopped with 2 cleanup failure(s): a; b"
        );
    }
}
