//! Start/stop cycles of the host as seen by a remote caller.

use std::sync::{Arc, Mutex};

use smsgate_client::{ClientError, GatewayClient};
use smsgate_core::{SendEvent, SendEventKind};
use smsgate_server::application::subscribers::NotificationKind;
use smsgate_server::infrastructure::modem::simulated::SimulatedModemFactory;
use smsgate_server::infrastructure::storage::config::GatewayConfig;
use smsgate_server::{HostError, ServerHost};

fn loopback_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.server.bind_address = "127.0.0.1".to_string();
    config.server.port = 0;
    config
}

fn record(host: &ServerHost) -> Arc<Mutex<Vec<SendEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in NotificationKind::ALL {
        let events = Arc::clone(&events);
        host.subscribe(
            kind,
            Arc::new(move |e: &SendEvent| events.lock().unwrap().push(e.clone())),
        );
    }
    events
}

#[tokio::test]
async fn test_restart_relays_each_event_exactly_once() {
    // Arrange
    let factory = SimulatedModemFactory::default();
    let probe = factory.probe();
    let mut host = ServerHost::new(loopback_config(), Arc::new(factory));
    let events = record(&host);

    host.start().unwrap();
    host.stop().unwrap();
    host.start().unwrap();
    let addr = host.local_addr().unwrap();

    // Act
    let mut client = GatewayClient::connect(addr, "SMSSender", None).await.unwrap();
    client
        .send_message("hi", "+491701234567", false)
        .await
        .unwrap();
    client.close().await.unwrap();

    // Assert
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, SendEventKind::Starting);
    assert_eq!(events[1].kind, SendEventKind::Complete);
    assert_eq!(probe.open_count(), 2);
    assert_eq!(probe.handler_count(), 1);
}

#[tokio::test]
async fn test_stopped_host_refuses_connections() {
    // Arrange
    let mut host = ServerHost::new(loopback_config(), Arc::new(SimulatedModemFactory::default()));
    host.start().unwrap();
    let addr = host.local_addr().unwrap();

    // Act
    host.stop().unwrap();
    let result = GatewayClient::connect(addr, "SMSSender", None).await;

    // Assert
    assert!(matches!(result, Err(ClientError::ConnectFailed { .. })));
}

#[tokio::test]
async fn test_renamed_service_is_served_after_restart() {
    // Arrange
    let mut host = ServerHost::new(loopback_config(), Arc::new(SimulatedModemFactory::default()));
    host.start().unwrap();
    host.config_mut().server.service_name = "Pager".to_string();

    // Act
    host.stop().unwrap();
    host.start().unwrap();
    let addr = host.local_addr().unwrap();
    let old = GatewayClient::connect(addr, "SMSSender", None).await;
    let new = GatewayClient::connect(addr, "Pager", None).await;

    // Assert
    assert!(matches!(old, Err(ClientError::Refused(_))));
    assert_eq!(new.unwrap().service(), "Pager");
}

#[test]
fn test_repeated_cycles_leave_no_driver_handlers_behind() {
    let factory = SimulatedModemFactory::default();
    let probe = factory.probe();
    let mut host = ServerHost::new(loopback_config(), Arc::new(factory));

    for _ in 0..5 {
        host.start().unwrap();
        assert!(matches!(host.start(), Err(HostError::AlreadyRunning)));
        host.stop().unwrap();
        assert!(matches!(host.stop(), Err(HostError::NotRunning)));
    }

    assert_eq!(probe.open_count(), 5);
    assert_eq!(probe.handler_count(), 0);
    assert!(!probe.is_open());
}
