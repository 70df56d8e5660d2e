//! A remote caller sending through a running gateway over TCP.

use std::sync::{Arc, Mutex};

use smsgate_client::{ClientError, GatewayClient};
use smsgate_core::{CallerIdentity, RemoteErrorKind, SendEvent, SendEventKind};
use smsgate_server::application::subscribers::NotificationKind;
use smsgate_server::infrastructure::modem::simulated::{
    ModemProbe, SimulatedBehaviour, SimulatedModemFactory,
};
use smsgate_server::infrastructure::storage::config::GatewayConfig;
use smsgate_server::ServerHost;

struct Gateway {
    host: ServerHost,
    probe: ModemProbe,
    events: Arc<Mutex<Vec<SendEvent>>>,
}

impl Gateway {
    fn start(configure: impl FnOnce(&mut GatewayConfig)) -> Self {
        let mut config = GatewayConfig::default();
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.port = 0;
        configure(&mut config);

        let factory = SimulatedModemFactory::default();
        let probe = factory.probe();
        let mut host = ServerHost::new(config, Arc::new(factory));

        let events = Arc::new(Mutex::new(Vec::new()));
        for kind in NotificationKind::ALL {
            let events = Arc::clone(&events);
            host.subscribe(
                kind,
                Arc::new(move |e: &SendEvent| events.lock().unwrap().push(e.clone())),
            );
        }
        host.start().unwrap();
        Self {
            host,
            probe,
            events,
        }
    }

    fn addr(&self) -> std::net::SocketAddr {
        self.host.local_addr().unwrap()
    }

    fn events(&self) -> Vec<SendEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn test_anonymous_send_reports_starting_then_complete() {
    // Arrange
    let gateway = Gateway::start(|_| {});
    let mut client = GatewayClient::connect(gateway.addr(), "SMSSender", None)
        .await
        .unwrap();

    // Act
    client
        .send_message("hi", "+491701234567", false)
        .await
        .unwrap();
    client.close().await.unwrap();

    // Assert
    let events = gateway.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, SendEventKind::Starting);
    assert_eq!(events[1].kind, SendEventKind::Complete);
    for event in &events {
        assert_eq!(event.message, "hi");
        assert_eq!(event.destination, "+491701234567");
        assert_eq!(event.caller, CallerIdentity::Anonymous);
        assert_eq!(event.caller_name(), "");
    }
    assert_eq!(events[0].call_id, events[1].call_id);
}

#[tokio::test]
async fn test_unicode_flag_selects_data_coding_scheme() {
    // Arrange
    let gateway = Gateway::start(|_| {});
    let mut client = GatewayClient::connect(gateway.addr(), "SMSSender", None)
        .await
        .unwrap();

    // Act
    client.send_message("hi", "+491701234567", true).await.unwrap();
    client.send_message("hi", "+491701234567", false).await.unwrap();
    client.close().await.unwrap();

    // Assert
    let sent = gateway.probe.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].data_coding_scheme(), 8);
    assert_eq!(sent[1].data_coding_scheme(), 0);
}

#[tokio::test]
async fn test_secured_gateway_refuses_anonymous_caller() {
    // Arrange
    let gateway = Gateway::start(|c| c.server.secured = true);

    // Act
    let result = GatewayClient::connect(gateway.addr(), "SMSSender", None).await;

    // Assert
    assert!(matches!(result, Err(ClientError::Refused(_))));
    assert!(gateway.probe.sent().is_empty());
    assert!(gateway.events().is_empty());
}

#[tokio::test]
async fn test_secured_gateway_with_anonymous_allowed_admits_anyone() {
    let gateway = Gateway::start(|c| {
        c.server.secured = true;
        c.server.allow_anonymous = true;
    });

    let client = GatewayClient::connect(gateway.addr(), "SMSSender", None).await;

    assert!(client.is_ok());
}

#[tokio::test]
async fn test_named_caller_is_attributed_in_events() {
    // Arrange
    let gateway = Gateway::start(|c| c.server.secured = true);
    let mut client = GatewayClient::connect(gateway.addr(), "SMSSender", Some("alice"))
        .await
        .unwrap();

    // Act
    client
        .send_message("hi", "+491701234567", false)
        .await
        .unwrap();
    client.close().await.unwrap();

    // Assert
    let events = gateway.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.caller_name() == "alice"));
}

#[tokio::test]
async fn test_modem_failure_reaches_caller_and_subscribers() {
    // Arrange
    let gateway = Gateway::start(|_| {});
    gateway.probe.set_behaviour(SimulatedBehaviour {
        fail_sends: Some("+CMS ERROR: 38".to_string()),
        ..SimulatedBehaviour::default()
    });
    let mut client = GatewayClient::connect(gateway.addr(), "SMSSender", None)
        .await
        .unwrap();

    // Act
    let result = client.send_message("hi", "+491701234567", false).await;

    // Assert
    assert!(matches!(
        result,
        Err(ClientError::Remote {
            kind: RemoteErrorKind::SendFailure,
            ..
        })
    ));
    let events = gateway.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, SendEventKind::Starting);
    assert_eq!(events[1].failure_cause(), Some("+CMS ERROR: 38"));
}

#[tokio::test]
async fn test_concurrent_clients_are_serialised_on_the_modem() {
    // Arrange
    let gateway = Gateway::start(|_| {});
    gateway.probe.set_behaviour(SimulatedBehaviour {
        send_delay: std::time::Duration::from_millis(5),
        ..SimulatedBehaviour::default()
    });
    let addr = gateway.addr();

    // Act
    let tasks: Vec<_> = (0..10)
        .map(|i| {
            tokio::spawn(async move {
                let name = format!("caller{i}");
                let mut client = GatewayClient::connect(addr, "SMSSender", Some(&name))
                    .await
                    .unwrap();
                client
                    .send_message(&format!("msg {i}"), "+491701234567", false)
                    .await
                    .unwrap();
                client.close().await.unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    // Assert
    let events = gateway.events();
    let starting = events
        .iter()
        .filter(|e| e.kind == SendEventKind::Starting)
        .count();
    assert_eq!(starting, 10);
    assert_eq!(events.len(), 20);
    assert_eq!(gateway.probe.overlapping_sends(), 0);
    for event in &events {
        let n = event.message.trim_start_matches("msg ");
        assert_eq!(event.caller_name(), format!("caller{n}"));
    }
}
