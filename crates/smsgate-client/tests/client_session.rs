//! Client behaviour against a scripted gateway.

use std::net::SocketAddr;

use smsgate_client::{ClientError, GatewayClient};
use smsgate_core::{decode_frame, encode_frame, ClientRequest, RemoteErrorKind, ServerReply};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Accepts one connection, answers each received frame with the next scripted
/// reply, and returns every frame it received.
async fn scripted_gateway(replies: Vec<ServerReply>) -> (SocketAddr, JoinHandle<Vec<ClientRequest>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let mut received = Vec::new();
        let mut replies = replies.into_iter();
        while let Ok(Some(line)) = lines.next_line().await {
            received.push(decode_frame::<ClientRequest>(&line).unwrap());
            match replies.next() {
                Some(reply) => write_half
                    .write_all(&encode_frame(&reply).unwrap())
                    .await
                    .unwrap(),
                None => {
                    if matches!(received.last(), Some(ClientRequest::Goodbye)) {
                        break;
                    }
                }
            }
        }
        received
    });
    (addr, handle)
}

fn welcome() -> ServerReply {
    ServerReply::Welcome {
        service: "SMSSender".to_string(),
    }
}

#[tokio::test]
async fn test_hello_carries_service_and_identity() {
    // Arrange
    let (addr, gateway) = scripted_gateway(vec![welcome()]).await;

    // Act
    let client = GatewayClient::connect(addr, "SMSSender", Some("alice"))
        .await
        .unwrap();
    client.close().await.unwrap();
    let received = gateway.await.unwrap();

    // Assert
    assert_eq!(
        received,
        vec![
            ClientRequest::Hello {
                service: "SMSSender".to_string(),
                identity: Some("alice".to_string()),
            },
            ClientRequest::Goodbye,
        ]
    );
}

#[tokio::test]
async fn test_refused_hello_is_refused_error() {
    let (addr, _gateway) = scripted_gateway(vec![ServerReply::Refused {
        reason: "caller not authorized".to_string(),
    }])
    .await;

    let result = GatewayClient::connect(addr, "SMSSender", None).await;

    assert!(matches!(result, Err(ClientError::Refused(ref r)) if r == "caller not authorized"));
}

#[tokio::test]
async fn test_send_ids_increase_and_unicode_flag_is_sent() {
    // Arrange
    let (addr, gateway) = scripted_gateway(vec![
        welcome(),
        ServerReply::SendOk { id: 1 },
        ServerReply::SendOk { id: 2 },
    ])
    .await;
    let mut client = GatewayClient::connect(addr, "SMSSender", None).await.unwrap();

    // Act
    client.send_message("hi", "+491701234567", false).await.unwrap();
    client.send_message("hi", "+491701234567", true).await.unwrap();
    client.close().await.unwrap();
    let received = gateway.await.unwrap();

    // Assert
    assert!(matches!(
        received[1],
        ClientRequest::SendMessage { id: 1, unicode: false, .. }
    ));
    assert!(matches!(
        received[2],
        ClientRequest::SendMessage { id: 2, unicode: true, .. }
    ));
}

#[tokio::test]
async fn test_send_error_becomes_remote_error() {
    let (addr, _gateway) = scripted_gateway(vec![
        welcome(),
        ServerReply::SendError {
            id: 1,
            kind: RemoteErrorKind::SendFailure,
            detail: "no carrier".to_string(),
        },
    ])
    .await;
    let mut client = GatewayClient::connect(addr, "SMSSender", None).await.unwrap();

    let result = client.send_message("hi", "+491701234567", false).await;

    assert!(matches!(
        result,
        Err(ClientError::Remote {
            kind: RemoteErrorKind::SendFailure,
            ..
        })
    ));
}

#[tokio::test]
async fn test_mismatched_reply_id_is_unexpected() {
    let (addr, _gateway) =
        scripted_gateway(vec![welcome(), ServerReply::SendOk { id: 99 }]).await;
    let mut client = GatewayClient::connect(addr, "SMSSender", None).await.unwrap();

    let result = client.send_message("hi", "+491701234567", false).await;

    assert!(matches!(result, Err(ClientError::Unexpected(_))));
}

#[tokio::test]
async fn test_connect_to_closed_port_is_connect_failed() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let result = GatewayClient::connect(addr, "SMSSender", None).await;

    assert!(matches!(result, Err(ClientError::ConnectFailed { .. })));
}
