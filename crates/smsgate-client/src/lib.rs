//! # smsgate-client
//!
//! Async client for the SMS gateway session protocol.
//!
//! ```no_run
//! use smsgate_client::GatewayClient;
//!
//! # async fn example() -> Result<(), smsgate_client::ClientError> {
//! let mut client = GatewayClient::connect("127.0.0.1:2000", "SMSSender", Some("alice")).await?;
//! client.send_message("hi", "+491701234567", false).await?;
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;

use smsgate_core::{
    decode_frame, encode_frame, ClientRequest, ProtocolError, RemoteErrorKind, ServerReply,
};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/// Errors returned by [`GatewayClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The gateway declined the session or ended it.
    #[error("refused by gateway: {0}")]
    Refused(String),

    /// The call reached the gateway and failed there.
    #[error("gateway reported {kind:?}: {detail}")]
    Remote {
        kind: RemoteErrorKind,
        detail: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The gateway answered with a frame that does not fit the request.
    #[error("unexpected reply: {0}")]
    Unexpected(String),

    #[error("connection closed by gateway")]
    Closed,
}

/// One session with a published send service.
pub struct GatewayClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    service: String,
    next_id: u64,
}

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("service", &self.service)
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// Connects to `addr` and opens a session on `service`.
    ///
    /// `identity` is the principal name presented to the gateway; `None`
    /// connects anonymously.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectFailed`] if the TCP connection fails and
    /// [`ClientError::Refused`] if the gateway declines the session.
    pub async fn connect<A>(
        addr: A,
        service: &str,
        identity: Option<&str>,
    ) -> Result<Self, ClientError>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ClientError::ConnectFailed {
                addr: addr.to_string(),
                source,
            })?;
        let (read_half, writer) = stream.into_split();
        let mut client = Self {
            lines: BufReader::new(read_half).lines(),
            writer,
            service: service.to_string(),
            next_id: 1,
        };

        let hello = ClientRequest::Hello {
            service: service.to_string(),
            identity: identity.map(str::to_string),
        };
        match client.round_trip(&hello).await? {
            ServerReply::Welcome { .. } => {
                debug!("session opened on {service} at {addr}");
                Ok(client)
            }
            ServerReply::Refused { reason } => Err(ClientError::Refused(reason)),
            other => Err(ClientError::Unexpected(format!("{other:?}"))),
        }
    }

    /// Name of the service this session is bound to.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Asks the gateway to send `message` to `destination`.
    ///
    /// `unicode` selects UCS-2 encoding; `false` uses the GSM default
    /// alphabet.  Returns once the modem has finished with the message.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Remote`] when the gateway reports a failure.
    pub async fn send_message(
        &mut self,
        message: &str,
        destination: &str,
        unicode: bool,
    ) -> Result<(), ClientError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = ClientRequest::SendMessage {
            id,
            message: message.to_string(),
            destination: destination.to_string(),
            unicode,
        };
        match self.round_trip(&request).await? {
            ServerReply::SendOk { id: got } if got == id => Ok(()),
            ServerReply::SendError {
                id: got,
                kind,
                detail,
            } if got == id => Err(ClientError::Remote { kind, detail }),
            ServerReply::Refused { reason } => Err(ClientError::Refused(reason)),
            other => Err(ClientError::Unexpected(format!("{other:?}"))),
        }
    }

    /// Ends the session politely.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.write(&ClientRequest::Goodbye).await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    async fn write(&mut self, request: &ClientRequest) -> Result<(), ClientError> {
        let frame = encode_frame(request)?;
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn round_trip(&mut self, request: &ClientRequest) -> Result<ServerReply, ClientError> {
        self.write(request).await?;
        loop {
            let line = self.lines.next_line().await?.ok_or(ClientError::Closed)?;
            match decode_frame::<ServerReply>(&line) {
                Ok(reply) => return Ok(reply),
                Err(ProtocolError::EmptyFrame) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
