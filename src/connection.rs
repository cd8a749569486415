//! WebSocket connection driver: composes the handshake engine and frame
//! codec over a caller-supplied byte stream.
//!
//! The driver owns the per-connection accumulator (inside `Framed`) and the
//! connection lifecycle: handshake, streaming, close. It never opens sockets;
//! the caller hands in anything that reads and writes bytes. Fragmented
//! messages are out of scope, so every outgoing message is a single frame and
//! an incoming continuation frame is a protocol violation.

use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio_util::codec::Framed;

use crate::codec::{EndpointType, Frame, Opcode, WebsocketCodec};
use crate::envelope::Envelope;
use crate::errors::ConnectionError;
use crate::handshake::{self, HandshakeRequest, HttpHead};

// Trait alias for the boxed stream type used in Connection
pub trait WebSocketStream: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin {}
impl<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin> WebSocketStream for T {}

/// Cap on buffered handshake bytes before the head terminator arrives.
const MAX_HANDSHAKE_BYTES: usize = 8192;

/// A message returned to end-users from a WebSocket connection.
#[derive(Debug, Clone, PartialEq)]
pub enum WebsocketMessage {
    /// A string of text
    Text(String),
    /// A block of binary data
    Binary(Vec<u8>),
    /// A close operation
    Close(Option<(CloseReason, String)>),
    /// Response to ping
    Pong(Vec<u8>),
    /// A ping
    Ping(Vec<u8>),
}

/// A websocket connection over a caller-supplied stream.
pub struct Connection {
    framed: Framed<Box<dyn WebSocketStream + Send>, WebsocketCodec>,
    closed: bool,
    last_ping: Option<Vec<u8>>,
}

impl Connection {
    /// Perform the client opening handshake over `stream` and return a
    /// streaming connection.
    ///
    /// `host` and `port` fill in the request's `Host` header; the stream
    /// itself comes from the caller, already connected. `deadline` bounds the
    /// whole handshake exchange; pass `None` to wait indefinitely.
    /// `max_frame_size` caps incoming frame payloads.
    ///
    /// # Errors
    /// Returns an error when handshake I/O fails, the server rejects the
    /// upgrade, the response is invalid, or the deadline expires. A rejected
    /// handshake must not be retried with the same key.
    pub async fn client<S>(
        stream: S,
        host: &str,
        port: u16,
        max_frame_size: usize,
        deadline: Option<Duration>,
    ) -> Result<Self, ConnectionError>
    where
        S: WebSocketStream + Send + 'static,
    {
        with_deadline(deadline, Self::client_handshake(stream, host, port, max_frame_size)).await
    }

    /// Perform the server side of the handshake over an accepted stream.
    ///
    /// Reads the client's upgrade request and answers with
    /// `101 Switching Protocols`, or rejects the connection when the request
    /// does not qualify.
    ///
    /// # Errors
    /// Returns an error when handshake I/O fails, the upgrade request is not
    /// a well-formed WebSocket handshake, or the deadline expires.
    pub async fn server<S>(
        stream: S,
        max_frame_size: usize,
        deadline: Option<Duration>,
    ) -> Result<Self, ConnectionError>
    where
        S: WebSocketStream + Send + 'static,
    {
        with_deadline(deadline, Self::server_handshake(stream, max_frame_size)).await
    }

    async fn client_handshake<S>(
        mut stream: S,
        host: &str,
        port: u16,
        max_frame_size: usize,
    ) -> Result<Self, ConnectionError>
    where
        S: WebSocketStream + Send + 'static,
    {
        let request = HandshakeRequest::new(host, port);
        stream
            .write_all(&request.render())
            .await
            .map_err(|_| ConnectionError::WriteHandshakeFailed)?;
        let head = read_head(&mut stream).await?;
        handshake::validate_response(&head, request.key())?;
        Ok(Self::streaming(stream, EndpointType::Client, max_frame_size))
    }

    async fn server_handshake<S>(
        mut stream: S,
        max_frame_size: usize,
    ) -> Result<Self, ConnectionError>
    where
        S: WebSocketStream + Send + 'static,
    {
        let head = read_head(&mut stream).await?;
        let response = handshake::build_server_response(&head)
            .ok_or(ConnectionError::HandshakeRequestRejected)?;
        stream
            .write_all(&response)
            .await
            .map_err(|_| ConnectionError::WriteHandshakeFailed)?;
        Ok(Self::streaming(stream, EndpointType::Server, max_frame_size))
    }

    fn streaming<S>(stream: S, endpoint_type: EndpointType, max_frame_size: usize) -> Self
    where
        S: WebSocketStream + Send + 'static,
    {
        let codec = WebsocketCodec::new(endpoint_type, max_frame_size);
        Self {
            framed: Framed::new(Box::new(stream) as Box<dyn WebSocketStream + Send>, codec),
            closed: false,
            last_ping: None,
        }
    }

    /// Send a text message as a single frame.
    /// # Errors
    /// Returns an error if the connection is closed or sending fails.
    pub async fn send_text(&mut self, text: &str) -> Result<(), ConnectionError> {
        self.send_frame(text.as_bytes(), Opcode::TextFrame).await
    }

    /// Send a binary message as a single frame.
    /// # Errors
    /// Returns an error if the connection is closed or sending fails.
    pub async fn send_binary(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        self.send_frame(data, Opcode::BinaryFrame).await
    }

    /// Serialize an [`Envelope`] and send it as a text frame.
    /// # Errors
    /// Returns an error if serialization fails, the connection is closed, or
    /// sending fails.
    pub async fn send_envelope(&mut self, kind: &str, message: &str) -> Result<(), ConnectionError> {
        let payload = Envelope::new(kind, message).to_payload()?;
        self.send_text(&payload).await
    }

    /// Send a ping frame and store the payload for pong validation.
    /// # Errors
    /// Returns an error if the connection is closed or sending fails.
    pub async fn send_ping(&mut self, payload: Vec<u8>) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        self.last_ping = Some(payload.clone());
        self.send_frame(&payload, Opcode::Ping).await
    }

    /// Send a close frame with an optional reason code.
    /// If a reason is provided, the reason string will be the Display of the [`CloseReason`].
    /// # Errors
    /// Returns an error if the connection is closed or sending fails.
    pub async fn send_close(&mut self, reason: Option<CloseReason>) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        let payload = if let Some(r) = reason {
            let mut data = Vec::with_capacity(2 + 64);
            data.extend_from_slice(&u16::from(r).to_be_bytes());
            data.extend_from_slice(r.to_string().as_bytes());
            data
        } else {
            Vec::new()
        };
        self.send_frame(&payload, Opcode::ConnectionClose).await?;
        self.closed = true;
        Ok(())
    }

    async fn send_frame(&mut self, data: &[u8], opcode: Opcode) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        let frame = Frame {
            fin: true,
            opcode,
            payload: data.to_vec(),
        };
        self.framed.send(frame).await.map_err(ConnectionError::from)
    }

    /// Poll for the next application message, handling control frames
    /// internally: pings are answered with pongs, pongs are validated against
    /// the last ping sent, and a close frame is echoed before reporting it.
    pub async fn next_message(&mut self) -> Option<Result<WebsocketMessage, ConnectionError>> {
        let frame = self.framed.next().await?;
        match frame {
            Ok(f) => match f.opcode {
                Opcode::Ping | Opcode::Pong | Opcode::ConnectionClose => {
                    self.handle_control_frame(&f).await
                }
                Opcode::TextFrame | Opcode::BinaryFrame => Some(Self::handle_data_frame(f)),
                Opcode::ContinuationFrame => Some(Err(ConnectionError::ProtocolViolation(
                    "Fragmented messages are not supported",
                ))),
            },
            Err(e) => Some(Err(ConnectionError::Codec(e))),
        }
    }

    fn handle_data_frame(f: Frame) -> Result<WebsocketMessage, ConnectionError> {
        if !f.fin {
            return Err(ConnectionError::ProtocolViolation(
                "Fragmented messages are not supported",
            ));
        }
        if f.opcode == Opcode::TextFrame {
            return match String::from_utf8(f.payload) {
                Ok(s) => Ok(WebsocketMessage::Text(s)),
                Err(_) => Err(ConnectionError::ProtocolViolation(
                    "Invalid UTF-8 in text frame",
                )),
            };
        }
        Ok(WebsocketMessage::Binary(f.payload))
    }

    async fn handle_control_frame(
        &mut self,
        f: &Frame,
    ) -> Option<Result<WebsocketMessage, ConnectionError>> {
        if f.payload.len() > 125 {
            return Some(Err(ConnectionError::ProtocolViolation(
                "Control frame payload exceeds 125 bytes",
            )));
        }
        if !f.fin {
            return Some(Err(ConnectionError::ProtocolViolation(
                "Control frames must not be fragmented",
            )));
        }
        match f.opcode {
            Opcode::Ping => {
                let _ = self.send_frame(&f.payload, Opcode::Pong).await;
                Some(Ok(WebsocketMessage::Ping(f.payload.clone())))
            }
            Opcode::Pong => {
                if let Some(last) = &self.last_ping {
                    if &f.payload != last {
                        return Some(Err(ConnectionError::ProtocolViolation(
                            "Pong payload does not match last ping",
                        )));
                    }
                } else if !f.payload.is_empty() {
                    return Some(Err(ConnectionError::ProtocolViolation(
                        "Unexpected pong with payload",
                    )));
                }
                self.last_ping = None;
                Some(Ok(WebsocketMessage::Pong(f.payload.clone())))
            }
            Opcode::ConnectionClose => {
                let _ = self.send_frame(&f.payload, Opcode::ConnectionClose).await;
                self.closed = true;
                Some(Ok(WebsocketMessage::Close(parse_close_payload(&f.payload))))
            }
            _ => unreachable!(),
        }
    }
}

fn parse_close_payload(payload: &[u8]) -> Option<(CloseReason, String)> {
    if payload.len() < 2 {
        return None;
    }
    let code = u16::from_be_bytes([payload[0], payload[1]]);
    let reason = if payload.len() > 2 {
        match std::str::from_utf8(&payload[2..]) {
            Ok(s) => s.to_owned(),
            Err(_) => String::from("Invalid UTF-8 in close reason"),
        }
    } else {
        String::new()
    };
    match CloseReason::try_from(code) {
        Ok(r) => Some((r, reason)),
        Err(()) => Some((CloseReason::NormalClosure, reason)),
    }
}

async fn with_deadline<F, T>(deadline: Option<Duration>, fut: F) -> Result<T, ConnectionError>
where
    F: Future<Output = Result<T, ConnectionError>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ConnectionError::Timeout)?,
        None => fut.await,
    }
}

/// Accumulate bytes until a full HTTP message head parses, with a cap
/// against unbounded growth.
async fn read_head<S>(stream: &mut S) -> Result<HttpHead, ConnectionError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|_| ConnectionError::ReadHandshakeFailed)?;
        if n == 0 {
            return Err(ConnectionError::ReadHandshakeFailed);
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(head) = handshake::parse_head(&buffer) {
            return Ok(head);
        }
        if buffer.len() > MAX_HANDSHAKE_BYTES {
            return Err(ConnectionError::HandshakeTooLarge);
        }
    }
}

// WebSocket close reason codes as defined in RFC 6455 §7.4.1
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// 1000: Normal closure
    NormalClosure = 1000,
    /// 1001: Endpoint is going away
    GoingAway = 1001,
    /// 1002: Protocol error
    ProtocolError = 1002,
    /// 1003: Unsupported data
    UnsupportedData = 1003,
    /// 1005: No status received (reserved, not to be sent)
    NoStatusReceived = 1005,
    /// 1006: Abnormal closure (reserved, not to be sent)
    AbnormalClosure = 1006,
    /// 1007: Invalid payload data
    InvalidPayloadData = 1007,
    /// 1008: Policy violation
    PolicyViolation = 1008,
    /// 1009: Message too big
    MessageTooBig = 1009,
    /// 1010: Mandatory extension (client only)
    MandatoryExtension = 1010,
    /// 1011: Internal server error
    InternalServerError = 1011,
    /// 1015: TLS handshake failure (reserved, not to be sent)
    TlsHandshake = 1015,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::NormalClosure => write!(f, "Normal closure"),
            CloseReason::GoingAway => write!(f, "Endpoint is going away"),
            CloseReason::ProtocolError => write!(f, "Protocol error"),
            CloseReason::UnsupportedData => write!(f, "Unsupported data"),
            CloseReason::NoStatusReceived => write!(f, "No status received"),
            CloseReason::AbnormalClosure => write!(f, "Abnormal closure"),
            CloseReason::InvalidPayloadData => write!(f, "Invalid payload data"),
            CloseReason::PolicyViolation => write!(f, "Policy violation"),
            CloseReason::MessageTooBig => write!(f, "Message too big"),
            CloseReason::MandatoryExtension => write!(f, "Mandatory extension"),
            CloseReason::InternalServerError => write!(f, "Internal server error"),
            CloseReason::TlsHandshake => write!(f, "TLS handshake failure"),
        }
    }
}

impl TryFrom<u16> for CloseReason {
    type Error = ();
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1000 => Ok(CloseReason::NormalClosure),
            1001 => Ok(CloseReason::GoingAway),
            1002 => Ok(CloseReason::ProtocolError),
            1003 => Ok(CloseReason::UnsupportedData),
            1005 => Ok(CloseReason::NoStatusReceived),
            1006 => Ok(CloseReason::AbnormalClosure),
            1007 => Ok(CloseReason::InvalidPayloadData),
            1008 => Ok(CloseReason::PolicyViolation),
            1009 => Ok(CloseReason::MessageTooBig),
            1010 => Ok(CloseReason::MandatoryExtension),
            1011 => Ok(CloseReason::InternalServerError),
            1015 => Ok(CloseReason::TlsHandshake),
            _ => Err(()),
        }
    }
}

impl From<CloseReason> for u16 {
    fn from(value: CloseReason) -> Self {
        value as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_reason_round_trips_through_u16() {
        for code in [1000u16, 1002, 1009, 1011] {
            let reason = CloseReason::try_from(code).unwrap();
            assert_eq!(u16::from(reason), code);
        }
        assert!(CloseReason::try_from(1004).is_err());
    }

    #[test]
    fn close_payload_parses_code_and_reason() {
        let mut payload = 1001u16.to_be_bytes().to_vec();
        payload.extend_from_slice(b"maintenance");
        assert_eq!(
            parse_close_payload(&payload),
            Some((CloseReason::GoingAway, String::from("maintenance")))
        );
        assert_eq!(parse_close_payload(&[]), None);
    }

    #[test]
    fn unknown_close_code_falls_back_to_normal_closure() {
        let payload = 4999u16.to_be_bytes().to_vec();
        assert_eq!(
            parse_close_payload(&payload),
            Some((CloseReason::NormalClosure, String::new()))
        );
    }
}
