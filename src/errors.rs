//! Error types for the beacon-websocket crate.

use thiserror::Error;

/// Errors produced by the frame codec.
///
/// An incomplete frame is never an error: decoding reports it as `Ok(None)`
/// so a streaming consumer keeps its bytes and retries after the next read.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The opcode in the frame header is not recognized.
    #[error("Unknown opcode {0}")]
    UnknownOpcode(u8),
    /// An underlying I/O error occurred while framing.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The frame payload exceeds the configured or protocol limit.
    #[error("Frame too big: {0} bytes")]
    SizeError(u64),
    /// The frame violates the protocol in a way that waiting for more bytes
    /// cannot fix.
    #[error("Malformed frame: {0}")]
    Malformed(&'static str),
}

/// Errors produced by the connection driver and handshake logic.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The WebSocket protocol was violated in some way.
    #[error("WebSocket protocol violation: {0}")]
    ProtocolViolation(&'static str),
    /// The WebSocket connection has been closed.
    #[error("WebSocket closed")]
    Closed,
    /// An error occurred in the frame codec.
    #[error("Codec error: {0}")]
    Codec(#[from] FrameError),
    /// Failed to write the handshake request to the peer.
    #[error("Failed to write handshake request")]
    WriteHandshakeFailed,
    /// Failed to read the handshake response from the peer.
    #[error("Failed to read handshake response")]
    ReadHandshakeFailed,
    /// The handshake message exceeded the buffering cap before its
    /// terminator arrived.
    #[error("Handshake message too large")]
    HandshakeTooLarge,
    /// The handshake response status line was not `HTTP/1.1 101`.
    #[error("Handshake rejected: bad status line")]
    HandshakeBadStatus,
    /// The handshake response was missing or had an invalid header.
    #[error("Handshake rejected: missing or invalid header: {0}")]
    HandshakeMissingHeader(&'static str),
    /// The handshake response had an invalid Sec-WebSocket-Accept value.
    #[error("Handshake rejected: invalid Sec-WebSocket-Accept value")]
    HandshakeInvalidAccept,
    /// The client's upgrade request did not qualify for a WebSocket
    /// handshake (server side).
    #[error("Handshake request rejected")]
    HandshakeRequestRejected,
    /// The handshake did not complete within the caller's deadline.
    #[error("Handshake timed out")]
    Timeout,
    /// The JSON envelope could not be serialized or deserialized.
    #[error("Envelope error: {0}")]
    Envelope(#[from] serde_json::Error),
}
