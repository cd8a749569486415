//! WebSocket protocol implementation.
//!
//! This crate implements the RFC 6455 client opening handshake and the
//! binary frame format from scratch. The handshake engine and frame codec
//! are pure, synchronous transformations over byte buffers; "not enough
//! bytes yet" is a normal outcome on both, so any streaming caller can drive
//! them with its own accumulator. A thin [`Connection`] driver composes the
//! two over a caller-supplied byte stream, with the server half included as
//! the symmetric counterpart needed for round-trip testing.
//!
//! This crate does not handle any extension negotiation, fragmentation
//! reassembly, or transport setup. It focuses solely on the WebSocket
//! protocol as defined in RFC 6455.
pub mod codec;
pub mod connection;
pub mod envelope;
pub mod errors;
pub mod handshake;

pub use codec::{EndpointType, Frame, Opcode, WebsocketCodec, decode, encode, encode_frame};
pub use connection::{CloseReason, Connection, WebsocketMessage};
pub use envelope::Envelope;
pub use errors::{ConnectionError, FrameError};
pub use handshake::{
    HandshakeRequest, HttpHead, build_server_response, compute_accept, parse_head,
    validate_response,
};
