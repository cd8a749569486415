//! RFC 6455 frame encoding and decoding.
//!
//! The core is a pair of pure functions over byte buffers, [`encode_frame`]
//! and [`decode`]; a streaming consumer calls them with its own accumulator.
//! [`WebsocketCodec`] wraps them in the `tokio_util` codec traits so a
//! connection can run them behind `Framed`.

use rand::Rng;
use tokio_util::bytes::Buf as _;

use crate::errors::FrameError;

const FIN_MASK: u8 = 0x80;
const RSV_MASK: u8 = 0x70;
const OPCODE_MASK: u8 = 0x0F;
const MASKBIT_MASK: u8 = 0x80;
const LENGTH_MASK: u8 = 0x7F;

/// Largest payload length representable in a frame header (2^63 - 1).
const MAX_PAYLOAD_LEN: u64 = 0x7FFF_FFFF_FFFF_FFFF;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    ContinuationFrame = 0x0,
    TextFrame = 0x1,
    BinaryFrame = 0x2,
    ConnectionClose = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl TryFrom<u8> for Opcode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::ContinuationFrame),
            0x1 => Ok(Self::TextFrame),
            0x2 => Ok(Self::BinaryFrame),
            0x8 => Ok(Self::ConnectionClose),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            x => Err(FrameError::UnknownOpcode(x)),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        value as u8
    }
}

/// A single WebSocket frame.
///
/// The mask bit and masking key exist on the wire only; a decoded frame
/// always holds the unmasked payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

/// Encode `payload` as one unfragmented frame (fin = 1).
///
/// With `masked` set, a fresh 4-byte key is drawn from the OS-seeded RNG and
/// the payload is XOR-masked, as every client-to-server frame must be.
/// Unmasked encoding is the server direction.
///
/// # Errors
/// Returns [`FrameError::SizeError`] when the payload length cannot be
/// represented in a frame header.
pub fn encode(payload: &[u8], opcode: Opcode, masked: bool) -> Result<Vec<u8>, FrameError> {
    encode_frame(
        &Frame {
            fin: true,
            opcode,
            payload: payload.to_vec(),
        },
        masked,
    )
}

/// Encode an arbitrary frame, including its fin bit.
///
/// # Errors
/// Returns [`FrameError::SizeError`] when the payload length cannot be
/// represented in a frame header.
pub fn encode_frame(frame: &Frame, masked: bool) -> Result<Vec<u8>, FrameError> {
    let len = frame.payload.len();
    let mut out = Vec::with_capacity(2 + 8 + 4 + len);

    let mut header = [0u8; 2];
    if frame.fin {
        header[0] |= FIN_MASK;
    }
    header[0] |= u8::from(frame.opcode);
    if masked {
        header[1] |= MASKBIT_MASK;
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "The lengths have been checked"
    )]
    match len {
        ..=125 => {
            header[1] |= len as u8;
            out.extend_from_slice(&header);
        }
        126..=0xFFFF => {
            header[1] |= 126;
            out.extend_from_slice(&header);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        0x1_0000..=0x7FFF_FFFF_FFFF_FFFF => {
            header[1] |= 127;
            out.extend_from_slice(&header);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
        _ => return Err(FrameError::SizeError(len as u64)),
    }

    if masked {
        let key: [u8; 4] = rand::rng().random();
        out.extend_from_slice(&key);
        out.extend(
            frame
                .payload
                .iter()
                .enumerate()
                .map(|(i, byte)| byte ^ key[i % 4]),
        );
    } else {
        out.extend_from_slice(&frame.payload);
    }
    Ok(out)
}

/// Header layout of the frame at the front of `src`:
/// (prefix length including any masking key, mask bit, payload length).
/// `Ok(None)` means even the length fields have not fully arrived.
fn frame_layout(src: &[u8]) -> Result<Option<(usize, bool, usize)>, FrameError> {
    if src.len() < 2 {
        return Ok(None);
    }
    if src[0] & RSV_MASK != 0 {
        return Err(FrameError::Malformed("One or more RSV flag(s) set"));
    }
    let masked = src[1] & MASKBIT_MASK != 0;
    let (header_len, payload_len) = match src[1] & LENGTH_MASK {
        len @ 0..=125 => (2, len as usize),
        126 => {
            if src.len() < 4 {
                return Ok(None);
            }
            (4, u16::from_be_bytes([src[2], src[3]]) as usize)
        }
        127 => {
            if src.len() < 10 {
                return Ok(None);
            }
            let len = u64::from_be_bytes([
                src[2], src[3], src[4], src[5], src[6], src[7], src[8], src[9],
            ]);
            if len > MAX_PAYLOAD_LEN || len > usize::MAX as u64 {
                return Err(FrameError::SizeError(len));
            }
            #[allow(
                clippy::cast_possible_truncation,
                reason = "Checked above; safe for all platforms"
            )]
            (10, len as usize)
        }
        128.. => unreachable!(),
    };
    let mask_len = if masked { 4 } else { 0 };
    Ok(Some((header_len + mask_len, masked, payload_len)))
}

/// Decode one frame from the front of `src`.
///
/// Returns `Ok(None)` while `src` holds less than a complete frame —
/// header, extended length field, masking key, or payload still truncated —
/// so a streaming consumer retains its bytes and retries after the next
/// read. On success the count is the number of bytes consumed from `src`.
/// The input is never mutated; the payload is a new buffer, unmasked when
/// the frame carried a key.
///
/// # Errors
/// RSV bits, an unrecognized opcode, or an unrepresentable length are fatal
/// for the connection and cannot be resolved by waiting.
pub fn decode(src: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    let Some((prefix_len, masked, payload_len)) = frame_layout(src)? else {
        return Ok(None);
    };
    let fin = src[0] & FIN_MASK != 0;
    let opcode = (src[0] & OPCODE_MASK).try_into()?;

    let total_len = prefix_len + payload_len;
    if src.len() < total_len {
        return Ok(None);
    }

    let mut payload = src[prefix_len..total_len].to_vec();
    if masked {
        let key_at = prefix_len - 4;
        let key = [src[key_at], src[key_at + 1], src[key_at + 2], src[key_at + 3]];
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }

    Ok(Some((
        Frame {
            fin,
            opcode,
            payload,
        },
        total_len,
    )))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EndpointType {
    Client,
    Server,
}

/// Frame codec for use with `tokio_util::codec::Framed`.
///
/// Enforces the masking direction rule (client frames masked, server frames
/// not) and caps incoming payloads at `max_length` so a peer cannot force
/// unbounded buffering.
#[derive(Debug)]
pub struct WebsocketCodec {
    endpoint_type: EndpointType,
    max_length: usize,
}

impl WebsocketCodec {
    /// Create a new codec for one endpoint of a connection.
    ///
    /// `endpoint_type` selects which masking direction is enforced;
    /// `max_length` bounds incoming frame payloads, with larger frames
    /// failing as a `SizeError`.
    #[must_use]
    pub fn new(endpoint_type: EndpointType, max_length: usize) -> Self {
        Self {
            endpoint_type,
            max_length,
        }
    }
}

impl tokio_util::codec::Decoder for WebsocketCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(
        &mut self,
        src: &mut tokio_util::bytes::BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        let Some((_, masked, payload_len)) = frame_layout(src)? else {
            return Ok(None);
        };
        match self.endpoint_type {
            EndpointType::Client if masked => {
                return Err(FrameError::Malformed("Client must not receive masked frames"));
            }
            EndpointType::Server if !masked => {
                return Err(FrameError::Malformed("Server must receive masked frames"));
            }
            _ => {}
        }
        if payload_len > self.max_length {
            return Err(FrameError::SizeError(payload_len as u64));
        }

        let Some((frame, consumed)) = decode(src)? else {
            return Ok(None);
        };
        src.advance(consumed);
        Ok(Some(frame))
    }
}

impl tokio_util::codec::Encoder<Frame> for WebsocketCodec {
    type Error = FrameError;

    fn encode(
        &mut self,
        item: Frame,
        dst: &mut tokio_util::bytes::BytesMut,
    ) -> Result<(), Self::Error> {
        let masked = self.endpoint_type == EndpointType::Client;
        dst.extend_from_slice(&encode_frame(&item, masked)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tokio_util::bytes::BytesMut;
    use tokio_util::codec::{Decoder as _, Encoder as _};

    fn round_trip(len: usize, opcode: Opcode, masked: bool) {
        let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let wire = encode(&payload, opcode, masked).unwrap();
        let (frame, consumed) = decode(&wire).unwrap().expect("complete frame");
        assert_eq!(consumed, wire.len());
        assert!(frame.fin);
        assert_eq!(frame.opcode, opcode);
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn round_trips_across_length_classes() {
        for len in [0, 1, 125, 126, 65535, 65536, (1 << 20) + 17] {
            round_trip(len, Opcode::BinaryFrame, true);
        }
    }

    #[test]
    fn round_trips_unmasked() {
        for len in [0, 125, 126, 65536] {
            round_trip(len, Opcode::TextFrame, false);
        }
    }

    #[test]
    fn length_classes_use_expected_headers() {
        let small = encode(&[0u8; 125], Opcode::BinaryFrame, false).unwrap();
        assert_eq!(small[1], 125);
        let medium = encode(&[0u8; 126], Opcode::BinaryFrame, false).unwrap();
        assert_eq!(medium[1], 126);
        assert_eq!(u16::from_be_bytes([medium[2], medium[3]]), 126);
        let large = encode(&[0u8; 65536], Opcode::BinaryFrame, false).unwrap();
        assert_eq!(large[1], 127);
        assert_eq!(
            u64::from_be_bytes([
                large[2], large[3], large[4], large[5], large[6], large[7], large[8], large[9],
            ]),
            65536
        );
    }

    #[test]
    fn masked_frames_always_set_the_mask_bit() {
        let wire = encode(b"hello", Opcode::TextFrame, true).unwrap();
        assert_eq!(wire[0], 0x81);
        assert_ne!(wire[1] & 0x80, 0);
        // Key + payload follow the two header bytes.
        assert_eq!(wire.len(), 2 + 4 + 5);
    }

    #[test]
    fn masking_keys_are_distinct_across_encodes() {
        let mut keys = HashSet::new();
        for _ in 0..1000 {
            let wire = encode(b"k", Opcode::BinaryFrame, true).unwrap();
            keys.insert([wire[2], wire[3], wire[4], wire[5]]);
        }
        assert_eq!(keys.len(), 1000);
    }

    #[test]
    fn short_payload_is_incomplete_not_truncated() {
        // Header claims 10 masked payload bytes, only 5 are present.
        let mut wire = encode(&[7u8; 10], Opcode::BinaryFrame, true).unwrap();
        wire.truncate(2 + 4 + 5);
        assert!(decode(&wire).unwrap().is_none());
    }

    #[test]
    fn truncated_extended_length_is_incomplete() {
        assert!(decode(&[0x82, 126, 0x01]).unwrap().is_none());
        assert!(decode(&[0x82, 127, 0, 0, 0, 0]).unwrap().is_none());
        assert!(decode(&[0x82]).unwrap().is_none());
    }

    #[test]
    fn missing_masking_key_is_incomplete() {
        // Mask bit set, zero-length payload, but only 2 of 4 key bytes.
        assert!(decode(&[0x82, 0x80, 0xAA, 0xBB]).unwrap().is_none());
    }

    #[test]
    fn rsv_bits_are_fatal() {
        assert!(matches!(
            decode(&[0xC1, 0x00]),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        assert!(matches!(
            decode(&[0x83, 0x00]),
            Err(FrameError::UnknownOpcode(0x3))
        ));
    }

    #[test]
    fn oversized_length_field_is_fatal() {
        let mut wire = vec![0x82, 127];
        wire.extend_from_slice(&u64::MAX.to_be_bytes());
        assert!(matches!(decode(&wire), Err(FrameError::SizeError(_))));
    }

    #[test]
    fn decode_reports_consumed_bytes_with_trailing_data() {
        let mut wire = encode(b"first", Opcode::TextFrame, true).unwrap();
        let first_len = wire.len();
        wire.extend_from_slice(&encode(b"second", Opcode::TextFrame, true).unwrap());
        let (frame, consumed) = decode(&wire).unwrap().unwrap();
        assert_eq!(frame.payload, b"first");
        assert_eq!(consumed, first_len);
        let (frame, _) = decode(&wire[consumed..]).unwrap().unwrap();
        assert_eq!(frame.payload, b"second");
    }

    #[test]
    fn codec_enforces_masking_direction() {
        let mut server = WebsocketCodec::new(EndpointType::Server, 1024);
        let mut unmasked = BytesMut::from(
            encode(b"nope", Opcode::TextFrame, false).unwrap().as_slice(),
        );
        assert!(server.decode(&mut unmasked).is_err());

        let mut client = WebsocketCodec::new(EndpointType::Client, 1024);
        let mut masked = BytesMut::from(
            encode(b"nope", Opcode::TextFrame, true).unwrap().as_slice(),
        );
        assert!(client.decode(&mut masked).is_err());
    }

    #[test]
    fn codec_caps_incoming_payloads() {
        let mut server = WebsocketCodec::new(EndpointType::Server, 8);
        let mut wire = BytesMut::from(
            encode(&[0u8; 9], Opcode::BinaryFrame, true).unwrap().as_slice(),
        );
        assert!(matches!(server.decode(&mut wire), Err(FrameError::SizeError(9))));
    }

    #[test]
    fn codec_encoder_masks_client_frames_only() {
        let frame = Frame {
            fin: true,
            opcode: Opcode::TextFrame,
            payload: b"payload".to_vec(),
        };
        let mut client = WebsocketCodec::new(EndpointType::Client, 1024);
        let mut dst = BytesMut::new();
        client.encode(frame.clone(), &mut dst).unwrap();
        assert_ne!(dst[1] & 0x80, 0);

        let mut server = WebsocketCodec::new(EndpointType::Server, 1024);
        let mut dst = BytesMut::new();
        server.encode(frame, &mut dst).unwrap();
        assert_eq!(dst[1] & 0x80, 0);
        assert_eq!(&dst[2..], b"payload");
    }

    #[test]
    fn codec_drains_multiple_frames_from_one_buffer() {
        let mut src = BytesMut::new();
        src.extend_from_slice(&encode(b"one", Opcode::TextFrame, true).unwrap());
        src.extend_from_slice(&encode(b"two", Opcode::TextFrame, true).unwrap());

        let mut server = WebsocketCodec::new(EndpointType::Server, 1024);
        assert_eq!(server.decode(&mut src).unwrap().unwrap().payload, b"one");
        assert_eq!(server.decode(&mut src).unwrap().unwrap().payload, b"two");
        assert!(server.decode(&mut src).unwrap().is_none());
        assert!(src.is_empty());
    }
}
