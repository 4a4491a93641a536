//! `WireCodec`: encode/decode for the seven peer-protocol frame kinds (§4.1).
//!
//! A peer frame on the wire is a 4-byte big-endian length prefix followed by
//! the logical frame body (signature, id, version, payload). The length
//! prefix is transport-level framing so [`PeerCodec`] can plug straight into
//! `tokio_util::codec::Framed` over a `TcpStream`; everything after it is
//! exactly the §4.1 byte layout.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::WireError;

const SIGNATURE: u16 = 0xAAA0 | 1;
const VERSION: u8 = 2;

const ID_HELLO: u8 = 1;
const ID_WHISPER: u8 = 2;
const ID_SHOUT: u8 = 3;
const ID_JOIN: u8 = 4;
const ID_LEAVE: u8 = 5;
const ID_PING: u8 = 6;
const ID_PING_OK: u8 = 7;

/// The decoded HELLO payload (§4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub sequence: u16,
    pub endpoint: String,
    pub groups: Vec<String>,
    pub status: u8,
    pub name: String,
    pub headers: Vec<(String, String)>,
}

/// One decoded peer-protocol frame.
///
/// WHISPER/SHOUT carry their application payload as a list of opaque byte
/// parts (`content`), preserving the sender's multi-part boundaries exactly
/// as handed to [`PeerCodec`] for encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerFrame {
    Hello(Hello),
    Whisper {
        sequence: u16,
        content: Vec<Bytes>,
    },
    Shout {
        sequence: u16,
        group: String,
        content: Vec<Bytes>,
    },
    Join {
        sequence: u16,
        group: String,
        status: u8,
    },
    Leave {
        sequence: u16,
        group: String,
        status: u8,
    },
    Ping {
        sequence: u16,
    },
    PingOk {
        sequence: u16,
    },
}

impl PeerFrame {
    /// The sequence number carried by every frame kind.
    pub fn sequence(&self) -> u16 {
        match self {
            PeerFrame::Hello(h) => h.sequence,
            PeerFrame::Whisper { sequence, .. }
            | PeerFrame::Shout { sequence, .. }
            | PeerFrame::Join { sequence, .. }
            | PeerFrame::Leave { sequence, .. }
            | PeerFrame::Ping { sequence }
            | PeerFrame::PingOk { sequence } => *sequence,
        }
    }

    /// Set the sequence number, used when stamping an outgoing frame.
    pub fn with_sequence(mut self, sequence: u16) -> Self {
        match &mut self {
            PeerFrame::Hello(h) => h.sequence = sequence,
            PeerFrame::Whisper { sequence: s, .. }
            | PeerFrame::Shout { sequence: s, .. }
            | PeerFrame::Join { sequence: s, .. }
            | PeerFrame::Leave { sequence: s, .. }
            | PeerFrame::Ping { sequence: s }
            | PeerFrame::PingOk { sequence: s } => *s = sequence,
        }
        self
    }

    pub fn is_hello(&self) -> bool {
        matches!(self, PeerFrame::Hello(_))
    }
}

fn put_string(buf: &mut BytesMut, s: &str) -> Result<(), WireError> {
    if s.len() > 255 {
        return Err(WireError::StringTooLong);
    }
    buf.put_u8(s.len() as u8);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn put_long_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn get_string(buf: &mut impl Buf) -> Result<String, WireError> {
    if buf.remaining() < 1 {
        return Err(WireError::Truncated { needed: 1 });
    }
    let len = buf.get_u8() as usize;
    if buf.remaining() < len {
        return Err(WireError::Truncated {
            needed: len - buf.remaining(),
        });
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
}

fn get_long_string(buf: &mut impl Buf) -> Result<String, WireError> {
    if buf.remaining() < 4 {
        return Err(WireError::Truncated { needed: 4 });
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(WireError::Truncated {
            needed: len - buf.remaining(),
        });
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
}

fn need(buf: &impl Buf, n: usize) -> Result<(), WireError> {
    if buf.remaining() < n {
        Err(WireError::Truncated {
            needed: n - buf.remaining(),
        })
    } else {
        Ok(())
    }
}

/// Caps a length-prefixed element count from an untrusted peer at what the
/// remaining bytes could possibly hold, so `Vec::with_capacity` never sees an
/// attacker-controlled `u32` directly. `min_item_len` is the fewest bytes
/// every element must occupy on the wire (its own length prefix, at least);
/// the per-element `need(...)` checks in the decode loop still enforce the
/// real bound, this only keeps the up-front allocation sane.
fn bounded_capacity(buf: &impl Buf, count: usize, min_item_len: usize) -> usize {
    count.min(buf.remaining() / min_item_len.max(1))
}

fn put_content(buf: &mut BytesMut, parts: &[Bytes]) {
    buf.put_u32(parts.len() as u32);
    for part in parts {
        buf.put_u32(part.len() as u32);
        buf.put_slice(part);
    }
}

fn get_content(buf: &mut Bytes) -> Result<Vec<Bytes>, WireError> {
    need(buf, 4)?;
    let count = buf.get_u32() as usize;
    let mut parts = Vec::with_capacity(bounded_capacity(&*buf, count, 4));
    for _ in 0..count {
        need(buf, 4)?;
        let len = buf.get_u32() as usize;
        need(buf, len)?;
        parts.push(buf.split_to(len));
    }
    Ok(parts)
}

/// Encode `frame` to its exact on-the-wire body (signature onward, no length
/// prefix). Encoding is total: every valid [`PeerFrame`] encodes successfully.
pub fn encode_body(frame: &PeerFrame) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u16(SIGNATURE);
    match frame {
        PeerFrame::Hello(_) => buf.put_u8(ID_HELLO),
        PeerFrame::Whisper { .. } => buf.put_u8(ID_WHISPER),
        PeerFrame::Shout { .. } => buf.put_u8(ID_SHOUT),
        PeerFrame::Join { .. } => buf.put_u8(ID_JOIN),
        PeerFrame::Leave { .. } => buf.put_u8(ID_LEAVE),
        PeerFrame::Ping { .. } => buf.put_u8(ID_PING),
        PeerFrame::PingOk { .. } => buf.put_u8(ID_PING_OK),
    }
    buf.put_u8(VERSION);

    match frame {
        PeerFrame::Hello(h) => {
            buf.put_u16(h.sequence);
            // String length is already bounded by the Endpoint type; a
            // caller-constructed value exceeding it is a programmer error.
            put_string(&mut buf, &h.endpoint).expect("endpoint string too long");
            buf.put_u32(h.groups.len() as u32);
            for g in &h.groups {
                put_long_string(&mut buf, g);
            }
            buf.put_u8(h.status);
            put_string(&mut buf, &h.name).expect("name string too long");
            buf.put_u32(h.headers.len() as u32);
            for (k, v) in &h.headers {
                put_string(&mut buf, k).expect("header key too long");
                put_long_string(&mut buf, v);
            }
        }
        PeerFrame::Whisper { sequence, content } => {
            buf.put_u16(*sequence);
            put_content(&mut buf, content);
        }
        PeerFrame::Shout {
            sequence,
            group,
            content,
        } => {
            buf.put_u16(*sequence);
            put_string(&mut buf, group).expect("group name too long");
            put_content(&mut buf, content);
        }
        PeerFrame::Join {
            sequence,
            group,
            status,
        }
        | PeerFrame::Leave {
            sequence,
            group,
            status,
        } => {
            buf.put_u16(*sequence);
            put_string(&mut buf, group).expect("group name too long");
            buf.put_u8(*status);
        }
        PeerFrame::Ping { sequence } | PeerFrame::PingOk { sequence } => {
            buf.put_u16(*sequence);
        }
    }
    buf
}

/// Decode a complete frame body (as produced by [`encode_body`]) into a [`PeerFrame`].
pub fn decode_body(mut body: Bytes) -> Result<PeerFrame, WireError> {
    need(&body, 4)?;
    let signature = body.get_u16();
    if signature != SIGNATURE {
        return Err(WireError::BadSignature(signature));
    }
    let id = body.get_u8();
    let version = body.get_u8();
    if version != VERSION {
        return Err(WireError::VersionMismatch(version));
    }

    need(&body, 2)?;
    match id {
        ID_HELLO => {
            let sequence = body.get_u16();
            let endpoint = get_string(&mut body)?;
            need(&body, 4)?;
            let group_count = body.get_u32() as usize;
            let mut groups = Vec::with_capacity(bounded_capacity(&body, group_count, 4));
            for _ in 0..group_count {
                groups.push(get_long_string(&mut body)?);
            }
            need(&body, 1)?;
            let status = body.get_u8();
            let name = get_string(&mut body)?;
            need(&body, 4)?;
            let header_count = body.get_u32() as usize;
            let mut headers = Vec::with_capacity(bounded_capacity(&body, header_count, 5));
            for _ in 0..header_count {
                let key = get_string(&mut body)?;
                let value = get_long_string(&mut body)?;
                headers.push((key, value));
            }
            Ok(PeerFrame::Hello(Hello {
                sequence,
                endpoint,
                groups,
                status,
                name,
                headers,
            }))
        }
        ID_WHISPER => {
            let sequence = body.get_u16();
            let content = get_content(&mut body)?;
            Ok(PeerFrame::Whisper { sequence, content })
        }
        ID_SHOUT => {
            let sequence = body.get_u16();
            let group = get_string(&mut body)?;
            let content = get_content(&mut body)?;
            Ok(PeerFrame::Shout {
                sequence,
                group,
                content,
            })
        }
        ID_JOIN => {
            let sequence = body.get_u16();
            let group = get_string(&mut body)?;
            need(&body, 1)?;
            let status = body.get_u8();
            Ok(PeerFrame::Join {
                sequence,
                group,
                status,
            })
        }
        ID_LEAVE => {
            let sequence = body.get_u16();
            let group = get_string(&mut body)?;
            need(&body, 1)?;
            let status = body.get_u8();
            Ok(PeerFrame::Leave {
                sequence,
                group,
                status,
            })
        }
        ID_PING => Ok(PeerFrame::Ping {
            sequence: body.get_u16(),
        }),
        ID_PING_OK => Ok(PeerFrame::PingOk {
            sequence: body.get_u16(),
        }),
        other => Err(WireError::UnknownMessageId(other)),
    }
}

/// Length-delimited codec for [`PeerFrame`], suitable for
/// `tokio_util::codec::Framed<TcpStream, PeerCodec>`.
#[derive(Debug, Default)]
pub struct PeerCodec {
    next_len: Option<u32>,
}

impl PeerCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for PeerCodec {
    type Item = PeerFrame;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let len = match self.next_len {
            Some(len) => len,
            None => {
                if src.len() < 4 {
                    return Ok(None);
                }
                let len = (&src[..4]).get_u32();
                src.advance(4);
                self.next_len = Some(len);
                len
            }
        };

        if (src.len() as u32) < len {
            return Ok(None);
        }

        self.next_len = None;
        let body = src.split_to(len as usize).freeze();
        decode_body(body).map(Some)
    }
}

impl Encoder<PeerFrame> for PeerCodec {
    type Error = WireError;

    fn encode(&mut self, item: PeerFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = encode_body(&item);
        dst.put_u32(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}
