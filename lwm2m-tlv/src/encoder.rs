//! TLV encoder

use crate::error::Lwm2mResult;
use crate::types::{ID_16_BIT, LengthField, Tlv, TlvKind};
use bytes::{BufMut, Bytes, BytesMut};

/// TLV encoder writing into a growable buffer
pub struct TlvEncoder {
    buffer: BytesMut,
}

impl TlvEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Create a new encoder with initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Encode one entry from its parts
    ///
    /// The identifier is written on one byte when it fits, the length field
    /// uses the smallest form able to carry `content`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `content` is longer than 24 bits allow.
    pub fn encode_entry(&mut self, kind: TlvKind, id: u16, content: &[u8]) -> Lwm2mResult<()> {
        let length_field = LengthField::for_len(content.len())?;

        let mut header = kind.to_u8() | length_field.selector();
        if id > 0xFF {
            header |= ID_16_BIT;
        }
        if length_field == LengthField::Inline {
            // for_len guarantees the length fits in three bits
            header |= content.len() as u8;
        }

        self.buffer.reserve(6 + content.len());
        self.buffer.put_u8(header);
        if id > 0xFF {
            self.buffer.put_u16(id);
        } else {
            self.buffer.put_u8(id as u8);
        }
        let n = length_field.byte_count();
        if n > 0 {
            let len = (content.len() as u32).to_be_bytes();
            self.buffer.put_slice(&len[4 - n..]);
        }
        self.buffer.put_slice(content);
        Ok(())
    }

    /// Encode a decoded entry back to bytes
    pub fn encode_tlv(&mut self, tlv: &Tlv) -> Lwm2mResult<()> {
        self.encode_entry(tlv.kind, tlv.id, &tlv.content)
    }

    /// Encode a container entry wrapping `children`
    pub fn encode_container(&mut self, kind: TlvKind, id: u16, children: &[Tlv]) -> Lwm2mResult<()> {
        let inner = encode(children)?;
        self.encode_entry(kind, id, &inner)
    }

    /// Get the encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the encoder and return the encoded bytes
    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for TlvEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a TLV sequence
///
/// This is the byte-exact inverse of [`decode`](crate::decode).
pub fn encode(entries: &[Tlv]) -> Lwm2mResult<Bytes> {
    let capacity = entries.iter().map(Tlv::encoded_len).sum();
    let mut encoder = TlvEncoder::with_capacity(capacity);
    for tlv in entries {
        encoder.encode_tlv(tlv)?;
    }
    Ok(encoder.into_bytes())
}
