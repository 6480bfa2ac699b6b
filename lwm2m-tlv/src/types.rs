//! TLV header types

use crate::error::{Lwm2mError, Lwm2mResult};
use bytes::Bytes;

/// Mask selecting the kind bits of the header byte
pub const KIND_MASK: u8 = 0xC0;
/// Header flag set when the identifier field is 16 bits wide
pub const ID_16_BIT: u8 = 0x20;
/// Mask selecting the length-field size bits
pub const LENGTH_SIZE_MASK: u8 = 0x18;
/// Mask selecting the inline length bits
pub const INLINE_LENGTH_MASK: u8 = 0x07;
/// Largest content length a TLV can carry (3 length bytes)
pub const MAX_CONTENT_LENGTH: usize = 0x00FF_FFFF;

/// Kind of a TLV entry, stored in bits 7-6 of the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlvKind {
    /// Content is a sequence of resource TLVs
    ObjectInstance = 0x00,
    /// One value of a multiple resource
    ResourceInstance = 0x40,
    /// Content is a sequence of resource-instance TLVs
    MultipleResource = 0x80,
    /// A single resource value
    ResourceWithValue = 0xC0,
}

impl TlvKind {
    /// Get the kind from a header byte
    pub const fn from_header(header: u8) -> Self {
        match header & KIND_MASK {
            0x00 => TlvKind::ObjectInstance,
            0x40 => TlvKind::ResourceInstance,
            0x80 => TlvKind::MultipleResource,
            _ => TlvKind::ResourceWithValue,
        }
    }

    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// True if the content of this kind is itself a TLV sequence
    pub const fn is_container(self) -> bool {
        matches!(self, TlvKind::ObjectInstance | TlvKind::MultipleResource)
    }

    /// True if the content of this kind is a raw value
    pub const fn holds_value(self) -> bool {
        !self.is_container()
    }
}

/// Size of the length field, stored in bits 4-3 of the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthField {
    /// Length below 8 folded into bits 2-0 of the header
    Inline,
    OneByte,
    TwoBytes,
    ThreeBytes,
}

impl LengthField {
    /// Smallest length field able to carry `len`
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `len` does not fit in 24 bits.
    pub fn for_len(len: usize) -> Lwm2mResult<Self> {
        match len {
            0..=7 => Ok(LengthField::Inline),
            8..=0xFF => Ok(LengthField::OneByte),
            0x100..=0xFFFF => Ok(LengthField::TwoBytes),
            0x1_0000..=MAX_CONTENT_LENGTH => Ok(LengthField::ThreeBytes),
            _ => Err(Lwm2mError::InvalidArgument(format!(
                "TLV content of {} bytes exceeds the 24-bit length field",
                len
            ))),
        }
    }

    /// Get the length field size from a header byte
    pub const fn from_header(header: u8) -> Self {
        match (header & LENGTH_SIZE_MASK) >> 3 {
            0 => LengthField::Inline,
            1 => LengthField::OneByte,
            2 => LengthField::TwoBytes,
            _ => LengthField::ThreeBytes,
        }
    }

    /// Header bits selecting this field size
    pub const fn selector(self) -> u8 {
        match self {
            LengthField::Inline => 0x00,
            LengthField::OneByte => 0x08,
            LengthField::TwoBytes => 0x10,
            LengthField::ThreeBytes => 0x18,
        }
    }

    /// Number of length bytes following the identifier
    pub const fn byte_count(self) -> usize {
        match self {
            LengthField::Inline => 0,
            LengthField::OneByte => 1,
            LengthField::TwoBytes => 2,
            LengthField::ThreeBytes => 3,
        }
    }
}

/// One decoded TLV entry
///
/// The content of container kinds is kept as raw bytes and only decoded when
/// [`Tlv::children`](crate::Tlv::children) is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub kind: TlvKind,
    pub id: u16,
    pub content: Bytes,
}

impl Tlv {
    pub fn new(kind: TlvKind, id: u16, content: impl Into<Bytes>) -> Self {
        Self {
            kind,
            id,
            content: content.into(),
        }
    }

    /// Size of this entry once encoded, header included
    pub fn encoded_len(&self) -> usize {
        let id_len = if self.id > 0xFF { 2 } else { 1 };
        let length_len = LengthField::for_len(self.content.len())
            .map(LengthField::byte_count)
            .unwrap_or(3);
        1 + id_len + length_len + self.content.len()
    }
}
