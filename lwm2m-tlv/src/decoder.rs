//! TLV decoder
//!
//! Decoding is bounds-checked: every read is validated against the remaining
//! input and a truncated or inconsistent entry yields `MalformedTlv` instead
//! of reading past the slice.

use crate::error::{Lwm2mError, Lwm2mResult};
use crate::types::{ID_16_BIT, INLINE_LENGTH_MASK, LengthField, Tlv, TlvKind};
use bytes::Bytes;

/// TLV decoder over a borrowed byte slice
pub struct TlvDecoder<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> TlvDecoder<'a> {
    /// Create a new decoder
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Decode the next entry
    ///
    /// Container entries are not descended into; their content is returned
    /// as raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `MalformedTlv` if the header, identifier, length field or
    /// content run past the end of the input.
    pub fn decode_entry(&mut self) -> Lwm2mResult<Tlv> {
        let start = self.position;
        let header = self.read_byte()?;
        let kind = TlvKind::from_header(header);

        let id = if header & ID_16_BIT != 0 {
            let hi = self.read_byte()?;
            let lo = self.read_byte()?;
            u16::from_be_bytes([hi, lo])
        } else {
            u16::from(self.read_byte()?)
        };

        let length_field = LengthField::from_header(header);
        let len = match length_field {
            LengthField::Inline => usize::from(header & INLINE_LENGTH_MASK),
            field => {
                let raw = self.read_bytes(field.byte_count()).map_err(|_| {
                    Lwm2mError::MalformedTlv(format!(
                        "length field of entry at offset {} is truncated",
                        start
                    ))
                })?;
                raw.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b))
            }
        };

        if len > self.remaining() {
            return Err(Lwm2mError::MalformedTlv(format!(
                "entry {} at offset {} declares {} content bytes but only {} remain",
                id,
                start,
                len,
                self.remaining()
            )));
        }
        let content = Bytes::copy_from_slice(self.read_bytes(len)?);

        Ok(Tlv { kind, id, content })
    }

    /// Decode entries until the input is exhausted
    pub fn decode_all(&mut self) -> Lwm2mResult<Vec<Tlv>> {
        let mut entries = Vec::new();
        while self.remaining() > 0 {
            entries.push(self.decode_entry()?);
        }
        Ok(entries)
    }

    fn read_byte(&mut self) -> Lwm2mResult<u8> {
        let byte = *self
            .buffer
            .get(self.position)
            .ok_or_else(|| Lwm2mError::MalformedTlv("Not enough bytes".to_string()))?;
        self.position += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> Lwm2mResult<&'a [u8]> {
        let end = self
            .position
            .checked_add(len)
            .filter(|end| *end <= self.buffer.len())
            .ok_or_else(|| Lwm2mError::MalformedTlv("Not enough bytes".to_string()))?;
        let slice = &self.buffer[self.position..end];
        self.position = end;
        Ok(slice)
    }

    /// Get current position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Get remaining bytes
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }
}

/// Decode a complete TLV sequence
///
/// The whole decode fails if any entry is malformed.
pub fn decode(bytes: &[u8]) -> Lwm2mResult<Vec<Tlv>> {
    TlvDecoder::new(bytes).decode_all()
}

impl Tlv {
    /// Decode the nested entries of a container
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` when called on a value entry, and
    /// `MalformedTlv` if the nested content does not decode.
    pub fn children(&self) -> Lwm2mResult<Vec<Tlv>> {
        if !self.kind.is_container() {
            return Err(Lwm2mError::TypeMismatch(format!(
                "{:?} entry {} has no nested entries",
                self.kind, self.id
            )));
        }
        decode(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_inline_length() {
        // resource 0, value "ab"
        let tlvs = decode(&[0xC2, 0x00, b'a', b'b']).unwrap();
        assert_eq!(tlvs.len(), 1);
        assert_eq!(tlvs[0].kind, TlvKind::ResourceWithValue);
        assert_eq!(tlvs[0].id, 0);
        assert_eq!(&tlvs[0].content[..], b"ab");
    }

    #[test]
    fn test_decode_16_bit_id() {
        let tlvs = decode(&[0xE1, 0x01, 0x2C, 0x07]).unwrap();
        assert_eq!(tlvs[0].id, 300);
        assert_eq!(&tlvs[0].content[..], &[0x07]);
    }

    #[test]
    fn test_decode_nested() {
        // instance 0 { resource 1 = 0x05 }
        let bytes = [0x03, 0x00, 0xC1, 0x01, 0x05];
        let tlvs = decode(&bytes).unwrap();
        assert_eq!(tlvs[0].kind, TlvKind::ObjectInstance);
        let children = tlvs[0].children().unwrap();
        assert_eq!(children[0].id, 1);
        assert!(children[0].children().is_err());
    }

    #[test]
    fn test_decode_truncated_content() {
        let err = decode(&[0xC5, 0x00, 0x01, 0x02]).unwrap_err();
        assert!(matches!(err, Lwm2mError::MalformedTlv(_)));
    }

    #[test]
    fn test_decode_truncated_length_field() {
        // two length bytes announced, one present
        let err = decode(&[0xD0, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, Lwm2mError::MalformedTlv(_)));
    }

    #[test]
    fn test_decode_truncated_id() {
        assert!(decode(&[0xE1, 0x01]).is_err());
        assert!(decode(&[0xC1]).is_err());
    }

    #[test]
    fn test_decode_empty_input() {
        assert!(decode(&[]).unwrap().is_empty());
    }
}
