//! Conversion between TLV content and typed values
//!
//! Integers are big-endian two's complement on 1, 2, 4 or 8 bytes, floats
//! are IEEE-754 on 4 or 8 bytes, booleans are a single 0/1 byte and object
//! links are two big-endian u16.

use crate::error::{Lwm2mError, Lwm2mResult};
use crate::types::Tlv;
use lwm2m_core::{ObjLink, ResourceDataType, ResourceValue};

impl Tlv {
    fn value_content(&self, target: &str) -> Lwm2mResult<&[u8]> {
        if !self.kind.holds_value() {
            return Err(Lwm2mError::TypeMismatch(format!(
                "cannot read {:?} entry {} as {}",
                self.kind, self.id, target
            )));
        }
        Ok(&self.content)
    }

    /// Read the content as a signed integer
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the content is not 1, 2, 4 or 8 bytes long.
    pub fn to_int(&self) -> Lwm2mResult<i64> {
        let content = self.value_content("int")?;
        match *content {
            [a] => Ok(i64::from(a as i8)),
            [a, b] => Ok(i64::from(i16::from_be_bytes([a, b]))),
            [a, b, c, d] => Ok(i64::from(i32::from_be_bytes([a, b, c, d]))),
            [a, b, c, d, e, f, g, h] => Ok(i64::from_be_bytes([a, b, c, d, e, f, g, h])),
            _ => Err(width_mismatch("int", self)),
        }
    }

    /// Read the content as a float
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the content is not 4 or 8 bytes long.
    pub fn to_float(&self) -> Lwm2mResult<f64> {
        let content = self.value_content("float")?;
        match *content {
            [a, b, c, d] => Ok(f64::from(f32::from_be_bytes([a, b, c, d]))),
            [a, b, c, d, e, f, g, h] => Ok(f64::from_be_bytes([a, b, c, d, e, f, g, h])),
            _ => Err(width_mismatch("float", self)),
        }
    }

    /// Read the content as a boolean
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` unless the content is exactly one byte holding
    /// 0 or 1.
    pub fn to_bool(&self) -> Lwm2mResult<bool> {
        let content = self.value_content("bool")?;
        match *content {
            [0] => Ok(false),
            [1] => Ok(true),
            _ => Err(width_mismatch("bool", self)),
        }
    }

    /// Raw content of a value entry
    pub fn to_bytes(&self) -> Lwm2mResult<&[u8]> {
        self.value_content("opaque")
    }

    /// Read the content as UTF-8 text
    pub fn to_text(&self) -> Lwm2mResult<String> {
        let content = self.value_content("string")?;
        String::from_utf8(content.to_vec()).map_err(|_| {
            Lwm2mError::TypeMismatch(format!("entry {} is not valid UTF-8", self.id))
        })
    }

    /// Read the content as an object link
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the content is not 4 bytes long.
    pub fn to_obj_link(&self) -> Lwm2mResult<ObjLink> {
        let content = self.value_content("objlink")?;
        match *content {
            [a, b, c, d] => Ok(ObjLink::new(
                u16::from_be_bytes([a, b]),
                u16::from_be_bytes([c, d]),
            )),
            _ => Err(width_mismatch("objlink", self)),
        }
    }

    /// Read the content as a typed value
    pub fn to_value(&self, data_type: ResourceDataType) -> Lwm2mResult<ResourceValue> {
        match data_type {
            ResourceDataType::String => self.to_text().map(ResourceValue::String),
            ResourceDataType::Int => self.to_int().map(ResourceValue::Int),
            ResourceDataType::Float => self.to_float().map(ResourceValue::Float),
            ResourceDataType::Bool => self.to_bool().map(ResourceValue::Bool),
            ResourceDataType::Opaque => self.to_bytes().map(|b| ResourceValue::Opaque(b.to_vec())),
            ResourceDataType::Time => self.to_int().map(ResourceValue::Time),
            ResourceDataType::ObjLink => self.to_obj_link().map(ResourceValue::ObjLink),
            ResourceDataType::None => Err(Lwm2mError::InvalidArgument(
                "cannot decode a value without a data type".to_string(),
            )),
        }
    }
}

fn width_mismatch(target: &str, tlv: &Tlv) -> Lwm2mError {
    Lwm2mError::TypeMismatch(format!(
        "entry {} has {} content bytes, not a valid {}",
        tlv.id,
        tlv.content.len(),
        target
    ))
}

/// Encode an integer on the smallest of 1, 2, 4 or 8 bytes
pub fn encode_int(value: i64) -> Vec<u8> {
    if let Ok(v) = i8::try_from(value) {
        v.to_be_bytes().to_vec()
    } else if let Ok(v) = i16::try_from(value) {
        v.to_be_bytes().to_vec()
    } else if let Ok(v) = i32::try_from(value) {
        v.to_be_bytes().to_vec()
    } else {
        value.to_be_bytes().to_vec()
    }
}

/// Encode a float on 4 bytes when that is lossless, on 8 otherwise
pub fn encode_float(value: f64) -> Vec<u8> {
    let narrow = value as f32;
    if f64::from(narrow) == value {
        narrow.to_be_bytes().to_vec()
    } else {
        value.to_be_bytes().to_vec()
    }
}

/// Encode a typed value as TLV content
pub fn encode_value(value: &ResourceValue) -> Vec<u8> {
    match value {
        ResourceValue::String(s) => s.as_bytes().to_vec(),
        ResourceValue::Int(v) | ResourceValue::Time(v) => encode_int(*v),
        ResourceValue::Float(v) => encode_float(*v),
        ResourceValue::Bool(v) => vec![u8::from(*v)],
        ResourceValue::Opaque(v) => v.clone(),
        ResourceValue::ObjLink(link) => {
            let mut out = Vec::with_capacity(4);
            out.extend_from_slice(&link.object_id.to_be_bytes());
            out.extend_from_slice(&link.instance_id.to_be_bytes());
            out
        }
    }
}
