//! LWM2M Device object (Object ID: 3)
//!
//! # Resources
//!
//! - Resource 0: Manufacturer (string)
//! - Resource 1: Model Number (string)
//! - Resource 2: Serial Number (string)
//! - Resource 3: Firmware Version (string)
//! - Resource 4: Reboot (executable)
//! - Resource 11: Error Code (multiple int)
//! - Resource 13: Current Time (time, writable)
//! - Resource 16: Supported Binding and Modes (string)
//!
//! The object has no create or delete capability: its single instance is
//! added locally by the application.

use crate::error::{Lwm2mError, Lwm2mResult};
use crate::object::{int_value, Execute, Lwm2mObject, Read, WriteResource, WriteTlv};
use lwm2m_core::{Resource, ResourceDataType, ResourceValue};
use lwm2m_tlv::{Tlv, TlvKind};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEVICE_OBJECT_ID: u16 = 3;
pub const MANUFACTURER: u16 = 0;
pub const MODEL_NUMBER: u16 = 1;
pub const SERIAL_NUMBER: u16 = 2;
pub const FIRMWARE_VERSION: u16 = 3;
pub const REBOOT: u16 = 4;
pub const ERROR_CODE: u16 = 11;
pub const CURRENT_TIME: u16 = 13;
pub const SUPPORTED_BINDINGS: u16 = 16;

/// Device description
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInstance {
    pub manufacturer: String,
    pub model_number: String,
    pub serial_number: String,
    pub firmware_version: String,
    /// Active error codes, `0` meaning no error
    pub error_codes: Vec<i64>,
    /// Seconds added to the system clock when reporting the current time
    pub time_offset: i64,
    pub supported_bindings: String,
}

impl DeviceInstance {
    pub fn new(manufacturer: impl Into<String>, model_number: impl Into<String>) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            model_number: model_number.into(),
            error_codes: vec![0],
            supported_bindings: "U".to_string(),
            ..Self::default()
        }
    }

    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = serial_number.into();
        self
    }

    pub fn with_firmware_version(mut self, firmware_version: impl Into<String>) -> Self {
        self.firmware_version = firmware_version.into();
        self
    }

    /// Current device time in seconds since the epoch
    pub fn current_time(&self) -> i64 {
        unix_now() + self.time_offset
    }

    fn set_current_time(&mut self, seconds: i64) {
        self.time_offset = seconds - unix_now();
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn optional_string(rid: u16, value: &str) -> Lwm2mResult<Resource> {
    if value.is_empty() {
        Err(Lwm2mError::NotFound(format!("/3/0/{}", rid)))
    } else {
        Ok(Resource::string(rid, value))
    }
}

/// Device object definition
#[derive(Default)]
pub struct DeviceObject {
    reboot: Option<Box<dyn FnMut() + Send>>,
}

impl DeviceObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the handler run when a server executes Reboot
    pub fn with_reboot_handler(mut self, handler: impl FnMut() + Send + 'static) -> Self {
        self.reboot = Some(Box::new(handler));
        self
    }
}

impl Read<DeviceInstance> for DeviceObject {
    fn read(&self, instance: &DeviceInstance, _iid: u16, rid: u16) -> Lwm2mResult<Resource> {
        match rid {
            MANUFACTURER => optional_string(rid, &instance.manufacturer),
            MODEL_NUMBER => optional_string(rid, &instance.model_number),
            SERIAL_NUMBER => optional_string(rid, &instance.serial_number),
            FIRMWARE_VERSION => optional_string(rid, &instance.firmware_version),
            ERROR_CODE => Resource::multiple(
                rid,
                ResourceDataType::Int,
                instance.error_codes.iter().map(|c| ResourceValue::Int(*c)).collect(),
            ),
            CURRENT_TIME => Ok(Resource::time(rid, instance.current_time())),
            SUPPORTED_BINDINGS => Ok(Resource::string(rid, instance.supported_bindings.clone())),
            0..=16 => Err(Lwm2mError::NotFound(format!("/3/0/{}", rid))),
            _ => Err(Lwm2mError::UnknownPath(format!("/3/0/{}", rid))),
        }
    }
}

impl WriteResource<DeviceInstance> for DeviceObject {
    fn write_resource(&mut self, instance: &mut DeviceInstance, _iid: u16, resource: &Resource)
        -> Lwm2mResult<()> {
        match resource.id() {
            CURRENT_TIME => {
                instance.set_current_time(int_value(resource)?);
                Ok(())
            }
            rid @ 0..=16 => Err(Lwm2mError::Unsupported(format!("/3/0/{} is not writable", rid))),
            rid => Err(Lwm2mError::UnknownPath(format!("/3/0/{}", rid))),
        }
    }
}

impl WriteTlv<DeviceInstance> for DeviceObject {
    fn write_tlv(&mut self, instance: &mut DeviceInstance, _iid: u16, tlvs: &[Tlv])
        -> Lwm2mResult<()> {
        let mut time = None;
        for tlv in tlvs {
            match (tlv.kind, tlv.id) {
                (TlvKind::ResourceWithValue, CURRENT_TIME) => time = Some(tlv.to_int()?),
                (_, rid) => {
                    return Err(Lwm2mError::Unsupported(format!("/3/0/{} is not writable", rid)));
                }
            }
        }
        if let Some(seconds) = time {
            instance.set_current_time(seconds);
        }
        Ok(())
    }
}

impl Execute<DeviceInstance> for DeviceObject {
    fn execute(&mut self, _instance: &mut DeviceInstance, _iid: u16, rid: u16, _args: &[u8])
        -> Lwm2mResult<()> {
        match rid {
            REBOOT => {
                if let Some(reboot) = self.reboot.as_mut() {
                    reboot();
                }
                Ok(())
            }
            0..=16 => Err(Lwm2mError::Unsupported(format!("/3/0/{} is not executable", rid))),
            _ => Err(Lwm2mError::UnknownPath(format!("/3/0/{}", rid))),
        }
    }
}

impl Lwm2mObject for DeviceObject {
    type Instance = DeviceInstance;

    fn id(&self) -> u16 {
        DEVICE_OBJECT_ID
    }

    fn resource_count(&self) -> u16 {
        17
    }

    fn reader(&self) -> Option<&dyn Read<DeviceInstance>> {
        Some(self)
    }

    fn resource_writer(&mut self) -> Option<&mut dyn WriteResource<DeviceInstance>> {
        Some(self)
    }

    fn tlv_writer(&mut self) -> Option<&mut dyn WriteTlv<DeviceInstance>> {
        Some(self)
    }

    fn executor(&mut self) -> Option<&mut dyn Execute<DeviceInstance>> {
        Some(self)
    }
}
