//! Error types re-exported from the core crate

pub use lwm2m_core::error::{Lwm2mError, Lwm2mResult};
