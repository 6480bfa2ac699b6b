use thiserror::Error;

/// Main error type for LWM2M operations
#[derive(Error, Debug)]
pub enum Lwm2mError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed TLV: {0}")]
    MalformedTlv(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Out of memory")]
    OutOfMemory,

    /// A multicast send was not accepted by any network interface
    #[error("No route: multicast send reached no interface")]
    NoRoute,

    #[error("Unknown client: {0}")]
    UnknownClient(String),

    #[error("Unknown path: {0}")]
    UnknownPath(String),

    /// The addressed resource exists but currently holds no value
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The object does not implement the requested capability
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(u16),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl Lwm2mError {
    /// Platform error code carried by a transport error, if any
    pub fn os_error(&self) -> Option<i32> {
        match self {
            Lwm2mError::Transport(e) => e.raw_os_error(),
            _ => None,
        }
    }

    /// Whether this error means "nothing to read here" during a fan-out read
    ///
    /// Empty resources and nonexistent resource ids are skipped when an
    /// object or instance is read as a whole.
    pub fn is_skippable_read(&self) -> bool {
        matches!(self, Lwm2mError::NotFound(_) | Lwm2mError::UnknownPath(_))
    }
}

/// Result type alias for LWM2M operations
pub type Lwm2mResult<T> = Result<T, Lwm2mError>;
