//! Error types for the accelerator transport
//!
//! Errors are organized by domain for better diagnostics:
//! - [`ConfigError`]: Bring-up, configuration and lifecycle failures
//! - [`DmaError`]: TRE budget, pool and transfer-element issues
//! - [`IoError`]: Runtime wait and hardware command failures
//!
//! The unified [`Error`] enum wraps all domain errors and is returned
//! by most transport methods. [`Error::to_errno`] maps it onto the negative
//! result codes used at the transport surface.

// =============================================================================
// Result Codes
// =============================================================================

/// Device or resource busy
const EBUSY: i32 = 16;
/// Invalid argument
const EINVAL: i32 = 22;
/// I/O error
const EIO: i32 = 5;
/// Message too long
const EMSGSIZE: i32 = 90;
/// Connection timed out
const ETIMEDOUT: i32 = 110;
/// Operation not supported
const EOPNOTSUPP: i32 = 95;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Configuration and bring-up errors
///
/// These errors occur while building the transport, validating the
/// endpoint table and command memory regions, or when a lifecycle
/// operation is issued in the wrong state. They are fatal to bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Transport already set up
    AlreadySetUp,
    /// Transport not set up
    NotSetUp,
    /// Invalid configuration parameter
    InvalidConfig,
    /// Channel id out of range or not configured
    InvalidChannel,
    /// Two endpoints claim the same channel id
    DuplicateChannel,
    /// More channels than the backend implements
    TooManyChannels,
    /// Pool geometry rejected (size, count or max_alloc)
    InvalidPoolGeometry,
    /// Protocol version does not match the backend kind
    BackendMismatch,
    /// Operation needs a command channel and none is configured
    NoCommandChannel,
    /// A memory region offset does not fit its command field
    RegionOffsetTooLarge,
    /// A memory region extends past accelerator memory
    RegionOutOfRange,
    /// A value does not fit its wire field
    FieldOverflow,
    /// The backend does not implement this operation
    Unsupported,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConfigError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConfigError::AlreadySetUp => "transport already set up",
            ConfigError::NotSetUp => "transport not set up",
            ConfigError::InvalidConfig => "invalid configuration",
            ConfigError::InvalidChannel => "invalid channel",
            ConfigError::DuplicateChannel => "duplicate channel id",
            ConfigError::TooManyChannels => "too many channels for backend",
            ConfigError::InvalidPoolGeometry => "invalid pool geometry",
            ConfigError::BackendMismatch => "protocol version does not match backend",
            ConfigError::NoCommandChannel => "no command channel configured",
            ConfigError::RegionOffsetTooLarge => "memory region offset too large",
            ConfigError::RegionOutOfRange => "memory region out of range",
            ConfigError::FieldOverflow => "value does not fit wire field",
            ConfigError::Unsupported => "operation not supported by backend",
        }
    }
}

// =============================================================================
// DMA Errors
// =============================================================================

/// TRE budget, pool and transfer errors
///
/// [`DmaError::NoTresAvailable`] is the one failure expected at runtime:
/// callers back off and retry once completions return budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaError {
    /// The channel's TRE budget cannot cover the request
    NoTresAvailable,
    /// Data does not fit the transaction's transfer elements
    TransferTooLarge,
    /// Pool request of zero or more than `max_alloc` elements
    InvalidPoolRequest,
    /// Pool request would exceed the pool's outstanding capacity
    PoolOverrun,
    /// Channel is in a hardware error state until reset
    ChannelError,
    /// The transfer engine rejected a descriptor
    DescriptorRejected,
}

impl core::fmt::Display for DmaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DmaError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DmaError::NoTresAvailable => "no TREs available",
            DmaError::TransferTooLarge => "transfer too large for transaction",
            DmaError::InvalidPoolRequest => "invalid pool request",
            DmaError::PoolOverrun => "pool overrun",
            DmaError::ChannelError => "channel in error state",
            DmaError::DescriptorRejected => "descriptor rejected by engine",
        }
    }
}

// =============================================================================
// I/O Errors
// =============================================================================

/// Runtime errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoError {
    /// Operation timed out
    Timeout,
    /// Invalid state for operation (e.g. channel not started)
    InvalidState,
    /// Hardware did not reach the requested channel state
    CommandFailed,
}

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IoError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            IoError::Timeout => "operation timed out",
            IoError::InvalidState => "invalid state for operation",
            IoError::CommandFailed => "channel command failed",
        }
    }
}

// =============================================================================
// Unified Error Type
// =============================================================================

/// This enum wraps all domain-specific errors for unified error handling.
///
/// Match on the inner domain error for specific handling:
/// ```ignore
/// match result {
///     Err(Error::Dma(DmaError::NoTresAvailable)) => { /* back off */ }
///     Err(Error::Io(IoError::Timeout)) => { /* report */ }
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Configuration error
    Config(ConfigError),
    /// DMA error
    Dma(DmaError),
    /// I/O error
    Io(IoError),
}

impl Error {
    /// Negative result code for this error.
    ///
    /// Exhaustion maps to `-EBUSY`, size-exceeded to `-EMSGSIZE`, timeouts to
    /// `-ETIMEDOUT`, hardware errors to `-EIO` and configuration to `-EINVAL`.
    #[must_use]
    pub const fn to_errno(&self) -> i32 {
        let code = match self {
            Error::Config(ConfigError::Unsupported) => EOPNOTSUPP,
            Error::Config(_) | Error::Dma(DmaError::InvalidPoolRequest) => EINVAL,
            Error::Dma(DmaError::NoTresAvailable | DmaError::PoolOverrun) => EBUSY,
            Error::Dma(DmaError::TransferTooLarge) => EMSGSIZE,
            Error::Dma(DmaError::ChannelError | DmaError::DescriptorRejected)
            | Error::Io(IoError::CommandFailed | IoError::InvalidState) => EIO,
            Error::Io(IoError::Timeout) => ETIMEDOUT,
        };
        -code
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "config: {}", e.as_str()),
            Error::Dma(e) => write!(f, "dma: {}", e.as_str()),
            Error::Io(e) => write!(f, "io: {}", e.as_str()),
        }
    }
}

// From impls for automatic conversion
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<DmaError> for Error {
    fn from(e: DmaError) -> Self {
        Error::Dma(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

/// Result type alias for transport operations
pub type Result<T> = core::result::Result<T, Error>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

/// Result type alias for DMA operations
pub type DmaResult<T> = core::result::Result<T, DmaError>;

/// Result type alias for I/O operations
pub type IoResult<T> = core::result::Result<T, IoError>;

// =============================================================================
// Unit Tests
// =============================================================================
