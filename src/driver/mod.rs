//! Configuration and error types.
//!
//! - [`config`] - Protocol versions, endpoint tables and builder patterns
//! - [`error`] - Error types and result aliases
//!
//! # Example
//!
//! ```ignore
//! use ph_accel_transport::driver::{EndpointConfig, ProtocolVersion, TransportConfig};
//!
//! let config = TransportConfig::new(ProtocolVersion::V4_2)
//!     .with_endpoint(EndpointConfig::new("cmd_tx", 3, 3).with_command(true));
//! ```

// Submodules
pub mod config;
pub mod error;

// Re-exports for convenience
pub use config::{
    BackendKind, EndpointConfig, ExecEnv, MemRegion, MemoryLayout, ProtocolVersion, RingGeometry,
    TableRegions, TransportConfig, WireLayout,
};
pub use error::{ConfigError, ConfigResult, DmaError, DmaResult, Error, IoError, IoResult, Result};
