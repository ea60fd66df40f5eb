//! Accelerator Transport
//!
//! A `no_std` (with `alloc`) transaction and channel core for the host side of
//! a network-processing accelerator transport.
//!
//! Command and data payloads move between the host and the accelerator over
//! independent hardware queues ("channels"). Two interchangeable backends
//! drive the hardware:
//!
//! - [`backend::ring::RingBackend`]: a descriptor-ring engine. The host writes
//!   16-byte transfer ring elements, rings a doorbell and reads completion
//!   events from an event ring.
//! - [`backend::engine::EngineBackend`]: a generic scatter-gather transfer
//!   engine queried per descriptor cookie.
//!
//! # Architecture
//!
//! 1. **Pools** ([`pool`]): bounded allocators that never fail within their
//!    reserved budget
//! 2. **Transactions** ([`trans`]): caller-owned handles, refcounted between a
//!    blocking waiter and the completion path
//! 3. **Channels**: four queues per channel (allocated, pending, complete,
//!    polled) advanced strictly forward
//! 4. **Transport** ([`transport`]): the uniform surface over a [`backend`]
//! 5. **Commands** ([`cmd`]): immediate-command encoders for the v2 and v3
//!    wire layouts and the tag process
//! 6. **Harvester** ([`poll`]): budgeted completion processing scheduled by
//!    hardware interrupts
//!
//! # Features
//!
//! - `defmt`: Enable defmt formatting for public types and bring-up logging
//! - `log`: Log runtime anomalies through the `log` facade
//! - `async`: Enable async/await support with wakers
//!
//! # Example
//!
//! ```ignore
//! use ph_accel_transport::{DmaBuf, NoEvents, TransDirection, Transport, TransportConfig};
//! use ph_accel_transport::backend::ring::RingBackend;
//!
//! let transport = Transport::new(RingBackend::new(hw), &config, NoEvents)?;
//! transport.setup()?;
//! transport.channel_start(4)?;
//!
//! let mut trans = transport.trans_alloc(4, 1, TransDirection::ToDevice)?;
//! trans.page_add(DmaBuf::new(frame_addr, frame_len))?;
//! trans.commit(true)?;
//!
//! // From the completion interrupt
//! transport.channel_irq(4)?;
//! // From the deferred handler
//! while transport.poll(4, POLL_WEIGHT)? == POLL_WEIGHT {}
//! ```

#![no_std]
#![warn(missing_docs)]
#![allow(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]
// Clippy lint levels live here and in Cargo.toml's [lints] table.
#![deny(clippy::correctness)]
#![warn(
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::cloned_instead_of_copied,
    clippy::explicit_iter_loop,
    clippy::implicit_clone,
    clippy::inconsistent_struct_constructor,
    clippy::manual_assert,
    clippy::manual_let_else,
    clippy::match_same_arms,
    clippy::needless_pass_by_value,
    clippy::semicolon_if_nothing_returned,
    clippy::uninlined_format_args,
    clippy::unnested_or_patterns,
    clippy::std_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::alloc_instead_of_core
)]
#![allow(
    clippy::mod_module_files,
    clippy::self_named_module_files,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::struct_excessive_bools,
    clippy::fn_params_excessive_bools,
    clippy::type_complexity,
    clippy::must_use_candidate,
    clippy::assertions_on_constants,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::panic_in_result_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::items_after_statements,
    clippy::let_underscore_future
)]

extern crate alloc;

// =============================================================================
// Modules
// =============================================================================

pub mod backend;
mod channel;
pub mod cmd;
pub mod driver;
pub mod events;
pub mod poll;
pub mod pool;
pub mod sync;
pub mod trans;
pub mod transport;

// Internal implementation details (pub(crate) only)
mod internal;

// Test utilities (only available during testing)
#[cfg(test)]
pub mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use channel::{ChannelStats, QueueDepths};
pub use cmd::{ClearOption, Opcode};
pub use driver::config::{
    BackendKind, EndpointConfig, ExecEnv, MemRegion, MemoryLayout, ProtocolVersion, RingGeometry,
    TableRegions, TransportConfig, WireLayout,
};
pub use driver::error::{
    ConfigError, ConfigResult, DmaError, DmaResult, Error, IoError, IoResult, Result,
};
pub use events::{NoEvents, TransportEvents};
pub use trans::{DmaBuf, Trans, TransDirection, TransState, TransView};
pub use transport::Transport;

#[cfg(feature = "async")]
pub use sync::{CommitWait, PollReady};

/// Limits and tuning values.
pub mod constants {
    pub use crate::internal::constants::{
        CHANNEL_COUNT_MAX, CMD_PAYLOAD_SIZE, DEFAULT_COMMAND_TIMEOUT_MS, ENGINE_MAX_BURST,
        POLL_WEIGHT, RING_CHANNEL_COUNT_MAX, RING_TLV_MAX, TRE_SIZE, WAIT_POLL_INTERVAL_US,
    };
}
