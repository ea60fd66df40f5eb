//! Synchronization and Concurrency Support
//!
//! - **Primitives** (`primitives`): Low-level synchronization types
//!   - [`CriticalSectionCell`] - ISR-safe interior mutability, used for every
//!     channel's state and the transport lifecycle
//!   - [`Completion`] - One-shot completion signal per transaction slot
//!   - [`AtomicWaker`] - Async waker storage for interrupts
//!
//! - **Async Support** (`asynch`): futures for transaction completion and
//!   harvester scheduling
//!
//! # Feature Flags
//!
//! - `async`: Enables `asynch` and waker support in [`Completion`]

mod primitives;

#[cfg(feature = "async")]
pub use primitives::AtomicWaker;
pub use primitives::{Completion, CriticalSectionCell};

#[cfg(feature = "async")]
pub mod asynch;

#[cfg(feature = "async")]
pub use asynch::{CommitWait, PollReady};
