//! Transfer-engine backend.
//!
//! Drives a generic scatter-gather DMA engine through the [`DmaEngine`] and
//! [`EngineChannel`] traits. Every scatter entry becomes one engine
//! descriptor; the descriptor of a transaction's last entry requests an
//! interrupt, and its cookie is what completion is checked against.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::backend::{Backend, HwCompletion, Submission};
use crate::driver::config::{BackendKind, EndpointConfig};
use crate::driver::error::{DmaError, DmaResult, Result};
use crate::internal::bits::engine;
use crate::internal::constants::{CHANNEL_COUNT_MAX, ENGINE_MAX_BURST};

// =============================================================================
// Engine Interface
// =============================================================================

/// Handle returned for each prepared descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cookie(pub u32);

/// Progress of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineStatus {
    /// Queued or running
    InProgress,
    /// Finished successfully
    Complete,
    /// Finished with an error
    Error,
}

/// Slave configuration applied when a channel is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineConfig {
    /// Memory to device when true, device to memory otherwise
    pub toward_device: bool,
    /// Maximum burst in descriptors
    pub max_burst: u32,
}

/// A DMA engine that hands out named channels
pub trait DmaEngine: Sync {
    /// Channel handle type
    type Channel: EngineChannel;

    /// Look up a channel by its endpoint name
    fn request_channel(&self, name: &str) -> Result<Self::Channel>;
}

/// One engine channel
pub trait EngineChannel: Send {
    /// Apply the slave configuration
    fn configure(&mut self, config: EngineConfig) -> Result<()>;

    /// Prepare and queue a single-buffer descriptor
    ///
    /// `flags` is a combination of [`engine::INTERRUPT`] and
    /// [`engine::IMM_CMD`]. The descriptor does not run until
    /// [`issue_pending`](EngineChannel::issue_pending).
    fn prep_slave_single(&mut self, addr: u64, len: u32, flags: u32) -> DmaResult<Cookie>;

    /// Start every queued descriptor
    fn issue_pending(&mut self);

    /// Progress of a descriptor
    fn status(&self, cookie: Cookie) -> EngineStatus;

    /// Bytes a finished descriptor moved, if the engine reports it
    fn transferred(&self, cookie: Cookie) -> Option<u32> {
        let _ = cookie;
        None
    }

    /// Abort every queued and running descriptor
    fn terminate_all(&mut self) -> Result<()>;

    /// Pause the channel
    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    /// Resume a paused channel
    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    /// Enable or disable completion interrupts
    fn set_interrupts(&mut self, enable: bool) {
        let _ = enable;
    }
}

// =============================================================================
// Backend
// =============================================================================

/// Per-channel state of the transfer-engine backend
#[derive(Debug)]
pub struct EngineChannelState<C> {
    chan: C,
    /// Cookie of each in-flight transaction's last descriptor, by slot
    cookies: Vec<Option<Cookie>>,
    toward_device: bool,
}

impl<C> EngineChannelState<C> {
    /// Underlying engine channel
    pub fn chan(&self) -> &C {
        &self.chan
    }
}

/// Transfer-engine backend
#[derive(Debug)]
pub struct EngineBackend<D> {
    engine: D,
}

impl<D: DmaEngine> EngineBackend<D> {
    /// Create the backend
    pub const fn new(engine: D) -> Self {
        Self { engine }
    }

    /// Underlying engine
    pub fn engine(&self) -> &D {
        &self.engine
    }

    /// Drop descriptors queued for a transaction that failed part way
    ///
    /// The engine can only discard queued descriptors together with
    /// everything already issued. If other transactions were in flight they
    /// are lost too, and the channel is reported failed until reset.
    fn discard_partial(
        channel: &mut EngineChannelState<D::Channel>,
        error: DmaError,
    ) -> DmaError {
        let in_flight = channel.cookies.iter().any(Option::is_some);
        if channel.chan.terminate_all().is_err() || in_flight {
            #[cfg(feature = "log")]
            log::warn!("engine channel aborted after descriptor prep failure");
            channel.cookies.fill(None);
            return DmaError::ChannelError;
        }
        error
    }
}

impl<D: DmaEngine> Backend for EngineBackend<D> {
    type Channel = EngineChannelState<D::Channel>;

    fn kind(&self) -> BackendKind {
        BackendKind::Engine
    }

    fn channel_limit(&self) -> usize {
        CHANNEL_COUNT_MAX
    }

    fn channel_init(&self, endpoint: &EndpointConfig) -> Result<Self::Channel> {
        let mut chan = self.engine.request_channel(endpoint.name)?;
        chan.configure(EngineConfig {
            toward_device: endpoint.toward_device,
            max_burst: ENGINE_MAX_BURST,
        })?;
        let mut cookies = Vec::new();
        cookies.resize(ENGINE_MAX_BURST as usize, None);
        Ok(EngineChannelState {
            chan,
            cookies,
            toward_device: endpoint.toward_device,
        })
    }

    fn channel_tre_max(&self, _channel: &Self::Channel) -> u32 {
        ENGINE_MAX_BURST
    }

    fn channel_trans_tre_max(&self, _channel: &Self::Channel) -> u32 {
        ENGINE_MAX_BURST
    }

    fn setup(&self, _channel: &mut Self::Channel) -> Result<()> {
        Ok(())
    }

    fn teardown(&self, channel: &mut Self::Channel) {
        channel.chan.set_interrupts(false);
        if channel.chan.terminate_all().is_err() {
            #[cfg(feature = "log")]
            log::warn!("engine channel terminate failed during teardown");
        }
        channel.cookies.fill(None);
    }

    fn exit(&self, channel: &mut Self::Channel) {
        self.teardown(channel);
    }

    fn start(&self, _channel: &mut Self::Channel) -> Result<()> {
        Ok(())
    }

    fn stop(&self, channel: &mut Self::Channel) -> Result<()> {
        channel.chan.terminate_all()
    }

    fn reset(&self, channel: &mut Self::Channel, _doorbell: bool) -> Result<()> {
        channel.cookies.fill(None);
        channel.chan.terminate_all()
    }

    fn suspend(&self, channel: &mut Self::Channel, _stop: bool) -> Result<()> {
        channel.chan.pause()
    }

    fn resume(&self, channel: &mut Self::Channel, _start: bool) -> Result<()> {
        channel.chan.resume()
    }

    fn submit(
        &self,
        channel: &mut Self::Channel,
        submission: &Submission<'_>,
        _doorbell: bool,
    ) -> Result<bool> {
        let count = submission.entries.len();
        if count == 0 {
            return Ok(false);
        }

        let mut last_cookie = None;
        for (i, entry) in submission.entries.iter().enumerate() {
            let mut flags = 0;
            let len = match submission.opcode(i) {
                Some(opcode) => {
                    flags |= engine::IMM_CMD;
                    u32::from(opcode)
                }
                None => entry.len,
            };
            if i + 1 == count {
                flags |= engine::INTERRUPT;
            }
            match channel.chan.prep_slave_single(entry.addr, len, flags) {
                Ok(cookie) => last_cookie = Some(cookie),
                Err(e) if i == 0 => return Err(e.into()),
                Err(e) => return Err(Self::discard_partial(channel, e).into()),
            }
        }

        if let Some(cookie) = channel.cookies.get_mut(usize::from(submission.slot)) {
            *cookie = last_cookie;
        }
        // The engine has no deferred doorbell; work always starts now
        channel.chan.issue_pending();
        Ok(true)
    }

    fn harvest(
        &self,
        channel: &mut Self::Channel,
        pending: &VecDeque<u16>,
        out: &mut Vec<HwCompletion>,
    ) -> DmaResult<()> {
        for &slot in pending {
            let Some(cookie) = channel.cookies.get(usize::from(slot)).copied().flatten() else {
                continue;
            };
            match channel.chan.status(cookie) {
                EngineStatus::InProgress => break,
                EngineStatus::Complete => {
                    let len = if channel.toward_device {
                        None
                    } else {
                        channel.chan.transferred(cookie)
                    };
                    channel.cookies[usize::from(slot)] = None;
                    out.push(HwCompletion { slot, len });
                }
                EngineStatus::Error => {
                    #[cfg(feature = "log")]
                    log::warn!("engine descriptor {} failed", cookie.0);
                    return Err(DmaError::ChannelError);
                }
            }
        }
        Ok(())
    }

    fn irq_enable(&self, channel: &mut Self::Channel, enable: bool) {
        channel.chan.set_interrupts(enable);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
