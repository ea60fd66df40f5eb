//! Testing utilities and mock implementations
//!
//! This module provides mock implementations of the hardware interfaces so
//! the transport can be exercised on the host without an accelerator.
//!
//! Only available when running `cargo test`.

// Note: The #[cfg(test)] attribute is applied in lib.rs where this module is declared
#![allow(missing_docs)]
#![allow(clippy::std_instead_of_core, clippy::std_instead_of_alloc)]

extern crate std;

use std::boxed::Box;
use std::collections::BTreeMap;
use std::string::{String, ToString};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Wake, Waker};
use std::vec::Vec;

use embedded_hal::delay::DelayNs;

use crate::backend::engine::{
    Cookie, DmaEngine, EngineBackend, EngineChannel, EngineConfig, EngineStatus,
};
use crate::backend::ring::{
    ChannelCommand, ChannelHwState, EventCode, RingBackend, RingEvent, RingHw, RingProgram,
};
use crate::driver::config::{EndpointConfig, ProtocolVersion, RingGeometry, TransportConfig};
use crate::driver::error::{ConfigError, DmaError, DmaResult, Result};
use crate::events::TransportEvents;
use crate::trans::TransView;
use crate::transport::Transport;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// =============================================================================
// Mock Ring Hardware
// =============================================================================

#[derive(Debug, Default)]
struct RingChannelMock {
    state: ChannelHwState,
    refuse_stop: u32,
    program: Option<RingProgram>,
    doorbells: Vec<u64>,
    events: Vec<RingEvent>,
    event_write: u32,
    event_doorbells: Vec<u32>,
    irq_enabled: bool,
    commands: Vec<ChannelCommand>,
}

/// Mock descriptor-ring registers
///
/// Channel commands succeed by reporting the state they target, except for
/// stop commands refused with [`refuse_stop`](MockRingHw::refuse_stop).
/// Tests play hardware by pushing completion events.
///
/// # Example
///
/// ```ignore
/// let backend = RingBackend::new(MockRingHw::new());
/// // ... submit a one-TRE transaction at ring index 0 ...
/// backend.hw().push_event(3, 0, 64, EventCode::Eot);
/// ```
#[derive(Debug, Default)]
pub struct MockRingHw {
    channels: Mutex<BTreeMap<u8, RingChannelMock>>,
}

impl MockRingHw {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, channel_id: u8, f: impl FnOnce(&mut RingChannelMock) -> R) -> R {
        let mut channels = lock(&self.channels);
        f(channels.entry(channel_id).or_default())
    }

    /// Append a completion event to a channel's event ring
    pub fn push_event(&self, channel_id: u8, tre_index: u32, len: u32, code: EventCode) {
        self.with(channel_id, |ch| {
            let event = RingEvent {
                tre_index,
                len,
                code,
            };
            let size = ch.events.len();
            assert!(size > 0, "channel {channel_id} event ring not programmed");
            ch.events[ch.event_write as usize % size] = event;
            ch.event_write = ch.event_write.wrapping_add(1);
        });
    }

    /// Refuse the next `count` stop commands (the channel keeps running)
    pub fn refuse_stop(&self, channel_id: u8, count: u32) {
        self.with(channel_id, |ch| ch.refuse_stop = count);
    }

    /// Transfer ring doorbell writes, oldest first
    pub fn doorbells(&self, channel_id: u8) -> Vec<u64> {
        self.with(channel_id, |ch| ch.doorbells.clone())
    }

    /// Event ring doorbell writes, oldest first
    pub fn event_doorbells(&self, channel_id: u8) -> Vec<u32> {
        self.with(channel_id, |ch| ch.event_doorbells.clone())
    }

    /// Last programming of a channel's rings
    pub fn program(&self, channel_id: u8) -> Option<RingProgram> {
        self.with(channel_id, |ch| ch.program)
    }

    /// Current channel state
    pub fn state(&self, channel_id: u8) -> ChannelHwState {
        self.with(channel_id, |ch| ch.state)
    }

    /// Channel commands issued, oldest first
    pub fn commands(&self, channel_id: u8) -> Vec<ChannelCommand> {
        self.with(channel_id, |ch| ch.commands.clone())
    }

    /// Whether the completion interrupt is unmasked
    pub fn irq_enabled(&self, channel_id: u8) -> bool {
        self.with(channel_id, |ch| ch.irq_enabled)
    }
}

impl RingHw for MockRingHw {
    fn channel_command(&self, channel_id: u8, command: ChannelCommand) -> ChannelHwState {
        self.with(channel_id, |ch| {
            ch.commands.push(command);
            if command == ChannelCommand::Stop && ch.refuse_stop > 0 {
                ch.refuse_stop -= 1;
            } else {
                ch.state = command.expected_state();
            }
            ch.state
        })
    }

    fn channel_program(&self, channel_id: u8, program: RingProgram) {
        self.with(channel_id, |ch| {
            ch.program = Some(program);
            ch.events = std::vec![
                RingEvent {
                    tre_index: 0,
                    len: 0,
                    code: EventCode::Eot,
                };
                program.event_count as usize
            ];
            ch.event_write = 0;
        });
    }

    fn ring_doorbell(&self, channel_id: u8, ring_addr: u64) {
        self.with(channel_id, |ch| ch.doorbells.push(ring_addr));
    }

    fn event_write_index(&self, channel_id: u8) -> u32 {
        self.with(channel_id, |ch| ch.event_write)
    }

    fn read_event(&self, channel_id: u8, index: u32) -> RingEvent {
        self.with(channel_id, |ch| ch.events[index as usize % ch.events.len()])
    }

    fn event_doorbell(&self, channel_id: u8, index: u32) {
        self.with(channel_id, |ch| ch.event_doorbells.push(index));
    }

    fn irq_enable(&self, channel_id: u8, enable: bool) {
        self.with(channel_id, |ch| ch.irq_enabled = enable);
    }
}

// =============================================================================
// Mock Transfer Engine
// =============================================================================

/// A descriptor prepared on a [`MockEngineChannel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockDescriptor {
    pub addr: u64,
    pub len: u32,
    pub flags: u32,
}

#[derive(Debug, Default)]
struct EngineShared {
    config: Option<EngineConfig>,
    descriptors: Vec<MockDescriptor>,
    /// Prepared since the last `issue_pending`
    queued: Vec<usize>,
    /// Handed to the hardware by `issue_pending`
    started: Vec<usize>,
    status: Vec<EngineStatus>,
    transferred: Vec<Option<u32>>,
    issued: usize,
    terminated: usize,
    paused: bool,
    interrupts: bool,
    reject_prep: bool,
    /// Preparations that succeed before the rest are rejected
    prep_budget: Option<usize>,
}

/// Mock engine channel
///
/// Clones share state, so a test can hold a handle to a channel the
/// backend owns. Cookies are numbered per channel from 0 in preparation
/// order; every descriptor stays in progress until the test completes it.
/// `terminate_all` discards descriptors that were prepared but not issued.
#[derive(Debug, Clone, Default)]
pub struct MockEngineChannel {
    shared: Arc<Mutex<EngineShared>>,
}

impl MockEngineChannel {
    pub fn config(&self) -> Option<EngineConfig> {
        lock(&self.shared).config
    }

    pub fn descriptors(&self) -> Vec<MockDescriptor> {
        lock(&self.shared).descriptors.clone()
    }

    /// Descriptors started by `issue_pending`, in issue order
    pub fn started(&self) -> Vec<MockDescriptor> {
        let shared = lock(&self.shared);
        shared.started.iter().map(|&i| shared.descriptors[i]).collect()
    }

    /// Number of `issue_pending` calls
    pub fn issued(&self) -> usize {
        lock(&self.shared).issued
    }

    /// Number of `terminate_all` calls
    pub fn terminated(&self) -> usize {
        lock(&self.shared).terminated
    }

    pub fn paused(&self) -> bool {
        lock(&self.shared).paused
    }

    pub fn interrupts(&self) -> bool {
        lock(&self.shared).interrupts
    }

    /// Finish a descriptor, optionally reporting the bytes moved
    pub fn complete(&self, cookie: Cookie, transferred: Option<u32>) {
        let mut shared = lock(&self.shared);
        let index = cookie.0 as usize;
        shared.status[index] = EngineStatus::Complete;
        shared.transferred[index] = transferred;
    }

    /// Finish a descriptor with an error
    pub fn fail(&self, cookie: Cookie) {
        lock(&self.shared).status[cookie.0 as usize] = EngineStatus::Error;
    }

    /// Make descriptor preparation fail
    pub fn reject_prep(&self, reject: bool) {
        lock(&self.shared).reject_prep = reject;
    }

    /// Let `count` more preparations succeed, then reject the rest
    pub fn reject_prep_after(&self, count: usize) {
        lock(&self.shared).prep_budget = Some(count);
    }
}

impl EngineChannel for MockEngineChannel {
    fn configure(&mut self, config: EngineConfig) -> Result<()> {
        lock(&self.shared).config = Some(config);
        Ok(())
    }

    fn prep_slave_single(&mut self, addr: u64, len: u32, flags: u32) -> DmaResult<Cookie> {
        let mut shared = lock(&self.shared);
        if shared.reject_prep {
            return Err(DmaError::DescriptorRejected);
        }
        if let Some(budget) = shared.prep_budget.as_mut() {
            if *budget == 0 {
                return Err(DmaError::DescriptorRejected);
            }
            *budget -= 1;
        }
        let index = shared.descriptors.len();
        let cookie = Cookie(index as u32);
        shared.descriptors.push(MockDescriptor { addr, len, flags });
        shared.queued.push(index);
        shared.status.push(EngineStatus::InProgress);
        shared.transferred.push(None);
        Ok(cookie)
    }

    fn issue_pending(&mut self) {
        let mut shared = lock(&self.shared);
        let queued = core::mem::take(&mut shared.queued);
        shared.started.extend(queued);
        shared.issued += 1;
    }

    fn status(&self, cookie: Cookie) -> EngineStatus {
        lock(&self.shared)
            .status
            .get(cookie.0 as usize)
            .copied()
            .unwrap_or(EngineStatus::Error)
    }

    fn transferred(&self, cookie: Cookie) -> Option<u32> {
        lock(&self.shared)
            .transferred
            .get(cookie.0 as usize)
            .copied()
            .flatten()
    }

    fn terminate_all(&mut self) -> Result<()> {
        let mut shared = lock(&self.shared);
        shared.queued.clear();
        shared.terminated += 1;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        lock(&self.shared).paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        lock(&self.shared).paused = false;
        Ok(())
    }

    fn set_interrupts(&mut self, enable: bool) {
        lock(&self.shared).interrupts = enable;
    }
}

/// Mock DMA engine handing out [`MockEngineChannel`]s by name
#[derive(Debug, Default)]
pub struct MockDmaEngine {
    missing: Vec<String>,
    channels: Mutex<BTreeMap<String, MockEngineChannel>>,
}

impl MockDmaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make requests for `name` fail
    #[must_use]
    pub fn without_channel(mut self, name: &str) -> Self {
        self.missing.push(name.to_string());
        self
    }

    /// Handle to a channel the engine has handed out
    pub fn channel(&self, name: &str) -> Option<MockEngineChannel> {
        lock(&self.channels).get(name).cloned()
    }
}

impl DmaEngine for MockDmaEngine {
    type Channel = MockEngineChannel;

    fn request_channel(&self, name: &str) -> Result<MockEngineChannel> {
        if self.missing.iter().any(|m| m == name) {
            return Err(ConfigError::InvalidChannel.into());
        }
        let chan = MockEngineChannel::default();
        lock(&self.channels).insert(name.to_string(), chan.clone());
        Ok(chan)
    }
}

// =============================================================================
// Delays
// =============================================================================

/// Delay that returns immediately, counting what was asked for
///
/// An optional hook runs on every delay; tests use it to play the
/// completion path while a caller is blocked.
#[derive(Default)]
pub struct MockDelay<'a> {
    pub calls: u32,
    pub total_ns: u64,
    hook: Option<Box<dyn FnMut() + 'a>>,
}

impl<'a> MockDelay<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` on every delay
    pub fn with_hook(hook: impl FnMut() + 'a) -> Self {
        Self {
            calls: 0,
            total_ns: 0,
            hook: Some(Box::new(hook)),
        }
    }
}

impl DelayNs for MockDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.calls += 1;
        self.total_ns += u64::from(ns);
        if let Some(hook) = self.hook.as_mut() {
            hook();
        }
    }
}

/// Delay that really sleeps, for threaded tests
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}

// =============================================================================
// Event Recording
// =============================================================================

/// Event sink that records every hook call
#[derive(Debug, Default)]
pub struct RecordingEvents {
    completed: Mutex<Vec<TransView>>,
    released: Mutex<Vec<TransView>>,
    tx_queued: Mutex<Vec<(u8, u32, u32)>>,
    tx_completed: Mutex<Vec<(u8, u32, u32)>>,
    errors: Mutex<Vec<(u8, DmaError)>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> Vec<TransView> {
        lock(&self.completed).clone()
    }

    pub fn released(&self) -> Vec<TransView> {
        lock(&self.released).clone()
    }

    pub fn tx_queued(&self) -> Vec<(u8, u32, u32)> {
        lock(&self.tx_queued).clone()
    }

    pub fn tx_completed(&self) -> Vec<(u8, u32, u32)> {
        lock(&self.tx_completed).clone()
    }

    pub fn errors(&self) -> Vec<(u8, DmaError)> {
        lock(&self.errors).clone()
    }
}

impl TransportEvents for RecordingEvents {
    fn trans_complete(&self, trans: &TransView) {
        lock(&self.completed).push(*trans);
    }

    fn trans_release(&self, trans: &TransView) {
        lock(&self.released).push(*trans);
    }

    fn tx_queued(&self, channel_id: u8, trans_count: u32, byte_count: u32) {
        lock(&self.tx_queued).push((channel_id, trans_count, byte_count));
    }

    fn tx_completed(&self, channel_id: u8, trans_count: u32, byte_count: u32) {
        lock(&self.tx_completed).push((channel_id, trans_count, byte_count));
    }

    fn channel_error(&self, channel_id: u8, error: DmaError) {
        lock(&self.errors).push((channel_id, error));
    }
}

// =============================================================================
// Wakers
// =============================================================================

/// Counts wake-ups of a test waker
#[derive(Debug, Default)]
pub struct WakeCount(AtomicUsize);

impl WakeCount {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl Wake for WakeCount {
    fn wake(self: Arc<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A waker and the counter it bumps
pub fn counting_waker() -> (Waker, Arc<WakeCount>) {
    let count = Arc::new(WakeCount::default());
    (Waker::from(count.clone()), count)
}

// =============================================================================
// Fixtures
// =============================================================================

/// Ring geometry used by the fixtures: 8 TREs, 8 events, 4-deep TLV FIFO,
/// giving a budget of 5 TREs and at most 4 per transaction
pub const TEST_RING: RingGeometry = RingGeometry::new(8, 8, 4);

/// v4.2 table: command channel 3, LAN receive channel 2, transmit channel 4
pub fn ring_config() -> TransportConfig {
    TransportConfig::new(ProtocolVersion::V4_2)
        .with_endpoint(
            EndpointConfig::new("cmd_tx", 3, 3)
                .with_toward_device(true)
                .with_command(true)
                .with_ring(TEST_RING),
        )
        .with_endpoint(EndpointConfig::new("lan_rx", 2, 2).with_ring(TEST_RING))
        .with_endpoint(
            EndpointConfig::new("lan_tx", 4, 4)
                .with_toward_device(true)
                .with_ring(TEST_RING),
        )
        .with_lan_rx_endpoint(2)
}

/// Ring transport over [`ring_config`], set up with every channel started
pub fn ring_transport<E: TransportEvents>(events: E) -> Transport<RingBackend<MockRingHw>, E> {
    let transport =
        Transport::new(RingBackend::new(MockRingHw::new()), &ring_config(), events).unwrap();
    transport.setup().unwrap();
    for id in [2, 3, 4] {
        transport.channel_start(id).unwrap();
    }
    transport
}

/// Engine transport over the reference v2.6L table, set up
pub fn engine_transport<E: TransportEvents>(
    events: E,
) -> Transport<EngineBackend<MockDmaEngine>, E> {
    let transport = Transport::new(
        EngineBackend::new(MockDmaEngine::new()),
        &TransportConfig::engine_reference(),
        events,
    )
    .unwrap();
    transport.setup().unwrap();
    transport
}
