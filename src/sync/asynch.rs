//! Async/await support for transactions and the harvester.
//!
//! Provides the future behind [`Trans::commit_wait_async`](crate::Trans::commit_wait_async)
//! and a future that resolves when a channel's harvester is scheduled, so an
//! executor task can drive [`Transport::poll`] instead of a softirq-style
//! loop.

use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::backend::Backend;
use crate::channel::Channel;
use crate::events::TransportEvents;
use crate::poll::PollHandle;
use crate::transport::Transport;
use crate::{IoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    /// Not yet committed; the future holds the owner's reference
    Idle,
    /// Committed; the future holds a waiter reference
    Waiting,
    /// Finished; no reference held
    Done,
}

/// Future that commits a transaction and resolves when it completes
///
/// Dropping the future before completion gives up the wait. The transaction
/// is freed if it was never committed, otherwise only the waiter's reference
/// is dropped and the harvester finishes the job.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct CommitWait<'t, B: Backend, E: TransportEvents> {
    transport: &'t Transport<B, E>,
    channel: &'t Channel<B::Channel>,
    slot: u16,
    state: WaitState,
}

impl<'t, B: Backend, E: TransportEvents> CommitWait<'t, B, E> {
    pub(crate) fn new(
        transport: &'t Transport<B, E>,
        channel: &'t Channel<B::Channel>,
        slot: u16,
    ) -> Self {
        Self {
            transport,
            channel,
            slot,
            state: WaitState::Idle,
        }
    }
}

impl<B: Backend, E: TransportEvents> Future for CommitWait<'_, B, E> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match this.state {
            WaitState::Idle => match this.transport.trans_commit_hold(this.channel, this.slot) {
                Ok(true) => this.state = WaitState::Waiting,
                Ok(false) => {
                    this.state = WaitState::Done;
                    return Poll::Ready(Ok(()));
                }
                Err(e) => {
                    this.state = WaitState::Done;
                    return Poll::Ready(Err(e));
                }
            },
            WaitState::Waiting => {}
            WaitState::Done => return Poll::Ready(Err(IoError::InvalidState.into())),
        }

        let completion = &this.channel.trans_sync(this.slot).completion;
        if !completion.is_complete() {
            completion.register(cx.waker());
            if !completion.is_complete() {
                return Poll::Pending;
            }
        }

        this.state = WaitState::Done;
        this.transport.trans_free(this.channel, this.slot);
        Poll::Ready(Ok(()))
    }
}

impl<B: Backend, E: TransportEvents> Drop for CommitWait<'_, B, E> {
    fn drop(&mut self) {
        if self.state != WaitState::Done {
            self.transport.trans_free(self.channel, self.slot);
        }
    }
}

/// Future that resolves once a channel's harvester is scheduled
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct PollReady<'t> {
    poll: &'t PollHandle,
}

impl Future for PollReady<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.poll.is_scheduled() {
            return Poll::Ready(());
        }
        self.poll.register(cx.waker());
        if self.poll.is_scheduled() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl<B: Backend, E: TransportEvents> Transport<B, E> {
    /// Wait until the harvester of a channel is scheduled
    ///
    /// ```ignore
    /// loop {
    ///     transport.poll_ready(ch)?.await;
    ///     while transport.poll(ch, POLL_WEIGHT)? == POLL_WEIGHT {}
    /// }
    /// ```
    pub fn poll_ready(&self, channel_id: u8) -> Result<PollReady<'_>> {
        let channel = self.channel(channel_id)?;
        Ok(PollReady {
            poll: &channel.poll,
        })
    }
}
