//! Synchronization primitives for ISR-safe access.
//!
//! Channel state, transaction completion and harvester wake-ups are all
//! touched from both task context and the completion interrupt; these are
//! the types they share.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "async")]
use core::task::Waker;
use critical_section::Mutex;

/// Cell providing interior mutability with critical section protection.
///
/// Every channel keeps its queues, pools and backend state in one of these.
/// Closures run with interrupts disabled and must stay short; nothing that
/// waits or calls out to event hooks may run inside them.
pub struct CriticalSectionCell<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> CriticalSectionCell<T> {
    /// Create a new cell (const, suitable for static initialization).
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` with exclusive access.
    ///
    /// # Panics
    ///
    /// Re-entering the same cell from inside `f` panics.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    /// Run `f` with shared access.
    #[inline]
    pub fn with_ref<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        critical_section::with(|cs| f(&self.inner.borrow_ref(cs)))
    }
}

// SAFETY: all access goes through a critical section; the value may be
// reached from any context, so it must be `Send`.
unsafe impl<T: Send> Sync for CriticalSectionCell<T> {}

/// One-shot completion signal.
///
/// Set once by the completion path, observed by any number of waiters.
/// [`Completion::reset`] re-arms it when its transaction slot is reused.
pub struct Completion {
    done: AtomicBool,
    #[cfg(feature = "async")]
    waker: AtomicWaker,
}

impl Completion {
    /// Create an unsignalled completion.
    pub const fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            #[cfg(feature = "async")]
            waker: AtomicWaker::new(),
        }
    }

    /// Signal completion and wake a registered waiter.
    #[inline]
    pub fn complete(&self) {
        self.done.store(true, Ordering::Release);
        #[cfg(feature = "async")]
        self.waker.wake();
    }

    /// Whether completion has been signalled.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Re-arm the signal.
    #[inline]
    pub fn reset(&self) {
        self.done.store(false, Ordering::Release);
    }

    /// Register a waker to be woken on completion.
    #[cfg(feature = "async")]
    pub fn register(&self, waker: &Waker) {
        self.waker.register(waker);
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

/// Interrupt-safe storage for one waker.
///
/// Registered from a future's `poll`, taken and woken from the completion
/// path.
#[cfg(feature = "async")]
pub struct AtomicWaker {
    waker: CriticalSectionCell<Option<Waker>>,
}

#[cfg(feature = "async")]
impl AtomicWaker {
    /// Create an empty slot.
    pub const fn new() -> Self {
        Self {
            waker: CriticalSectionCell::new(None),
        }
    }

    /// Store `waker`, replacing any different one.
    pub fn register(&self, waker: &Waker) {
        self.waker.with(|slot| {
            if !slot.as_ref().is_some_and(|w| w.will_wake(waker)) {
                *slot = Some(waker.clone());
            }
        });
    }

    /// Take and wake the stored waker, if any.
    #[inline]
    pub fn wake(&self) {
        // Woken outside the critical section
        if let Some(waker) = self.waker.with(Option::take) {
            waker.wake();
        }
    }
}

#[cfg(feature = "async")]
impl Default for AtomicWaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::std_instead_of_core, clippy::std_instead_of_alloc)]
mod tests {
    extern crate std;

    use super::*;
    #[cfg(feature = "async")]
    use crate::testing::counting_waker;

    #[test]
    fn cell_with_mutates_and_returns() {
        let cell = CriticalSectionCell::new(3u32);
        let doubled = cell.with(|v| {
            *v += 1;
            *v * 2
        });
        assert_eq!(doubled, 8);
        assert_eq!(cell.with_ref(|v| *v), 4);
    }

    #[test]
    fn cell_in_static() {
        static COUNTER: CriticalSectionCell<u32> = CriticalSectionCell::new(0);
        COUNTER.with(|v| *v = 100);
        assert_eq!(COUNTER.with_ref(|v| *v), 100);
    }

    #[test]
    fn nested_cells_lock_independently() {
        let outer = CriticalSectionCell::new(1u32);
        let inner = CriticalSectionCell::new(2u32);
        let sum = outer.with(|a| inner.with(|b| *a + *b));
        assert_eq!(sum, 3);
    }

    #[test]
    fn completion_signals_once_and_resets() {
        let done = Completion::new();
        assert!(!done.is_complete());
        done.complete();
        done.complete();
        assert!(done.is_complete());
        done.reset();
        assert!(!done.is_complete());
    }

    #[test]
    fn completion_seen_across_threads() {
        let done = Completion::default();
        std::thread::scope(|s| {
            s.spawn(|| done.complete());
        });
        assert!(done.is_complete());
    }

    #[cfg(feature = "async")]
    #[test]
    fn completion_wakes_registered_waker() {
        let done = Completion::new();
        let (waker, wakes) = counting_waker();
        done.register(&waker);
        done.complete();
        assert_eq!(wakes.count(), 1);
    }

    #[cfg(feature = "async")]
    #[test]
    fn waker_is_taken_by_wake() {
        let slot = AtomicWaker::new();
        let (waker, wakes) = counting_waker();
        slot.register(&waker);
        slot.wake();
        slot.wake();
        assert_eq!(wakes.count(), 1);
    }

    #[cfg(feature = "async")]
    #[test]
    fn later_registration_replaces_earlier() {
        let slot = AtomicWaker::default();
        let (first, first_wakes) = counting_waker();
        let (second, second_wakes) = counting_waker();
        slot.register(&first);
        slot.register(&second);
        slot.wake();
        assert_eq!(first_wakes.count(), 0);
        assert_eq!(second_wakes.count(), 1);
    }
}
