//! Single-slot latest-value channel.
//!
//! Carries engine statuses from the push callback to the drain loop. The
//! producer never blocks: a value sent while the receiver is parked in
//! [`SlotReceiver::recv`] is handed over directly, anything sent while the
//! receiver is busy lands in a one-value buffer that newer values overwrite.
//!
//! So with the receiver parked, sending `S1, S2, S3` back to back delivers
//! `S1` then `S3`; `S2` is dropped and counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

struct SlotState<T> {
    /// Value claimed by a parked receiver.
    handoff: Option<T>,
    /// Most recent value sent while the receiver was busy.
    buffered: Option<T>,
    receiver_waiting: bool,
    senders: usize,
    receiver_alive: bool,
}

struct Shared<T> {
    state: Mutex<SlotState<T>>,
    notify: Notify,
    overwritten: AtomicU64,
}

/// Create a connected sender/receiver pair.
pub fn latest_slot<T>() -> (SlotSender<T>, SlotReceiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(SlotState {
            handoff: None,
            buffered: None,
            receiver_waiting: false,
            senders: 1,
            receiver_alive: true,
        }),
        notify: Notify::new(),
        overwritten: AtomicU64::new(0),
    });
    (
        SlotSender {
            shared: Arc::clone(&shared),
        },
        SlotReceiver { shared },
    )
}

/// Producer half. Cloneable; [`send`](Self::send) never blocks.
pub struct SlotSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> SlotSender<T> {
    /// Deliver `value`, returning whatever older value it displaced.
    ///
    /// A value sent after the receiver was dropped is returned as-is.
    pub fn send(&self, value: T) -> Option<T> {
        let displaced = {
            let mut state = self.shared.state.lock();
            if !state.receiver_alive {
                return Some(value);
            }
            if state.receiver_waiting && state.handoff.is_none() {
                state.receiver_waiting = false;
                state.handoff = Some(value);
                None
            } else {
                state.buffered.replace(value)
            }
        };
        if displaced.is_some() {
            let _ = self.shared.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.notify.notify_one();
        displaced
    }

    /// Whether the receiver is currently parked waiting for a value.
    pub fn is_receiver_waiting(&self) -> bool {
        self.shared.state.lock().receiver_waiting
    }

    /// Number of values overwritten before the receiver saw them.
    pub fn overwritten_count(&self) -> u64 {
        self.shared.overwritten.load(Ordering::Relaxed)
    }
}

impl<T> Clone for SlotSender<T> {
    fn clone(&self) -> Self {
        self.shared.state.lock().senders += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for SlotSender<T> {
    fn drop(&mut self) {
        let last = {
            let mut state = self.shared.state.lock();
            state.senders -= 1;
            state.senders == 0
        };
        if last {
            self.shared.notify.notify_one();
        }
    }
}

/// Consumer half.
pub struct SlotReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> SlotReceiver<T> {
    /// Wait for the next value.
    ///
    /// Returns `None` once every sender is gone and nothing is pending.
    /// Cancel safe: a value handed over to an abandoned `recv` is kept for
    /// the next call.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            {
                let mut state = self.shared.state.lock();
                if let Some(value) = state.handoff.take() {
                    state.receiver_waiting = false;
                    return Some(value);
                }
                if let Some(value) = state.buffered.take() {
                    state.receiver_waiting = false;
                    return Some(value);
                }
                if state.senders == 0 {
                    state.receiver_waiting = false;
                    return None;
                }
                state.receiver_waiting = true;
            }
            let _parked = Parked(&self.shared);
            self.shared.notify.notified().await;
        }
    }
}

/// Clears the waiting flag when a parked `recv` wakes or is dropped.
struct Parked<'a, T>(&'a Shared<T>);

impl<T> Drop for Parked<'_, T> {
    fn drop(&mut self) {
        self.0.state.lock().receiver_waiting = false;
    }
}

impl<T> Drop for SlotReceiver<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.receiver_alive = false;
        state.receiver_waiting = false;
        state.handoff = None;
        state.buffered = None;
    }
}
