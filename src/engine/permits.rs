//! Interruptible counting semaphore.
//!
//! Slots are tokens in a bounded channel: acquiring receives one, dropping
//! the permit sends it back.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::shutdown::Shutdown;

/// Fixed pool of concurrency slots.
#[derive(Debug, Clone)]
pub struct Permits {
    tx: Sender<()>,
    rx: Receiver<()>,
    capacity: usize,
}

impl Permits {
    /// Creates a pool with `slots` permits (at least one).
    #[must_use]
    pub fn new(slots: usize) -> Self {
        let capacity = slots.max(1);
        let (tx, rx) = bounded::<()>(capacity);
        for _ in 0..capacity {
            let _ = tx.try_send(());
        }
        Self { tx, rx, capacity }
    }

    /// Total number of slots.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.rx.len()
    }

    /// Waits for a slot in `tick`-sized slices.
    ///
    /// Returns `None` once `shutdown` is requested.
    pub fn acquire(&self, shutdown: &Shutdown, tick: Duration) -> Option<Permit> {
        loop {
            if shutdown.is_requested() {
                return None;
            }
            match self.rx.recv_timeout(tick) {
                Ok(()) => {
                    return Some(Permit {
                        tx: self.tx.clone(),
                    })
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

/// A held slot, released on drop.
#[derive(Debug)]
pub struct Permit {
    tx: Sender<()>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let _ = self.tx.try_send(());
    }
}
