//! FIFO of port events feeding one worker, with a separate wake signal.

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::time::Duration;

use midichain_core::{MidiBuffer, PortEvent, Timestamp};

/// Channel a queued record arrived on, and is redispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Data or error channel, chosen by the record kind.
    Data,
    PortEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    pub route: Route,
    pub event: PortEvent,
}

/// Record queue shared by a producer callback and one worker.
///
/// Pushing never blocks. The wake signal holds at most one token: any
/// number of signals before a receive wake it once.
pub struct MidiQueue {
    record_tx: Sender<QueueRecord>,
    record_rx: Receiver<QueueRecord>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl MidiQueue {
    pub fn new() -> Self {
        let (record_tx, record_rx) = unbounded();
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            record_tx,
            record_rx,
            wake_tx,
            wake_rx,
        }
    }

    pub fn push(&self, record: QueueRecord) {
        // both ends live in `self`, so the channel cannot be disconnected
        if self.record_tx.send(record).is_ok() {
            tracing::trace!("Queued record, {} pending", self.record_rx.len());
        }
    }

    fn push_data(&self, event: PortEvent) {
        self.push(QueueRecord {
            route: Route::Data,
            event,
        });
    }

    pub fn push_short_data(&self, data: u32, timestamp: Timestamp) {
        self.push_data(PortEvent::short_data(data, timestamp));
    }

    pub fn push_short_error(&self, data: u32, timestamp: Timestamp) {
        self.push_data(PortEvent::short_error(data, timestamp));
    }

    pub fn push_more_data(&self, data: u32, timestamp: Timestamp) {
        self.push_data(PortEvent::more_data(data, timestamp));
    }

    pub fn push_long_data(&self, buffer: &MidiBuffer, timestamp: Timestamp) {
        self.push_data(PortEvent::long_data(buffer.clone(), timestamp));
    }

    pub fn push_long_error(&self, buffer: &MidiBuffer, timestamp: Timestamp) {
        self.push_data(PortEvent::long_error(buffer.clone(), timestamp));
    }

    pub fn push_port_event(&self, event: &PortEvent) {
        self.push(QueueRecord {
            route: Route::PortEvent,
            event: event.clone(),
        });
    }

    pub fn pop(&self) -> Option<QueueRecord> {
        self.record_rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.record_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_rx.is_empty()
    }

    /// Takes every pending record out of the queue.
    pub fn drain(&self) -> Vec<QueueRecord> {
        let drained: Vec<_> = self.record_rx.try_iter().collect();
        if !drained.is_empty() {
            tracing::trace!("Drained {} queued record(s)", drained.len());
        }
        drained
    }

    /// Drops every pending record. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        self.drain().len()
    }

    /// Wakes the receiver once, whether or not records are pending.
    pub fn signal(&self) {
        let _ = self.wake_tx.try_send(());
    }

    /// Next record, blocking until one arrives. `None` when woken by
    /// [`Self::signal`] or when `timeout` elapsed first.
    pub fn recv(&self, timeout: Option<Duration>) -> Option<QueueRecord> {
        match timeout {
            None => select! {
                recv(self.record_rx) -> record => record.ok(),
                recv(self.wake_rx) -> _ => None,
            },
            Some(timeout) => select! {
                recv(self.record_rx) -> record => record.ok(),
                recv(self.wake_rx) -> _ => None,
                default(timeout) => None,
            },
        }
    }
}

impl Default for MidiQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MidiQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiQueue")
            .field("pending", &self.len())
            .field("signaled", &!self.wake_rx.is_empty())
            .finish()
    }
}
