//! Moves dispatch off the driver callback thread.
//!
//! [`AsyncReceiver`] queues everything it receives and a worker thread
//! redispatches the records to its successors, in arrival order. The worker
//! follows the bound port: it starts when the port reports `Open` and exits
//! when it reports `Closed`, discarding whatever is still queued.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use midichain_core::{
    ChainLink, ChainOf, InitializeByPort, MidiBuffer, MidiComponent, MidiDataErrorReceiver,
    MidiDataReceiver, MidiPort, MidiPortEventReceiver, PortEvent, PortEventKind, PortStatus,
    Result, Timestamp,
};

use crate::queue::{MidiQueue, QueueRecord, Route};
use crate::subscription::PortSubscription;

#[derive(Default)]
struct WorkerSlot {
    running: bool,
    handle: Option<JoinHandle<()>>,
}

struct Shared {
    link: ChainLink,
    queue: MidiQueue,
    status: AtomicU32,
    /// Port that delivered the queued buffers; holds are released through it.
    port: Mutex<Option<Weak<dyn MidiPort>>>,
    worker: Mutex<WorkerSlot>,
}

impl Shared {
    #[inline]
    fn status(&self) -> PortStatus {
        PortStatus::from_bits(self.status.load(Ordering::Acquire))
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.status().intersects(PortStatus::CLOSED)
    }

    fn on_status(self: &Arc<Self>, status: PortStatus) {
        self.status.store(status.bits(), Ordering::Release);
        if status == PortStatus::OPEN {
            self.start_worker();
        } else if status.intersects(PortStatus::CLOSED) {
            // nothing queued before the close may survive into a reopen
            self.discard();
            self.queue.signal();
        }
    }

    fn start_worker(self: &Arc<Self>) {
        let mut slot = self.worker.lock();
        if slot.running {
            return;
        }
        if let Some(finished) = slot.handle.take() {
            let _ = finished.join();
        }

        let shared = Arc::clone(self);
        match thread::Builder::new()
            .name("midi-async-receiver".to_string())
            .spawn(move || shared.run())
        {
            Ok(handle) => {
                slot.running = true;
                slot.handle = Some(handle);
            }
            Err(e) => tracing::error!("Failed to spawn async receiver worker: {}", e),
        }
    }

    fn run(&self) {
        tracing::debug!("Async receiver worker started");
        loop {
            if let Some(record) = self.queue.recv(None) {
                if self.is_closed() {
                    self.release(&record);
                } else {
                    if catch_unwind(AssertUnwindSafe(|| self.dispatch(&record))).is_err() {
                        tracing::error!(
                            "Async receiver successor panicked on {:?} record",
                            record.event.kind()
                        );
                    }
                    self.release(&record);
                }
            }
            if !self.is_closed() {
                continue;
            }

            // Re-check under the slot lock so a reopen racing this exit
            // either sees `running` cleared or keeps this worker alive.
            let mut slot = self.worker.lock();
            if self.is_closed() {
                slot.running = false;
                let dropped = self.discard();
                tracing::debug!(
                    "Async receiver worker exiting, {} record(s) discarded",
                    dropped
                );
                return;
            }
        }
    }

    fn dispatch(&self, record: &QueueRecord) {
        let event = &record.event;
        if record.route == Route::PortEvent {
            self.link.forward_port_event(event);
            return;
        }

        let timestamp = event.timestamp();
        match (event.kind(), event.data(), event.buffer()) {
            (PortEventKind::ShortData | PortEventKind::MoreData, Some(data), _) => {
                self.link.forward_short_data(data, timestamp)
            }
            (PortEventKind::ShortError, Some(data), _) => {
                self.link.forward_short_error(data, timestamp)
            }
            (PortEventKind::LongData, _, Some(buffer)) => {
                self.link.forward_long_data(buffer, timestamp)
            }
            (PortEventKind::LongError, _, Some(buffer)) => {
                self.link.forward_long_error(buffer, timestamp)
            }
            _ => {}
        }
    }

    /// Drops the hold taken when `record` was queued.
    fn release(&self, record: &QueueRecord) {
        let Some(buffer) = record.event.buffer() else {
            return;
        };
        let port = self.port.lock().as_ref().and_then(Weak::upgrade);
        match port {
            Some(port) => port.release_buffer(buffer),
            None => {
                let _ = buffer.release();
            }
        }
    }

    /// Drops every queued record, releasing their buffers.
    fn discard(&self) -> usize {
        let drained = self.queue.drain();
        for record in &drained {
            self.release(record);
        }
        drained.len()
    }
}

/// Receiver stage that decouples its successors from the calling thread.
///
/// Receiving never blocks beyond the queue. Records that arrive while the
/// bound port is closed are dropped.
///
/// A queued long buffer is held until its record has been dispatched or
/// discarded, then released through the bound port, so an auto-returning
/// port takes it back only after the successors are done with it.
pub struct AsyncReceiver {
    shared: Arc<Shared>,
    subscription: PortSubscription,
}

impl AsyncReceiver {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                link: ChainLink::new(),
                queue: MidiQueue::new(),
                status: AtomicU32::new(PortStatus::CLOSED.bits()),
                port: Mutex::new(None),
                worker: Mutex::new(WorkerSlot::default()),
            }),
            subscription: PortSubscription::default(),
        }
    }

    pub fn link(&self) -> &ChainLink {
        &self.shared.link
    }

    /// Records queued and not yet dispatched.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.shared.worker.lock().running
    }

    /// Port status as last reported to this stage.
    pub fn port_status(&self) -> PortStatus {
        self.shared.status()
    }

    fn enqueue(&self, buffer: Option<&MidiBuffer>, push: impl FnOnce(&MidiQueue)) {
        if self.shared.is_closed() {
            tracing::trace!("Async receiver dropped a record, port closed");
            return;
        }
        if let Some(buffer) = buffer {
            buffer.retain();
        }
        push(&self.shared.queue);
    }
}

impl Default for AsyncReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiComponent for AsyncReceiver {
    fn port_binding(&self) -> Option<&dyn InitializeByPort> {
        Some(self)
    }

    /// Joins a finished worker and drops queued records. Disposing while the
    /// worker still runs only wakes it; close the port first.
    fn dispose(&self) {
        {
            let mut slot = self.shared.worker.lock();
            if slot.running {
                tracing::warn!("Async receiver disposed while its worker is still running");
                self.shared.queue.signal();
            } else if let Some(handle) = slot.handle.take() {
                let _ = handle.join();
            }
        }
        self.shared.discard();
    }
}

impl InitializeByPort for AsyncReceiver {
    fn initialize(&self, port: &Arc<dyn MidiPort>) -> Result<()> {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        self.subscription.attach(
            port,
            Arc::new(move |status: PortStatus| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_status(status);
                }
            }),
        )?;
        *self.shared.port.lock() = Some(Arc::downgrade(port));
        self.shared.on_status(port.status());
        Ok(())
    }

    fn uninitialize(&self, port: &Arc<dyn MidiPort>) -> Result<()> {
        self.subscription.detach(port)?;
        // queued buffers still go back through the port when discarded
        self.shared.discard();
        *self.shared.port.lock() = None;
        Ok(())
    }
}

impl MidiDataReceiver for AsyncReceiver {
    fn short_data(&self, data: u32, timestamp: Timestamp) {
        self.enqueue(None, |queue| queue.push_short_data(data, timestamp));
    }

    fn long_data(&self, buffer: &MidiBuffer, timestamp: Timestamp) {
        self.enqueue(Some(buffer), |queue| queue.push_long_data(buffer, timestamp));
    }

    fn as_chain(&self) -> Option<&dyn ChainOf<dyn MidiDataReceiver>> {
        Some(&self.shared.link)
    }
}

impl MidiDataErrorReceiver for AsyncReceiver {
    fn short_error(&self, data: u32, timestamp: Timestamp) {
        self.enqueue(None, |queue| queue.push_short_error(data, timestamp));
    }

    fn long_error(&self, buffer: &MidiBuffer, timestamp: Timestamp) {
        self.enqueue(Some(buffer), |queue| queue.push_long_error(buffer, timestamp));
    }

    fn as_chain(&self) -> Option<&dyn ChainOf<dyn MidiDataErrorReceiver>> {
        Some(&self.shared.link)
    }
}

impl MidiPortEventReceiver for AsyncReceiver {
    fn port_event(&self, event: &PortEvent) {
        self.enqueue(event.buffer(), |queue| queue.push_port_event(event));
    }

    fn as_chain(&self) -> Option<&dyn ChainOf<dyn MidiPortEventReceiver>> {
        Some(&self.shared.link)
    }
}

impl std::fmt::Debug for AsyncReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncReceiver")
            .field("port_status", &self.port_status())
            .field("pending", &self.pending())
            .field("running", &self.is_running())
            .finish()
    }
}
