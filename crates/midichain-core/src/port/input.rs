//! Software MIDI input port.
//!
//! Stands in for a driver-backed port: the driver side feeds it through
//! [`MidiInPort::handle_driver_message`] (or the `deliver_*` helpers), and it
//! routes every message into its chain.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::buffer::MidiBuffer;
use crate::chain::{
    ChainLink, ChainOf, MidiDataErrorReceiver, MidiDataReceiver, MidiPortEventReceiver,
};
use crate::config::BufferPoolConfig;
use crate::error::{Error, Result};
use crate::event::{PortEvent, Timestamp};
use crate::pool::BufferPool;

use super::{MidiPort, PortKind, PortStatus, PortStatusCell, StatusListener, SubscriptionId};

/// One callback from the input driver.
#[derive(Debug, Clone)]
pub enum DriverMessage {
    Open,
    Close,
    Data { data: u32, timestamp: Timestamp },
    MoreData { data: u32, timestamp: Timestamp },
    Error { data: u32, timestamp: Timestamp },
    LongData { buffer: MidiBuffer, timestamp: Timestamp },
    LongError { buffer: MidiBuffer, timestamp: Timestamp },
}

pub struct MidiInPort {
    name: String,
    status: PortStatusCell,
    link: ChainLink,
    pool: Arc<BufferPool>,
    config: BufferPoolConfig,
    auto_return: AtomicBool,
    /// Set for the duration of `close`; returns go to the pool.
    closing: AtomicBool,
    /// Buffers currently handed to the driver, in fill order.
    driver_queue: Mutex<VecDeque<MidiBuffer>>,
}

impl MidiInPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, BufferPoolConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: BufferPoolConfig) -> Self {
        Self {
            name: name.into(),
            status: PortStatusCell::new(PortStatus::CLOSED),
            link: ChainLink::new(),
            pool: Arc::new(BufferPool::new()),
            config,
            auto_return: AtomicBool::new(true),
            closing: AtomicBool::new(false),
            driver_queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BufferPoolConfig {
        &self.config
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Allocates the port's long-message buffers from its configuration.
    pub fn initialize_buffers(&self) -> Result<()> {
        self.pool.initialize_with(&self.config)
    }

    pub fn auto_return_buffers(&self) -> bool {
        self.auto_return.load(Ordering::Acquire)
    }

    /// With auto-return on, the port takes a long buffer back once the
    /// synchronous forward is over and every stage that retained it has
    /// released it. Turn off when the application returns buffers itself
    /// through [`Self::return_buffer`].
    pub fn set_auto_return_buffers(&self, auto_return: bool) {
        self.auto_return.store(auto_return, Ordering::Release);
    }

    pub fn queued_buffer_count(&self) -> usize {
        self.driver_queue.lock().len()
    }

    pub fn set_receiver(&self, receiver: Option<Arc<dyn MidiDataReceiver>>) -> Result<()> {
        self.ensure_not_started()?;
        self.link.set_receiver(receiver)
    }

    pub fn receiver(&self) -> Option<Arc<dyn MidiDataReceiver>> {
        self.link.receiver()
    }

    pub fn set_error_receiver(
        &self,
        receiver: Option<Arc<dyn MidiDataErrorReceiver>>,
    ) -> Result<()> {
        self.ensure_not_started()?;
        self.link.set_error_receiver(receiver)
    }

    pub fn error_receiver(&self) -> Option<Arc<dyn MidiDataErrorReceiver>> {
        self.link.error_receiver()
    }

    pub fn set_port_event_receiver(
        &self,
        receiver: Option<Arc<dyn MidiPortEventReceiver>>,
    ) -> Result<()> {
        self.ensure_not_started()?;
        self.link.set_port_event_receiver(receiver)
    }

    pub fn port_event_receiver(&self) -> Option<Arc<dyn MidiPortEventReceiver>> {
        self.link.port_event_receiver()
    }

    pub fn open(&self) -> Result<()> {
        if !self.status.has(PortStatus::CLOSED) {
            return Err(Error::InvalidState(format!(
                "port '{}' is already open",
                self.name
            )));
        }
        if self.pool.is_initialized() {
            self.pool.prepare_all();
        }
        self.handle_driver_message(DriverMessage::Open);
        self.queue_free_buffers();
        tracing::debug!("MIDI in port '{}' opened", self.name);
        Ok(())
    }

    /// Starts delivery. Needs a data or port-event receiver to deliver to.
    pub fn start(&self) -> Result<()> {
        self.ensure_open()?;
        if self.link.receiver().is_none() && self.link.port_event_receiver().is_none() {
            return Err(Error::InvalidState(format!(
                "port '{}' has no receiver to start into",
                self.name
            )));
        }
        self.status
            .modify(PortStatus::STARTED, PortStatus::STOPPED | PortStatus::PAUSED)?;
        self.queue_free_buffers();
        tracing::debug!("MIDI in port '{}' started", self.name);
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.ensure_open()?;
        self.status
            .modify(PortStatus::STOPPED, PortStatus::STARTED | PortStatus::PAUSED)?;
        tracing::debug!("MIDI in port '{}' stopped", self.name);
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        self.ensure_open()?;
        self.status.modify(PortStatus::PAUSED, PortStatus::STARTED)?;
        tracing::debug!("MIDI in port '{}' paused", self.name);
        Ok(())
    }

    /// Stops delivery and hands every driver-queued buffer back to the pool.
    pub fn reset(&self) -> Result<()> {
        self.ensure_open()?;
        self.status.modify(
            PortStatus::RESET | PortStatus::STOPPED,
            PortStatus::STARTED | PortStatus::PAUSED,
        )?;
        self.flush_driver_queue();
        tracing::debug!("MIDI in port '{}' reset", self.name);
        Ok(())
    }

    /// Closing an already closed port is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.status.has(PortStatus::CLOSED) {
            return Ok(());
        }
        if self.status.has(PortStatus::STARTED) {
            self.stop()?;
        }
        self.closing.store(true, Ordering::Release);
        self.flush_driver_queue();

        if self.pool.is_initialized()
            && !self.pool.wait_for_all_returned(self.config.return_timeout)
        {
            tracing::warn!(
                "MIDI in port '{}' closing with {} buffer(s) not returned",
                self.name,
                self.pool.used_count()
            );
        }
        self.pool.unprepare_all();
        self.handle_driver_message(DriverMessage::Close);
        self.closing.store(false, Ordering::Release);
        tracing::debug!("MIDI in port '{}' closed", self.name);
        Ok(())
    }

    /// Hands a long buffer back once the application is done with it.
    ///
    /// While the port is open the buffer goes straight back to the driver;
    /// after reset, or once closing has begun, it returns to the pool. A
    /// buffer already queued with the driver is refused.
    pub fn return_buffer(&self, buffer: &MidiBuffer) -> Result<()> {
        if buffer.is_in_queue() {
            return Err(Error::StillInUse);
        }

        let status = self.status.get();
        if status.intersects(PortStatus::RESET | PortStatus::CLOSED)
            || !status.intersects(PortStatus::OPEN)
            || self.closing.load(Ordering::Acquire)
        {
            buffer.mark_done();
            return self.pool.return_buffer(buffer);
        }

        if !self.pool.is_checked_out(buffer) {
            return Err(Error::NotCheckedOut);
        }
        buffer.clear();
        buffer.clear_done();
        buffer.mark_in_queue();
        self.driver_queue.lock().push_back(buffer.clone());
        Ok(())
    }

    /// Driver callback entry.
    ///
    /// Data arriving while the port is not started is dropped; long buffers
    /// that arrive that way, or empty ones, go back without being forwarded.
    pub fn handle_driver_message(&self, message: DriverMessage) {
        match message {
            DriverMessage::Open => self.status.set(PortStatus::OPEN),
            DriverMessage::Close => self.status.set(PortStatus::CLOSED),
            DriverMessage::Data { data, timestamp } => {
                if self.accepting() {
                    self.link.forward_short_data(data, timestamp);
                    self.link
                        .forward_port_event(&PortEvent::short_data(data, timestamp));
                }
            }
            DriverMessage::MoreData { data, timestamp } => {
                if self.accepting() {
                    self.link.forward_short_data(data, timestamp);
                    self.link
                        .forward_port_event(&PortEvent::more_data(data, timestamp));
                }
            }
            DriverMessage::Error { data, timestamp } => {
                if self.accepting() {
                    self.link.forward_short_error(data, timestamp);
                    self.link
                        .forward_port_event(&PortEvent::short_error(data, timestamp));
                }
            }
            DriverMessage::LongData { buffer, timestamp } => {
                self.handle_long(buffer, timestamp, false);
            }
            DriverMessage::LongError { buffer, timestamp } => {
                self.handle_long(buffer, timestamp, true);
            }
        }
    }

    /// Fills the next driver-queued buffer with `bytes` and delivers it.
    pub fn deliver_long_data(&self, bytes: &[u8], timestamp: Timestamp) -> Result<()> {
        let buffer = self.fill_next_buffer(bytes)?;
        self.handle_driver_message(DriverMessage::LongData { buffer, timestamp });
        Ok(())
    }

    pub fn deliver_long_error(&self, bytes: &[u8], timestamp: Timestamp) -> Result<()> {
        let buffer = self.fill_next_buffer(bytes)?;
        self.handle_driver_message(DriverMessage::LongError { buffer, timestamp });
        Ok(())
    }

    fn fill_next_buffer(&self, bytes: &[u8]) -> Result<MidiBuffer> {
        let buffer = self.driver_queue.lock().pop_front().ok_or_else(|| {
            Error::InvalidState(format!("port '{}' has no buffer queued", self.name))
        })?;
        if let Err(e) = buffer.write(bytes) {
            self.driver_queue.lock().push_front(buffer);
            return Err(e);
        }
        buffer.clear_in_queue();
        buffer.mark_done();
        Ok(buffer)
    }

    fn handle_long(&self, buffer: MidiBuffer, timestamp: Timestamp, error: bool) {
        buffer.clear_in_queue();
        buffer.mark_done();

        if buffer.bytes_recorded() == 0 || !self.accepting() {
            self.give_back(&buffer);
            return;
        }

        // held by the port itself until the synchronous forward is over
        buffer.retain();
        if error {
            self.link.forward_long_error(&buffer, timestamp);
            self.link
                .forward_port_event(&PortEvent::long_error(buffer.clone(), timestamp));
        } else {
            self.link.forward_long_data(&buffer, timestamp);
            self.link
                .forward_port_event(&PortEvent::long_data(buffer.clone(), timestamp));
        }

        self.release_hold(&buffer);
    }

    fn release_hold(&self, buffer: &MidiBuffer) {
        if buffer.release() && self.auto_return_buffers() {
            self.give_back(buffer);
        }
    }

    fn give_back(&self, buffer: &MidiBuffer) {
        if let Err(e) = self.return_buffer(buffer) {
            tracing::warn!(
                "MIDI in port '{}' could not return buffer {}: {}",
                self.name,
                buffer.index(),
                e
            );
        }
    }

    fn queue_free_buffers(&self) {
        if !self.pool.is_initialized() {
            return;
        }
        let mut queue = self.driver_queue.lock();
        while let Some(buffer) = self.pool.retrieve() {
            buffer.mark_in_queue();
            queue.push_back(buffer);
        }
    }

    fn flush_driver_queue(&self) {
        let drained: Vec<MidiBuffer> = self.driver_queue.lock().drain(..).collect();
        for buffer in drained {
            buffer.clear_in_queue();
            buffer.mark_done();
            if let Err(e) = self.pool.return_buffer(&buffer) {
                tracing::warn!(
                    "MIDI in port '{}' could not flush buffer {}: {}",
                    self.name,
                    buffer.index(),
                    e
                );
            }
        }
    }

    #[inline]
    fn accepting(&self) -> bool {
        self.status.has(PortStatus::STARTED)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.status.has(PortStatus::CLOSED) {
            return Err(Error::InvalidState(format!(
                "port '{}' is not open",
                self.name
            )));
        }
        Ok(())
    }

    fn ensure_not_started(&self) -> Result<()> {
        if self.status.has(PortStatus::STARTED) {
            return Err(Error::InvalidState(format!(
                "cannot change a successor while port '{}' is started",
                self.name
            )));
        }
        Ok(())
    }
}

impl MidiPort for MidiInPort {
    fn kind(&self) -> PortKind {
        PortKind::Input
    }

    fn status(&self) -> PortStatus {
        self.status.get()
    }

    fn subscribe(&self, listener: StatusListener) -> SubscriptionId {
        self.status.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.status.unsubscribe(id)
    }

    fn release_buffer(&self, buffer: &MidiBuffer) {
        self.release_hold(buffer);
    }
}

impl ChainOf<dyn MidiDataReceiver> for MidiInPort {
    fn successor(&self) -> Option<Arc<dyn MidiDataReceiver>> {
        self.receiver()
    }

    fn set_successor(&self, successor: Option<Arc<dyn MidiDataReceiver>>) -> Result<()> {
        self.set_receiver(successor)
    }
}

impl ChainOf<dyn MidiDataErrorReceiver> for MidiInPort {
    fn successor(&self) -> Option<Arc<dyn MidiDataErrorReceiver>> {
        self.error_receiver()
    }

    fn set_successor(&self, successor: Option<Arc<dyn MidiDataErrorReceiver>>) -> Result<()> {
        self.set_error_receiver(successor)
    }
}

impl ChainOf<dyn MidiPortEventReceiver> for MidiInPort {
    fn successor(&self) -> Option<Arc<dyn MidiPortEventReceiver>> {
        self.port_event_receiver()
    }

    fn set_successor(&self, successor: Option<Arc<dyn MidiPortEventReceiver>>) -> Result<()> {
        self.set_port_event_receiver(successor)
    }
}

impl Drop for MidiInPort {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("MIDI in port '{}' failed to close on drop: {}", self.name, e);
        }
    }
}

impl std::fmt::Debug for MidiInPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiInPort")
            .field("name", &self.name)
            .field("status", &self.status.get())
            .field("queued_buffers", &self.queued_buffer_count())
            .field("auto_return", &self.auto_return_buffers())
            .finish()
    }
}
