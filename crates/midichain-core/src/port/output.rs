//! Software MIDI output port, terminal of a send chain.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::buffer::MidiBuffer;
use crate::chain::{MidiComponent, MidiDataSender};
use crate::config::BufferPoolConfig;
use crate::error::{Error, Result};
use crate::pool::BufferPool;

use super::{MidiPort, PortKind, PortStatus, PortStatusCell, StatusListener, SubscriptionId};

/// Where an out port's bytes end up.
pub trait MidiOutTransport: Send {
    fn send_short(&mut self, data: u32) -> Result<()>;

    fn send_long(&mut self, bytes: &[u8]) -> Result<()>;

    /// Silences the device. Most transports have nothing to do.
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct MidiOutPort {
    name: String,
    kind: PortKind,
    status: PortStatusCell,
    pool: Arc<BufferPool>,
    config: BufferPoolConfig,
    transport: Mutex<Box<dyn MidiOutTransport>>,
}

impl MidiOutPort {
    pub fn new(name: impl Into<String>, transport: Box<dyn MidiOutTransport>) -> Self {
        Self::with_config(name, transport, BufferPoolConfig::default())
    }

    pub fn with_config(
        name: impl Into<String>,
        transport: Box<dyn MidiOutTransport>,
        config: BufferPoolConfig,
    ) -> Self {
        Self {
            name: name.into(),
            kind: PortKind::Output,
            status: PortStatusCell::new(PortStatus::CLOSED),
            pool: Arc::new(BufferPool::new()),
            config,
            transport: Mutex::new(transport),
        }
    }

    /// Marks the port as a stream port. Stream ports accept the same
    /// chain stages as plain output ports.
    pub fn into_stream(mut self) -> Self {
        self.kind = PortKind::OutputStream;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pool to take long-message buffers from before sending them.
    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Opens the port, allocating its buffers on first use.
    pub fn open(&self) -> Result<()> {
        if !self.status.has(PortStatus::CLOSED) {
            return Err(Error::InvalidState(format!(
                "port '{}' is already open",
                self.name
            )));
        }
        if !self.pool.is_initialized() {
            self.pool.initialize_with(&self.config)?;
        }
        self.pool.prepare_all();
        self.status.set(PortStatus::OPEN);
        tracing::debug!("MIDI out port '{}' opened", self.name);
        Ok(())
    }

    pub fn reset(&self) -> Result<()> {
        self.ensure_open()?;
        self.transport.lock().reset()?;
        self.status.modify(PortStatus::RESET, PortStatus::NONE)?;
        tracing::debug!("MIDI out port '{}' reset", self.name);
        Ok(())
    }

    /// Closing an already closed port is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.status.has(PortStatus::CLOSED) {
            return Ok(());
        }
        if !self.pool.wait_for_all_returned(self.config.return_timeout) {
            tracing::warn!(
                "MIDI out port '{}' closing with {} buffer(s) not returned",
                self.name,
                self.pool.used_count()
            );
        }
        self.pool.unprepare_all();
        self.status.set(PortStatus::CLOSED);
        tracing::debug!("MIDI out port '{}' closed", self.name);
        Ok(())
    }

    pub fn send_short(&self, data: u32) -> Result<()> {
        self.ensure_open()?;
        self.transport.lock().send_short(data)
    }

    /// Sends the recorded bytes of `buffer`.
    ///
    /// The buffer is in-queue for the duration of the transport call and
    /// done afterwards, whether or not the transport succeeded.
    pub fn send_long(&self, buffer: &MidiBuffer) -> Result<()> {
        self.ensure_open()?;
        buffer.clear_done();
        buffer.mark_in_queue();
        let result = {
            let mut transport = self.transport.lock();
            buffer.with_bytes(|bytes| transport.send_long(bytes))
        };
        buffer.clear_in_queue();
        buffer.mark_done();
        result
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.status.has(PortStatus::OPEN) {
            return Err(Error::InvalidState(format!(
                "port '{}' is not open",
                self.name
            )));
        }
        Ok(())
    }
}

impl MidiComponent for MidiOutPort {}

impl MidiDataSender for MidiOutPort {
    fn short_data(&self, data: u32) {
        if let Err(e) = self.send_short(data) {
            tracing::error!("MIDI out port '{}' failed to send {:#08x}: {}", self.name, data, e);
        }
    }

    /// Buffers taken from this port's own pool are returned once sent.
    fn long_data(&self, buffer: &MidiBuffer) {
        if let Err(e) = self.send_long(buffer) {
            tracing::error!(
                "MIDI out port '{}' failed to send {} byte(s): {}",
                self.name,
                buffer.bytes_recorded(),
                e
            );
        }
        if self.pool.is_checked_out(buffer) {
            if let Err(e) = self.pool.return_buffer(buffer) {
                tracing::warn!("MIDI out port '{}' could not return buffer: {}", self.name, e);
            }
        }
    }
}

impl MidiPort for MidiOutPort {
    fn kind(&self) -> PortKind {
        self.kind
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
}

impl Drop for MidiOutPort {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("MIDI out port '{}' failed to close on drop: {}", self.name, e);
        }
    }
}

impl std::fmt::Debug for MidiOutPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiOutPort")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("status", &self.status.get())
            .finish()
    }
}
