//! Chain-of-responsibility contracts.
//!
//! Four independent channels run through a chain: data, error, port events
//! (receive side) and send. A component implements the channel traits it
//! takes part in and embeds a [`ChainLink`] holding its successors.
//!
//! Successors are not protected against concurrent dispatch. Instead they
//! may only change while the governing port is not started; a change while
//! started fails with [`Error::InvalidState`].

use parking_lot::RwLock;
use std::sync::{Arc, Weak};

use crate::buffer::MidiBuffer;
use crate::error::{Error, Result};
use crate::event::{PortEvent, Timestamp};
use crate::port::{MidiPort, PortStatus};

/// Lifecycle hooks shared by every chain component.
pub trait MidiComponent: Send + Sync {
    /// Components that need the port (status notifications, port kind)
    /// return themselves here.
    fn port_binding(&self) -> Option<&dyn InitializeByPort> {
        None
    }

    /// Releases the component's own resources. Called once by the chain
    /// manager on teardown.
    fn dispose(&self) {}
}

/// Port hookup, invoked by the chain manager at wiring and teardown time.
pub trait InitializeByPort {
    fn initialize(&self, port: &Arc<dyn MidiPort>) -> Result<()>;

    fn uninitialize(&self, port: &Arc<dyn MidiPort>) -> Result<()>;
}

/// Successor slot of one channel.
pub trait ChainOf<T: ?Sized>: Send + Sync {
    fn successor(&self) -> Option<Arc<T>>;

    fn set_successor(&self, successor: Option<Arc<T>>) -> Result<()>;

    /// Makes successor changes subject to `port`'s status.
    fn bind_port(&self, _port: &Arc<dyn MidiPort>) {}

    fn unbind_port(&self) {}
}

pub trait MidiDataReceiver: MidiComponent {
    fn short_data(&self, data: u32, timestamp: Timestamp);

    /// The buffer stays owned by the caller for the duration of the call.
    fn long_data(&self, buffer: &MidiBuffer, timestamp: Timestamp);

    /// `None` for terminal receivers.
    fn as_chain(&self) -> Option<&dyn ChainOf<dyn MidiDataReceiver>> {
        None
    }
}

pub trait MidiDataErrorReceiver: MidiComponent {
    fn short_error(&self, data: u32, timestamp: Timestamp);

    fn long_error(&self, buffer: &MidiBuffer, timestamp: Timestamp);

    fn as_chain(&self) -> Option<&dyn ChainOf<dyn MidiDataErrorReceiver>> {
        None
    }
}

pub trait MidiPortEventReceiver: MidiComponent {
    fn port_event(&self, event: &PortEvent);

    fn as_chain(&self) -> Option<&dyn ChainOf<dyn MidiPortEventReceiver>> {
        None
    }
}

pub trait MidiDataSender: MidiComponent {
    fn short_data(&self, data: u32);

    fn long_data(&self, buffer: &MidiBuffer);

    fn as_chain(&self) -> Option<&dyn ChainOf<dyn MidiDataSender>> {
        None
    }
}

/// Uniform view of a channel's trait object, used by chain managers.
pub trait ChainMember {
    fn chain(&self) -> Option<&dyn ChainOf<Self>>;

    fn binding(&self) -> Option<&dyn InitializeByPort>;

    fn release(&self);
}

impl ChainMember for dyn MidiDataReceiver {
    fn chain(&self) -> Option<&dyn ChainOf<Self>> {
        self.as_chain()
    }

    fn binding(&self) -> Option<&dyn InitializeByPort> {
        self.port_binding()
    }

    fn release(&self) {
        self.dispose();
    }
}

impl ChainMember for dyn MidiDataErrorReceiver {
    fn chain(&self) -> Option<&dyn ChainOf<Self>> {
        self.as_chain()
    }

    fn binding(&self) -> Option<&dyn InitializeByPort> {
        self.port_binding()
    }

    fn release(&self) {
        self.dispose();
    }
}

impl ChainMember for dyn MidiPortEventReceiver {
    fn chain(&self) -> Option<&dyn ChainOf<Self>> {
        self.as_chain()
    }

    fn binding(&self) -> Option<&dyn InitializeByPort> {
        self.port_binding()
    }

    fn release(&self) {
        self.dispose();
    }
}

impl ChainMember for dyn MidiDataSender {
    fn chain(&self) -> Option<&dyn ChainOf<Self>> {
        self.as_chain()
    }

    fn binding(&self) -> Option<&dyn InitializeByPort> {
        self.port_binding()
    }

    fn release(&self) {
        self.dispose();
    }
}

/// Successor slots for all four channels plus the governing port.
///
/// Forwarding clones the successor out of its slot before calling it, so no
/// lock is held while downstream components run.
#[derive(Default)]
pub struct ChainLink {
    receiver: RwLock<Option<Arc<dyn MidiDataReceiver>>>,
    error_receiver: RwLock<Option<Arc<dyn MidiDataErrorReceiver>>>,
    port_event_receiver: RwLock<Option<Arc<dyn MidiPortEventReceiver>>>,
    sender: RwLock<Option<Arc<dyn MidiDataSender>>>,
    port: RwLock<Option<Weak<dyn MidiPort>>>,
}

impl ChainLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(&self) -> Option<Arc<dyn MidiPort>> {
        self.port.read().as_ref().and_then(Weak::upgrade)
    }

    pub fn attach_port(&self, port: &Arc<dyn MidiPort>) {
        *self.port.write() = Some(Arc::downgrade(port));
    }

    pub fn detach_port(&self) {
        *self.port.write() = None;
    }

    /// Fails with [`Error::InvalidState`] while the governing port is started.
    pub fn ensure_mutable(&self) -> Result<()> {
        match self.port() {
            Some(port) if port.has_status(PortStatus::STARTED) => Err(Error::InvalidState(
                "cannot change a successor while the port is started".into(),
            )),
            _ => Ok(()),
        }
    }

    pub fn receiver(&self) -> Option<Arc<dyn MidiDataReceiver>> {
        self.receiver.read().clone()
    }

    pub fn set_receiver(&self, receiver: Option<Arc<dyn MidiDataReceiver>>) -> Result<()> {
        self.ensure_mutable()?;
        *self.receiver.write() = receiver;
        Ok(())
    }

    pub fn error_receiver(&self) -> Option<Arc<dyn MidiDataErrorReceiver>> {
        self.error_receiver.read().clone()
    }

    pub fn set_error_receiver(
        &self,
        receiver: Option<Arc<dyn MidiDataErrorReceiver>>,
    ) -> Result<()> {
        self.ensure_mutable()?;
        *self.error_receiver.write() = receiver;
        Ok(())
    }

    pub fn port_event_receiver(&self) -> Option<Arc<dyn MidiPortEventReceiver>> {
        self.port_event_receiver.read().clone()
    }

    pub fn set_port_event_receiver(
        &self,
        receiver: Option<Arc<dyn MidiPortEventReceiver>>,
    ) -> Result<()> {
        self.ensure_mutable()?;
        *self.port_event_receiver.write() = receiver;
        Ok(())
    }

    pub fn sender(&self) -> Option<Arc<dyn MidiDataSender>> {
        self.sender.read().clone()
    }

    pub fn set_sender(&self, sender: Option<Arc<dyn MidiDataSender>>) -> Result<()> {
        self.ensure_mutable()?;
        *self.sender.write() = sender;
        Ok(())
    }

    /// Drops every successor regardless of port status.
    pub fn clear(&self) {
        *self.receiver.write() = None;
        *self.error_receiver.write() = None;
        *self.port_event_receiver.write() = None;
        *self.sender.write() = None;
    }

    #[inline]
    pub fn forward_short_data(&self, data: u32, timestamp: Timestamp) {
        if let Some(next) = self.receiver() {
            next.short_data(data, timestamp);
        }
    }

    #[inline]
    pub fn forward_long_data(&self, buffer: &MidiBuffer, timestamp: Timestamp) {
        if let Some(next) = self.receiver() {
            next.long_data(buffer, timestamp);
        }
    }

    #[inline]
    pub fn forward_short_error(&self, data: u32, timestamp: Timestamp) {
        if let Some(next) = self.error_receiver() {
            next.short_error(data, timestamp);
        }
    }

    #[inline]
    pub fn forward_long_error(&self, buffer: &MidiBuffer, timestamp: Timestamp) {
        if let Some(next) = self.error_receiver() {
            next.long_error(buffer, timestamp);
        }
    }

    #[inline]
    pub fn forward_port_event(&self, event: &PortEvent) {
        if let Some(next) = self.port_event_receiver() {
            next.port_event(event);
        }
    }

    #[inline]
    pub fn send_short_data(&self, data: u32) {
        if let Some(next) = self.sender() {
            next.short_data(data);
        }
    }

    #[inline]
    pub fn send_long_data(&self, buffer: &MidiBuffer) {
        if let Some(next) = self.sender() {
            next.long_data(buffer);
        }
    }
}

impl ChainOf<dyn MidiDataReceiver> for ChainLink {
    fn successor(&self) -> Option<Arc<dyn MidiDataReceiver>> {
        self.receiver()
    }

    fn set_successor(&self, successor: Option<Arc<dyn MidiDataReceiver>>) -> Result<()> {
        self.set_receiver(successor)
    }

    fn bind_port(&self, port: &Arc<dyn MidiPort>) {
        self.attach_port(port);
    }

    fn unbind_port(&self) {
        self.detach_port();
    }
}

impl ChainOf<dyn MidiDataErrorReceiver> for ChainLink {
    fn successor(&self) -> Option<Arc<dyn MidiDataErrorReceiver>> {
        self.error_receiver()
    }

    fn set_successor(&self, successor: Option<Arc<dyn MidiDataErrorReceiver>>) -> Result<()> {
        self.set_error_receiver(successor)
    }

    fn bind_port(&self, port: &Arc<dyn MidiPort>) {
        self.attach_port(port);
    }

    fn unbind_port(&self) {
        self.detach_port();
    }
}

impl ChainOf<dyn MidiPortEventReceiver> for ChainLink {
    fn successor(&self) -> Option<Arc<dyn MidiPortEventReceiver>> {
        self.port_event_receiver()
    }

    fn set_successor(&self, successor: Option<Arc<dyn MidiPortEventReceiver>>) -> Result<()> {
        self.set_port_event_receiver(successor)
    }

    fn bind_port(&self, port: &Arc<dyn MidiPort>) {
        self.attach_port(port);
    }

    fn unbind_port(&self) {
        self.detach_port();
    }
}

impl ChainOf<dyn MidiDataSender> for ChainLink {
    fn successor(&self) -> Option<Arc<dyn MidiDataSender>> {
        self.sender()
    }

    fn set_successor(&self, successor: Option<Arc<dyn MidiDataSender>>) -> Result<()> {
        self.set_sender(successor)
    }

    fn bind_port(&self, port: &Arc<dyn MidiPort>) {
        self.attach_port(port);
    }

    fn unbind_port(&self) {
        self.detach_port();
    }
}

impl std::fmt::Debug for ChainLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainLink")
            .field("receiver", &self.receiver.read().is_some())
            .field("error_receiver", &self.error_receiver.read().is_some())
            .field("port_event_receiver", &self.port_event_receiver.read().is_some())
            .field("sender", &self.sender.read().is_some())
            .field("port_bound", &self.port().is_some())
            .finish()
    }
}
