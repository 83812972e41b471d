//! Restamps messages with time elapsed since the port opened.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Instant;

use midichain_core::{
    ChainLink, ChainOf, InitializeByPort, MidiBuffer, MidiComponent, MidiDataErrorReceiver,
    MidiDataReceiver, MidiPort, MidiPortEventReceiver, PortEvent, PortStatus, Result, Timestamp,
};

use crate::subscription::PortSubscription;

/// Receiver stage that replaces every timestamp with the microseconds since
/// the bound port reported `Open`.
///
/// The timer stops when the port reports `Closed`; timestamps are `0` while
/// it is stopped.
#[derive(Debug, Default)]
pub struct TimestampReceiver {
    link: ChainLink,
    started: Arc<Mutex<Option<Instant>>>,
    subscription: PortSubscription,
}

impl TimestampReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&self) -> &ChainLink {
        &self.link
    }

    pub fn is_running(&self) -> bool {
        self.started.lock().is_some()
    }

    pub fn now(&self) -> Timestamp {
        match *self.started.lock() {
            Some(started) => {
                Timestamp::try_from(started.elapsed().as_micros()).unwrap_or(Timestamp::MAX)
            }
            None => 0,
        }
    }

    fn on_status(started: &Mutex<Option<Instant>>, status: PortStatus) {
        let mut started = started.lock();
        if status == PortStatus::OPEN && started.is_none() {
            *started = Some(Instant::now());
        } else if status.intersects(PortStatus::CLOSED) {
            *started = None;
        }
    }
}

impl MidiComponent for TimestampReceiver {
    fn port_binding(&self) -> Option<&dyn InitializeByPort> {
        Some(self)
    }
}

impl InitializeByPort for TimestampReceiver {
    fn initialize(&self, port: &Arc<dyn MidiPort>) -> Result<()> {
        let started: Weak<Mutex<Option<Instant>>> = Arc::downgrade(&self.started);
        self.subscription.attach(
            port,
            Arc::new(move |status: PortStatus| {
                if let Some(started) = started.upgrade() {
                    Self::on_status(&started, status);
                }
            }),
        )?;
        if port.has_status(PortStatus::OPEN) {
            Self::on_status(&self.started, PortStatus::OPEN);
        }
        Ok(())
    }

    fn uninitialize(&self, port: &Arc<dyn MidiPort>) -> Result<()> {
        self.subscription.detach(port)
    }
}

impl MidiDataReceiver for TimestampReceiver {
    fn short_data(&self, data: u32, _timestamp: Timestamp) {
        self.link.forward_short_data(data, self.now());
    }

    fn long_data(&self, buffer: &MidiBuffer, _timestamp: Timestamp) {
        self.link.forward_long_data(buffer, self.now());
    }

    fn as_chain(&self) -> Option<&dyn ChainOf<dyn MidiDataReceiver>> {
        Some(&self.link)
    }
}

impl MidiDataErrorReceiver for TimestampReceiver {
    fn short_error(&self, data: u32, _timestamp: Timestamp) {
        self.link.forward_short_error(data, self.now());
    }

    fn long_error(&self, buffer: &MidiBuffer, _timestamp: Timestamp) {
        self.link.forward_long_error(buffer, self.now());
    }

    fn as_chain(&self) -> Option<&dyn ChainOf<dyn MidiDataErrorReceiver>> {
        Some(&self.link)
    }
}

impl MidiPortEventReceiver for TimestampReceiver {
    fn port_event(&self, event: &PortEvent) {
        if self.link.port_event_receiver().is_some() {
            self.link.forward_port_event(&event.restamped(self.now()));
        }
    }

    fn as_chain(&self) -> Option<&dyn ChainOf<dyn MidiPortEventReceiver>> {
        Some(&self.link)
    }
}
