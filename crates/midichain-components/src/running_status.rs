//! Running-status compression on the send path, and its inverse.
//!
//! A short word whose status repeats the previous one is sent as its two
//! parameter bytes only (`data >> 8`). Running status is cancelled by a long
//! message, by toggling the sender, and by the port closing or resetting.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use midichain_core::data::{is_status, running_status_data, status_byte};
use midichain_core::{
    ChainLink, ChainOf, Error, InitializeByPort, MidiBuffer, MidiComponent, MidiDataReceiver,
    MidiDataSender, MidiPort, PortStatus, Result, Timestamp,
};

use crate::subscription::PortSubscription;

#[derive(Debug)]
struct RunningState {
    status: AtomicU8,
    enabled: AtomicBool,
}

impl RunningState {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(0),
            enabled: AtomicBool::new(true),
        }
    }

    #[inline]
    fn reset(&self) {
        self.status.store(0, Ordering::Release);
    }

    #[inline]
    fn get(&self) -> u8 {
        self.status.load(Ordering::Acquire)
    }

    #[inline]
    fn set(&self, status: u8) {
        self.status.store(status, Ordering::Release);
    }
}

fn reset_on_close_or_reset(state: &Arc<RunningState>) -> midichain_core::StatusListener {
    let state = Arc::clone(state);
    Arc::new(move |status: PortStatus| {
        if status.intersects(PortStatus::CLOSED | PortStatus::RESET) {
            state.reset();
        }
    })
}

/// Sender stage that strips repeated status bytes.
///
/// Only binds to output ports.
#[derive(Debug)]
pub struct RunningStatusSender {
    link: ChainLink,
    state: Arc<RunningState>,
    subscription: PortSubscription,
}

impl RunningStatusSender {
    pub fn new() -> Self {
        Self {
            link: ChainLink::new(),
            state: Arc::new(RunningState::new()),
            subscription: PortSubscription::default(),
        }
    }

    pub fn link(&self) -> &ChainLink {
        &self.link
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::Acquire)
    }

    /// Toggling always cancels running status.
    pub fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::Release);
        self.state.reset();
    }

    /// Current running status, `0` when none.
    pub fn running_status(&self) -> u8 {
        self.state.get()
    }
}

impl Default for RunningStatusSender {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiComponent for RunningStatusSender {
    fn port_binding(&self) -> Option<&dyn InitializeByPort> {
        Some(self)
    }
}

impl InitializeByPort for RunningStatusSender {
    fn initialize(&self, port: &Arc<dyn MidiPort>) -> Result<()> {
        if !port.kind().is_output() {
            return Err(Error::InvalidPort(format!(
                "running status needs an output port, got {:?}",
                port.kind()
            )));
        }
        self.subscription
            .attach(port, reset_on_close_or_reset(&self.state))
    }

    fn uninitialize(&self, port: &Arc<dyn MidiPort>) -> Result<()> {
        self.subscription.detach(port)
    }
}

impl MidiDataSender for RunningStatusSender {
    fn short_data(&self, data: u32) {
        if !self.is_enabled() {
            self.link.send_short_data(data);
            return;
        }

        let status = status_byte(data);
        if status == self.state.get() {
            self.link.send_short_data(running_status_data(data));
        } else {
            self.state.set(status);
            self.link.send_short_data(data);
        }
    }

    fn long_data(&self, buffer: &MidiBuffer) {
        self.state.reset();
        self.link.send_long_data(buffer);
    }

    fn as_chain(&self) -> Option<&dyn ChainOf<dyn MidiDataSender>> {
        Some(&self.link)
    }
}

/// Restores full short words from running-status words.
///
/// Works on either path: as a sender in front of a transport that needs
/// full words, or as a receiver behind a source that delivers truncated ones.
#[derive(Debug)]
pub struct RunningStatusExpander {
    link: ChainLink,
    state: Arc<RunningState>,
    subscription: PortSubscription,
}

impl RunningStatusExpander {
    pub fn new() -> Self {
        Self {
            link: ChainLink::new(),
            state: Arc::new(RunningState::new()),
            subscription: PortSubscription::default(),
        }
    }

    pub fn link(&self) -> &ChainLink {
        &self.link
    }

    pub fn running_status(&self) -> u8 {
        self.state.get()
    }

    /// Full word for `data`, updating running status on the way.
    ///
    /// Channel statuses (0x80..=0xEF) become the running status, system
    /// common statuses (0xF0..=0xF7) cancel it, real-time statuses pass
    /// without touching it. A word without status expands with the running
    /// status, or passes unchanged when there is none.
    pub fn expand(&self, data: u32) -> u32 {
        let status = status_byte(data);
        if is_status(status) {
            match status {
                0x80..=0xEF => self.state.set(status),
                0xF0..=0xF7 => self.state.reset(),
                _ => {}
            }
            return data;
        }

        match self.state.get() {
            0 => data,
            running => ((data << 8) & 0x00FF_FF00) | u32::from(running),
        }
    }
}

impl Default for RunningStatusExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiComponent for RunningStatusExpander {
    fn port_binding(&self) -> Option<&dyn InitializeByPort> {
        Some(self)
    }
}

impl InitializeByPort for RunningStatusExpander {
    fn initialize(&self, port: &Arc<dyn MidiPort>) -> Result<()> {
        self.subscription
            .attach(port, reset_on_close_or_reset(&self.state))
    }

    fn uninitialize(&self, port: &Arc<dyn MidiPort>) -> Result<()> {
        self.subscription.detach(port)
    }
}

impl MidiDataSender for RunningStatusExpander {
    fn short_data(&self, data: u32) {
        self.link.send_short_data(self.expand(data));
    }

    fn long_data(&self, buffer: &MidiBuffer) {
        self.state.reset();
        self.link.send_long_data(buffer);
    }

    fn as_chain(&self) -> Option<&dyn ChainOf<dyn MidiDataSender>> {
        Some(&self.link)
    }
}

impl MidiDataReceiver for RunningStatusExpander {
    fn short_data(&self, data: u32, timestamp: Timestamp) {
        self.link.forward_short_data(self.expand(data), timestamp);
    }

    fn long_data(&self, buffer: &MidiBuffer, timestamp: Timestamp) {
        self.state.reset();
        self.link.forward_long_data(buffer, timestamp);
    }

    fn as_chain(&self) -> Option<&dyn ChainOf<dyn MidiDataReceiver>> {
        Some(&self.link)
    }
}
