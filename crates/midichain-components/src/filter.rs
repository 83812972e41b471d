//! Drops short messages carrying one configured status byte.

use std::sync::atomic::{AtomicU8, Ordering};

use midichain_core::data::status_byte;
use midichain_core::{ChainLink, ChainOf, MidiBuffer, MidiComponent, MidiDataReceiver, Timestamp};

/// Receiver stage that discards short messages whose status byte equals the
/// configured value and forwards everything else.
///
/// Long messages are always forwarded, even when their first byte matches.
#[derive(Debug, Default)]
pub struct StatusFilter {
    link: ChainLink,
    status: AtomicU8,
}

impl StatusFilter {
    /// Status `0` never matches a real status byte, so the default filter
    /// passes everything.
    pub fn new(status: u8) -> Self {
        Self {
            link: ChainLink::new(),
            status: AtomicU8::new(status),
        }
    }

    pub fn status(&self) -> u8 {
        self.status.load(Ordering::Relaxed)
    }

    pub fn set_status(&self, status: u8) {
        self.status.store(status, Ordering::Relaxed);
    }

    pub fn link(&self) -> &ChainLink {
        &self.link
    }
}

impl MidiComponent for StatusFilter {}

impl MidiDataReceiver for StatusFilter {
    fn short_data(&self, data: u32, timestamp: Timestamp) {
        if status_byte(data) != self.status() {
            self.link.forward_short_data(data, timestamp);
        }
    }

    fn long_data(&self, buffer: &MidiBuffer, timestamp: Timestamp) {
        self.link.forward_long_data(buffer, timestamp);
    }

    fn as_chain(&self) -> Option<&dyn ChainOf<dyn MidiDataReceiver>> {
        Some(&self.link)
    }
}
