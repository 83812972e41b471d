//! Terminal stages that record what reaches them.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use midichain_core::{
    MidiBuffer, MidiComponent, MidiDataErrorReceiver, MidiDataReceiver, MidiDataSender,
    MidiPortEventReceiver, PortEvent, Timestamp,
};

#[derive(Default)]
pub(crate) struct Collector {
    shorts: Mutex<Vec<(u32, Timestamp)>>,
    longs: Mutex<Vec<(Vec<u8>, Timestamp)>>,
    errors: Mutex<Vec<(u32, Timestamp)>>,
    events: Mutex<Vec<PortEvent>>,
}

impl Collector {
    pub(crate) fn shorts(&self) -> Vec<(u32, Timestamp)> {
        self.shorts.lock().clone()
    }

    pub(crate) fn longs(&self) -> Vec<(Vec<u8>, Timestamp)> {
        self.longs.lock().clone()
    }

    pub(crate) fn errors(&self) -> Vec<(u32, Timestamp)> {
        self.errors.lock().clone()
    }

    pub(crate) fn events(&self) -> Vec<PortEvent> {
        self.events.lock().clone()
    }
}

impl MidiComponent for Collector {}

impl MidiDataReceiver for Collector {
    fn short_data(&self, data: u32, timestamp: Timestamp) {
        self.shorts.lock().push((data, timestamp));
    }

    fn long_data(&self, buffer: &MidiBuffer, timestamp: Timestamp) {
        self.longs.lock().push((buffer.to_vec(), timestamp));
    }
}

impl MidiDataErrorReceiver for Collector {
    fn short_error(&self, data: u32, timestamp: Timestamp) {
        self.errors.lock().push((data, timestamp));
    }

    fn long_error(&self, _buffer: &MidiBuffer, timestamp: Timestamp) {
        self.errors.lock().push((0, timestamp));
    }
}

impl MidiPortEventReceiver for Collector {
    fn port_event(&self, event: &PortEvent) {
        self.events.lock().push(event.clone());
    }
}

#[derive(Default)]
pub(crate) struct SentCollector {
    shorts: Mutex<Vec<u32>>,
    longs: Mutex<Vec<Vec<u8>>>,
}

impl SentCollector {
    pub(crate) fn shorts(&self) -> Vec<u32> {
        self.shorts.lock().clone()
    }

    pub(crate) fn longs(&self) -> Vec<Vec<u8>> {
        self.longs.lock().clone()
    }
}

impl MidiComponent for SentCollector {}

impl MidiDataSender for SentCollector {
    fn short_data(&self, data: u32) {
        self.shorts.lock().push(data);
    }

    fn long_data(&self, buffer: &MidiBuffer) {
        self.longs.lock().push(buffer.to_vec());
    }
}

/// Hands every record to a channel, for stages that dispatch on another
/// thread.
pub(crate) struct ChannelCollector {
    tx: Sender<(&'static str, u32, Timestamp)>,
}

impl ChannelCollector {
    pub(crate) fn new() -> (Self, Receiver<(&'static str, u32, Timestamp)>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    fn send(&self, channel: &'static str, data: u32, timestamp: Timestamp) {
        let _ = self.tx.send((channel, data, timestamp));
    }
}

impl MidiComponent for ChannelCollector {}

impl MidiDataReceiver for ChannelCollector {
    fn short_data(&self, data: u32, timestamp: Timestamp) {
        self.send("data", data, timestamp);
    }

    fn long_data(&self, buffer: &MidiBuffer, timestamp: Timestamp) {
        self.send("long", buffer.bytes_recorded(), timestamp);
    }
}

impl MidiDataErrorReceiver for ChannelCollector {
    fn short_error(&self, data: u32, timestamp: Timestamp) {
        self.send("error", data, timestamp);
    }

    fn long_error(&self, buffer: &MidiBuffer, timestamp: Timestamp) {
        self.send("long error", buffer.bytes_recorded(), timestamp);
    }
}

impl MidiPortEventReceiver for ChannelCollector {
    fn port_event(&self, event: &PortEvent) {
        self.send("event", event.data().unwrap_or(0), event.timestamp());
    }
}
