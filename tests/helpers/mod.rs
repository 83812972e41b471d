//! Test helpers and fixtures for midichain integration tests
//!
//! Terminal stages that record what reaches them, a transport that records
//! what an out port sends, and log capture.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

use midichain::prelude::*;
use midichain::MidiOutTransport;

/// How long a test waits for work done on another thread.
pub const WORKER_TIMEOUT: Duration = Duration::from_secs(5);

/// Route library logs to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Poll `done` until it holds or [`WORKER_TIMEOUT`] passes.
pub fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WORKER_TIMEOUT;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    done()
}

/// Terminal receiver recording short and long data.
#[derive(Default)]
pub struct Recorder {
    shorts: Mutex<Vec<u32>>,
    longs: Mutex<Vec<Vec<u8>>>,
}

impl Recorder {
    pub fn shorts(&self) -> Vec<u32> {
        self.shorts.lock().clone()
    }

    pub fn longs(&self) -> Vec<Vec<u8>> {
        self.longs.lock().clone()
    }
}

impl MidiComponent for Recorder {}

impl MidiDataReceiver for Recorder {
    fn short_data(&self, data: u32, _timestamp: Timestamp) {
        self.shorts.lock().push(data);
    }

    fn long_data(&self, buffer: &MidiBuffer, _timestamp: Timestamp) {
        self.longs.lock().push(buffer.to_vec());
    }
}

/// Terminal sender recording what it is asked to send.
#[derive(Default)]
pub struct SendRecorder {
    shorts: Mutex<Vec<u32>>,
    longs: Mutex<Vec<Vec<u8>>>,
}

impl SendRecorder {
    pub fn shorts(&self) -> Vec<u32> {
        self.shorts.lock().clone()
    }

    pub fn longs(&self) -> Vec<Vec<u8>> {
        self.longs.lock().clone()
    }
}

impl MidiComponent for SendRecorder {}

impl MidiDataSender for SendRecorder {
    fn short_data(&self, data: u32) {
        self.shorts.lock().push(data);
    }

    fn long_data(&self, buffer: &MidiBuffer) {
        self.longs.lock().push(buffer.to_vec());
    }
}

/// Terminal receiver handing every short message to a channel.
pub struct ChannelReceiver {
    tx: Sender<u32>,
}

impl ChannelReceiver {
    pub fn new() -> (Self, Receiver<u32>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl MidiComponent for ChannelReceiver {}

impl MidiDataReceiver for ChannelReceiver {
    fn short_data(&self, data: u32, _timestamp: Timestamp) {
        let _ = self.tx.send(data);
    }

    fn long_data(&self, buffer: &MidiBuffer, _timestamp: Timestamp) {
        let _ = self.tx.send(buffer.bytes_recorded());
    }
}

/// Out-port transport that keeps the bytes it was given.
#[derive(Default, Clone)]
pub struct Wire {
    shorts: std::sync::Arc<Mutex<Vec<u32>>>,
    longs: std::sync::Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Wire {
    pub fn shorts(&self) -> Vec<u32> {
        self.shorts.lock().clone()
    }

    pub fn longs(&self) -> Vec<Vec<u8>> {
        self.longs.lock().clone()
    }
}

impl MidiOutTransport for Wire {
    fn send_short(&mut self, data: u32) -> midichain::Result<()> {
        self.shorts.lock().push(data);
        Ok(())
    }

    fn send_long(&mut self, bytes: &[u8]) -> midichain::Result<()> {
        self.longs.lock().push(bytes.to_vec());
        Ok(())
    }
}
