//! Stage integration tests
//!
//! Running status on a real send chain into an out port, and the status
//! filter behind an in port.

use midichain::prelude::*;
use midichain::{DriverMessage, MidiOutTransport, RunningStatusExpander};

use crate::helpers::*;

fn out_port(wire: &Wire) -> Arc<MidiOutPort> {
    let transport: Box<dyn MidiOutTransport> = Box::new(wire.clone());
    Arc::new(MidiOutPort::new("Synth", transport))
}

fn note(data: u32) -> DriverMessage {
    DriverMessage::Data { data, timestamp: 0 }
}

// ---------------------------------------------------------------------------
// Running status
// ---------------------------------------------------------------------------

#[test]
fn test_running_status_into_out_port() {
    init_tracing();
    let wire = Wire::default();
    let port = out_port(&wire);
    let mut chain = SenderChainManager::new(port.clone());
    let compressor = Arc::new(RunningStatusSender::new());
    chain.add(compressor.clone()).unwrap();
    chain.initialize(port.clone()).unwrap();
    port.open().unwrap();

    let sender = chain.sender().unwrap();
    sender.short_data(0x0040_3C90);
    sender.short_data(0x0050_3C90);
    assert_eq!(compressor.running_status(), 0x90);

    let buffer = port.buffer_pool().retrieve().unwrap();
    buffer.write(&[0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7]).unwrap();
    sender.long_data(&buffer);
    assert_eq!(compressor.running_status(), 0);

    sender.short_data(0x0060_3C90);

    assert_eq!(wire.shorts(), vec![0x0040_3C90, 0x503C, 0x0060_3C90]);
    assert_eq!(wire.longs(), vec![vec![0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7]]);
    // the out port hands the long buffer back to its own pool
    assert_eq!(port.buffer_pool().used_count(), 0);

    // the compressed word expands back to the word that was sent
    let expander = RunningStatusExpander::new();
    assert_eq!(expander.expand(0x0040_3C90), 0x0040_3C90);
    assert_eq!(expander.expand(0x503C), 0x0050_3C90);

    chain.dispose();
    port.close().unwrap();
}

#[test]
fn test_running_status_resets_with_port() {
    let wire = Wire::default();
    let port = out_port(&wire);
    let mut chain = SenderChainManager::new(port.clone());
    let compressor = Arc::new(RunningStatusSender::new());
    chain.add(compressor.clone()).unwrap();
    chain.initialize(port.clone()).unwrap();
    port.open().unwrap();

    let sender = chain.sender().unwrap();
    sender.short_data(0x0040_3C90);
    port.reset().unwrap();
    assert_eq!(compressor.running_status(), 0);

    sender.short_data(0x0050_3C90);
    assert_eq!(wire.shorts(), vec![0x0040_3C90, 0x0050_3C90]);

    chain.dispose();
    port.close().unwrap();
}

#[test]
fn test_running_status_refuses_input_port() {
    let port = Arc::new(MidiInPort::new("Keyboard"));
    let mut chain = SenderChainManager::new(Arc::new(SendRecorder::default()));
    chain.add(Arc::new(RunningStatusSender::new())).unwrap();

    let port: Arc<dyn MidiPort> = port;
    assert!(matches!(
        chain.initialize(port),
        Err(midichain::Error::InvalidPort(_))
    ));
}

#[test]
fn test_disabled_running_status_passes_words() {
    let terminal = Arc::new(SendRecorder::default());
    let mut chain = SenderChainManager::new(terminal.clone());
    let compressor = Arc::new(RunningStatusSender::new());
    compressor.set_enabled(false);
    chain.add(compressor).unwrap();

    let sender = chain.sender().unwrap();
    sender.short_data(0x0040_3C90);
    sender.short_data(0x0050_3C90);
    assert_eq!(terminal.shorts(), vec![0x0040_3C90, 0x0050_3C90]);
}

// ---------------------------------------------------------------------------
// Status filter
// ---------------------------------------------------------------------------

#[test]
fn test_filter_drops_note_off_from_port() {
    init_tracing();
    let port = Arc::new(MidiInPort::new("Keyboard"));
    let mut chain = InPortChainManager::new(port.clone());
    let recorder = Arc::new(Recorder::default());
    chain.receivers().add(Arc::new(StatusFilter::new(0x80))).unwrap();
    chain.receivers().add(recorder.clone()).unwrap();
    chain.initialize().unwrap();
    port.open().unwrap();
    port.start().unwrap();

    port.handle_driver_message(note(0x0040_3C90));
    port.handle_driver_message(note(0x0000_3C80));
    port.handle_driver_message(note(0x0040_3E90));

    assert_eq!(recorder.shorts(), vec![0x0040_3C90, 0x0040_3E90]);
    port.close().unwrap();
}

#[test]
fn test_filter_forwards_all_other_statuses() {
    let filter = StatusFilter::new(0x90);
    let recorder = Arc::new(Recorder::default());
    filter.link().set_receiver(Some(recorder.clone())).unwrap();

    let words: Vec<u32> = (0x80..=0xFFu32).map(|status| 0x0040_3C00 | status).collect();
    for &word in &words {
        filter.short_data(word, 0);
    }

    let expected: Vec<u32> = words
        .iter()
        .copied()
        .filter(|word| word & 0xFF != 0x90)
        .collect();
    assert_eq!(recorder.shorts(), expected);
}

#[test]
fn test_filter_passes_long_messages_from_port() {
    let port = Arc::new(MidiInPort::with_config(
        "Keyboard",
        BufferPoolConfig::with_buffers(2, 64),
    ));
    let mut chain = InPortChainManager::new(port.clone());
    let recorder = Arc::new(Recorder::default());
    chain.receivers().add(Arc::new(StatusFilter::new(0xF0))).unwrap();
    chain.receivers().add(recorder.clone()).unwrap();
    chain.initialize().unwrap();
    port.open().unwrap();
    port.start().unwrap();

    port.deliver_long_data(&[0xF0, 0x01, 0xF7], 7).unwrap();

    assert_eq!(recorder.longs(), vec![vec![0xF0, 0x01, 0xF7]]);
    // auto-return puts the buffer back with the driver
    assert_eq!(port.queued_buffer_count(), 2);
    port.close().unwrap();
    assert_eq!(port.buffer_pool().used_count(), 0);
}
