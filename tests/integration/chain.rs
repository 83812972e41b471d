//! Chain assembly integration tests
//!
//! Appending behind a port, the end-of-chain rule, mutation while started,
//! and stages shared between channels.

use midichain::prelude::*;
use midichain::{DiagnosticReceiver, DriverMessage, Error, TimestampReceiver};

use crate::helpers::*;

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

#[test]
fn test_add_after_terminal_is_end_of_chain() {
    let port = Arc::new(MidiInPort::new("Keyboard"));
    let mut chain = InPortChainManager::new(port.clone());
    let filter = Arc::new(StatusFilter::new(0x80));
    let terminal = Arc::new(Recorder::default());

    chain.receivers().add(filter.clone()).unwrap();
    chain.receivers().add(terminal.clone()).unwrap();
    assert_eq!(
        chain.receivers().add(Arc::new(Recorder::default())),
        Err(Error::EndOfChain)
    );

    // the failed add left the chain as it was
    assert_eq!(chain.receivers().stages().count(), 2);
    let tail = filter.link().receiver().unwrap();
    let expected: Arc<dyn MidiDataReceiver> = terminal;
    assert!(Arc::ptr_eq(&tail, &expected));
}

#[test]
fn test_stages_walk_in_insertion_order() {
    let port = Arc::new(MidiInPort::new("Keyboard"));
    let mut chain = InPortChainManager::new(port.clone());
    let first = Arc::new(DiagnosticReceiver::new());
    let second = Arc::new(StatusFilter::new(0xFE));
    let terminal = Arc::new(Recorder::default());

    chain.receivers().add(first.clone()).unwrap();
    chain.receivers().add(second.clone()).unwrap();
    chain.receivers().add(terminal.clone()).unwrap();

    let stages: Vec<_> = chain.receivers().stages().collect();
    assert_eq!(stages.len(), 3);
    let first: Arc<dyn MidiDataReceiver> = first;
    let second: Arc<dyn MidiDataReceiver> = second;
    assert!(Arc::ptr_eq(&stages[0], &first));
    assert!(Arc::ptr_eq(&stages[1], &second));
    assert!(Arc::ptr_eq(&port.receiver().unwrap(), &first));
}

#[test]
fn test_sender_chain_prepends() {
    let terminal = Arc::new(SendRecorder::default());
    let mut chain = SenderChainManager::new(terminal.clone());
    let compressor = Arc::new(RunningStatusSender::new());
    chain.add(compressor.clone()).unwrap();

    assert_eq!(chain.senders().count(), 2);
    let head: Arc<dyn MidiDataSender> = compressor;
    assert!(Arc::ptr_eq(&chain.sender().unwrap(), &head));

    // a sender with no successor slot cannot go in front
    assert_eq!(
        chain.add(Arc::new(SendRecorder::default())),
        Err(Error::NotChainable)
    );
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_chain_locked_while_port_started() {
    init_tracing();
    let port = Arc::new(MidiInPort::new("Keyboard"));
    let mut chain = InPortChainManager::new(port.clone());
    let filter = Arc::new(StatusFilter::new(0x80));
    chain.receivers().add(filter.clone()).unwrap();
    chain.initialize().unwrap();

    // start needs something at the end of the chain
    port.open().unwrap();
    filter
        .link()
        .set_receiver(Some(Arc::new(Recorder::default())))
        .unwrap();
    port.start().unwrap();

    assert!(matches!(
        chain.receivers().add(Arc::new(Recorder::default())),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        filter.link().set_receiver(None),
        Err(Error::InvalidState(_))
    ));

    port.stop().unwrap();
    filter.link().set_receiver(None).unwrap();
    port.close().unwrap();
}

#[test]
fn test_initialize_twice_fails() {
    let port = Arc::new(MidiInPort::new("Keyboard"));
    let mut chain = InPortChainManager::new(port.clone());
    chain.receivers().add(Arc::new(Recorder::default())).unwrap();
    chain.initialize().unwrap();

    let again: Arc<dyn MidiPort> = port;
    assert_eq!(
        chain.receivers().initialize(again),
        Err(Error::AlreadyInitialized)
    );
}

#[test]
fn test_shared_stage_spans_channels() {
    init_tracing();
    let port = Arc::new(MidiInPort::new("Keyboard"));
    let mut chain = InPortChainManager::new(port.clone());
    let stamper = Arc::new(TimestampReceiver::new());
    let recorder = Arc::new(Recorder::default());

    chain.receivers().add(stamper.clone()).unwrap();
    chain.receivers().add(recorder.clone()).unwrap();
    chain.port_event_receivers().add(stamper.clone()).unwrap();
    // initializing the stage a second time would fail its port subscription
    chain.initialize().unwrap();

    port.open().unwrap();
    assert!(stamper.is_running());
    port.start().unwrap();
    port.handle_driver_message(DriverMessage::Data {
        data: 0x0040_3C90,
        timestamp: -1,
    });
    assert_eq!(recorder.shorts(), vec![0x0040_3C90]);

    port.close().unwrap();
    assert!(!stamper.is_running());
}

#[test]
fn test_dispose_clears_port_successors() {
    let port = Arc::new(MidiInPort::new("Keyboard"));
    let mut chain = InPortChainManager::new(port.clone());
    chain.receivers().add(Arc::new(StatusFilter::new(0x80))).unwrap();
    chain
        .port_event_receivers()
        .add(Arc::new(TimestampReceiver::new()))
        .unwrap();
    chain.initialize().unwrap();

    chain.dispose();
    assert!(port.receiver().is_none());
    assert!(port.port_event_receiver().is_none());
    assert!(chain.receivers().is_disposed());
    assert_eq!(
        chain.receivers().add(Arc::new(Recorder::default())),
        Err(Error::Disposed)
    );

    // a second dispose is a no-op
    chain.dispose();
}

#[test]
fn test_dropping_manager_disposes() {
    let port = Arc::new(MidiInPort::new("Keyboard"));
    {
        let mut chain = InPortChainManager::new(port.clone());
        chain.receivers().add(Arc::new(Recorder::default())).unwrap();
        chain.initialize().unwrap();
        assert!(port.receiver().is_some());
    }
    assert!(port.receiver().is_none());
}
