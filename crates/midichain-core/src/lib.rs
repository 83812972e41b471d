//! Core of a MIDI message-processing chain.
//!
//! Provides short-message helpers, port status and its notifications, pooled
//! long-message buffers, the chain contracts every stage implements, and
//! software in/out ports to root a chain at.

pub mod error;
pub use error::{Error, Result};

pub mod data;
pub use data::MidiData;

pub mod config;
pub use config::{BufferPoolConfig, MAX_BUFFER_SIZE};

mod buffer;
pub use buffer::MidiBuffer;

mod pool;
pub use pool::BufferPool;

mod event;
pub use event::{PortEvent, PortEventKind, PortEventPayload, Timestamp};

pub mod port;
pub use port::{
    DriverMessage, MidiInPort, MidiOutPort, MidiOutTransport, MidiPort, PortKind, PortStatus,
    PortStatusCell, StatusListener, SubscriptionId,
};

pub mod chain;
pub use chain::{
    ChainLink, ChainMember, ChainOf, InitializeByPort, MidiComponent, MidiDataErrorReceiver,
    MidiDataReceiver, MidiDataSender, MidiPortEventReceiver,
};
