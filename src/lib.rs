//! # midichain - MIDI chain-of-responsibility engine
//!
//! Dispatches short and long MIDI messages from a port through a pipeline of
//! interchangeable stages.
//!
//! ## Architecture
//!
//! midichain is an umbrella crate that coordinates:
//! - **midichain-core** - Port status, pooled long-message buffers, chain
//!   contracts, software in/out ports
//! - **midichain-components** - Stages (status filter, running status,
//!   async decoupling, diagnostics, restamping) and chain managers
//!
//! ## Quick Start
//!
//! ```ignore
//! use midichain::prelude::*;
//!
//! let port = Arc::new(MidiInPort::new("Keyboard"));
//! let mut chain = InPortChainManager::new(port.clone());
//!
//! chain.receivers().add(Arc::new(StatusFilter::new(0xFE)))?;
//! chain.receivers().add(my_terminal_receiver)?;
//! chain.initialize()?;
//!
//! port.open()?;
//! port.start()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Core plus components
//! - `components` - Stage library and chain managers

/// Re-export of midichain-core for direct access
pub use midichain_core as core;

pub use midichain_core::{
    // Buffers
    BufferPool,
    BufferPoolConfig,
    // Chain contracts
    ChainLink,
    ChainMember,
    ChainOf,
    DriverMessage,
    // Error
    Error,
    InitializeByPort,
    MidiBuffer,
    MidiComponent,
    MidiData,
    MidiDataErrorReceiver,
    MidiDataReceiver,
    MidiDataSender,
    // Ports
    MidiInPort,
    MidiOutPort,
    MidiOutTransport,
    MidiPort,
    MidiPortEventReceiver,
    PortEvent,
    PortEventKind,
    PortKind,
    PortStatus,
    Result,
    Timestamp,
};

/// Chain stages and managers
#[cfg(feature = "components")]
pub use midichain_components as components;

#[cfg(feature = "components")]
pub use midichain_components::{
    AsyncReceiver, ChainManager, DiagnosticReceiver, InPortChainManager, MidiQueue,
    PerformanceData, ReceiverChainManager, RunningStatusExpander, RunningStatusSender,
    SenderChainManager, StatusFilter, TimestampReceiver,
};

/// Convenience prelude for common imports
pub mod prelude {
    pub use std::sync::Arc;

    // Ports and buffers
    pub use crate::{BufferPool, BufferPoolConfig, MidiBuffer, MidiInPort, MidiOutPort};

    // Chain contracts
    pub use crate::{
        ChainLink, ChainOf, InitializeByPort, MidiComponent, MidiDataErrorReceiver,
        MidiDataReceiver, MidiDataSender, MidiPort, MidiPortEventReceiver, PortEvent, PortStatus,
        Timestamp,
    };

    // Stages and managers
    #[cfg(feature = "components")]
    pub use crate::{
        AsyncReceiver, InPortChainManager, ReceiverChainManager, RunningStatusSender,
        SenderChainManager, StatusFilter,
    };
}
