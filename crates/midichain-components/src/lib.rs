//! Chain stages and chain assembly for midichain.
//!
//! Stages: status filtering, running-status compression and expansion,
//! asynchronous decoupling, timing diagnostics and restamping. Managers wire
//! stages behind a port and own their lifecycle.

mod subscription;

mod filter;
pub use filter::StatusFilter;

mod running_status;
pub use running_status::{RunningStatusExpander, RunningStatusSender};

pub mod queue;
pub use queue::{MidiQueue, QueueRecord, Route};

mod async_receiver;
pub use async_receiver::AsyncReceiver;

mod diagnostics;
pub use diagnostics::{DiagnosticReceiver, PerformanceData};

mod timestamp;
pub use timestamp::TimestampReceiver;

pub mod manager;
pub use manager::{
    ChainManager, ErrorChainManager, InPortChainManager, PortEventChainManager,
    ReceiverChainManager, SenderChainManager, Stages,
};

#[cfg(test)]
mod testing;
