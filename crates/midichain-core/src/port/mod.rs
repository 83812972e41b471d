//! Port abstraction the chain is rooted at.
//!
//! Chain components only see a port through [`MidiPort`]: its status, a
//! status-changed notification and buffer release. The software ports in
//! this module implement it without touching any OS API.

use crate::buffer::MidiBuffer;

mod input;
mod output;
mod status;

pub use input::{DriverMessage, MidiInPort};
pub use output::{MidiOutPort, MidiOutTransport};
pub use status::{PortStatus, PortStatusCell, StatusListener, SubscriptionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    Input,
    Output,
    OutputStream,
}

impl PortKind {
    #[inline]
    pub fn is_output(self) -> bool {
        matches!(self, PortKind::Output | PortKind::OutputStream)
    }
}

pub trait MidiPort: Send + Sync {
    fn kind(&self) -> PortKind;

    fn status(&self) -> PortStatus;

    /// `true` when any flag of `status` is set.
    fn has_status(&self, status: PortStatus) -> bool {
        self.status().intersects(status)
    }

    fn subscribe(&self, listener: StatusListener) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Drops a stage's hold on a buffer this port delivered.
    ///
    /// Ports that take their buffers back after delivery do so here once
    /// the last hold is gone.
    fn release_buffer(&self, buffer: &MidiBuffer) {
        let _ = buffer.release();
    }
}
