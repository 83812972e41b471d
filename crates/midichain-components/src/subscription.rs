use parking_lot::Mutex;
use std::sync::Arc;

use midichain_core::{Error, MidiPort, Result, StatusListener, SubscriptionId};

/// One status-change subscription held by a stage between initialize and
/// uninitialize.
#[derive(Debug, Default)]
pub(crate) struct PortSubscription {
    id: Mutex<Option<SubscriptionId>>,
}

impl PortSubscription {
    pub(crate) fn attach(&self, port: &Arc<dyn MidiPort>, listener: StatusListener) -> Result<()> {
        let mut id = self.id.lock();
        if id.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        *id = Some(port.subscribe(listener));
        Ok(())
    }

    pub(crate) fn detach(&self, port: &Arc<dyn MidiPort>) -> Result<()> {
        let id = self.id.lock().take().ok_or(Error::NotInitialized)?;
        port.unsubscribe(id);
        Ok(())
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.id.lock().is_some()
    }
}
