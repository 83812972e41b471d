//! Chain assembly and lifecycle.
//!
//! [`ChainManager`] appends stages behind a root (usually a port) and walks
//! them in insertion order to initialize and tear down. [`SenderChainManager`]
//! builds a send chain the other way round: each new stage is put in front
//! of the previous head, so the terminal added first stays last.

use std::collections::HashSet;
use std::sync::Arc;

use midichain_core::{
    BufferPool, ChainMember, ChainOf, Error, MidiDataErrorReceiver, MidiDataReceiver,
    MidiDataSender, MidiInPort, MidiPort, MidiPortEventReceiver, PortStatus, Result,
};

/// Lazy walk over a chain, stopping after the first stage that has no
/// successor or is not chainable.
pub struct Stages<T: ?Sized> {
    next: Option<Arc<T>>,
}

impl<T: ?Sized + ChainMember> Iterator for Stages<T> {
    type Item = Arc<T>;

    fn next(&mut self) -> Option<Arc<T>> {
        let current = self.next.take()?;
        self.next = current.chain().and_then(|chain| chain.successor());
        Some(current)
    }
}

#[inline]
fn identity<T: ?Sized>(stage: &Arc<T>) -> usize {
    Arc::as_ptr(stage) as *const () as usize
}

fn ensure_not_started(port: Option<&Arc<dyn MidiPort>>) -> Result<()> {
    match port {
        Some(port) if port.has_status(PortStatus::STARTED) => Err(Error::InvalidState(
            "cannot change the chain while the port is started".into(),
        )),
        _ => Ok(()),
    }
}

/// Binds every stage to `port`, then runs its port hook. Stages already in
/// `seen` are bound but not initialized again.
fn initialize_stages<T: ?Sized + ChainMember>(
    stages: Stages<T>,
    port: &Arc<dyn MidiPort>,
    seen: &mut HashSet<usize>,
) -> Result<()> {
    for stage in stages {
        if let Some(chain) = stage.chain() {
            chain.bind_port(port);
        }
        if seen.insert(identity(&stage)) {
            if let Some(binding) = stage.binding() {
                binding.initialize(port)?;
            }
        }
    }
    Ok(())
}

/// Unbinds, uninitializes and releases every stage once.
fn dispose_stages<T: ?Sized + ChainMember>(
    stages: Vec<Arc<T>>,
    port: Option<&Arc<dyn MidiPort>>,
    seen: &mut HashSet<usize>,
) {
    for stage in stages {
        if let Some(chain) = stage.chain() {
            chain.unbind_port();
        }
        if !seen.insert(identity(&stage)) {
            continue;
        }
        if let (Some(port), Some(binding)) = (port, stage.binding()) {
            if let Err(e) = binding.uninitialize(port) {
                tracing::warn!("Chain stage failed to uninitialize: {}", e);
            }
        }
        stage.release();
    }
}

/// Receive-side chain rooted at a port or another chain position.
pub struct ChainManager<T: ?Sized + ChainMember + 'static> {
    root: Option<Arc<dyn ChainOf<T>>>,
    port: Option<Arc<dyn MidiPort>>,
}

pub type ReceiverChainManager = ChainManager<dyn MidiDataReceiver>;
pub type ErrorChainManager = ChainManager<dyn MidiDataErrorReceiver>;
pub type PortEventChainManager = ChainManager<dyn MidiPortEventReceiver>;

impl<T: ?Sized + ChainMember + 'static> ChainManager<T> {
    pub fn new(root: Arc<dyn ChainOf<T>>) -> Self {
        Self {
            root: Some(root),
            port: None,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.root.is_none()
    }

    pub fn port(&self) -> Option<&Arc<dyn MidiPort>> {
        self.port.as_ref()
    }

    /// Appends `stage` behind the current tail.
    ///
    /// Fails with [`Error::EndOfChain`] when the tail cannot take a successor.
    pub fn add(&mut self, stage: Arc<T>) -> Result<()> {
        let root = self.root.as_ref().ok_or(Error::Disposed)?;
        ensure_not_started(self.port.as_ref())?;

        let mut tail = match root.successor() {
            None => return root.set_successor(Some(stage)),
            Some(first) => first,
        };
        loop {
            let next = {
                let chain = tail.chain().ok_or(Error::EndOfChain)?;
                match chain.successor() {
                    None => return chain.set_successor(Some(stage)),
                    Some(next) => next,
                }
            };
            tail = next;
        }
    }

    /// Stages from the root's successor to the tail.
    pub fn stages(&self) -> Stages<T> {
        Stages {
            next: self.root.as_ref().and_then(|root| root.successor()),
        }
    }

    /// Binds every stage to `port` and initializes them in insertion order.
    pub fn initialize(&mut self, port: Arc<dyn MidiPort>) -> Result<()> {
        self.initialize_tracked(port, &mut HashSet::new())
    }

    pub(crate) fn initialize_tracked(
        &mut self,
        port: Arc<dyn MidiPort>,
        seen: &mut HashSet<usize>,
    ) -> Result<()> {
        let root = self.root.as_ref().ok_or(Error::Disposed)?;
        if self.port.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        root.bind_port(&port);
        self.port = Some(Arc::clone(&port));
        initialize_stages(self.stages(), &port, seen)?;
        tracing::debug!("Chain initialized with {} stage(s)", self.stages().count());
        Ok(())
    }

    /// Tears the chain down. A second call is a no-op.
    pub fn dispose(&mut self) {
        self.dispose_tracked(&mut HashSet::new());
    }

    pub(crate) fn dispose_tracked(&mut self, seen: &mut HashSet<usize>) {
        if self.root.is_none() {
            return;
        }
        let stages: Vec<_> = self.stages().collect();
        let count = stages.len();
        dispose_stages(stages, self.port.as_ref(), seen);

        if let Some(root) = self.root.take() {
            root.unbind_port();
            if let Err(e) = root.set_successor(None) {
                tracing::warn!("Chain root kept its successor on dispose: {}", e);
            }
        }
        self.port = None;
        tracing::debug!("Chain disposed, {} stage(s) released", count);
    }
}

impl<T: ?Sized + ChainMember + 'static> Drop for ChainManager<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Send-side chain, built from the terminal backwards.
pub struct SenderChainManager {
    head: Option<Arc<dyn MidiDataSender>>,
    port: Option<Arc<dyn MidiPort>>,
}

impl SenderChainManager {
    /// `terminal` is the last sender, usually the out port.
    pub fn new(terminal: Arc<dyn MidiDataSender>) -> Self {
        Self {
            head: Some(terminal),
            port: None,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.head.is_none()
    }

    pub fn port(&self) -> Option<&Arc<dyn MidiPort>> {
        self.port.as_ref()
    }

    /// Puts `stage` in front of the current head.
    ///
    /// Fails with [`Error::NotChainable`] when `stage` cannot take a successor.
    pub fn add(&mut self, stage: Arc<dyn MidiDataSender>) -> Result<()> {
        let head = self.head.as_ref().ok_or(Error::Disposed)?;
        ensure_not_started(self.port.as_ref())?;
        {
            let chain = stage.as_chain().ok_or(Error::NotChainable)?;
            chain.set_successor(Some(Arc::clone(head)))?;
            if let Some(port) = &self.port {
                chain.bind_port(port);
            }
        }
        self.head = Some(stage);
        Ok(())
    }

    /// Entry point the application sends into.
    pub fn sender(&self) -> Option<Arc<dyn MidiDataSender>> {
        self.head.clone()
    }

    /// Stages from the head to the terminal.
    pub fn senders(&self) -> Stages<dyn MidiDataSender> {
        Stages {
            next: self.head.clone(),
        }
    }

    pub fn initialize(&mut self, port: Arc<dyn MidiPort>) -> Result<()> {
        if self.head.is_none() {
            return Err(Error::Disposed);
        }
        if self.port.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        self.port = Some(Arc::clone(&port));
        initialize_stages(self.senders(), &port, &mut HashSet::new())?;
        tracing::debug!("Sender chain initialized with {} stage(s)", self.senders().count());
        Ok(())
    }

    /// Tears the chain down. A second call is a no-op.
    pub fn dispose(&mut self) {
        if self.head.is_none() {
            return;
        }
        let stages: Vec<_> = self.senders().collect();
        dispose_stages(stages, self.port.as_ref(), &mut HashSet::new());
        self.head = None;
        self.port = None;
        tracing::debug!("Sender chain disposed");
    }
}

impl Drop for SenderChainManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// All three receive chains of one [`MidiInPort`].
///
/// A stage that sits on several channels is initialized and disposed once.
pub struct InPortChainManager {
    port: Arc<MidiInPort>,
    receivers: ReceiverChainManager,
    error_receivers: ErrorChainManager,
    port_event_receivers: PortEventChainManager,
}

impl InPortChainManager {
    pub fn new(port: Arc<MidiInPort>) -> Self {
        Self {
            receivers: ChainManager::new(port.clone()),
            error_receivers: ChainManager::new(port.clone()),
            port_event_receivers: ChainManager::new(port.clone()),
            port,
        }
    }

    pub fn port(&self) -> &Arc<MidiInPort> {
        &self.port
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        self.port.buffer_pool()
    }

    pub fn receivers(&mut self) -> &mut ReceiverChainManager {
        &mut self.receivers
    }

    pub fn error_receivers(&mut self) -> &mut ErrorChainManager {
        &mut self.error_receivers
    }

    pub fn port_event_receivers(&mut self) -> &mut PortEventChainManager {
        &mut self.port_event_receivers
    }

    /// Allocates the port's buffers from its configuration, then initializes
    /// the chains.
    pub fn initialize(&mut self) -> Result<()> {
        self.port.initialize_buffers()?;

        let port: Arc<dyn MidiPort> = self.port.clone();
        let mut seen = HashSet::new();
        self.receivers.initialize_tracked(Arc::clone(&port), &mut seen)?;
        self.error_receivers
            .initialize_tracked(Arc::clone(&port), &mut seen)?;
        self.port_event_receivers.initialize_tracked(port, &mut seen)?;
        Ok(())
    }

    pub fn dispose(&mut self) {
        let mut seen = HashSet::new();
        self.receivers.dispose_tracked(&mut seen);
        self.error_receivers.dispose_tracked(&mut seen);
        self.port_event_receivers.dispose_tracked(&mut seen);
    }
}

impl Drop for InPortChainManager {
    fn drop(&mut self) {
        self.dispose();
    }
}
