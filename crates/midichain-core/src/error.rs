//! Error types for the MIDI chain core.

use thiserror::Error;

use crate::port::PortStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Buffer pool is already initialized")]
    AlreadyInitialized,

    #[error("Buffer pool is not initialized")]
    NotInitialized,

    #[error("Invalid buffer size {0} (must be between 1 and 65535 bytes)")]
    InvalidBufferSize(u32),

    #[error("Buffer is not owned by this pool")]
    NotOwned,

    #[error("Buffer is not checked out of this pool")]
    NotCheckedOut,

    #[error("Buffer is still queued with the transport")]
    StillInUse,

    #[error("Buffer has not been marked done by the transport")]
    NotDone,

    #[error("Buffer is not prepared")]
    NotPrepared,

    #[error("Buffer overflow: {len} bytes do not fit in {capacity}")]
    BufferOverflow { len: usize, capacity: usize },

    #[error("{0} buffer(s) still in use")]
    BuffersInUse(usize),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid port status: {0}")]
    InvalidStatus(PortStatus),

    #[error("End of chain: the last component does not accept a successor")]
    EndOfChain,

    #[error("Component cannot be chained")]
    NotChainable,

    #[error("Object has been disposed")]
    Disposed,

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("MIDI transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, Error>;
