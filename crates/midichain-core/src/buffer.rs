//! Long-message buffers lent out by a [`BufferPool`](crate::BufferPool).

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

// Header flag bits, same meaning as the driver-side header.
const FLAG_DONE: u32 = 0x0000_0001;
const FLAG_PREPARED: u32 = 0x0000_0002;
const FLAG_IN_QUEUE: u32 = 0x0000_0004;
const FLAG_STREAM: u32 = 0x0000_0008;

pub(crate) struct BufferSlot {
    index: usize,
    data: Mutex<Box<[u8]>>,
    bytes_recorded: AtomicU32,
    flags: AtomicU32,
    holds: AtomicU32,
}

impl BufferSlot {
    pub(crate) fn new(index: usize, size: usize) -> Self {
        Self {
            index,
            data: Mutex::new(vec![0u8; size].into_boxed_slice()),
            bytes_recorded: AtomicU32::new(0),
            flags: AtomicU32::new(0),
            holds: AtomicU32::new(0),
        }
    }
}

/// Handle to one pooled buffer and its header.
///
/// Cloning the handle does not copy the memory; every clone refers to the
/// same slot. The pool tracks checkout, so a handle must be returned exactly
/// once no matter how many clones exist.
#[derive(Clone)]
#[must_use = "pooled buffers must be returned to their pool"]
pub struct MidiBuffer {
    pool_id: u64,
    slot: Arc<BufferSlot>,
}

impl MidiBuffer {
    pub(crate) fn new(pool_id: u64, slot: Arc<BufferSlot>) -> Self {
        Self { pool_id, slot }
    }

    #[inline]
    pub(crate) fn pool_id(&self) -> u64 {
        self.pool_id
    }

    #[inline]
    pub(crate) fn slot(&self) -> &Arc<BufferSlot> {
        &self.slot
    }

    /// Position of this buffer inside its pool.
    #[inline]
    pub fn index(&self) -> usize {
        self.slot.index
    }

    pub fn capacity(&self) -> usize {
        self.slot.data.lock().len()
    }

    #[inline]
    pub fn bytes_recorded(&self) -> u32 {
        self.slot.bytes_recorded.load(Ordering::Acquire)
    }

    pub fn set_bytes_recorded(&self, len: u32) -> Result<()> {
        let capacity = self.capacity();
        if len as usize > capacity {
            return Err(Error::BufferOverflow {
                len: len as usize,
                capacity,
            });
        }
        self.slot.bytes_recorded.store(len, Ordering::Release);
        Ok(())
    }

    /// Replaces the contents with `bytes` and records their length.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut data = self.slot.data.lock();
        if bytes.len() > data.len() {
            return Err(Error::BufferOverflow {
                len: bytes.len(),
                capacity: data.len(),
            });
        }
        data[..bytes.len()].copy_from_slice(bytes);
        self.slot
            .bytes_recorded
            .store(bytes.len() as u32, Ordering::Release);
        Ok(())
    }

    /// Runs `f` over the recorded bytes.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let data = self.slot.data.lock();
        let len = (self.bytes_recorded() as usize).min(data.len());
        f(&data[..len])
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.with_bytes(<[u8]>::to_vec)
    }

    /// Forgets the recorded bytes. Header flags are left alone.
    pub fn clear(&self) {
        self.slot.bytes_recorded.store(0, Ordering::Release);
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.has_flag(FLAG_DONE)
    }

    pub fn mark_done(&self) {
        self.set_flag(FLAG_DONE);
    }

    pub fn clear_done(&self) {
        self.clear_flag(FLAG_DONE);
    }

    #[inline]
    pub fn is_prepared(&self) -> bool {
        self.has_flag(FLAG_PREPARED)
    }

    pub fn mark_prepared(&self) {
        self.set_flag(FLAG_PREPARED);
    }

    pub fn clear_prepared(&self) {
        self.clear_flag(FLAG_PREPARED);
    }

    #[inline]
    pub fn is_in_queue(&self) -> bool {
        self.has_flag(FLAG_IN_QUEUE)
    }

    pub fn mark_in_queue(&self) {
        self.set_flag(FLAG_IN_QUEUE);
    }

    pub fn clear_in_queue(&self) {
        self.clear_flag(FLAG_IN_QUEUE);
    }

    /// Takes a hold on the buffer for a stage that keeps it past the call
    /// it was delivered in. The delivering port does not take the buffer
    /// back while any hold is outstanding.
    pub fn retain(&self) {
        self.slot.holds.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops one hold. Returns `true` when it was the last one.
    ///
    /// Releasing a buffer nobody holds is a no-op that returns `false`.
    pub fn release(&self) -> bool {
        self.slot
            .holds
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |holds| {
                holds.checked_sub(1)
            })
            .is_ok_and(|previous| previous == 1)
    }

    #[inline]
    pub fn holds(&self) -> u32 {
        self.slot.holds.load(Ordering::Acquire)
    }

    pub(crate) fn reset_holds(&self) {
        self.slot.holds.store(0, Ordering::Release);
    }

    /// Buffer carries stream events rather than a plain long message.
    #[inline]
    pub fn is_stream(&self) -> bool {
        self.has_flag(FLAG_STREAM)
    }

    pub fn set_stream_flag(&self, stream: bool) {
        if stream {
            self.set_flag(FLAG_STREAM);
        } else {
            self.clear_flag(FLAG_STREAM);
        }
    }

    #[inline]
    fn has_flag(&self, flag: u32) -> bool {
        self.slot.flags.load(Ordering::Acquire) & flag != 0
    }

    #[inline]
    fn set_flag(&self, flag: u32) {
        self.slot.flags.fetch_or(flag, Ordering::AcqRel);
    }

    #[inline]
    fn clear_flag(&self, flag: u32) {
        self.slot.flags.fetch_and(!flag, Ordering::AcqRel);
    }
}

impl PartialEq for MidiBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.pool_id == other.pool_id && Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl Eq for MidiBuffer {}

impl fmt::Debug for MidiBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiBuffer")
            .field("pool", &self.pool_id)
            .field("index", &self.slot.index)
            .field("bytes_recorded", &self.bytes_recorded())
            .field("flags", &format_args!("{:#x}", self.slot.flags.load(Ordering::Relaxed)))
            .field("holds", &self.holds())
            .finish()
    }
}
