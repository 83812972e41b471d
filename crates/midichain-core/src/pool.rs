//! Fixed-size pool of long-message buffers.
//!
//! All buffers are allocated once by [`BufferPool::initialize`] and cycle
//! between the unused queue and the used set for the life of the pool.
//! Both sets live behind one mutex; holding it never does more than move an
//! index between them.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::buffer::{BufferSlot, MidiBuffer};
use crate::config::{BufferPoolConfig, MAX_BUFFER_SIZE};
use crate::error::{Error, Result};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct PoolState {
    initialized: bool,
    disposed: bool,
    require_prepared: bool,
    buffer_size: u32,
    slots: Vec<Arc<BufferSlot>>,
    checked_out: Vec<bool>,
    used: usize,
    unused: VecDeque<usize>,
}

pub struct BufferPool {
    id: u64,
    state: Mutex<PoolState>,
    all_returned: Condvar,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(PoolState::default()),
            all_returned: Condvar::new(),
        }
    }

    /// Allocates `count` buffers of `size` bytes. Callable once.
    pub fn initialize(&self, count: u32, size: u32) -> Result<()> {
        if size == 0 || size >= MAX_BUFFER_SIZE {
            return Err(Error::InvalidBufferSize(size));
        }

        let mut state = self.state.lock();
        if state.disposed {
            return Err(Error::Disposed);
        }
        if state.initialized {
            return Err(Error::AlreadyInitialized);
        }

        let count = count as usize;
        state.slots = (0..count)
            .map(|index| Arc::new(BufferSlot::new(index, size as usize)))
            .collect();
        state.checked_out = vec![false; count];
        state.unused = (0..count).collect();
        state.used = 0;
        state.buffer_size = size;
        state.initialized = true;

        tracing::debug!(
            "Buffer pool {} initialized: {} x {} bytes",
            self.id,
            count,
            size
        );
        Ok(())
    }

    pub fn initialize_with(&self, config: &BufferPoolConfig) -> Result<()> {
        self.initialize(config.buffer_count, config.buffer_size)?;
        self.state.lock().require_prepared = config.require_prepared;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    pub fn buffer_count(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn buffer_size(&self) -> u32 {
        self.state.lock().buffer_size
    }

    pub fn used_count(&self) -> usize {
        self.state.lock().used
    }

    pub fn unused_count(&self) -> usize {
        self.state.lock().unused.len()
    }

    /// Checks out the next free buffer, or `None` when all are in use.
    ///
    /// Never blocks beyond the pool lock. The returned buffer has no
    /// recorded bytes and its done flag cleared.
    #[must_use = "pooled buffers must be returned to their pool"]
    pub fn retrieve(&self) -> Option<MidiBuffer> {
        let mut state = self.state.lock();
        if state.disposed {
            return None;
        }
        let index = state.unused.pop_front()?;
        state.checked_out[index] = true;
        state.used += 1;
        let buffer = MidiBuffer::new(self.id, Arc::clone(&state.slots[index]));
        drop(state);

        buffer.clear();
        buffer.clear_done();
        buffer.reset_holds();
        Some(buffer)
    }

    /// Gives a checked-out buffer back.
    ///
    /// Fails without touching pool state when the buffer belongs to another
    /// pool, is not checked out, is unprepared (if required), is still queued
    /// with the transport, or has not been marked done.
    pub fn return_buffer(&self, buffer: &MidiBuffer) -> Result<()> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(Error::Disposed);
        }

        let index = buffer.index();
        let owned = buffer.pool_id() == self.id
            && state
                .slots
                .get(index)
                .is_some_and(|slot| Arc::ptr_eq(slot, buffer.slot()));
        if !owned {
            return Err(Error::NotOwned);
        }
        if !state.checked_out[index] {
            return Err(Error::NotCheckedOut);
        }
        if state.require_prepared && !buffer.is_prepared() {
            return Err(Error::NotPrepared);
        }
        if buffer.is_in_queue() {
            return Err(Error::StillInUse);
        }
        if !buffer.is_done() {
            return Err(Error::NotDone);
        }

        state.checked_out[index] = false;
        state.used -= 1;
        state.unused.push_back(index);
        if state.used == 0 {
            self.all_returned.notify_all();
        }
        Ok(())
    }

    /// Blocks until no buffer is checked out. `None` waits forever.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub fn wait_for_all_returned(&self, timeout: Option<Duration>) -> bool {
        let mut state = self.state.lock();
        match timeout {
            None => {
                while state.used > 0 {
                    self.all_returned.wait(&mut state);
                }
                true
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while state.used > 0 {
                    if self
                        .all_returned
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        return state.used == 0;
                    }
                }
                true
            }
        }
    }

    /// Looks up a buffer by index whether or not it is checked out.
    pub fn find_buffer(&self, index: usize) -> Option<MidiBuffer> {
        let state = self.state.lock();
        state
            .slots
            .get(index)
            .map(|slot| MidiBuffer::new(self.id, Arc::clone(slot)))
    }

    pub fn is_checked_out(&self, buffer: &MidiBuffer) -> bool {
        let state = self.state.lock();
        buffer.pool_id() == self.id && state.checked_out.get(buffer.index()) == Some(&true)
    }

    /// Runs `f` on every buffer, checked out or not.
    pub fn for_each_buffer(&self, mut f: impl FnMut(&MidiBuffer)) {
        let buffers: Vec<MidiBuffer> = {
            let state = self.state.lock();
            state
                .slots
                .iter()
                .map(|slot| MidiBuffer::new(self.id, Arc::clone(slot)))
                .collect()
        };
        for buffer in &buffers {
            f(buffer);
        }
    }

    pub fn prepare_all(&self) {
        self.for_each_buffer(MidiBuffer::mark_prepared);
    }

    pub fn unprepare_all(&self) {
        self.for_each_buffer(MidiBuffer::clear_prepared);
    }

    /// Releases all buffer memory. Fails while any buffer is checked out.
    ///
    /// A second call is a no-op.
    pub fn dispose(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.disposed {
            return Ok(());
        }
        if state.used > 0 {
            return Err(Error::BuffersInUse(state.used));
        }
        state.slots.clear();
        state.checked_out.clear();
        state.unused.clear();
        state.disposed = true;
        self.all_returned.notify_all();
        tracing::debug!("Buffer pool {} disposed", self.id);
        Ok(())
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.disposed && state.used > 0 {
            tracing::error!(
                "Buffer pool {} dropped with {} buffer(s) still in use",
                self.id,
                state.used
            );
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BufferPool")
            .field("id", &self.id)
            .field("buffers", &state.slots.len())
            .field("buffer_size", &state.buffer_size)
            .field("used", &state.used)
            .field("unused", &state.unused.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}
