//! Port status flags and status-change notification.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Port status bit flags.
///
/// `CLOSED` never combines with another flag. `STARTED` never combines with
/// `STOPPED` or `PAUSED`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortStatus(u32);

impl PortStatus {
    pub const NONE: Self = Self(0x0000);
    pub const CLOSED: Self = Self(0x0001);
    pub const OPEN: Self = Self(0x0002);
    pub const STARTED: Self = Self(0x0004);
    pub const STOPPED: Self = Self(0x0008);
    pub const PAUSED: Self = Self(0x0010);
    pub const RESET: Self = Self(0x0020);
    /// A transition was requested but the transport has not confirmed it.
    pub const PENDING: Self = Self(0x0100);

    const NAMES: [(Self, &'static str); 7] = [
        (Self::CLOSED, "Closed"),
        (Self::OPEN, "Open"),
        (Self::STARTED, "Started"),
        (Self::STOPPED, "Stopped"),
        (Self::PAUSED, "Paused"),
        (Self::RESET, "Reset"),
        (Self::PENDING, "Pending"),
    ];

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// All flags of `other` are set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Any flag of `other` is set.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub fn validate(self) -> Result<Self> {
        if self.is_none() {
            return Err(Error::InvalidStatus(self));
        }
        if self.intersects(Self::CLOSED) && self.difference(Self::PENDING) != Self::CLOSED {
            return Err(Error::InvalidStatus(self));
        }
        if self.intersects(Self::STARTED) && self.intersects(Self::STOPPED | Self::PAUSED) {
            return Err(Error::InvalidStatus(self));
        }
        Ok(self)
    }

    /// Removes `remove` (and any pending `RESET`), adds `add`, then validates.
    pub fn modify(self, add: Self, remove: Self) -> Result<Self> {
        self.difference(remove | Self::RESET).union(add).validate()
    }
}

impl std::ops::BitOr for PortStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for PortStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("None");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        let unknown = Self::NAMES
            .iter()
            .fold(*self, |rest, (flag, _)| rest.difference(*flag));
        if !unknown.is_none() {
            if !first {
                f.write_str(" | ")?;
            }
            write!(f, "{:#x}", unknown.0)?;
        }
        Ok(())
    }
}

impl fmt::Debug for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PortStatus({self})")
    }
}

/// Callback invoked with the new status after every change.
pub type StatusListener = Arc<dyn Fn(PortStatus) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Current status plus its subscribers.
///
/// Listener list is copy-on-write so notification never holds a lock while
/// calling out.
pub struct PortStatusCell {
    status: AtomicU32,
    listeners: ArcSwap<Vec<(SubscriptionId, StatusListener)>>,
    next_id: AtomicU64,
}

impl PortStatusCell {
    pub fn new(initial: PortStatus) -> Self {
        Self {
            status: AtomicU32::new(initial.bits()),
            listeners: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    #[inline]
    pub fn get(&self) -> PortStatus {
        PortStatus::from_bits(self.status.load(Ordering::Acquire))
    }

    #[inline]
    pub fn has(&self, status: PortStatus) -> bool {
        self.get().intersects(status)
    }

    /// Stores `status` and notifies subscribers if it differs from the old value.
    pub fn set(&self, status: PortStatus) {
        let old = PortStatus::from_bits(self.status.swap(status.bits(), Ordering::AcqRel));
        if old != status {
            tracing::debug!("Port status {} -> {}", old, status);
            self.notify(status);
        }
    }

    /// Applies [`PortStatus::modify`] to the current value atomically.
    ///
    /// Concurrent callers never lose each other's transitions; subscribers
    /// hear about the change only once the exchange has succeeded.
    pub fn modify(&self, add: PortStatus, remove: PortStatus) -> Result<PortStatus> {
        let mut current = self.status.load(Ordering::Acquire);
        loop {
            let old = PortStatus::from_bits(current);
            let status = old.modify(add, remove)?;
            match self.status.compare_exchange_weak(
                current,
                status.bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if old != status {
                        tracing::debug!("Port status {} -> {}", old, status);
                        self.notify(status);
                    }
                    return Ok(status);
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn subscribe(&self, listener: StatusListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.rcu(|current| {
            let mut listeners = (**current).clone();
            listeners.push((id, Arc::clone(&listener)));
            listeners
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        self.listeners.rcu(|current| {
            let listeners: Vec<_> = current
                .iter()
                .filter(|(existing, _)| *existing != id)
                .cloned()
                .collect();
            removed = listeners.len() != current.len();
            listeners
        });
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.load().len()
    }

    fn notify(&self, status: PortStatus) {
        let listeners = self.listeners.load_full();
        for (id, listener) in listeners.iter() {
            if catch_unwind(AssertUnwindSafe(|| listener(status))).is_err() {
                tracing::error!("Status listener {:?} panicked on {}", id, status);
            }
        }
    }
}

impl Default for PortStatusCell {
    fn default() -> Self {
        Self::new(PortStatus::CLOSED)
    }
}

impl fmt::Debug for PortStatusCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortStatusCell")
            .field("status", &self.get())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
