//! Port events: one record per driver callback.

use crate::buffer::MidiBuffer;

/// Timestamp attached to every message, in the port's time base.
pub type Timestamp = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortEventKind {
    ShortData,
    ShortError,
    /// Short data delivered while the application is falling behind.
    MoreData,
    LongData,
    LongError,
}

impl PortEventKind {
    #[inline]
    pub fn is_short(self) -> bool {
        matches!(
            self,
            PortEventKind::ShortData | PortEventKind::ShortError | PortEventKind::MoreData
        )
    }

    #[inline]
    pub fn is_error(self) -> bool {
        matches!(self, PortEventKind::ShortError | PortEventKind::LongError)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEventPayload {
    Short(u32),
    Long(MidiBuffer),
}

/// Immutable record of one short or long message.
///
/// The kind always matches the payload: short kinds carry a data word, long
/// kinds carry a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEvent {
    kind: PortEventKind,
    payload: PortEventPayload,
    timestamp: Timestamp,
}

impl PortEvent {
    pub fn short_data(data: u32, timestamp: Timestamp) -> Self {
        Self::short(PortEventKind::ShortData, data, timestamp)
    }

    pub fn short_error(data: u32, timestamp: Timestamp) -> Self {
        Self::short(PortEventKind::ShortError, data, timestamp)
    }

    pub fn more_data(data: u32, timestamp: Timestamp) -> Self {
        Self::short(PortEventKind::MoreData, data, timestamp)
    }

    pub fn long_data(buffer: MidiBuffer, timestamp: Timestamp) -> Self {
        Self::long(PortEventKind::LongData, buffer, timestamp)
    }

    pub fn long_error(buffer: MidiBuffer, timestamp: Timestamp) -> Self {
        Self::long(PortEventKind::LongError, buffer, timestamp)
    }

    fn short(kind: PortEventKind, data: u32, timestamp: Timestamp) -> Self {
        Self {
            kind,
            payload: PortEventPayload::Short(data),
            timestamp,
        }
    }

    fn long(kind: PortEventKind, buffer: MidiBuffer, timestamp: Timestamp) -> Self {
        Self {
            kind,
            payload: PortEventPayload::Long(buffer),
            timestamp,
        }
    }

    /// Same record with a different timestamp.
    pub fn restamped(&self, timestamp: Timestamp) -> Self {
        Self {
            kind: self.kind,
            payload: self.payload.clone(),
            timestamp,
        }
    }

    #[inline]
    pub fn kind(&self) -> PortEventKind {
        self.kind
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    #[inline]
    pub fn is_short(&self) -> bool {
        self.kind.is_short()
    }

    pub fn payload(&self) -> &PortEventPayload {
        &self.payload
    }

    /// Data word of a short record.
    pub fn data(&self) -> Option<u32> {
        match self.payload {
            PortEventPayload::Short(data) => Some(data),
            PortEventPayload::Long(_) => None,
        }
    }

    /// Buffer of a long record.
    pub fn buffer(&self) -> Option<&MidiBuffer> {
        match &self.payload {
            PortEventPayload::Short(_) => None,
            PortEventPayload::Long(buffer) => Some(buffer),
        }
    }
}
