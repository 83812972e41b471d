//! Packed short-message words.
//!
//! A short MIDI message travels as one `u32`: status in bits 0-7, the first
//! data byte in bits 8-15 and the second in bits 16-23.

use serde::{Deserialize, Serialize};

const STATUS_MASK: u32 = 0x0000_00FF;
const PARAM1_SHIFT: u32 = 8;
const PARAM2_SHIFT: u32 = 16;
const DATA8_MASK: u32 = 0x0000_00FF;
const DATA16_MASK: u32 = 0x0000_FFFF;
const DATA24_MASK: u32 = 0x00FF_FFFF;
const RUNNING_STATUS_SHIFT: u32 = 8;
const CHANNEL_MASK: u8 = 0x0F;

/// Largest value a MIDI data byte may hold.
pub const DATA_VALUE_MAX: u8 = 0x7F;

#[inline]
pub fn status_byte(data: u32) -> u8 {
    (data & STATUS_MASK) as u8
}

#[inline]
pub fn param1(data: u32) -> u8 {
    ((data >> PARAM1_SHIFT) & DATA8_MASK) as u8
}

#[inline]
pub fn param2(data: u32) -> u8 {
    ((data >> PARAM2_SHIFT) & DATA8_MASK) as u8
}

#[inline]
pub fn data24(data: u32) -> u32 {
    data & DATA24_MASK
}

/// The word with its status byte stripped, as sent under running status.
#[inline]
pub fn running_status_data(data: u32) -> u32 {
    (data >> RUNNING_STATUS_SHIFT) & DATA16_MASK
}

/// `true` for bytes that start a message (bit 7 set).
#[inline]
pub fn is_status(byte: u8) -> bool {
    byte & 0x80 != 0
}

/// A short MIDI message packed into 24 bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MidiData(u32);

impl MidiData {
    pub fn new(data: u32) -> Self {
        Self(data24(data))
    }

    /// Values above 0x7F are masked to 7 bits.
    pub fn from_parts(status: u8, param1: u8, param2: u8) -> Self {
        Self(
            u32::from(status)
                | (u32::from(param1 & DATA_VALUE_MAX) << PARAM1_SHIFT)
                | (u32::from(param2 & DATA_VALUE_MAX) << PARAM2_SHIFT),
        )
    }

    #[inline]
    pub fn data(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn status(self) -> u8 {
        status_byte(self.0)
    }

    #[inline]
    pub fn channel(self) -> u8 {
        self.status() & CHANNEL_MASK
    }

    #[inline]
    pub fn param1(self) -> u8 {
        param1(self.0)
    }

    #[inline]
    pub fn param2(self) -> u8 {
        param2(self.0)
    }

    #[inline]
    pub fn running_status_data(self) -> u32 {
        running_status_data(self.0)
    }

    pub fn with_status(self, status: u8) -> Self {
        Self((self.0 & !STATUS_MASK) | u32::from(status))
    }

    pub fn with_channel(self, channel: u8) -> Self {
        let status = (self.status() & !CHANNEL_MASK) | (channel & CHANNEL_MASK);
        self.with_status(status)
    }

    pub fn with_param1(self, value: u8) -> Self {
        let cleared = self.0 & !(DATA8_MASK << PARAM1_SHIFT);
        Self(cleared | (u32::from(value & DATA_VALUE_MAX) << PARAM1_SHIFT))
    }

    pub fn with_param2(self, value: u8) -> Self {
        let cleared = self.0 & !(DATA8_MASK << PARAM2_SHIFT);
        Self(cleared | (u32::from(value & DATA_VALUE_MAX) << PARAM2_SHIFT))
    }

    /// Whether the status carries at least one data byte.
    pub fn has_param1(self) -> bool {
        !matches!(
            self.status(),
            0xFF | 0xFE | 0xFC | 0xFB | 0xFA | 0xF9 | 0xF8 | 0xF6 | 0xF0
        )
    }

    /// Whether the status carries two data bytes.
    pub fn has_param2(self) -> bool {
        let status = self.status();
        let kind = status & 0xF0;
        (self.has_param1() && kind != 0xC0 && kind != 0xD0 && kind != 0xF0) || status == 0xF2
    }
}

impl From<u32> for MidiData {
    fn from(data: u32) -> Self {
        Self::new(data)
    }
}

impl From<MidiData> for u32 {
    fn from(data: MidiData) -> Self {
        data.0
    }
}
