//! Timing of everything downstream of a chain position.

use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant};

use midichain_core::{ChainLink, ChainOf, MidiBuffer, MidiComponent, MidiDataReceiver, Timestamp};

/// Call statistics for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerformanceData {
    fastest: Duration,
    slowest: Duration,
    total: Duration,
    calls: u64,
}

impl Default for PerformanceData {
    fn default() -> Self {
        Self {
            fastest: Duration::MAX,
            slowest: Duration::ZERO,
            total: Duration::ZERO,
            calls: 0,
        }
    }
}

impl PerformanceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_call(&mut self, elapsed: Duration) {
        self.fastest = self.fastest.min(elapsed);
        self.slowest = self.slowest.max(elapsed);
        self.total = self.total.saturating_add(elapsed);
        self.calls += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// `None` until the first call.
    pub fn fastest(&self) -> Option<Duration> {
        (self.calls > 0).then_some(self.fastest)
    }

    pub fn slowest(&self) -> Option<Duration> {
        (self.calls > 0).then_some(self.slowest)
    }

    pub fn average(&self) -> Option<Duration> {
        if self.calls == 0 {
            return None;
        }
        let nanos = self.total.as_nanos() / u128::from(self.calls);
        Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl fmt::Display for PerformanceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.fastest(), self.average(), self.slowest()) {
            (Some(fastest), Some(average), Some(slowest)) => write!(
                f,
                "Fastest:{:.3}ms Average:{:.3}ms Slowest:{:.3}ms ({})",
                fastest.as_secs_f64() * 1000.0,
                average.as_secs_f64() * 1000.0,
                slowest.as_secs_f64() * 1000.0,
                self.calls
            ),
            _ => f.write_str("<no data>"),
        }
    }
}

/// Receiver stage that times how long its successor takes per message.
#[derive(Debug, Default)]
pub struct DiagnosticReceiver {
    link: ChainLink,
    short: Mutex<PerformanceData>,
    long: Mutex<PerformanceData>,
}

impl DiagnosticReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&self) -> &ChainLink {
        &self.link
    }

    pub fn short_performance(&self) -> PerformanceData {
        *self.short.lock()
    }

    pub fn long_performance(&self) -> PerformanceData {
        *self.long.lock()
    }

    pub fn reset(&self) {
        self.short.lock().reset();
        self.long.lock().reset();
    }
}

impl MidiComponent for DiagnosticReceiver {}

impl MidiDataReceiver for DiagnosticReceiver {
    fn short_data(&self, data: u32, timestamp: Timestamp) {
        let start = Instant::now();
        self.link.forward_short_data(data, timestamp);
        self.short.lock().add_call(start.elapsed());
    }

    fn long_data(&self, buffer: &MidiBuffer, timestamp: Timestamp) {
        let start = Instant::now();
        self.link.forward_long_data(buffer, timestamp);
        self.long.lock().add_call(start.elapsed());
    }

    fn as_chain(&self) -> Option<&dyn ChainOf<dyn MidiDataReceiver>> {
        Some(&self.link)
    }
}

impl fmt::Display for DiagnosticReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ShortData: {}", self.short_performance())?;
        write!(f, "LongData: {}", self.long_performance())
    }
}
