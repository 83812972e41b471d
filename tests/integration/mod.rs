//! Integration test modules for midichain

pub mod chain;
pub mod pool;
pub mod stages;
