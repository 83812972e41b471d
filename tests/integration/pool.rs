//! Buffer pool integration tests
//!
//! Checkout limits, conservation of buffers, return preconditions and
//! draining across threads.

use std::thread;
use std::time::Duration;

use midichain::prelude::*;
use midichain::Error;

use crate::helpers::*;

fn give_back(pool: &BufferPool, buffer: &MidiBuffer) {
    buffer.mark_done();
    pool.return_buffer(buffer).unwrap();
}

/// Four buffers of 64 bytes: the fifth retrieve finds nothing.
#[test]
fn test_retrieve_all_then_return_one() {
    init_tracing();
    let pool = BufferPool::new();
    pool.initialize(4, 64).unwrap();

    let buffers: Vec<_> = (0..4).map(|_| pool.retrieve().unwrap()).collect();
    assert!(pool.retrieve().is_none());

    give_back(&pool, &buffers[0]);
    assert_eq!(pool.unused_count(), 1);

    for buffer in &buffers[1..] {
        give_back(&pool, buffer);
    }
}

/// used + unused equals the buffer count after every legal operation.
#[test]
fn test_buffer_conservation() {
    let pool = BufferPool::new();
    pool.initialize(5, 32).unwrap();
    let mut held = Vec::new();

    for step in 0..40 {
        if step % 3 == 2 {
            if let Some(buffer) = held.pop() {
                give_back(&pool, &buffer);
            }
        } else if let Some(buffer) = pool.retrieve() {
            assert!(held.iter().all(|other: &MidiBuffer| other.index() != buffer.index()));
            held.push(buffer);
        }
        assert_eq!(pool.used_count() + pool.unused_count(), 5);
        assert_eq!(pool.used_count(), held.len());
    }

    for buffer in held.drain(..) {
        give_back(&pool, &buffer);
    }
}

/// Failed returns leave the used and unused sets untouched.
#[test]
fn test_return_preconditions() {
    let pool = BufferPool::new();
    pool.initialize(2, 16).unwrap();
    let buffer = pool.retrieve().unwrap();

    buffer.mark_in_queue();
    buffer.mark_done();
    assert_eq!(pool.return_buffer(&buffer), Err(Error::StillInUse));

    buffer.clear_in_queue();
    buffer.clear_done();
    assert_eq!(pool.return_buffer(&buffer), Err(Error::NotDone));
    assert_eq!((pool.used_count(), pool.unused_count()), (1, 1));

    give_back(&pool, &buffer);
}

/// The infinite wait returns only after the last buffer is back.
#[test]
fn test_drain_before_dispose() {
    init_tracing();
    let pool = Arc::new(BufferPool::new());
    pool.initialize_with(&BufferPoolConfig::with_buffers(3, 64))
        .unwrap();
    let buffers: Vec<_> = (0..3).map(|_| pool.retrieve().unwrap()).collect();

    let returner = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            for buffer in buffers {
                thread::sleep(Duration::from_millis(5));
                buffer.mark_done();
                pool.return_buffer(&buffer).unwrap();
            }
        })
    };

    assert!(pool.wait_for_all_returned(None));
    assert_eq!(pool.used_count(), 0);
    returner.join().unwrap();
    assert!(pool.dispose().is_ok());
}
