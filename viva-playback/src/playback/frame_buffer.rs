//! Frame Buffer for decoded PCM awaiting render
//!
//! This module provides the single structure shared between the producer
//! context (session delivering decoded frames) and the consumer context
//! (hardware render callback).
//!
//! ## Design
//!
//! ```text
//! SessionBridge → enqueue(chunk)
//!                      ↓
//!                FrameBuffer (bytes, SPSC ring)
//!                - Capacity: fixed at construction
//!                - Generation: bumped on every reset
//!                      ↓
//!                dequeue(out)
//!                      ↓
//!                RenderBridge
//! ```
//!
//! ## Thread Safety
//!
//! The ring is split into producer and consumer halves at construction, each
//! behind its own Mutex because `push_slice` / `pop_slice` need `&mut`.
//! - Producer lock: taken by `enqueue` and by `reset` (control context)
//! - Consumer lock: taken by `dequeue` with `try_lock` only, and by `reset`
//!
//! The render path never waits: if a reset holds the consumer half, `dequeue`
//! returns zero bytes immediately. `reset` takes producer then consumer before
//! bumping the generation, so a chunk is either fully enqueued under the old
//! generation (and drained) or checked against the new one, and every byte
//! the consumer sees is attributed to the generation it observed under the
//! same lock.
//!
//! **Memory Ordering:**
//! - Statistics counters: Relaxed (exact value not critical)
//! - Generation and accepting flag: Acquire/Release

use crate::audio::types::PcmChunk;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use thiserror::Error;
use tracing::{debug, trace};

/// Target fill window used for producer pacing
const TARGET_FILL_MIN_PERCENT: f32 = 0.50;
const TARGET_FILL_MAX_PERCENT: f32 = 0.75;

/// Reason a chunk was not enqueued
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnqueueError {
    /// Accepting the chunk would exceed capacity; the chunk was not written
    #[error("Buffer full: {requested} bytes offered, {occupied}/{capacity} occupied")]
    Overflow {
        capacity: usize,
        occupied: usize,
        requested: usize,
    },

    /// Chunk belongs to an epoch invalidated by a seek or track change
    #[error("Stale generation: chunk {chunk}, buffer {current}")]
    StaleGeneration { chunk: u64, current: u64 },

    /// Buffer closed after track end or session error
    #[error("Buffer closed at generation {generation}")]
    Closed { generation: u64 },
}

/// Result of a single dequeue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeueOutcome {
    /// Bytes copied into the front of the output slice
    pub bytes: usize,

    /// Fewer bytes than requested were available
    pub underrun: bool,

    /// Generation the supplied bytes belong to
    pub generation: u64,
}

/// Frame buffer statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct BufferStats {
    /// Capacity in bytes
    pub capacity: usize,

    /// Bytes currently buffered
    pub occupied: usize,

    /// Current generation
    pub generation: u64,

    /// Whether enqueue is currently accepted
    pub accepting: bool,

    /// Lifetime bytes accepted by enqueue
    pub total_enqueued: u64,

    /// Lifetime bytes handed to the render path
    pub total_dequeued: u64,

    /// Chunks rejected because they did not fit
    pub overflows: u64,

    /// Chunks discarded for carrying an old generation
    pub stale_discards: u64,

    /// Chunks discarded while the buffer was closed
    pub closed_discards: u64,

    /// Dequeues that returned fewer bytes than requested
    pub underruns: u64,

    /// Dequeues that found a reset in progress
    pub contended: u64,

    /// Sequence number of the last accepted chunk
    pub last_sequence: u64,
}

impl BufferStats {
    /// Fill fraction (0.0 to 1.0)
    pub fn fill_percent(&self) -> f32 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.occupied as f32 / self.capacity as f32
    }
}

/// Thread-safe byte queue between the session and render contexts
pub struct FrameBuffer {
    /// Ring producer half (session side)
    prod: Mutex<HeapProd<u8>>,

    /// Ring consumer half (render side, try_lock only)
    cons: Mutex<HeapCons<u8>>,

    /// Capacity in bytes (fixed at construction)
    capacity: usize,

    /// Bytes currently buffered
    ///
    /// Raised before the push and lowered after the pop so it never
    /// under-reports what the consumer can see.
    fill_level: AtomicUsize,

    /// Epoch marker; bumped on every reset
    generation: AtomicU64,

    /// Cleared between track end and the next track start
    accepting: AtomicBool,

    total_enqueued: AtomicU64,
    total_dequeued: AtomicU64,
    overflows: AtomicU64,
    stale_discards: AtomicU64,
    closed_discards: AtomicU64,
    underruns: AtomicU64,
    contended: AtomicU64,
    last_sequence: AtomicU64,
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("capacity", &self.capacity)
            .field("occupied", &self.occupied())
            .field("generation", &self.generation())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FrameBuffer {
    /// Create an empty, closed buffer at generation 0
    ///
    /// A zero capacity is raised to one byte; the ring cannot be empty-sized.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!("Creating frame buffer: capacity={} bytes", capacity);

        let (prod, cons) = HeapRb::<u8>::new(capacity).split();

        Self {
            prod: Mutex::new(prod),
            cons: Mutex::new(cons),
            capacity,
            fill_level: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            accepting: AtomicBool::new(false),
            total_enqueued: AtomicU64::new(0),
            total_dequeued: AtomicU64::new(0),
            overflows: AtomicU64::new(0),
            stale_discards: AtomicU64::new(0),
            closed_discards: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            contended: AtomicU64::new(0),
            last_sequence: AtomicU64::new(0),
        }
    }

    /// Append a chunk (producer context)
    ///
    /// The chunk is written whole or not at all. Returns the number of bytes
    /// accepted.
    pub fn enqueue(&self, chunk: &PcmChunk) -> Result<usize, EnqueueError> {
        let mut prod = lock_or_recover(&self.prod);

        let current = self.generation.load(Ordering::Acquire);
        if chunk.generation != current {
            self.stale_discards.fetch_add(1, Ordering::Relaxed);
            return Err(EnqueueError::StaleGeneration {
                chunk: chunk.generation,
                current,
            });
        }

        if !self.accepting.load(Ordering::Acquire) {
            self.closed_discards.fetch_add(1, Ordering::Relaxed);
            return Err(EnqueueError::Closed { generation: current });
        }

        if chunk.is_empty() {
            return Ok(0);
        }

        // Only this side shrinks the vacancy, so the check holds through the push
        let vacant = prod.vacant_len();
        if chunk.len() > vacant {
            let count = self.overflows.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(
                "Frame buffer overflow #{}: {} bytes offered, {} vacant",
                count,
                chunk.len(),
                vacant
            );
            return Err(EnqueueError::Overflow {
                capacity: self.capacity,
                occupied: self.capacity - vacant,
                requested: chunk.len(),
            });
        }

        self.fill_level.fetch_add(chunk.len(), Ordering::Relaxed);
        let written = prod.push_slice(&chunk.data);
        drop(prod);

        self.total_enqueued.fetch_add(written as u64, Ordering::Relaxed);
        self.last_sequence.store(chunk.sequence, Ordering::Relaxed);
        Ok(written)
    }

    /// Fill `out` from the head of the queue (consumer context)
    ///
    /// Never blocks and never allocates. Copies up to `out.len()` bytes into
    /// the front of `out`; the tail beyond `bytes` is left untouched for the
    /// caller to pad.
    pub fn dequeue(&self, out: &mut [u8]) -> DequeueOutcome {
        let mut cons = match self.cons.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                // Reset in progress: the buffer is being emptied by design
                self.contended.fetch_add(1, Ordering::Relaxed);
                return DequeueOutcome {
                    bytes: 0,
                    underrun: false,
                    generation: self.generation.load(Ordering::Acquire),
                };
            }
        };

        let generation = self.generation.load(Ordering::Acquire);
        let bytes = cons.pop_slice(out);
        drop(cons);

        if bytes > 0 {
            self.fill_level.fetch_sub(bytes, Ordering::Relaxed);
            self.total_dequeued.fetch_add(bytes as u64, Ordering::Relaxed);
        }

        let underrun = bytes < out.len();
        if underrun {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }

        DequeueOutcome {
            bytes,
            underrun,
            generation,
        }
    }

    /// Empty the queue and invalidate the current generation
    ///
    /// Keeps the accepting state. Returns the new generation.
    pub fn reset(&self) -> u64 {
        let accepting = self.accepting.load(Ordering::Acquire);
        self.reset_inner(accepting).0
    }

    /// Reset and accept chunks tagged with the new generation
    pub fn reset_and_open(&self) -> u64 {
        self.reset_inner(true).0
    }

    /// Reset and reject every chunk until the buffer is opened again
    pub fn reset_and_close(&self) -> u64 {
        self.reset_inner(false).0
    }

    /// `reset_and_close` that also reports how many bytes were drained
    pub fn drain_and_close(&self) -> (u64, usize) {
        self.reset_inner(false)
    }

    /// Start accepting chunks for the current generation without draining
    pub fn open(&self) -> u64 {
        let _prod = lock_or_recover(&self.prod);
        self.accepting.store(true, Ordering::Release);
        self.generation.load(Ordering::Acquire)
    }

    fn reset_inner(&self, accepting: bool) -> (u64, usize) {
        // Lock order: producer, then consumer
        let _prod = lock_or_recover(&self.prod);
        let mut cons = lock_or_recover(&self.cons);

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let drained = cons.clear();
        self.fill_level.store(0, Ordering::Relaxed);
        self.accepting.store(accepting, Ordering::Release);
        self.last_sequence.store(0, Ordering::Relaxed);

        debug!(
            "Frame buffer reset: generation={}, drained={} bytes, accepting={}",
            generation, drained, accepting
        );
        (generation, drained)
    }

    /// Current generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently buffered
    pub fn occupied(&self) -> usize {
        self.fill_level.load(Ordering::Relaxed).min(self.capacity)
    }

    /// Bytes that can be enqueued before overflow
    pub fn vacant(&self) -> usize {
        self.capacity - self.occupied()
    }

    /// Buffer is 50-75% full (optimal range)
    pub fn is_fill_optimal(&self) -> bool {
        let occupied = self.occupied();
        let min = (self.capacity as f32 * TARGET_FILL_MIN_PERCENT) as usize;
        let max = (self.capacity as f32 * TARGET_FILL_MAX_PERCENT) as usize;
        occupied >= min && occupied <= max
    }

    /// Buffer is below the target window; the producer should deliver more
    pub fn needs_data(&self) -> bool {
        let min = (self.capacity as f32 * TARGET_FILL_MIN_PERCENT) as usize;
        self.occupied() < min
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            capacity: self.capacity,
            occupied: self.occupied(),
            generation: self.generation(),
            accepting: self.is_accepting(),
            total_enqueued: self.total_enqueued.load(Ordering::Relaxed),
            total_dequeued: self.total_dequeued.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            stale_discards: self.stale_discards.load(Ordering::Relaxed),
            closed_discards: self.closed_discards.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            last_sequence: self.last_sequence.load(Ordering::Relaxed),
        }
    }
}
