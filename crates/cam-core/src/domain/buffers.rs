//! Fixed-capacity frame buffers and the double-buffer store.
//!
//! Three buffers live for the whole process:
//!
//! ```text
//!   slot A ─┐
//!           ├─ double buffer: one is "active" (served to viewers),
//!   slot B ─┘  the other is "staging" (written by the reassembler)
//!   fallback   written once at startup, read-only afterwards
//! ```
//!
//! # Why double buffering? (for beginners)
//!
//! A frame arrives as many chunks over tens of milliseconds.  If viewers read
//! the same buffer the reassembler writes into, they would see "torn" images:
//! the top half of the new frame glued to the bottom half of the old one.
//! With two buffers the reassembler always fills the staging slot while
//! viewers read the active slot.  When a frame is complete the roles flip in
//! one step ([`BufferStore::swap`]), so a reader only ever sees whole frames.
//!
//! The store hands out `&mut` access to the staging slot only, so the borrow
//! checker guarantees the active slot is never written while it is served.
//!
//! The buffers are allocated once at full capacity and never grow; running
//! out of room is an explicit [`CapacityExceeded`] error, never a silent
//! truncation.

use thiserror::Error;

use crate::domain::distribution::FrameSource;

/// Returned when an append would exceed a buffer's fixed capacity.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[error("buffer capacity exceeded: need {needed} bytes, {remaining} remaining")]
pub struct CapacityExceeded {
    /// Bytes the caller tried to append.
    pub needed: usize,
    /// Bytes still free in the buffer.
    pub remaining: usize,
}

/// A pre-allocated, fixed-capacity byte buffer with a fill level.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    bytes: Box<[u8]>,
    len: usize,
}

impl FrameBuffer {
    /// Allocates an empty buffer able to hold `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Allocates a buffer of `capacity` bytes and fills it with `data`.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityExceeded`] if `data` is longer than `capacity`.
    pub fn from_slice(data: &[u8], capacity: usize) -> Result<Self, CapacityExceeded> {
        let mut buffer = Self::with_capacity(capacity);
        buffer.try_append(data)?;
        Ok(buffer)
    }

    /// Total number of bytes the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Number of bytes currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bytes are stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bytes that can still be appended.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    /// The stored bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Resets the fill level to zero.  The allocation is kept.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Appends `data` after the stored bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityExceeded`] and leaves the buffer untouched if `data`
    /// does not fit in the remaining space.
    pub fn try_append(&mut self, data: &[u8]) -> Result<(), CapacityExceeded> {
        let remaining = self.remaining();
        if data.len() > remaining {
            return Err(CapacityExceeded {
                needed: data.len(),
                remaining,
            });
        }
        self.bytes[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }
}

/// One of the two double-buffer slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    /// Returns the opposite slot.
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }
}

/// Point-in-time view of the store's bookkeeping, used to assert that
/// ignored input leaves the store untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub active: Slot,
    pub idle_ticks: u32,
    pub active_len: usize,
    pub staging_len: usize,
}

/// Owner of the double buffer, the fallback image, the active-slot selector
/// and the idle counter.
#[derive(Debug)]
pub struct BufferStore {
    slots: [FrameBuffer; 2],
    fallback: FrameBuffer,
    active: Slot,
    idle_ticks: u32,
}

impl BufferStore {
    /// Creates a store with two empty slots of `capacity` bytes each.
    ///
    /// The idle counter starts at `idle_threshold` (saturated), so the
    /// fallback image is served until the first frame is committed.  Slot A
    /// starts active, which makes slot B the first staging slot.
    pub fn new(capacity: usize, fallback: FrameBuffer, idle_threshold: u32) -> Self {
        Self {
            slots: [
                FrameBuffer::with_capacity(capacity),
                FrameBuffer::with_capacity(capacity),
            ],
            fallback,
            active: Slot::A,
            idle_ticks: idle_threshold,
        }
    }

    /// The slot currently served to viewers.
    pub fn active_slot(&self) -> Slot {
        self.active
    }

    /// The slot currently written by the reassembler.
    pub fn staging_slot(&self) -> Slot {
        self.active.other()
    }

    /// The most recently committed frame.
    pub fn active(&self) -> &FrameBuffer {
        &self.slots[self.active.index()]
    }

    /// Read-only view of the frame under construction.
    pub fn staging(&self) -> &FrameBuffer {
        &self.slots[self.staging_slot().index()]
    }

    /// Write access to the frame under construction.
    ///
    /// This is the only mutable accessor: the active slot cannot be written.
    pub fn staging_mut(&mut self) -> &mut FrameBuffer {
        let index = self.staging_slot().index();
        &mut self.slots[index]
    }

    /// The placeholder image.
    pub fn fallback(&self) -> &FrameBuffer {
        &self.fallback
    }

    /// Resolves a tick's selection to the buffer it names.
    pub fn frame(&self, source: FrameSource) -> &FrameBuffer {
        match source {
            FrameSource::Live(slot) => &self.slots[slot.index()],
            FrameSource::Fallback => &self.fallback,
        }
    }

    /// Ticks elapsed since the last commit (saturating at the threshold the
    /// distributor uses).
    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    /// Publishes the staging slot: flips the selector and resets the idle
    /// counter.  The new staging slot (the old active frame) is cleared so a
    /// stray chunk can never be appended to stale bytes.
    pub fn swap(&mut self) {
        self.active = self.active.other();
        self.idle_ticks = 0;
        self.staging_mut().clear();
    }

    /// Advances the idle counter by one tick, stopping at `threshold`.
    pub(crate) fn record_idle_tick(&mut self, threshold: u32) {
        if self.idle_ticks < threshold {
            self.idle_ticks += 1;
        }
    }

    /// Captures the selector, counter and fill levels.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            active: self.active,
            idle_ticks: self.idle_ticks,
            active_len: self.active().len(),
            staging_len: self.staging().len(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
