//! Frame reassembly state machine.
//!
//! Chunks arrive one at a time, in whatever order the network delivers them.
//! The reassembler appends them into the staging slot of the [`BufferStore`]
//! and publishes the frame when its last chunk arrives, but only if every
//! chunk of that frame arrived exactly in order and fit in the buffer.
//!
//! # Transition rules
//!
//! For a chunk `(f, c, last, payload)`:
//!
//! 1. `f` differs from the tracked frame: the staging slot is emptied.  If
//!    `c == 0` tracking starts at `f`; otherwise the start of `f` was missed
//!    and nothing is tracked until the next chunk 0.
//! 2. `f` is tracked and `c` is the expected index: the payload is appended
//!    (unless the frame is already abandoned) and the expected index advances.
//!    Running out of buffer space abandons the frame.
//! 3. `f` is tracked but `c` is anything else: the frame is abandoned.  The
//!    expected index does not move.
//! 4. `last` is set, the staging slot holds bytes, and the frame is not
//!    abandoned: the double buffer is swapped.
//!
//! An abandoned frame is never published, even if a later chunk claims to be
//! the last one.  A published frame is therefore always the exact in-order
//! concatenation of its chunks.

use tracing::{debug, warn};

use crate::domain::buffers::BufferStore;
use crate::protocol::datagram::Chunk;

/// Tracking state for the frame under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReassemblyState {
    /// Frame being assembled, or `None` while waiting for a frame boundary.
    pub current_frame: Option<u16>,
    /// Index the next accepted chunk must carry.
    pub expected_chunk_index: u16,
    /// Set once any chunk of `current_frame` failed to append, either for
    /// lack of space or because it arrived out of sequence.
    pub overflowed: bool,
}

/// Why a frame was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// The frame does not fit in the buffer.
    Capacity,
    /// A chunk arrived with an unexpected index.
    OutOfSequence,
}

/// What happened to a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The payload was appended; the frame is still incomplete.
    Appended,
    /// The chunk completed its frame and the frame was published.
    Committed { frame_no: u16, len: usize },
    /// The chunk is the first seen of a frame whose start was missed.
    BoundaryMissed,
    /// The chunk abandoned its frame.
    Abandoned(AbandonReason),
    /// The chunk belongs to a skipped or already abandoned frame.
    Ignored,
}

/// Stateful chunk accumulator.  One instance lives for the whole process.
#[derive(Debug, Default)]
pub struct Reassembler {
    state: ReassemblyState,
    /// Frame whose boundary miss has already been logged.
    skipped_frame: Option<u16>,
}

impl Reassembler {
    /// Creates a reassembler that waits for the first frame boundary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tracking state.
    pub fn state(&self) -> ReassemblyState {
        self.state
    }

    /// Feeds one chunk through the state machine, writing into the staging
    /// slot of `store` and swapping the store when a frame completes.
    pub fn handle_chunk(&mut self, chunk: &Chunk<'_>, store: &mut BufferStore) -> ChunkOutcome {
        let frame_no = chunk.frame_no;
        let mut outcome = ChunkOutcome::Ignored;

        if self.state.current_frame != Some(frame_no) {
            store.staging_mut().clear();
            if chunk.chunk_index != 0 {
                self.state.current_frame = None;
                if self.skipped_frame != Some(frame_no) {
                    debug!(
                        "missed start of frame {frame_no} (first chunk seen: {}); skipping frame",
                        chunk.chunk_index
                    );
                    self.skipped_frame = Some(frame_no);
                    outcome = ChunkOutcome::BoundaryMissed;
                }
            } else {
                self.state = ReassemblyState {
                    current_frame: Some(frame_no),
                    expected_chunk_index: 0,
                    overflowed: false,
                };
                self.skipped_frame = None;
            }
        }

        if self.state.current_frame == Some(frame_no) {
            if chunk.chunk_index == self.state.expected_chunk_index {
                if !self.state.overflowed {
                    outcome = match store.staging_mut().try_append(chunk.payload) {
                        Ok(()) => ChunkOutcome::Appended,
                        Err(e) => {
                            warn!("frame {frame_no} dropped, staging buffer overflow: {e}");
                            self.state.overflowed = true;
                            ChunkOutcome::Abandoned(AbandonReason::Capacity)
                        }
                    };
                }
                self.state.expected_chunk_index += 1;
            } else if !self.state.overflowed {
                debug!(
                    "frame {frame_no} dropped: expected chunk {}, got {}",
                    self.state.expected_chunk_index, chunk.chunk_index
                );
                self.state.overflowed = true;
                outcome = ChunkOutcome::Abandoned(AbandonReason::OutOfSequence);
            }
        }

        if chunk.is_last && !store.staging().is_empty() && !self.state.overflowed {
            let len = store.staging().len();
            store.swap();
            debug!("frame {frame_no} committed ({len} bytes)");
            outcome = ChunkOutcome::Committed { frame_no, len };
        }

        outcome
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
