//! Single-buffer message allocator.
//!
//! Every inbound byte from the wire lands here, every outbound frame is
//! staged here, and every consumer observes the world through the task
//! stacks this module maintains.
//!
//! ```text
//! ┌─────────────┐ write_byte ┌─────────────────────────────────────┐
//! │ Wire ISR    │───────────▶│            message buffer           │
//! │ (producer)  │ msg_complete│  [frame][frame][frame → …        ] │
//! └─────────────┘            └─────────────────────────────────────┘
//!                                │ offsets          ▲ stage_tx
//!                    ┌───────────┼───────────┐      │
//!                    ▼           ▼           ▼      │
//!               rx_tasks   endpoint_tasks  tx_tasks │
//!                    │           │           │      │
//!                    ▼           ▼           ▼      │
//!              interpreter   app loop    wire driver┘   (main loop)
//! ```
//!
//! ## Execution contexts
//!
//! Exactly two contexts touch the allocator, and the discipline is the
//! integrating firmware's to uphold:
//!
//! - **ISR context** (producer): [`write_byte`](MsgAlloc::write_byte),
//!   [`header_received`](MsgAlloc::header_received),
//!   [`msg_complete`](MsgAlloc::msg_complete),
//!   [`msg_invalid`](MsgAlloc::msg_invalid). May preempt the main loop
//!   between any two instructions outside a critical section.
//! - **Main context** (consumers): every pull/peek/stage operation plus
//!   [`tick`](MsgAlloc::tick). Single-threaded, cooperative.
//!
//! The only synchronisation is the brief interrupt masking provided by
//! the `critical-section` crate; there are no locks, no atomics wider
//! than the masked regions, and no async suspension anywhere.
//!
//! Frame storage is reclaimed implicitly: when new traffic needs space
//! still referenced by a pending task, the oldest work is dropped and
//! counted in [`MemoryStats::dropped_msgs`].

mod reclaim;
mod rx;
mod stack;
mod tasks;
mod tx;

pub use tasks::EndpointTask;
pub use tx::TxTask;

use crate::config::{MAX_MSG_NB, MSG_BUFFER_SIZE};
use crate::msg::{CRC_SIZE, Header, Msg};
use crate::stats::MemoryStats;
use stack::TaskStack;

/// Handle to a complete frame inside the allocator's buffer.
///
/// A slot stays valid until the space is reclaimed by newer traffic;
/// a consumer holding one across loop iterations must expect the frame
/// it resolves to be dropped underneath it (see
/// [`MsgAlloc::release_used_msg`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgSlot(pub(crate) usize);

impl MsgSlot {
    /// Buffer-relative byte offset of the frame.
    pub fn offset(self) -> usize {
        self.0
    }
}

/// The message allocator.
///
/// `BUF` is the byte capacity of the message buffer, `TASKS` the
/// capacity of each task stack; both default to the crate-level
/// configuration.
pub struct MsgAlloc<const BUF: usize = MSG_BUFFER_SIZE, const TASKS: usize = MAX_MSG_NB> {
    /// Backing storage for every in-flight and pending frame.
    buffer: [u8; BUF],

    // Reception cursor. All three are buffer-relative offsets with
    // current_msg <= data_ptr <= data_end_estimation <= BUF.
    /// Start of the frame currently being received (or the next one).
    current_msg: usize,
    /// Next byte to write.
    data_ptr: usize,
    /// One past the last byte the current frame is expected to occupy.
    data_end_estimation: usize,

    /// Deferred header relocation: source offset of header bytes that
    /// the main loop must copy to the buffer start.
    copy_task: Option<usize>,

    /// Complete frames awaiting interpretation, in arrival order.
    rx_tasks: TaskStack<usize, TASKS>,
    /// Frames routed to endpoints, awaiting delivery.
    endpoint_tasks: TaskStack<EndpointTask, TASKS>,
    /// Frames staged for transmission.
    tx_tasks: TaskStack<TxTask, TASKS>,

    /// Frame a consumer is currently reading; nulled (and counted as a
    /// drop) when reception is about to overwrite it.
    used_msg: Option<usize>,

    stats: MemoryStats,
}

impl<const BUF: usize, const TASKS: usize> Default for MsgAlloc<BUF, TASKS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const BUF: usize, const TASKS: usize> MsgAlloc<BUF, TASKS> {
    /// Create an empty allocator.
    pub fn new() -> Self {
        debug_assert!(BUF >= Header::SIZE + CRC_SIZE);
        debug_assert!(TASKS > 0);
        Self {
            buffer: [0; BUF],
            current_msg: 0,
            data_ptr: 0,
            data_end_estimation: Header::SIZE + CRC_SIZE,
            copy_task: None,
            rx_tasks: TaskStack::new(),
            endpoint_tasks: TaskStack::new(),
            tx_tasks: TaskStack::new(),
            used_msg: None,
            stats: MemoryStats::default(),
        }
    }

    /// Drop all pending work and statistics; cursors return to the
    /// buffer start.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Main-loop housekeeping. Call once per loop iteration.
    ///
    /// Updates the reception-stack watermark, then performs the header
    /// relocation deferred by the ISR, if one is armed: the header bytes
    /// of a frame that would have run past the buffer end are copied to
    /// offset 0, where the rest of the frame is already arriving.
    pub fn tick(&mut self) {
        self.stats.update_rx_watermark(self.rx_tasks.len(), TASKS);
        if let Some(src) = self.copy_task.take() {
            self.buffer.copy_within(src..src + Header::SIZE, 0);
            log::debug!("relocated header from offset {} to buffer start", src);
        }
    }

    // ── Observability ─────────────────────────────────────────────

    /// True when nothing is buffered at all: no byte of a frame under
    /// reception and no pending task in any stack.
    pub fn is_empty(&self) -> bool {
        self.data_ptr == self.current_msg
            && self.rx_tasks.is_empty()
            && self.endpoint_tasks.is_empty()
            && self.tx_tasks.is_empty()
    }

    /// Offset of the frame currently being received.
    pub fn current_msg(&self) -> usize {
        self.current_msg
    }

    /// Bytes of the current frame received so far.
    pub fn rx_progression(&self) -> usize {
        self.data_ptr - self.current_msg
    }

    /// True while a deferred header relocation is armed and the main
    /// loop has not yet performed it.
    pub fn header_copy_pending(&self) -> bool {
        self.copy_task.is_some()
    }

    /// True while a consumer holds a pulled frame that has not been
    /// released or invalidated.
    pub fn used_msg_active(&self) -> bool {
        self.used_msg.is_some()
    }

    /// Frames awaiting interpretation.
    pub fn rx_pending_count(&self) -> usize {
        self.rx_tasks.len()
    }

    /// Pending endpoint delivery tasks.
    pub fn endpoint_task_count(&self) -> usize {
        self.endpoint_tasks.len()
    }

    /// Frames staged for transmission.
    pub fn tx_pending_count(&self) -> usize {
        self.tx_tasks.len()
    }

    /// Memory-usage statistics since the last reset.
    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    /// Materialise the zero-copy view of a complete frame.
    pub fn msg(&self, slot: MsgSlot) -> Msg<'_> {
        let size = usize::from(self.header_at(slot.0).size);
        Msg::new(&self.buffer[slot.0..slot.0 + Header::SIZE + size])
    }

    // ── Internal ──────────────────────────────────────────────────

    /// Decode the header of the frame starting at `offset`.
    pub(crate) fn header_at(&self, offset: usize) -> Header {
        Header::parse(&self.buffer[offset..offset + Header::SIZE])
    }

    /// Cursor coherence, checked at the end of every producer-side
    /// mutation in debug builds.
    pub(crate) fn debug_check_cursor(&self) {
        debug_assert!(self.current_msg <= self.data_ptr);
        debug_assert!(self.data_ptr <= self.data_end_estimation);
        debug_assert!(self.data_end_estimation <= BUF);
    }
}
