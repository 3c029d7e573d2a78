//! Compile-time sizing of the allocator.
//!
//! Every constant here feeds an array length, so they are `const` rather
//! than runtime configuration. Firmware that needs different sizing
//! instantiates [`MsgAlloc`](crate::alloc::MsgAlloc) with explicit
//! const-generic parameters instead of the defaults below.

use crate::msg::{CRC_SIZE, Header};

/// Byte capacity of the message buffer.
///
/// Sized for a handful of maximum-length frames plus headroom for the
/// cursor to advance without immediately reclaiming pending work.
pub const MSG_BUFFER_SIZE: usize = 2048;

/// Capacity of each task stack (reception, delivery, transmit).
pub const MAX_MSG_NB: usize = 16;

/// Upper clamp on the payload bytes of a single frame.
pub const MAX_DATA_MSG_SIZE: usize = 128;

/// Largest complete wire frame: header + payload + CRC.
pub const MAX_FRAME_SIZE: usize = Header::SIZE + MAX_DATA_MSG_SIZE + CRC_SIZE;
