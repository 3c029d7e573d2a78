//! Reception cursor — the producer surface, driven from ISR context.
//!
//! The framing collaborator feeds one byte at a time with
//! [`write_byte`](MsgAlloc::write_byte), reports the header CRC verdict
//! with [`header_received`](MsgAlloc::header_received), and finishes the
//! frame with [`msg_complete`](MsgAlloc::msg_complete) or abandons it
//! with [`msg_invalid`](MsgAlloc::msg_invalid). Everything here is
//! bounded work: no copy larger than a header, no loop that scales with
//! the buffer.

use log::{debug, trace, warn};

use super::MsgAlloc;
use crate::error::{Error, Result};
use crate::msg::{CRC_SIZE, Header};

impl<const BUF: usize, const TASKS: usize> MsgAlloc<BUF, TASKS> {
    /// Write one received byte at the reception cursor.
    ///
    /// No bounds check beyond the buffer itself: the cursor discipline
    /// of [`header_received`] and [`msg_complete`] guarantees the space
    /// was reserved.
    ///
    /// [`header_received`]: MsgAlloc::header_received
    /// [`msg_complete`]: MsgAlloc::msg_complete
    pub fn write_byte(&mut self, byte: u8) {
        self.buffer[self.data_ptr] = byte;
        self.data_ptr += 1;
    }

    /// Header CRC verdict from the framing collaborator, with the
    /// payload size the header declares.
    ///
    /// An invalid header is discarded in place and the slot reused. A
    /// valid one fixes the frame's end estimation; if the frame would
    /// run past the buffer end, reception restarts at offset 0 and the
    /// already-received header bytes are left for the main loop to
    /// relocate (the ISR cannot afford the copy).
    pub fn header_received(&mut self, ok: bool, payload_len: u16) {
        if !ok {
            self.data_ptr = self.current_msg;
            self.debug_check_cursor();
            return;
        }
        let frame_len = Header::SIZE + usize::from(payload_len) + CRC_SIZE;
        if frame_len > BUF {
            // The framing layer normally clamps the size field; a header
            // that can never fit is unreceivable.
            warn!("header declares {} payload bytes, frame can never fit", payload_len);
            self.data_ptr = self.current_msg;
            self.debug_check_cursor();
            return;
        }
        if self.current_msg + frame_len > BUF {
            debug_assert!(self.copy_task.is_none());
            debug!(
                "frame at {} would overrun the buffer, restarting at offset 0",
                self.current_msg
            );
            self.copy_task = Some(self.current_msg);
            self.current_msg = 0;
            self.data_ptr = Header::SIZE;
        }
        self.data_end_estimation = self.current_msg + frame_len;

        if let Some(used) = self.used_msg {
            if used >= self.current_msg && used <= self.data_end_estimation {
                // The consumer's view is about to be overwritten.
                self.used_msg = None;
                self.stats.count_drop();
                warn!("frame in use at offset {} invalidated by reception", used);
            }
        }
        self.debug_check_cursor();
    }

    /// Frame reception complete, CRC bytes included and already
    /// validated. Publishes the frame and advances the cursor to the
    /// next landing zone.
    pub fn msg_complete(&mut self) {
        debug_assert!(self.data_ptr >= self.current_msg + Header::SIZE + CRC_SIZE);

        // Reclaim whatever the finished frame landed on, then publish.
        let _ = self.clear_msg_space(self.current_msg, self.data_ptr);
        if self.rx_tasks.push_evict(self.current_msg) {
            self.stats.count_drop();
            warn!("reception stack full, oldest frame dropped");
        }
        trace!(
            "frame queued at offset {} ({} bytes)",
            self.current_msg,
            self.data_ptr - self.current_msg
        );

        // The CRC bytes are dead once the frame is validated; the next
        // frame reclaims them.
        self.data_ptr -= CRC_SIZE;
        if self.data_ptr + Header::SIZE + CRC_SIZE > BUF {
            // Not even a minimal frame fits before the end.
            self.data_ptr = 0;
        } else {
            if self.buffer[self.data_ptr] % 2 == 0 {
                // Historical alignment step: advances past an even byte
                // *value* at the cursor, not an even address.
                self.data_ptr += 1;
            }
            if self.data_ptr + Header::SIZE + CRC_SIZE > BUF {
                // The alignment step can eat the last spare byte.
                self.data_ptr = 0;
            }
        }
        self.current_msg = self.data_ptr;
        self.data_end_estimation = self.current_msg + Header::SIZE + CRC_SIZE;

        // Pre-clear the landing zone of the next header.
        let _ = self.clear_msg_space(self.current_msg, self.data_end_estimation);
        self.debug_check_cursor();
    }

    /// Abandon the frame currently being received; its bytes are
    /// discarded in place and the slot reused for the next frame.
    pub fn msg_invalid(&mut self) {
        let _ = self.clear_msg_space(self.current_msg, self.data_ptr);
        self.data_ptr = self.current_msg;
        self.data_end_estimation = self.current_msg + Header::SIZE + CRC_SIZE;
        if self.current_msg == 0 {
            // Restarting at the buffer start supersedes any pending
            // header relocation.
            self.copy_task = None;
        }
        self.debug_check_cursor();
    }

    /// Stage a locally-generated wire frame (header, payload, CRC) as
    /// if it had been received, bypassing the framing validator.
    ///
    /// Must not be called while a frame is mid-reception; the caller
    /// runs in producer context.
    pub fn stage_local(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() < Header::SIZE + CRC_SIZE {
            return Err(Error::MalformedFrame);
        }
        let header = Header::parse(frame);
        if frame.len() != Header::SIZE + usize::from(header.size) + CRC_SIZE {
            return Err(Error::MalformedFrame);
        }
        if frame.len() > BUF {
            return Err(Error::WontFit);
        }
        debug_assert!(self.data_ptr == self.current_msg);

        for &byte in &frame[..Header::SIZE] {
            self.write_byte(byte);
        }
        self.header_received(true, header.size);
        for &byte in &frame[Header::SIZE..] {
            self.write_byte(byte);
        }
        self.msg_complete();
        Ok(())
    }
}
