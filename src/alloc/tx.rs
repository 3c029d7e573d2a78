//! Transmit staging.
//!
//! Outbound frames share the buffer with ongoing reception, so staging
//! one is a negotiation with the reception cursor: the in-flight frame
//! is relocated around the staged bytes under a masked pointer shuffle,
//! then reception resumes into its new home while the frame body is
//! copied in. The first bytes land before the task is published so a
//! wire driver polling [`tx_task`](MsgAlloc::tx_task) can start
//! transmitting immediately.

use log::{debug, warn};

use super::MsgAlloc;
use crate::error::{Error, Result};
use crate::msg::Header;

/// One staged transmission: a byte region inside the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxTask {
    pub(crate) offset: usize,
    pub(crate) size: usize,
}

impl TxTask {
    /// Buffer-relative offset of the staged bytes.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of staged bytes.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Bytes of the staged frame handed to the wire driver before the task
/// is published.
const TX_EARLY_COPY: usize = 3;

impl<const BUF: usize, const TASKS: usize> MsgAlloc<BUF, TASKS> {
    /// Stage `frame` for transmission.
    ///
    /// Fails only when the frame can never coexist with the in-flight
    /// reception, regardless of reclamation. Runs in main context; the
    /// pointer shuffle that relocates the reception cursor is masked,
    /// the copies are not.
    pub fn stage_tx(&mut self, frame: &[u8]) -> Result<()> {
        let size = frame.len();
        if size == 0 || size > BUF {
            return Err(Error::WontFit);
        }

        // Relocate the in-flight reception around the staged frame.
        // Nothing may interleave between the snapshot and the cursor
        // rewrite, or the ISR would keep appending at the old location.
        let (tx_msg, rx_backup, progression) = critical_section::with(|_| {
            // A header relocation still pending from the ISR must land
            // before the buffer start is claimed for the staged frame.
            if let Some(src) = self.copy_task.take() {
                self.buffer.copy_within(src..src + Header::SIZE, 0);
            }
            let rx_backup = self.current_msg;
            let progression = self.data_ptr - self.current_msg;
            let estimated = self.data_end_estimation - self.current_msg;

            let tx_msg;
            if self.current_msg + size > BUF {
                // The staged frame does not fit before the buffer end:
                // it goes to offset 0 and reception moves in behind it.
                if size + estimated > BUF {
                    return Err(Error::WontFit);
                }
                debug!(
                    "tx frame of {} bytes wraps to buffer start, reception moves to {}",
                    size, size
                );
                tx_msg = 0;
                self.current_msg = size;
                self.clear_msg_space(tx_msg, self.current_msg + estimated)?;
            } else {
                tx_msg = self.current_msg;
                if tx_msg + size + estimated > BUF {
                    // Room for the staged frame but not for the frame
                    // being received behind it: reception wraps home.
                    if tx_msg < estimated {
                        // The landing zone at the buffer start would run
                        // into the staged bytes; with the space after the
                        // frame already exhausted, no placement is left.
                        return Err(Error::WontFit);
                    }
                    debug!("reception wraps to buffer start behind tx frame at {}", tx_msg);
                    self.clear_msg_space(tx_msg, tx_msg + size)?;
                    self.clear_msg_space(0, estimated)?;
                    self.current_msg = 0;
                } else {
                    // Both fit: reception just shifts right.
                    self.clear_msg_space(tx_msg, tx_msg + size + estimated)?;
                    self.current_msg = tx_msg + size;
                }
            }
            self.data_ptr = self.current_msg + progression;
            self.data_end_estimation = self.current_msg + estimated;
            Ok((tx_msg, rx_backup, progression))
        })?;
        self.debug_check_cursor();

        // Reception is live again at the new location; bring the bytes
        // already received over from the old one.
        self.buffer
            .copy_within(rx_backup..rx_backup + progression, self.current_msg);

        // First bytes land early for a polling driver.
        let head = size.min(TX_EARLY_COPY);
        self.buffer[tx_msg..tx_msg + head].copy_from_slice(&frame[..head]);

        let evicted = critical_section::with(|_| {
            self.tx_tasks.push_evict(TxTask {
                offset: tx_msg,
                size,
            })
        });
        if evicted {
            self.stats.count_drop();
            warn!("tx stack full, oldest staged frame dropped");
        }
        self.stats.update_tx_watermark(self.tx_tasks.len(), TASKS);

        self.buffer[tx_msg + head..tx_msg + size].copy_from_slice(&frame[head..]);
        Ok(())
    }

    /// Oldest staged transmission, without removing it.
    pub fn tx_task(&self) -> Result<TxTask> {
        self.tx_tasks.first().copied().ok_or(Error::NoTask)
    }

    /// Bytes of a staged transmission.
    pub fn tx_bytes(&self, task: TxTask) -> &[u8] {
        &self.buffer[task.offset..task.offset + task.size]
    }

    /// Dequeue the oldest staged transmission — called by the wire
    /// driver when it has finished sending it.
    pub fn pop_tx_task(&mut self) -> Result<()> {
        if self.tx_tasks.is_empty() {
            return Err(Error::NoTask);
        }
        self.tx_tasks.remove_at(0);
        Ok(())
    }

    /// True when every staged transmission has been sent.
    pub fn tx_idle(&self) -> bool {
        self.tx_tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::{CRC_SIZE, Header};

    type SmallAlloc = MsgAlloc<64, 4>;

    fn wire(cmd: u8, payload: &[u8]) -> heapless::Vec<u8, { crate::config::MAX_FRAME_SIZE }> {
        Header {
            cmd,
            ..Default::default()
        }
        .frame(payload)
        .unwrap()
    }

    #[test]
    fn staged_frame_is_peekable_and_poppable() {
        let mut alloc = SmallAlloc::new();
        let frame = wire(1, &[1, 2, 3, 4]);
        alloc.stage_tx(&frame).unwrap();

        let task = alloc.tx_task().unwrap();
        assert_eq!(task.size(), frame.len());
        assert_eq!(alloc.tx_bytes(task), &frame[..]);
        assert!(!alloc.tx_idle());

        alloc.pop_tx_task().unwrap();
        assert!(alloc.tx_idle());
        assert_eq!(alloc.tx_task(), Err(Error::NoTask));
        assert_eq!(alloc.pop_tx_task(), Err(Error::NoTask));
    }

    #[test]
    fn staging_shifts_reception_right() {
        let mut alloc = SmallAlloc::new();
        // Begin receiving: header written, payload of 6 declared.
        for b in [0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7] {
            alloc.write_byte(b);
        }
        alloc.header_received(true, 6);
        let progression = alloc.rx_progression();

        let frame = wire(2, &[7, 7]);
        alloc.stage_tx(&frame).unwrap();

        // The staged frame sits where reception used to be; the
        // in-flight bytes moved with the cursor.
        assert_eq!(alloc.tx_task().unwrap().offset(), 0);
        assert_eq!(alloc.current_msg(), frame.len());
        assert_eq!(alloc.rx_progression(), progression);
        assert_eq!(
            &alloc.buffer[alloc.current_msg..alloc.current_msg + progression],
            &[0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7]
        );
    }

    #[test]
    fn tx_frame_wraps_to_start_when_it_does_not_fit() {
        let mut alloc = SmallAlloc::new();
        alloc.current_msg = 52;
        alloc.data_ptr = 52;
        alloc.data_end_estimation = 62;

        let frame = wire(3, &[1, 2, 3, 4, 5, 6, 7, 8]); // 18 bytes
        alloc.stage_tx(&frame).unwrap();

        assert_eq!(alloc.tx_task().unwrap().offset(), 0);
        assert_eq!(alloc.current_msg(), frame.len());
        assert_eq!(alloc.tx_bytes(alloc.tx_task().unwrap()), &frame[..]);
    }

    #[test]
    fn reception_wraps_home_when_only_the_tx_frame_fits() {
        let mut alloc = SmallAlloc::new();
        alloc.current_msg = 40;
        alloc.data_ptr = 40;
        // A maximal reception estimate: 8 + 12 + 2 = 22 bytes.
        alloc.data_end_estimation = 62;

        let frame = wire(4, &[0; 10]); // 20 bytes: fits at 40, rx would not
        alloc.stage_tx(&frame).unwrap();

        assert_eq!(alloc.tx_task().unwrap().offset(), 40);
        assert_eq!(alloc.current_msg(), 0);
        assert_eq!(alloc.tx_bytes(alloc.tx_task().unwrap()), &frame[..]);
    }

    #[test]
    fn tight_fit_with_no_room_before_the_tx_frame_is_rejected() {
        let mut alloc = SmallAlloc::new();
        // current_msg = 0 with a 10-byte estimated tail: a 58-byte frame
        // leaves no gap after itself, and the wrap-home landing zone
        // would overlap the staged bytes at the start.
        let frame = wire(5, &[0; 48]); // 58 bytes
        assert_eq!(alloc.stage_tx(&frame), Err(Error::WontFit));
        assert!(alloc.tx_idle());
        assert_eq!(alloc.current_msg(), 0);
        assert_eq!(alloc.rx_progression(), 0);
        assert_eq!(alloc.stats().dropped_msgs, 0);
    }

    #[test]
    fn staged_bytes_survive_a_relocated_reception_from_buffer_start() {
        let mut alloc = SmallAlloc::new();
        // 54 bytes from a fresh allocator: reception shifts to offset 54
        // and writes right up against the staged frame.
        let frame = wire(6, &[0x42; 44]);
        alloc.stage_tx(&frame).unwrap();
        assert_eq!(alloc.tx_task().unwrap().offset(), 0);
        assert_eq!(alloc.current_msg(), 54);

        let rx = Header {
            cmd: 0x43,
            ..Default::default()
        };
        for b in rx.to_bytes() {
            alloc.write_byte(b);
        }
        alloc.header_received(true, 0);
        alloc.write_byte(0x11);
        alloc.write_byte(0x99);
        alloc.msg_complete();

        let slot = alloc.pull_rx_task().unwrap();
        assert_eq!(slot.offset(), 54);
        assert_eq!(alloc.msg(slot).header().cmd, 0x43);
        assert_eq!(alloc.tx_bytes(alloc.tx_task().unwrap()), &frame[..]);
    }

    #[test]
    fn impossible_frames_are_rejected() {
        let mut alloc = SmallAlloc::new();
        assert_eq!(alloc.stage_tx(&[]), Err(Error::WontFit));
        assert_eq!(alloc.stage_tx(&[0u8; 65]), Err(Error::WontFit));
    }

    #[test]
    fn overflowing_the_tx_stack_drops_the_oldest() {
        let mut alloc = MsgAlloc::<256, 2>::new();
        let f1 = wire(1, &[1]);
        let f2 = wire(2, &[2]);
        let f3 = wire(3, &[3]);
        alloc.stage_tx(&f1).unwrap();
        alloc.stage_tx(&f2).unwrap();
        alloc.stage_tx(&f3).unwrap();

        assert_eq!(alloc.tx_pending_count(), 2);
        assert_eq!(alloc.stats().dropped_msgs, 1);
        assert_eq!(alloc.header_at(alloc.tx_task().unwrap().offset()).cmd, 2);
        assert_eq!(alloc.stats().tx_stack_ratio, 100);
    }

    #[test]
    fn staging_completes_an_in_flight_reception_intact() {
        let mut alloc = SmallAlloc::new();
        let rx = wire(9, &[0x51, 0x52, 0x53]);

        // Receive header plus one payload byte, then stage a frame.
        for &b in &rx[..Header::SIZE] {
            alloc.write_byte(b);
        }
        alloc.header_received(true, 3);
        alloc.write_byte(rx[Header::SIZE]);

        let tx = wire(1, &[0xEE]);
        alloc.stage_tx(&tx).unwrap();

        // Finish the reception at its new location.
        for &b in &rx[Header::SIZE + 1..] {
            alloc.write_byte(b);
        }
        alloc.msg_complete();

        let slot = alloc.pull_rx_task().unwrap();
        assert_eq!(alloc.msg(slot).bytes(), &rx[..rx.len() - CRC_SIZE]);
        assert_eq!(alloc.tx_bytes(alloc.tx_task().unwrap()), &tx[..]);
    }
}
