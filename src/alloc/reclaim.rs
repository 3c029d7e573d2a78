//! Overlap reclamation.
//!
//! Before any region of the buffer is (re)written — by reception, by
//! the landing-zone pre-clear after a finished frame, or by transmit
//! staging — every task still pointing into that region must be
//! evicted, oldest first, so no consumer is ever handed bytes that have
//! since been overwritten.
//!
//! Because the task stacks are FIFOs populated in address-monotonic
//! order (modulo the wrap logic, which clears as it goes), checking the
//! head of each stack suffices: if the oldest entry is outside the
//! window, every newer one is too.

use log::warn;

use super::MsgAlloc;
use crate::error::{Error, Result};

/// Window membership, inclusive of both ends — the claimed region's
/// `to` is the first byte after the write, but a task starting exactly
/// there still loses its preceding bytes.
fn in_window(offset: usize, from: usize, to: usize) -> bool {
    offset >= from && offset <= to
}

impl<const BUF: usize, const TASKS: usize> MsgAlloc<BUF, TASKS> {
    /// Evict every task whose frame lies inside `[from, to]`, counting
    /// each as a drop.
    ///
    /// Fails only when `to` runs past the buffer; the caller is
    /// responsible for wrapping first and the failure is never surfaced
    /// to library users.
    pub(crate) fn clear_msg_space(&mut self, from: usize, to: usize) -> Result<()> {
        if to > BUF {
            return Err(Error::WontFit);
        }

        if let Some(used) = self.used_msg {
            if in_window(used, from, to) {
                self.used_msg = None;
                self.stats.count_drop();
                warn!("frame in use at offset {} reclaimed", used);
            }
        }

        while let Some(task) = self.endpoint_tasks.first().copied() {
            if !in_window(task.slot, from, to) {
                break;
            }
            self.endpoint_tasks.remove_at(0);
            self.stats.count_drop();
            warn!("delivery task for frame at offset {} reclaimed", task.slot);
        }

        while let Some(offset) = self.rx_tasks.first().copied() {
            if !in_window(offset, from, to) {
                break;
            }
            self.rx_tasks.remove_at(0);
            self.stats.count_drop();
            warn!("unread frame at offset {} reclaimed", offset);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tasks::EndpointTask;
    use super::*;
    use crate::msg::EndpointId;

    type SmallAlloc = MsgAlloc<64, 4>;

    #[test]
    fn window_past_buffer_end_fails() {
        let mut alloc = SmallAlloc::new();
        assert_eq!(alloc.clear_msg_space(0, 65), Err(Error::WontFit));
        assert!(alloc.clear_msg_space(0, 64).is_ok());
    }

    #[test]
    fn used_msg_inside_window_is_nulled_and_counted() {
        let mut alloc = SmallAlloc::new();
        alloc.used_msg = Some(20);
        alloc.clear_msg_space(10, 30).unwrap();
        assert!(alloc.used_msg.is_none());
        assert_eq!(alloc.stats().dropped_msgs, 1);
    }

    #[test]
    fn used_msg_outside_window_survives() {
        let mut alloc = SmallAlloc::new();
        alloc.used_msg = Some(40);
        alloc.clear_msg_space(10, 30).unwrap();
        assert_eq!(alloc.used_msg, Some(40));
        assert_eq!(alloc.stats().dropped_msgs, 0);
    }

    #[test]
    fn only_head_tasks_inside_the_window_are_evicted() {
        let mut alloc = SmallAlloc::new();
        alloc.rx_tasks.push_evict(8);
        alloc.rx_tasks.push_evict(20);
        alloc.rx_tasks.push_evict(40);

        alloc.clear_msg_space(0, 25).unwrap();
        assert_eq!(alloc.rx_pending_count(), 1);
        assert_eq!(alloc.rx_tasks.first(), Some(&40));
        assert_eq!(alloc.stats().dropped_msgs, 2);
    }

    #[test]
    fn endpoint_tasks_are_swept_before_rx_tasks() {
        let mut alloc = SmallAlloc::new();
        alloc.rx_tasks.push_evict(4);
        alloc.endpoint_tasks.push_evict(EndpointTask {
            slot: 4,
            endpoint: EndpointId(1),
        });
        alloc.endpoint_tasks.push_evict(EndpointTask {
            slot: 4,
            endpoint: EndpointId(2),
        });

        alloc.clear_msg_space(0, 16).unwrap();
        assert_eq!(alloc.endpoint_task_count(), 0);
        assert_eq!(alloc.rx_pending_count(), 0);
        assert_eq!(alloc.stats().dropped_msgs, 3);
    }

    #[test]
    fn window_ends_are_inclusive() {
        let mut alloc = SmallAlloc::new();
        alloc.rx_tasks.push_evict(10);
        alloc.clear_msg_space(10, 10).unwrap();
        assert_eq!(alloc.rx_pending_count(), 0);
    }
}
