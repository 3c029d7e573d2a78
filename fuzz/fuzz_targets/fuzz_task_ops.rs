//! Fuzz target: task-stack operation interleavings.
//!
//! Decodes the fuzz input as a sequence of consumer and producer
//! operations — receptions, routing fan-outs, endpoint pulls, transmit
//! staging, clears — and checks the allocator's bounds and accounting
//! invariants after every step.
//!
//! cargo fuzz run fuzz_task_ops

#![no_main]

use libfuzzer_sys::fuzz_target;
use nanobus::{EndpointId, Header, MsgAlloc};

const TASKS: usize = 8;

fuzz_target!(|data: &[u8]| {
    let mut alloc = MsgAlloc::<256, TASKS>::new();
    let mut stream = data.iter().copied();
    let mut last_drops = 0u8;

    while let Some(op) = stream.next() {
        // Each operation runs in a fresh main-loop iteration.
        alloc.tick();
        let arg = stream.next().unwrap_or(0);

        match op % 9 {
            0 => {
                // Wire reception of one frame.
                let len = usize::from(arg) % 121;
                let header = Header {
                    cmd: op,
                    size: len as u16,
                    ..Default::default()
                };
                for b in header.to_bytes() {
                    alloc.write_byte(b);
                }
                alloc.header_received(true, len as u16);
                for i in 0..len + 2 {
                    alloc.write_byte(i as u8);
                }
                alloc.msg_complete();
            }
            1 => {
                // Reception abandoned partway.
                for i in 0..usize::from(arg) % Header::SIZE {
                    alloc.write_byte(i as u8);
                }
                alloc.msg_invalid();
            }
            2 => {
                // Interpretation: pull and fan out.
                if let Ok(slot) = alloc.pull_rx_task() {
                    let _ = alloc.msg(slot).payload();
                    for ep in 0..usize::from(arg) % 3 + 1 {
                        alloc.alloc_endpoint_task(EndpointId(ep as u16), slot);
                    }
                }
            }
            3 => {
                if let Ok(slot) = alloc.pull_endpoint_msg(EndpointId(u16::from(arg) % 4)) {
                    let _ = alloc.msg(slot).header();
                    if arg & 0x80 != 0 {
                        alloc.release_used_msg();
                    }
                }
            }
            4 => {
                if let Ok(slot) = alloc.pull_endpoint_task(usize::from(arg) % (TASKS + 1)) {
                    let _ = alloc.msg(slot).header();
                }
            }
            5 => {
                let idx = usize::from(arg) % (TASKS + 1);
                let _ = alloc.endpoint_task_cmd(idx);
                let _ = alloc.endpoint_task_source(idx);
                let _ = alloc.endpoint_task_size(idx);
            }
            6 => {
                if let Ok(task) = alloc.peek_endpoint_task(0) {
                    alloc.clear_endpoint_tasks_for(task.slot());
                }
            }
            7 => {
                let payload = [0x5Au8; 48];
                let frame = Header::default()
                    .frame(&payload[..usize::from(arg) % 49])
                    .unwrap();
                alloc.stage_tx(&frame).unwrap();
            }
            _ => {
                let _ = alloc.pop_tx_task();
            }
        }

        assert!(alloc.rx_pending_count() <= TASKS);
        assert!(alloc.endpoint_task_count() <= TASKS);
        assert!(alloc.tx_pending_count() <= TASKS);
        assert!(alloc.current_msg() < 256);
        assert!(
            alloc.stats().dropped_msgs >= last_drops,
            "drop counter regressed"
        );
        last_drops = alloc.stats().dropped_msgs;
    }
});
