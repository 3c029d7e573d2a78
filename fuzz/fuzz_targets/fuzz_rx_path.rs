//! Fuzz target: the wire-reception path.
//!
//! Interprets the fuzz input as a raw byte stream arriving from the
//! bus, runs a minimal framing validator over it (size clamp + verdict
//! bit), and drives the allocator's producer surface frame by frame.
//! Asserts that stack occupancy stays bounded and that every queued
//! frame can be pulled and read without a panic.
//!
//! cargo fuzz run fuzz_rx_path

#![no_main]

use libfuzzer_sys::fuzz_target;
use nanobus::{Header, MsgAlloc};

const TASKS: usize = 8;

fuzz_target!(|data: &[u8]| {
    let mut alloc = MsgAlloc::<256, TASKS>::new();
    let mut stream = data.iter().copied();

    loop {
        // Main loop runs between frames: housekeeping plus draining.
        alloc.tick();
        while let Ok(slot) = alloc.pull_rx_task() {
            let msg = alloc.msg(slot);
            assert!(msg.payload().len() <= 256, "payload exceeds the buffer");
        }

        // Receive one header off the wire.
        let mut header = [0u8; Header::SIZE];
        let mut complete = true;
        for slot in &mut header {
            match stream.next() {
                Some(b) => *slot = b,
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            break;
        }
        for b in header {
            alloc.write_byte(b);
        }

        // The framing validator clamps the declared size and judges the
        // header CRC; both come from the stream here.
        let declared = Header::parse(&header).size;
        let Some(verdict) = stream.next() else { break };
        let valid = verdict & 0x01 != 0 && declared <= 120;
        alloc.header_received(valid, declared);
        if !valid {
            continue;
        }

        // Payload and CRC bytes; the stream may run dry mid-frame.
        let mut starved = false;
        for _ in 0..usize::from(declared) + 2 {
            match stream.next() {
                Some(b) => alloc.write_byte(b),
                None => {
                    starved = true;
                    break;
                }
            }
        }
        if starved || verdict & 0x02 != 0 {
            alloc.msg_invalid();
        } else {
            alloc.msg_complete();
        }

        assert!(alloc.rx_pending_count() <= TASKS);
        assert!(alloc.current_msg() < 256);
    }
});
