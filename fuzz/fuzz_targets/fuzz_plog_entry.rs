// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Fuzz target for the PLog entry decoder.
// Run with: cargo +nightly fuzz run fuzz_plog_entry
//
// Segment files can be torn by a crash or damaged on disk, so the decoder
// must reject any byte string with an error instead of panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use seqengine_plog::entry::{decode, MAX_ENTRY_SIZE};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let entry_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if entry_length > MAX_ENTRY_SIZE {
        return;
    }
    let _ = decode(&data[4..], entry_length);
});
