//! Fuzz target for the shared store's snapshot decoder
//! ([`aqo_core::store::snapshot::load`]).
//!
//! The loader reads four framed binary files and makes allocations sized
//! from attacker-controlled length fields (record sizes, matrix `rows`,
//! `cols`, ring-buffer slot counts). A malformed file must never panic or
//! allocate unboundedly: every decode error is supposed to abandon just
//! that table and leave the rest of the store untouched (see
//! `store/snapshot.rs`'s module doc). This target writes the fuzz input as
//! each of the four snapshot files in turn and loads them into a fresh
//! [`aqo_core::store::Store`], so every decoder (`stat`, `qtext`, `data`,
//! `queries`) gets exercised against arbitrary bytes.

#![no_main]

use aqo_core::config::StoreConfig;
use aqo_core::store::Store;
use libfuzzer_sys::fuzz_target;

const SNAPSHOT_FILES: [&str; 4] = ["aqo_stat.bin", "aqo_qtext.bin", "aqo_data.bin", "aqo_queries.bin"];

fuzz_target!(|data: &[u8]| {
    let Ok(dir) = tempfile::tempdir() else {
        return;
    };

    // Exercise one table at a time: write the fuzz bytes as a single
    // snapshot file and leave its siblings absent (an absent file is
    // itself a case the loader must accept and start empty on).
    for file_name in SNAPSHOT_FILES {
        if std::fs::write(dir.path().join(file_name), data).is_err() {
            continue;
        }
        let store = Store::new(StoreConfig::default());
        // Must never panic, never hang, and never propagate a decode
        // error past this boundary.
        let _ = aqo_core::store::snapshot::load(&store, dir.path());
        let _ = std::fs::remove_file(dir.path().join(file_name));
    }
});
