// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use libfuzzer_sys::fuzz_target;
use sortwise::classifier::parse_reply;

fuzz_target!(|data: &[u8]| {
    let Ok(reply) = std::str::from_utf8(data) else {
        return;
    };

    // Whatever the oracle says, each component must stay a single safe segment
    if let Ok(c) = parse_reply(reply) {
        for part in [&c.folder, &c.subfolder] {
            assert!(!part.is_empty());
            assert!(!part.contains('/') && !part.contains('\\'));
            assert!(part != "." && part != "..");
        }
    }
});
