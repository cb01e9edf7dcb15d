#![no_main]

use libfuzzer_sys::fuzz_target;
use screenlign::models::Event;

fuzz_target!(|data: &[u8]| {
    // Adapter input lines are arbitrary bytes from disk; parsing must not
    // panic regardless of input.
    if let Ok(line) = std::str::from_utf8(data) {
        if let Ok(event) = serde_json::from_str::<Event>(line) {
            // Round-trip anything that parsed
            let _ = serde_json::to_string(&event);
        }
    }
});
