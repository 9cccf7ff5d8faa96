#![no_main]

use libfuzzer_sys::fuzz_target;
use switchbox::frame;

// Feeds arbitrary bytes straight into the frame codec's decode/continue_decode
// pair, split at an arbitrary point, to catch panics or cursor-advancement
// bugs on malformed or truncated WebSocket frames -- exactly the class of
// bug the partial-decode cursor arithmetic in `frame.rs` has to get right.
fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let split_at = (data[0] as usize) % (data.len() + 1);
    let (first, second) = data.split_at(split_at);

    let mut index = 0;
    let (frame, code) = frame::decode(first, &mut index);
    assert!(index <= first.len());

    if let (Some(mut partial), code) = (frame, code) {
        if code != frame::ParseCode::Complete && code != frame::ParseCode::Error {
            let mut second_index = 0;
            let _ = frame::continue_decode(second, &mut second_index, code, &mut partial);
            assert!(second_index <= second.len());
        }
    }
});
