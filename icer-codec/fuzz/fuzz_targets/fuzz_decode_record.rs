#![no_main]

use icer_codec::{Decoder, HandlerSession};
use icer_format::Limits;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let session = HandlerSession::empty();
    let limits = Limits {
        max_depth: 64,
        max_record_bytes: 1 << 20,
    };
    let _ = Decoder::new(&session).with_limits(limits).decode_str(text);
});
