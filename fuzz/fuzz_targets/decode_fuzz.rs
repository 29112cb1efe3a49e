#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdelta::vcdiff::decoder::{self, DecoderOptions};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must only ever produce errors.
    let _ = decoder::decode_memory(&[], data);

    if data.len() >= 2 {
        let (dictionary, delta) = data.split_at(data.len() / 2);
        let _ = decoder::decode_memory(dictionary, delta);
    }

    // Skip the magic so the window parser sees the input.
    let mut prefixed = vec![0xD6, 0xC3, 0xC4, 0x00, 0x00];
    prefixed.extend_from_slice(data);
    let options = DecoderOptions {
        allow_vcd_target: true,
        max_target_window_size: 1 << 16,
        max_target_file_size: 1 << 20,
    };
    let _ = decoder::decode_memory_with(b"fuzz dictionary", &prefixed, options);
});
