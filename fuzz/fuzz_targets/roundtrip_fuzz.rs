#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdelta::compress::{EncoderOptions, decode_all, encode};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte picks the options, second the dictionary/target split.
    let flags = data[0];
    let payload = &data[2..];
    let split = if payload.is_empty() {
        0
    } else {
        data[1] as usize % (payload.len() + 1)
    };
    let (dictionary, target) = payload.split_at(split);

    let options = EncoderOptions {
        look_for_target_matches: flags & 1 != 0,
        interleaved: flags & 2 != 0,
        checksum: flags & 4 != 0,
        json: false,
        split_runs: flags & 8 != 0,
    };

    let delta = encode(dictionary, target, options).unwrap();
    let decoded = decode_all(dictionary, &delta).unwrap();
    assert_eq!(decoded, target);
});
