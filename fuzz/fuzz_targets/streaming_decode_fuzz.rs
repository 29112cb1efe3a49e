#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdelta::compress::{EncoderOptions, encode};
use vcdelta::vcdiff::decoder::{DecoderOptions, StreamingDecoder};

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    // Feeding a valid delta in arbitrary chunk sizes must yield the target.
    let chunk = data[0] as usize + 1;
    let payload = &data[1..];
    let (dictionary, target) = payload.split_at(payload.len() / 3);
    let options = EncoderOptions {
        interleaved: data[0] & 1 != 0,
        checksum: data[0] & 2 != 0,
        ..EncoderOptions::default()
    };
    let delta = encode(dictionary, target, options).unwrap();

    let mut decoder = StreamingDecoder::new(dictionary, DecoderOptions::default());
    decoder.start();
    let mut out = Vec::new();
    for piece in delta.chunks(chunk) {
        decoder.decode_chunk(piece, &mut out).unwrap();
    }
    decoder.finish().unwrap();
    assert_eq!(out, target);
});
