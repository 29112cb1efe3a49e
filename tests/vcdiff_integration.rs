// Wire-format tests: hand-assembled deltas, writer-driven deltas and the
// decoder's rejection of malformed input.

use vcdelta::vcdiff::code_table::{CodeTable, InstructionType};
use vcdelta::vcdiff::decoder::{
    DecodeError, DecoderOptions, StreamingDecoder, compute_adler32, decode_memory,
    decode_memory_with,
};
use vcdelta::vcdiff::header::FormatExtensions;
use vcdelta::vcdiff::reader::CodeTableReader;
use vcdelta::vcdiff::writer::{CodeTableWriter, VcdiffWriter};

const HEADER: [u8; 5] = [0xD6, 0xC3, 0xC4, 0x00, 0x00];

fn with_header(window: &[u8]) -> Vec<u8> {
    let mut out = HEADER.to_vec();
    out.extend_from_slice(window);
    out
}

/// COPY of the whole ten-byte dictionary.
fn copy_all_window() -> Vec<u8> {
    vec![
        0x01, // Win_Indicator: VCD_SOURCE
        0x0A, // source segment size
        0x00, // source segment position
        0x07, // delta encoding length
        0x0A, // target window length
        0x00, // Delta_Indicator
        0x00, // data length
        0x01, // instructions length
        0x01, // addresses length
        26,   // COPY size 10 mode 0
        0x00, // address 0
    ]
}

/// ADD "ab" then an overlapping COPY of 6 from target address 0.
fn self_copy_window() -> Vec<u8> {
    vec![
        0x00, 0x0A, 0x08, 0x00, 0x02, 0x02, 0x01, b'a', b'b', 3, 22, 0x00,
    ]
}

// ---------------------------------------------------------------------------
// Hand-assembled deltas
// ---------------------------------------------------------------------------

#[test]
fn copy_whole_dictionary() {
    let delta = with_header(&copy_all_window());
    assert_eq!(decode_memory(b"0123456789", &delta).unwrap(), b"0123456789");
}

#[test]
fn overlapping_target_copy_replicates() {
    let delta = with_header(&self_copy_window());
    assert_eq!(decode_memory(b"", &delta).unwrap(), b"abababab");
}

#[test]
fn windows_concatenate() {
    let mut delta = with_header(&copy_all_window());
    delta.extend_from_slice(&self_copy_window());
    delta.extend_from_slice(&copy_all_window());
    assert_eq!(
        decode_memory(b"0123456789", &delta).unwrap(),
        b"0123456789abababab0123456789"
    );
}

#[test]
fn copy_spanning_source_and_target() {
    // Dictionary "wxyz" is the source segment, so the target starts at
    // address 4. ADD "!" then COPY 6 from address 2 reads "yz!" and runs
    // on into its own output.
    let mut window = [
        0x01, 0x04, 0x00, 0x0A, 0x07, 0x00, 0x01, 0x03, 0x01, // header
        b'!', // data
        2,    // ADD 1
        19, 6, // COPY mode 0, size 6 as varint
        0x02, // address 2
    ];
    assert_eq!(decode_memory(b"wxyz", &with_header(&window)).unwrap(), b"!yz!yz!");

    // Declaring one byte more than the instructions produce.
    window[4] = 0x08;
    assert!(matches!(
        decode_memory(b"wxyz", &with_header(&window)),
        Err(DecodeError::InvalidInput(_))
    ));
}

#[test]
fn run_instruction() {
    let window = [
        0x00, 0x08, 0x05, 0x00, 0x01, 0x02, 0x00, // header
        b'z', // data
        0, 5, // RUN, size 5
    ];
    assert_eq!(decode_memory(b"", &with_header(&window)).unwrap(), b"zzzzz");
}

#[test]
fn every_split_point_decodes_incrementally() {
    let mut delta = with_header(&copy_all_window());
    delta.extend_from_slice(&self_copy_window());
    for split in 0..=delta.len() {
        let mut decoder = StreamingDecoder::new(b"0123456789", DecoderOptions::default());
        decoder.start();
        let mut out = Vec::new();
        decoder.decode_chunk(&delta[..split], &mut out).unwrap();
        decoder.decode_chunk(&delta[split..], &mut out).unwrap();
        decoder.finish().unwrap();
        assert_eq!(out, b"0123456789abababab", "split at {split}");
    }
}

// ---------------------------------------------------------------------------
// Malformed input
// ---------------------------------------------------------------------------

#[test]
fn reject_bad_magic() {
    assert!(matches!(
        decode_memory(b"", b"\xD6\xC3X\x00\x00"),
        Err(DecodeError::InvalidInput(_))
    ));
}

#[test]
fn reject_unknown_version() {
    assert!(matches!(
        decode_memory(b"", b"\xD6\xC3\xC4\x01\x00"),
        Err(DecodeError::Unsupported(_))
    ));
}

#[test]
fn reject_truncation_anywhere() {
    let delta = with_header(&copy_all_window());
    // A stream cut right after the file header is a valid empty delta.
    for cut in (1..delta.len()).filter(|&c| c != HEADER.len()) {
        assert!(
            decode_memory(b"0123456789", &delta[..cut]).is_err(),
            "truncated at {cut} decoded"
        );
    }
}

#[test]
fn reject_source_segment_past_dictionary() {
    let delta = with_header(&copy_all_window());
    let err = decode_memory(b"012345678", &delta).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidInput(_)), "{err}");

    let mut window = copy_all_window();
    window[1] = 0x05;
    window[2] = 0x06; // position 6 + length 5 > 10
    assert!(matches!(
        decode_memory(b"0123456789", &with_header(&window)),
        Err(DecodeError::InvalidInput(_))
    ));
}

#[test]
fn reject_source_and_target_bits_together() {
    let mut window = copy_all_window();
    window[0] = 0x03;
    assert!(matches!(
        decode_memory(b"0123456789", &with_header(&window)),
        Err(DecodeError::InvalidInput(_))
    ));
}

#[test]
fn reject_secondary_compression() {
    let mut window = copy_all_window();
    window[5] = 0x01;
    assert!(matches!(
        decode_memory(b"0123456789", &with_header(&window)),
        Err(DecodeError::Unsupported(_))
    ));
}

#[test]
fn reject_leftover_address_bytes() {
    let mut window = copy_all_window();
    window[3] = 0x08; // delta encoding length
    window[8] = 0x02; // addresses length
    window.push(0x00);
    assert!(matches!(
        decode_memory(b"0123456789", &with_header(&window)),
        Err(DecodeError::InvalidInput(_))
    ));
}

#[test]
fn reject_copy_past_current_position() {
    // COPY from address 5 while only 2 bytes of the target exist.
    let mut window = self_copy_window();
    *window.last_mut().unwrap() = 0x05;
    assert!(matches!(
        decode_memory(b"", &with_header(&window)),
        Err(DecodeError::InvalidInput(_))
    ));
}

#[test]
fn reject_interleaved_without_extended_header() {
    let mut w = VcdiffWriter::new(true);
    w.init(0).unwrap();
    let mut delta = Vec::new();
    w.write_header(&mut delta, FormatExtensions::INTERLEAVED).unwrap();
    w.add(b"interleaved payload").unwrap();
    w.output(&mut delta).unwrap();
    assert_eq!(delta[3], b'S');
    assert_eq!(decode_memory(b"", &delta).unwrap(), b"interleaved payload");

    delta[3] = 0x00;
    assert!(matches!(
        decode_memory(b"", &delta),
        Err(DecodeError::InvalidInput(_))
    ));
}

#[test]
fn window_limits() {
    let delta = with_header(&self_copy_window());
    let tight = DecoderOptions {
        max_target_window_size: 7,
        ..DecoderOptions::default()
    };
    assert!(matches!(
        decode_memory_with(b"", &delta, tight),
        Err(DecodeError::LimitExceeded { .. })
    ));
    let exact = DecoderOptions {
        max_target_window_size: 8,
        max_target_file_size: 8,
        ..DecoderOptions::default()
    };
    assert_eq!(decode_memory_with(b"", &delta, exact).unwrap(), b"abababab");
}

// ---------------------------------------------------------------------------
// Writer-driven deltas
// ---------------------------------------------------------------------------

fn write_delta(
    writer: &mut VcdiffWriter,
    dictionary: &[u8],
    extensions: FormatExtensions,
    emit: impl FnOnce(&mut VcdiffWriter),
) -> Vec<u8> {
    writer.init(dictionary.len()).unwrap();
    let mut delta = Vec::new();
    writer.write_header(&mut delta, extensions).unwrap();
    emit(writer);
    writer.output(&mut delta).unwrap();
    delta
}

#[test]
fn checksum_is_verified() {
    let dictionary = b"dictionary bytes";
    let target = b"dictionary bytes!";
    let mut w = VcdiffWriter::new(false);
    let mut delta = write_delta(&mut w, dictionary, FormatExtensions::CHECKSUM, |w| {
        w.add_checksum(compute_adler32(target));
        w.copy(0, 16).unwrap();
        w.add(b"!").unwrap();
    });
    assert_eq!(decode_memory(dictionary, &delta).unwrap(), target);

    // The window ends with the data byte, two opcodes and one address.
    let bang = delta.len() - 4;
    assert_eq!(delta[bang], b'!');
    delta[bang] = b'?';
    assert!(matches!(
        decode_memory(dictionary, &delta),
        Err(DecodeError::ChecksumMismatch { .. })
    ));
}

#[test]
fn custom_code_table_roundtrip() {
    // Swap two ADD opcodes so the table is no longer the default one.
    let mut table = CodeTable::default();
    table.size1.swap(2, 3);
    assert!(!table.is_default());

    let dictionary = b"the custom table dictionary, long enough to copy from";
    let mut w = VcdiffWriter::with_code_table(table, 4, 3, false);
    let delta = write_delta(&mut w, dictionary, FormatExtensions::empty(), |w| {
        w.add(b"X").unwrap();
        w.copy(4, 12).unwrap();
        w.add(b"YZ").unwrap();
        w.run(4, b'-').unwrap();
    });
    assert_eq!(delta[4] & 0x02, 0x02, "VCD_CODETABLE set");
    assert_eq!(
        decode_memory(dictionary, &delta).unwrap(),
        b"Xcustom tableYZ----"
    );
}

#[test]
fn reader_walks_writer_output() {
    let mut w = VcdiffWriter::new(true);
    let delta = write_delta(&mut w, b"", FormatExtensions::INTERLEAVED, |w| {
        w.add(b"abc").unwrap();
        w.run(20, b'x').unwrap();
    });
    // Interleaved, no source: header is indicator, delta length, target
    // length, Delta_Indicator, three lengths.
    let body = &delta[5 + 7..];
    let mut reader = CodeTableReader::new();
    let mut pos = 0;
    let first = reader.next_instruction(body, &mut pos).unwrap().unwrap();
    assert_eq!((first.inst, first.size), (InstructionType::Add, 3));
    pos += 3;
    let second = reader.next_instruction(body, &mut pos).unwrap().unwrap();
    assert_eq!((second.inst, second.size), (InstructionType::Run, 20));
    pos += 1;
    assert_eq!(reader.next_instruction(body, &mut pos).unwrap(), None);
}
