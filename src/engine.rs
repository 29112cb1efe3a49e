// Diff engine: greedy block matching of a target against a dictionary.
//
// The engine owns a copy of the dictionary and a fully populated block
// hash over it. `encode` scans one target window left to right, asking the
// dictionary hash (and optionally a hash over the window itself) for the
// longest match at each candidate position. Matches of at least
// MIN_MATCH_SIZE bytes become COPY instructions; everything else is
// emitted as ADD. Instructions go to a `CodeTableWriter`, which flushes
// the finished window into the output sink.
//
// `encode` takes `&self`, so one engine can serve many encoding sessions
// at once (share it through an `Arc`).

use thiserror::Error;

use crate::hash::{
    BLOCK_SIZE, BlockHash, BlockHashError, BlockRollingHash, MIN_MATCH_SIZE, Match, MatchLimits,
};
use crate::vcdiff::writer::{CodeTableWriter, OutputSink, WriterError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("dictionary of {0} bytes does not fit in the 31-bit address space")]
    DictionaryTooLarge(usize),
    #[error("dictionary plus target ({0} bytes) does not fit in the 31-bit address space")]
    TargetTooLarge(usize),
    #[error(transparent)]
    BlockHash(#[from] BlockHashError),
    #[error(transparent)]
    Writer(#[from] WriterError),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DiffEngine {
    dictionary: Vec<u8>,
    hashed_dictionary: BlockHash,
}

impl DiffEngine {
    /// Copy `dictionary` and index every block of it.
    pub fn new(dictionary: &[u8]) -> Result<Self, EngineError> {
        Self::with_match_limits(dictionary, MatchLimits::default())
    }

    pub fn with_match_limits(dictionary: &[u8], limits: MatchLimits) -> Result<Self, EngineError> {
        if i32::try_from(dictionary.len()).is_err() {
            log::error!("dictionary of {} bytes is too large", dictionary.len());
            return Err(EngineError::DictionaryTooLarge(dictionary.len()));
        }
        let dictionary = dictionary.to_vec();
        let mut hashed_dictionary = BlockHash::new(dictionary.len(), 0);
        hashed_dictionary.set_match_limits(limits);
        hashed_dictionary.init(&dictionary, true)?;
        log::debug!(
            "dictionary indexed: {} bytes, {} blocks",
            dictionary.len(),
            hashed_dictionary.number_of_blocks()
        );
        Ok(Self {
            dictionary,
            hashed_dictionary,
        })
    }

    pub fn dictionary(&self) -> &[u8] {
        &self.dictionary
    }

    pub fn dictionary_size(&self) -> usize {
        self.dictionary.len()
    }

    pub fn match_limits(&self) -> MatchLimits {
        self.hashed_dictionary.match_limits()
    }

    /// Encode `target` as one window through `writer` and flush it to `out`.
    ///
    /// With `look_for_target_matches`, COPY instructions may also refer to
    /// earlier bytes of the same target.
    pub fn encode(
        &self,
        target: &[u8],
        look_for_target_matches: bool,
        out: &mut dyn OutputSink,
        writer: &mut dyn CodeTableWriter,
    ) -> Result<(), EngineError> {
        let total = self.dictionary.len() + target.len();
        if i32::try_from(total).is_err() {
            log::error!("target window of {} bytes is too large", target.len());
            return Err(EngineError::TargetTooLarge(total));
        }
        if target.len() < BLOCK_SIZE {
            writer.add(target)?;
            writer.output(out)?;
            return Ok(());
        }

        let mut target_hash = if look_for_target_matches {
            let mut hash = BlockHash::new(target.len(), self.dictionary.len());
            hash.set_match_limits(self.match_limits());
            hash.init(target, false)?;
            Some(hash)
        } else {
            None
        };

        let start_of_last_block = target.len() - BLOCK_SIZE;
        let mut next_encode = 0;
        let mut candidate = 0;
        let mut hash_value = BlockRollingHash::hash(target);

        loop {
            let encoded = self.encode_copy_for_best_match(
                hash_value,
                target,
                candidate,
                next_encode,
                target_hash.as_ref(),
                writer,
            )?;
            if encoded > 0 {
                next_encode += encoded;
                candidate = next_encode;
                if candidate > start_of_last_block {
                    break;
                }
                // The candidate jumped, so the hash cannot be rolled.
                hash_value = BlockRollingHash::hash(&target[candidate..]);
                if let Some(hash) = target_hash.as_mut() {
                    hash.add_all_blocks_through_index(target, next_encode)?;
                }
            } else {
                if candidate + 1 > start_of_last_block {
                    break;
                }
                if let Some(hash) = target_hash.as_mut() {
                    hash.add_one_index_hash(candidate, hash_value)?;
                }
                hash_value = BlockRollingHash::update(
                    hash_value,
                    target[candidate],
                    target[candidate + BLOCK_SIZE],
                );
                candidate += 1;
            }
        }

        writer.add(&target[next_encode..])?;
        writer.output(out)?;
        Ok(())
    }

    /// Look up the best match at `candidate` and, if it is long enough,
    /// emit ADD for the unencoded bytes before it and COPY for the match.
    /// Returns the number of target bytes encoded, 0 if none.
    fn encode_copy_for_best_match(
        &self,
        hash_value: u32,
        target: &[u8],
        candidate: usize,
        next_encode: usize,
        target_hash: Option<&BlockHash>,
        writer: &mut dyn CodeTableWriter,
    ) -> Result<usize, EngineError> {
        let unencoded = &target[next_encode..];
        let candidate_offset = candidate - next_encode;
        let mut best_match = Match::new();
        self.hashed_dictionary.find_best_match(
            &self.dictionary,
            hash_value,
            unencoded,
            candidate_offset,
            &mut best_match,
        );
        if let Some(hash) = target_hash {
            hash.find_best_match(target, hash_value, unencoded, candidate_offset, &mut best_match);
        }
        if best_match.size() < MIN_MATCH_SIZE {
            return Ok(0);
        }

        let target_offset = best_match.target_offset();
        if target_offset > 0 {
            writer.add(&unencoded[..target_offset])?;
        }
        let address = i32::try_from(best_match.source_offset())
            .map_err(|_| EngineError::TargetTooLarge(best_match.source_offset()))?;
        writer.copy(address, best_match.size())?;
        Ok(target_offset + best_match.size())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcdiff::decoder::decode_memory;
    use crate::vcdiff::header::FormatExtensions;
    use crate::vcdiff::writer::{JsonWriter, VcdiffWriter};

    /// Records the instruction stream instead of packing it.
    #[derive(Debug, Default)]
    struct Recorder {
        ops: Vec<Op>,
        outputs: usize,
        target_length: usize,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Add(Vec<u8>),
        Copy(i32, usize),
        Run(usize, u8),
    }

    impl CodeTableWriter for Recorder {
        fn init(&mut self, _dictionary_size: usize) -> Result<(), WriterError> {
            Ok(())
        }
        fn write_header(
            &mut self,
            _out: &mut dyn OutputSink,
            _extensions: FormatExtensions,
        ) -> Result<(), WriterError> {
            Ok(())
        }
        fn add(&mut self, data: &[u8]) -> Result<(), WriterError> {
            if !data.is_empty() {
                self.ops.push(Op::Add(data.to_vec()));
                self.target_length += data.len();
            }
            Ok(())
        }
        fn copy(&mut self, offset: i32, size: usize) -> Result<(), WriterError> {
            self.ops.push(Op::Copy(offset, size));
            self.target_length += size;
            Ok(())
        }
        fn run(&mut self, size: usize, byte: u8) -> Result<(), WriterError> {
            self.ops.push(Op::Run(size, byte));
            self.target_length += size;
            Ok(())
        }
        fn add_checksum(&mut self, _checksum: u32) {}
        fn output(&mut self, _out: &mut dyn OutputSink) -> Result<(), WriterError> {
            self.outputs += 1;
            Ok(())
        }
        fn target_length(&self) -> usize {
            self.target_length
        }
    }

    fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
        let mut x = seed;
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                (x >> 24) as u8
            })
            .collect()
    }

    fn roundtrip(dictionary: &[u8], target: &[u8], target_matches: bool) -> Vec<u8> {
        let engine = DiffEngine::new(dictionary).unwrap();
        let mut writer = VcdiffWriter::new(false);
        writer.init(dictionary.len()).unwrap();
        let mut delta = Vec::new();
        writer
            .write_header(&mut delta, FormatExtensions::empty())
            .unwrap();
        engine
            .encode(target, target_matches, &mut delta, &mut writer)
            .unwrap();
        let decoded = decode_memory(dictionary, &delta).unwrap();
        assert_eq!(
            decoded,
            target,
            "roundtrip mismatch (dictionary={}, target={}, delta={})",
            dictionary.len(),
            target.len(),
            delta.len()
        );
        delta
    }

    fn record(dictionary: &[u8], target: &[u8], target_matches: bool) -> Recorder {
        let engine = DiffEngine::new(dictionary).unwrap();
        let mut recorder = Recorder::default();
        let mut out = Vec::new();
        engine
            .encode(target, target_matches, &mut out, &mut recorder)
            .unwrap();
        recorder
    }

    #[test]
    fn empty_target_flushes_nothing() {
        let rec = record(b"dictionary", b"", false);
        assert!(rec.ops.is_empty());
        assert_eq!(rec.outputs, 1);
    }

    #[test]
    fn short_target_is_one_add() {
        let rec = record(b"0123456789abcdef0123456789abcdef", b"0123456789", true);
        assert_eq!(rec.ops, vec![Op::Add(b"0123456789".to_vec())]);
        assert_eq!(rec.outputs, 1);
    }

    #[test]
    fn identical_target_is_one_copy() {
        let dictionary = pseudo_random(4096, 7);
        let rec = record(&dictionary, &dictionary, false);
        assert_eq!(rec.ops, vec![Op::Copy(0, 4096)]);
    }

    #[test]
    fn embedded_dictionary_substring() {
        let dictionary = pseudo_random(2000, 11);
        // Neighbours differ from the dictionary so the match cannot grow.
        let prefix: Vec<u8> = dictionary[483..500].iter().map(|b| !b).collect();
        let suffix: Vec<u8> = dictionary[900..912].iter().map(|b| !b).collect();
        let mut target = prefix.clone();
        target.extend_from_slice(&dictionary[500..900]);
        target.extend_from_slice(&suffix);
        let rec = record(&dictionary, &target, false);
        assert_eq!(
            rec.ops,
            vec![Op::Add(prefix), Op::Copy(500, 400), Op::Add(suffix)]
        );
        roundtrip(&dictionary, &target, false);
    }

    #[test]
    fn short_matches_are_not_copied() {
        let dictionary = pseudo_random(1000, 3);
        // 31 bytes shared with the dictionary, fenced by differing bytes.
        let mut target = pseudo_random(100, 99);
        target[99] = !dictionary[63];
        target.extend_from_slice(&dictionary[64..95]);
        target.push(!dictionary[95]);
        target.extend_from_slice(&pseudo_random(100, 98));
        let rec = record(&dictionary, &target, false);
        assert!(rec.ops.iter().all(|op| matches!(op, Op::Add(_))));
    }

    #[test]
    fn target_matches_find_repeats() {
        let block = pseudo_random(200, 5);
        let mut target = block.clone();
        target.extend_from_slice(&block);
        let without = record(b"", &target, false);
        assert_eq!(without.ops, vec![Op::Add(target.clone())]);

        let with = record(b"", &target, true);
        assert!(with.ops.iter().any(|op| matches!(op, Op::Copy(..))));
        roundtrip(b"", &target, true);
    }

    #[test]
    fn target_match_addresses_follow_dictionary() {
        let dictionary = pseudo_random(300, 21);
        let unique = pseudo_random(256, 22);
        let mut target = unique.clone();
        target.extend_from_slice(&unique);
        let rec = record(&dictionary, &target, true);
        let copy = rec
            .ops
            .iter()
            .find_map(|op| match op {
                Op::Copy(offset, size) => Some((*offset, *size)),
                _ => None,
            })
            .unwrap();
        assert!(copy.0 >= 300, "target copy must address past the dictionary");
        assert!(copy.1 >= MIN_MATCH_SIZE);
    }

    #[test]
    fn roundtrip_small_edit() {
        let source = b"Hello, world! This is a test of the delta engine. It has enough text to match.";
        let target = b"Hello, earth! This is a test of the delta engine. It has enough text to match.";
        roundtrip(source, target, false);
    }

    #[test]
    fn roundtrip_binary_data() {
        let source: Vec<u8> = (0..=255).cycle().take(4096).collect();
        let mut target = source.clone();
        target[100] = 0xFF;
        target[200] = 0x00;
        target[1000] = 0x42;
        roundtrip(&source, &target, false);
        roundtrip(&source, &target, true);
    }

    #[test]
    fn roundtrip_run_data() {
        roundtrip(b"", &[0xAA; 200], true);
        roundtrip(b"", &[0xAA; 200], false);
    }

    #[test]
    fn delta_is_smaller_for_similar_data() {
        let source = pseudo_random(8192, 1);
        let mut target = source.clone();
        target[4096] ^= 0xFF;
        let delta = roundtrip(&source, &target, false);
        assert!(
            delta.len() < target.len() / 20,
            "delta ({}) should be much smaller than target ({})",
            delta.len(),
            target.len()
        );
    }

    #[test]
    fn json_writer_sees_the_same_decisions() {
        let dictionary = b"abcdefghijklmnopqrstuvwxyz0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
        let target = b"Hi: abcdefghijklmnopqrstuvwxyz0123456789ABCDEF";
        let engine = DiffEngine::new(dictionary).unwrap();
        let mut writer = JsonWriter::new();
        writer.init(dictionary.len()).unwrap();
        let mut out = Vec::new();
        engine.encode(target, false, &mut out, &mut writer).unwrap();
        writer.finish_encoding(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), r#"["Hi: ",[0,42]]"#);
    }

    #[test]
    fn engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DiffEngine>();

        let engine = std::sync::Arc::new(DiffEngine::new(&pseudo_random(1024, 9)).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = std::sync::Arc::clone(&engine);
                std::thread::spawn(move || {
                    let mut target = engine.dictionary()[i * 100..i * 100 + 300].to_vec();
                    target.extend_from_slice(b"tail");
                    let mut writer = VcdiffWriter::new(false);
                    writer.init(engine.dictionary_size()).unwrap();
                    let mut delta = Vec::new();
                    engine.encode(&target, false, &mut delta, &mut writer).unwrap();
                    (target, delta)
                })
            })
            .collect();
        for handle in handles {
            let (target, window) = handle.join().unwrap();
            let mut delta = vec![0xD6, 0xC3, 0xC4, 0x00, 0x00];
            delta.extend_from_slice(&window);
            assert_eq!(decode_memory(engine.dictionary(), &delta).unwrap(), target);
        }
    }

    #[test]
    fn match_limits_are_applied() {
        let limits = MatchLimits {
            max_probes: 1,
            max_matches_to_check: 2,
        };
        let engine = DiffEngine::with_match_limits(&pseudo_random(512, 4), limits).unwrap();
        assert_eq!(engine.match_limits(), limits);
    }
}
