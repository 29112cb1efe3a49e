// Block hash index (Bentley-McIlroy style matching).
//
// The reference buffer is cut into aligned `BLOCK_SIZE` blocks. Each
// block's rolling hash selects a slot in `hash_table`; blocks sharing a
// slot form a singly-linked chain through `next_block_table`, kept in
// ascending block order so the lowest-numbered block is probed first.
// `last_block_table[head]` tracks each chain's tail for O(1) append.
//
// A `BlockHash` does not own the bytes it indexes. Every operation that
// reads content takes the reference buffer as a parameter, which must be
// the same buffer (same length) the index was created for. This lets the
// diff engine own its dictionary and the dictionary index side by side,
// and lets a target index borrow the window being encoded.

use thiserror::Error;

use super::{BLOCK_SIZE, BlockRollingHash};

// ---------------------------------------------------------------------------
// Tuning knobs
// ---------------------------------------------------------------------------

/// Effort bounds for `find_best_match`.
///
/// These only affect how hard the search tries on pathological inputs
/// (for example, buffers of one repeated byte). They never change the
/// wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchLimits {
    /// Hash-colliding blocks whose content differs that may be skipped in a
    /// row before the chain walk gives up.
    pub max_probes: usize,
    /// Content-verified candidates examined per lookup.
    pub max_matches_to_check: usize,
}

impl MatchLimits {
    pub const DEFAULT_MAX_PROBES: usize = 16;

    pub const DEFAULT_MAX_MATCHES_TO_CHECK: usize = if BLOCK_SIZE >= 32 {
        32
    } else {
        32 * (32 / BLOCK_SIZE)
    };
}

impl Default for MatchLimits {
    fn default() -> Self {
        Self {
            max_probes: Self::DEFAULT_MAX_PROBES,
            max_matches_to_check: Self::DEFAULT_MAX_MATCHES_TO_CHECK,
        }
    }
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// Best match found so far for one target candidate.
///
/// `source_offset` already includes the index's starting offset, so it is
/// a position in the combined dictionary + target address space.
/// `target_offset` is relative to the start of the unencoded target data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Match {
    size: usize,
    source_offset: usize,
    target_offset: usize,
}

impl Match {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn source_offset(&self) -> usize {
        self.source_offset
    }

    #[inline]
    pub fn target_offset(&self) -> usize {
        self.target_offset
    }

    /// Replace the stored match if `candidate_size` is strictly larger.
    /// Equal sizes keep the earlier match.
    #[inline]
    pub fn replace_if_better(
        &mut self,
        candidate_size: usize,
        candidate_source_offset: usize,
        candidate_target_offset: usize,
    ) {
        if candidate_size > self.size {
            self.size = candidate_size;
            self.source_offset = candidate_source_offset;
            self.target_offset = candidate_target_offset;
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockHashError {
    #[error("block hash initialized twice")]
    AlreadyInitialized,
    #[error("block hash used before initialization")]
    NotInitialized,
    #[error("cannot size a hash table for {0} bytes")]
    TableSizeOverflow(usize),
    #[error("reference buffer is {actual} bytes but the index covers {expected}")]
    SourceMismatch { expected: usize, actual: usize },
    #[error("block {block} is past the last block ({total} blocks)")]
    BlockOutOfRange { block: usize, total: usize },
    #[error("index {index} is past the end of the reference buffer ({size} bytes)")]
    IndexOutOfRange { index: usize, size: usize },
    #[error("hash chain corrupted at block {0}")]
    CorruptChain(usize),
}

// ---------------------------------------------------------------------------
// Byte comparison helpers
// ---------------------------------------------------------------------------

/// Length of the common prefix of `a` and `b`, capped at `limit`.
/// Compares eight bytes at a time before falling back to single bytes.
#[inline]
fn matching_bytes_to_right(a: &[u8], b: &[u8], limit: usize) -> usize {
    let n = limit.min(a.len()).min(b.len());
    let mut i = 0;
    while i + 8 <= n && a[i..i + 8] == b[i..i + 8] {
        i += 8;
    }
    while i < n && a[i] == b[i] {
        i += 1;
    }
    i
}

/// Length of the common suffix of `a` and `b`, capped at `limit`.
#[inline]
fn matching_bytes_to_left(a: &[u8], b: &[u8], limit: usize) -> usize {
    let n = limit.min(a.len()).min(b.len());
    let (a, b) = (&a[a.len() - n..], &b[b.len() - n..]);
    let mut i = 0;
    while i + 8 <= n && a[n - i - 8..n - i] == b[n - i - 8..n - i] {
        i += 8;
    }
    while i < n && a[n - i - 1] == b[n - i - 1] {
        i += 1;
    }
    i
}

#[inline(always)]
fn block_contents_match(a: &[u8], b: &[u8]) -> bool {
    // First-byte check rejects most hash collisions cheaply.
    a[0] == b[0] && a[..BLOCK_SIZE] == b[..BLOCK_SIZE]
}

// ---------------------------------------------------------------------------
// BlockHash
// ---------------------------------------------------------------------------

/// Hash-chained index of the aligned blocks of one reference buffer.
///
/// Construction is two-phase: `new` is cheap and infallible, `init`
/// allocates and may fail. A populated dictionary index is read-only
/// during matching and may be shared between threads.
#[derive(Debug, Clone)]
pub struct BlockHash {
    source_size: usize,
    starting_offset: usize,
    hash_table: Vec<Option<u32>>,
    hash_table_mask: usize,
    next_block_table: Vec<Option<u32>>,
    last_block_table: Vec<Option<u32>>,
    last_block_added: Option<usize>,
    limits: MatchLimits,
}

impl BlockHash {
    /// Create an uninitialized index for a buffer of `source_size` bytes.
    /// Match offsets will be reported relative to `starting_offset`.
    pub fn new(source_size: usize, starting_offset: usize) -> Self {
        Self {
            source_size,
            starting_offset,
            hash_table: Vec::new(),
            hash_table_mask: 0,
            next_block_table: Vec::new(),
            last_block_table: Vec::new(),
            last_block_added: None,
            limits: MatchLimits::default(),
        }
    }

    /// Build and fully populate an index over a dictionary.
    pub fn create_dictionary_hash(dictionary: &[u8]) -> Result<Self, BlockHashError> {
        let mut hash = Self::new(dictionary.len(), 0);
        hash.init(dictionary, true)?;
        Ok(hash)
    }

    /// Build an empty index over a target window. Blocks are added while
    /// the window is being encoded; offsets start after the dictionary.
    pub fn create_target_hash(
        target: &[u8],
        dictionary_size: usize,
    ) -> Result<Self, BlockHashError> {
        let mut hash = Self::new(target.len(), dictionary_size);
        hash.init(target, false)?;
        Ok(hash)
    }

    /// Smallest power of two >= `source_size / 4 + 1`.
    pub fn calc_table_size(source_size: usize) -> Result<usize, BlockHashError> {
        let min_size = source_size / std::mem::size_of::<i32>() + 1;
        let table_size = min_size
            .checked_next_power_of_two()
            .ok_or(BlockHashError::TableSizeOverflow(source_size))?;
        if source_size > 0 && table_size > source_size.saturating_mul(2) {
            log::error!(
                "hash table size {table_size} is out of proportion to source size {source_size}"
            );
            return Err(BlockHashError::TableSizeOverflow(source_size));
        }
        Ok(table_size)
    }

    /// Allocate the tables. With `populate_now`, every complete block of
    /// `source` is indexed immediately.
    pub fn init(&mut self, source: &[u8], populate_now: bool) -> Result<(), BlockHashError> {
        if !self.hash_table.is_empty() {
            log::error!("BlockHash::init called twice");
            return Err(BlockHashError::AlreadyInitialized);
        }
        self.check_source(source)?;
        let table_size = Self::calc_table_size(self.source_size)?;
        self.hash_table_mask = table_size - 1;
        self.hash_table = vec![None; table_size];
        let blocks = self.number_of_blocks();
        self.next_block_table = vec![None; blocks];
        self.last_block_table = vec![None; blocks];
        if populate_now {
            self.add_all_blocks(source)?;
        }
        Ok(())
    }

    pub fn set_match_limits(&mut self, limits: MatchLimits) {
        self.limits = limits;
    }

    pub fn match_limits(&self) -> MatchLimits {
        self.limits
    }

    #[inline]
    pub fn source_size(&self) -> usize {
        self.source_size
    }

    #[inline]
    pub fn starting_offset(&self) -> usize {
        self.starting_offset
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        !self.hash_table.is_empty()
    }

    #[inline]
    pub fn number_of_blocks(&self) -> usize {
        self.source_size / BLOCK_SIZE
    }

    /// Highest block number indexed so far.
    #[inline]
    pub fn last_block_added(&self) -> Option<usize> {
        self.last_block_added
    }

    /// Byte offset of the next block `add_block` would insert.
    #[inline]
    pub fn next_index_to_add(&self) -> usize {
        self.last_block_added.map_or(0, |b| b + 1) * BLOCK_SIZE
    }

    #[inline(always)]
    fn table_index(&self, hash_value: u32) -> usize {
        hash_value as usize & self.hash_table_mask
    }

    fn check_source(&self, source: &[u8]) -> Result<(), BlockHashError> {
        if source.len() != self.source_size {
            log::error!(
                "block hash over {} bytes given a {}-byte reference buffer",
                self.source_size,
                source.len()
            );
            return Err(BlockHashError::SourceMismatch {
                expected: self.source_size,
                actual: source.len(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Population
    // -----------------------------------------------------------------------

    /// Append the next sequential block, whose hash is `hash_value`, to the
    /// tail of its chain.
    pub fn add_block(&mut self, hash_value: u32) -> Result<(), BlockHashError> {
        if !self.is_initialized() {
            log::error!("BlockHash::add_block called before init");
            return Err(BlockHashError::NotInitialized);
        }
        let block_number = self.last_block_added.map_or(0, |b| b + 1);
        let total = self.number_of_blocks();
        if block_number >= total {
            log::error!("BlockHash::add_block past last block: {block_number} of {total}");
            return Err(BlockHashError::BlockOutOfRange {
                block: block_number,
                total,
            });
        }
        if self.next_block_table[block_number].is_some() {
            log::error!("block {block_number} already has a successor before being added");
            return Err(BlockHashError::CorruptChain(block_number));
        }
        // Block numbers are bounded by i32 addressing.
        let block_id = block_number as u32;
        let slot = self.table_index(hash_value);
        match self.hash_table[slot] {
            None => {
                self.hash_table[slot] = Some(block_id);
                self.last_block_table[block_number] = Some(block_id);
            }
            Some(first) => {
                let first = first as usize;
                let last = self.last_block_table[first]
                    .ok_or(BlockHashError::CorruptChain(first))? as usize;
                if self.next_block_table[last].is_some() {
                    log::error!("chain tail {last} already has a successor");
                    return Err(BlockHashError::CorruptChain(last));
                }
                self.next_block_table[last] = Some(block_id);
                self.last_block_table[first] = Some(block_id);
            }
        }
        self.last_block_added = Some(block_number);
        Ok(())
    }

    /// Index every complete block of `source`.
    pub fn add_all_blocks(&mut self, source: &[u8]) -> Result<(), BlockHashError> {
        self.add_all_blocks_through_index(source, self.source_size)
    }

    /// Index all blocks starting before `end_index`, skipping any that would
    /// read past the end of `source`. A no-op when nothing new is covered.
    pub fn add_all_blocks_through_index(
        &mut self,
        source: &[u8],
        end_index: usize,
    ) -> Result<(), BlockHashError> {
        self.check_source(source)?;
        if end_index > self.source_size {
            log::error!(
                "add_all_blocks_through_index: index {end_index} past source size {}",
                self.source_size
            );
            return Err(BlockHashError::IndexOutOfRange {
                index: end_index,
                size: self.source_size,
            });
        }
        if self.source_size < BLOCK_SIZE {
            return Ok(());
        }
        if let Some(last) = self.last_block_added
            && end_index <= last * BLOCK_SIZE
        {
            return Ok(());
        }
        let last_legal_hash_index = self.source_size - BLOCK_SIZE;
        let end_limit = end_index.min(last_legal_hash_index + 1);
        let mut block_start = self.next_index_to_add();
        while block_start < end_limit {
            self.add_block(BlockRollingHash::hash(&source[block_start..]))?;
            block_start += BLOCK_SIZE;
        }
        Ok(())
    }

    /// Index the block at `index` if it is the next block due. Used while
    /// scanning a target window, where the hash is already at hand.
    pub fn add_one_index_hash(&mut self, index: usize, hash_value: u32) -> Result<(), BlockHashError> {
        if index == self.next_index_to_add() {
            self.add_block(hash_value)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Walk from `block` along its chain to the first block whose content
    /// equals `candidate`, giving up after `max_probes` mismatches.
    fn skip_non_matching_blocks(
        &self,
        source: &[u8],
        mut block: Option<u32>,
        candidate: &[u8],
    ) -> Option<usize> {
        let mut probes = 0;
        while let Some(b) = block {
            let b = b as usize;
            let start = b * BLOCK_SIZE;
            if block_contents_match(candidate, &source[start..start + BLOCK_SIZE]) {
                return Some(b);
            }
            probes += 1;
            if probes > self.limits.max_probes {
                return None;
            }
            block = self.next_block_table[b];
        }
        None
    }

    /// First indexed block whose content equals `candidate`.
    pub fn first_matching_block(
        &self,
        source: &[u8],
        hash_value: u32,
        candidate: &[u8],
    ) -> Option<usize> {
        if !self.is_initialized() || candidate.len() < BLOCK_SIZE {
            return None;
        }
        let head = self.hash_table[self.table_index(hash_value)];
        self.skip_non_matching_blocks(source, head, candidate)
    }

    /// Next block after `block` in the same chain whose content equals
    /// `candidate`.
    pub fn next_matching_block(
        &self,
        source: &[u8],
        block: usize,
        candidate: &[u8],
    ) -> Option<usize> {
        if block >= self.number_of_blocks() {
            log::error!(
                "next_matching_block: block {block} past last block {}",
                self.number_of_blocks()
            );
            return None;
        }
        self.skip_non_matching_blocks(source, self.next_block_table[block], candidate)
    }

    /// Search the index for the longest match of the block starting at
    /// `unencoded[candidate_offset..]`, extending each verified block match
    /// left (not before the start of `unencoded`) and right as far as bytes
    /// agree. `best_match` is updated only by a strictly longer match.
    ///
    /// `source` is the indexed buffer; `unencoded` is the target data not
    /// yet encoded, so reported target offsets are relative to it.
    pub fn find_best_match(
        &self,
        source: &[u8],
        hash_value: u32,
        unencoded: &[u8],
        candidate_offset: usize,
        best_match: &mut Match,
    ) {
        if source.len() != self.source_size {
            log::error!(
                "find_best_match: index covers {} bytes, given {}",
                self.source_size,
                source.len()
            );
            return;
        }
        let Some(candidate) = unencoded.get(candidate_offset..) else {
            return;
        };
        let mut matches_checked = 0;
        let mut block = self.first_matching_block(source, hash_value, candidate);
        while let Some(block_number) = block {
            matches_checked += 1;
            if matches_checked > self.limits.max_matches_to_check {
                break;
            }

            let mut source_match_offset = block_number * BLOCK_SIZE;
            let source_match_end = source_match_offset + BLOCK_SIZE;
            let mut target_match_offset = candidate_offset;
            let target_match_end = target_match_offset + BLOCK_SIZE;
            let mut match_size = BLOCK_SIZE;

            // Extend towards the beginning of the unencoded data.
            let limit_left = source_match_offset.min(target_match_offset);
            let left = matching_bytes_to_left(
                &source[..source_match_offset],
                &unencoded[..target_match_offset],
                limit_left,
            );
            source_match_offset -= left;
            target_match_offset -= left;
            match_size += left;

            // Extend towards the end of both buffers.
            let limit_right =
                (self.source_size - source_match_end).min(unencoded.len() - target_match_end);
            match_size += matching_bytes_to_right(
                &source[source_match_end..],
                &unencoded[target_match_end..],
                limit_right,
            );

            best_match.replace_if_better(
                match_size,
                source_match_offset + self.starting_offset,
                target_match_offset,
            );

            block = self.next_matching_block(source, block_number, candidate);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
        let mut x = seed;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (x >> 16) as u8
            })
            .collect()
    }

    #[test]
    fn table_size_is_power_of_two() {
        assert_eq!(BlockHash::calc_table_size(0).unwrap(), 1);
        assert_eq!(BlockHash::calc_table_size(3).unwrap(), 1);
        assert_eq!(BlockHash::calc_table_size(4).unwrap(), 2);
        assert_eq!(BlockHash::calc_table_size(1000).unwrap(), 256);
        assert_eq!(BlockHash::calc_table_size(1024).unwrap(), 512);
        for size in [1usize, 17, 100, 4096, 1 << 20] {
            let t = BlockHash::calc_table_size(size).unwrap();
            assert!(t.is_power_of_two());
            assert!(t >= size / 4 + 1);
        }
    }

    #[test]
    fn init_twice_fails() {
        let data = vec![0u8; 64];
        let mut hash = BlockHash::new(data.len(), 0);
        hash.init(&data, false).unwrap();
        assert_eq!(
            hash.init(&data, false),
            Err(BlockHashError::AlreadyInitialized)
        );
    }

    #[test]
    fn add_block_before_init_fails() {
        let mut hash = BlockHash::new(64, 0);
        assert_eq!(hash.add_block(1), Err(BlockHashError::NotInitialized));
    }

    #[test]
    fn add_block_past_end_fails() {
        let data = vec![7u8; 32];
        let mut hash = BlockHash::create_dictionary_hash(&data).unwrap();
        assert_eq!(hash.last_block_added(), Some(1));
        assert!(matches!(
            hash.add_block(0),
            Err(BlockHashError::BlockOutOfRange { block: 2, total: 2 })
        ));
    }

    #[test]
    fn dictionary_hash_indexes_every_block() {
        let data = pseudo_random(16 * 10 + 5, 1);
        let hash = BlockHash::create_dictionary_hash(&data).unwrap();
        assert_eq!(hash.number_of_blocks(), 10);
        assert_eq!(hash.last_block_added(), Some(9));
        for b in 0..10 {
            let block = &data[b * BLOCK_SIZE..];
            let h = BlockRollingHash::hash(block);
            assert_eq!(hash.first_matching_block(&data, h, block), Some(b));
        }
    }

    #[test]
    fn chains_are_fifo() {
        // Three identical blocks share one chain; lowest number comes first.
        let mut data = vec![b'x'; 48];
        data.extend_from_slice(&pseudo_random(16, 9));
        let hash = BlockHash::create_dictionary_hash(&data).unwrap();
        let h = BlockRollingHash::hash(&data);
        assert_eq!(hash.first_matching_block(&data, h, &data), Some(0));
        assert_eq!(hash.next_matching_block(&data, 0, &data), Some(1));
        assert_eq!(hash.next_matching_block(&data, 1, &data), Some(2));
        assert_eq!(hash.next_matching_block(&data, 2, &data), None);
    }

    #[test]
    fn incremental_population() {
        let data = pseudo_random(100, 3);
        let mut hash = BlockHash::create_target_hash(&data, 1000).unwrap();
        assert_eq!(hash.last_block_added(), None);
        assert_eq!(hash.next_index_to_add(), 0);

        hash.add_all_blocks_through_index(&data, 40).unwrap();
        // Blocks starting at 0, 16 and 32 are below index 40.
        assert_eq!(hash.last_block_added(), Some(2));

        // Not advancing past the last added block is a no-op.
        hash.add_all_blocks_through_index(&data, 20).unwrap();
        assert_eq!(hash.last_block_added(), Some(2));

        // Stops before reading past the end (last legal start is 84).
        hash.add_all_blocks_through_index(&data, 100).unwrap();
        assert_eq!(hash.last_block_added(), Some(5));

        assert!(matches!(
            hash.add_all_blocks_through_index(&data, 101),
            Err(BlockHashError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn add_one_index_hash_only_adds_due_block() {
        let data = pseudo_random(64, 5);
        let mut hash = BlockHash::create_target_hash(&data, 0).unwrap();
        hash.add_one_index_hash(3, BlockRollingHash::hash(&data[3..]))
            .unwrap();
        assert_eq!(hash.last_block_added(), None);
        hash.add_one_index_hash(0, BlockRollingHash::hash(&data))
            .unwrap();
        assert_eq!(hash.last_block_added(), Some(0));
        hash.add_one_index_hash(16, BlockRollingHash::hash(&data[16..]))
            .unwrap();
        assert_eq!(hash.last_block_added(), Some(1));
    }

    #[test]
    fn source_mismatch_is_rejected() {
        let data = vec![1u8; 64];
        let mut hash = BlockHash::new(64, 0);
        assert!(matches!(
            hash.init(&data[..32], true),
            Err(BlockHashError::SourceMismatch { .. })
        ));
    }

    #[test]
    fn find_best_match_extends_both_ways() {
        let dictionary = pseudo_random(256, 11);
        // Target contains dictionary[37..137], surrounded by bytes that are
        // guaranteed to differ from the dictionary at the aligned positions.
        let mut target: Vec<u8> = dictionary[17..37].iter().map(|b| !b).collect();
        target.extend_from_slice(&dictionary[37..137]);
        target.extend(dictionary[137..157].iter().map(|b| !b));

        let hash = BlockHash::create_dictionary_hash(&dictionary).unwrap();
        // Candidate at the first block-aligned dictionary offset inside the copy (48).
        let candidate_offset = 20 + (48 - 37);
        let h = BlockRollingHash::hash(&target[candidate_offset..]);
        let mut best = Match::new();
        hash.find_best_match(&dictionary, h, &target, candidate_offset, &mut best);
        assert_eq!(best.size(), 100);
        assert_eq!(best.source_offset(), 37);
        assert_eq!(best.target_offset(), 20);
    }

    #[test]
    fn left_extension_stops_at_unencoded_start() {
        let dictionary = pseudo_random(128, 21);
        let unencoded = &dictionary[8..];
        let hash = BlockHash::create_dictionary_hash(&dictionary).unwrap();
        // Candidate at unencoded offset 8 == dictionary block 1.
        let h = BlockRollingHash::hash(&unencoded[8..]);
        let mut best = Match::new();
        hash.find_best_match(&dictionary, h, unencoded, 8, &mut best);
        assert_eq!(best.target_offset(), 0);
        assert_eq!(best.source_offset(), 8);
        assert_eq!(best.size(), unencoded.len());
    }

    #[test]
    fn starting_offset_is_added() {
        let target = pseudo_random(64, 4);
        let mut hash = BlockHash::create_target_hash(&target, 500).unwrap();
        hash.add_all_blocks_through_index(&target, 1).unwrap();
        let mut best = Match::new();
        let h = BlockRollingHash::hash(&target);
        hash.find_best_match(&target, h, &target, 0, &mut best);
        assert_eq!(best.source_offset(), 500);
    }

    #[test]
    fn equal_size_matches_keep_the_first() {
        let mut best = Match::new();
        best.replace_if_better(40, 0, 0);
        best.replace_if_better(40, 100, 0);
        assert_eq!(best.source_offset(), 0);
        best.replace_if_better(41, 100, 3);
        assert_eq!(best.source_offset(), 100);
        assert_eq!(best.target_offset(), 3);
    }

    #[test]
    fn repeated_byte_dictionary_prefers_lowest_block() {
        let dictionary = vec![b'a'; 160];
        let target = vec![b'a'; 48];
        let hash = BlockHash::create_dictionary_hash(&dictionary).unwrap();
        let mut best = Match::new();
        hash.find_best_match(&dictionary, BlockRollingHash::hash(&target), &target, 0, &mut best);
        assert_eq!(best.size(), 48);
        assert_eq!(best.source_offset(), 0);
    }

    #[test]
    fn match_limits_bound_the_search() {
        let dictionary = vec![b'z'; 16 * 200];
        let mut hash = BlockHash::create_dictionary_hash(&dictionary).unwrap();
        hash.set_match_limits(MatchLimits {
            max_probes: 0,
            max_matches_to_check: 1,
        });
        let target = vec![b'z'; 16];
        let mut best = Match::new();
        hash.find_best_match(&dictionary, BlockRollingHash::hash(&target), &target, 0, &mut best);
        assert_eq!(best.size(), 16);
        assert_eq!(best.source_offset(), 0);
    }

    #[test]
    fn comparison_helpers() {
        let a = b"0123456789abcdefXYZ";
        let b = b"0123456789abcdefXYQ";
        assert_eq!(matching_bytes_to_right(a, b, 100), 18);
        assert_eq!(matching_bytes_to_right(a, b, 5), 5);
        assert_eq!(matching_bytes_to_left(b"zz0123456789abcdef", b"y0123456789abcdef", 100), 16);
        assert_eq!(matching_bytes_to_left(b"abc", b"abc", 2), 2);
    }

    #[test]
    fn default_limits() {
        assert_eq!(MatchLimits::default().max_probes, 16);
        assert_eq!(MatchLimits::default().max_matches_to_check, 64);
    }
}
