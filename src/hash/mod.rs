// Content indexing for the diff engine.
//
// This module provides:
// - A polynomial rolling hash over fixed-size windows (`rolling`)
// - A block-granular hash index with bounded longest-match search (`block`)

pub mod block;
pub mod rolling;

pub use block::{BlockHash, BlockHashError, Match, MatchLimits};
pub use rolling::RollingHash;

/// Granularity of the block index. Must be a power of two and at least 2.
pub const BLOCK_SIZE: usize = 16;

/// Shortest match the engine turns into a COPY. At least twice the block
/// size, so any match of this length fully contains an aligned block.
pub const MIN_MATCH_SIZE: usize = 32;

const _: () = assert!(BLOCK_SIZE.is_power_of_two() && BLOCK_SIZE >= 2);
const _: () = assert!(MIN_MATCH_SIZE >= 2 * BLOCK_SIZE);

/// The rolling hash used over `BLOCK_SIZE` windows.
pub type BlockRollingHash = RollingHash<BLOCK_SIZE>;
