// Polynomial rolling hash over a fixed-size window.
//
//   hash(w) = (w[0]*M^(n-1) + w[1]*M^(n-2) + ... + w[n-1]) mod B
//
// with M = 257 and B = 2^23, so "mod B" is a bitwise AND. Sliding the
// window by one byte subtracts the leaving byte's contribution through a
// 256-entry remove table and folds in the new byte, independent of the
// window size.
//
// The remove table depends only on the window size, so it is computed by
// a `const fn` and baked into each `RollingHash<WINDOW>` instantiation at
// compile time. There is no runtime initialization step to race on.

/// Polynomial multiplier.
pub const MULT: u32 = 257;

/// Modulus. Must be a power of two.
pub const BASE: u32 = 1 << 23;

const _: () = assert!(BASE.is_power_of_two());

#[inline(always)]
pub const fn mod_base(operand: u32) -> u32 {
    operand & (BASE - 1)
}

/// Additive inverse of `operand` modulo `BASE`.
#[inline(always)]
pub const fn mod_base_inverse(operand: u32) -> u32 {
    mod_base(0u32.wrapping_sub(operand))
}

/// Fold `next_byte` into a partial hash.
#[inline(always)]
pub const fn hash_step(partial_hash: u32, next_byte: u8) -> u32 {
    mod_base(partial_hash.wrapping_mul(MULT).wrapping_add(next_byte as u32))
}

/// Seed value from the first two bytes. Skips one modulus since the result
/// is always below 2^17.
#[inline(always)]
const fn hash_first_two_bytes(a: u8, b: u8) -> u32 {
    (a as u32) * MULT + b as u32
}

/// `remove_table[b] = -(b * MULT^(window-1)) mod BASE`.
const fn build_remove_table(window: usize) -> [u32; 256] {
    let mut multiplier: u32 = 1;
    let mut i = 0;
    while i + 1 < window {
        multiplier = mod_base(multiplier.wrapping_mul(MULT));
        i += 1;
    }
    let mut table = [0u32; 256];
    let mut byte_times_multiplier: u32 = 0;
    let mut b = 0;
    while b < 256 {
        table[b] = mod_base_inverse(byte_times_multiplier);
        byte_times_multiplier = mod_base(byte_times_multiplier.wrapping_add(multiplier));
        b += 1;
    }
    table
}

/// Rolling hash over windows of `WINDOW` bytes.
///
/// Stateless: every function is pure, so a single instantiation may be used
/// from any number of threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollingHash<const WINDOW: usize>;

impl<const WINDOW: usize> RollingHash<WINDOW> {
    const WINDOW_OK: () = assert!(WINDOW >= 2, "rolling hash window must be at least 2 bytes");

    /// Precomputed per-byte removal terms for this window size.
    pub const REMOVE_TABLE: [u32; 256] = build_remove_table(WINDOW);

    /// Hash the first `WINDOW` bytes of `window`.
    ///
    /// The caller guarantees `window.len() >= WINDOW`.
    #[inline]
    pub fn hash(window: &[u8]) -> u32 {
        let () = Self::WINDOW_OK;
        debug_assert!(window.len() >= WINDOW);
        let bytes = &window[..WINDOW];
        let mut h = hash_first_two_bytes(bytes[0], bytes[1]);
        for &b in &bytes[2..] {
            h = hash_step(h, b);
        }
        h
    }

    /// Drop `first_byte` from the front of a full-window hash, leaving the
    /// hash of the remaining `WINDOW - 1` bytes.
    #[inline(always)]
    pub fn remove_first_byte(hash: u32, first_byte: u8) -> u32 {
        mod_base(hash.wrapping_add(Self::REMOVE_TABLE[first_byte as usize]))
    }

    /// Slide the window one byte: `old_first_byte` leaves, `new_last_byte`
    /// enters.
    #[inline(always)]
    pub fn update(old_hash: u32, old_first_byte: u8, new_last_byte: u8) -> u32 {
        hash_step(
            Self::remove_first_byte(old_hash, old_first_byte),
            new_last_byte,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference implementation without the first-two-bytes shortcut or the
    /// remove table.
    fn naive_hash(window: &[u8]) -> u32 {
        window
            .iter()
            .fold(0u32, |h, &b| ((h as u64 * MULT as u64 + b as u64) % BASE as u64) as u32)
    }

    #[test]
    fn hash_matches_naive_polynomial() {
        let data: Vec<u8> = (0..=255u8).cycle().take(64).collect();
        for start in 0..(data.len() - 16) {
            assert_eq!(
                RollingHash::<16>::hash(&data[start..]),
                naive_hash(&data[start..start + 16])
            );
        }
    }

    #[test]
    fn update_equals_rehash() {
        let data = b"The quick brown fox jumps over the lazy dog, again and again.";
        let mut h = RollingHash::<16>::hash(data);
        for i in 1..=(data.len() - 16) {
            h = RollingHash::<16>::update(h, data[i - 1], data[i + 15]);
            assert_eq!(h, RollingHash::<16>::hash(&data[i..]), "offset {i}");
        }
    }

    #[test]
    fn update_works_for_other_window_sizes() {
        let data: Vec<u8> = (0..200u32).map(|i| (i * 31 % 251) as u8).collect();
        let mut h2 = RollingHash::<2>::hash(&data);
        let mut h32 = RollingHash::<32>::hash(&data);
        for i in 1..100 {
            h2 = RollingHash::<2>::update(h2, data[i - 1], data[i + 1]);
            h32 = RollingHash::<32>::update(h32, data[i - 1], data[i + 31]);
            assert_eq!(h2, RollingHash::<2>::hash(&data[i..]));
            assert_eq!(h32, RollingHash::<32>::hash(&data[i..]));
        }
    }

    #[test]
    fn remove_table_zero_entry() {
        assert_eq!(RollingHash::<16>::REMOVE_TABLE[0], 0);
        for &v in RollingHash::<16>::REMOVE_TABLE.iter() {
            assert!(v < BASE);
        }
    }

    #[test]
    fn remove_first_byte_leaves_suffix_hash() {
        let data = b"0123456789abcdef";
        let full = RollingHash::<16>::hash(data);
        let suffix = naive_hash(&data[1..]);
        assert_eq!(RollingHash::<16>::remove_first_byte(full, data[0]), suffix);
    }

    #[test]
    fn hashes_stay_in_range() {
        let data = [0xFFu8; 16];
        assert!(RollingHash::<16>::hash(&data) < BASE);
        assert!(RollingHash::<16>::update(RollingHash::<16>::hash(&data), 0xFF, 0xFF) < BASE);
    }
}
