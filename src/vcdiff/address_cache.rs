// VCDIFF address cache (RFC 3284, Section 5.1 and 5.3).
//
// Keeps the NEAR and SAME caches of recently used COPY addresses and picks
// the cheapest representation for each new address. Encoder and decoder
// update their caches identically after every address, so both sides stay
// in lock-step for the whole window.
//
// Mode numbering for `near_cache_size = n`, `same_cache_size = s`:
//   0              VCD_SELF   address itself
//   1              VCD_HERE   here - address
//   2 .. 2+n-1     NEAR(i)    address - near[i]
//   2+n .. 2+n+s-1 SAME(j)    one byte: slot within same[j*256 ..]

use thiserror::Error;

use super::varint::{self, VarintError};

pub const VCD_SELF_MODE: u8 = 0;
pub const VCD_HERE_MODE: u8 = 1;
pub const FIRST_NEAR_MODE: u8 = 2;

pub const DEFAULT_NEAR_CACHE_SIZE: u8 = 4;
pub const DEFAULT_SAME_CACHE_SIZE: u8 = 3;

/// SELF and HERE occupy two of the 256 mode values.
pub const MAX_CACHE_SIZE_SUM: usize = 254;

/// A COPY address in the combined dictionary + target space.
pub type Address = i32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressCacheError {
    #[error("near cache size {near} + same cache size {same} exceeds {MAX_CACHE_SIZE_SUM}")]
    CacheTooLarge { near: u8, same: u8 },
    #[error("address cache used before init")]
    NotInitialized,
    #[error("invalid address mode {0}")]
    InvalidMode(u8),
    #[error("address {address} out of range for here address {here}")]
    AddressOutOfRange { address: i64, here: Address },
    #[error("negative here address {0}")]
    NegativeHere(Address),
    #[error("address section ended early")]
    EndOfData,
    #[error("malformed address value: {0}")]
    Varint(VarintError),
}

impl From<VarintError> for AddressCacheError {
    fn from(e: VarintError) -> Self {
        match e {
            VarintError::EndOfData => Self::EndOfData,
            other => Self::Varint(other),
        }
    }
}

/// How an encoded address must be written to the address section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedAddress {
    /// SELF, HERE and NEAR modes: a variable-length integer.
    Varint(Address),
    /// SAME modes: one raw byte.
    Byte(u8),
}

impl EncodedAddress {
    /// Append the encoded value to an address section.
    pub fn write_to(self, out: &mut Vec<u8>) {
        match self {
            Self::Varint(value) => varint::write_i32(out, value),
            Self::Byte(b) => out.push(b),
        }
    }
}

/// NEAR/SAME address cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCache {
    near_cache_size: u8,
    same_cache_size: u8,
    near_addresses: Vec<Address>,
    same_addresses: Vec<Address>,
    next_slot: usize,
    initialized: bool,
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new(DEFAULT_NEAR_CACHE_SIZE, DEFAULT_SAME_CACHE_SIZE)
    }
}

impl AddressCache {
    /// Cheap constructor; call `init` before use.
    pub fn new(near_cache_size: u8, same_cache_size: u8) -> Self {
        Self {
            near_cache_size,
            same_cache_size,
            near_addresses: Vec::new(),
            same_addresses: Vec::new(),
            next_slot: 0,
            initialized: false,
        }
    }

    /// Validate the sizes and reset both caches to zero. Safe to call again
    /// to start a new window.
    pub fn init(&mut self) -> Result<(), AddressCacheError> {
        let (near, same) = (self.near_cache_size, self.same_cache_size);
        if near as usize + same as usize > MAX_CACHE_SIZE_SUM {
            log::error!("address cache sizes too large: near {near}, same {same}");
            return Err(AddressCacheError::CacheTooLarge { near, same });
        }
        self.near_addresses.clear();
        self.near_addresses.resize(near as usize, 0);
        self.same_addresses.clear();
        self.same_addresses.resize(same as usize * 256, 0);
        self.next_slot = 0;
        self.initialized = true;
        Ok(())
    }

    #[inline]
    pub fn near_cache_size(&self) -> u8 {
        self.near_cache_size
    }

    #[inline]
    pub fn same_cache_size(&self) -> u8 {
        self.same_cache_size
    }

    #[inline]
    pub fn first_same_mode(&self) -> usize {
        FIRST_NEAR_MODE as usize + self.near_cache_size as usize
    }

    /// Highest valid mode number.
    #[inline]
    pub fn last_mode(&self) -> usize {
        self.first_same_mode() + self.same_cache_size as usize - 1
    }

    #[inline]
    pub fn is_same_mode(&self, mode: u8) -> bool {
        let mode = mode as usize;
        mode >= self.first_same_mode() && mode <= self.last_mode()
    }

    #[inline]
    pub fn is_near_mode(&self, mode: u8) -> bool {
        mode >= FIRST_NEAR_MODE && (mode as usize) < self.first_same_mode()
    }

    /// SAME modes are written as a single byte, every other mode as a
    /// variable-length integer.
    #[inline]
    pub fn write_address_as_varint_for_mode(&self, mode: u8) -> bool {
        !self.is_same_mode(mode)
    }

    #[inline]
    pub fn near_address(&self, i: usize) -> Address {
        self.near_addresses[i]
    }

    #[inline]
    pub fn same_address(&self, i: usize) -> Address {
        self.same_addresses[i]
    }

    /// Record `address` in both caches.
    #[inline]
    pub fn update_cache(&mut self, address: Address) {
        if self.near_cache_size > 0 {
            self.near_addresses[self.next_slot] = address;
            self.next_slot = (self.next_slot + 1) % self.near_cache_size as usize;
        }
        if self.same_cache_size > 0 {
            let slot = address as usize % (self.same_cache_size as usize * 256);
            self.same_addresses[slot] = address;
        }
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    /// Pick the cheapest mode for `address` at position `here` and update
    /// the cache. Requires `0 <= address < here`.
    ///
    /// A SAME hit always wins. Otherwise the smallest of SELF, HERE and the
    /// non-negative NEAR distances is chosen, earlier modes winning ties.
    pub fn encode_address(
        &mut self,
        address: Address,
        here: Address,
    ) -> Result<(u8, EncodedAddress), AddressCacheError> {
        if !self.initialized {
            log::error!("encode_address called before init");
            return Err(AddressCacheError::NotInitialized);
        }
        if address < 0 || address >= here {
            log::error!("encode_address: address {address} not in [0, {here})");
            return Err(AddressCacheError::AddressOutOfRange {
                address: address as i64,
                here,
            });
        }

        if self.same_cache_size > 0 {
            let slot = address as usize % (self.same_cache_size as usize * 256);
            if self.same_addresses[slot] == address {
                self.update_cache(address);
                let mode = (self.first_same_mode() + slot / 256) as u8;
                return Ok((mode, EncodedAddress::Byte((slot % 256) as u8)));
            }
        }

        let mut best_mode = VCD_SELF_MODE;
        let mut best_encoded = address;

        let here_encoded = here - address;
        if here_encoded < best_encoded {
            best_mode = VCD_HERE_MODE;
            best_encoded = here_encoded;
        }

        for (i, &near) in self.near_addresses.iter().enumerate() {
            let near_encoded = address - near;
            if near_encoded >= 0 && near_encoded < best_encoded {
                best_mode = FIRST_NEAR_MODE + i as u8;
                best_encoded = near_encoded;
            }
        }

        self.update_cache(address);
        Ok((best_mode, EncodedAddress::Varint(best_encoded)))
    }

    // -----------------------------------------------------------------------
    // Decoding
    // -----------------------------------------------------------------------

    /// Decode one address for `mode` from `stream[*pos..]`.
    ///
    /// On success `*pos` is advanced and the cache updated. On
    /// `EndOfData` nothing is consumed, so the call can be retried once
    /// more bytes are available.
    pub fn decode_address(
        &mut self,
        here: Address,
        mode: u8,
        stream: &[u8],
        pos: &mut usize,
    ) -> Result<Address, AddressCacheError> {
        if !self.initialized {
            log::error!("decode_address called before init");
            return Err(AddressCacheError::NotInitialized);
        }
        if here < 0 {
            log::error!("decode_address called with negative here address {here}");
            return Err(AddressCacheError::NegativeHere(here));
        }
        if mode as usize > self.last_mode() {
            log::error!("decode_address: invalid mode {mode}");
            return Err(AddressCacheError::InvalidMode(mode));
        }
        if *pos >= stream.len() {
            return Err(AddressCacheError::EndOfData);
        }

        let mut new_pos = *pos;
        let decoded: i64 = if self.is_same_mode(mode) {
            let byte = stream[new_pos];
            new_pos += 1;
            let slot = (mode as usize - self.first_same_mode()) * 256 + byte as usize;
            self.same_addresses[slot] as i64
        } else {
            let encoded = varint::read_i32(stream, &mut new_pos)? as i64;
            match mode {
                VCD_SELF_MODE => encoded,
                VCD_HERE_MODE => here as i64 - encoded,
                _ => self.near_addresses[(mode - FIRST_NEAR_MODE) as usize] as i64 + encoded,
            }
        };

        if decoded < 0 || decoded >= here as i64 {
            log::warn!("decoded address {decoded} out of range for here address {here}");
            return Err(AddressCacheError::AddressOutOfRange {
                address: decoded,
                here,
            });
        }
        let address = decoded as Address;
        *pos = new_pos;
        self.update_cache(address);
        Ok(address)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
