//! vcdelta: VCDIFF (RFC 3284) delta encoding/decoding in Rust.
//!
//! The crate provides:
//! - A block-hash diff engine over a fixed dictionary (`engine`, `hash`)
//! - The VCDIFF wire format with the open-vcdiff extensions (`vcdiff`)
//! - Streaming session APIs (`compress`)
//! - Stream and file helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use vcdelta::compress::{EncoderOptions, decode_all, encode};
//!
//! let dictionary = b"The quick brown fox jumps over the lazy dog, again and again.";
//! let target = b"A quick brown fox jumps over the lazy dog, again and again!";
//!
//! let delta = encode(dictionary, target, EncoderOptions::default()).unwrap();
//! let decoded = decode_all(dictionary, &delta).unwrap();
//! assert_eq!(decoded, target);
//! ```

pub mod compress;
pub mod engine;
pub mod hash;
pub mod io;
pub mod vcdiff;

#[cfg(feature = "cli")]
pub mod cli;
