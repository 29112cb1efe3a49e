// Session-level delta APIs.
//
// - `encoder` : StreamingEncoder, one window per chunk, plus one-shot `encode`
// - `decoder` : DeltaDecoder, pulls a delta from any `Read`, plus `decode_all`
// - `runs`    : RunSplitter, turns repeated-byte stretches of ADD into RUN

pub mod decoder;
pub mod encoder;
pub mod runs;

pub use decoder::{DeltaDecoder, decode_all};
pub use encoder::{EncodeError, EncoderOptions, StreamingEncoder, encode};
pub use runs::RunSplitter;
