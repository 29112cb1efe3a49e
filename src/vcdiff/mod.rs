// VCDIFF format layer (RFC 3284) with the open-vcdiff extensions.
//
// - `varint`          : base-128 big-endian integers
// - `address_cache`   : NEAR/SAME cache for COPY addresses
// - `code_table`      : instruction code tables, default and custom
// - `instruction_map` : (instruction, size, mode) to opcode lookup
// - `header`          : file and window headers
// - `writer`          : instruction sinks (binary VCDIFF and JSON)
// - `reader`          : opcode stream to instructions
// - `decoder`         : incremental window decoder

pub mod address_cache;
pub mod code_table;
pub mod decoder;
pub mod header;
pub mod instruction_map;
pub mod reader;
pub mod varint;
pub mod writer;

pub use address_cache::AddressCache;
pub use code_table::{CodeTable, InstructionType};
pub use decoder::{DecodeError, DecoderOptions, StreamingDecoder, decode_memory, decode_memory_with};
pub use header::{FileHeader, FormatExtensions, VCDIFF_MAGIC, WindowHeader};
pub use instruction_map::InstructionMap;
pub use reader::{CodeTableReader, DecodedInstruction};
pub use writer::{CodeTableWriter, JsonWriter, OutputSink, VcdiffWriter, WriterError};
