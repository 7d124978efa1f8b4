// VCDIFF decoding (RFC 3284), including the SDCH interleaved variant.
//
// # Modules
//
// - `varint`        : base-128 big-endian integers
// - `code_table`    : instruction code tables, default and custom
// - `address_cache` : NEAR/SAME cache that resolves COPY addresses
// - `header`        : file header and window header parsing
// - `instruction`   : opcode stream to resolved instructions
// - `window`        : window buffering, execution and verification
// - `decoder`       : chunked streaming decoder and one-shot helpers
// - `inspect`       : header and instruction dumps without a dictionary
// - `sink`          : destinations for decoded bytes
// - `checksum`      : Adler-32
// - `error`         : `DecodeError`

pub mod address_cache;
pub mod checksum;
pub mod code_table;
pub mod decoder;
pub mod error;
pub mod header;
pub mod inspect;
pub mod instruction;
pub mod sink;
pub mod varint;
pub mod window;

pub use address_cache::AddressCache;
pub use code_table::{CodeTable, CodeTableEntry};
pub use decoder::{DecoderOptions, StreamingDecoder, VcdiffDecoder, decode};
pub use error::DecodeError;
pub use header::{FileHeader, FormatVersion, VCDIFF_MAGIC, WindowHeader};
pub use instruction::Instruction;
pub use sink::{OutputSink, WriteSink};
pub use window::{Provenance, WindowPhase};
