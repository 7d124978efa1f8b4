//! Oxipatch: streaming VCDIFF (RFC 3284) delta decoding in Rust.
//!
//! The crate provides:
//! - A chunked VCDIFF decoder, including the SDCH interleaved layout and
//!   custom code tables (`vcdiff`)
//! - Reader/writer and file helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use oxipatch::vcdiff::{self, StreamingDecoder};
//!
//! let dictionary = b"hello";
//! // Header, then one window copying "ello" out of the dictionary.
//! let delta = [
//!     0xD6, 0xC3, 0xC4, 0x00, 0x00,
//!     0x01, 0x05, 0x00, 0x07, 0x04, 0x00, 0x00, 0x01, 0x01, 0x14, 0x01,
//! ];
//!
//! // All at once.
//! assert_eq!(vcdiff::decode(dictionary, &delta).unwrap(), b"ello");
//!
//! // Or as the bytes arrive.
//! let mut decoder = StreamingDecoder::new();
//! let mut target = Vec::new();
//! decoder.start_decoding(dictionary).unwrap();
//! for chunk in delta.chunks(4) {
//!     decoder.decode_chunk(chunk, &mut target).unwrap();
//! }
//! decoder.finish_decoding().unwrap();
//! assert_eq!(target, b"ello");
//! ```

pub mod io;
pub mod vcdiff;

#[cfg(feature = "cli")]
pub mod cli;
