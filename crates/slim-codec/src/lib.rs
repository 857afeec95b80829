//! Slim: compact binary codecs for tagged records and object graphs.
//!
//! This crate provides two codecs over one primitive streamer:
//!
//! - **Row codec**: records whose fields are identified by stable string
//!   tags, so producer and consumer schemas can evolve independently.
//!   Unknown tags are captured into an amorphous store or dropped.
//! - **Graph codec**: arbitrary object graphs with shared and cyclic
//!   references, using a type registry scoped to one call or to a batch
//!   session.
//!
//! # Quick Start
//!
//! ```rust
//! use slim_codec::model::{Row, SchemaBuilder};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Track {
//!     title: String,
//!     plays: u32,
//!     rating: Option<f32>,
//! }
//!
//! impl Row for Track {
//!     fn describe(schema: &mut SchemaBuilder<Self>) {
//!         schema
//!             .scalar("t", "title", |r| &r.title, |r| &mut r.title)
//!             .scalar("p", "plays", |r| &r.plays, |r| &mut r.plays)
//!             .nullable("r", "rating", |r| &r.rating, |r| &mut r.rating);
//!     }
//! }
//!
//! let track = Track { title: "Intro".into(), plays: 12, rating: None };
//! let bytes = slim_codec::encode_row(&track).unwrap();
//! let back: Track = slim_codec::decode_row(&bytes).unwrap();
//! assert_eq!(back, track);
//! ```
//!
//! # Modules
//!
//! - [`model`]: Values, row schemas, graphs and graph types
//! - [`codec`]: Streamer, row codec, graph codec and framing
//! - [`util`]: N-dimensional arrays and row-major traversal
//! - [`validate`]: Schema validation
//! - [`error`]: Error types
//! - [`limits`]: Security limits for decoding
//!
//! # Security
//!
//! Decoders treat their input as untrusted:
//! - Lengths, counts, ranks and depths are bounded before allocating
//! - Varints are limited to 10 bytes
//! - Invalid data is rejected with descriptive, coded errors
//!
//! # Wire Format
//!
//! Payloads may be framed for storage:
//! - Uncompressed: `SLIM` magic + version + kind + payload
//! - Compressed: `SLIMZ` magic + version + kind + uncompressed size + zstd data
//!
//! The frame decoder detects both forms.

pub mod codec;
pub mod error;
pub mod limits;
pub mod model;
pub mod util;
pub mod validate;

use codec::frame::{self, PayloadKind};
use codec::primitives::decode_from_slice;

// Re-export commonly used types at crate root
pub use codec::{BatchSession, SlimOptions, SlimSerializer, Streamer};
pub use error::{DecodeError, EncodeError, ErrorCode, SchemaError, StreamError};
pub use model::{
    AmorphousStore, Decimal, Graph, Node, NodeId, RecordValue, Row, RowEnum, SchemaBuilder, Slot,
    TypeCatalog, TypeDef, Value, WireType,
};
pub use util::NdArray;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Encodes a row inside a plain `SLIM` frame.
pub fn encode_row<R: Row>(row: &R) -> Result<Vec<u8>, EncodeError> {
    frame::wrap(PayloadKind::Row, &codec::row::to_bytes(row)?)
}

/// Encodes a row inside a zstd-compressed `SLIMZ` frame.
pub fn encode_row_compressed<R: Row>(row: &R, level: i32) -> Result<Vec<u8>, EncodeError> {
    frame::wrap_compressed(PayloadKind::Row, &codec::row::to_bytes(row)?, level)
}

/// Decodes a framed row into a default instance of `R`.
pub fn decode_row<R: Row>(bytes: &[u8]) -> Result<R, DecodeError> {
    let mut row = R::default();
    decode_row_into(&mut row, bytes)?;
    Ok(row)
}

/// Decodes a framed row into an existing instance, replacing its previous
/// contents.
pub fn decode_row_into<R: Row>(target: &mut R, bytes: &[u8]) -> Result<(), DecodeError> {
    let payload = frame::unwrap(PayloadKind::Row, bytes)?;
    codec::row::deserialize_into(target, &payload)
}

/// Decodes a framed row without a schema.
pub fn inspect_row(bytes: &[u8]) -> Result<RecordValue, DecodeError> {
    let payload = frame::unwrap(PayloadKind::Row, bytes)?;
    decode_from_slice(&payload, codec::row::decode_document)
}
