//! Binary encoding/decoding.
//!
//! - [`primitives`]: the [`Streamer`] shared by both codecs
//! - [`row`]: tagged records with schema evolution
//! - [`slim`]: object graphs with shared and cyclic references
//! - [`frame`]: magic/version framing with optional zstd compression

pub mod frame;
pub mod primitives;
pub mod registry;
pub mod row;
pub mod slim;

mod refs;

pub use frame::PayloadKind;
pub use primitives::{decode_from_slice, encode_to_vec, zigzag_decode, zigzag_encode, Bound, Streamer};
pub use registry::{RegistryMode, TypeRegistry};
pub use row::{decode_document, deserialize, deserialize_into, encode_document, from_bytes, serialize, to_bytes};
pub use slim::{BatchSession, SlimOptions, SlimSerializer};
