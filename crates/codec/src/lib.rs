//! East codecs: Beast2 binary and self-describing JSON
//!
//! Type-directed encoders and decoders. A codec is produced for a type;
//! the wire never describes itself beyond what sum types require. Both
//! codecs round-trip every value — including IR trees, and therefore
//! compiled functions, which are validated against the receiver's
//! platform table as they decode.
//!
//! The binary form is canonical for transport; the JSON form is the
//! stable tooling schema (see `ir_codec` for the IR spelling).

pub mod binary;
pub mod ir_codec;
pub mod json;
pub mod leb128;

pub use binary::BinaryCodec;
pub use ir_codec::{
    decode_expr, encode_expr, expr_from_json, expr_to_json, type_from_json, type_to_json,
};
pub use json::JsonCodec;
pub use leb128::ByteReader;
