//! Binary row/schema serialization.

pub mod codec;
pub mod error;
pub mod value;

pub use codec::{calculate_row_size, decode_row, decode_rows_block, encode_row, encode_rows_block};
pub use error::EncodeError;
pub use value::{Row, Value};

/// Serializes a [`relix_schema::Schema`] to bytes. JSON keeps this legible
/// on disk and reuses the `serde` derives already on `Schema`.
pub fn encode_schema(schema: &relix_schema::Schema) -> Vec<u8> {
    serde_json::to_vec(schema).expect("Schema serialization is infallible")
}

/// Deserializes a schema previously written by [`encode_schema`].
pub fn decode_schema(bytes: &[u8]) -> Result<relix_schema::Schema, serde_json::Error> {
    serde_json::from_slice(bytes)
}
