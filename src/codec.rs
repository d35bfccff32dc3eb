//! Binary payload codec.
//!
//! Requests and responses are Avro binary datums (no container header)
//! written against the record schemas in [`crate::schema`]. Each call encodes
//! into its own buffer; nothing is cached between calls, so concurrent
//! requests never share scratch state.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::schema::AvroRecord;
use crate::Result;

/// Content type stamped on every envelope this crate publishes.
pub const CONTENT_TYPE: &str = "avro/binary";

/// Encode a record into a fresh payload buffer.
pub fn encode<T>(value: &T) -> Result<Bytes>
where
    T: Serialize + AvroRecord,
{
    // ---
    let schema = T::schema()?;
    let value = apache_avro::to_value(value)?.resolve(&schema)?;
    let buf = apache_avro::to_avro_datum(&schema, value)?;
    Ok(Bytes::from(buf))
}

/// Decode a record from a payload.
pub fn decode<T>(payload: &[u8]) -> Result<T>
where
    T: DeserializeOwned + AvroRecord,
{
    // ---
    let schema = T::schema()?;
    let mut reader = payload;
    let value = apache_avro::from_avro_datum(&schema, &mut reader, None)?;
    Ok(apache_avro::from_value(&value)?)
}
