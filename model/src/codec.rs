//! Wire encoding of functions, arguments and results.
//!
//! Every value travels as a self-contained JSON blob, itself encoded in
//! base64 so that it can be embedded in the JSON bodies exchanged with the
//! frontend and the edge clusters.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::function::{FunctionLanguage, OffloadFunction};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to encode the value: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("The payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Failed to decode the payload: {0}")]
    Decode(#[source] serde_json::Error),
}

/// A function ready to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedFunction {
    pub language: FunctionLanguage,
    pub blob:     String,
    /// Content hash of `blob`, used to deduplicate uploads
    pub hash:     String,
}

pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<String, Error> {
    let blob = serde_json::to_vec(value).map_err(Error::Encode)?;
    Ok(base64::encode(blob))
}

pub fn deserialize<T: DeserializeOwned>(input: &str) -> Result<T, Error> {
    let blob = base64::decode(input)?;
    serde_json::from_slice(&blob).map_err(Error::Decode)
}

pub fn serialize_function(
    function: &OffloadFunction,
) -> Result<SerializedFunction, Error> {
    let blob = serialize(function)?;
    let hash = function_hash(&blob);
    Ok(SerializedFunction { language: function.language(), blob, hash })
}

/// Hex SHA-256 of a serialized function.
pub fn function_hash(blob: &str) -> String {
    format!("{:x}", Sha256::digest(blob.as_bytes()))
}
