//! The record payload format: `{ value: bytes, offset: u64 }`, serialized
//! with `bincode` so it round-trips stably for the life of a log directory.
//! This is the payload that lives *inside* each store frame; the frame's
//! own 8-byte big-endian length prefix is handled by [`crate::store::Store`].

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub value: Vec<u8>,
    pub offset: u64,
}

impl Record {
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (record, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(record)
    }
}
