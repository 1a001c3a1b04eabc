use chrono::{DateTime, TimeZone, Utc};
use ethers::types::{Address, H256, I256, U256};

/// Size of an ABI word and of an indexed topic.
pub const WORD_SIZE: usize = 32;

// Columnas de texto: siempre hex completo en minúsculas
pub fn address_to_string(addr: Address) -> String {
    format!("{:?}", addr).to_lowercase()
}

pub fn hash_to_string(hash: H256) -> String {
    format!("{:?}", hash).to_lowercase()
}

/// Address stored in the low 20 bytes of an indexed topic.
pub fn topic_to_address(topic: &H256) -> Address {
    Address::from_slice(&topic.as_bytes()[WORD_SIZE - 20..])
}

/// Big-endian word `index` of an ABI payload, `None` when the payload is too short.
pub fn word_at(data: &[u8], index: usize) -> Option<U256> {
    let start = index.checked_mul(WORD_SIZE)?;
    let end = start.checked_add(WORD_SIZE)?;
    data.get(start..end).map(U256::from_big_endian)
}

/// Two's complement reinterpretation of an `int256` ABI word.
pub fn word_to_i256(word: U256) -> I256 {
    I256::from_raw(word)
}

/// Unsigned amount as a signed one, saturating at `I256::MAX`.
pub fn u256_to_i256_saturating(value: U256) -> I256 {
    I256::try_from(value).unwrap_or(I256::MAX)
}

pub fn timestamp_from_unix(secs: u64) -> Result<DateTime<Utc>, ConversionError> {
    let secs = i64::try_from(secs).map_err(|_| ConversionError::Overflow)?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(ConversionError::InvalidTimestamp(secs))
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Overflow in conversion")]
    Overflow,
    #[error("Invalid block range: from {from_block} > to {to_block}")]
    InvalidRange { from_block: u64, to_block: u64 },
    #[error("Log is missing field {0}")]
    MissingField(&'static str),
    #[error("Log was removed by a reorg")]
    RemovedLog,
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}
