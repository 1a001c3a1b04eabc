use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, Log, H256, I256, U256};
use std::fmt;

use crate::types::conversions::ConversionError;

/// Inclusive block range, `from_block <= to_block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRange {
    pub from_block: u64,
    pub to_block: u64,
}

impl BlockRange {
    pub fn new(from_block: u64, to_block: u64) -> Result<Self, ConversionError> {
        if from_block > to_block {
            return Err(ConversionError::InvalidRange {
                from_block,
                to_block,
            });
        }
        Ok(Self {
            from_block,
            to_block,
        })
    }

    /// A range covering exactly one block.
    pub fn single(block: u64) -> Self {
        Self {
            from_block: block,
            to_block: block,
        }
    }

    /// Number of blocks in the range (never zero).
    pub fn len(&self) -> u64 {
        self.to_block - self.from_block + 1
    }

    pub fn contains(&self, block: u64) -> bool {
        block >= self.from_block && block <= self.to_block
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from_block, self.to_block)
    }
}

/// New chain head as announced by the streaming endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHead {
    pub number: u64,
    pub timestamp: DateTime<Utc>,
}

/// Log as returned by `eth_getLogs`, reduced to what the decoder needs.
/// Lives only between a fetch and the matching decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub block_number: u64,
    pub tx_hash: H256,
    pub log_index: u64,
}

impl TryFrom<Log> for RawLog {
    type Error = ConversionError;

    fn try_from(log: Log) -> Result<Self, Self::Error> {
        if log.removed == Some(true) {
            return Err(ConversionError::RemovedLog);
        }
        let block_number = log
            .block_number
            .ok_or(ConversionError::MissingField("blockNumber"))?
            .as_u64();
        let tx_hash = log
            .transaction_hash
            .ok_or(ConversionError::MissingField("transactionHash"))?;
        let log_index = log
            .log_index
            .ok_or(ConversionError::MissingField("logIndex"))?;
        if log_index > U256::from(u64::MAX) {
            return Err(ConversionError::Overflow);
        }

        Ok(Self {
            address: log.address,
            topics: log.topics,
            data: log.data,
            block_number,
            tx_hash,
            log_index: log_index.as_u64(),
        })
    }
}

/// AMM family a pool or swap belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dex {
    UniswapV2,
    UniswapV3,
}

impl Dex {
    /// Value stored in the `dex` columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dex::UniswapV2 => "uniswap_v2",
            Dex::UniswapV3 => "uniswap_v3",
        }
    }
}

impl fmt::Display for Dex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub block: u64,
    pub timestamp: DateTime<Utc>,
    pub tx_hash: H256,
    pub log_index: u64,
}

/// Pool creation observed on a factory. `(dex, pool)` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCreatedEvent {
    pub dex: Dex,
    pub pool: Address,
    pub token0: Address,
    pub token1: Address,
    /// Fee in hundredths of a basis point (3000 = 0.30%).
    pub fee_tier: u32,
    pub first_block: u64,
    pub first_timestamp: DateTime<Utc>,
}

/// Swap on a pool. Amounts are signed net flows into the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapEvent {
    pub pool: Address,
    pub dex: Dex,
    pub sender: Address,
    pub recipient: Address,
    pub amount0: I256,
    pub amount1: I256,
    pub block: u64,
    pub timestamp: DateTime<Utc>,
    pub tx_hash: H256,
    pub log_index: u64,
}

/// Every log decodes into exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    Transfer(TransferEvent),
    PoolCreated(PoolCreatedEvent),
    Swap(SwapEvent),
    Unrecognized,
}

impl DecodedEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DecodedEvent::Transfer(_) => "transfer",
            DecodedEvent::PoolCreated(_) => "pool_created",
            DecodedEvent::Swap(_) => "swap",
            DecodedEvent::Unrecognized => "unrecognized",
        }
    }
}
