//! # Event Decoder
//!
//! Classifies a [`RawLog`] by `topics[0]` and decodes it into a [`DecodedEvent`].
//!
//! Decoding is total: a short payload or a missing topic yields zero values plus a
//! [`DecodeError`] describing what was defaulted, never an `Err`. Callers log those
//! as data-quality warnings.

use crate::types::conversions::{
    topic_to_address, u256_to_i256_saturating, word_at, word_to_i256, WORD_SIZE,
};
use crate::types::{DecodedEvent, Dex, PoolCreatedEvent, RawLog, SwapEvent, TransferEvent};
use chrono::{DateTime, Utc};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use once_cell::sync::Lazy;

/// Uniswap V2 pairs all charge 0.30%, expressed in V3 fee units.
pub const V2_FEE_TIER: u32 = 3_000;

pub static TRANSFER_TOPIC: Lazy<H256> =
    Lazy::new(|| H256::from(keccak256("Transfer(address,address,uint256)")));
pub static V2_PAIR_CREATED_TOPIC: Lazy<H256> =
    Lazy::new(|| H256::from(keccak256("PairCreated(address,address,address,uint256)")));
pub static V3_POOL_CREATED_TOPIC: Lazy<H256> =
    Lazy::new(|| H256::from(keccak256("PoolCreated(address,address,uint24,int24,address)")));
pub static V2_SWAP_TOPIC: Lazy<H256> = Lazy::new(|| {
    H256::from(keccak256(
        "Swap(address,uint256,uint256,uint256,uint256,address)",
    ))
});
pub static V3_SWAP_TOPIC: Lazy<H256> = Lazy::new(|| {
    H256::from(keccak256(
        "Swap(address,address,int256,int256,uint160,uint128,int24)",
    ))
});

/// Closed set of signatures the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Erc20Transfer,
    V2PairCreated,
    V3PoolCreated,
    V2Swap,
    V3Swap,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Erc20Transfer,
        EventKind::V2PairCreated,
        EventKind::V3PoolCreated,
        EventKind::V2Swap,
        EventKind::V3Swap,
    ];

    pub fn topic(&self) -> H256 {
        match self {
            EventKind::Erc20Transfer => *TRANSFER_TOPIC,
            EventKind::V2PairCreated => *V2_PAIR_CREATED_TOPIC,
            EventKind::V3PoolCreated => *V3_POOL_CREATED_TOPIC,
            EventKind::V2Swap => *V2_SWAP_TOPIC,
            EventKind::V3Swap => *V3_SWAP_TOPIC,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Erc20Transfer => "Transfer",
            EventKind::V2PairCreated => "PairCreated",
            EventKind::V3PoolCreated => "PoolCreated",
            EventKind::V2Swap => "SwapV2",
            EventKind::V3Swap => "SwapV3",
        }
    }

    pub fn classify(topic0: &H256) -> Option<EventKind> {
        Self::ALL.into_iter().find(|kind| kind.topic() == *topic0)
    }
}

/// topic0 filter for ERC-20 transfers
pub fn transfer_topics() -> Vec<H256> {
    vec![*TRANSFER_TOPIC]
}

/// topic0 filter for V2 and V3 pool creation
pub fn pool_creation_topics() -> Vec<H256> {
    vec![*V2_PAIR_CREATED_TOPIC, *V3_POOL_CREATED_TOPIC]
}

/// topic0 filter for V2 and V3 swaps
pub fn swap_topics() -> Vec<H256> {
    vec![*V2_SWAP_TOPIC, *V3_SWAP_TOPIC]
}

/// A field that was defaulted while decoding. Reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{event}: topic {index} missing (log has {available} topics)")]
    MissingTopic {
        event: &'static str,
        index: usize,
        available: usize,
    },
    #[error("{event}: field {field} needs {needed} data bytes, payload has {available}")]
    ShortData {
        event: &'static str,
        field: &'static str,
        needed: usize,
        available: usize,
    },
}

/// Reads topics and data words, defaulting and recording anything missing.
struct FieldReader<'a> {
    log: &'a RawLog,
    event: &'static str,
    issues: Vec<DecodeError>,
}

impl<'a> FieldReader<'a> {
    fn new(log: &'a RawLog, kind: EventKind) -> Self {
        Self {
            log,
            event: kind.name(),
            issues: Vec::new(),
        }
    }

    fn topic(&mut self, index: usize) -> Option<&'a H256> {
        let topic = self.log.topics.get(index);
        if topic.is_none() {
            self.issues.push(DecodeError::MissingTopic {
                event: self.event,
                index,
                available: self.log.topics.len(),
            });
        }
        topic
    }

    fn topic_address(&mut self, index: usize) -> Address {
        self.topic(index).map(topic_to_address).unwrap_or_default()
    }

    fn topic_word(&mut self, index: usize) -> U256 {
        self.topic(index)
            .map(|t| U256::from_big_endian(t.as_bytes()))
            .unwrap_or_default()
    }

    fn word(&mut self, index: usize, field: &'static str) -> U256 {
        match word_at(self.log.data.as_ref(), index) {
            Some(word) => word,
            None => {
                self.issues.push(DecodeError::ShortData {
                    event: self.event,
                    field,
                    needed: (index + 1) * WORD_SIZE,
                    available: self.log.data.len(),
                });
                U256::zero()
            }
        }
    }

    fn word_address(&mut self, index: usize, field: &'static str) -> Address {
        let word = self.word(index, field);
        let mut buf = [0u8; WORD_SIZE];
        word.to_big_endian(&mut buf);
        Address::from_slice(&buf[WORD_SIZE - 20..])
    }
}

/// Decodes a log, discarding the list of defaulted fields.
pub fn decode(log: &RawLog, timestamp: DateTime<Utc>) -> DecodedEvent {
    decode_with_issues(log, timestamp).0
}

/// Decodes a log and reports every field that had to be defaulted.
pub fn decode_with_issues(
    log: &RawLog,
    timestamp: DateTime<Utc>,
) -> (DecodedEvent, Vec<DecodeError>) {
    let Some(kind) = log.topics.first().and_then(EventKind::classify) else {
        return (DecodedEvent::Unrecognized, Vec::new());
    };

    let mut r = FieldReader::new(log, kind);
    let event = match kind {
        EventKind::Erc20Transfer => DecodedEvent::Transfer(TransferEvent {
            token: log.address,
            from: r.topic_address(1),
            to: r.topic_address(2),
            value: r.word(0, "value"),
            block: log.block_number,
            timestamp,
            tx_hash: log.tx_hash,
            log_index: log.log_index,
        }),
        EventKind::V2PairCreated => DecodedEvent::PoolCreated(PoolCreatedEvent {
            dex: Dex::UniswapV2,
            token0: r.topic_address(1),
            token1: r.topic_address(2),
            pool: r.word_address(0, "pair"),
            fee_tier: V2_FEE_TIER,
            first_block: log.block_number,
            first_timestamp: timestamp,
        }),
        EventKind::V3PoolCreated => {
            let token0 = r.topic_address(1);
            let token1 = r.topic_address(2);
            // uint24
            let fee_tier = r.topic_word(3).low_u32() & 0x00FF_FFFF;
            // word 0 is tickSpacing
            let pool = r.word_address(1, "pool");
            DecodedEvent::PoolCreated(PoolCreatedEvent {
                dex: Dex::UniswapV3,
                pool,
                token0,
                token1,
                fee_tier,
                first_block: log.block_number,
                first_timestamp: timestamp,
            })
        }
        EventKind::V2Swap => {
            let sender = r.topic_address(1);
            let recipient = r.topic_address(2);
            let amount0_in = r.word(0, "amount0In");
            let amount1_in = r.word(1, "amount1In");
            let amount0_out = r.word(2, "amount0Out");
            let amount1_out = r.word(3, "amount1Out");
            DecodedEvent::Swap(SwapEvent {
                pool: log.address,
                dex: Dex::UniswapV2,
                sender,
                recipient,
                amount0: u256_to_i256_saturating(amount0_in)
                    .saturating_sub(u256_to_i256_saturating(amount0_out)),
                amount1: u256_to_i256_saturating(amount1_in)
                    .saturating_sub(u256_to_i256_saturating(amount1_out)),
                block: log.block_number,
                timestamp,
                tx_hash: log.tx_hash,
                log_index: log.log_index,
            })
        }
        EventKind::V3Swap => DecodedEvent::Swap(SwapEvent {
            pool: log.address,
            dex: Dex::UniswapV3,
            sender: r.topic_address(1),
            recipient: r.topic_address(2),
            amount0: word_to_i256(r.word(0, "amount0")),
            amount1: word_to_i256(r.word(1, "amount1")),
            block: log.block_number,
            timestamp,
            tx_hash: log.tx_hash,
            log_index: log.log_index,
        }),
    };

    (event, r.issues)
}
