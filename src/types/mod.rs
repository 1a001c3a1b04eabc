//! Shared data model: block ranges, raw logs and the closed set of decoded events.

pub mod conversions;
pub mod events;

pub use events::{
    BlockHead, BlockRange, DecodedEvent, Dex, PoolCreatedEvent, RawLog, SwapEvent, TransferEvent,
};
