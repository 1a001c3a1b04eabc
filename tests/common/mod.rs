//! JSON-level stub chain shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chain_ingestor::context::IngestionContext;
use chain_ingestor::database::{self, DbPool};
use chain_ingestor::decoder::{TRANSFER_TOPIC, V2_PAIR_CREATED_TOPIC, V3_SWAP_TOPIC};
use chain_ingestor::rpc_gateway::{RpcClient, RpcError};
use chain_ingestor::settings::Settings;
use ethers::types::{Address, Bytes, H256, I256, U256, U64};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub const GENESIS_TS: u64 = 1_700_000_000;
pub const BLOCK_TIME: u64 = 12;

/// Block time the stub reports for block `n`.
pub fn block_ts(n: u64) -> i64 {
    (GENESIS_TS + n * BLOCK_TIME) as i64
}

#[derive(Debug, Clone)]
pub struct StubLog {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Vec<u8>,
    pub block: u64,
    pub log_index: u64,
}

pub struct StubChain {
    pub head: u64,
    pub logs: Vec<StubLog>,
    /// `eth_getLogs` windows containing one of these blocks fail with a provider error.
    pub fail_blocks: HashSet<u64>,
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl StubChain {
    pub fn new(head: u64) -> Self {
        Self {
            head,
            logs: Vec::new(),
            fail_blocks: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_log(mut self, log: StubLog) -> Self {
        self.logs.push(log);
        self
    }

    pub fn failing_at(mut self, block: u64) -> Self {
        self.fail_blocks.insert(block);
        self
    }

    /// `(fromBlock, toBlock)` of every `eth_getLogs` call, in call order.
    pub fn log_windows(&self) -> Vec<(u64, u64)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == "eth_getLogs")
            .map(|(_, p)| (hex_u64(&p[0]["fromBlock"]), hex_u64(&p[0]["toBlock"])))
            .collect()
    }

    pub fn count_calls(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    fn get_logs(&self, params: &Value) -> Result<Value, RpcError> {
        let from = hex_u64(&params[0]["fromBlock"]);
        let to = hex_u64(&params[0]["toBlock"]);
        if self.fail_blocks.iter().any(|b| (from..=to).contains(b)) {
            return Err(RpcError::Provider {
                code: -32000,
                message: "internal error".to_string(),
            });
        }

        let wanted = topic0_set(&params[0]["topics"]);
        let logs: Vec<Value> = self
            .logs
            .iter()
            .filter(|l| (from..=to).contains(&l.block))
            .filter(|l| match (&wanted, l.topics.first()) {
                (Some(set), Some(t0)) => set.contains(t0),
                (Some(_), None) => false,
                (None, _) => true,
            })
            .map(log_json)
            .collect();
        Ok(Value::Array(logs))
    }
}

#[async_trait]
impl RpcClient for StubChain {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));
        match method {
            "eth_blockNumber" => Ok(json!(format!("{:#x}", self.head))),
            "eth_getBlockByNumber" => {
                let n = hex_u64(&params[0]);
                if n > self.head {
                    return Ok(Value::Null);
                }
                Ok(json!({
                    "number": format!("{:#x}", n),
                    "timestamp": format!("{:#x}", block_ts(n)),
                    "hash": format!("{:?}", H256::from_low_u64_be(n)),
                }))
            }
            "eth_getLogs" => self.get_logs(&params),
            other => Err(RpcError::Provider {
                code: -32601,
                message: format!("method {} not found", other),
            }),
        }
    }
}

fn hex_u64(value: &Value) -> u64 {
    serde_json::from_value::<U64>(value.clone())
        .expect("hex quantity")
        .as_u64()
}

fn topic0_set(topics: &Value) -> Option<HashSet<H256>> {
    let first = topics.get(0)?;
    let values: Vec<Value> = match first {
        Value::Array(items) => items.clone(),
        Value::Null => return None,
        single => vec![single.clone()],
    };
    Some(
        values
            .into_iter()
            .map(|v| serde_json::from_value::<H256>(v).expect("topic hash"))
            .collect(),
    )
}

fn log_json(log: &StubLog) -> Value {
    json!({
        "address": format!("{:?}", log.address),
        "topics": log.topics.iter().map(|t| format!("{:?}", t)).collect::<Vec<_>>(),
        "data": serde_json::to_value(Bytes::from(log.data.clone())).unwrap(),
        "blockNumber": format!("{:#x}", log.block),
        "blockHash": format!("{:?}", H256::from_low_u64_be(log.block)),
        "transactionHash": format!("{:?}", tx_hash(log.block, log.log_index)),
        "logIndex": format!("{:#x}", log.log_index),
        "removed": false,
    })
}

pub fn tx_hash(block: u64, log_index: u64) -> H256 {
    H256::from_low_u64_be(block * 1_000 + log_index)
}

fn word(value: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf
}

pub fn transfer_log(block: u64, log_index: u64, token: Address, value: u64) -> StubLog {
    StubLog {
        address: token,
        topics: vec![
            *TRANSFER_TOPIC,
            H256::from(Address::repeat_byte(0xaa)),
            H256::from(Address::repeat_byte(0xbb)),
        ],
        data: word(U256::from(value)).to_vec(),
        block,
        log_index,
    }
}

pub fn pair_created_log(block: u64, log_index: u64, pair: Address) -> StubLog {
    let mut data = H256::from(pair).as_bytes().to_vec();
    data.extend_from_slice(&word(U256::from(1)));
    StubLog {
        address: Address::repeat_byte(0xfa),
        topics: vec![
            *V2_PAIR_CREATED_TOPIC,
            H256::from(Address::repeat_byte(0x01)),
            H256::from(Address::repeat_byte(0x02)),
        ],
        data,
        block,
        log_index,
    }
}

pub fn v3_swap_log(block: u64, log_index: u64, pool: Address, amount0: i64, amount1: i64) -> StubLog {
    let mut data = word(I256::from(amount0).into_raw()).to_vec();
    data.extend_from_slice(&word(I256::from(amount1).into_raw()));
    data.extend_from_slice(&[0u8; 96]);
    StubLog {
        address: pool,
        topics: vec![
            *V3_SWAP_TOPIC,
            H256::from(Address::repeat_byte(0x0c)),
            H256::from(Address::repeat_byte(0x0d)),
        ],
        data,
        block,
        log_index,
    }
}

/// Settings sized for small test chains.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.backfill.blocks_per_day = 100;
    settings.backfill.batch_blocks = 50;
    settings.fetcher.chunk_span = 500;
    settings.tail.max_catch_up_blocks = 8;
    settings
}

pub async fn context(chain: Arc<StubChain>, settings: Settings) -> (IngestionContext, DbPool) {
    let db = database::connect_in_memory().await.expect("in-memory store");
    let ctx = IngestionContext::new(settings, chain, db.clone());
    (ctx, db)
}
