use crate::database::{self, DbPool};
use crate::log_fetcher::LogWindowFetcher;
use crate::rpc_gateway::{HttpRpcGateway, RpcClient};
use crate::settings::Settings;
use crate::writer::IngestionWriter;
use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;

/// Everything a job needs, built once at startup and cloned into each job.
#[derive(Clone)]
pub struct IngestionContext {
    pub settings: Arc<Settings>,
    pub rpc: Arc<dyn RpcClient>,
    pub db: DbPool,
    pub fetcher: LogWindowFetcher,
    pub writer: IngestionWriter,
}

impl IngestionContext {
    pub fn new(settings: Settings, rpc: Arc<dyn RpcClient>, db: DbPool) -> Self {
        let fetcher = LogWindowFetcher::new(rpc.clone(), &settings.fetcher);
        let writer = IngestionWriter::new(db.clone());
        Self {
            settings: Arc::new(settings),
            rpc,
            db,
            fetcher,
            writer,
        }
    }

    /// Opens the store and the HTTP gateway, then checks the node answers `eth_blockNumber`.
    pub async fn connect(settings: Settings) -> Result<Self> {
        let db = database::connect(&settings.store.path)
            .await
            .with_context(|| format!("opening store {}", settings.store.path))?;

        let gateway = HttpRpcGateway::new(&settings.rpc.http_url, settings.rpc.request_timeout())
            .context("building RPC client")?;
        let head = gateway
            .block_number()
            .await
            .with_context(|| format!("RPC endpoint {} unreachable", settings.rpc.http_url))?;
        info!(
            "✅ [Context] Connected to {} (head {})",
            settings.rpc.http_url, head
        );

        Ok(Self::new(settings, Arc::new(gateway), db))
    }
}
