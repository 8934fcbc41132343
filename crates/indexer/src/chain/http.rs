//! JSON-RPC 2.0 over HTTP.

use super::{ChainClient, HeightMeta, RawBlock, RawEvent, RawPerformance, RawStaking, RpcError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub struct HttpChainClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpChainClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn http_json_rpc(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        let resp = self.client.post(&self.url).json(&body).send().await?;
        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(RpcError::Rpc {
                code: status.as_u16() as i64,
                message: format!("http status {status}"),
            });
        }
        let json: Value = resp.json().await?;
        if let Some(err) = json.get("error") {
            return Err(RpcError::Rpc {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        json.get("result")
            .cloned()
            .ok_or_else(|| RpcError::Decode(format!("{method}: missing result")))
    }

    /// Call a per-height method. A `null` result means the proxy does not have the height.
    async fn by_height<T: DeserializeOwned>(&self, method: &str, height: u64) -> Result<T, RpcError> {
        let result = self.http_json_rpc(method, json!([height])).await?;
        if result.is_null() {
            return Err(RpcError::NotFound(height));
        }
        serde_json::from_value(result).map_err(|e| RpcError::Decode(format!("{method}: {e}")))
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn head(&self) -> Result<HeightMeta, RpcError> {
        let result = self.http_json_rpc("chain_getHead", json!([])).await?;
        serde_json::from_value(result).map_err(|e| RpcError::Decode(format!("chain_getHead: {e}")))
    }

    async fn height_meta(&self, height: u64) -> Result<HeightMeta, RpcError> {
        self.by_height("chain_getMetaByHeight", height).await
    }

    async fn block(&self, height: u64) -> Result<RawBlock, RpcError> {
        self.by_height("chain_getBlockByHeight", height).await
    }

    async fn staking(&self, height: u64) -> Result<RawStaking, RpcError> {
        self.by_height("staking_getByHeight", height).await
    }

    async fn validator_performance(&self, height: u64) -> Result<RawPerformance, RpcError> {
        self.by_height("validatorPerformance_getByHeight", height).await
    }

    async fn events(&self, height: u64) -> Result<Vec<RawEvent>, RpcError> {
        self.by_height("event_getByHeight", height).await
    }
}
