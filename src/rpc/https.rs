use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::rpc::client::{ChainClient, TxReceipt, TxRequest};
use crate::utils::num::{str_to_u256, str_to_u64};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    EthBlockNumber,
    EthGetBalance,
    EthCall,
    EthChainId,
    EthSendTransaction,
    EthGetTransactionReceipt,
    Custom(&'static str),
}

impl RpcMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EthBlockNumber => "eth_blockNumber",
            Self::EthGetBalance => "eth_getBalance",
            Self::EthCall => "eth_call",
            Self::EthChainId => "eth_chainId",
            Self::EthSendTransaction => "eth_sendTransaction",
            Self::EthGetTransactionReceipt => "eth_getTransactionReceipt",
            Self::Custom(s) => s,
        }
    }
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// JSON-RPC over HTTPS.
pub struct EthRpcProvider {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl EthRpcProvider {
    pub fn new(url: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(10)
            .http2_keep_alive_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| {
                AppError::HttpsRpcError(format!("Failed to build reqwest client: {}", e))
            })?;

        Ok(Self {
            client,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn request(&self, method: RpcMethod, params: impl Serialize) -> Result<Value, AppError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method.as_str(),
            "params": params
        });
        log::debug!("rpc {} #{} -> {}", method.as_str(), id, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::HttpsRpcError(format!("Request failed: {}", e)))?;

        let json: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| AppError::HttpsRpcError(format!("Invalid JSON response: {}", e)))?;

        into_result(json)
    }

    pub async fn chain_id(&self) -> Result<u64, AppError> {
        let result = self.request(RpcMethod::EthChainId, json!([])).await?;
        hex_u64(&result, "chain id")
    }
}

fn into_result(response: JsonRpcResponse) -> Result<Value, AppError> {
    if let Some(err) = response.error {
        return Err(AppError::RpcError(format!(
            "RPC Error {}: {}",
            err.code, err.message
        )));
    }
    response
        .result
        .ok_or_else(|| AppError::HttpsRpcError("No result in response".into()))
}

fn hex_str<'a>(value: &'a Value, what: &'static str) -> Result<&'a str, AppError> {
    value.as_str().ok_or_else(|| {
        AppError::HttpsRpcError(format!("Failed to parse {}", what))
    })
}

fn hex_u64(value: &Value, what: &'static str) -> Result<u64, AppError> {
    str_to_u64(hex_str(value, what)?)
}

fn parse_receipt(value: Value) -> Result<Option<TxReceipt>, AppError> {
    if value.is_null() {
        return Ok(None);
    }
    let hash = B256::from_str(hex_str(&value["transactionHash"], "transaction hash")?)
        .map_err(|_| AppError::HttpsRpcError("Invalid transaction hash".into()))?;
    let block_number = match &value["blockNumber"] {
        Value::Null => None,
        v => Some(hex_u64(v, "block number")?),
    };
    // pre-Byzantium receipts carry no status; treat them as successful
    let status = match &value["status"] {
        Value::Null => true,
        v => hex_u64(v, "receipt status")? == 1,
    };
    Ok(Some(TxReceipt {
        transaction_hash: hash,
        block_number,
        status,
    }))
}

#[async_trait]
impl ChainClient for EthRpcProvider {
    async fn get_balance(&self, address: Address) -> Result<U256, AppError> {
        let result = self
            .request(RpcMethod::EthGetBalance, json!([address, "latest"]))
            .await?;
        str_to_u256(hex_str(&result, "balance")?)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, AppError> {
        let result = self
            .request(RpcMethod::EthCall, json!([{ "to": to, "data": data }, "latest"]))
            .await?;
        let raw = hex_str(&result, "call output")?;
        let bytes = hex::decode(raw.trim_start_matches("0x"))
            .map_err(|_| AppError::HttpsRpcError("Invalid hex call output".into()))?;
        Ok(Bytes::from(bytes))
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<B256, AppError> {
        let result = self
            .request(
                RpcMethod::EthSendTransaction,
                json!([{
                    "from": tx.from,
                    "to": tx.to,
                    "value": format!("{:#x}", tx.value),
                    "data": tx.data,
                }]),
            )
            .await?;
        B256::from_str(hex_str(&result, "transaction hash")?)
            .map_err(|_| AppError::HttpsRpcError("Invalid transaction hash".into()))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, AppError> {
        let result = self
            .request(RpcMethod::EthGetTransactionReceipt, json!([hash]))
            .await?;
        parse_receipt(result)
    }

    async fn block_number(&self) -> Result<u64, AppError> {
        let result = self.request(RpcMethod::EthBlockNumber, json!([])).await?;
        hex_u64(&result, "block number")
    }
}
