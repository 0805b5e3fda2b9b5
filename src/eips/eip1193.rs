use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::evm::chains::NetworkDescriptor;
use crate::utils::num::{str_to_u64, u64_to_hex};

pub const USER_REJECTED_CODE: i64 = 4001;
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

/// Failure reported by the injected wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// 4001, the human declined the request
    Rejected,
    /// 4902, the wallet does not know the requested chain
    UnrecognizedChain,
    Other { code: i64, message: String },
}

impl ProviderError {
    pub fn from_code(code: i64, message: impl Into<String>) -> Self {
        match code {
            USER_REJECTED_CODE => ProviderError::Rejected,
            UNRECOGNIZED_CHAIN_CODE => ProviderError::UnrecognizedChain,
            _ => ProviderError::Other {
                code,
                message: message.into(),
            },
        }
    }

    /// Decodes a `{ code, message }` error object.
    pub fn from_value(value: &Value) -> Self {
        let code = value["code"].as_i64().unwrap_or(-1);
        let message = value["message"].as_str().unwrap_or("unknown").to_string();
        Self::from_code(code, message)
    }

    pub fn code(&self) -> i64 {
        match self {
            ProviderError::Rejected => USER_REJECTED_CODE,
            ProviderError::UnrecognizedChain => UNRECOGNIZED_CHAIN_CODE,
            ProviderError::Other { code, .. } => *code,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Rejected => write!(f, "user rejected the request"),
            ProviderError::UnrecognizedChain => write!(f, "unrecognized chain"),
            ProviderError::Other { code, message } => write!(f, "{} ({})", message, code),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Notifications pushed by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

impl ProviderEvent {
    /// `("accountsChanged", ["0x.."])` / `("chainChanged", "0x38")`
    pub fn from_json(event: &str, payload: &Value) -> Result<Self, AppError> {
        match event {
            "accountsChanged" => Ok(ProviderEvent::AccountsChanged(parse_accounts(payload)?)),
            "chainChanged" => Ok(ProviderEvent::ChainChanged(parse_chain_id(payload)?)),
            _ => Err(AppError::InvalidInput(format!("unsupported provider event: {}", event))),
        }
    }
}

/// The wallet capability a session is constructed with.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// May wait indefinitely on the human.
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    async fn chain_id(&self) -> Result<u64, ProviderError>;

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError>;

    async fn add_chain(&self, network: &NetworkDescriptor) -> Result<(), ProviderError>;

    /// Account and chain change notifications, in arrival order.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent>;
}

/// Raw `request({ method, params })` surface of an EIP-1193 provider.
#[async_trait]
pub trait Eip1193Transport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent>;
}

/// [`WalletProvider`] on top of a JSON-speaking injected provider.
pub struct InjectedProvider<T> {
    transport: T,
}

impl<T: Eip1193Transport> InjectedProvider<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: Eip1193Transport> WalletProvider for InjectedProvider<T> {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let result = self.transport.request("eth_requestAccounts", json!([])).await?;
        parse_accounts(&result).map_err(malformed)
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let result = self.transport.request("eth_chainId", json!([])).await?;
        parse_chain_id(&result).map_err(malformed)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        self.transport
            .request(
                "wallet_switchEthereumChain",
                json!([{ "chainId": u64_to_hex(chain_id) }]),
            )
            .await?;
        Ok(())
    }

    async fn add_chain(&self, network: &NetworkDescriptor) -> Result<(), ProviderError> {
        let params = network.add_chain_params().map_err(malformed)?;
        self.transport.request("wallet_addEthereumChain", params).await?;
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
        self.transport.subscribe()
    }
}

fn malformed(e: AppError) -> ProviderError {
    ProviderError::Other {
        code: -32603,
        message: e.to_string(),
    }
}

fn parse_accounts(value: &Value) -> Result<Vec<Address>, AppError> {
    let list = value
        .as_array()
        .ok_or(AppError::Parse("accounts must be an array"))?;
    list.iter()
        .map(|a| {
            a.as_str()
                .and_then(|s| Address::from_str(s).ok())
                .ok_or(AppError::InvalidAddress)
        })
        .collect()
}

fn parse_chain_id(value: &Value) -> Result<u64, AppError> {
    match value {
        Value::String(s) => str_to_u64(s),
        Value::Number(n) => n.as_u64().ok_or(AppError::InvalidNumber),
        _ => Err(AppError::Parse("chain id must be a string or number")),
    }
}
