use core::fmt;

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::eips::eip1193::ProviderError;

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    Parse(&'static str),
    JsonParseError(serde_json::Error),
    InvalidNumber,
    InvalidAddress,
    InvalidInput(String),

    // wallet provider
    ProviderMissing,
    NoAccount,
    UserRejected,
    RequestTimeout(&'static str),
    ChainUnavailable(String),

    // session
    NotConnected,
    WrongNetwork { expected: u64, actual: Option<u64> },
    InsufficientFunds { symbol: String, available: String, requested: String },
    ApprovalRaceLost,
    SessionChanged,

    // chain rpc
    RpcError(String),
    HttpsRpcError(String),
    AbiDecode(alloy_sol_types::Error),
    TransactionReverted(B256),
    ConfirmationTimeout(B256),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(e) => write!(f, "IO error: {}", e),
            AppError::Parse(s) => write!(f, "Parse error: {}", s),
            AppError::JsonParseError(e) => write!(f, "Json parse error: {}", e),
            AppError::InvalidNumber => write!(f, "invalid numeric value"),
            AppError::InvalidAddress => write!(f, "invalid address (must be 20 bytes)"),
            AppError::InvalidInput(s) => write!(f, "invalid input: {}", s),

            AppError::ProviderMissing => write!(f, "no wallet provider found"),
            AppError::NoAccount => write!(f, "wallet returned no authorized account"),
            AppError::UserRejected => write!(f, "request rejected in the wallet"),
            AppError::RequestTimeout(method) => {
                write!(f, "no answer from the wallet for {}, request abandoned", method)
            }
            AppError::ChainUnavailable(s) => write!(f, "network unavailable in the wallet: {}", s),

            AppError::NotConnected => write!(f, "wallet not connected"),
            AppError::WrongNetwork { expected, actual } => match actual {
                Some(actual) => write!(f, "wallet on chain 0x{:x}, expected 0x{:x}", actual, expected),
                None => write!(f, "wallet chain unknown, expected 0x{:x}", expected),
            },
            AppError::InsufficientFunds { symbol, available, requested } => write!(
                f,
                "insufficient {} balance: {} available, {} requested",
                symbol, available, requested
            ),
            AppError::ApprovalRaceLost => {
                write!(f, "allowance changed before the transaction could be sent")
            }
            AppError::SessionChanged => {
                write!(f, "wallet account or network changed, operation stopped")
            }

            AppError::RpcError(s) => write!(f, "RPC error: {}", s),
            AppError::HttpsRpcError(s) => write!(f, "HTTPS RPC error: {}", s),
            AppError::AbiDecode(e) => write!(f, "ABI decode error: {}", e),
            AppError::TransactionReverted(hash) => write!(f, "transaction {} reverted", hash),
            AppError::ConfirmationTimeout(hash) => {
                write!(f, "transaction {} not confirmed in time", hash)
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Io(e) => Some(e),
            AppError::JsonParseError(e) => Some(e),
            AppError::AbiDecode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::JsonParseError(e)
    }
}

impl From<alloy_sol_types::Error> for AppError {
    fn from(e: alloy_sol_types::Error) -> Self {
        AppError::AbiDecode(e)
    }
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Rejected => AppError::UserRejected,
            ProviderError::UnrecognizedChain => {
                AppError::ChainUnavailable("chain not added to the wallet".into())
            }
            ProviderError::Other { code, message } => {
                AppError::RpcError(format!("wallet error {}: {}", code, message))
            }
        }
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::ProviderMissing => ErrorKind::ProviderMissing,
            AppError::NoAccount => ErrorKind::NoAccount,
            AppError::UserRejected | AppError::RequestTimeout(_) => ErrorKind::UserRejected,
            AppError::ChainUnavailable(_) => ErrorKind::ChainUnavailable,
            AppError::NotConnected => ErrorKind::NotConnected,
            AppError::WrongNetwork { .. } => ErrorKind::WrongNetwork,
            AppError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            AppError::ApprovalRaceLost => ErrorKind::ApprovalRaceLost,
            AppError::RpcError(_)
            | AppError::HttpsRpcError(_)
            | AppError::SessionChanged
            | AppError::AbiDecode(_)
            | AppError::TransactionReverted(_)
            | AppError::ConfirmationTimeout(_) => ErrorKind::RpcError,
            AppError::Io(_)
            | AppError::Parse(_)
            | AppError::JsonParseError(_)
            | AppError::InvalidNumber
            | AppError::InvalidAddress
            | AppError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Transient RPC failures that a bounded read retry may absorb.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::RpcError(_) | AppError::HttpsRpcError(_))
    }

    /// Whether the same action can simply be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::RpcError(_)
                | AppError::HttpsRpcError(_)
                | AppError::TransactionReverted(_)
                | AppError::ConfirmationTimeout(_)
                | AppError::ApprovalRaceLost
                | AppError::SessionChanged
                | AppError::UserRejected
                | AppError::RequestTimeout(_)
        )
    }

    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            kind: self.kind(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProviderMissing,
    NoAccount,
    UserRejected,
    ChainUnavailable,
    RpcError,
    InsufficientFunds,
    ApprovalRaceLost,
    WrongNetwork,
    NotConnected,
    InvalidInput,
}

impl ErrorKind {
    /// The one instruction shown to the user for this kind of failure.
    pub fn instruction(&self) -> &'static str {
        match self {
            ErrorKind::ProviderMissing => "Install a browser wallet extension such as MetaMask.",
            ErrorKind::NoAccount => "Unlock your wallet and authorize at least one account.",
            ErrorKind::UserRejected => "Approve the request in your wallet to continue.",
            ErrorKind::ChainUnavailable => "Add BNB Smart Chain to your wallet, then switch to it.",
            ErrorKind::WrongNetwork => "Switch your wallet to BNB Smart Chain.",
            ErrorKind::NotConnected => "Connect your wallet first.",
            ErrorKind::InsufficientFunds => "Your balance is insufficient for this amount.",
            ErrorKind::ApprovalRaceLost | ErrorKind::RpcError => {
                "The network is congested, please try again."
            }
            ErrorKind::InvalidInput => "Check the entered values and try again.",
        }
    }
}

/// Stable, provider-agnostic error shape handed to UI layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}
