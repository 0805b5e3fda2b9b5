use std::path::Path;
use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::data::tx::ConfirmationPolicy;
use crate::error::AppError;
use crate::evm::chains::{contract_addresses, network, NetworkDescriptor, BSC_MAINNET_ID};
use crate::rpc::client::RetryPolicy;
use crate::utils::serde::{deserialize_u64_from_str_or_int, serialize_u64_hex};

/// The farming pool contract and the token it takes deposits in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub address: Address,
    pub deposit_token: Address,
    pub investment_periods: Vec<u64>,
    pub fee_bps: u64,
    pub default_apr_bps: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let contracts = contract_addresses(BSC_MAINNET_ID);
        Self {
            address: contracts.lp_farming,
            deposit_token: contracts.usdc,
            investment_periods: vec![30, 90, 180],
            fee_bps: 200,
            default_apr_bps: 1200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(
        serialize_with = "serialize_u64_hex",
        deserialize_with = "deserialize_u64_from_str_or_int"
    )]
    pub expected_chain_id: u64,
    /// Overrides the built-in descriptor for `expected_chain_id`.
    pub network: Option<NetworkDescriptor>,
    pub tokens: Vec<Address>,
    pub pool: Option<PoolConfig>,
    pub approval_timeout_secs: u64,
    pub read_retries: u32,
    pub retry_delay_ms: u64,
    pub confirmation_timeout_secs: u64,
    pub confirmation_poll_ms: u64,
    pub required_confirmations: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expected_chain_id: BSC_MAINNET_ID,
            network: None,
            tokens: Vec::new(),
            pool: None,
            approval_timeout_secs: 120,
            read_retries: 2,
            retry_delay_ms: 250,
            confirmation_timeout_secs: 300,
            confirmation_poll_ms: 3000,
            required_confirmations: 1,
        }
    }
}

impl SessionConfig {
    /// USDC and BUSD balances plus the farming pool deployed on `chain_id`.
    pub fn for_chain(chain_id: u64) -> Self {
        let contracts = contract_addresses(chain_id);
        Self {
            expected_chain_id: chain_id,
            tokens: vec![contracts.usdc, contracts.busd],
            pool: Some(PoolConfig {
                address: contracts.lp_farming,
                deposit_token: contracts.usdc,
                ..PoolConfig::default()
            }),
            ..Self::default()
        }
    }

    pub fn bsc_mainnet() -> Self {
        Self::for_chain(BSC_MAINNET_ID)
    }

    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(network) = &self.network {
            if network.chain_id != self.expected_chain_id {
                return Err(AppError::InvalidInput(format!(
                    "network descriptor is for chain {}, expected {}",
                    network.chain_id, self.expected_chain_id
                )));
            }
        }
        if self.required_confirmations == 0 {
            return Err(AppError::InvalidInput("required_confirmations must be at least 1".into()));
        }
        if let Some(pool) = &self.pool {
            if pool.investment_periods.is_empty() {
                return Err(AppError::InvalidInput("pool has no investment periods".into()));
            }
        }
        Ok(())
    }

    /// Descriptor sent with `wallet_addEthereumChain`.
    pub fn network_descriptor(&self) -> Result<NetworkDescriptor, AppError> {
        match &self.network {
            Some(network) => Ok(network.clone()),
            None => network(self.expected_chain_id).cloned().ok_or_else(|| {
                AppError::ChainUnavailable(format!("no descriptor for chain {}", self.expected_chain_id))
            }),
        }
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.read_retries,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            required: self.required_confirmations,
            timeout: Duration::from_secs(self.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(self.confirmation_poll_ms),
        }
    }
}
