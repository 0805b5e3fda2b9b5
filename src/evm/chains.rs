use alloy_primitives::{address, Address};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::utils::serde::{deserialize_u64_from_str_or_int, serialize_u64_hex};

pub const BSC_MAINNET_ID: u64 = 56;
pub const BSC_TESTNET_ID: u64 = 97;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Everything a wallet needs to add a network (`wallet_addEthereumChain`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDescriptor {
    #[serde(
        serialize_with = "serialize_u64_hex",
        deserialize_with = "deserialize_u64_from_str_or_int"
    )]
    pub chain_id: u64,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl NetworkDescriptor {
    pub fn add_chain_params(&self) -> Result<Value, AppError> {
        Ok(Value::Array(vec![serde_json::to_value(self)?]))
    }

    pub fn rpc_url(&self) -> Option<&str> {
        self.rpc_urls.first().map(String::as_str)
    }
}

pub static SUPPORTED_NETWORKS: Lazy<Vec<NetworkDescriptor>> = Lazy::new(|| {
    vec![
        NetworkDescriptor {
            chain_id: BSC_MAINNET_ID,
            chain_name: "Binance Smart Chain".to_string(),
            native_currency: NativeCurrency {
                name: "BNB".to_string(),
                symbol: "BNB".to_string(),
                decimals: 18,
            },
            rpc_urls: vec![
                "https://bsc-dataseed.binance.org/".to_string(),
                "https://rpc.ankr.com/bsc".to_string(),
                "https://bsc.publicnode.com".to_string(),
            ],
            block_explorer_urls: vec!["https://bscscan.com/".to_string()],
        },
        NetworkDescriptor {
            chain_id: BSC_TESTNET_ID,
            chain_name: "BSC Testnet".to_string(),
            native_currency: NativeCurrency {
                name: "BNB".to_string(),
                symbol: "BNB".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["https://data-seed-prebsc-1-s1.binance.org:8545/".to_string()],
            block_explorer_urls: vec!["https://testnet.bscscan.com/".to_string()],
        },
    ]
});

pub fn network(chain_id: u64) -> Option<&'static NetworkDescriptor> {
    SUPPORTED_NETWORKS.iter().find(|n| n.chain_id == chain_id)
}

/// Deployed farming contracts and the stablecoins they accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    pub lp_farming: Address,
    pub usdc: Address,
    pub busd: Address,
}

pub const MAINNET_CONTRACTS: ContractAddresses = ContractAddresses {
    lp_farming: address!("405412D71847eCb8Fa5a98A1F91B90b1231A93dc"),
    usdc: address!("8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d"),
    busd: address!("e9e7CEA3DedcA5984780Bafc599bD69ADd087D56"),
};

pub const TESTNET_CONTRACTS: ContractAddresses = ContractAddresses {
    lp_farming: address!("9876543210987654321098765432109876543210"),
    usdc: address!("64544969ed7EBf5f083679233325356EbE738930"),
    busd: address!("eD24FC36d5Ee211Ea25A80239Fb8C4Cfd80f12Ee"),
};

/// Unknown chains fall back to the testnet deployment.
pub fn contract_addresses(chain_id: u64) -> ContractAddresses {
    match chain_id {
        BSC_MAINNET_ID => MAINNET_CONTRACTS,
        _ => TESTNET_CONTRACTS,
    }
}
