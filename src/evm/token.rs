use std::collections::HashMap;
use std::fmt;

use alloy_primitives::{Address, U256};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::AppError;
use crate::evm::abi::IERC20;
use crate::evm::contract::read_contract;
use crate::rpc::client::{ChainClient, RetryPolicy};
use crate::utils::num::{format_units, parse_units, MAX_DECIMALS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
}

impl TokenDescriptor {
    pub fn amount(&self, raw: U256) -> TokenAmount {
        TokenAmount::new(raw, self.decimals)
    }

    pub fn parse_amount(&self, amount: &str) -> Result<TokenAmount, AppError> {
        TokenAmount::parse(amount, self.decimals)
    }
}

/// Raw on-chain amount together with the scale it is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    pub raw: U256,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn new(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn parse(amount: &str, decimals: u8) -> Result<Self, AppError> {
        Ok(Self::new(parse_units(amount, decimals)?, decimals))
    }

    pub fn formatted(&self) -> String {
        format_units(self.raw, self.decimals)
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("TokenAmount", 3)?;
        s.serialize_field("raw", &self.raw.to_string())?;
        s.serialize_field("decimals", &self.decimals)?;
        s.serialize_field("formatted", &self.formatted())?;
        s.end()
    }
}

/// Descriptors for one chain. Switching chain drops everything.
#[derive(Debug, Default)]
pub struct TokenCache {
    chain_id: Option<u64>,
    entries: HashMap<Address, TokenDescriptor>,
}

impl TokenCache {
    pub fn get(&self, chain_id: u64, token: &Address) -> Option<&TokenDescriptor> {
        if self.chain_id != Some(chain_id) {
            return None;
        }
        self.entries.get(token)
    }

    pub fn insert(&mut self, chain_id: u64, descriptor: TokenDescriptor) {
        if self.chain_id != Some(chain_id) {
            self.entries.clear();
            self.chain_id = Some(chain_id);
        }
        self.entries.insert(descriptor.address, descriptor);
    }

    pub fn invalidate(&mut self) {
        self.chain_id = None;
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads `decimals()` and `symbol()` from the token contract.
pub async fn fetch_descriptor<R>(
    client: &R,
    retry: &RetryPolicy,
    token: Address,
) -> Result<TokenDescriptor, AppError>
where
    R: ChainClient + ?Sized,
{
    let decimals = read_contract(client, retry, token, &IERC20::decimalsCall {})
        .await?
        .decimals;
    if decimals > MAX_DECIMALS {
        return Err(AppError::RpcError(format!(
            "token {} reports {} decimals",
            token, decimals
        )));
    }
    let symbol = read_contract(client, retry, token, &IERC20::symbolCall {})
        .await?
        .symbol;
    Ok(TokenDescriptor {
        address: token,
        decimals,
        symbol,
    })
}

pub async fn balance_of<R>(
    client: &R,
    retry: &RetryPolicy,
    token: Address,
    owner: Address,
) -> Result<U256, AppError>
where
    R: ChainClient + ?Sized,
{
    Ok(read_contract(client, retry, token, &IERC20::balanceOfCall { owner })
        .await?
        .balance)
}

pub async fn allowance<R>(
    client: &R,
    retry: &RetryPolicy,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256, AppError>
where
    R: ChainClient + ?Sized,
{
    Ok(read_contract(client, retry, token, &IERC20::allowanceCall { owner, spender })
        .await?
        .remaining)
}
