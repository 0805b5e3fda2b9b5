use std::collections::BTreeMap;

use alloy_primitives::Address;
use serde::Serialize;

use crate::error::ErrorPayload;
use crate::evm::token::TokenAmount;
use crate::utils::serde::{serialize_option_u64_hex, serialize_u64_hex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    ChainMismatch,
    Ready,
    /// Ready, with a balance read in flight. Last-known values stay readable.
    Refreshing,
}

impl SessionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Refreshing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub state: SessionState,
    pub connected: bool,
    pub address: Option<Address>,
    #[serde(serialize_with = "serialize_option_u64_hex")]
    pub chain_id: Option<u64>,
    #[serde(serialize_with = "serialize_u64_hex")]
    pub expected_chain_id: u64,
    /// keyed by token symbol, native currency included
    pub balances: BTreeMap<String, TokenAmount>,
    pub token_errors: BTreeMap<String, ErrorPayload>,
    pub last_error: Option<ErrorPayload>,
}

impl Session {
    pub fn new(expected_chain_id: u64) -> Self {
        Self {
            state: SessionState::Disconnected,
            connected: false,
            address: None,
            chain_id: None,
            expected_chain_id,
            balances: BTreeMap::new(),
            token_errors: BTreeMap::new(),
            last_error: None,
        }
    }

    pub fn chain_ok(&self) -> bool {
        self.chain_id == Some(self.expected_chain_id)
    }

    /// Balances read on another chain, or with no chain at all, are not usable.
    pub fn balances_stale(&self) -> bool {
        !self.chain_ok()
    }

    pub fn can_deposit(&self) -> bool {
        self.connected && self.address.is_some() && self.chain_ok() && self.state.is_ready()
    }

    /// Where the session rests once nothing is in flight.
    pub fn settled_state(&self) -> SessionState {
        match (self.connected, self.chain_ok()) {
            (false, _) => SessionState::Disconnected,
            (true, true) => SessionState::Ready,
            (true, false) => SessionState::ChainMismatch,
        }
    }

    pub fn reset(&mut self) {
        *self = Session::new(self.expected_chain_id);
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session: self.clone(),
            balances_stale: self.balances_stale(),
            can_deposit: self.can_deposit(),
        }
    }
}

/// Serializable snapshot for consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub balances_stale: bool,
    pub can_deposit: bool,
}
