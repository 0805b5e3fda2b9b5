//! Scripted wallet provider and chain client for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{address, Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use crate::core::config::{PoolConfig, SessionConfig};
use crate::core::session::WalletSession;
use crate::eips::eip1193::{ProviderError, ProviderEvent, WalletProvider};
use crate::error::AppError;
use crate::evm::abi::{ILPFarming, IERC20};
use crate::evm::chains::NetworkDescriptor;
use crate::evm::contract::describe_calldata;
use crate::rpc::client::{ChainClient, TxReceipt, TxRequest};

pub const USER: Address = address!("00000000000000000000000000000000000000aa");
pub const OTHER_USER: Address = address!("00000000000000000000000000000000000000bb");
pub const USDC: Address = address!("000000000000000000000000000000000000000c");
pub const BUSD: Address = address!("000000000000000000000000000000000000000b");
pub const POOL: Address = address!("00000000000000000000000000000000000000f0");

pub fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        expected_chain_id: 56,
        tokens: vec![USDC, BUSD],
        pool: Some(PoolConfig {
            address: POOL,
            deposit_token: USDC,
            ..PoolConfig::default()
        }),
        ..SessionConfig::default()
    }
}

pub type TestSession = WalletSession<MockWallet, MockChain>;

pub fn session_with(wallet: &Arc<MockWallet>, chain: &Arc<MockChain>) -> Arc<TestSession> {
    Arc::new(WalletSession::new(
        Some(wallet.clone()),
        chain.clone(),
        test_config(),
    ))
}

/// Wallet on BSC mainnet with USER authorized and a chain holding balances.
pub async fn ready_session() -> (Arc<MockWallet>, Arc<MockChain>, Arc<TestSession>) {
    let wallet = Arc::new(MockWallet::new(vec![USER], 56));
    let chain = Arc::new(MockChain::bsc());
    let session = session_with(&wallet, &chain);
    session.connect().await.unwrap();
    (wallet, chain, session)
}

// ---------------------------------------------------------------------------
// wallet

struct WalletState {
    accounts: Vec<Address>,
    chain_id: u64,
    known_chains: HashSet<u64>,
    switch_results: VecDeque<Result<(), ProviderError>>,
    add_result: Result<(), ProviderError>,
    reject_accounts: bool,
    hang: bool,
    hang_switch: bool,
    hang_add: bool,
    fail_chain_id: bool,
    calls: Vec<String>,
    added: Vec<NetworkDescriptor>,
}

pub struct MockWallet {
    inner: Mutex<WalletState>,
    events: Mutex<Option<mpsc::UnboundedSender<ProviderEvent>>>,
    gated: AtomicBool,
    /// signalled when a gated account prompt opens
    pub entered: Notify,
    pub release: Notify,
}

impl MockWallet {
    pub fn new(accounts: Vec<Address>, chain_id: u64) -> Self {
        Self {
            inner: Mutex::new(WalletState {
                accounts,
                chain_id,
                known_chains: HashSet::from([chain_id]),
                switch_results: VecDeque::new(),
                add_result: Ok(()),
                reject_accounts: false,
                hang: false,
                hang_switch: false,
                hang_add: false,
                fail_chain_id: false,
                calls: Vec::new(),
                added: Vec::new(),
            }),
            events: Mutex::new(None),
            gated: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn knows_chain(&self, chain_id: u64) {
        self.inner.lock().unwrap().known_chains.insert(chain_id);
    }

    pub fn script_switch(&self, result: Result<(), ProviderError>) {
        self.inner.lock().unwrap().switch_results.push_back(result);
    }

    pub fn set_add_result(&self, result: Result<(), ProviderError>) {
        self.inner.lock().unwrap().add_result = result;
    }

    pub fn reject_accounts(&self) {
        self.inner.lock().unwrap().reject_accounts = true;
    }

    /// `eth_requestAccounts` never answers.
    pub fn hang(&self) {
        self.inner.lock().unwrap().hang = true;
    }

    pub fn hang_switch(&self) {
        self.inner.lock().unwrap().hang_switch = true;
    }

    pub fn hang_add(&self) {
        self.inner.lock().unwrap().hang_add = true;
    }

    pub fn fail_chain_id(&self) {
        self.inner.lock().unwrap().fail_chain_id = true;
    }

    /// The next account prompt stays open until `release` is notified.
    pub fn gate_accounts(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.inner.lock().unwrap().calls.iter().filter(|c| *c == call).count()
    }

    pub fn added(&self) -> Vec<NetworkDescriptor> {
        self.inner.lock().unwrap().added.clone()
    }

    /// Pushes an event to the subscriber, as the injected wallet would.
    pub fn emit(&self, event: ProviderEvent) {
        match &event {
            ProviderEvent::AccountsChanged(accounts) => {
                self.inner.lock().unwrap().accounts = accounts.clone();
            }
            ProviderEvent::ChainChanged(chain_id) => {
                self.inner.lock().unwrap().chain_id = *chain_id;
            }
        }
        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    fn log(&self, call: impl Into<String>) {
        self.inner.lock().unwrap().calls.push(call.into());
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.log("request_accounts");
        if self.gated.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let (hang, reject, accounts) = {
            let s = self.inner.lock().unwrap();
            (s.hang, s.reject_accounts, s.accounts.clone())
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if reject {
            return Err(ProviderError::Rejected);
        }
        Ok(accounts)
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        self.log("chain_id");
        let s = self.inner.lock().unwrap();
        if s.fail_chain_id {
            return Err(ProviderError::Other {
                code: -32603,
                message: "internal error".into(),
            });
        }
        Ok(s.chain_id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        self.log(format!("switch:{}", chain_id));
        let hang = self.inner.lock().unwrap().hang_switch;
        if hang {
            std::future::pending::<()>().await;
        }
        let mut s = self.inner.lock().unwrap();
        let result = match s.switch_results.pop_front() {
            Some(scripted) => scripted,
            None if s.known_chains.contains(&chain_id) => Ok(()),
            None => Err(ProviderError::UnrecognizedChain),
        };
        if result.is_ok() {
            s.chain_id = chain_id;
        }
        result
    }

    async fn add_chain(&self, network: &NetworkDescriptor) -> Result<(), ProviderError> {
        self.log(format!("add:{}", network.chain_id));
        let hang = self.inner.lock().unwrap().hang_add;
        if hang {
            std::future::pending::<()>().await;
        }
        let mut s = self.inner.lock().unwrap();
        s.added.push(network.clone());
        let result = s.add_result.clone();
        if result.is_ok() {
            s.known_chains.insert(network.chain_id);
        }
        result
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock().unwrap() = Some(tx);
        rx
    }
}

// ---------------------------------------------------------------------------
// chain

struct MockToken {
    decimals: u8,
    symbol: String,
    balances: HashMap<Address, U256>,
}

#[derive(Clone)]
pub struct MockInvestment {
    pub amount: U256,
    pub start: u64,
    pub period_days: u64,
    pub apr_bps: u64,
    pub active: bool,
}

struct Submitted {
    label: &'static str,
    block: u64,
    status: bool,
}

struct ChainState {
    native: HashMap<Address, U256>,
    native_failures: u32,
    tokens: HashMap<Address, MockToken>,
    allowances: HashMap<(Address, Address, Address), U256>,
    failing: HashMap<Address, u32>,
    revert_selectors: HashSet<[u8; 4]>,
    reject_selectors: HashSet<[u8; 4]>,
    approve_ineffective: bool,
    submitted: HashMap<B256, Submitted>,
    receipt_delay: u32,
    receipt_polls: HashMap<B256, u32>,
    head: u64,
    head_advance: u64,
    nonce: u64,
    investments: HashMap<Address, Vec<MockInvestment>>,
    pending_rewards: U256,
    truncated_investments: bool,
    log: Vec<String>,
}

pub struct MockChain {
    inner: Mutex<ChainState>,
    gated: AtomicBool,
    gated_send: AtomicBool,
    /// signalled when a gated balance read or send starts
    pub entered: Notify,
    pub release: Notify,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ChainState {
                native: HashMap::new(),
                native_failures: 0,
                tokens: HashMap::new(),
                allowances: HashMap::new(),
                failing: HashMap::new(),
                revert_selectors: HashSet::new(),
                reject_selectors: HashSet::new(),
                approve_ineffective: false,
                submitted: HashMap::new(),
                receipt_delay: 0,
                receipt_polls: HashMap::new(),
                head: 100,
                head_advance: 0,
                nonce: 0,
                investments: HashMap::new(),
                pending_rewards: U256::ZERO,
                truncated_investments: false,
                log: Vec::new(),
            }),
            gated: AtomicBool::new(false),
            gated_send: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// BNB, USDC and BUSD balances for USER and OTHER_USER.
    pub fn bsc() -> Self {
        let chain = Self::new();
        chain.set_native(USER, ether(2));
        chain.set_native(OTHER_USER, ether(1));
        chain.add_token(USDC, 18, "USDC");
        chain.add_token(BUSD, 18, "BUSD");
        chain.set_token_balance(USDC, USER, ether(1000));
        chain.set_token_balance(BUSD, USER, ether(50));
        chain.set_token_balance(USDC, OTHER_USER, ether(7));
        chain
    }

    pub fn set_native(&self, owner: Address, amount: U256) {
        self.inner.lock().unwrap().native.insert(owner, amount);
    }

    pub fn add_token(&self, token: Address, decimals: u8, symbol: &str) {
        self.inner.lock().unwrap().tokens.insert(
            token,
            MockToken {
                decimals,
                symbol: symbol.to_string(),
                balances: HashMap::new(),
            },
        );
    }

    pub fn set_token_balance(&self, token: Address, owner: Address, amount: U256) {
        if let Some(t) = self.inner.lock().unwrap().tokens.get_mut(&token) {
            t.balances.insert(owner, amount);
        }
    }

    pub fn token_balance(&self, token: Address, owner: Address) -> U256 {
        self.inner
            .lock()
            .unwrap()
            .tokens
            .get(&token)
            .and_then(|t| t.balances.get(&owner).copied())
            .unwrap_or_default()
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.inner
            .lock()
            .unwrap()
            .allowances
            .insert((token, owner, spender), amount);
    }

    /// The next `times` eth_calls to `to` fail with a transient error.
    pub fn fail_calls(&self, to: Address, times: u32) {
        self.inner.lock().unwrap().failing.insert(to, times);
    }

    pub fn fail_native(&self, times: u32) {
        self.inner.lock().unwrap().native_failures = times;
    }

    pub fn revert_selector(&self, selector: [u8; 4]) {
        self.inner.lock().unwrap().revert_selectors.insert(selector);
    }

    pub fn reject_selector(&self, selector: [u8; 4]) {
        self.inner.lock().unwrap().reject_selectors.insert(selector);
    }

    /// Approvals get mined but leave the allowance untouched.
    pub fn approve_ineffective(&self) {
        self.inner.lock().unwrap().approve_ineffective = true;
    }

    pub fn set_receipt_delay(&self, polls: u32) {
        self.inner.lock().unwrap().receipt_delay = polls;
    }

    pub fn set_head_advance(&self, blocks: u64) {
        self.inner.lock().unwrap().head_advance = blocks;
    }

    pub fn add_investment(&self, owner: Address, investment: MockInvestment) {
        self.inner
            .lock()
            .unwrap()
            .investments
            .entry(owner)
            .or_default()
            .push(investment);
    }

    pub fn set_pending_rewards(&self, amount: U256) {
        self.inner.lock().unwrap().pending_rewards = amount;
    }

    /// getUserInvestments answers with arrays of different lengths.
    pub fn truncate_investments(&self) {
        self.inner.lock().unwrap().truncated_investments = true;
    }

    /// The next native balance read blocks until `release` is notified.
    pub fn gate_next_balance(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    /// The next transaction is held until `release` is notified, then mined.
    pub fn gate_next_send(&self) {
        self.gated_send.store(true, Ordering::SeqCst);
    }

    pub fn submit_raw(&self, _from: Address) -> B256 {
        let mut s = self.inner.lock().unwrap();
        Self::record_submission(&mut s, "raw", true)
    }

    pub fn revert_hash(&self, hash: B256) {
        if let Some(tx) = self.inner.lock().unwrap().submitted.get_mut(&hash) {
            tx.status = false;
        }
    }

    pub fn is_submitted(&self, hash: B256) -> bool {
        self.inner.lock().unwrap().submitted.contains_key(&hash)
    }

    pub fn receipt_polls(&self, hash: B256) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .receipt_polls
            .get(&hash)
            .copied()
            .unwrap_or_default()
    }

    pub fn log(&self) -> Vec<String> {
        self.inner.lock().unwrap().log.clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.inner.lock().unwrap().log.iter().position(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.inner.lock().unwrap().log.iter().filter(|e| *e == entry).count()
    }

    fn record_submission(s: &mut ChainState, label: &'static str, status: bool) -> B256 {
        s.nonce += 1;
        let hash = B256::left_padding_from(&s.nonce.to_be_bytes());
        let block = s.head;
        s.submitted.insert(hash, Submitted { label, block, status });
        hash
    }

    fn apply(s: &mut ChainState, tx: &TxRequest) -> Result<(), AppError> {
        let data = &tx.data[..];
        if is::<IERC20::approveCall>(data) {
            let call = IERC20::approveCall::abi_decode(data, true)?;
            if !s.approve_ineffective {
                s.allowances.insert((tx.to, tx.from, call.spender), call.amount);
            }
        } else if is::<IERC20::transferCall>(data) {
            let call = IERC20::transferCall::abi_decode(data, true)?;
            let token = s
                .tokens
                .get_mut(&tx.to)
                .ok_or_else(|| AppError::RpcError("execution reverted".into()))?;
            let from = token.balances.entry(tx.from).or_default();
            *from = from.saturating_sub(call.amount);
            *token.balances.entry(call.to).or_default() += call.amount;
        } else if is::<ILPFarming::depositCall>(data) {
            let call = ILPFarming::depositCall::abi_decode(data, true)?;
            let period_days = u64::try_from(call.periodDays).unwrap_or_default();
            if let Some(token) = s.tokens.get_mut(&USDC) {
                let balance = token.balances.entry(tx.from).or_default();
                *balance = balance.saturating_sub(call.amount);
            }
            let allowance = s.allowances.entry((USDC, tx.from, tx.to)).or_default();
            *allowance = allowance.saturating_sub(call.amount);
            s.investments.entry(tx.from).or_default().push(MockInvestment {
                amount: call.amount,
                start: 1_700_000_000,
                period_days,
                apr_bps: 1200,
                active: true,
            });
        }
        Ok(())
    }
}

fn is<C: SolCall>(data: &[u8]) -> bool {
    data.get(..4) == Some(&C::SELECTOR[..])
}

fn call_name(data: &[u8]) -> &'static str {
    if is::<IERC20::balanceOfCall>(data) {
        "balanceOf"
    } else if is::<IERC20::decimalsCall>(data) {
        "decimals"
    } else if is::<IERC20::symbolCall>(data) {
        "symbol"
    } else if is::<IERC20::allowanceCall>(data) {
        "allowance"
    } else if is::<ILPFarming::getUserInvestmentsCall>(data) {
        "getUserInvestments"
    } else if is::<ILPFarming::getUserBalanceCall>(data) {
        "getUserBalance"
    } else if is::<ILPFarming::getDailyYieldCall>(data) {
        "getDailyYield"
    } else {
        "unknown"
    }
}

fn reverted() -> AppError {
    AppError::RpcError("execution reverted".into())
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_balance(&self, address: Address) -> Result<U256, AppError> {
        if self.gated.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let mut s = self.inner.lock().unwrap();
        s.log.push("call:getBalance".into());
        if s.native_failures > 0 {
            s.native_failures -= 1;
            return Err(AppError::RpcError("429 too many requests".into()));
        }
        Ok(s.native.get(&address).copied().unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, AppError> {
        let mut s = self.inner.lock().unwrap();
        let name = call_name(&data);
        s.log.push(format!("call:{}", name));
        if let Some(remaining) = s.failing.get_mut(&to) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(AppError::RpcError("header not found".into()));
            }
        }

        let out = match name {
            "balanceOf" => {
                let call = IERC20::balanceOfCall::abi_decode(&data, true)?;
                let token = s.tokens.get(&to).ok_or_else(reverted)?;
                let balance = token.balances.get(&call.owner).copied().unwrap_or_default();
                IERC20::balanceOfCall::abi_encode_returns(&(balance,))
            }
            "decimals" => {
                let token = s.tokens.get(&to).ok_or_else(reverted)?;
                IERC20::decimalsCall::abi_encode_returns(&(token.decimals,))
            }
            "symbol" => {
                let token = s.tokens.get(&to).ok_or_else(reverted)?;
                IERC20::symbolCall::abi_encode_returns(&(token.symbol.clone(),))
            }
            "allowance" => {
                let call = IERC20::allowanceCall::abi_decode(&data, true)?;
                let remaining = s
                    .allowances
                    .get(&(to, call.owner, call.spender))
                    .copied()
                    .unwrap_or_default();
                IERC20::allowanceCall::abi_encode_returns(&(remaining,))
            }
            "getUserInvestments" => {
                let call = ILPFarming::getUserInvestmentsCall::abi_decode(&data, true)?;
                let list = s.investments.get(&call.user).cloned().unwrap_or_default();
                let ids: Vec<U256> = (0..list.len()).map(U256::from).collect();
                let amounts: Vec<U256> = list.iter().map(|i| i.amount).collect();
                let starts: Vec<U256> = list.iter().map(|i| U256::from(i.start)).collect();
                let ends: Vec<U256> = list
                    .iter()
                    .map(|i| U256::from(i.start + i.period_days * 86_400))
                    .collect();
                let periods: Vec<U256> = list.iter().map(|i| U256::from(i.period_days)).collect();
                let mut aprs: Vec<U256> = list.iter().map(|i| U256::from(i.apr_bps)).collect();
                let active: Vec<bool> = list.iter().map(|i| i.active).collect();
                if s.truncated_investments {
                    aprs.pop();
                }
                ILPFarming::getUserInvestmentsCall::abi_encode_returns(&(
                    ids, amounts, starts, ends, periods, aprs, active,
                ))
            }
            "getUserBalance" => {
                let call = ILPFarming::getUserBalanceCall::abi_decode(&data, true)?;
                let list = s.investments.get(&call.user).cloned().unwrap_or_default();
                let invested = list
                    .iter()
                    .filter(|i| i.active)
                    .fold(U256::ZERO, |acc, i| acc + i.amount);
                let active = U256::from(list.iter().filter(|i| i.active).count());
                ILPFarming::getUserBalanceCall::abi_encode_returns(&(
                    invested,
                    s.pending_rewards,
                    s.pending_rewards * U256::from(2u64),
                    active,
                ))
            }
            "getDailyYield" => {
                let call = ILPFarming::getDailyYieldCall::abi_decode(&data, true)?;
                let list = s.investments.get(&call.user).cloned().unwrap_or_default();
                let daily = list
                    .iter()
                    .filter(|i| i.active)
                    .fold(U256::ZERO, |acc, i| {
                        acc + i.amount * U256::from(i.apr_bps) / U256::from(10_000u64 * 365)
                    });
                ILPFarming::getDailyYieldCall::abi_encode_returns(&(daily,))
            }
            _ => return Err(reverted()),
        };
        Ok(Bytes::from(out))
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<B256, AppError> {
        if self.gated_send.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let mut s = self.inner.lock().unwrap();
        let label = describe_calldata(&tx.data);
        s.log.push(format!("send:{}", label));
        let selector: [u8; 4] = tx.data.get(..4).and_then(|d| d.try_into().ok()).unwrap_or_default();
        if s.reject_selectors.contains(&selector) {
            return Err(AppError::UserRejected);
        }
        let status = !s.revert_selectors.contains(&selector);
        if status {
            Self::apply(&mut s, &tx)?;
        }
        Ok(Self::record_submission(&mut s, label, status))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, AppError> {
        let mut s = self.inner.lock().unwrap();
        let polls = {
            let polls = s.receipt_polls.entry(hash).or_default();
            *polls += 1;
            *polls
        };
        if polls <= s.receipt_delay {
            return Ok(None);
        }
        let Some(tx) = s.submitted.get(&hash) else {
            return Ok(None);
        };
        let (label, block, status) = (tx.label, tx.block, tx.status);
        s.log.push(format!("mined:{}", label));
        Ok(Some(TxReceipt {
            transaction_hash: hash,
            block_number: Some(block),
            status,
        }))
    }

    async fn block_number(&self) -> Result<u64, AppError> {
        let mut s = self.inner.lock().unwrap();
        let head = s.head;
        s.head += s.head_advance;
        Ok(head)
    }
}

/// Polls `check` on the paused clock until it holds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
