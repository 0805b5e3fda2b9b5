use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolCall;
use futures::future::join_all;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;

use crate::core::config::SessionConfig;
use crate::core::state::{Session, SessionState, SessionView};
use crate::data::history::{paginate, HistoryFilter, Page, TransactionHistoryEntry, TxHistory};
use crate::data::tx::{wait_for_confirmation, ConfirmationWatch, PendingTransaction};
use crate::eips::eip1193::{ProviderError, ProviderEvent, WalletProvider};
use crate::error::AppError;
use crate::evm::contract::{describe_calldata, tx_request};
use crate::evm::token::{balance_of, fetch_descriptor, TokenAmount, TokenCache, TokenDescriptor};
use crate::rpc::client::{ChainClient, TxReceipt};

/// One wallet connection: account authorization, target chain enforcement and
/// balance refresh, driven by explicit calls and by provider events.
///
/// Operations and events queue behind a single FIFO lock. An account change
/// bumps the session epoch as soon as it arrives, and so does `disconnect`,
/// which skips the queue; an operation that started under an older epoch drops
/// its result instead of committing it. A chain change waits its turn and is
/// applied after the operation ahead of it, but it still stops a multi-step
/// write before its next submission.
pub struct WalletSession<P, C> {
    provider: Option<Arc<P>>,
    client: Arc<C>,
    config: SessionConfig,
    state: RwLock<Session>,
    tokens: Mutex<TokenCache>,
    history: Mutex<TxHistory>,
    op_lock: Mutex<()>,
    epoch: AtomicU64,
    chain_events: AtomicU64,
    /// `chain_events` when the running operation took the lock
    chain_mark: AtomicU64,
}

impl<P, C> WalletSession<P, C>
where
    P: WalletProvider,
    C: ChainClient,
{
    pub fn new(provider: Option<Arc<P>>, client: Arc<C>, config: SessionConfig) -> Self {
        let session = Session::new(config.expected_chain_id);
        Self {
            provider,
            client,
            config,
            state: RwLock::new(session),
            tokens: Mutex::new(TokenCache::default()),
            history: Mutex::new(TxHistory::default()),
            op_lock: Mutex::new(()),
            epoch: AtomicU64::new(0),
            chain_events: AtomicU64::new(0),
            chain_mark: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub async fn snapshot(&self) -> Session {
        self.state.read().await.clone()
    }

    pub async fn view(&self) -> SessionView {
        self.state.read().await.view()
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.state
    }

    // ==================== operations ====================

    pub async fn connect(&self) -> Result<(), AppError> {
        let (_guard, epoch) = self.begin().await;
        let result = self.connect_locked(epoch).await;
        self.settle(epoch, result).await
    }

    /// Brings the wallet onto the expected chain, adding it to the wallet
    /// first when the wallet does not know it.
    pub async fn switch_chain(&self) -> Result<(), AppError> {
        let (_guard, epoch) = self.begin().await;
        let result = self.switch_locked(epoch).await;
        self.settle(epoch, result).await
    }

    pub async fn refresh(&self) -> Result<(), AppError> {
        let (_guard, epoch) = self.begin().await;
        let result = self.refresh_locked(epoch).await;
        self.settle(epoch, result).await
    }

    pub async fn disconnect(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state.write().await.reset();
        self.tokens.lock().await.invalidate();
        log::info!("wallet session disconnected");
    }

    pub async fn handle_event(&self, event: ProviderEvent) -> Result<(), AppError> {
        log::debug!("provider event {:?}", event);
        let epoch = match &event {
            ProviderEvent::AccountsChanged(_) => self.epoch.fetch_add(1, Ordering::SeqCst) + 1,
            ProviderEvent::ChainChanged(_) => {
                self.chain_events.fetch_add(1, Ordering::SeqCst);
                self.epoch.load(Ordering::SeqCst)
            }
        };
        let _guard = self.op_lock.lock().await;
        let result = match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                Some(&address) => match self.adopt_account(address, epoch).await {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        self.settle_state(epoch).await;
                        Err(e)
                    }
                },
                None => {
                    self.state.write().await.reset();
                    self.tokens.lock().await.invalidate();
                    log::info!("wallet revoked all accounts");
                    Ok(())
                }
            },
            ProviderEvent::ChainChanged(chain_id) => {
                self.chain_changed(chain_id, epoch).await;
                Ok(())
            }
        };
        self.settle(epoch, result).await
    }

    pub async fn history(&self, filter: &HistoryFilter) -> Vec<TransactionHistoryEntry> {
        self.history.lock().await.filter(filter)
    }

    pub async fn history_page(
        &self,
        filter: &HistoryFilter,
        page: usize,
        per_page: usize,
    ) -> Page<TransactionHistoryEntry> {
        paginate(&self.history(filter).await, page, per_page)
    }

    // ==================== state machine ====================

    async fn connect_locked(&self, epoch: u64) -> Result<(), AppError> {
        let provider = self.provider()?;
        let prior = {
            let mut s = self.state.write().await;
            std::mem::replace(&mut s.state, SessionState::Connecting)
        };

        log::info!("requesting wallet accounts");
        let accounts = match self
            .ask("eth_requestAccounts", provider.request_accounts())
            .await
            .and_then(|r| r.map_err(AppError::from))
        {
            Ok(accounts) => accounts,
            Err(e) => {
                self.restore(epoch, prior).await;
                return Err(e);
            }
        };

        let Some(&address) = accounts.first() else {
            if self.is_current(epoch) {
                self.state.write().await.reset();
            }
            return Err(AppError::NoAccount);
        };

        match self.adopt_account(address, epoch).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AppError::SessionChanged),
            Err(e) => {
                self.restore(epoch, prior).await;
                Err(e)
            }
        }
    }

    /// Connect success path: account known, derive chain state and balances.
    /// Returns false when a newer event superseded the result.
    async fn adopt_account(&self, address: Address, epoch: u64) -> Result<bool, AppError> {
        let chain_id = self.provider()?.chain_id().await?;
        if !self.is_current(epoch) {
            log::debug!("account {} superseded before commit", address);
            return Ok(false);
        }

        let ready = {
            let mut s = self.state.write().await;
            if s.address != Some(address) {
                s.balances.clear();
                s.token_errors.clear();
            }
            s.connected = true;
            s.address = Some(address);
            s.last_error = None;
            self.set_chain(&mut s, chain_id).await;
            s.state == SessionState::Ready
        };
        log::info!("wallet {} connected on chain {}", address, chain_id);

        if ready {
            self.refresh_or_record(epoch).await;
        }
        Ok(true)
    }

    async fn switch_locked(&self, epoch: u64) -> Result<(), AppError> {
        let provider = self.provider()?;
        {
            let s = self.state.read().await;
            if !s.connected {
                return Err(AppError::NotConnected);
            }
            if s.chain_ok() {
                return Ok(());
            }
        }

        let expected = self.config.expected_chain_id;
        log::info!("asking wallet to switch to chain {}", expected);
        match self
            .ask("wallet_switchEthereumChain", provider.switch_chain(expected))
            .await?
        {
            Ok(()) => {}
            Err(ProviderError::UnrecognizedChain) => {
                self.add_and_retry(provider, expected).await?;
            }
            Err(ProviderError::Rejected) => return Err(AppError::UserRejected),
            Err(e) => return Err(AppError::ChainUnavailable(e.to_string())),
        }

        let chain_id = provider.chain_id().await?;
        if !self.is_current(epoch) {
            return Err(AppError::SessionChanged);
        }
        let ready = {
            let mut s = self.state.write().await;
            self.set_chain(&mut s, chain_id).await;
            s.state == SessionState::Ready
        };
        if !ready {
            return Err(AppError::WrongNetwork {
                expected,
                actual: Some(chain_id),
            });
        }
        self.refresh_or_record(epoch).await;
        Ok(())
    }

    async fn add_and_retry(&self, provider: &P, expected: u64) -> Result<(), AppError> {
        let network = self.config.network_descriptor()?;
        log::info!("wallet does not know chain {}, adding {}", expected, network.chain_name);
        match self
            .ask("wallet_addEthereumChain", provider.add_chain(&network))
            .await?
        {
            Ok(()) => {}
            Err(ProviderError::Rejected) => return Err(AppError::UserRejected),
            Err(e) => return Err(AppError::ChainUnavailable(e.to_string())),
        }
        // exactly one retry
        match self
            .ask("wallet_switchEthereumChain", provider.switch_chain(expected))
            .await?
        {
            Ok(()) => Ok(()),
            Err(ProviderError::Rejected) => Err(AppError::UserRejected),
            Err(e) => Err(AppError::ChainUnavailable(e.to_string())),
        }
    }

    async fn chain_changed(&self, chain_id: u64, epoch: u64) {
        if !self.is_current(epoch) {
            log::debug!("chain {} superseded by an account change", chain_id);
            return;
        }
        let ready = {
            let mut s = self.state.write().await;
            self.set_chain(&mut s, chain_id).await;
            s.state == SessionState::Ready
        };
        if ready {
            self.refresh_or_record(epoch).await;
        }
    }

    async fn set_chain(&self, s: &mut Session, chain_id: u64) {
        if s.chain_id != Some(chain_id) {
            log::info!("chain is now {} (expected {})", chain_id, s.expected_chain_id);
            self.tokens.lock().await.invalidate();
        }
        s.chain_id = Some(chain_id);
        s.state = s.settled_state();
    }

    async fn refresh_locked(&self, epoch: u64) -> Result<(), AppError> {
        let (address, chain_id) = {
            let mut s = self.state.write().await;
            if !s.connected {
                return Err(AppError::NotConnected);
            }
            if !s.chain_ok() {
                return Err(AppError::WrongNetwork {
                    expected: s.expected_chain_id,
                    actual: s.chain_id,
                });
            }
            let (Some(address), Some(chain_id)) = (s.address, s.chain_id) else {
                return Err(AppError::NotConnected);
            };
            if self.is_current(epoch) {
                s.state = SessionState::Refreshing;
            }
            (address, chain_id)
        };

        let retry = self.config.retry_policy();
        let client = self.client.as_ref();
        let native = retry.run("eth_getBalance", || client.get_balance(address));
        let tokens = join_all(
            self.config
                .tokens
                .iter()
                .map(|&token| self.read_token(epoch, chain_id, token, address)),
        );
        let (native, tokens) = tokio::join!(native, tokens);

        if !self.is_current(epoch) {
            log::debug!("refresh for {} dropped, session changed meanwhile", address);
            return Ok(());
        }

        let (symbol, decimals) = self.native_currency();
        let mut s = self.state.write().await;
        let cache = self.tokens.lock().await;
        let mut failure = None;
        match native {
            Ok(raw) => {
                s.balances.insert(symbol, TokenAmount::new(raw, decimals));
            }
            Err(e) => {
                log::warn!("native balance of {} unavailable: {}", address, e);
                failure = Some(e);
            }
        }
        for (token, result) in self.config.tokens.iter().zip(tokens) {
            match result {
                Ok((descriptor, raw)) => {
                    s.token_errors.remove(&token.to_string());
                    s.token_errors.remove(&descriptor.symbol);
                    s.balances.insert(descriptor.symbol.clone(), descriptor.amount(raw));
                }
                Err(e) => {
                    let key = cache
                        .get(chain_id, token)
                        .map(|d| d.symbol.clone())
                        .unwrap_or_else(|| token.to_string());
                    log::warn!("balance of {} unavailable: {}", key, e);
                    s.token_errors.insert(key, e.payload());
                }
            }
        }
        s.state = SessionState::Ready;
        match failure {
            Some(e) => Err(e),
            None => {
                s.last_error = None;
                Ok(())
            }
        }
    }

    async fn read_token(
        &self,
        epoch: u64,
        chain_id: u64,
        token: Address,
        owner: Address,
    ) -> Result<(TokenDescriptor, U256), AppError> {
        let descriptor = self.descriptor_on(epoch, chain_id, token).await?;
        let raw = balance_of(self.client.as_ref(), &self.config.retry_policy(), token, owner).await?;
        Ok((descriptor, raw))
    }

    async fn descriptor_on(
        &self,
        epoch: u64,
        chain_id: u64,
        token: Address,
    ) -> Result<TokenDescriptor, AppError> {
        if let Some(cached) = self.tokens.lock().await.get(chain_id, &token).cloned() {
            return Ok(cached);
        }
        let descriptor = fetch_descriptor(self.client.as_ref(), &self.config.retry_policy(), token).await?;
        let mut cache = self.tokens.lock().await;
        if self.is_current(epoch) {
            cache.insert(chain_id, descriptor.clone());
        }
        Ok(descriptor)
    }

    async fn refresh_or_record(&self, epoch: u64) {
        if let Err(e) = self.refresh_locked(epoch).await {
            log::warn!("balance refresh failed: {}", e);
            if self.is_current(epoch) {
                self.state.write().await.last_error = Some(e.payload());
            }
        }
    }

    /// Leaves a dropped refresh or connect behind.
    async fn settle_state(&self, epoch: u64) {
        if self.is_current(epoch) {
            let mut s = self.state.write().await;
            s.state = s.settled_state();
        }
    }

    async fn restore(&self, epoch: u64, prior: SessionState) {
        if self.is_current(epoch) {
            self.state.write().await.state = prior;
        }
    }

    /// Wallet round trip bounded by the approval timeout. The outer error is
    /// the timeout, the inner one what the wallet answered.
    async fn ask<T, F>(&self, method: &'static str, request: F) -> Result<Result<T, ProviderError>, AppError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let limit = self.config.approval_timeout();
        tokio::time::timeout(limit, request).await.map_err(|_| {
            log::warn!("{} got no answer within {:?}, abandoning", method, limit);
            AppError::RequestTimeout(method)
        })
    }

    fn provider(&self) -> Result<&P, AppError> {
        self.provider.as_deref().ok_or(AppError::ProviderMissing)
    }

    fn native_currency(&self) -> (String, u8) {
        self.config
            .network_descriptor()
            .map(|n| (n.native_currency.symbol, n.native_currency.decimals))
            .unwrap_or_else(|_| ("ETH".to_string(), 18))
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    // ==================== shared with actions ====================

    /// Takes the operation lock. Returns the epoch the operation runs under.
    pub(crate) async fn begin(&self) -> (MutexGuard<'_, ()>, u64) {
        let guard = self.op_lock.lock().await;
        self.chain_mark
            .store(self.chain_events.load(Ordering::SeqCst), Ordering::SeqCst);
        (guard, self.epoch.load(Ordering::SeqCst))
    }

    pub(crate) async fn settle<T>(&self, epoch: u64, result: Result<T, AppError>) -> Result<T, AppError> {
        if let Err(e) = &result {
            if self.is_current(epoch) {
                self.state.write().await.last_error = Some(e.payload());
            }
        }
        result
    }

    /// Fails once an account change, a chain change or a disconnect arrived
    /// after the running operation began.
    pub(crate) fn ensure_current(&self, epoch: u64) -> Result<(), AppError> {
        let chain_moved =
            self.chain_events.load(Ordering::SeqCst) != self.chain_mark.load(Ordering::SeqCst);
        if self.is_current(epoch) && !chain_moved {
            Ok(())
        } else {
            Err(AppError::SessionChanged)
        }
    }

    /// The connected account, provided the wallet is on the expected chain.
    pub(crate) async fn ready_account(&self) -> Result<Address, AppError> {
        let s = self.state.read().await;
        if !s.connected {
            return Err(AppError::NotConnected);
        }
        if !s.chain_ok() {
            return Err(AppError::WrongNetwork {
                expected: s.expected_chain_id,
                actual: s.chain_id,
            });
        }
        s.address.ok_or(AppError::NotConnected)
    }

    pub(crate) async fn token_descriptor(&self, epoch: u64, token: Address) -> Result<TokenDescriptor, AppError> {
        let chain_id = self.state.read().await.chain_id.ok_or(AppError::NotConnected)?;
        self.descriptor_on(epoch, chain_id, token).await
    }

    /// Last-known balance, or None when unknown or stale.
    pub(crate) async fn known_balance(&self, symbol: &str) -> Option<TokenAmount> {
        let s = self.state.read().await;
        if s.balances_stale() {
            return None;
        }
        s.balances.get(symbol).copied()
    }

    /// Local pre-check against the last-known balance. Unknown balances pass;
    /// the chain has the final word.
    pub(crate) async fn check_funds(&self, symbol: &str, requested: TokenAmount) -> Result<(), AppError> {
        match self.known_balance(symbol).await {
            Some(available) if available.raw < requested.raw => Err(AppError::InsufficientFunds {
                symbol: symbol.to_string(),
                available: available.formatted(),
                requested: requested.formatted(),
            }),
            _ => Ok(()),
        }
    }

    /// Submits a contract call through the wallet and waits for it to confirm.
    pub(crate) async fn send_call<S: SolCall>(
        &self,
        from: Address,
        to: Address,
        call: &S,
    ) -> Result<TxReceipt, AppError> {
        let tx = tx_request(from, to, call);
        let label = describe_calldata(&tx.data);
        log::info!("submitting {} to {}", label, to);
        let hash = tokio::time::timeout(self.config.approval_timeout(), self.client.send_transaction(tx))
            .await
            .map_err(|_| AppError::RequestTimeout("eth_sendTransaction"))??;
        let mut pending = PendingTransaction::new(hash);
        let receipt =
            wait_for_confirmation(self.client.as_ref(), &mut pending, &self.config.confirmation_policy()).await?;
        log::info!("{} {} confirmed", label, hash);
        Ok(receipt)
    }

    pub(crate) async fn refresh_after_write(&self, epoch: u64) {
        if self.is_current(epoch) {
            self.refresh_or_record(epoch).await;
        }
    }

    pub(crate) async fn record(&self, entry: TransactionHistoryEntry) {
        self.history.lock().await.push(entry);
    }
}

impl<P, C> WalletSession<P, C>
where
    P: WalletProvider + 'static,
    C: ChainClient + 'static,
{
    /// Observes a transaction sent outside the session on its own task.
    /// Dropping the watch stops polling.
    pub fn watch_transaction(&self, hash: B256) -> ConfirmationWatch {
        ConfirmationWatch::spawn(
            self.client.clone(),
            PendingTransaction::new(hash),
            self.config.confirmation_policy(),
        )
    }

    /// Forwards provider events to the session until the provider stops
    /// sending or the session is dropped.
    pub fn listen(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut events = self.provider.as_ref()?.subscribe();
        let session = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(session) = session.upgrade() else {
                    break;
                };
                if let Err(e) = session.handle_event(event).await {
                    log::warn!("provider event failed: {}", e);
                }
            }
            log::debug!("provider event stream closed");
        }))
    }
}
