use std::sync::Arc;

use alloy_primitives::{B256, U256};
use serde::Serialize;

use crate::actions::simulate::{apr_for_period, estimate, YieldEstimate, BPS, DAYS_PER_YEAR};
use crate::core::config::PoolConfig;
use crate::core::session::WalletSession;
use crate::data::history::{TransactionHistoryEntry, TxKind};
use crate::eips::eip1193::WalletProvider;
use crate::error::AppError;
use crate::evm::abi::{ILPFarming, IERC20};
use crate::evm::contract::read_contract;
use crate::evm::token::{allowance, TokenAmount, TokenDescriptor};
use crate::rpc::client::ChainClient;
use crate::utils::time::now_s;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepositReceipt {
    /// set when an approval had to be sent first
    pub approval: Option<B256>,
    pub deposit: B256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentStatus {
    Active,
    Matured,
    Withdrawn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Investment {
    pub id: U256,
    pub amount: TokenAmount,
    pub start_time: u64,
    pub end_time: u64,
    pub period_days: u64,
    pub apr_bps: u64,
    pub active: bool,
    pub daily_return: TokenAmount,
}

impl Investment {
    pub fn current_status(&self) -> InvestmentStatus {
        self.status(now_s())
    }

    pub fn status(&self, now: u64) -> InvestmentStatus {
        match (self.active, now >= self.end_time) {
            (false, _) => InvestmentStatus::Withdrawn,
            (true, false) => InvestmentStatus::Active,
            (true, true) => InvestmentStatus::Matured,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserBalance {
    pub total_invested: TokenAmount,
    pub pending_rewards: TokenAmount,
    pub total_earned: TokenAmount,
    pub active_investments: u64,
}

/// Writes and reads against the LP farming contract for the session's account.
pub struct FarmingPool<P, C> {
    session: Arc<WalletSession<P, C>>,
    config: PoolConfig,
}

impl<P, C> FarmingPool<P, C>
where
    P: WalletProvider,
    C: ChainClient,
{
    pub fn new(session: Arc<WalletSession<P, C>>) -> Result<Self, AppError> {
        let config = session
            .config()
            .pool
            .clone()
            .ok_or_else(|| AppError::InvalidInput("no farming pool configured".into()))?;
        Ok(Self { session, config })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// allowance → approve (confirmed) → allowance again → deposit (confirmed) → refresh
    pub async fn deposit(&self, amount: &str, period_days: u64) -> Result<DepositReceipt, AppError> {
        let (_guard, epoch) = self.session.begin().await;
        let result = self.deposit_locked(epoch, amount, period_days).await;
        self.session.settle(epoch, result).await
    }

    async fn deposit_locked(&self, epoch: u64, amount: &str, period_days: u64) -> Result<DepositReceipt, AppError> {
        self.check_period(period_days)?;
        let owner = self.session.ready_account().await?;
        let token = self.session.token_descriptor(epoch, self.config.deposit_token).await?;
        let amount = parse_positive(&token, amount)?;
        self.session.check_funds(&token.symbol, amount).await?;

        let client = self.session.client().as_ref();
        let retry = self.session.config().retry_policy();
        let spender = self.config.address;

        let mut approval = None;
        let current = allowance(client, &retry, token.address, owner, spender).await?;
        if current < amount.raw {
            log::info!(
                "allowance {} {} below {}, approving",
                token.amount(current),
                token.symbol,
                amount
            );
            let call = IERC20::approveCall { spender, amount: amount.raw };
            let receipt = self.session.send_call(owner, token.address, &call).await?;
            self.session
                .record(TransactionHistoryEntry::completed(
                    TxKind::Approval,
                    receipt.transaction_hash,
                    Some(amount),
                    None,
                ))
                .await;
            approval = Some(receipt.transaction_hash);

            self.session.ensure_current(epoch)?;
            let granted = allowance(client, &retry, token.address, owner, spender).await?;
            if granted < amount.raw {
                log::warn!("allowance {} still below {} after approval", granted, amount.raw);
                return Err(AppError::ApprovalRaceLost);
            }
        }

        self.session.ensure_current(epoch)?;
        let call = ILPFarming::depositCall {
            amount: amount.raw,
            periodDays: U256::from(period_days),
        };
        let receipt = self.session.send_call(owner, self.config.address, &call).await?;
        self.session
            .record(TransactionHistoryEntry::completed(
                TxKind::Investment,
                receipt.transaction_hash,
                Some(amount),
                Some(period_days),
            ))
            .await;
        self.session.refresh_after_write(epoch).await;

        Ok(DepositReceipt {
            approval,
            deposit: receipt.transaction_hash,
        })
    }

    pub async fn claim_rewards(&self) -> Result<B256, AppError> {
        self.write(TxKind::Claim, None, &ILPFarming::claimRewardsCall {}).await
    }

    pub async fn reinvest_rewards(&self, period_days: u64) -> Result<B256, AppError> {
        self.check_period(period_days)?;
        let call = ILPFarming::reinvestRewardsCall {
            periodDays: U256::from(period_days),
        };
        self.write(TxKind::Reinvestment, Some(period_days), &call).await
    }

    pub async fn withdraw_capital(&self, investment_id: U256) -> Result<B256, AppError> {
        let call = ILPFarming::withdrawCapitalCall {
            investmentId: investment_id,
        };
        self.write(TxKind::Withdrawal, None, &call).await
    }

    async fn write<S: alloy_sol_types::SolCall>(
        &self,
        kind: TxKind,
        plan: Option<u64>,
        call: &S,
    ) -> Result<B256, AppError> {
        let (_guard, epoch) = self.session.begin().await;
        let result = async {
            let owner = self.session.ready_account().await?;
            let receipt = self.session.send_call(owner, self.config.address, call).await?;
            self.session
                .record(TransactionHistoryEntry::completed(
                    kind,
                    receipt.transaction_hash,
                    None,
                    plan,
                ))
                .await;
            self.session.refresh_after_write(epoch).await;
            Ok(receipt.transaction_hash)
        }
        .await;
        self.session.settle(epoch, result).await
    }

    pub async fn user_investments(&self) -> Result<Vec<Investment>, AppError> {
        let (_guard, epoch) = self.session.begin().await;
        let result = self.investments_locked(epoch).await;
        self.session.settle(epoch, result).await
    }

    async fn investments_locked(&self, epoch: u64) -> Result<Vec<Investment>, AppError> {
        let owner = self.session.ready_account().await?;
        let token = self.session.token_descriptor(epoch, self.config.deposit_token).await?;
        let r = read_contract(
            self.session.client().as_ref(),
            &self.session.config().retry_policy(),
            self.config.address,
            &ILPFarming::getUserInvestmentsCall { user: owner },
        )
        .await?;

        let n = r.ids.len();
        let lengths = [
            r.amounts.len(),
            r.startTimes.len(),
            r.endTimes.len(),
            r.periods.len(),
            r.aprs.len(),
            r.activeStatus.len(),
        ];
        if lengths.iter().any(|&len| len != n) {
            return Err(AppError::RpcError(
                "getUserInvestments returned arrays of different lengths".into(),
            ));
        }

        (0..n)
            .map(|i| {
                let amount = r.amounts[i];
                let daily = amount
                    .checked_mul(r.aprs[i])
                    .ok_or(AppError::InvalidNumber)?
                    / U256::from(BPS * DAYS_PER_YEAR);
                Ok(Investment {
                    id: r.ids[i],
                    amount: token.amount(amount),
                    start_time: to_u64(r.startTimes[i])?,
                    end_time: to_u64(r.endTimes[i])?,
                    period_days: to_u64(r.periods[i])?,
                    apr_bps: to_u64(r.aprs[i])?,
                    active: r.activeStatus[i],
                    daily_return: token.amount(daily),
                })
            })
            .collect()
    }

    pub async fn user_balance(&self) -> Result<UserBalance, AppError> {
        let (_guard, epoch) = self.session.begin().await;
        let result = async {
            let owner = self.session.ready_account().await?;
            let token = self.session.token_descriptor(epoch, self.config.deposit_token).await?;
            let r = read_contract(
                self.session.client().as_ref(),
                &self.session.config().retry_policy(),
                self.config.address,
                &ILPFarming::getUserBalanceCall { user: owner },
            )
            .await?;
            Ok(UserBalance {
                total_invested: token.amount(r.totalInvested),
                pending_rewards: token.amount(r.pendingRewards),
                total_earned: token.amount(r.totalEarned),
                active_investments: to_u64(r.activeInvestments)?,
            })
        }
        .await;
        self.session.settle(epoch, result).await
    }

    pub async fn daily_yield(&self) -> Result<TokenAmount, AppError> {
        let (_guard, epoch) = self.session.begin().await;
        let result = async {
            let owner = self.session.ready_account().await?;
            let token = self.session.token_descriptor(epoch, self.config.deposit_token).await?;
            let r = read_contract(
                self.session.client().as_ref(),
                &self.session.config().retry_policy(),
                self.config.address,
                &ILPFarming::getDailyYieldCall { user: owner },
            )
            .await?;
            Ok(token.amount(r.dailyYield))
        }
        .await;
        self.session.settle(epoch, result).await
    }

    /// Estimate in the deposit token's units with the period's APR and the pool fee.
    pub async fn simulate(&self, amount: &str, period_days: u64) -> Result<YieldEstimate, AppError> {
        let (guard, epoch) = self.session.begin().await;
        let token = self.session.token_descriptor(epoch, self.config.deposit_token).await?;
        drop(guard);
        let amount = parse_positive(&token, amount)?;
        let apr = apr_for_period(period_days).unwrap_or(self.config.default_apr_bps);
        estimate(amount, period_days, apr, self.config.fee_bps)
    }

    fn check_period(&self, period_days: u64) -> Result<(), AppError> {
        if self.config.investment_periods.contains(&period_days) {
            Ok(())
        } else {
            Err(AppError::InvalidInput(format!(
                "investment period must be one of {:?} days",
                self.config.investment_periods
            )))
        }
    }
}

fn parse_positive(token: &TokenDescriptor, amount: &str) -> Result<TokenAmount, AppError> {
    let amount = token.parse_amount(amount)?;
    if amount.is_zero() {
        return Err(AppError::InvalidInput("amount must be greater than zero".into()));
    }
    Ok(amount)
}

fn to_u64(value: U256) -> Result<u64, AppError> {
    u64::try_from(value).map_err(|_| AppError::InvalidNumber)
}
