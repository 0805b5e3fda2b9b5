use alloy_primitives::{Address, B256};
use serde::Serialize;

use crate::core::session::WalletSession;
use crate::eips::eip1193::WalletProvider;
use crate::error::AppError;
use crate::evm::abi::IERC20;
use crate::evm::token::TokenAmount;
use crate::rpc::client::ChainClient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub hash: B256,
    pub symbol: String,
    pub to: Address,
    pub amount: TokenAmount,
}

/// Sends `amount` (decimal text, in the token's own units) of an ERC-20 to `to`.
pub async fn transfer_token<P, C>(
    session: &WalletSession<P, C>,
    token: Address,
    to: Address,
    amount: &str,
) -> Result<TransferReceipt, AppError>
where
    P: WalletProvider,
    C: ChainClient,
{
    let (_guard, epoch) = session.begin().await;
    let result = async {
        if to == Address::ZERO {
            return Err(AppError::InvalidAddress);
        }
        let from = session.ready_account().await?;
        let descriptor = session.token_descriptor(epoch, token).await?;
        let amount = descriptor.parse_amount(amount)?;
        if amount.is_zero() {
            return Err(AppError::InvalidInput("amount must be greater than zero".into()));
        }
        session.check_funds(&descriptor.symbol, amount).await?;

        session.ensure_current(epoch)?;
        let call = IERC20::transferCall { to, amount: amount.raw };
        let receipt = session.send_call(from, token, &call).await?;
        log::info!("sent {} {} to {}", amount, descriptor.symbol, to);
        session.refresh_after_write(epoch).await;

        Ok(TransferReceipt {
            hash: receipt.transaction_hash,
            symbol: descriptor.symbol,
            to,
            amount,
        })
    }
    .await;
    session.settle(epoch, result).await
}
