use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;

use crate::error::AppError;
use crate::rpc::client::{ChainClient, RetryPolicy, TxRequest};

/// eth_call + ABI decode, with the read retry policy applied to the call.
pub async fn read_contract<R, C>(
    client: &R,
    retry: &RetryPolicy,
    to: Address,
    call: &C,
) -> Result<C::Return, AppError>
where
    R: ChainClient + ?Sized,
    C: SolCall,
{
    let data = Bytes::from(call.abi_encode());
    let output = retry
        .run(C::SIGNATURE, move || client.call(to, data.clone()))
        .await?;
    Ok(C::abi_decode_returns(&output, true)?)
}

pub fn tx_request<C: SolCall>(from: Address, to: Address, call: &C) -> TxRequest {
    TxRequest {
        from,
        to,
        value: U256::ZERO,
        data: Bytes::from(call.abi_encode()),
    }
}

/// Name of the contract function a calldata blob targets, for logs.
pub fn describe_calldata(data: &[u8]) -> &'static str {
    use crate::evm::abi::{ILPFarming, IERC20};

    let Some(selector) = data.get(..4) else {
        return "transfer";
    };
    match selector {
        s if s == IERC20::approveCall::SELECTOR => "approve",
        s if s == IERC20::transferCall::SELECTOR => "transfer",
        s if s == ILPFarming::depositCall::SELECTOR => "deposit",
        s if s == ILPFarming::claimRewardsCall::SELECTOR => "claimRewards",
        s if s == ILPFarming::reinvestRewardsCall::SELECTOR => "reinvestRewards",
        s if s == ILPFarming::withdrawCapitalCall::SELECTOR => "withdrawCapital",
        _ => "unknown",
    }
}
