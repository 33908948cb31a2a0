/*
 * Transaction builders: shared slippage, deadline and approval helpers
 */

pub mod v2;
pub mod v3;
pub mod v4;

use crate::models::{EngineError, Result, Transaction};
use crate::utils::encode_call;
use chrono::Utc;
use ethers::abi::Token;
use ethers::types::{Address, U256};

/// Transactions expire 20 minutes after building.
pub const DEADLINE_SECONDS: i64 = 20 * 60;

#[must_use]
pub fn deadline() -> U256 {
    let expiry = Utc::now().timestamp() + DEADLINE_SECONDS;
    #[allow(clippy::cast_sign_loss)]
    U256::from(expiry as u64)
}

/// Converts a percent tolerance (0-100, default 0.5) to basis points.
pub fn slippage_bps(percent: Option<f64>) -> Result<u32> {
    let percent = percent.unwrap_or(0.5);
    if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
        return Err(EngineError::InvalidInput(format!(
            "Slippage must be between 0 and 100 percent, got {percent}"
        )));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok((percent * 100.0).round() as u32)
}

/// `amount * (10000 - bps) / 10000`, the minimum acceptable after slippage.
#[must_use]
pub fn apply_slippage(amount: U256, bps: u32) -> U256 {
    amount * U256::from(10_000 - bps.min(10_000)) / U256::from(10_000u32)
}

/// Plain ERC20 approval, used directly by V2/V3 and as the first Permit2 leg
/// for V4.
#[must_use]
pub fn erc20_approve(token: Address, spender: Address, amount: U256) -> Transaction {
    let calldata = encode_call(
        "approve(address,uint256)",
        &[Token::Address(spender), Token::Uint(amount)],
    );
    Transaction::new(token, calldata, U256::zero())
}
