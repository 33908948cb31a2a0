/*
 * V3 position manager encodings
 */

use super::apply_slippage;
use crate::models::Transaction;
use crate::utils::{encode_call, int24_token};
use ethers::abi::Token;
use ethers::types::{Address, U256};

pub struct MintParams {
    pub token0: Address,
    pub token1: Address,
    pub fee: u32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub amount0: U256,
    pub amount1: U256,
    pub slippage_bps: u32,
    pub recipient: Address,
}

#[must_use]
pub fn mint(position_manager: Address, params: &MintParams, deadline: U256) -> Transaction {
    let calldata = encode_call(
        "mint((address,address,uint24,int24,int24,uint256,uint256,uint256,uint256,address,uint256))",
        &[Token::Tuple(vec![
            Token::Address(params.token0),
            Token::Address(params.token1),
            Token::Uint(params.fee.into()),
            int24_token(params.tick_lower),
            int24_token(params.tick_upper),
            Token::Uint(params.amount0),
            Token::Uint(params.amount1),
            Token::Uint(apply_slippage(params.amount0, params.slippage_bps)),
            Token::Uint(apply_slippage(params.amount1, params.slippage_bps)),
            Token::Address(params.recipient),
            Token::Uint(deadline),
        ])],
    );
    Transaction::new(position_manager, calldata, U256::zero())
}

#[must_use]
pub fn increase_liquidity(
    position_manager: Address,
    token_id: U256,
    amount0: U256,
    amount1: U256,
    slippage_bps: u32,
    deadline: U256,
) -> Transaction {
    let calldata = encode_call(
        "increaseLiquidity((uint256,uint256,uint256,uint256,uint256,uint256))",
        &[Token::Tuple(vec![
            Token::Uint(token_id),
            Token::Uint(amount0),
            Token::Uint(amount1),
            Token::Uint(apply_slippage(amount0, slippage_bps)),
            Token::Uint(apply_slippage(amount1, slippage_bps)),
            Token::Uint(deadline),
        ])],
    );
    Transaction::new(position_manager, calldata, U256::zero())
}

#[must_use]
pub fn decrease_liquidity(
    position_manager: Address,
    token_id: U256,
    liquidity: U256,
    expected0: U256,
    expected1: U256,
    slippage_bps: u32,
    deadline: U256,
) -> Transaction {
    let calldata = encode_call(
        "decreaseLiquidity((uint256,uint128,uint256,uint256,uint256))",
        &[Token::Tuple(vec![
            Token::Uint(token_id),
            Token::Uint(liquidity),
            Token::Uint(apply_slippage(expected0, slippage_bps)),
            Token::Uint(apply_slippage(expected1, slippage_bps)),
            Token::Uint(deadline),
        ])],
    );
    Transaction::new(position_manager, calldata, U256::zero())
}

/// Burns the NFT itself; the position must already be emptied.
#[must_use]
pub fn burn(position_manager: Address, token_id: U256) -> Transaction {
    let calldata = encode_call("burn(uint256)", &[Token::Uint(token_id)]);
    Transaction::new(position_manager, calldata, U256::zero())
}

#[must_use]
pub fn create_pool(
    position_manager: Address,
    token0: Address,
    token1: Address,
    fee: u32,
    sqrt_price_x96: U256,
) -> Transaction {
    let calldata = encode_call(
        "createAndInitializePoolIfNecessary(address,address,uint24,uint160)",
        &[
            Token::Address(token0),
            Token::Address(token1),
            Token::Uint(fee.into()),
            Token::Uint(sqrt_price_x96),
        ],
    );
    Transaction::new(position_manager, calldata, U256::zero())
}
