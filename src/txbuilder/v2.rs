/*
 * V2 router liquidity encodings
 */

use super::apply_slippage;
use crate::models::Transaction;
use crate::utils::encode_call;
use ethers::abi::Token;
use ethers::types::{Address, U256};

/// `addLiquidity` with slippage-adjusted minimums. The first add against an
/// unseen pair also creates it; V2 has no separate init step.
#[must_use]
pub fn add_liquidity(
    router: Address,
    token_a: Address,
    token_b: Address,
    amount_a: U256,
    amount_b: U256,
    slippage_bps: u32,
    recipient: Address,
    deadline: U256,
) -> Transaction {
    let calldata = encode_call(
        "addLiquidity(address,address,uint256,uint256,uint256,uint256,address,uint256)",
        &[
            Token::Address(token_a),
            Token::Address(token_b),
            Token::Uint(amount_a),
            Token::Uint(amount_b),
            Token::Uint(apply_slippage(amount_a, slippage_bps)),
            Token::Uint(apply_slippage(amount_b, slippage_bps)),
            Token::Address(recipient),
            Token::Uint(deadline),
        ],
    );
    Transaction::new(router, calldata, U256::zero())
}

/// `removeLiquidity` burning LP tokens back into the underlying pair.
/// Minimums are the caller's expected amounts after slippage.
#[must_use]
pub fn remove_liquidity(
    router: Address,
    token_a: Address,
    token_b: Address,
    liquidity: U256,
    expected_a: U256,
    expected_b: U256,
    slippage_bps: u32,
    recipient: Address,
    deadline: U256,
) -> Transaction {
    let calldata = encode_call(
        "removeLiquidity(address,address,uint256,uint256,uint256,address,uint256)",
        &[
            Token::Address(token_a),
            Token::Address(token_b),
            Token::Uint(liquidity),
            Token::Uint(apply_slippage(expected_a, slippage_bps)),
            Token::Uint(apply_slippage(expected_b, slippage_bps)),
            Token::Address(recipient),
            Token::Uint(deadline),
        ],
    );
    Transaction::new(router, calldata, U256::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::from_low_u64_be(u64::from(n))
    }

    #[test]
    fn add_liquidity_encodes_selector_and_minimums() {
        let tx = add_liquidity(
            addr(9),
            addr(1),
            addr(2),
            U256::from(1_000_000u64),
            U256::from(2_000_000u64),
            50,
            addr(3),
            U256::from(1_700_000_000u64),
        );
        assert!(tx.data.starts_with("0xe8e33700"));
        assert_eq!(tx.to, addr(9));
        // selector + eight words
        assert_eq!(tx.data.len(), 2 + 8 + 64 * 8);

        // amountAMin sits in the fifth argument word.
        let word = |i: usize| &tx.data[2 + 8 + 64 * i..2 + 8 + 64 * (i + 1)];
        let amount_a_min = U256::from_str_radix(word(4), 16).unwrap();
        let amount_b_min = U256::from_str_radix(word(5), 16).unwrap();
        assert_eq!(amount_a_min, U256::from(995_000u64));
        assert_eq!(amount_b_min, U256::from(1_990_000u64));
    }

    #[test]
    fn remove_liquidity_encodes_seven_words() {
        let tx = remove_liquidity(
            addr(9),
            addr(1),
            addr(2),
            U256::from(500u64),
            U256::from(100u64),
            U256::from(200u64),
            0,
            addr(3),
            U256::one(),
        );
        assert_eq!(tx.data.len(), 2 + 8 + 64 * 7);
        assert_eq!(tx.value, "0");
    }
}
