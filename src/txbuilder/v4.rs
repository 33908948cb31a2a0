/*
 * V4 position manager encodings: action-multiplexed modifyLiquidities,
 * pool initialization, and the Permit2 two-step approval flow
 */

use super::erc20_approve;
use crate::models::{EngineError, Result, Transaction};
use crate::protocols::v4::PoolKey;
use crate::rpc::{CallRequest, RpcGateway};
use crate::utils::{abi_decode, encode_call, int24_token, token_uint};
use ethers::abi::{encode, ParamType, Token};
use ethers::types::{Address, U256};

// Action codes of the deployed periphery. These are an external contract
// interface; the values must match the deployment byte for byte.
pub const ACTION_INCREASE_LIQUIDITY: u8 = 0x00;
pub const ACTION_DECREASE_LIQUIDITY: u8 = 0x01;
pub const ACTION_MINT_POSITION: u8 = 0x02;
pub const ACTION_BURN_POSITION: u8 = 0x03;
pub const ACTION_TAKE_PAIR: u8 = 0x11;
pub const ACTION_CLOSE_CURRENCY: u8 = 0x12;

/// Permit2 approvals expire 30 days out.
pub const PERMIT2_EXPIRATION_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Wraps an action sequence into `modifyLiquidities(bytes,uint256)`:
/// `unlockData` is the ABI-encoded `(bytes actions, bytes[] params)` pair
/// where `params[i]` belongs to `actions[i]`.
fn modify_liquidities(
    position_manager: Address,
    actions: &[u8],
    params: Vec<Vec<u8>>,
    deadline: U256,
    value: U256,
) -> Transaction {
    let unlock_data = encode(&[
        Token::Bytes(actions.to_vec()),
        Token::Array(params.into_iter().map(Token::Bytes).collect()),
    ]);
    let calldata = encode_call(
        "modifyLiquidities(bytes,uint256)",
        &[Token::Bytes(unlock_data), Token::Uint(deadline)],
    );
    Transaction::new(position_manager, calldata, value)
}

fn require_sorted(key: &PoolKey) -> Result<()> {
    if key.is_sorted() {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(format!(
            "Currency pair must be sorted: {:?} >= {:?}",
            key.currency0, key.currency1
        )))
    }
}

/// Native-currency positions carry the token0 amount as transaction value
/// instead of an approval.
fn native_value(currency0: Address, amount0_max: U256) -> U256 {
    if currency0 == Address::zero() {
        amount0_max
    } else {
        U256::zero()
    }
}

pub struct V4MintParams {
    pub pool_key: PoolKey,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: U256,
    pub amount0_max: U256,
    pub amount1_max: U256,
    pub recipient: Address,
}

/// Mint settles both currencies through Permit2:
/// `[MINT_POSITION, CLOSE_CURRENCY, CLOSE_CURRENCY]`.
pub fn mint(position_manager: Address, params: &V4MintParams, deadline: U256) -> Result<Transaction> {
    require_sorted(&params.pool_key)?;
    let mint_param = encode(&[
        params.pool_key.abi_token(),
        int24_token(params.tick_lower),
        int24_token(params.tick_upper),
        Token::Uint(params.liquidity),
        Token::Uint(params.amount0_max),
        Token::Uint(params.amount1_max),
        Token::Address(params.recipient),
        Token::Bytes(Vec::new()),
    ]);
    let close0 = encode(&[Token::Address(params.pool_key.currency0)]);
    let close1 = encode(&[Token::Address(params.pool_key.currency1)]);
    Ok(modify_liquidities(
        position_manager,
        &[ACTION_MINT_POSITION, ACTION_CLOSE_CURRENCY, ACTION_CLOSE_CURRENCY],
        vec![mint_param, close0, close1],
        deadline,
        native_value(params.pool_key.currency0, params.amount0_max),
    ))
}

/// `[INCREASE_LIQUIDITY, CLOSE_CURRENCY, CLOSE_CURRENCY]`.
#[allow(clippy::too_many_arguments)]
pub fn increase(
    position_manager: Address,
    token_id: U256,
    liquidity: U256,
    amount0_max: U256,
    amount1_max: U256,
    currency0: Address,
    currency1: Address,
    deadline: U256,
) -> Transaction {
    let increase_param = encode(&[
        Token::Uint(token_id),
        Token::Uint(liquidity),
        Token::Uint(amount0_max),
        Token::Uint(amount1_max),
        Token::Bytes(Vec::new()),
    ]);
    let close0 = encode(&[Token::Address(currency0)]);
    let close1 = encode(&[Token::Address(currency1)]);
    modify_liquidities(
        position_manager,
        &[
            ACTION_INCREASE_LIQUIDITY,
            ACTION_CLOSE_CURRENCY,
            ACTION_CLOSE_CURRENCY,
        ],
        vec![increase_param, close0, close1],
        deadline,
        native_value(currency0, amount0_max),
    )
}

/// `[DECREASE_LIQUIDITY, TAKE_PAIR]` withdraws both sides to the recipient.
#[allow(clippy::too_many_arguments)]
pub fn decrease(
    position_manager: Address,
    token_id: U256,
    liquidity: U256,
    amount0_min: U256,
    amount1_min: U256,
    currency0: Address,
    currency1: Address,
    recipient: Address,
    deadline: U256,
) -> Transaction {
    let decrease_param = encode(&[
        Token::Uint(token_id),
        Token::Uint(liquidity),
        Token::Uint(amount0_min),
        Token::Uint(amount1_min),
        Token::Bytes(Vec::new()),
    ]);
    let take_pair = encode(&[
        Token::Address(currency0),
        Token::Address(currency1),
        Token::Address(recipient),
    ]);
    modify_liquidities(
        position_manager,
        &[ACTION_DECREASE_LIQUIDITY, ACTION_TAKE_PAIR],
        vec![decrease_param, take_pair],
        deadline,
        U256::zero(),
    )
}

/// `[BURN_POSITION, TAKE_PAIR]` removes the NFT and withdraws everything.
#[allow(clippy::too_many_arguments)]
pub fn burn(
    position_manager: Address,
    token_id: U256,
    amount0_min: U256,
    amount1_min: U256,
    currency0: Address,
    currency1: Address,
    recipient: Address,
    deadline: U256,
) -> Transaction {
    let burn_param = encode(&[
        Token::Uint(token_id),
        Token::Uint(amount0_min),
        Token::Uint(amount1_min),
        Token::Bytes(Vec::new()),
    ]);
    let take_pair = encode(&[
        Token::Address(currency0),
        Token::Address(currency1),
        Token::Address(recipient),
    ]);
    modify_liquidities(
        position_manager,
        &[ACTION_BURN_POSITION, ACTION_TAKE_PAIR],
        vec![burn_param, take_pair],
        deadline,
        U256::zero(),
    )
}

/// `PoolManager.initialize(poolKey, sqrtPriceX96)`; required once before the
/// first mint into a new pool.
pub fn initialize(
    pool_manager: Address,
    pool_key: &PoolKey,
    sqrt_price_x96: U256,
) -> Result<Transaction> {
    require_sorted(pool_key)?;
    let calldata = encode_call(
        "initialize((address,address,uint24,int24,address),uint160)",
        &[pool_key.abi_token(), Token::Uint(sqrt_price_x96)],
    );
    Ok(Transaction::new(pool_manager, calldata, U256::zero()))
}

/// Which of the two V4 approval legs are missing. Both allowances are
/// checked independently; only absent ones get a transaction.
#[must_use]
pub fn approvals_needed(
    amount: U256,
    erc20_allowance: U256,
    permit2_amount: U256,
    permit2_expiration: u64,
    now: u64,
) -> (bool, bool) {
    let erc20_needed = erc20_allowance < amount;
    let permit2_needed = permit2_amount < amount || permit2_expiration <= now;
    (erc20_needed, permit2_needed)
}

#[must_use]
pub fn permit2_approve(
    permit2: Address,
    token: Address,
    spender: Address,
    amount: U256,
    expiration: u64,
) -> Transaction {
    let calldata = encode_call(
        "approve(address,address,uint160,uint48)",
        &[
            Token::Address(token),
            Token::Address(spender),
            Token::Uint(amount),
            Token::Uint(expiration.into()),
        ],
    );
    Transaction::new(permit2, calldata, U256::zero())
}

/// Reads both allowances and emits only the approval transactions actually
/// missing for spending `amount` of `token` through Permit2.
pub struct ApprovalPlanner<'a> {
    gateway: &'a RpcGateway,
    permit2: Address,
    spender: Address,
}

impl<'a> ApprovalPlanner<'a> {
    #[must_use]
    pub fn new(gateway: &'a RpcGateway, permit2: Address, spender: Address) -> Self {
        Self {
            gateway,
            permit2,
            spender,
        }
    }

    pub async fn plan(
        &self,
        owner: Address,
        token: Address,
        amount: U256,
        now: u64,
    ) -> Result<Vec<Transaction>> {
        // Native currency needs no approvals; it travels as call value.
        if token == Address::zero() || amount.is_zero() {
            return Ok(Vec::new());
        }

        let calls = [
            CallRequest {
                target: token,
                calldata: encode_call(
                    "allowance(address,address)",
                    &[Token::Address(owner), Token::Address(self.permit2)],
                ),
            },
            CallRequest {
                target: self.permit2,
                calldata: encode_call(
                    "allowance(address,address,address)",
                    &[
                        Token::Address(owner),
                        Token::Address(token),
                        Token::Address(self.spender),
                    ],
                ),
            },
        ];
        let outcomes = self.gateway.multicall(&calls, false).await?;

        let erc20_allowance =
            token_uint(&abi_decode(&[ParamType::Uint(256)], &outcomes[0].data)?[0])?;
        let permit2_fields = abi_decode(
            &[
                ParamType::Uint(160),
                ParamType::Uint(48),
                ParamType::Uint(48),
            ],
            &outcomes[1].data,
        )?;
        let permit2_amount = token_uint(&permit2_fields[0])?;
        let permit2_expiration = token_uint(&permit2_fields[1])?.low_u64();

        let (erc20_needed, permit2_needed) = approvals_needed(
            amount,
            erc20_allowance,
            permit2_amount,
            permit2_expiration,
            now,
        );

        let mut transactions = Vec::new();
        if erc20_needed {
            transactions.push(erc20_approve(token, self.permit2, amount));
        }
        if permit2_needed {
            transactions.push(permit2_approve(
                self.permit2,
                token,
                self.spender,
                amount,
                now + PERMIT2_EXPIRATION_SECONDS,
            ));
        }
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::from_low_u64_be(u64::from(n))
    }

    fn pool_key() -> PoolKey {
        PoolKey {
            currency0: addr(1),
            currency1: addr(2),
            fee: 500,
            tick_spacing: 10,
            hooks: Address::zero(),
        }
    }

    fn decode_unlock(tx: &Transaction) -> (Vec<u8>, Vec<Vec<u8>>) {
        let calldata = ethers::utils::hex::decode(&tx.data[2..]).unwrap();
        let outer = abi_decode(
            &[ParamType::Bytes, ParamType::Uint(256)],
            &calldata[4..],
        )
        .unwrap();
        let Token::Bytes(unlock_data) = &outer[0] else {
            panic!("expected bytes")
        };
        let inner = abi_decode(
            &[
                ParamType::Bytes,
                ParamType::Array(Box::new(ParamType::Bytes)),
            ],
            unlock_data,
        )
        .unwrap();
        let Token::Bytes(actions) = &inner[0] else {
            panic!("expected actions bytes")
        };
        let Token::Array(params) = &inner[1] else {
            panic!("expected params array")
        };
        let params = params
            .iter()
            .map(|p| match p {
                Token::Bytes(b) => b.clone(),
                _ => panic!("expected bytes param"),
            })
            .collect();
        (actions.clone(), params)
    }

    #[test]
    fn action_codes_match_the_deployed_table() {
        assert_eq!(ACTION_INCREASE_LIQUIDITY, 0x00);
        assert_eq!(ACTION_DECREASE_LIQUIDITY, 0x01);
        assert_eq!(ACTION_MINT_POSITION, 0x02);
        assert_eq!(ACTION_BURN_POSITION, 0x03);
        assert_eq!(ACTION_TAKE_PAIR, 0x11);
        assert_eq!(ACTION_CLOSE_CURRENCY, 0x12);
    }

    #[test]
    fn mint_multiplexes_mint_and_two_closes() {
        let params = V4MintParams {
            pool_key: pool_key(),
            tick_lower: -600,
            tick_upper: 600,
            liquidity: U256::from(1_000u64),
            amount0_max: U256::from(500u64),
            amount1_max: U256::from(700u64),
            recipient: addr(5),
        };
        let tx = mint(addr(9), &params, U256::one()).unwrap();
        let (actions, action_params) = decode_unlock(&tx);
        assert_eq!(
            actions,
            vec![ACTION_MINT_POSITION, ACTION_CLOSE_CURRENCY, ACTION_CLOSE_CURRENCY]
        );
        assert_eq!(action_params.len(), 3);
        // Each close param is a single address word.
        assert_eq!(action_params[1].len(), 32);
        assert_eq!(action_params[2].len(), 32);
        assert_eq!(tx.value, "0");
    }

    #[test]
    fn mint_with_native_currency_carries_value() {
        let mut key = pool_key();
        key.currency0 = Address::zero();
        let params = V4MintParams {
            pool_key: key,
            tick_lower: -600,
            tick_upper: 600,
            liquidity: U256::from(1_000u64),
            amount0_max: U256::from(123_456u64),
            amount1_max: U256::from(700u64),
            recipient: addr(5),
        };
        let tx = mint(addr(9), &params, U256::one()).unwrap();
        assert_eq!(tx.value, "123456");
    }

    #[test]
    fn mint_rejects_unsorted_currencies() {
        let mut key = pool_key();
        std::mem::swap(&mut key.currency0, &mut key.currency1);
        let params = V4MintParams {
            pool_key: key,
            tick_lower: -600,
            tick_upper: 600,
            liquidity: U256::one(),
            amount0_max: U256::one(),
            amount1_max: U256::one(),
            recipient: addr(5),
        };
        assert!(mint(addr(9), &params, U256::one()).is_err());
    }

    #[test]
    fn decrease_and_burn_take_the_pair() {
        let tx = decrease(
            addr(9),
            U256::from(7u8),
            U256::from(100u64),
            U256::zero(),
            U256::zero(),
            addr(1),
            addr(2),
            addr(5),
            U256::one(),
        );
        let (actions, params) = decode_unlock(&tx);
        assert_eq!(actions, vec![ACTION_DECREASE_LIQUIDITY, ACTION_TAKE_PAIR]);
        assert_eq!(params.len(), 2);
        // takePair carries three address words.
        assert_eq!(params[1].len(), 96);

        let tx = burn(
            addr(9),
            U256::from(7u8),
            U256::zero(),
            U256::zero(),
            addr(1),
            addr(2),
            addr(5),
            U256::one(),
        );
        let (actions, _) = decode_unlock(&tx);
        assert_eq!(actions, vec![ACTION_BURN_POSITION, ACTION_TAKE_PAIR]);
    }

    #[test]
    fn partial_allowance_needs_only_the_missing_leg() {
        // ERC20->Permit2 at 999 of 1000 needed, Permit2->manager ample.
        let (erc20, permit2) = approvals_needed(
            U256::from(1_000u64),
            U256::from(999u64),
            U256::from(2_000u64),
            u64::MAX,
            1_700_000_000,
        );
        assert!(erc20);
        assert!(!permit2);
    }

    #[test]
    fn expired_permit2_allowance_needs_renewal() {
        let (erc20, permit2) = approvals_needed(
            U256::from(1_000u64),
            U256::from(5_000u64),
            U256::from(5_000u64),
            1_000,
            2_000,
        );
        assert!(!erc20);
        assert!(permit2);
    }

    #[test]
    fn initialize_rejects_unsorted_key() {
        let mut key = pool_key();
        std::mem::swap(&mut key.currency0, &mut key.currency1);
        assert!(initialize(addr(8), &key, U256::one() << 96).is_err());
        assert!(initialize(addr(8), &pool_key(), U256::one() << 96).is_ok());
    }
}
