/*
 * Pool existence checks and tick window validation
 */

use crate::config::ContractsConfig;
use crate::math;
use crate::models::{EngineError, Result};
use crate::protocols::v4::PoolKey;
use crate::rpc::RpcGateway;
use crate::utils::{abi_decode, encode_call, token_address, token_uint};
use ethers::abi::{ParamType, Token};
use ethers::types::Address;

/// Fee tier to tick spacing for V3 factory pools. An unrecognized tier is a
/// caller error.
pub fn v3_fee_to_tick_spacing(fee: u32) -> Result<i32> {
    match fee {
        100 => Ok(1),
        500 => Ok(10),
        3000 => Ok(60),
        10000 => Ok(200),
        _ => Err(EngineError::InvalidInput(format!(
            "Unrecognized V3 fee tier: {fee}"
        ))),
    }
}

/// Fee tier to tick spacing for V4 pools. Never defaulted: a wrong spacing
/// hashes to a different PoolId entirely.
pub fn v4_fee_to_tick_spacing(fee: u32) -> Result<i32> {
    match fee {
        100 => Ok(1),
        500 => Ok(10),
        3000 => Ok(60),
        10000 => Ok(200),
        _ => Err(EngineError::InvalidInput(format!(
            "Unrecognized V4 fee tier: {fee}"
        ))),
    }
}

/// Widest tick window permitted by the protocol for a spacing.
pub fn full_range_ticks(spacing: i32) -> Result<(i32, i32)> {
    math::tick_range(spacing)
}

/// A bounded window of `width` ticks either side of `center`, aligned to the
/// spacing and clamped to the protocol range.
pub fn bounded_tick_window(center: i32, width: i32, spacing: i32) -> Result<(i32, i32)> {
    if spacing <= 0 || width <= 0 {
        return Err(EngineError::InvalidInput(format!(
            "Invalid tick window: width {width}, spacing {spacing}"
        )));
    }
    let (min_tick, max_tick) = math::tick_range(spacing)?;
    let lower = math::align_tick(center.saturating_sub(width), spacing).max(min_tick);
    let mut upper = math::align_tick(center.saturating_add(width), spacing).min(max_tick);
    if upper <= lower {
        upper = (lower + spacing).min(max_tick);
    }
    Ok((lower, upper))
}

/// On-chain pool existence checks per protocol generation.
pub struct PoolValidator<'a> {
    gateway: &'a RpcGateway,
    contracts: &'a ContractsConfig,
}

impl<'a> PoolValidator<'a> {
    #[must_use]
    pub fn new(gateway: &'a RpcGateway, contracts: &'a ContractsConfig) -> Self {
        Self { gateway, contracts }
    }

    pub async fn v2_pool_exists(&self, token_a: Address, token_b: Address) -> Result<bool> {
        let raw = self
            .gateway
            .eth_call(
                self.contracts.v2_factory,
                encode_call(
                    "getPair(address,address)",
                    &[Token::Address(token_a), Token::Address(token_b)],
                ),
            )
            .await?;
        let pair = token_address(&abi_decode(&[ParamType::Address], &raw)?[0])?;
        Ok(pair != Address::zero())
    }

    pub async fn v3_pool_exists(
        &self,
        token_a: Address,
        token_b: Address,
        fee: u32,
    ) -> Result<bool> {
        v3_fee_to_tick_spacing(fee)?;
        let raw = self
            .gateway
            .eth_call(
                self.contracts.v3_factory,
                encode_call(
                    "getPool(address,address,uint24)",
                    &[
                        Token::Address(token_a),
                        Token::Address(token_b),
                        Token::Uint(fee.into()),
                    ],
                ),
            )
            .await?;
        let pool = token_address(&abi_decode(&[ParamType::Address], &raw)?[0])?;
        Ok(pool != Address::zero())
    }

    /// A V4 pool is initialized when its slot0 sqrt price is nonzero.
    pub async fn v4_pool_initialized(&self, key: &PoolKey) -> Result<bool> {
        let raw = self
            .gateway
            .eth_call(
                self.contracts.v4_state_view,
                encode_call(
                    "getSlot0(bytes32)",
                    &[Token::FixedBytes(key.to_id().to_vec())],
                ),
            )
            .await?;
        let tokens = abi_decode(
            &[
                ParamType::Uint(160),
                ParamType::Int(24),
                ParamType::Uint(24),
                ParamType::Uint(24),
            ],
            &raw,
        )?;
        Ok(!token_uint(&tokens[0])?.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_tables_cover_the_deployed_tiers() {
        assert_eq!(v3_fee_to_tick_spacing(100).unwrap(), 1);
        assert_eq!(v3_fee_to_tick_spacing(500).unwrap(), 10);
        assert_eq!(v3_fee_to_tick_spacing(3000).unwrap(), 60);
        assert_eq!(v3_fee_to_tick_spacing(10000).unwrap(), 200);
        assert_eq!(v4_fee_to_tick_spacing(500).unwrap(), 10);
    }

    #[test]
    fn unknown_fee_tier_is_a_caller_error() {
        assert!(v3_fee_to_tick_spacing(1234).is_err());
        assert!(v4_fee_to_tick_spacing(0).is_err());
        assert!(v4_fee_to_tick_spacing(2500).is_err());
    }

    #[test]
    fn full_range_matches_protocol_bounds() {
        assert_eq!(full_range_ticks(60).unwrap(), (-887220, 887220));
    }

    #[test]
    fn bounded_windows_align_to_spacing() {
        let (lower, upper) = bounded_tick_window(1000, 500, 60).unwrap();
        assert_eq!(lower % 60, 0);
        assert_eq!(upper % 60, 0);
        assert!(lower <= 500 && upper >= 1440);

        // Degenerate width still yields a non-empty window.
        let (lower, upper) = bounded_tick_window(0, 1, 200).unwrap();
        assert!(upper > lower);

        assert!(bounded_tick_window(0, 0, 60).is_err());
    }
}
