/*
 * V3 concentrated-liquidity NFT reader
 */

use crate::models::{ProtocolVersion, RawPosition, RawScratch, Result};
use crate::rpc::{CallRequest, RpcGateway};
use crate::utils::{abi_decode, encode_call, token_address, token_tick, token_uint};
use ethers::abi::{ParamType, Token};
use ethers::types::{Address, U256};
use tracing::warn;

/// Enumerates a wallet's position NFTs through the position manager:
/// one balance read, one batched index scan, one batched state read.
pub struct V3Reader<'a> {
    gateway: &'a RpcGateway,
    position_manager: Address,
}

impl<'a> V3Reader<'a> {
    #[must_use]
    pub fn new(gateway: &'a RpcGateway, position_manager: Address) -> Self {
        Self {
            gateway,
            position_manager,
        }
    }

    pub async fn read(&self, wallet: Address) -> Result<Vec<RawPosition>> {
        let balance_raw = self
            .gateway
            .eth_call(
                self.position_manager,
                encode_call("balanceOf(address)", &[Token::Address(wallet)]),
            )
            .await?;
        let balance = token_uint(&abi_decode(&[ParamType::Uint(256)], &balance_raw)?[0])?;
        if balance.is_zero() {
            return Ok(Vec::new());
        }

        let count = balance.low_u64();
        let index_calls: Vec<CallRequest> = (0..count)
            .map(|i| CallRequest {
                target: self.position_manager,
                calldata: encode_call(
                    "tokenOfOwnerByIndex(address,uint256)",
                    &[Token::Address(wallet), Token::Uint(U256::from(i))],
                ),
            })
            .collect();
        let index_results = self.gateway.multicall(&index_calls, true).await?;

        let mut token_ids = Vec::with_capacity(index_results.len());
        for (i, outcome) in index_results.iter().enumerate() {
            if !outcome.success {
                warn!("V3 tokenOfOwnerByIndex({i}) failed for {wallet:?}");
                continue;
            }
            match abi_decode(&[ParamType::Uint(256)], &outcome.data)
                .and_then(|tokens| token_uint(&tokens[0]))
            {
                Ok(id) => token_ids.push(id),
                Err(e) => warn!("V3 token id decode failed at index {i}: {e}"),
            }
        }
        if token_ids.is_empty() {
            return Ok(Vec::new());
        }

        let position_calls: Vec<CallRequest> = token_ids
            .iter()
            .map(|id| CallRequest {
                target: self.position_manager,
                calldata: encode_call("positions(uint256)", &[Token::Uint(*id)]),
            })
            .collect();
        let position_results = self.gateway.multicall(&position_calls, true).await?;

        let mut positions = Vec::new();
        for (token_id, outcome) in token_ids.iter().zip(&position_results) {
            if !outcome.success {
                warn!("V3 positions({token_id}) reverted");
                continue;
            }
            match decode_position(*token_id, &outcome.data) {
                Ok(Some(raw)) => positions.push(raw),
                Ok(None) => {}
                Err(e) => warn!("Skipping V3 position {token_id}: {e}"),
            }
        }
        Ok(positions)
    }
}

/// Decodes the 12-field `positions(tokenId)` tuple. Fully emptied positions
/// (no liquidity, no owed fees) are dropped; zero-liquidity positions with
/// pending fees are kept and surfaced as closed.
fn decode_position(token_id: U256, data: &[u8]) -> Result<Option<RawPosition>> {
    let types = [
        ParamType::Uint(96),  // nonce
        ParamType::Address,   // operator
        ParamType::Address,   // token0
        ParamType::Address,   // token1
        ParamType::Uint(24),  // fee
        ParamType::Int(24),   // tickLower
        ParamType::Int(24),   // tickUpper
        ParamType::Uint(128), // liquidity
        ParamType::Uint(256), // feeGrowthInside0LastX128
        ParamType::Uint(256), // feeGrowthInside1LastX128
        ParamType::Uint(128), // tokensOwed0
        ParamType::Uint(128), // tokensOwed1
    ];
    let tokens = abi_decode(&types, data)?;

    let token0 = token_address(&tokens[2])?;
    let token1 = token_address(&tokens[3])?;
    let fee = token_uint(&tokens[4])?.low_u32();
    let tick_lower = token_tick(&tokens[5])?;
    let tick_upper = token_tick(&tokens[6])?;
    let liquidity = token_uint(&tokens[7])?;
    let tokens_owed0 = token_uint(&tokens[10])?.low_u128();
    let tokens_owed1 = token_uint(&tokens[11])?.low_u128();

    if liquidity.is_zero() && tokens_owed0 == 0 && tokens_owed1 == 0 {
        return Ok(None);
    }

    Ok(Some(RawPosition {
        version: ProtocolVersion::V3,
        ident: token_id.to_string(),
        token0,
        token1,
        liquidity: liquidity.to_string(),
        tick_lower: tick_lower.to_string(),
        tick_upper: tick_upper.to_string(),
        scratch: RawScratch::V3 {
            fee,
            tokens_owed0,
            tokens_owed1,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::int24_token;
    use ethers::abi::encode;

    fn encoded_position(
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
        owed0: u128,
        owed1: u128,
    ) -> Vec<u8> {
        encode(&[
            Token::Uint(U256::zero()),
            Token::Address(Address::zero()),
            Token::Address("0x6B175474E89094C44Da98b954EedeAC495271d0F".parse().unwrap()),
            Token::Address("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".parse().unwrap()),
            Token::Uint(U256::from(3000u32)),
            int24_token(tick_lower),
            int24_token(tick_upper),
            Token::Uint(U256::from(liquidity)),
            Token::Uint(U256::zero()),
            Token::Uint(U256::zero()),
            Token::Uint(U256::from(owed0)),
            Token::Uint(U256::from(owed1)),
        ])
    }

    #[test]
    fn decodes_active_position_with_negative_ticks() {
        let data = encoded_position(-887220, -60, 42_000, 7, 0);
        let raw = decode_position(U256::from(99u64), &data).unwrap().unwrap();
        assert_eq!(raw.version, ProtocolVersion::V3);
        assert_eq!(raw.ident, "99");
        assert_eq!(raw.tick_lower, "-887220");
        assert_eq!(raw.tick_upper, "-60");
        assert_eq!(raw.liquidity, "42000");
        match raw.scratch {
            RawScratch::V3 {
                fee,
                tokens_owed0,
                tokens_owed1,
            } => {
                assert_eq!(fee, 3000);
                assert_eq!(tokens_owed0, 7);
                assert_eq!(tokens_owed1, 0);
            }
            _ => panic!("expected V3 scratch"),
        }
    }

    #[test]
    fn keeps_emptied_position_with_pending_fees() {
        let data = encoded_position(-60, 60, 0, 0, 123);
        let raw = decode_position(U256::one(), &data).unwrap().unwrap();
        assert_eq!(raw.liquidity, "0");
    }

    #[test]
    fn drops_fully_emptied_position() {
        let data = encoded_position(-60, 60, 0, 0, 0);
        assert!(decode_position(U256::one(), &data).unwrap().is_none());
    }
}
