/*
 * V2 constant-product pair reader
 */

use crate::models::{EngineError, ProtocolVersion, RawPosition, RawScratch, Result};
use crate::rpc::{CallOutcome, CallRequest, RpcGateway};
use crate::utils::{abi_decode, encode_call, token_address, token_uint};
use ethers::abi::{ParamType, Token};
use ethers::types::{Address, U256};
use tracing::warn;

/// Scans an explicit pair allow-list for LP balances. V2 pairs are plain
/// ERC20s with no holder enumeration, so the list is a configuration input.
pub struct V2Reader<'a> {
    gateway: &'a RpcGateway,
    pairs: &'a [Address],
}

impl<'a> V2Reader<'a> {
    #[must_use]
    pub fn new(gateway: &'a RpcGateway, pairs: &'a [Address]) -> Self {
        Self { gateway, pairs }
    }

    pub async fn read(&self, wallet: Address) -> Result<Vec<RawPosition>> {
        if self.pairs.is_empty() {
            return Ok(Vec::new());
        }

        let balance_calls: Vec<CallRequest> = self
            .pairs
            .iter()
            .map(|pair| CallRequest {
                target: *pair,
                calldata: encode_call("balanceOf(address)", &[Token::Address(wallet)]),
            })
            .collect();
        let balances = self.gateway.multicall(&balance_calls, true).await?;

        let mut held: Vec<(Address, U256)> = Vec::new();
        for (pair, outcome) in self.pairs.iter().zip(&balances) {
            if !outcome.success {
                warn!("V2 balance check failed for pair {pair:?}");
                continue;
            }
            match decode_uint(&outcome.data) {
                Ok(balance) if !balance.is_zero() => held.push((*pair, balance)),
                Ok(_) => {}
                Err(e) => warn!("V2 balance decode failed for pair {pair:?}: {e}"),
            }
        }
        if held.is_empty() {
            return Ok(Vec::new());
        }

        let mut detail_calls = Vec::with_capacity(held.len() * 4);
        for (pair, _) in &held {
            detail_calls.push(CallRequest {
                target: *pair,
                calldata: encode_call("totalSupply()", &[]),
            });
            detail_calls.push(CallRequest {
                target: *pair,
                calldata: encode_call("getReserves()", &[]),
            });
            detail_calls.push(CallRequest {
                target: *pair,
                calldata: encode_call("token0()", &[]),
            });
            detail_calls.push(CallRequest {
                target: *pair,
                calldata: encode_call("token1()", &[]),
            });
        }
        let details = self.gateway.multicall(&detail_calls, true).await?;

        let mut positions = Vec::new();
        for (i, (pair, balance)) in held.iter().enumerate() {
            let chunk = &details[i * 4..i * 4 + 4];
            match decode_pair(*pair, *balance, chunk) {
                Ok(raw) => positions.push(raw),
                Err(e) => warn!("Skipping V2 pair {pair:?}: {e}"),
            }
        }
        Ok(positions)
    }
}

fn decode_uint(data: &[u8]) -> Result<U256> {
    let tokens = abi_decode(&[ParamType::Uint(256)], data)?;
    token_uint(&tokens[0])
}

fn decode_pair(pair: Address, balance: U256, chunk: &[CallOutcome]) -> Result<RawPosition> {
    if chunk.iter().any(|outcome| !outcome.success) {
        return Err(EngineError::ContractError(
            "Pair state read reverted".to_string(),
        ));
    }

    let total_supply = decode_uint(&chunk[0].data)?;
    let reserves = abi_decode(
        &[
            ParamType::Uint(112),
            ParamType::Uint(112),
            ParamType::Uint(32),
        ],
        &chunk[1].data,
    )?;
    let reserve0 = token_uint(&reserves[0])?;
    let reserve1 = token_uint(&reserves[1])?;
    let token0 = token_address(&abi_decode(&[ParamType::Address], &chunk[2].data)?[0])?;
    let token1 = token_address(&abi_decode(&[ParamType::Address], &chunk[3].data)?[0])?;

    Ok(RawPosition {
        version: ProtocolVersion::V2,
        ident: format!("{pair:?}"),
        token0,
        token1,
        liquidity: balance.to_string(),
        tick_lower: String::new(),
        tick_upper: String::new(),
        scratch: RawScratch::V2 {
            reserve0,
            reserve1,
            total_supply,
            balance,
        },
    })
}
