/*
 * Four-phase enrichment: pool keys, batched state reads, fee accounting,
 * and pure assembly into valued positions
 */

use crate::config::ContractsConfig;
use crate::math;
use crate::models::{
    Position, ProtocolVersion, RawPosition, RawScratch, Result, TokenInfo, V2Position, V3Position,
    V4Position,
};
use crate::prices::{ObservedPool, PriceResolver};
use crate::protocols::v4::{position_fee_key, PoolKey};
use crate::rpc::{CallRequest, RpcGateway};
use crate::utils::{
    abi_decode, encode_call, human_amount, int24_token, token_address, token_tick, token_uint,
    u256_to_biguint,
};
use ethers::abi::{ParamType, Token};
use ethers::types::{Address, U256};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone)]
pub(crate) struct PoolState {
    pub sqrt_price_x96: BigUint,
    pub tick: i32,
}

type V3PoolKey = (Address, Address, u32);

/// Everything Phase D needs, gathered by the I/O phases.
pub(crate) struct EnrichmentContext {
    pub metadata: HashMap<Address, TokenInfo>,
    pub prices: HashMap<Address, Decimal>,
    pub v3_pools: HashMap<V3PoolKey, PoolState>,
    pub v4_pools: HashMap<[u8; 32], PoolState>,
    /// Raw owed fee amounts per V4 position ident.
    pub v4_fees: HashMap<String, (BigUint, BigUint)>,
}

pub struct Enricher<'a> {
    gateway: &'a RpcGateway,
    contracts: &'a ContractsConfig,
    resolver: &'a PriceResolver,
}

impl<'a> Enricher<'a> {
    #[must_use]
    pub fn new(
        gateway: &'a RpcGateway,
        contracts: &'a ContractsConfig,
        resolver: &'a PriceResolver,
    ) -> Self {
        Self {
            gateway,
            contracts,
            resolver,
        }
    }

    pub async fn enrich(&self, raws: Vec<RawPosition>) -> Result<Vec<Position>> {
        if raws.is_empty() {
            return Ok(Vec::new());
        }

        // Phase A: unique tokens and pool keys across the union of raws.
        let mut tokens: Vec<Address> = Vec::new();
        let mut seen_tokens = HashSet::new();
        for raw in &raws {
            for token in [raw.token0, raw.token1] {
                if seen_tokens.insert(token) {
                    tokens.push(token);
                }
            }
        }
        let v3_keys: Vec<V3PoolKey> = {
            let mut keys = Vec::new();
            let mut seen = HashSet::new();
            for raw in &raws {
                if let RawScratch::V3 { fee, .. } = &raw.scratch {
                    let key = (raw.token0, raw.token1, *fee);
                    if seen.insert(key) {
                        keys.push(key);
                    }
                }
            }
            keys
        };
        let v4_keys: Vec<PoolKey> = {
            let mut keys = Vec::new();
            let mut seen = HashSet::new();
            for raw in &raws {
                if let Some(key) = v4_pool_key(raw) {
                    if seen.insert(key.to_id()) {
                        keys.push(key);
                    }
                }
            }
            keys
        };

        // Phases B and C: independent multicalls issued concurrently. The
        // fee-accounting reads need only ticks and ids, never pool state.
        let (metadata, v3_pools, v4_pools, v4_fees) = tokio::join!(
            self.fetch_metadata(&tokens),
            self.fetch_v3_pools(&v3_keys),
            self.fetch_v4_pools(&v4_keys),
            self.fetch_v4_fees(&raws),
        );
        let metadata = metadata?;
        let v3_pools = v3_pools?;
        let v4_pools = v4_pools?;
        let v4_fees = v4_fees?;

        let observed = observed_pools(&raws, &metadata, &v3_pools, &v4_pools);
        let prices = self.resolver.resolve(&tokens, &observed).await;

        // Phase D: pure computation.
        let ctx = EnrichmentContext {
            metadata,
            prices,
            v3_pools,
            v4_pools,
            v4_fees,
        };
        let mut positions = assemble(&raws, &ctx);
        crate::models::sort_positions(&mut positions);
        Ok(positions)
    }

    async fn fetch_metadata(&self, tokens: &[Address]) -> Result<HashMap<Address, TokenInfo>> {
        if tokens.is_empty() {
            return Ok(HashMap::new());
        }
        let mut calls = Vec::with_capacity(tokens.len() * 2);
        for token in tokens {
            calls.push(CallRequest {
                target: *token,
                calldata: encode_call("symbol()", &[]),
            });
            calls.push(CallRequest {
                target: *token,
                calldata: encode_call("decimals()", &[]),
            });
        }
        let outcomes = self.gateway.multicall(&calls, true).await?;

        let mut metadata = HashMap::new();
        for (i, token) in tokens.iter().enumerate() {
            let symbol_outcome = &outcomes[i * 2];
            let decimals_outcome = &outcomes[i * 2 + 1];

            let symbol = if symbol_outcome.success {
                decode_symbol(&symbol_outcome.data).unwrap_or_else(|| short_address(*token))
            } else {
                short_address(*token)
            };
            let decimals = if decimals_outcome.success {
                abi_decode(&[ParamType::Uint(8)], &decimals_outcome.data)
                    .ok()
                    .and_then(|t| token_uint(&t[0]).ok())
                    .map_or(18, |v| v.low_u32() as u8)
            } else {
                18
            };
            metadata.insert(
                *token,
                TokenInfo {
                    address: *token,
                    symbol,
                    decimals,
                },
            );
        }
        Ok(metadata)
    }

    async fn fetch_v3_pools(
        &self,
        keys: &[V3PoolKey],
    ) -> Result<HashMap<V3PoolKey, PoolState>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let address_calls: Vec<CallRequest> = keys
            .iter()
            .map(|(token0, token1, fee)| CallRequest {
                target: self.contracts.v3_factory,
                calldata: encode_call(
                    "getPool(address,address,uint24)",
                    &[
                        Token::Address(*token0),
                        Token::Address(*token1),
                        Token::Uint((*fee).into()),
                    ],
                ),
            })
            .collect();
        let address_outcomes = self.gateway.multicall(&address_calls, true).await?;

        let mut resolved: Vec<(V3PoolKey, Address)> = Vec::new();
        for (key, outcome) in keys.iter().zip(&address_outcomes) {
            if !outcome.success {
                continue;
            }
            match abi_decode(&[ParamType::Address], &outcome.data)
                .and_then(|t| token_address(&t[0]))
            {
                Ok(pool) if pool != Address::zero() => resolved.push((*key, pool)),
                Ok(_) => {}
                Err(e) => warn!("V3 pool address decode failed: {e}"),
            }
        }
        if resolved.is_empty() {
            return Ok(HashMap::new());
        }

        let slot0_calls: Vec<CallRequest> = resolved
            .iter()
            .map(|(_, pool)| CallRequest {
                target: *pool,
                calldata: encode_call("slot0()", &[]),
            })
            .collect();
        let slot0_outcomes = self.gateway.multicall(&slot0_calls, true).await?;

        let mut pools = HashMap::new();
        for ((key, pool), outcome) in resolved.iter().zip(&slot0_outcomes) {
            if !outcome.success {
                warn!("V3 slot0 read failed for pool {pool:?}");
                continue;
            }
            match decode_v3_slot0(&outcome.data) {
                Ok(Some(state)) => {
                    pools.insert(*key, state);
                }
                Ok(None) => {}
                Err(e) => warn!("V3 slot0 decode failed for pool {pool:?}: {e}"),
            }
        }
        Ok(pools)
    }

    async fn fetch_v4_pools(&self, keys: &[PoolKey]) -> Result<HashMap<[u8; 32], PoolState>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<[u8; 32]> = keys.iter().map(PoolKey::to_id).collect();
        let calls: Vec<CallRequest> = ids
            .iter()
            .map(|id| CallRequest {
                target: self.contracts.v4_state_view,
                calldata: encode_call("getSlot0(bytes32)", &[Token::FixedBytes(id.to_vec())]),
            })
            .collect();
        let outcomes = self.gateway.multicall(&calls, true).await?;

        let mut pools = HashMap::new();
        for (id, outcome) in ids.iter().zip(&outcomes) {
            if !outcome.success {
                continue;
            }
            match decode_v4_slot0(&outcome.data) {
                Ok(Some(state)) => {
                    pools.insert(*id, state);
                }
                Ok(None) => {}
                Err(e) => warn!("V4 getSlot0 decode failed: {e}"),
            }
        }
        Ok(pools)
    }

    /// One interleaved batch of fee-growth and last-snapshot reads per V4
    /// position with live liquidity.
    async fn fetch_v4_fees(
        &self,
        raws: &[RawPosition],
    ) -> Result<HashMap<String, (BigUint, BigUint)>> {
        let mut targets: Vec<(&RawPosition, PoolKey, i32, i32, U256)> = Vec::new();
        for raw in raws {
            let Some(key) = v4_pool_key(raw) else {
                continue;
            };
            let (Ok(lower), Ok(upper)) = (raw.tick_lower.parse(), raw.tick_upper.parse()) else {
                continue;
            };
            let Ok(token_id) = U256::from_dec_str(&raw.ident) else {
                continue;
            };
            if raw.liquidity == "0" {
                continue;
            }
            targets.push((raw, key, lower, upper, token_id));
        }
        if targets.is_empty() {
            return Ok(HashMap::new());
        }

        let mut calls = Vec::with_capacity(targets.len() * 2);
        for (_, key, lower, upper, token_id) in &targets {
            let pool_id = key.to_id();
            calls.push(CallRequest {
                target: self.contracts.v4_state_view,
                calldata: encode_call(
                    "getFeeGrowthInside(bytes32,int24,int24)",
                    &[
                        Token::FixedBytes(pool_id.to_vec()),
                        int24_token(*lower),
                        int24_token(*upper),
                    ],
                ),
            });
            let fee_key = position_fee_key(
                self.contracts.v4_position_manager,
                *lower,
                *upper,
                *token_id,
            );
            calls.push(CallRequest {
                target: self.contracts.v4_state_view,
                calldata: encode_call(
                    "getPositionInfo(bytes32,bytes32)",
                    &[
                        Token::FixedBytes(pool_id.to_vec()),
                        Token::FixedBytes(fee_key.to_vec()),
                    ],
                ),
            });
        }
        let outcomes = self.gateway.multicall(&calls, true).await?;

        let mut fees = HashMap::new();
        for (i, (raw, ..)) in targets.iter().enumerate() {
            let growth_outcome = &outcomes[i * 2];
            let snapshot_outcome = &outcomes[i * 2 + 1];
            if !growth_outcome.success || !snapshot_outcome.success {
                warn!("V4 fee read failed for position {}", raw.ident);
                continue;
            }
            match decode_v4_fee_pair(&growth_outcome.data, &snapshot_outcome.data) {
                Ok(pair) => {
                    fees.insert(raw.ident.clone(), pair);
                }
                Err(e) => warn!("V4 fee decode failed for position {}: {e}", raw.ident),
            }
        }
        Ok(fees)
    }
}

fn v4_pool_key(raw: &RawPosition) -> Option<PoolKey> {
    match &raw.scratch {
        RawScratch::V4 {
            fee,
            tick_spacing,
            hooks,
        } => Some(PoolKey {
            currency0: raw.token0,
            currency1: raw.token1,
            fee: *fee,
            tick_spacing: *tick_spacing,
            hooks: *hooks,
        }),
        _ => None,
    }
}

fn decode_symbol(data: &[u8]) -> Option<String> {
    abi_decode(&[ParamType::String], data)
        .ok()
        .and_then(|tokens| match tokens.into_iter().next() {
            Some(Token::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        })
}

fn short_address(address: Address) -> String {
    let full = format!("{address:?}");
    full[..10.min(full.len())].to_string()
}

fn decode_v3_slot0(data: &[u8]) -> Result<Option<PoolState>> {
    let tokens = abi_decode(
        &[
            ParamType::Uint(160),
            ParamType::Int(24),
            ParamType::Uint(16),
            ParamType::Uint(16),
            ParamType::Uint(16),
            ParamType::Uint(8),
            ParamType::Bool,
        ],
        data,
    )?;
    let sqrt_price = token_uint(&tokens[0])?;
    if sqrt_price.is_zero() {
        return Ok(None);
    }
    Ok(Some(PoolState {
        sqrt_price_x96: u256_to_biguint(sqrt_price),
        tick: token_tick(&tokens[1])?,
    }))
}

fn decode_v4_slot0(data: &[u8]) -> Result<Option<PoolState>> {
    let tokens = abi_decode(
        &[
            ParamType::Uint(160),
            ParamType::Int(24),
            ParamType::Uint(24),
            ParamType::Uint(24),
        ],
        data,
    )?;
    let sqrt_price = token_uint(&tokens[0])?;
    if sqrt_price.is_zero() {
        return Ok(None);
    }
    Ok(Some(PoolState {
        sqrt_price_x96: u256_to_biguint(sqrt_price),
        tick: token_tick(&tokens[1])?,
    }))
}

fn decode_v4_fee_pair(growth_data: &[u8], snapshot_data: &[u8]) -> Result<(BigUint, BigUint)> {
    let growth = abi_decode(&[ParamType::Uint(256), ParamType::Uint(256)], growth_data)?;
    let growth0 = u256_to_biguint(token_uint(&growth[0])?);
    let growth1 = u256_to_biguint(token_uint(&growth[1])?);

    let snapshot = abi_decode(
        &[
            ParamType::Uint(128),
            ParamType::Uint(256),
            ParamType::Uint(256),
        ],
        snapshot_data,
    )?;
    let liquidity = u256_to_biguint(token_uint(&snapshot[0])?);
    let last0 = u256_to_biguint(token_uint(&snapshot[1])?);
    let last1 = u256_to_biguint(token_uint(&snapshot[2])?);

    Ok((
        math::fee_owed(&growth0, &last0, &liquidity),
        math::fee_owed(&growth1, &last1, &liquidity),
    ))
}

fn observed_pools(
    raws: &[RawPosition],
    metadata: &HashMap<Address, TokenInfo>,
    v3_pools: &HashMap<V3PoolKey, PoolState>,
    v4_pools: &HashMap<[u8; 32], PoolState>,
) -> Vec<ObservedPool> {
    let decimals = |token: &Address| metadata.get(token).map_or(18, |info| info.decimals);
    let mut observed = Vec::new();
    for ((token0, token1, _), state) in v3_pools {
        observed.push(ObservedPool {
            token0: *token0,
            token1: *token1,
            decimals0: decimals(token0),
            decimals1: decimals(token1),
            tick: state.tick,
        });
    }
    let mut seen = HashSet::new();
    for raw in raws {
        let Some(key) = v4_pool_key(raw) else {
            continue;
        };
        let id = key.to_id();
        if !seen.insert(id) {
            continue;
        }
        if let Some(state) = v4_pools.get(&id) {
            observed.push(ObservedPool {
                token0: raw.token0,
                token1: raw.token1,
                decimals0: decimals(&raw.token0),
                decimals1: decimals(&raw.token1),
                tick: state.tick,
            });
        }
    }
    observed
}

/// Phase D: pure assembly of final positions from raws plus fetched state.
pub(crate) fn assemble(raws: &[RawPosition], ctx: &EnrichmentContext) -> Vec<Position> {
    raws.iter()
        .filter_map(|raw| match raw.version {
            ProtocolVersion::V2 => assemble_v2(raw, ctx),
            ProtocolVersion::V3 => assemble_v3(raw, ctx),
            ProtocolVersion::V4 => assemble_v4(raw, ctx),
        })
        .collect()
}

fn token_info(ctx: &EnrichmentContext, address: Address) -> TokenInfo {
    ctx.metadata.get(&address).cloned().unwrap_or(TokenInfo {
        address,
        symbol: short_address(address),
        decimals: 18,
    })
}

fn usd_value(ctx: &EnrichmentContext, token: Address, amount: Decimal) -> Decimal {
    ctx.prices
        .get(&token)
        .map_or(Decimal::ZERO, |price| amount * price)
}

fn assemble_v2(raw: &RawPosition, ctx: &EnrichmentContext) -> Option<Position> {
    let RawScratch::V2 {
        reserve0,
        reserve1,
        total_supply,
        balance,
    } = &raw.scratch
    else {
        return None;
    };

    let token0 = token_info(ctx, raw.token0);
    let token1 = token_info(ctx, raw.token1);

    // Proportional share of reserves in integer math; precision is lost only
    // at the final human conversion.
    let (amount0_raw, amount1_raw) = if total_supply.is_zero() {
        (BigUint::zero(), BigUint::zero())
    } else {
        let balance_big = u256_to_biguint(*balance);
        let supply_big = u256_to_biguint(*total_supply);
        (
            u256_to_biguint(*reserve0) * &balance_big / &supply_big,
            u256_to_biguint(*reserve1) * &balance_big / supply_big,
        )
    };
    let amount0 = human_amount(&amount0_raw, token0.decimals);
    let amount1 = human_amount(&amount1_raw, token1.decimals);

    let share = if total_supply.is_zero() {
        Decimal::ZERO
    } else {
        let ratio = u256_to_biguint(*balance).to_f64().unwrap_or(0.0)
            / u256_to_biguint(*total_supply).to_f64().unwrap_or(1.0);
        Decimal::from_f64(ratio * 100.0).unwrap_or(Decimal::ZERO)
    };

    let liquidity_usd = usd_value(ctx, raw.token0, amount0) + usd_value(ctx, raw.token1, amount1);

    Some(Position::V2(V2Position {
        id: raw.id(),
        pair: raw.ident.parse().unwrap_or_default(),
        token0,
        token1,
        amount0,
        amount1,
        amount0_raw: amount0_raw.to_string(),
        amount1_raw: amount1_raw.to_string(),
        lp_balance_raw: balance.to_string(),
        pool_share_percent: share,
        closed: balance.is_zero(),
        liquidity_usd,
    }))
}

struct RangeComputation {
    current_tick: Option<i32>,
    in_range: bool,
    amount0: BigUint,
    amount1: BigUint,
}

/// Shared concentrated-liquidity computation for V3/V4. Falls back to a
/// price-implied tick when pool state is missing and both tokens are priced.
fn compute_range(
    ctx: &EnrichmentContext,
    raw: &RawPosition,
    state: Option<&PoolState>,
    tick_lower: i32,
    tick_upper: i32,
    liquidity: &BigUint,
    decimals0: u8,
    decimals1: u8,
) -> RangeComputation {
    let derived = || {
        let p0 = ctx.prices.get(&raw.token0)?.to_f64()?;
        let p1 = ctx.prices.get(&raw.token1)?.to_f64()?;
        if p1 <= 0.0 {
            return None;
        }
        let human_ratio = p0 / p1;
        let raw_ratio =
            human_ratio * 10f64.powi(i32::from(decimals1) - i32::from(decimals0));
        math::tick_from_price_ratio(raw_ratio).ok()
    };

    let (current_tick, sqrt_price) = match state {
        Some(state) => (Some(state.tick), Some(state.sqrt_price_x96.clone())),
        None => match derived() {
            Some(tick) => (Some(tick), math::tick_to_sqrt_price_x96(tick).ok()),
            None => (None, None),
        },
    };

    let (amount0, amount1) = match (&sqrt_price, liquidity.is_zero()) {
        (Some(sqrt_price), false) => {
            let lower = math::tick_to_sqrt_price_x96(tick_lower);
            let upper = math::tick_to_sqrt_price_x96(tick_upper);
            match (lower, upper) {
                (Ok(lower), Ok(upper)) => {
                    math::amounts_from_liquidity(sqrt_price, &lower, &upper, liquidity)
                }
                _ => (BigUint::zero(), BigUint::zero()),
            }
        }
        _ => (BigUint::zero(), BigUint::zero()),
    };

    RangeComputation {
        current_tick,
        in_range: current_tick.is_some_and(|t| t >= tick_lower && t <= tick_upper),
        amount0,
        amount1,
    }
}

fn assemble_v3(raw: &RawPosition, ctx: &EnrichmentContext) -> Option<Position> {
    let RawScratch::V3 {
        fee,
        tokens_owed0,
        tokens_owed1,
    } = &raw.scratch
    else {
        return None;
    };
    let (Ok(tick_lower), Ok(tick_upper)) = (raw.tick_lower.parse(), raw.tick_upper.parse())
    else {
        warn!("Unparseable tick bounds on {}", raw.id());
        return None;
    };
    let liquidity = BigUint::parse_bytes(raw.liquidity.as_bytes(), 10)?;

    let token0 = token_info(ctx, raw.token0);
    let token1 = token_info(ctx, raw.token1);
    let state = ctx.v3_pools.get(&(raw.token0, raw.token1, *fee));
    let range = compute_range(
        ctx,
        raw,
        state,
        tick_lower,
        tick_upper,
        &liquidity,
        token0.decimals,
        token1.decimals,
    );

    let amount0 = human_amount(&range.amount0, token0.decimals);
    let amount1 = human_amount(&range.amount1, token1.decimals);
    let fees0 = human_amount(&BigUint::from(*tokens_owed0), token0.decimals);
    let fees1 = human_amount(&BigUint::from(*tokens_owed1), token1.decimals);

    let liquidity_usd = usd_value(ctx, raw.token0, amount0) + usd_value(ctx, raw.token1, amount1);
    let fees_usd = usd_value(ctx, raw.token0, fees0) + usd_value(ctx, raw.token1, fees1);

    Some(Position::V3(V3Position {
        id: raw.id(),
        token_id: raw.ident.clone(),
        fee: *fee,
        tick_spacing: v3_spacing_for_fee(*fee),
        tick_lower,
        tick_upper,
        current_tick: range.current_tick,
        in_range: range.in_range,
        liquidity_raw: raw.liquidity.clone(),
        amount0,
        amount1,
        amount0_raw: range.amount0.to_string(),
        amount1_raw: range.amount1.to_string(),
        fees0,
        fees1,
        closed: liquidity.is_zero(),
        liquidity_usd,
        fees_usd,
        token0,
        token1,
    }))
}

// Display-only spacing hint; the validator owns the authoritative table.
fn v3_spacing_for_fee(fee: u32) -> i32 {
    match fee {
        100 => 1,
        500 => 10,
        10000 => 200,
        _ => 60,
    }
}

fn assemble_v4(raw: &RawPosition, ctx: &EnrichmentContext) -> Option<Position> {
    let RawScratch::V4 {
        fee,
        tick_spacing,
        hooks,
    } = &raw.scratch
    else {
        return None;
    };
    let (Ok(tick_lower), Ok(tick_upper)) = (raw.tick_lower.parse(), raw.tick_upper.parse())
    else {
        warn!("Unparseable tick bounds on {}", raw.id());
        return None;
    };
    let liquidity = BigUint::parse_bytes(raw.liquidity.as_bytes(), 10)?;

    let currency0 = token_info(ctx, raw.token0);
    let currency1 = token_info(ctx, raw.token1);
    let state = v4_pool_key(raw).and_then(|key| ctx.v4_pools.get(&key.to_id()));
    let range = compute_range(
        ctx,
        raw,
        state,
        tick_lower,
        tick_upper,
        &liquidity,
        currency0.decimals,
        currency1.decimals,
    );

    let (fee0_raw, fee1_raw) = ctx
        .v4_fees
        .get(&raw.ident)
        .cloned()
        .unwrap_or((BigUint::zero(), BigUint::zero()));

    let amount0 = human_amount(&range.amount0, currency0.decimals);
    let amount1 = human_amount(&range.amount1, currency1.decimals);
    let fees0 = human_amount(&fee0_raw, currency0.decimals);
    let fees1 = human_amount(&fee1_raw, currency1.decimals);

    let liquidity_usd = usd_value(ctx, raw.token0, amount0) + usd_value(ctx, raw.token1, amount1);
    let fees_usd = usd_value(ctx, raw.token0, fees0) + usd_value(ctx, raw.token1, fees1);

    Some(Position::V4(V4Position {
        id: raw.id(),
        token_id: raw.ident.clone(),
        fee: *fee,
        tick_spacing: *tick_spacing,
        hooks: *hooks,
        tick_lower,
        tick_upper,
        current_tick: range.current_tick,
        in_range: range.in_range,
        liquidity_raw: raw.liquidity.clone(),
        amount0,
        amount1,
        amount0_raw: range.amount0.to_string(),
        amount1_raw: range.amount1.to_string(),
        fees0,
        fees1,
        closed: liquidity.is_zero(),
        liquidity_usd,
        fees_usd,
        currency0,
        currency1,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::One;

    fn addr(n: u8) -> Address {
        Address::from_low_u64_be(u64::from(n))
    }

    fn info(address: Address, symbol: &str, decimals: u8) -> TokenInfo {
        TokenInfo {
            address,
            symbol: symbol.to_string(),
            decimals,
        }
    }

    fn empty_ctx() -> EnrichmentContext {
        EnrichmentContext {
            metadata: HashMap::new(),
            prices: HashMap::new(),
            v3_pools: HashMap::new(),
            v4_pools: HashMap::new(),
            v4_fees: HashMap::new(),
        }
    }

    fn v2_raw(token0: Address, token1: Address) -> RawPosition {
        RawPosition {
            version: ProtocolVersion::V2,
            ident: format!("{:?}", addr(0xaa)),
            token0,
            token1,
            liquidity: "10".to_string(),
            tick_lower: String::new(),
            tick_upper: String::new(),
            scratch: RawScratch::V2 {
                reserve0: U256::from(1_000u64),
                reserve1: U256::from(2_000u64),
                total_supply: U256::from(100u64),
                balance: U256::from(10u64),
            },
        }
    }

    fn v3_raw(token0: Address, token1: Address) -> RawPosition {
        RawPosition {
            version: ProtocolVersion::V3,
            ident: "11".to_string(),
            token0,
            token1,
            liquidity: (10u128.pow(18)).to_string(),
            tick_lower: "-600".to_string(),
            tick_upper: "600".to_string(),
            scratch: RawScratch::V3 {
                fee: 3000,
                tokens_owed0: 500,
                tokens_owed1: 0,
            },
        }
    }

    fn v4_raw(token0: Address, token1: Address) -> RawPosition {
        RawPosition {
            version: ProtocolVersion::V4,
            ident: "77".to_string(),
            token0,
            token1,
            liquidity: (10u128.pow(18)).to_string(),
            tick_lower: "100".to_string(),
            tick_upper: "200".to_string(),
            scratch: RawScratch::V4 {
                fee: 500,
                tick_spacing: 10,
                hooks: Address::zero(),
            },
        }
    }

    #[test]
    fn assembles_one_position_per_protocol_with_correct_range_flags() {
        let (a, b) = (addr(1), addr(2));
        let mut ctx = empty_ctx();
        ctx.metadata.insert(a, info(a, "AAA", 0));
        ctx.metadata.insert(b, info(b, "BBB", 0));
        ctx.prices.insert(a, Decimal::ONE);
        ctx.prices.insert(b, Decimal::ONE);
        // V3 pool sits at tick 0, inside [-600, 600].
        ctx.v3_pools.insert(
            (a, b, 3000),
            PoolState {
                sqrt_price_x96: BigUint::one() << 96u32,
                tick: 0,
            },
        );
        // V4 pool sits at tick 300, outside [100, 200].
        let raws = vec![v2_raw(a, b), v3_raw(a, b), v4_raw(a, b)];
        let v4_key = v4_pool_key(&raws[2]).unwrap();
        ctx.v4_pools.insert(
            v4_key.to_id(),
            PoolState {
                sqrt_price_x96: math::tick_to_sqrt_price_x96(300).unwrap(),
                tick: 300,
            },
        );

        let positions = assemble(&raws, &ctx);
        assert_eq!(positions.len(), 3);

        let flags: Vec<(ProtocolVersion, bool)> = positions
            .iter()
            .map(|p| {
                let in_range = match p {
                    Position::V2(_) => false,
                    Position::V3(p) => p.in_range,
                    Position::V4(p) => p.in_range,
                };
                (p.version(), in_range)
            })
            .collect();
        assert!(flags.contains(&(ProtocolVersion::V2, false)));
        assert!(flags.contains(&(ProtocolVersion::V3, true)));
        assert!(flags.contains(&(ProtocolVersion::V4, false)));
    }

    #[test]
    fn v2_amounts_are_proportional_share_of_reserves() {
        let (a, b) = (addr(1), addr(2));
        let mut ctx = empty_ctx();
        ctx.metadata.insert(a, info(a, "AAA", 0));
        ctx.metadata.insert(b, info(b, "BBB", 0));
        ctx.prices.insert(a, Decimal::ONE);
        ctx.prices.insert(b, Decimal::from(2));

        let positions = assemble(&[v2_raw(a, b)], &ctx);
        let Position::V2(p) = &positions[0] else {
            panic!("expected V2")
        };
        // 10% of 1000/2000 reserves.
        assert_eq!(p.amount0_raw, "100");
        assert_eq!(p.amount1_raw, "200");
        assert_eq!(p.pool_share_percent.round(), Decimal::from(10));
        assert_eq!(p.liquidity_usd, Decimal::from(500));
        assert!(!p.closed);
    }

    #[test]
    fn out_of_range_v4_is_single_sided() {
        let (a, b) = (addr(1), addr(2));
        let mut ctx = empty_ctx();
        let raw = v4_raw(a, b);
        let key = v4_pool_key(&raw).unwrap();
        ctx.v4_pools.insert(
            key.to_id(),
            PoolState {
                sqrt_price_x96: math::tick_to_sqrt_price_x96(300).unwrap(),
                tick: 300,
            },
        );

        let positions = assemble(&[raw], &ctx);
        let Position::V4(p) = &positions[0] else {
            panic!("expected V4")
        };
        assert!(!p.in_range);
        assert_eq!(p.amount0_raw, "0");
        assert_ne!(p.amount1_raw, "0");
    }

    #[test]
    fn missing_pool_state_derives_tick_from_prices() {
        let (a, b) = (addr(1), addr(2));
        let mut ctx = empty_ctx();
        ctx.metadata.insert(a, info(a, "AAA", 18));
        ctx.metadata.insert(b, info(b, "BBB", 18));
        // Equal prices imply a tick near zero, inside [-600, 600].
        ctx.prices.insert(a, Decimal::from(100));
        ctx.prices.insert(b, Decimal::from(100));

        let positions = assemble(&[v3_raw(a, b)], &ctx);
        let Position::V3(p) = &positions[0] else {
            panic!("expected V3")
        };
        assert_eq!(p.current_tick, Some(0));
        assert!(p.in_range);
        assert_ne!(p.amount0_raw, "0");
    }

    #[test]
    fn no_state_and_no_prices_degrades_to_zero_valuation() {
        let (a, b) = (addr(1), addr(2));
        let positions = assemble(&[v3_raw(a, b)], &empty_ctx());
        let Position::V3(p) = &positions[0] else {
            panic!("expected V3")
        };
        assert_eq!(p.current_tick, None);
        assert!(!p.in_range);
        assert_eq!(p.liquidity_usd, Decimal::ZERO);
    }

    #[test]
    fn zero_liquidity_v3_is_closed_but_keeps_fees() {
        let (a, b) = (addr(1), addr(2));
        let mut raw = v3_raw(a, b);
        raw.liquidity = "0".to_string();
        let mut ctx = empty_ctx();
        ctx.metadata.insert(a, info(a, "AAA", 0));
        ctx.metadata.insert(b, info(b, "BBB", 0));
        ctx.prices.insert(a, Decimal::ONE);

        let positions = assemble(&[raw], &ctx);
        let Position::V3(p) = &positions[0] else {
            panic!("expected V3")
        };
        assert!(p.closed);
        assert_eq!(p.fees0, Decimal::from(500));
        assert_eq!(p.fees_usd, Decimal::from(500));
    }

    #[test]
    fn v4_fees_come_from_fee_growth_accounting() {
        let (a, b) = (addr(1), addr(2));
        let mut ctx = empty_ctx();
        ctx.metadata.insert(a, info(a, "AAA", 0));
        ctx.metadata.insert(b, info(b, "BBB", 0));
        let raw = v4_raw(a, b);
        ctx.v4_fees
            .insert(raw.ident.clone(), (BigUint::from(42u8), BigUint::zero()));

        let positions = assemble(&[raw], &ctx);
        let Position::V4(p) = &positions[0] else {
            panic!("expected V4")
        };
        assert_eq!(p.fees0, Decimal::from(42));
        assert_eq!(p.fees1, Decimal::ZERO);
    }
}
