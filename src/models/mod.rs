/*
 * Data models and types for the position aggregation engine
 */

use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol generation a position belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    V2,
    V3,
    V4,
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolVersion::V2 => write!(f, "v2"),
            ProtocolVersion::V3 => write!(f, "v3"),
            ProtocolVersion::V4 => write!(f, "v4"),
        }
    }
}

impl std::str::FromStr for ProtocolVersion {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "v2" => Ok(ProtocolVersion::V2),
            "v3" => Ok(ProtocolVersion::V3),
            "v4" => Ok(ProtocolVersion::V4),
            _ => Err(EngineError::InvalidInput(format!(
                "Unknown protocol version: {s}"
            ))),
        }
    }
}

/// Parsed `"<version>-<identifier>"` position reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRef {
    pub version: ProtocolVersion,
    pub ident: String,
}

impl std::str::FromStr for PositionRef {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let (version, ident) = s.split_once('-').ok_or_else(|| {
            EngineError::InvalidInput(format!("Malformed position id: {s}"))
        })?;
        if ident.is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "Malformed position id: {s}"
            )));
        }
        Ok(PositionRef {
            version: version.parse()?,
            ident: ident.to_string(),
        })
    }
}

/// Token metadata resolved once per enrichment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V2Position {
    pub id: String,
    pub pair: Address,
    pub token0: TokenInfo,
    pub token1: TokenInfo,
    pub amount0: Decimal,
    pub amount1: Decimal,
    pub amount0_raw: String,
    pub amount1_raw: String,
    pub lp_balance_raw: String,
    pub pool_share_percent: Decimal,
    pub closed: bool,
    pub liquidity_usd: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V3Position {
    pub id: String,
    pub token_id: String,
    pub token0: TokenInfo,
    pub token1: TokenInfo,
    pub fee: u32,
    pub tick_spacing: i32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub current_tick: Option<i32>,
    pub in_range: bool,
    pub liquidity_raw: String,
    pub amount0: Decimal,
    pub amount1: Decimal,
    pub amount0_raw: String,
    pub amount1_raw: String,
    pub fees0: Decimal,
    pub fees1: Decimal,
    pub closed: bool,
    pub liquidity_usd: Decimal,
    pub fees_usd: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V4Position {
    pub id: String,
    pub token_id: String,
    pub currency0: TokenInfo,
    pub currency1: TokenInfo,
    pub fee: u32,
    pub tick_spacing: i32,
    pub hooks: Address,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub current_tick: Option<i32>,
    pub in_range: bool,
    pub liquidity_raw: String,
    pub amount0: Decimal,
    pub amount1: Decimal,
    pub amount0_raw: String,
    pub amount1_raw: String,
    pub fees0: Decimal,
    pub fees1: Decimal,
    pub closed: bool,
    pub liquidity_usd: Decimal,
    pub fees_usd: Decimal,
}

/// A discovered liquidity position, tagged by protocol generation.
///
/// Every consumption site matches exhaustively so that adding a protocol
/// is a compile-time-checked change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum Position {
    #[serde(rename = "v2")]
    V2(V2Position),
    #[serde(rename = "v3")]
    V3(V3Position),
    #[serde(rename = "v4")]
    V4(V4Position),
}

impl Position {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Position::V2(p) => &p.id,
            Position::V3(p) => &p.id,
            Position::V4(p) => &p.id,
        }
    }

    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        match self {
            Position::V2(_) => ProtocolVersion::V2,
            Position::V3(_) => ProtocolVersion::V3,
            Position::V4(_) => ProtocolVersion::V4,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self {
            Position::V2(p) => p.closed,
            Position::V3(p) => p.closed,
            Position::V4(p) => p.closed,
        }
    }

    #[must_use]
    pub fn liquidity_usd(&self) -> Decimal {
        match self {
            Position::V2(p) => p.liquidity_usd,
            Position::V3(p) => p.liquidity_usd,
            Position::V4(p) => p.liquidity_usd,
        }
    }
}

/// Sorts positions descending by USD liquidity value; unvalued ones land last.
pub fn sort_positions(positions: &mut [Position]) {
    positions.sort_by(|a, b| b.liquidity_usd().cmp(&a.liquidity_usd()));
}

/// Protocol-specific scratch data a reader attaches to a raw position.
#[derive(Debug, Clone)]
pub enum RawScratch {
    V2 {
        reserve0: U256,
        reserve1: U256,
        total_supply: U256,
        balance: U256,
    },
    V3 {
        fee: u32,
        tokens_owed0: u128,
        tokens_owed1: u128,
    },
    V4 {
        fee: u32,
        tick_spacing: i32,
        hooks: Address,
    },
}

/// Protocol-agnostic intermediate produced by a reader and consumed exactly
/// once by the enrichment pipeline. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct RawPosition {
    pub version: ProtocolVersion,
    /// Pair address (V2) or NFT token id (V3/V4), decimal-formatted.
    pub ident: String,
    pub token0: Address,
    pub token1: Address,
    /// Liquidity descriptor; interpretation is protocol-specific
    /// (LP balance for V2, position liquidity for V3/V4).
    pub liquidity: String,
    pub tick_lower: String,
    pub tick_upper: String,
    pub scratch: RawScratch,
}

impl RawPosition {
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}-{}", self.version, self.ident)
    }
}

/// An unsigned transaction descriptor for wallet signing. The engine never
/// executes these itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub to: Address,
    /// 0x-prefixed calldata.
    pub data: String,
    /// Native value in wei, decimal string.
    pub value: String,
}

impl Transaction {
    #[must_use]
    pub fn new(to: Address, calldata: Vec<u8>, value: U256) -> Self {
        Self {
            to,
            data: format!("0x{}", hex_encode(&calldata)),
            value: value.to_string(),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::new(), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Action requested from the transaction builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxAction {
    Mint,
    Increase,
    Decrease,
    Burn,
    CreatePool,
}

/// Caller request for building position transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    pub action: TxAction,
    pub wallet: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub position_id: Option<String>,
    #[serde(default)]
    pub token0: Option<String>,
    #[serde(default)]
    pub token1: Option<String>,
    /// Raw wei amounts as decimal strings.
    #[serde(default)]
    pub amount0: Option<String>,
    #[serde(default)]
    pub amount1: Option<String>,
    #[serde(default)]
    pub liquidity: Option<String>,
    /// Slippage tolerance in percent, 0-100. Defaults to 0.5.
    #[serde(default)]
    pub slippage: Option<f64>,
    #[serde(default)]
    pub fee: Option<u32>,
    #[serde(default)]
    pub tick_spacing: Option<i32>,
    #[serde(default)]
    pub hooks: Option<String>,
    #[serde(default)]
    pub tick_lower: Option<i32>,
    #[serde(default)]
    pub tick_upper: Option<i32>,
    /// token1-per-token0 price ratio for pool initialization.
    #[serde(default)]
    pub initial_price: Option<f64>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Contract interaction error: {0}")]
    ContractError(String),

    #[error("Indexer error: {0}")]
    IndexerError(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;

    #[test]
    fn parses_position_refs() {
        let r: PositionRef = "v3-12345".parse().unwrap();
        assert_eq!(r.version, ProtocolVersion::V3);
        assert_eq!(r.ident, "12345");

        let r: PositionRef = "v2-0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc"
            .parse()
            .unwrap();
        assert_eq!(r.version, ProtocolVersion::V2);
    }

    #[test]
    fn rejects_malformed_position_refs() {
        assert!("v5-1".parse::<PositionRef>().is_err());
        assert!("v3".parse::<PositionRef>().is_err());
        assert!("v3-".parse::<PositionRef>().is_err());
    }

    #[test]
    fn positions_sort_by_usd_value_with_unvalued_last() {
        let make = |id: &str, usd: f64| {
            Position::V2(V2Position {
                id: id.to_string(),
                pair: Address::zero(),
                token0: TokenInfo {
                    address: Address::zero(),
                    symbol: "A".to_string(),
                    decimals: 18,
                },
                token1: TokenInfo {
                    address: Address::zero(),
                    symbol: "B".to_string(),
                    decimals: 18,
                },
                amount0: Decimal::ZERO,
                amount1: Decimal::ZERO,
                amount0_raw: "0".to_string(),
                amount1_raw: "0".to_string(),
                lp_balance_raw: "0".to_string(),
                pool_share_percent: Decimal::ZERO,
                closed: false,
                liquidity_usd: Decimal::from_f64(usd).unwrap(),
            })
        };
        let mut positions = vec![make("a", 0.0), make("b", 250.5), make("c", 10.0)];
        sort_positions(&mut positions);
        let ids: Vec<&str> = positions.iter().map(Position::id).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn serializes_position_with_version_tag() {
        let p = Position::V4(V4Position {
            id: "v4-7".to_string(),
            token_id: "7".to_string(),
            currency0: TokenInfo {
                address: Address::zero(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            currency1: TokenInfo {
                address: Address::zero(),
                symbol: "USDC".to_string(),
                decimals: 6,
            },
            fee: 500,
            tick_spacing: 10,
            hooks: Address::zero(),
            tick_lower: -100,
            tick_upper: 100,
            current_tick: Some(50),
            in_range: true,
            liquidity_raw: "1000".to_string(),
            amount0: Decimal::ZERO,
            amount1: Decimal::ZERO,
            amount0_raw: "0".to_string(),
            amount1_raw: "0".to_string(),
            fees0: Decimal::ZERO,
            fees1: Decimal::ZERO,
            closed: false,
            liquidity_usd: Decimal::ZERO,
            fees_usd: Decimal::ZERO,
        });
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["version"], "v4");
        assert_eq!(json["liquidity_raw"], "1000");
    }
}
