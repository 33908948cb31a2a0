/*
 * Configuration management for the position engine
 */

use crate::models::{EngineError, Result};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub chain: ChainConfig,
    pub contracts: ContractsConfig,
    /// V2 exposes no on-chain enumeration of a holder's pairs, so discovery
    /// scans this explicit allow-list.
    pub v2_pairs: Vec<Address>,
    pub indexer: IndexerConfig,
    pub prices: PricesConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    /// Priority-ordered provider endpoints; the key-authenticated primary
    /// first, public fallbacks after.
    pub rpc_urls: Vec<String>,
    pub chain_id: u64,
    /// Timeout for single existence-check style calls.
    pub call_timeout_ms: u64,
    /// Timeout for batched multicall reads.
    pub batch_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractsConfig {
    pub multicall3: Address,
    pub v2_factory: Address,
    pub v2_router: Address,
    pub v3_factory: Address,
    pub v3_position_manager: Address,
    pub v4_pool_manager: Address,
    pub v4_position_manager: Address,
    pub v4_state_view: Address,
    pub permit2: Address,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerConfig {
    /// Base URL of the NFT-indexing service used for V4 token-id discovery.
    /// Empty means unavailable; V4 discovery then degrades to empty.
    pub base_url: String,
    /// Pagination safety cap.
    pub max_pages: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PricesConfig {
    /// Base URL of the external price aggregator used as fallback.
    pub aggregator_url: String,
    /// Aggregator platform identifier for token lookups.
    pub platform: String,
    /// Stablecoin addresses anchored at $1 for on-chain price derivation.
    pub stable_tokens: Vec<Address>,
}

const DEFAULT_FALLBACK_RPCS: &str = "https://eth.llamarpc.com,https://rpc.ankr.com/eth";

const DEFAULT_V2_PAIRS: &str = concat!(
    // WETH/USDC, WETH/USDT, DAI/WETH
    "0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc,",
    "0x0d4a11d5EEaaC28EC3F61d100daF4d40471f1852,",
    "0xA478c2975Ab1Ea89e8196811F51A7B7Ade33eB11"
);

const DEFAULT_STABLES: &str = concat!(
    // USDC, USDT, DAI
    "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48,",
    "0xdAC17F958D2ee523a2206206994597C13D831ec7,",
    "0x6B175474E89094C44Da98b954EedeAC495271d0F"
);

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let primary = env::var("RPC_URL")
            .map_err(|_| EngineError::ConfigError("RPC_URL not set".to_string()))?;
        let fallbacks =
            env::var("RPC_FALLBACK_URLS").unwrap_or_else(|_| DEFAULT_FALLBACK_RPCS.to_string());
        let mut rpc_urls = vec![primary];
        rpc_urls.extend(
            fallbacks
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|e| EngineError::ConfigError(format!("Invalid port: {e}")))?,
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            chain: ChainConfig {
                rpc_urls,
                chain_id: env::var("CHAIN_ID")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .map_err(|e| EngineError::ConfigError(format!("Invalid chain id: {e}")))?,
                call_timeout_ms: env_u64("RPC_CALL_TIMEOUT_MS", 3_000)?,
                batch_timeout_ms: env_u64("RPC_BATCH_TIMEOUT_MS", 15_000)?,
            },
            contracts: ContractsConfig {
                multicall3: contract_address(
                    "MULTICALL3_ADDRESS",
                    "0xcA11bde05977b3631167028862bE2a173976CA11",
                )?,
                v2_factory: contract_address(
                    "V2_FACTORY_ADDRESS",
                    "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f",
                )?,
                v2_router: contract_address(
                    "V2_ROUTER_ADDRESS",
                    "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D",
                )?,
                v3_factory: contract_address(
                    "V3_FACTORY_ADDRESS",
                    "0x1F98431c8aD98523631AE4a59f267346ea31F984",
                )?,
                v3_position_manager: contract_address(
                    "V3_POSITION_MANAGER_ADDRESS",
                    "0xC36442b4a4522E871399CD717aBDD847Ab11FE88",
                )?,
                v4_pool_manager: contract_address(
                    "V4_POOL_MANAGER_ADDRESS",
                    "0x000000000004444c5dc75cB358380D2e3dE08A90",
                )?,
                v4_position_manager: contract_address(
                    "V4_POSITION_MANAGER_ADDRESS",
                    "0xbD216513d74C8cf14cf4747E6AaA6420FF64ee9e",
                )?,
                v4_state_view: contract_address(
                    "V4_STATE_VIEW_ADDRESS",
                    "0x7fFE42C4a5DEeA5b0feC41C94C136Cf115597227",
                )?,
                permit2: contract_address(
                    "PERMIT2_ADDRESS",
                    "0x000000000022D473030F116dDEE9F6B43aC78BA3",
                )?,
            },
            v2_pairs: parse_address_list(
                &env::var("V2_PAIR_ADDRESSES").unwrap_or_else(|_| DEFAULT_V2_PAIRS.to_string()),
            )?,
            indexer: IndexerConfig {
                base_url: env::var("NFT_INDEXER_URL").unwrap_or_default(),
                max_pages: env::var("NFT_INDEXER_MAX_PAGES")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .map_err(|e| EngineError::ConfigError(format!("Invalid page cap: {e}")))?,
            },
            prices: PricesConfig {
                aggregator_url: env::var("PRICE_AGGREGATOR_URL")
                    .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
                platform: env::var("PRICE_PLATFORM").unwrap_or_else(|_| "ethereum".to_string()),
                stable_tokens: parse_address_list(
                    &env::var("STABLE_TOKEN_ADDRESSES")
                        .unwrap_or_else(|_| DEFAULT_STABLES.to_string()),
                )?,
            },
        })
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|e| EngineError::ConfigError(format!("Invalid {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn contract_address(key: &str, default: &str) -> Result<Address> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    parse_address(&raw)
}

fn parse_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse()
        .map_err(|e| EngineError::ConfigError(format!("Invalid address {raw}: {e}")))
}

fn parse_address_list(raw: &str) -> Result<Vec<Address>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_address)
        .collect()
}
