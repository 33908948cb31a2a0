/*
 * Position service coordinating discovery, enrichment and tx building
 */

use crate::config::Config;
use crate::enrich::Enricher;
use crate::math;
use crate::models::{
    BuildRequest, EngineError, Position, PositionRef, ProtocolVersion, Result, Transaction,
    TxAction,
};
use crate::prices::{AggregatorClient, PriceResolver};
use crate::protocols::{IndexerClient, PoolKey, V2Reader, V3Reader, V4Reader};
use crate::rpc::RpcGateway;
use crate::txbuilder;
use crate::txbuilder::v4::ApprovalPlanner;
use crate::utils::{
    abi_decode, biguint_to_u256, encode_call, parse_wei, sort_addresses, token_uint,
    u256_to_biguint,
};
use crate::validator;
use chrono::Utc;
use ethers::abi::{ParamType, Token};
use ethers::types::{Address, U256};
use tracing::{info, warn};

pub struct PositionService {
    config: Config,
    gateway: RpcGateway,
    indexer: IndexerClient,
    resolver: PriceResolver,
}

impl PositionService {
    pub fn new(config: Config) -> Result<Self> {
        let gateway = RpcGateway::new(&config.chain, config.contracts.multicall3)?;
        let indexer = IndexerClient::new(&config.indexer);
        let resolver = PriceResolver::new(
            config.prices.stable_tokens.clone(),
            Box::new(AggregatorClient::new(&config.prices)),
        );
        Ok(Self {
            config,
            gateway,
            indexer,
            resolver,
        })
    }

    /// Discovers every position the wallet holds across all three protocol
    /// generations. Readers run concurrently; one failing protocol
    /// contributes nothing instead of failing the whole call.
    pub async fn discover(&self, wallet: Address, include_closed: bool) -> Result<Vec<Position>> {
        info!("Discovering positions for {wallet:?}");

        let v2 = V2Reader::new(&self.gateway, &self.config.v2_pairs);
        let v3 = V3Reader::new(&self.gateway, self.config.contracts.v3_position_manager);
        let v4 = V4Reader::new(
            &self.gateway,
            &self.indexer,
            self.config.contracts.v4_position_manager,
        );
        let (r2, r3, r4) = tokio::join!(v2.read(wallet), v3.read(wallet), v4.read(wallet));

        let mut raws = Vec::new();
        for (protocol, result) in [("V2", r2), ("V3", r3), ("V4", r4)] {
            match result {
                Ok(mut found) => {
                    info!("{protocol} reader found {} positions", found.len());
                    raws.append(&mut found);
                }
                Err(e) => warn!("{protocol} reader failed, contributing none: {e}"),
            }
        }

        let enricher = Enricher::new(&self.gateway, &self.config.contracts, &self.resolver);
        let positions = enricher.enrich(raws).await?;
        Ok(if include_closed {
            positions
        } else {
            positions.into_iter().filter(|p| !p.is_closed()).collect()
        })
    }

    /// Builds the transaction sequence for the requested action. Approvals
    /// found missing are prepended so the result signs in order.
    pub async fn build_transactions(&self, request: &BuildRequest) -> Result<Vec<Transaction>> {
        let wallet = parse_address(&request.wallet)?;
        let bps = txbuilder::slippage_bps(request.slippage)?;
        let version = self.resolve_version(request)?;

        match (request.action, version) {
            (TxAction::Mint | TxAction::Increase, ProtocolVersion::V2) => {
                self.build_v2_add(request, wallet, bps).await
            }
            (TxAction::Decrease | TxAction::Burn, ProtocolVersion::V2) => {
                self.build_v2_remove(request, wallet, bps)
            }
            (TxAction::CreatePool, ProtocolVersion::V2) => Err(EngineError::InvalidInput(
                "V2 pairs are created by the first addLiquidity; no explicit init step".to_string(),
            )),

            (TxAction::Mint, ProtocolVersion::V3) => self.build_v3_mint(request, wallet, bps).await,
            (TxAction::Increase, ProtocolVersion::V3) => {
                self.build_v3_increase(request, wallet, bps).await
            }
            (TxAction::Decrease, ProtocolVersion::V3) => self.build_v3_decrease(request, bps),
            (TxAction::Burn, ProtocolVersion::V3) => {
                let token_id = self.position_token_id(request)?;
                Ok(vec![txbuilder::v3::burn(
                    self.config.contracts.v3_position_manager,
                    token_id,
                )])
            }
            (TxAction::CreatePool, ProtocolVersion::V3) => self.build_v3_create(request),

            (TxAction::Mint, ProtocolVersion::V4) => self.build_v4_mint(request, wallet, bps).await,
            (TxAction::Increase, ProtocolVersion::V4) => {
                self.build_v4_increase(request, wallet).await
            }
            (TxAction::Decrease | TxAction::Burn, ProtocolVersion::V4) => {
                self.build_v4_remove(request, wallet, bps)
            }
            (TxAction::CreatePool, ProtocolVersion::V4) => self.build_v4_create(request),
        }
    }

    fn resolve_version(&self, request: &BuildRequest) -> Result<ProtocolVersion> {
        if let Some(id) = &request.position_id {
            let parsed: PositionRef = id.parse()?;
            return Ok(parsed.version);
        }
        match &request.version {
            Some(v) => v.parse(),
            None => Err(EngineError::InvalidInput(
                "Either position_id or version is required".to_string(),
            )),
        }
    }

    fn position_token_id(&self, request: &BuildRequest) -> Result<U256> {
        let id = request.position_id.as_ref().ok_or_else(|| {
            EngineError::InvalidInput("position_id is required for this action".to_string())
        })?;
        let parsed: PositionRef = id.parse()?;
        U256::from_dec_str(&parsed.ident).map_err(|e| {
            EngineError::InvalidInput(format!("Invalid token id {}: {e}", parsed.ident))
        })
    }

    async fn erc20_allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let raw = self
            .gateway
            .eth_call(
                token,
                encode_call(
                    "allowance(address,address)",
                    &[Token::Address(owner), Token::Address(spender)],
                ),
            )
            .await?;
        token_uint(&abi_decode(&[ParamType::Uint(256)], &raw)?[0])
    }

    /// Direct ERC20 approval, only when the current allowance falls short.
    async fn maybe_erc20_approval(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<Option<Transaction>> {
        let allowance = self.erc20_allowance(token, owner, spender).await?;
        Ok((allowance < amount).then(|| txbuilder::erc20_approve(token, spender, amount)))
    }

    async fn v4_pool_sqrt_price(&self, key: &PoolKey) -> Result<U256> {
        let raw = self
            .gateway
            .eth_call(
                self.config.contracts.v4_state_view,
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
        let sqrt_price = token_uint(&tokens[0])?;
        if sqrt_price.is_zero() {
            return Err(EngineError::InvalidInput(
                "V4 pool is not initialized; create_pool first".to_string(),
            ));
        }
        Ok(sqrt_price)
    }

    async fn build_v2_add(
        &self,
        request: &BuildRequest,
        wallet: Address,
        bps: u32,
    ) -> Result<Vec<Transaction>> {
        let token_a = parse_address(required(&request.token0, "token0")?)?;
        let token_b = parse_address(required(&request.token1, "token1")?)?;
        let amount_a = positive_wei(required(&request.amount0, "amount0")?)?;
        let amount_b = positive_wei(required(&request.amount1, "amount1")?)?;
        let router = self.config.contracts.v2_router;

        let mut transactions = Vec::new();
        for (token, amount) in [(token_a, amount_a), (token_b, amount_b)] {
            if let Some(approval) = self.maybe_erc20_approval(token, wallet, router, amount).await? {
                transactions.push(approval);
            }
        }
        transactions.push(txbuilder::v2::add_liquidity(
            router,
            token_a,
            token_b,
            amount_a,
            amount_b,
            bps,
            wallet,
            txbuilder::deadline(),
        ));
        Ok(transactions)
    }

    fn build_v2_remove(
        &self,
        request: &BuildRequest,
        wallet: Address,
        bps: u32,
    ) -> Result<Vec<Transaction>> {
        let token_a = parse_address(required(&request.token0, "token0")?)?;
        let token_b = parse_address(required(&request.token1, "token1")?)?;
        let liquidity = positive_wei(required(&request.liquidity, "liquidity")?)?;
        let expected_a = optional_wei(&request.amount0)?;
        let expected_b = optional_wei(&request.amount1)?;
        Ok(vec![txbuilder::v2::remove_liquidity(
            self.config.contracts.v2_router,
            token_a,
            token_b,
            liquidity,
            expected_a,
            expected_b,
            bps,
            wallet,
            txbuilder::deadline(),
        )])
    }

    async fn build_v3_mint(
        &self,
        request: &BuildRequest,
        wallet: Address,
        bps: u32,
    ) -> Result<Vec<Transaction>> {
        let raw0 = parse_address(required(&request.token0, "token0")?)?;
        let raw1 = parse_address(required(&request.token1, "token1")?)?;
        let fee = required(&request.fee, "fee").copied()?;
        let spacing = validator::v3_fee_to_tick_spacing(fee)?;

        // Token order is canonical on-chain; swap amounts along with tokens.
        let (token0, token1) = sort_addresses(raw0, raw1);
        let (amount0_raw, amount1_raw) = if token0 == raw0 {
            (&request.amount0, &request.amount1)
        } else {
            (&request.amount1, &request.amount0)
        };
        let amount0 = positive_wei(required(amount0_raw, "amount0")?)?;
        let amount1 = positive_wei(required(amount1_raw, "amount1")?)?;

        let (tick_lower, tick_upper) = self.tick_window(request, spacing)?;
        if !self
            .pool_validator()
            .v3_pool_exists(token0, token1, fee)
            .await?
        {
            return Err(EngineError::InvalidInput(
                "V3 pool does not exist; create_pool first".to_string(),
            ));
        }

        let manager = self.config.contracts.v3_position_manager;
        let mut transactions = Vec::new();
        for (token, amount) in [(token0, amount0), (token1, amount1)] {
            if let Some(approval) = self.maybe_erc20_approval(token, wallet, manager, amount).await? {
                transactions.push(approval);
            }
        }
        transactions.push(txbuilder::v3::mint(
            manager,
            &txbuilder::v3::MintParams {
                token0,
                token1,
                fee,
                tick_lower,
                tick_upper,
                amount0,
                amount1,
                slippage_bps: bps,
                recipient: wallet,
            },
            txbuilder::deadline(),
        ));
        Ok(transactions)
    }

    async fn build_v3_increase(
        &self,
        request: &BuildRequest,
        wallet: Address,
        bps: u32,
    ) -> Result<Vec<Transaction>> {
        let token_id = self.position_token_id(request)?;
        let amount0 = positive_wei(required(&request.amount0, "amount0")?)?;
        let amount1 = positive_wei(required(&request.amount1, "amount1")?)?;
        let manager = self.config.contracts.v3_position_manager;

        let mut transactions = Vec::new();
        // Approvals can only be checked when the pair is supplied.
        for (token, amount) in [
            (request.token0.as_ref(), amount0),
            (request.token1.as_ref(), amount1),
        ] {
            if let Some(token) = token {
                let token = parse_address(token)?;
                if let Some(approval) =
                    self.maybe_erc20_approval(token, wallet, manager, amount).await?
                {
                    transactions.push(approval);
                }
            }
        }
        transactions.push(txbuilder::v3::increase_liquidity(
            manager,
            token_id,
            amount0,
            amount1,
            bps,
            txbuilder::deadline(),
        ));
        Ok(transactions)
    }

    fn build_v3_decrease(&self, request: &BuildRequest, bps: u32) -> Result<Vec<Transaction>> {
        let token_id = self.position_token_id(request)?;
        let liquidity = positive_wei(required(&request.liquidity, "liquidity")?)?;
        Ok(vec![txbuilder::v3::decrease_liquidity(
            self.config.contracts.v3_position_manager,
            token_id,
            liquidity,
            optional_wei(&request.amount0)?,
            optional_wei(&request.amount1)?,
            bps,
            txbuilder::deadline(),
        )])
    }

    fn build_v3_create(&self, request: &BuildRequest) -> Result<Vec<Transaction>> {
        let raw0 = parse_address(required(&request.token0, "token0")?)?;
        let raw1 = parse_address(required(&request.token1, "token1")?)?;
        let fee = required(&request.fee, "fee").copied()?;
        validator::v3_fee_to_tick_spacing(fee)?;
        let price = required(&request.initial_price, "initial_price").copied()?;
        let sqrt_price = biguint_to_u256(&math::sqrt_price_x96_from_price(price)?)?;

        let (token0, token1) = sort_addresses(raw0, raw1);
        Ok(vec![txbuilder::v3::create_pool(
            self.config.contracts.v3_position_manager,
            token0,
            token1,
            fee,
            sqrt_price,
        )])
    }

    fn v4_pool_key(&self, request: &BuildRequest) -> Result<PoolKey> {
        let currency0 = parse_address(required(&request.token0, "token0")?)?;
        let currency1 = parse_address(required(&request.token1, "token1")?)?;
        let fee = required(&request.fee, "fee").copied()?;
        let tick_spacing = match request.tick_spacing {
            Some(spacing) if spacing > 0 => spacing,
            Some(spacing) => {
                return Err(EngineError::InvalidInput(format!(
                    "Invalid tick spacing: {spacing}"
                )))
            }
            None => validator::v4_fee_to_tick_spacing(fee)?,
        };
        let hooks = match &request.hooks {
            Some(h) => parse_address(h)?,
            None => Address::zero(),
        };
        Ok(PoolKey {
            currency0,
            currency1,
            fee,
            tick_spacing,
            hooks,
        })
    }

    async fn build_v4_mint(
        &self,
        request: &BuildRequest,
        wallet: Address,
        _bps: u32,
    ) -> Result<Vec<Transaction>> {
        let key = self.v4_pool_key(request)?;
        let amount0 = positive_wei(required(&request.amount0, "amount0")?)?;
        let amount1 = positive_wei(required(&request.amount1, "amount1")?)?;
        let (tick_lower, tick_upper) = self.tick_window(request, key.tick_spacing)?;

        let sqrt_price = self.v4_pool_sqrt_price(&key).await?;
        let liquidity = biguint_to_u256(&math::liquidity_from_amounts_full_range(
            &u256_to_biguint(amount0),
            &u256_to_biguint(amount1),
            &u256_to_biguint(sqrt_price),
        ))?;

        let mut transactions = self.v4_approvals(wallet, &key, amount0, amount1).await?;
        transactions.push(txbuilder::v4::mint(
            self.config.contracts.v4_position_manager,
            &txbuilder::v4::V4MintParams {
                pool_key: key,
                tick_lower,
                tick_upper,
                liquidity,
                amount0_max: amount0,
                amount1_max: amount1,
                recipient: wallet,
            },
            txbuilder::deadline(),
        )?);
        Ok(transactions)
    }

    async fn build_v4_increase(
        &self,
        request: &BuildRequest,
        wallet: Address,
    ) -> Result<Vec<Transaction>> {
        let token_id = self.position_token_id(request)?;
        let key = self.v4_pool_key(request)?;
        let amount0 = positive_wei(required(&request.amount0, "amount0")?)?;
        let amount1 = positive_wei(required(&request.amount1, "amount1")?)?;

        let sqrt_price = self.v4_pool_sqrt_price(&key).await?;
        let liquidity = biguint_to_u256(&math::liquidity_from_amounts_full_range(
            &u256_to_biguint(amount0),
            &u256_to_biguint(amount1),
            &u256_to_biguint(sqrt_price),
        ))?;

        let mut transactions = self.v4_approvals(wallet, &key, amount0, amount1).await?;
        transactions.push(txbuilder::v4::increase(
            self.config.contracts.v4_position_manager,
            token_id,
            liquidity,
            amount0,
            amount1,
            key.currency0,
            key.currency1,
            txbuilder::deadline(),
        ));
        Ok(transactions)
    }

    fn build_v4_remove(
        &self,
        request: &BuildRequest,
        wallet: Address,
        bps: u32,
    ) -> Result<Vec<Transaction>> {
        let token_id = self.position_token_id(request)?;
        let key = self.v4_pool_key(request)?;
        let amount0_min = txbuilder::apply_slippage(optional_wei(&request.amount0)?, bps);
        let amount1_min = txbuilder::apply_slippage(optional_wei(&request.amount1)?, bps);
        let manager = self.config.contracts.v4_position_manager;
        let deadline = txbuilder::deadline();

        let tx = if request.action == TxAction::Burn {
            txbuilder::v4::burn(
                manager,
                token_id,
                amount0_min,
                amount1_min,
                key.currency0,
                key.currency1,
                wallet,
                deadline,
            )
        } else {
            let liquidity = positive_wei(required(&request.liquidity, "liquidity")?)?;
            txbuilder::v4::decrease(
                manager,
                token_id,
                liquidity,
                amount0_min,
                amount1_min,
                key.currency0,
                key.currency1,
                wallet,
                deadline,
            )
        };
        Ok(vec![tx])
    }

    fn build_v4_create(&self, request: &BuildRequest) -> Result<Vec<Transaction>> {
        let key = self.v4_pool_key(request)?;
        let price = required(&request.initial_price, "initial_price").copied()?;
        let sqrt_price = biguint_to_u256(&math::sqrt_price_x96_from_price(price)?)?;
        Ok(vec![txbuilder::v4::initialize(
            self.config.contracts.v4_pool_manager,
            &key,
            sqrt_price,
        )?])
    }

    async fn v4_approvals(
        &self,
        wallet: Address,
        key: &PoolKey,
        amount0: U256,
        amount1: U256,
    ) -> Result<Vec<Transaction>> {
        let planner = ApprovalPlanner::new(
            &self.gateway,
            self.config.contracts.permit2,
            self.config.contracts.v4_position_manager,
        );
        #[allow(clippy::cast_sign_loss)]
        let now = Utc::now().timestamp() as u64;
        let mut transactions = planner.plan(wallet, key.currency0, amount0, now).await?;
        transactions.extend(planner.plan(wallet, key.currency1, amount1, now).await?);
        Ok(transactions)
    }

    fn tick_window(&self, request: &BuildRequest, spacing: i32) -> Result<(i32, i32)> {
        match (request.tick_lower, request.tick_upper) {
            (Some(lower), Some(upper)) => {
                if lower >= upper {
                    return Err(EngineError::InvalidInput(format!(
                        "tick_lower {lower} must be below tick_upper {upper}"
                    )));
                }
                if lower % spacing != 0 || upper % spacing != 0 {
                    return Err(EngineError::InvalidInput(format!(
                        "Ticks must align to spacing {spacing}"
                    )));
                }
                Ok((lower, upper))
            }
            (None, None) => validator::full_range_ticks(spacing),
            _ => Err(EngineError::InvalidInput(
                "Provide both tick bounds or neither".to_string(),
            )),
        }
    }

    fn pool_validator(&self) -> validator::PoolValidator<'_> {
        validator::PoolValidator::new(&self.gateway, &self.config.contracts)
    }
}

fn parse_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse()
        .map_err(|e| EngineError::InvalidInput(format!("Invalid address {raw}: {e}")))
}

fn required<'a, T>(value: &'a Option<T>, name: &str) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| EngineError::InvalidInput(format!("{name} is required for this action")))
}

fn positive_wei(raw: &str) -> Result<U256> {
    let amount = parse_wei(raw)?;
    if amount.is_zero() {
        return Err(EngineError::InvalidInput(
            "Amounts must be greater than zero".to_string(),
        ));
    }
    Ok(amount)
}

fn optional_wei(raw: &Option<String>) -> Result<U256> {
    match raw {
        Some(v) => parse_wei(v),
        None => Ok(U256::zero()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ChainConfig, ContractsConfig, IndexerConfig, PricesConfig, ServerConfig,
    };

    fn test_config() -> Config {
        let addr = |n: u8| Address::from_low_u64_be(u64::from(n));
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                log_level: "info".to_string(),
            },
            chain: ChainConfig {
                rpc_urls: vec!["http://localhost:8545".to_string()],
                chain_id: 1,
                call_timeout_ms: 1_000,
                batch_timeout_ms: 1_000,
            },
            contracts: ContractsConfig {
                multicall3: addr(1),
                v2_factory: addr(2),
                v2_router: addr(3),
                v3_factory: addr(4),
                v3_position_manager: addr(5),
                v4_pool_manager: addr(6),
                v4_position_manager: addr(7),
                v4_state_view: addr(8),
                permit2: addr(9),
            },
            v2_pairs: Vec::new(),
            indexer: IndexerConfig {
                base_url: String::new(),
                max_pages: 10,
            },
            prices: PricesConfig {
                aggregator_url: "http://localhost:1".to_string(),
                platform: "ethereum".to_string(),
                stable_tokens: Vec::new(),
            },
        }
    }

    fn service() -> PositionService {
        PositionService::new(test_config()).unwrap()
    }

    fn base_request(action: TxAction) -> BuildRequest {
        BuildRequest {
            action,
            wallet: format!("{:?}", Address::from_low_u64_be(0xabc)),
            version: None,
            position_id: None,
            token0: None,
            token1: None,
            amount0: None,
            amount1: None,
            liquidity: None,
            slippage: None,
            fee: None,
            tick_spacing: None,
            hooks: None,
            tick_lower: None,
            tick_upper: None,
            initial_price: None,
        }
    }

    #[tokio::test]
    async fn rejects_request_without_version_or_position() {
        let err = service()
            .build_transactions(&base_request(TxAction::Mint))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn rejects_unknown_version_prefix() {
        let mut request = base_request(TxAction::Burn);
        request.position_id = Some("v9-17".to_string());
        let err = service().build_transactions(&request).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn rejects_zero_amounts() {
        let mut request = base_request(TxAction::Mint);
        request.version = Some("v2".to_string());
        request.token0 = Some(format!("{:?}", Address::from_low_u64_be(1)));
        request.token1 = Some(format!("{:?}", Address::from_low_u64_be(2)));
        request.amount0 = Some("0".to_string());
        request.amount1 = Some("100".to_string());
        let err = service().build_transactions(&request).await.unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[tokio::test]
    async fn rejects_v2_pool_creation() {
        let mut request = base_request(TxAction::CreatePool);
        request.version = Some("v2".to_string());
        let err = service().build_transactions(&request).await.unwrap_err();
        assert!(err.to_string().contains("no explicit init"));
    }

    #[tokio::test]
    async fn rejects_unknown_v4_fee_without_spacing() {
        let mut request = base_request(TxAction::CreatePool);
        request.version = Some("v4".to_string());
        request.token0 = Some(format!("{:?}", Address::from_low_u64_be(1)));
        request.token1 = Some(format!("{:?}", Address::from_low_u64_be(2)));
        request.fee = Some(1234);
        request.initial_price = Some(1.0);
        let err = service().build_transactions(&request).await.unwrap_err();
        assert!(err.to_string().contains("fee tier"));
    }

    #[tokio::test]
    async fn v4_create_pool_builds_initialize() {
        let mut request = base_request(TxAction::CreatePool);
        request.version = Some("v4".to_string());
        request.token0 = Some(format!("{:?}", Address::from_low_u64_be(1)));
        request.token1 = Some(format!("{:?}", Address::from_low_u64_be(2)));
        request.fee = Some(500);
        request.initial_price = Some(1.0);
        let txs = service().build_transactions(&request).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].to, Address::from_low_u64_be(6));
    }

    #[tokio::test]
    async fn v3_burn_builds_single_transaction() {
        let mut request = base_request(TxAction::Burn);
        request.position_id = Some("v3-42".to_string());
        let txs = service().build_transactions(&request).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert!(txs[0].data.starts_with("0x42966c68"));
    }

    #[tokio::test]
    async fn misaligned_ticks_are_rejected() {
        let mut request = base_request(TxAction::CreatePool);
        request.version = Some("v3".to_string());
        let svc = service();
        // tick_window is exercised through mint, but validate directly here.
        request.tick_lower = Some(-605);
        request.tick_upper = Some(600);
        let err = svc.tick_window(&request, 10).unwrap_err();
        assert!(err.to_string().contains("align"));

        request.tick_lower = Some(600);
        request.tick_upper = Some(600);
        let err = svc.tick_window(&request, 10).unwrap_err();
        assert!(err.to_string().contains("below"));

        request.tick_lower = None;
        request.tick_upper = None;
        assert_eq!(svc.tick_window(&request, 10).unwrap(), (-887270, 887270));
    }
}
