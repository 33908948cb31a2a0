/*
 * Token USD price resolution: on-chain derivation with aggregator fallback
 */

use crate::config::PricesConfig;
use crate::models::{EngineError, Result};
use async_trait::async_trait;
use ethers::types::Address;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::warn;

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn usd_prices(&self, tokens: &[Address]) -> Result<HashMap<Address, Decimal>>;
}

/// External price aggregator used as fallback when on-chain derivation
/// covers too few of the required tokens.
pub struct AggregatorClient {
    client: reqwest::Client,
    base_url: String,
    platform: String,
}

impl AggregatorClient {
    #[must_use]
    pub fn new(config: &PricesConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.aggregator_url.trim_end_matches('/').to_string(),
            platform: config.platform.clone(),
        }
    }
}

#[async_trait]
impl PriceSource for AggregatorClient {
    async fn usd_prices(&self, tokens: &[Address]) -> Result<HashMap<Address, Decimal>> {
        if tokens.is_empty() {
            return Ok(HashMap::new());
        }
        let addresses = tokens
            .iter()
            .map(|a| format!("{a:?}"))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/simple/token_price/{}?contract_addresses={addresses}&vs_currencies=usd",
            self.base_url, self.platform
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;
        let entries = response.as_object().ok_or_else(|| {
            EngineError::CalculationError("Malformed aggregator response".to_string())
        })?;

        let mut prices = HashMap::new();
        for (address, entry) in entries {
            let Ok(address) = address.parse::<Address>() else {
                continue;
            };
            if let Some(price) = entry["usd"].as_f64().and_then(Decimal::from_f64) {
                prices.insert(address, price);
            }
        }
        Ok(prices)
    }
}

/// A pool state observation prices can be derived from.
#[derive(Debug, Clone)]
pub struct ObservedPool {
    pub token0: Address,
    pub token1: Address,
    pub decimals0: u8,
    pub decimals1: u8,
    pub tick: i32,
}

impl ObservedPool {
    /// Human-unit token1-per-token0 price implied by the pool tick.
    fn price_ratio(&self) -> Option<f64> {
        let raw = 1.0001f64.powi(self.tick);
        let adjusted = raw * 10f64.powi(i32::from(self.decimals0) - i32::from(self.decimals1));
        (adjusted.is_finite() && adjusted > 0.0).then_some(adjusted)
    }
}

/// Resolves token USD prices for one enrichment run. On-chain-derived prices
/// win per token; the aggregator only fills gaps, and only when fewer than
/// half the required tokens priced on-chain.
pub struct PriceResolver {
    stables: Vec<Address>,
    source: Box<dyn PriceSource>,
}

impl PriceResolver {
    #[must_use]
    pub fn new(stables: Vec<Address>, source: Box<dyn PriceSource>) -> Self {
        Self { stables, source }
    }

    pub async fn resolve(
        &self,
        required: &[Address],
        pools: &[ObservedPool],
    ) -> HashMap<Address, Decimal> {
        let mut prices = derive_onchain(&self.stables, pools);

        let resolved = required.iter().filter(|t| prices.contains_key(t)).count();
        if resolved * 2 < required.len() {
            match self.source.usd_prices(required).await {
                Ok(external) => {
                    for (token, price) in external {
                        prices.entry(token).or_insert(price);
                    }
                }
                // A token without a price values its positions at zero;
                // never an error.
                Err(e) => warn!("Price aggregator fallback failed: {e}"),
            }
        }
        prices
    }
}

/// Anchors stables at $1 and propagates across observed pools so tokens
/// pooled against a priced token inherit a derived price. Two passes reach
/// tokens one hop removed from an anchor.
fn derive_onchain(stables: &[Address], pools: &[ObservedPool]) -> HashMap<Address, Decimal> {
    let mut prices: HashMap<Address, f64> = stables.iter().map(|s| (*s, 1.0)).collect();

    for _ in 0..2 {
        for pool in pools {
            let Some(ratio) = pool.price_ratio() else {
                continue;
            };
            let p0 = prices.get(&pool.token0).copied();
            let p1 = prices.get(&pool.token1).copied();
            match (p0, p1) {
                // 1 token0 trades for `ratio` token1.
                (Some(p0), None) => {
                    prices.insert(pool.token1, p0 / ratio);
                }
                (None, Some(p1)) => {
                    prices.insert(pool.token0, p1 * ratio);
                }
                _ => {}
            }
        }
    }

    prices
        .into_iter()
        .filter_map(|(token, price)| Decimal::from_f64(price).map(|p| (token, p)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::ToPrimitive;

    fn addr(n: u8) -> Address {
        Address::from_low_u64_be(u64::from(n))
    }

    fn assert_close(price: Decimal, expected: f64) {
        let actual = price.to_f64().unwrap();
        assert!(
            (actual - expected).abs() / expected < 0.01,
            "expected ~{expected}, got {actual}"
        );
    }

    #[test]
    fn derives_price_from_stable_anchor() {
        let stable = addr(1);
        let token = addr(2);
        // tick 6932 implies a raw ratio of ~2 token1 per token0.
        let pools = [ObservedPool {
            token0: token,
            token1: stable,
            decimals0: 18,
            decimals1: 18,
            tick: 6932,
        }];
        let prices = derive_onchain(&[stable], &pools);
        assert_close(prices[&token], 2.0);
    }

    #[test]
    fn propagates_prices_one_hop_past_the_anchor() {
        let stable = addr(1);
        let mid = addr(2);
        let far = addr(3);
        let pools = [
            ObservedPool {
                token0: far,
                token1: mid,
                decimals0: 18,
                decimals1: 18,
                tick: 0,
            },
            ObservedPool {
                token0: mid,
                token1: stable,
                decimals0: 18,
                decimals1: 18,
                tick: 6932,
            },
        ];
        let prices = derive_onchain(&[stable], &pools);
        assert_close(prices[&mid], 2.0);
        assert_close(prices[&far], 2.0);
    }

    #[test]
    fn adjusts_for_decimal_differences() {
        let stable = addr(1); // 6 decimals
        let token = addr(2); // 18 decimals
        // Raw ratio of 10^-12 equals a human ratio of 1 after adjustment.
        let tick = (1e-12f64.ln() / 1.0001f64.ln()).round() as i32;
        let pools = [ObservedPool {
            token0: token,
            token1: stable,
            decimals0: 18,
            decimals1: 6,
            tick,
        }];
        let prices = derive_onchain(&[stable], &pools);
        assert_close(prices[&token], 1.0);
    }

    struct StaticSource(HashMap<Address, Decimal>);

    #[async_trait]
    impl PriceSource for StaticSource {
        async fn usd_prices(&self, _tokens: &[Address]) -> Result<HashMap<Address, Decimal>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn falls_back_when_under_half_resolve_onchain() {
        let stable = addr(1);
        let unknown_a = addr(8);
        let unknown_b = addr(9);
        let mut external = HashMap::new();
        external.insert(unknown_a, Decimal::from(5));
        external.insert(stable, Decimal::from(3));

        let resolver = PriceResolver::new(vec![stable], Box::new(StaticSource(external)));
        let prices = resolver
            .resolve(&[stable, unknown_a, unknown_b], &[])
            .await;

        // On-chain anchor wins over the aggregator's $3 quote.
        assert_eq!(prices[&stable], Decimal::from(1));
        assert_eq!(prices[&unknown_a], Decimal::from(5));
        assert!(!prices.contains_key(&unknown_b));
    }

    #[tokio::test]
    async fn skips_fallback_when_onchain_coverage_is_sufficient() {
        struct FailingSource;
        #[async_trait]
        impl PriceSource for FailingSource {
            async fn usd_prices(&self, _: &[Address]) -> Result<HashMap<Address, Decimal>> {
                panic!("fallback must not run");
            }
        }

        let stable = addr(1);
        let resolver = PriceResolver::new(vec![stable], Box::new(FailingSource));
        let prices = resolver.resolve(&[stable], &[]).await;
        assert_eq!(prices[&stable], Decimal::from(1));
    }

    #[tokio::test]
    async fn aggregator_client_parses_token_price_payload() {
        let mut server = mockito::Server::new_async().await;
        let token = "0x00000000000000000000000000000000000000aa";
        let mock = server
            .mock("GET", "/simple/token_price/ethereum")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"{token}":{{"usd":1234.56}}}}"#))
            .create_async()
            .await;

        let client = AggregatorClient::new(&PricesConfig {
            aggregator_url: server.url(),
            platform: "ethereum".to_string(),
            stable_tokens: Vec::new(),
        });
        let prices = client
            .usd_prices(&[token.parse().unwrap()])
            .await
            .unwrap();
        assert_close(prices[&token.parse::<Address>().unwrap()], 1234.56);
        mock.assert_async().await;
    }
}
