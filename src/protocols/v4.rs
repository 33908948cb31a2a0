/*
 * V4 singleton-pool NFT reader and pool identity math
 */

use crate::config::IndexerConfig;
use crate::models::{EngineError, ProtocolVersion, RawPosition, RawScratch, Result};
use crate::rpc::{CallRequest, RpcGateway};
use crate::utils::{
    abi_decode, encode_call, int24_be_bytes, int24_token, i32_from_int24_bits, token_address,
    token_tick, token_uint,
};
use ethers::abi::{encode, ParamType, Token};
use ethers::types::{Address, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Identifies a V4 pool. Currencies must already be in sorted order;
/// hashing an unsorted pair produces an id no deployed pool answers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pub currency0: Address,
    pub currency1: Address,
    pub fee: u32,
    pub tick_spacing: i32,
    pub hooks: Address,
}

impl PoolKey {
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.currency0.as_bytes() < self.currency1.as_bytes()
    }

    /// The pool id: keccak-256 of the ABI-encoded five-field struct.
    #[must_use]
    pub fn to_id(&self) -> [u8; 32] {
        let encoded = encode(&[
            Token::Address(self.currency0),
            Token::Address(self.currency1),
            Token::Uint(self.fee.into()),
            int24_token(self.tick_spacing),
            Token::Address(self.hooks),
        ]);
        keccak256(encoded)
    }

    /// The key as an ABI tuple for calldata embedding.
    #[must_use]
    pub fn abi_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Address(self.currency0),
            Token::Address(self.currency1),
            Token::Uint(self.fee.into()),
            int24_token(self.tick_spacing),
            Token::Address(self.hooks),
        ])
    }
}

/// Fee-accounting key for a position inside the pool manager: keccak-256 of
/// the packed `manager ‖ tickLower ‖ tickUpper ‖ tokenId` bytes.
#[must_use]
pub fn position_fee_key(
    position_manager: Address,
    tick_lower: i32,
    tick_upper: i32,
    token_id: U256,
) -> [u8; 32] {
    let mut packed = Vec::with_capacity(20 + 3 + 3 + 32);
    packed.extend_from_slice(position_manager.as_bytes());
    packed.extend_from_slice(&int24_be_bytes(tick_lower));
    packed.extend_from_slice(&int24_be_bytes(tick_upper));
    let mut id_bytes = [0u8; 32];
    token_id.to_big_endian(&mut id_bytes);
    packed.extend_from_slice(&id_bytes);
    keccak256(packed)
}

/// Decodes the bit-packed position info word: one subscriber-flag byte is
/// skipped, then two 24-bit two's-complement tick fields follow.
#[must_use]
pub fn decode_packed_ticks(info: U256) -> (i32, i32) {
    let shifted = info >> 8;
    let tick_lower = i32_from_int24_bits(shifted.low_u32());
    let tick_upper = i32_from_int24_bits((shifted >> 24).low_u32());
    (tick_lower, tick_upper)
}

/// Off-chain NFT indexer used for V4 token-id discovery; the position NFT
/// exposes no on-chain enumeration.
pub struct IndexerClient {
    client: reqwest::Client,
    base_url: String,
    max_pages: u32,
}

impl IndexerClient {
    #[must_use]
    pub fn new(config: &IndexerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_pages: config.max_pages,
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }

    /// Pages through the indexer until exhausted or the page cap is hit.
    pub async fn owned_token_ids(&self, owner: Address, contract: Address) -> Result<Vec<U256>> {
        let mut ids = Vec::new();
        let mut page_key: Option<String> = None;

        for _ in 0..self.max_pages {
            let mut url = format!(
                "{}/getNFTs?owner={owner:?}&contractAddresses[]={contract:?}&withMetadata=false",
                self.base_url
            );
            if let Some(key) = &page_key {
                url.push_str("&pageKey=");
                url.push_str(key);
            }

            let response = self
                .client
                .get(&url)
                .send()
                .await?
                .json::<serde_json::Value>()
                .await?;

            let nfts = response["ownedNfts"].as_array().ok_or_else(|| {
                EngineError::IndexerError("Missing ownedNfts in indexer response".to_string())
            })?;
            for nft in nfts {
                let hex_id = nft["id"]["tokenId"].as_str().ok_or_else(|| {
                    EngineError::IndexerError("Missing tokenId in indexer response".to_string())
                })?;
                let id = U256::from_str_radix(hex_id.trim_start_matches("0x"), 16)
                    .map_err(|e| EngineError::IndexerError(format!("Bad token id {hex_id}: {e}")))?;
                ids.push(id);
            }

            match response["pageKey"].as_str() {
                Some(key) => page_key = Some(key.to_string()),
                None => break,
            }
        }
        Ok(ids)
    }
}

/// Reads a wallet's V4 positions: token ids from the indexer, then one
/// interleaved multicall for pool key, packed info and liquidity.
pub struct V4Reader<'a> {
    gateway: &'a RpcGateway,
    indexer: &'a IndexerClient,
    position_manager: Address,
}

impl<'a> V4Reader<'a> {
    #[must_use]
    pub fn new(
        gateway: &'a RpcGateway,
        indexer: &'a IndexerClient,
        position_manager: Address,
    ) -> Self {
        Self {
            gateway,
            indexer,
            position_manager,
        }
    }

    pub async fn read(&self, wallet: Address) -> Result<Vec<RawPosition>> {
        if !self.indexer.is_configured() {
            debug!("NFT indexer not configured; skipping V4 discovery");
            return Ok(Vec::new());
        }
        let token_ids = match self.indexer.owned_token_ids(wallet, self.position_manager).await {
            Ok(ids) => ids,
            Err(e) => {
                // Indexer outage degrades V4 to empty rather than failing
                // the whole aggregation.
                warn!("V4 token-id discovery unavailable: {e}");
                return Ok(Vec::new());
            }
        };
        if token_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut calls = Vec::with_capacity(token_ids.len() * 2);
        for id in &token_ids {
            calls.push(CallRequest {
                target: self.position_manager,
                calldata: encode_call("getPoolAndPositionInfo(uint256)", &[Token::Uint(*id)]),
            });
            calls.push(CallRequest {
                target: self.position_manager,
                calldata: encode_call("getPositionLiquidity(uint256)", &[Token::Uint(*id)]),
            });
        }
        let outcomes = self.gateway.multicall(&calls, true).await?;

        let mut positions = Vec::new();
        for (i, token_id) in token_ids.iter().enumerate() {
            let info_outcome = &outcomes[i * 2];
            let liquidity_outcome = &outcomes[i * 2 + 1];
            if !info_outcome.success || !liquidity_outcome.success {
                warn!("V4 state read reverted for token {token_id}");
                continue;
            }
            match decode_token_state(*token_id, &info_outcome.data, &liquidity_outcome.data) {
                Ok(raw) => positions.push(raw),
                Err(e) => warn!("Skipping V4 position {token_id}: {e}"),
            }
        }
        Ok(positions)
    }
}

fn decode_token_state(token_id: U256, info_data: &[u8], liquidity_data: &[u8]) -> Result<RawPosition> {
    let tokens = abi_decode(
        &[
            ParamType::Tuple(vec![
                ParamType::Address,
                ParamType::Address,
                ParamType::Uint(24),
                ParamType::Int(24),
                ParamType::Address,
            ]),
            ParamType::Uint(256),
        ],
        info_data,
    )?;
    let Token::Tuple(key_fields) = &tokens[0] else {
        return Err(EngineError::ContractError(
            "Malformed pool key tuple".to_string(),
        ));
    };
    let currency0 = token_address(&key_fields[0])?;
    let currency1 = token_address(&key_fields[1])?;
    let fee = token_uint(&key_fields[2])?.low_u32();
    let tick_spacing = token_tick(&key_fields[3])?;
    let hooks = token_address(&key_fields[4])?;
    let packed_info = token_uint(&tokens[1])?;
    let (tick_lower, tick_upper) = decode_packed_ticks(packed_info);

    let liquidity = token_uint(&abi_decode(&[ParamType::Uint(128)], liquidity_data)?[0])?;

    Ok(RawPosition {
        version: ProtocolVersion::V4,
        ident: token_id.to_string(),
        token0: currency0,
        token1: currency1,
        liquidity: liquidity.to_string(),
        tick_lower: tick_lower.to_string(),
        tick_upper: tick_upper.to_string(),
        scratch: RawScratch::V4 {
            fee,
            tick_spacing,
            hooks,
        },
    })
}
