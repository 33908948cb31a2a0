/*
 * RPC gateway: prioritized providers with retry, fallback and multicall batching
 */

use crate::config::ChainConfig;
use crate::models::{EngineError, Result};
use crate::utils;
use ethers::abi::{ParamType, Token};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_RETRIES: usize = 2;
const RETRY_BACKOFF_MS: u64 = 500;

/// One read call destined for a contract.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub target: Address,
    pub calldata: Vec<u8>,
}

/// Per-call multicall result. With `allow_failure` the batch succeeds even
/// when individual calls revert; callers must tolerate `success == false`.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub success: bool,
    pub data: Vec<u8>,
}

struct Endpoint {
    url: String,
    provider: Arc<Provider<Http>>,
}

/// Issues `eth_call` and Multicall3 batches against a priority-ordered
/// provider list. Transient failures are retried with a fixed backoff before
/// advancing to the next provider; contract-level failures advance
/// immediately. Exhausting every provider surfaces the last error.
pub struct RpcGateway {
    endpoints: Vec<Endpoint>,
    multicall3: Address,
    call_timeout: Duration,
    batch_timeout: Duration,
}

impl RpcGateway {
    pub fn new(chain: &ChainConfig, multicall3: Address) -> Result<Self> {
        if chain.rpc_urls.is_empty() {
            return Err(EngineError::ConfigError(
                "At least one RPC provider URL is required".to_string(),
            ));
        }
        let mut endpoints = Vec::with_capacity(chain.rpc_urls.len());
        for url in &chain.rpc_urls {
            let provider = Provider::<Http>::try_from(url.as_str())
                .map_err(|e| EngineError::ConfigError(format!("Invalid RPC URL {url}: {e}")))?;
            endpoints.push(Endpoint {
                url: url.clone(),
                provider: Arc::new(provider),
            });
        }
        Ok(Self {
            endpoints,
            multicall3,
            call_timeout: Duration::from_millis(chain.call_timeout_ms),
            batch_timeout: Duration::from_millis(chain.batch_timeout_ms),
        })
    }

    /// Single `eth_call` with the short existence-check timeout.
    pub async fn eth_call(&self, to: Address, calldata: Vec<u8>) -> Result<Vec<u8>> {
        self.call_with_timeout(to, calldata, self.call_timeout).await
    }

    /// Batches calls through Multicall3 `aggregate3` under the longer batch
    /// timeout. Each outcome is tagged success/failure independently when
    /// `allow_failure` is set; otherwise any failing call reverts the batch.
    pub async fn multicall(
        &self,
        calls: &[CallRequest],
        allow_failure: bool,
    ) -> Result<Vec<CallOutcome>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        let entries: Vec<Token> = calls
            .iter()
            .map(|call| {
                Token::Tuple(vec![
                    Token::Address(call.target),
                    Token::Bool(allow_failure),
                    Token::Bytes(call.calldata.clone()),
                ])
            })
            .collect();
        let calldata =
            utils::encode_call("aggregate3((address,bool,bytes)[])", &[Token::Array(entries)]);
        let raw = self
            .call_with_timeout(self.multicall3, calldata, self.batch_timeout)
            .await?;
        decode_multicall_results(&raw, calls.len())
    }

    async fn call_with_timeout(
        &self,
        to: Address,
        calldata: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let tx: TypedTransaction = TransactionRequest::new()
            .to(to)
            .data(Bytes::from(calldata))
            .into();

        let mut last_error = EngineError::RpcError("No RPC providers configured".to_string());
        for endpoint in &self.endpoints {
            let mut attempt = 0;
            loop {
                match tokio::time::timeout(timeout, endpoint.provider.call(&tx, None)).await {
                    Ok(Ok(bytes)) => return Ok(bytes.to_vec()),
                    Ok(Err(e)) => {
                        let text = e.to_string();
                        if is_transient(&text) && attempt < MAX_RETRIES {
                            attempt += 1;
                            debug!("Transient RPC error on {} (attempt {attempt}): {text}", endpoint.url);
                            tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS)).await;
                            continue;
                        }
                        warn!("RPC call failed on {}: {text}", endpoint.url);
                        last_error = EngineError::RpcError(text);
                        break;
                    }
                    Err(_) => {
                        if attempt < MAX_RETRIES {
                            attempt += 1;
                            debug!("RPC timeout on {} (attempt {attempt})", endpoint.url);
                            tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS)).await;
                            continue;
                        }
                        warn!("RPC timeout on {} after {} attempts", endpoint.url, attempt + 1);
                        last_error = EngineError::RpcError(format!(
                            "Timed out after {}ms on {}",
                            timeout.as_millis(),
                            endpoint.url
                        ));
                        break;
                    }
                }
            }
        }
        Err(last_error)
    }
}

/// Connection-level failures are worth retrying on the same provider;
/// contract reverts and malformed responses are not.
fn is_transient(error_text: &str) -> bool {
    let text = error_text.to_lowercase();
    [
        "timeout",
        "timed out",
        "connect",
        "connection",
        "dns",
        "network",
        "reset",
        "broken pipe",
        "error sending request",
    ]
    .iter()
    .any(|needle| text.contains(needle))
}

fn decode_multicall_results(raw: &[u8], expected: usize) -> Result<Vec<CallOutcome>> {
    let result_type = ParamType::Array(Box::new(ParamType::Tuple(vec![
        ParamType::Bool,
        ParamType::Bytes,
    ])));
    let mut tokens = utils::abi_decode(&[result_type], raw)?;
    let Token::Array(items) = tokens.remove(0) else {
        return Err(EngineError::ContractError(
            "Malformed aggregate3 response".to_string(),
        ));
    };
    if items.len() != expected {
        return Err(EngineError::ContractError(format!(
            "Multicall returned {} results, expected {expected}",
            items.len()
        )));
    }
    items
        .into_iter()
        .map(|item| match item {
            Token::Tuple(fields) => match (&fields[0], &fields[1]) {
                (Token::Bool(success), Token::Bytes(data)) => Ok(CallOutcome {
                    success: *success,
                    data: data.clone(),
                }),
                _ => Err(EngineError::ContractError(
                    "Malformed aggregate3 result tuple".to_string(),
                )),
            },
            _ => Err(EngineError::ContractError(
                "Malformed aggregate3 result tuple".to_string(),
            )),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::encode;

    fn test_chain(urls: Vec<String>) -> ChainConfig {
        ChainConfig {
            rpc_urls: urls,
            chain_id: 1,
            call_timeout_ms: 2_000,
            batch_timeout_ms: 2_000,
        }
    }

    fn encoded_results(entries: &[(bool, Vec<u8>)]) -> Vec<u8> {
        let items: Vec<Token> = entries
            .iter()
            .map(|(ok, data)| Token::Tuple(vec![Token::Bool(*ok), Token::Bytes(data.clone())]))
            .collect();
        encode(&[Token::Array(items)])
    }

    #[test]
    fn classifies_transient_errors() {
        assert!(is_transient("error trying to connect: Connection refused"));
        assert!(is_transient("operation timed out"));
        assert!(is_transient("dns error: failed to lookup"));
        assert!(!is_transient("execution reverted"));
        assert!(!is_transient("deserialization error: invalid type"));
    }

    #[test]
    fn decodes_partial_multicall_batches() {
        let entries = vec![
            (true, vec![1u8; 32]),
            (true, vec![2u8; 32]),
            (false, Vec::new()),
            (true, vec![4u8; 32]),
            (true, vec![5u8; 32]),
        ];
        let outcomes = decode_multicall_results(&encoded_results(&entries), 5).unwrap();
        assert_eq!(outcomes.len(), 5);
        assert!(!outcomes[2].success);
        for i in [0usize, 1, 3, 4] {
            assert!(outcomes[i].success);
            assert_eq!(outcomes[i].data.len(), 32);
        }
    }

    #[test]
    fn rejects_multicall_length_mismatch() {
        let encoded = encoded_results(&[(true, vec![0u8; 32])]);
        assert!(decode_multicall_results(&encoded, 2).is_err());
    }

    #[tokio::test]
    async fn empty_multicall_short_circuits() {
        let gateway = RpcGateway::new(
            &test_chain(vec!["http://localhost:8545".to_string()]),
            Address::zero(),
        )
        .unwrap();
        assert!(gateway.multicall(&[], true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn advances_to_fallback_on_contract_error_without_retry() {
        let mut primary = mockito::Server::new_async().await;
        let mut fallback = mockito::Server::new_async().await;

        let primary_mock = primary
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":3,"message":"execution reverted"}}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let fallback_mock = fallback
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"jsonrpc":"2.0","id":1,"result":"0x{}"}}"#,
                "00".repeat(31) + "2a"
            ))
            .create_async()
            .await;

        let gateway = RpcGateway::new(
            &test_chain(vec![primary.url(), fallback.url()]),
            Address::zero(),
        )
        .unwrap();
        let out = gateway.eth_call(Address::zero(), vec![0u8; 4]).await.unwrap();
        assert_eq!(out.len(), 32);
        assert_eq!(out[31], 0x2a);

        primary_mock.assert_async().await;
        fallback_mock.assert_async().await;
    }

    #[tokio::test]
    async fn retries_transient_failure_then_falls_back() {
        let mut fallback = mockito::Server::new_async().await;
        let fallback_mock = fallback
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"jsonrpc":"2.0","id":1,"result":"0x{}"}}"#,
                "00".repeat(32)
            ))
            .create_async()
            .await;

        // Port 9 is unroutable, so the primary fails with a connect error.
        let gateway = RpcGateway::new(
            &test_chain(vec!["http://127.0.0.1:9".to_string(), fallback.url()]),
            Address::zero(),
        )
        .unwrap();
        let out = gateway.eth_call(Address::zero(), vec![0u8; 4]).await.unwrap();
        assert_eq!(out.len(), 32);
        fallback_mock.assert_async().await;
    }

    #[tokio::test]
    async fn surfaces_last_error_when_all_providers_exhaust() {
        let mut only = mockito::Server::new_async().await;
        let _mock = only
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":3,"message":"execution reverted"}}"#)
            .create_async()
            .await;

        let gateway =
            RpcGateway::new(&test_chain(vec![only.url()]), Address::zero()).unwrap();
        let err = gateway.eth_call(Address::zero(), vec![0u8; 4]).await.unwrap_err();
        assert!(err.to_string().contains("reverted"));
    }
}
