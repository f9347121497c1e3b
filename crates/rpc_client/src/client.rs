use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use devnet_defaults::SAFE_BLOCK_DEPTH;
use devnet_primitives::{Address, B256, Bytes, HashMap, U64, U256};
use futures::{TryFutureExt, future};
use parking_lot::RwLock;
use reqwest::{
    Client as HttpClient,
    header::{self, HeaderMap, HeaderValue},
};
use reqwest_middleware::{ClientBuilder as HttpClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::OnceCell;

use crate::{
    jsonrpc,
    method::{BlockSpec, RequestMethod},
    types::{FeeHistoryResult, LogFilterOptions, RpcBlock, RpcLog, RpcReceipt},
};

// Retry parameters for rate limited requests.
const EXPONENT_BASE: u32 = 2;
const MIN_RETRY_INTERVAL: Duration = Duration::from_secs(1);
const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(32);
const MAX_RETRIES: u32 = 9;

/// How long the latest block number of the remote is reused before it is
/// requested again.
const BLOCK_NUMBER_TTL: Duration = Duration::from_secs(12);

/// Specialized error types
#[derive(Debug, thiserror::Error)]
pub enum RpcClientError {
    /// The message could not be sent to the remote node
    #[error(transparent)]
    FailedToSend(reqwest_middleware::Error),

    /// The remote node failed to reply with the body of the response
    #[error("The response text was corrupted: {0}.")]
    CorruptedResponse(reqwest::Error),

    /// The server returned an error code.
    #[error("The Http server returned error status code: {0}")]
    HttpStatus(reqwest::Error),

    /// The request cannot be serialized as JSON.
    #[error(transparent)]
    InvalidJsonRequest(serde_json::Error),

    /// The server returned an invalid JSON-RPC response.
    #[error(
        "Response '{response}' failed to parse with expected type '{expected_type}', due to error: '{error}'"
    )]
    InvalidResponse {
        /// The response text
        response: String,
        /// The expected type of the response
        expected_type: &'static str,
        /// The parse error
        error: serde_json::Error,
    },

    /// Invalid URL format
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),

    /// The JSON-RPC returned an error.
    #[error("{error}. Request: {request}")]
    JsonRpcError {
        /// The JSON-RPC error
        error: jsonrpc::Error,
        /// The request JSON
        request: String,
    },

    /// The remote does not know the requested item.
    #[error("The remote node does not know {item}.")]
    NotFound {
        /// Description of the missing item
        item: String,
    },
}

#[derive(Clone, Debug)]
struct CachedBlockNumber {
    block_number: u64,
    timestamp: Instant,
}

/// A client for executing RPC methods on a remote Ethereum node.
///
/// Responses pinned to a block deeper than [`SAFE_BLOCK_DEPTH`] below the
/// remote's tip are cached in memory, as they can no longer change.
#[derive(Debug)]
pub struct RpcClient {
    url: url::Url,
    chain_id: OnceCell<u64>,
    cached_block_number: RwLock<Option<CachedBlockNumber>>,
    client: ClientWithMiddleware,
    next_id: AtomicU64,
    cache: RwLock<HashMap<String, serde_json::Value>>,
}

impl RpcClient {
    /// Create a new instance, given a remote node URL and optional extra
    /// headers.
    pub fn new(url: &str, extra_headers: Option<HeaderMap>) -> Result<Self, RpcClientError> {
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(MIN_RETRY_INTERVAL, MAX_RETRY_INTERVAL)
            .base(EXPONENT_BASE)
            .build_with_max_retries(MAX_RETRIES);

        let mut headers = extra_headers.unwrap_or_default();
        headers.append(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.append(
            header::USER_AGENT,
            HeaderValue::from_static(concat!("devnet ", env!("CARGO_PKG_VERSION"))),
        );

        let client = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|error| RpcClientError::FailedToSend(error.into()))?;

        let client = HttpClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(RpcClient {
            url: url.parse()?,
            chain_id: OnceCell::new(),
            cached_block_number: RwLock::new(None),
            client,
            next_id: AtomicU64::new(0),
            cache: RwLock::new(HashMap::default()),
        })
    }

    fn parse_response_str<SuccessT: DeserializeOwned>(
        response: String,
    ) -> Result<jsonrpc::Response<SuccessT>, RpcClientError> {
        serde_json::from_str(&response).map_err(|error| RpcClientError::InvalidResponse {
            response,
            expected_type: std::any::type_name::<jsonrpc::Response<SuccessT>>(),
            error,
        })
    }

    async fn retry_on_sporadic_failure<SuccessT: DeserializeOwned>(
        &self,
        error: jsonrpc::Error,
        request: String,
    ) -> Result<SuccessT, RpcClientError> {
        let is_missing_trie_node_error =
            error.code == -32000 && error.message.to_lowercase().contains("missing trie node");

        let result = if is_missing_trie_node_error {
            self.send_request_body(&request)
                .await
                .and_then(Self::parse_response_str)?
                .data
                .into_result()
        } else {
            Err(error)
        };

        result.map_err(|error| RpcClientError::JsonRpcError { error, request })
    }

    async fn send_request_and_extract_result<SuccessT: DeserializeOwned>(
        &self,
        request: String,
    ) -> Result<SuccessT, RpcClientError> {
        future::ready(
            self.send_request_body(&request)
                .await
                .and_then(Self::parse_response_str)?
                .data
                .into_result(),
        )
        // Some providers return sporadic failures in the JSON-RPC layer
        .or_else(|error| async { self.retry_on_sporadic_failure(error, request).await })
        .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    async fn send_request_body(&self, request_body: &str) -> Result<String, RpcClientError> {
        self.client
            .post(self.url.clone())
            .body(request_body.to_owned())
            .send()
            .await
            .map_err(RpcClientError::FailedToSend)?
            .error_for_status()
            .map_err(RpcClientError::HttpStatus)?
            .text()
            .await
            .map_err(RpcClientError::CorruptedResponse)
    }

    fn serialize_request(&self, method: &RequestMethod) -> Result<String, RpcClientError> {
        let id = jsonrpc::Id::Num(self.next_id.fetch_add(1, Ordering::Relaxed));

        serde_json::to_string(&jsonrpc::Request {
            version: jsonrpc::Version::V2_0,
            id,
            method,
        })
        .map_err(RpcClientError::InvalidJsonRequest)
    }

    fn read_from_cache<SuccessT: DeserializeOwned>(&self, cache_key: &str) -> Option<SuccessT> {
        let value = self.cache.read().get(cache_key).cloned()?;

        match serde_json::from_value(value) {
            Ok(result) => Some(result),
            Err(error) => {
                log::error!(
                    "Failed to deserialize item from RPC response cache for '{cache_key}': {error}"
                );
                self.cache.write().remove(cache_key);
                None
            }
        }
    }

    /// Calls the provided JSON-RPC method and returns the result.
    pub async fn call<SuccessT: DeserializeOwned + Serialize>(
        &self,
        method: RequestMethod,
    ) -> Result<SuccessT, RpcClientError> {
        self.call_with_resolver(method, |_| None).await
    }

    /// Calls the provided JSON-RPC method, uses the provided resolver to
    /// determine the block number the result belongs to if the method itself
    /// is not pinned to one, and returns the result.
    pub async fn call_with_resolver<SuccessT: DeserializeOwned + Serialize>(
        &self,
        method: RequestMethod,
        resolve_block_number: impl Fn(&SuccessT) -> Option<u64>,
    ) -> Result<SuccessT, RpcClientError> {
        let cache_key = serde_json::to_string(&method).map_err(RpcClientError::InvalidJsonRequest)?;

        if let Some(result) = self.read_from_cache(&cache_key) {
            log::trace!("Cache hit: {}", method.name());
            return Ok(result);
        }

        log::trace!("Cache miss: {}", method.name());

        let request = self.serialize_request(&method)?;
        let result: SuccessT = self.send_request_and_extract_result(request).await?;

        let block_number = method
            .pinned_block_number()
            .or_else(|| resolve_block_number(&result));

        if let Some(block_number) = block_number
            && self.is_cacheable_block_number(block_number).await?
        {
            match serde_json::to_value(&result) {
                Ok(value) => {
                    self.cache.write().insert(cache_key, value);
                }
                Err(error) => {
                    log::error!("Failed to serialize item for RPC response cache: {error}");
                }
            }
        }

        Ok(result)
    }

    // The uncached path exists to avoid recursion, as the cached path calls
    // `eth_blockNumber` itself.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    async fn call_without_cache<SuccessT: DeserializeOwned>(
        &self,
        method: RequestMethod,
    ) -> Result<SuccessT, RpcClientError> {
        let request = self.serialize_request(&method)?;

        self.send_request_and_extract_result(request).await
    }

    /// Calls `eth_blockNumber` and returns the block number.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self)))]
    pub async fn block_number(&self) -> Result<u64, RpcClientError> {
        let block_number = self
            .call_without_cache::<U64>(RequestMethod::BlockNumber(()))
            .await?
            .to::<u64>();

        *self.cached_block_number.write() = Some(CachedBlockNumber {
            block_number,
            timestamp: Instant::now(),
        });

        Ok(block_number)
    }

    async fn cached_block_number(&self) -> Result<u64, RpcClientError> {
        let cached_block_number = self.cached_block_number.read().clone();

        if let Some(cached_block_number) = cached_block_number
            && cached_block_number.timestamp.elapsed() < BLOCK_NUMBER_TTL
        {
            return Ok(cached_block_number.block_number);
        }

        self.block_number().await
    }

    /// Whether the block number should be cached based on its depth.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self)))]
    pub async fn is_cacheable_block_number(
        &self,
        block_number: u64,
    ) -> Result<bool, RpcClientError> {
        let latest_block_number = self.cached_block_number().await?;

        Ok(is_safe_block_number(block_number, latest_block_number))
    }

    /// Calls `eth_chainId` and returns the chain ID.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self)))]
    pub async fn chain_id(&self) -> Result<u64, RpcClientError> {
        let chain_id = *self
            .chain_id
            .get_or_try_init(|| async {
                self.call_without_cache::<U64>(RequestMethod::ChainId(()))
                    .await
                    .map(|chain_id| chain_id.to::<u64>())
            })
            .await?;

        Ok(chain_id)
    }

    /// Calls `net_version` and returns the network ID.
    pub async fn network_id(&self) -> Result<u64, RpcClientError> {
        let network_id: String = self
            .call_without_cache(RequestMethod::NetVersion(()))
            .await?;

        network_id
            .parse()
            .map_err(|_error| RpcClientError::InvalidResponse {
                response: network_id.clone(),
                expected_type: "u64",
                error: serde::de::Error::custom("network id is not a decimal number"),
            })
    }

    /// Calls `eth_getBalance`.
    pub async fn get_balance(
        &self,
        address: Address,
        block: BlockSpec,
    ) -> Result<U256, RpcClientError> {
        self.call(RequestMethod::GetBalance(address, block)).await
    }

    /// Calls `eth_getCode`.
    pub async fn get_code(&self, address: Address, block: BlockSpec) -> Result<Bytes, RpcClientError> {
        self.call(RequestMethod::GetCode(address, block)).await
    }

    /// Calls `eth_getTransactionCount`.
    pub async fn get_transaction_count(
        &self,
        address: Address,
        block: BlockSpec,
    ) -> Result<u64, RpcClientError> {
        self.call::<U64>(RequestMethod::GetTransactionCount(address, block))
            .await
            .map(|nonce| nonce.to::<u64>())
    }

    /// Calls `eth_getStorageAt`.
    pub async fn get_storage_at(
        &self,
        address: Address,
        index: U256,
        block: BlockSpec,
    ) -> Result<U256, RpcClientError> {
        self.call(RequestMethod::GetStorageAt(address, index, block))
            .await
    }

    /// Retrieves the balance, nonce, and code of an account at the provided
    /// block concurrently.
    pub async fn get_account(
        &self,
        address: Address,
        block: BlockSpec,
    ) -> Result<(U256, u64, Bytes), RpcClientError> {
        futures::try_join!(
            self.get_balance(address, block),
            self.get_transaction_count(address, block),
            self.get_code(address, block),
        )
    }

    /// Calls `eth_getBlockByNumber` without full transactions.
    pub async fn get_block_by_number(
        &self,
        block: BlockSpec,
    ) -> Result<Option<RpcBlock>, RpcClientError> {
        self.call(RequestMethod::GetBlockByNumber(block, false))
            .await
    }

    /// Calls `eth_getBlockByHash` without full transactions.
    pub async fn get_block_by_hash(&self, hash: B256) -> Result<Option<RpcBlock>, RpcClientError> {
        self.call_with_resolver(
            RequestMethod::GetBlockByHash(hash, false),
            |block: &Option<RpcBlock>| block.as_ref().map(|block| block.number.to::<u64>()),
        )
        .await
    }

    /// Calls `eth_getTransactionReceipt`.
    pub async fn get_transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<RpcReceipt>, RpcClientError> {
        self.call_with_resolver(
            RequestMethod::GetTransactionReceipt(hash),
            |receipt: &Option<RpcReceipt>| {
                receipt
                    .as_ref()
                    .map(|receipt| receipt.block_number.to::<u64>())
            },
        )
        .await
    }

    /// Calls `eth_getLogs`.
    pub async fn get_logs(
        &self,
        options: LogFilterOptions,
    ) -> Result<Vec<RpcLog>, RpcClientError> {
        self.call(RequestMethod::GetLogs(options)).await
    }

    /// Calls `eth_feeHistory`.
    pub async fn fee_history(
        &self,
        block_count: u64,
        newest_block: BlockSpec,
        reward_percentiles: Vec<f64>,
    ) -> Result<FeeHistoryResult, RpcClientError> {
        self.call(RequestMethod::FeeHistory(
            U256::from(block_count),
            newest_block,
            reward_percentiles,
        ))
        .await
    }
}

/// Whether the provided block number is deep enough below the latest block to
/// be considered immutable.
pub fn is_safe_block_number(block_number: u64, latest_block_number: u64) -> bool {
    block_number <= latest_block_number.saturating_sub(SAFE_BLOCK_DEPTH)
}
