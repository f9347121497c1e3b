#![warn(missing_docs)]

//! Ethereum JSON-RPC client used to fork a remote chain.

mod client;
/// Types specific to JSON-RPC
pub mod jsonrpc;
mod method;
mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
/// Wire types returned by the remote.
pub mod types;

pub use reqwest::header::{self, HeaderMap};

pub use self::{
    client::{RpcClient, RpcClientError, is_safe_block_number},
    method::{BlockSpec, RequestMethod},
    source::{BlockingRpcClient, ForkMetadata, RemoteAccount, RemoteChainSource},
};
