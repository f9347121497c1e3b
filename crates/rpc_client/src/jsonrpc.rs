use serde::{Deserialize, Serialize};

/// The JSON-RPC version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Version {
    /// Version 2.0
    #[serde(rename = "2.0")]
    V2_0,
}

/// The identifier of a request.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Id {
    /// Numeric identifier
    Num(u64),
    /// String identifier
    Str(String),
}

/// A JSON-RPC request.
#[derive(Debug, Serialize)]
pub struct Request<MethodT> {
    /// The JSON-RPC version
    #[serde(rename = "jsonrpc")]
    pub version: Version,
    /// The request identifier
    pub id: Id,
    /// The method and its parameters
    #[serde(flatten)]
    pub method: MethodT,
}

/// A JSON-RPC error object.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, thiserror::Error)]
#[error("The response reported error `{code}`: `{message}`. (optional data: {data:?})")]
pub struct Error {
    /// The error code
    pub code: i16,
    /// The error message
    pub message: String,
    /// Additional error data
    pub data: Option<serde_json::Value>,
}

/// A JSON-RPC response.
#[derive(Debug, Deserialize)]
pub struct Response<SuccessT> {
    /// The JSON-RPC version
    #[serde(rename = "jsonrpc")]
    pub version: Version,
    /// The identifier of the request this response belongs to
    pub id: Id,
    /// The result or error
    #[serde(flatten)]
    pub data: ResponseData<SuccessT>,
}

/// The payload of a JSON-RPC response.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ResponseData<SuccessT> {
    /// An error
    Error {
        /// The error object
        error: Error,
    },
    /// A successful result
    Success {
        /// The result
        result: SuccessT,
    },
}

impl<SuccessT> ResponseData<SuccessT> {
    /// Converts the payload into a [`Result`].
    pub fn into_result(self) -> Result<SuccessT, Error> {
        match self {
            ResponseData::Success { result } => Ok(result),
            ResponseData::Error { error } => Err(error),
        }
    }
}
