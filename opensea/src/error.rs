use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Response error:\nStatusCode: {0}\nText: {1}")]
    Response(reqwest::StatusCode, String),

    #[error("Failed to deserialize response: {0}")]
    Deserialize(String),

    #[error("Parse error: {0}")]
    Parse(#[from] url::ParseError),

    #[error("Couldn't convert query to string: {0}")]
    HttpQuery(#[from] serde_qs::Error),

    #[error("Invalid header: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Malformed listing: {0}")]
    Listing(String),

    #[error("Collection {0} has no contract")]
    NoContract(String),

    #[error("Invalid key: {0}")]
    SigningKey(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Transaction {0} reverted")]
    Reverted(String),

    #[error("Timed out after {0:?} waiting for {1}")]
    Timeout(std::time::Duration, &'static str),
}
