use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid request URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid request header '{0}'")]
    InvalidHeader(String),

    #[error("Failed to build the HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Failed to determine cache directory")]
    CacheDirResolution(#[source] std::io::Error),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("{url} responded {status} {reason}: {body}")]
    UnhandledResponse {
        url: String,
        status: u16,
        reason: String,
        body: String,
    },

    #[error("Gave up on {url} after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u32 },

    #[error("Request to {0} was cancelled")]
    Cancelled(String),
}
