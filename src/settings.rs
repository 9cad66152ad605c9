//! Process-wide defaults for requests, caching and spatial joins.
//!
//! Every value can be overridden per client through [`Settings::builder`], and
//! the pacing values again per call on [`crate::HttpFetcher::fetch_json`].

use crate::http::request::{Headers, QueryParams};
use crate::stations::spatial_join::SpatialJoin;
use crate::utils::get_cache_dir;
use bon::Builder;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Pause before every request that is not answered by the cache.
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(1);
/// Pause before retrying a request the server rejected with 429 or 504.
pub const DEFAULT_ERROR_PAUSE: Duration = Duration::from_secs(60);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);
pub const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Configuration shared by the fetcher, the region resolver and the station locator.
///
/// # Examples
///
/// ```
/// use meteostations::Settings;
/// use std::time::Duration;
///
/// let settings = Settings::builder()
///     .pause(Duration::from_millis(250))
///     .max_retries(5)
///     .build();
/// assert!(settings.use_cache);
/// assert_eq!(settings.error_pause, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Builder)]
pub struct Settings {
    #[builder(default = DEFAULT_PAUSE)]
    pub pause: Duration,
    #[builder(default = DEFAULT_ERROR_PAUSE)]
    pub error_pause: Duration,
    #[builder(default = DEFAULT_TIMEOUT)]
    pub timeout: Duration,
    /// Whether responses are read from and written to the on-disk cache.
    #[builder(default = true)]
    pub use_cache: bool,
    /// Cache directory. `None` resolves to the system cache dir (see [`Settings::cache_dir`]).
    #[builder(into)]
    pub cache_dir: Option<PathBuf>,
    /// Upper bound on 429/504 retries for one request. `None` retries until success
    /// or cancellation.
    pub max_retries: Option<u32>,
    /// Factor applied to the error pause after every retry. `1.0` keeps a fixed interval.
    #[builder(default = 1.0)]
    pub retry_backoff: f64,
    #[builder(default)]
    pub spatial_join: SpatialJoin,
    /// Query parameters sent with every request, before provider and per-call ones.
    #[builder(default)]
    pub request_params: QueryParams,
    #[builder(default)]
    pub request_headers: Headers,
    #[builder(default = DEFAULT_USER_AGENT.to_string(), into)]
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::builder().build()
    }
}

impl Settings {
    /// The configured cache directory, or `<system cache dir>/meteostations`.
    pub fn cache_dir(&self) -> io::Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => get_cache_dir(),
        }
    }
}
