use crate::cache::store::{fingerprint, CacheStore};
use crate::http::error::FetchError;
use crate::http::request::{header_map, prepare_url, Headers, QueryParams};
use crate::settings::Settings;
use crate::utils::domain;
use bon::bon;
use log::{debug, error, info, warn};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A decoded JSON body and the status it was served with.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonResponse {
    pub payload: Value,
    pub status: u16,
    /// `true` when the payload was replayed from the on-disk cache.
    pub from_cache: bool,
}

impl JsonResponse {
    /// The URL in the `key` member of the payload, for APIs that answer with
    /// a link to the document instead of the document itself.
    pub fn link(&self, key: &str) -> Option<&str> {
        self.payload.get(key)?.as_str()
    }
}

/// A text body and the status it was served with.
#[derive(Debug, Clone, PartialEq)]
pub struct TextResponse {
    pub body: String,
    pub status: u16,
    /// `true` when the body was replayed from the on-disk cache.
    pub from_cache: bool,
}

/// GETs JSON documents with pacing, retry on server overload and a
/// write-through response cache.
///
/// # Examples
///
/// ```rust,no_run
/// # use meteostations::{HttpFetcher, Settings, MeteostationsError};
/// # async fn run() -> Result<(), MeteostationsError> {
/// let fetcher = HttpFetcher::builder().settings(Settings::default()).build()?;
/// let response = fetcher
///     .fetch_json()
///     .url("https://agrometeo.ch/backend/api/stations")
///     .call()
///     .await?;
/// assert!(response.payload.get("data").is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    cache: CacheStore,
    settings: Settings,
    params: QueryParams,
    headers: Headers,
}

#[bon]
impl HttpFetcher {
    /// `params` and `headers` are sent with every request, on top of the ones
    /// in `settings`.
    #[builder]
    pub fn new(
        #[builder(default)] settings: Settings,
        #[builder(default)] params: QueryParams,
        #[builder(default)] headers: Headers,
    ) -> Result<Self, FetchError> {
        let cache_dir = settings
            .cache_dir()
            .map_err(FetchError::CacheDirResolution)?;
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(FetchError::ClientBuild)?;

        let mut default_params = settings.request_params.clone();
        default_params.extend(params);
        let mut default_headers = settings.request_headers.clone();
        default_headers.extend(headers);

        Ok(Self {
            client,
            cache: CacheStore::new(cache_dir),
            settings,
            params: default_params,
            headers: default_headers,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Fetches `url` as JSON.
    ///
    /// Every unset argument falls back to the fetcher's [`Settings`]. A cached
    /// response is returned without pause or network access. Responses that are
    /// not JSON and carry status 429 or 504 are retried after `error_pause`
    /// until they succeed, `max_retries` is reached or `cancel` fires.
    #[builder]
    pub async fn fetch_json(
        &self,
        #[builder(into)] url: String,
        #[builder(default)] params: QueryParams,
        #[builder(default)] headers: Headers,
        pause: Option<Duration>,
        error_pause: Option<Duration>,
        timeout: Option<Duration>,
        use_cache: Option<bool>,
        max_retries: Option<u32>,
        cancel: Option<CancellationToken>,
    ) -> Result<JsonResponse, FetchError> {
        let call = Call {
            pause,
            error_pause,
            timeout,
            use_cache,
            max_retries,
            cancel,
        };
        self.fetch(&url, &params, &headers, call, |_, body| {
            serde_json::from_str::<Value>(body).ok()
        })
        .await
    }

    /// Fetches `url` as text, for the services that answer with CSV.
    ///
    /// Takes the same arguments as [`HttpFetcher::fetch_json`]. Only successful
    /// responses are returned; 429 and 504 are retried the same way.
    #[builder]
    pub async fn fetch_text(
        &self,
        #[builder(into)] url: String,
        #[builder(default)] params: QueryParams,
        #[builder(default)] headers: Headers,
        pause: Option<Duration>,
        error_pause: Option<Duration>,
        timeout: Option<Duration>,
        use_cache: Option<bool>,
        max_retries: Option<u32>,
        cancel: Option<CancellationToken>,
    ) -> Result<TextResponse, FetchError> {
        let call = Call {
            pause,
            error_pause,
            timeout,
            use_cache,
            max_retries,
            cancel,
        };
        let response = self
            .fetch(&url, &params, &headers, call, |status, body| {
                status
                    .is_success()
                    .then(|| Value::String(body.to_string()))
            })
            .await?;
        let body = match response.payload {
            Value::String(body) => body,
            other => other.to_string(),
        };
        Ok(TextResponse {
            body,
            status: response.status,
            from_cache: response.from_cache,
        })
    }
}

/// Per-call overrides of the fetcher's [`Settings`].
struct Call {
    pause: Option<Duration>,
    error_pause: Option<Duration>,
    timeout: Option<Duration>,
    use_cache: Option<bool>,
    max_retries: Option<u32>,
    cancel: Option<CancellationToken>,
}

impl HttpFetcher {
    /// The cache, pacing and retry loop shared by the fetch methods. `decode`
    /// turns an accepted body into the payload that is cached and returned.
    async fn fetch(
        &self,
        url: &str,
        params: &QueryParams,
        headers: &Headers,
        call: Call,
        decode: impl Fn(StatusCode, &str) -> Option<Value>,
    ) -> Result<JsonResponse, FetchError> {
        let url = prepare_url(url, &[&self.params, params])?;
        let fingerprint = fingerprint(url.as_str());
        let use_cache = call.use_cache.unwrap_or(self.settings.use_cache);

        if use_cache {
            match self.cache.get(&fingerprint).await {
                Ok(Some(entry)) => {
                    info!("Retrieved response from cache for {}", url);
                    return Ok(JsonResponse {
                        payload: entry.payload,
                        status: entry.status,
                        from_cache: true,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!("Ignoring unreadable cache entry for {}: {}", url, e),
            }
        }

        let headers = header_map(&[&self.headers, headers])?;
        let pause = call.pause.unwrap_or(self.settings.pause);
        let mut error_pause = call.error_pause.unwrap_or(self.settings.error_pause);
        let timeout = call.timeout.unwrap_or(self.settings.timeout);
        let max_retries = call.max_retries.or(self.settings.max_retries);
        let cancel = call.cancel.as_ref();
        let mut attempts = 0u32;

        loop {
            wait(pause, cancel, &url).await?;
            attempts += 1;

            info!("Get {} with timeout={:?}", url, timeout);
            let response = self
                .client
                .get(url.clone())
                .headers(headers.clone())
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| FetchError::NetworkRequest(url.to_string(), e))?;
            let status = response.status();
            // decoded with the charset of the Content-Type, UTF-8 when absent
            let body = response
                .text()
                .await
                .map_err(|e| FetchError::NetworkRequest(url.to_string(), e))?;
            info!("Downloaded {} bytes from {}", body.len(), domain(&url));

            match decode(status, &body) {
                Some(payload) => {
                    if use_cache {
                        if let Err(e) = self.cache.put(&fingerprint, &payload, status.as_u16()).await
                        {
                            warn!("Could not cache response for {}: {}", url, e);
                        }
                    }
                    return Ok(JsonResponse {
                        payload,
                        status: status.as_u16(),
                        from_cache: false,
                    });
                }
                None if matches!(status.as_u16(), 429 | 504) => {
                    if max_retries.is_some_and(|max| attempts > max) {
                        error!("{} still overloaded after {} attempts", domain(&url), attempts);
                        return Err(FetchError::RetriesExhausted {
                            url: url.to_string(),
                            attempts,
                        });
                    }
                    warn!(
                        "{} responded {}: retrying in {:?}",
                        domain(&url),
                        status,
                        error_pause
                    );
                    wait(error_pause, cancel, &url).await?;
                    error_pause = Duration::try_from_secs_f64(
                        error_pause.as_secs_f64() * self.settings.retry_backoff,
                    )
                    .unwrap_or(error_pause);
                }
                None => {
                    let reason = status.canonical_reason().unwrap_or_default().to_string();
                    error!("{} responded {} {}: {}", url, status.as_u16(), reason, body);
                    return Err(FetchError::UnhandledResponse {
                        url: url.to_string(),
                        status: status.as_u16(),
                        reason,
                        body,
                    });
                }
            }
        }
    }
}

async fn wait(
    duration: Duration,
    cancel: Option<&CancellationToken>,
    url: &Url,
) -> Result<(), FetchError> {
    if !duration.is_zero() {
        debug!("Pausing {:?} before requesting {}", duration, domain(url));
    }
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(FetchError::Cancelled(url.to_string())),
            _ = tokio::time::sleep(duration) => Ok(()),
        },
        None => {
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }
}
