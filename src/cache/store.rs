//! On-disk replay log of successful JSON responses, one file per request fingerprint.

use crate::cache::error::CacheError;
use crate::utils::ensure_cache_dir_exists;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::io;
use std::path::PathBuf;

/// A stored response: the payload as received and the status it came with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub status: u16,
    pub payload: Value,
}

#[derive(Serialize)]
struct CacheEntryRef<'a> {
    fingerprint: &'a str,
    status: u16,
    payload: &'a Value,
}

/// Hex SHA-1 of a fully prepared request URL.
///
/// Callers must canonicalize the URL first (see [`crate::http::request::prepare_url`]),
/// otherwise equivalent requests end up under different keys.
///
/// ```
/// use meteostations::fingerprint;
///
/// assert_eq!(fingerprint("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
/// ```
pub fn fingerprint(url: &str) -> String {
    format!("{:x}", Sha1::digest(url.as_bytes()))
}

/// Write-once store keyed by fingerprint. Entries are never invalidated or evicted.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn entry_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{fingerprint}.json"))
    }

    pub async fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(fingerprint);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::CacheRead(path, e)),
        };
        let entry = serde_json::from_slice::<CacheEntry>(&bytes)
            .map_err(|e| CacheError::CacheDecode(path.clone(), e))?;
        debug!("Retrieved response from cache file {}", path.display());
        Ok(Some(entry))
    }

    /// Persists `payload` unless the response was not a 200 or carried no payload.
    ///
    /// Returns whether an entry was written.
    pub async fn put(
        &self,
        fingerprint: &str,
        payload: &Value,
        status: u16,
    ) -> Result<bool, CacheError> {
        if status != 200 {
            debug!("Did not save to cache because status code is {}", status);
            return Ok(false);
        }
        if payload.is_null() {
            debug!("Did not save to cache because the payload is null");
            return Ok(false);
        }

        ensure_cache_dir_exists(&self.dir)
            .await
            .map_err(|e| CacheError::CacheDirCreation(self.dir.clone(), e))?;

        let bytes = serde_json::to_vec(&CacheEntryRef {
            fingerprint,
            status,
            payload,
        })
        .map_err(|e| CacheError::CacheEncode(fingerprint.to_string(), e))?;

        // Readers must never observe a half-written record.
        let path = self.entry_path(fingerprint);
        let tmp_path = self
            .dir
            .join(format!("{}.{}.tmp", fingerprint, std::process::id()));
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| CacheError::CacheWrite(tmp_path.clone(), e))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| CacheError::CacheWrite(path.clone(), e))?;

        info!("Saved response to cache file {}", path.display());
        Ok(true)
    }
}
