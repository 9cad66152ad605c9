//! Canonical request preparation.
//!
//! A prepared URL is what gets sent and what gets fingerprinted, so two calls
//! that only differ in parameter order share one cache entry.

use crate::http::error::FetchError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use std::collections::BTreeMap;

pub type QueryParams = BTreeMap<String, String>;
pub type Headers = BTreeMap<String, String>;

/// Builds a parameter map from string pairs.
///
/// ```
/// use meteostations::http::request::params;
///
/// let p = params([("to", "2022-03-23"), ("from", "2022-03-22")]);
/// assert_eq!(p.keys().next().map(String::as_str), Some("from"));
/// ```
pub fn params<K, V, I>(pairs: I) -> QueryParams
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Merges the URL's own query, then every layer in order (later layers win per
/// key) and writes the result back sorted by key.
pub fn prepare_url(url: &str, layers: &[&QueryParams]) -> Result<Url, FetchError> {
    let mut parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let mut merged: QueryParams = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    for layer in layers {
        merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    parsed.set_query(None);
    if !merged.is_empty() {
        parsed.query_pairs_mut().extend_pairs(merged.iter());
    }
    Ok(parsed)
}

/// Merges header layers (later layers win) into a `HeaderMap`.
pub fn header_map(layers: &[&Headers]) -> Result<HeaderMap, FetchError> {
    let mut map = HeaderMap::new();
    for layer in layers {
        for (name, value) in layer.iter() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FetchError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| FetchError::InvalidHeader(name.to_string()))?;
            map.insert(name, value);
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_order_does_not_change_the_url() {
        let a = params([("stations", "1,2"), ("from", "2022-03-22"), ("scale", "none")]);
        let b = params([("scale", "none"), ("stations", "1,2"), ("from", "2022-03-22")]);
        let url_a = prepare_url("https://agrometeo.ch/backend/api/meteo/data", &[&a]).unwrap();
        let url_b = prepare_url("https://agrometeo.ch/backend/api/meteo/data", &[&b]).unwrap();
        assert_eq!(url_a, url_b);
        assert_eq!(
            url_a.as_str(),
            "https://agrometeo.ch/backend/api/meteo/data?from=2022-03-22&scale=none&stations=1%2C2"
        );
    }

    #[test]
    fn later_layers_win_and_url_query_is_kept() {
        let defaults = params([("key", "default"), ("res", "hourly")]);
        let call = params([("key", "override")]);
        let url = prepare_url("http://example.org/sitelist?b=2&a=1", &[&defaults, &call]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://example.org/sitelist?a=1&b=2&key=override&res=hourly"
        );
    }

    #[test]
    fn no_params_leaves_no_query() {
        let url = prepare_url("https://api.meteo.cat/xema/v1/estacions/metadades", &[]).unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn rejects_relative_urls() {
        let result = prepare_url("/stations", &[]);
        assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
    }

    #[test]
    fn header_layers_merge() {
        let mut defaults = Headers::new();
        defaults.insert("X-API-KEY".into(), "abc".into());
        defaults.insert("Accept".into(), "application/json".into());
        let mut call = Headers::new();
        call.insert("x-api-key".into(), "xyz".into());

        let map = header_map(&[&defaults, &call]).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["x-api-key"], "xyz");
    }

    #[test]
    fn invalid_header_name_is_an_error() {
        let mut bad = Headers::new();
        bad.insert("bad header".into(), "v".into());
        assert!(matches!(
            header_map(&[&bad]),
            Err(FetchError::InvalidHeader(_))
        ));
    }
}
