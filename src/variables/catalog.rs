use crate::http::fetcher::HttpFetcher;
use crate::table::{json_normalize, records_at};
use crate::variables::error::VariableError;
use crate::variables::token::{VariableCode, VariableToken, ECVS};
use log::{debug, info, warn};
use polars::prelude::*;
use std::collections::HashMap;

/// Where a provider's variable catalog comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableCatalogSource {
    /// A JSON endpoint listing the variables as records at `pointer`.
    Endpoint {
        url: String,
        pointer: String,
        code_col: String,
        name_col: String,
        /// Member of the response holding the URL of the actual listing.
        /// Linked documents are never cached since their URLs expire.
        link: Option<String>,
    },
    /// `(code, display name)` pairs known in advance.
    Hardcoded(&'static [(&'static str, &'static str)]),
}

impl VariableCatalogSource {
    pub async fn load(
        &self,
        ecv: &[(&str, &str)],
        fetcher: &HttpFetcher,
    ) -> Result<VariableCatalog, VariableError> {
        let catalog = match self {
            VariableCatalogSource::Hardcoded(pairs) => VariableCatalog::from_pairs(pairs, ecv)?,
            VariableCatalogSource::Endpoint {
                url,
                pointer,
                code_col,
                name_col,
                link,
            } => {
                let mut response = fetcher
                    .fetch_json()
                    .url(url.as_str())
                    .use_cache(link.is_none())
                    .call()
                    .await?;
                check_status(url, response.status)?;
                if let Some(link) = link {
                    let linked = response
                        .link(link)
                        .ok_or_else(|| {
                            VariableError::Payload(format!("no '{link}' link in {url}"))
                        })?
                        .to_string();
                    debug!("Following variable catalog link to {}", linked);
                    response = fetcher
                        .fetch_json()
                        .url(linked.as_str())
                        .use_cache(false)
                        .call()
                        .await?;
                    check_status(&linked, response.status)?;
                }
                let records = records_at(&response.payload, pointer).ok_or_else(|| {
                    VariableError::Payload(format!("no variable records at '{pointer}'"))
                })?;
                VariableCatalog::new(json_normalize(records)?, code_col, name_col, ecv)?
            }
        };
        info!("Loaded catalog of {} variables", catalog.len());
        Ok(catalog)
    }
}

fn check_status(url: &str, status: u16) -> Result<(), VariableError> {
    if status == 200 {
        Ok(())
    } else {
        Err(VariableError::Payload(format!(
            "{url} responded with status {status}"
        )))
    }
}

/// A variable resolved from a caller token, labelled with the token's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVariable {
    pub label: String,
    pub code: VariableCode,
}

/// A provider's native variables and the ECV mapping onto them.
#[derive(Debug, Clone)]
pub struct VariableCatalog {
    frame: DataFrame,
    codes: Vec<Option<VariableCode>>,
    names: Vec<Option<String>>,
    ecv: HashMap<String, String>,
}

impl VariableCatalog {
    /// Wraps `frame`, whose `code_col` holds native codes and `name_col`
    /// display names. `ecv` maps ECVs to display names or codes.
    pub fn new(
        frame: DataFrame,
        code_col: &str,
        name_col: &str,
        ecv: &[(&str, &str)],
    ) -> Result<Self, VariableError> {
        let codes = read_codes(column(&frame, code_col)?)?;
        let names = read_names(column(&frame, name_col)?)?;

        let mut ecv_map = HashMap::new();
        for (key, target) in ecv {
            if ECVS.contains(key) {
                ecv_map.insert(key.to_string(), target.to_string());
            } else {
                warn!("Ignoring mapping of '{}', which is not an ECV", key);
            }
        }

        Ok(Self {
            frame,
            codes,
            names,
            ecv: ecv_map,
        })
    }

    /// Catalog of string codes with a `code` and a `name` column.
    pub fn from_pairs(pairs: &[(&str, &str)], ecv: &[(&str, &str)]) -> Result<Self, VariableError> {
        let codes: Vec<&str> = pairs.iter().map(|(code, _)| *code).collect();
        let names: Vec<&str> = pairs.iter().map(|(_, name)| *name).collect();
        let frame = DataFrame::new(vec![
            Column::new("code".into(), codes),
            Column::new("name".into(), names),
        ])?;
        Self::new(frame, "code", "name", ecv)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Display name of a native code.
    pub fn display_name(&self, code: &VariableCode) -> Option<&str> {
        let row = self.codes.iter().position(|c| c.as_ref() == Some(code))?;
        self.names[row].as_deref()
    }

    /// The native code for `token`.
    ///
    /// Integers and digit strings must be codes of the catalog and come back in
    /// the shape they were given. Other strings are accepted as codes, then
    /// translated through the ECV mapping, then looked up as display names.
    ///
    /// ```
    /// use meteostations::variables::catalog::VariableCatalog;
    /// use meteostations::variables::token::VariableCode;
    ///
    /// let catalog = VariableCatalog::from_pairs(
    ///     &[("tmpf", "Air Temperature"), ("sknt", "Wind Speed")],
    ///     &[("temperature", "tmpf")],
    /// )
    /// .unwrap();
    /// assert_eq!(catalog.resolve("temperature").unwrap(), VariableCode::from("tmpf"));
    /// assert_eq!(catalog.resolve("Wind Speed").unwrap(), VariableCode::from("sknt"));
    /// ```
    pub fn resolve(&self, token: impl Into<VariableToken>) -> Result<VariableCode, VariableError> {
        let token = token.into();
        let name = match &token {
            VariableToken::Code(code) => {
                return if self.has_numeric_code(*code) {
                    Ok(VariableCode::Int(*code))
                } else {
                    Err(VariableError::UnknownVariable(token.to_string()))
                };
            }
            VariableToken::Name(name) => name.as_str(),
        };

        if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
            return match name.parse::<i64>() {
                Ok(code) if self.has_numeric_code(code) => Ok(VariableCode::Str(name.to_string())),
                _ => Err(VariableError::UnknownVariable(name.to_string())),
            };
        }
        if let Some(code) = self.code_matching(name) {
            return Ok(code.clone());
        }

        let target = self.ecv.get(name).map(String::as_str).unwrap_or(name);
        if target != name {
            debug!("Variable '{}' maps to '{}'", name, target);
            if let Some(code) = self.code_matching(target) {
                return Ok(code.clone());
            }
        }

        let mut matches = self
            .names
            .iter()
            .zip(self.codes.iter())
            .filter(|(n, _)| n.as_deref() == Some(target))
            .filter_map(|(_, code)| code.as_ref());
        match (matches.next(), matches.count()) {
            (Some(code), 0) => Ok(code.clone()),
            (Some(_), others) => Err(VariableError::AmbiguousVariable {
                token: name.to_string(),
                matches: others + 1,
            }),
            (None, _) => Err(VariableError::UnknownVariable(name.to_string())),
        }
    }

    /// Resolves every token in order, keeping each token's text as its label.
    pub fn resolve_all<I, T>(&self, tokens: I) -> Result<Vec<ResolvedVariable>, VariableError>
    where
        I: IntoIterator<Item = T>,
        T: Into<VariableToken>,
    {
        tokens
            .into_iter()
            .map(|token| {
                let token = token.into();
                let code = self.resolve(token.clone())?;
                Ok(ResolvedVariable {
                    label: token.to_string(),
                    code,
                })
            })
            .collect()
    }

    fn has_numeric_code(&self, code: i64) -> bool {
        self.codes
            .iter()
            .flatten()
            .any(|c| c.as_i64() == Some(code))
    }

    fn code_matching(&self, text: &str) -> Option<&VariableCode> {
        self.codes
            .iter()
            .flatten()
            .find(|c| matches!(c, VariableCode::Str(s) if s == text))
    }
}

fn column<'a>(frame: &'a DataFrame, name: &str) -> Result<&'a Column, VariableError> {
    frame
        .column(name)
        .map_err(|_| VariableError::MissingColumn(name.to_string()))
}

fn read_codes(column: &Column) -> Result<Vec<Option<VariableCode>>, VariableError> {
    if column.dtype().is_integer() {
        let codes = column.cast(&DataType::Int64)?;
        return Ok(codes
            .i64()?
            .into_iter()
            .map(|code| code.map(VariableCode::Int))
            .collect());
    }
    Ok(read_names(column)?
        .into_iter()
        .map(|code| code.map(VariableCode::Str))
        .collect())
}

/// Trimmed text of every row; some APIs pad their display names.
fn read_names(column: &Column) -> Result<Vec<Option<String>>, VariableError> {
    let names = column.cast(&DataType::String)?;
    Ok(names
        .str()?
        .into_iter()
        .map(|name| name.map(|n| n.trim().to_string()))
        .collect())
}
