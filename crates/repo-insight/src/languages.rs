/// Supported-language catalog backed by GitHub Linguist's `languages.yml`.
///
/// Lookup order: in-process copy younger than the TTL, then the on-disk cache file if its
/// mtime is younger than the TTL, then the GitHub contents API. Language names are
/// lowercased; matching is case-insensitive.
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use base64::Engine;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::AppError;

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

struct Loaded {
    names: Arc<BTreeSet<String>>,
    at: Instant,
}

pub struct LanguageCatalog {
    http: reqwest::Client,
    url: String,
    cache_path: PathBuf,
    ttl: Duration,
    memo: RwLock<Option<Loaded>>,
}

impl LanguageCatalog {
    /// `http` should carry the GitHub API headers (see [`crate::github::build_http_client`]).
    pub fn new(http: reqwest::Client, url: &str, cache_path: PathBuf, ttl: Duration) -> Self {
        Self {
            http,
            url: url.to_string(),
            cache_path,
            ttl,
            memo: RwLock::new(None),
        }
    }

    /// Error naming every requested language that Linguist does not know.
    pub async fn validate(&self, languages: &[String]) -> Result<(), AppError> {
        if languages.is_empty() {
            return Ok(());
        }
        let supported = self.supported().await?;
        let unsupported: Vec<String> = languages
            .iter()
            .filter(|l| !supported.contains(&l.trim().to_lowercase()))
            .cloned()
            .collect();
        if unsupported.is_empty() {
            Ok(())
        } else {
            Err(AppError::UnsupportedLanguage(unsupported))
        }
    }

    /// Supported names containing `query`, case-insensitively, in alphabetical order.
    pub async fn find_by_query(&self, query: &str) -> Result<Vec<String>, AppError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(AppError::EmptyQuery);
        }
        let supported = self.supported().await?;
        Ok(supported
            .iter()
            .filter(|name| name.contains(&needle))
            .cloned()
            .collect())
    }

    pub async fn supported(&self) -> Result<Arc<BTreeSet<String>>, AppError> {
        if let Some(loaded) = self.memo.read().await.as_ref() {
            if loaded.at.elapsed() < self.ttl {
                return Ok(Arc::clone(&loaded.names));
            }
        }

        let mut memo = self.memo.write().await;
        if let Some(loaded) = memo.as_ref() {
            if loaded.at.elapsed() < self.ttl {
                return Ok(Arc::clone(&loaded.names));
            }
        }

        let cached = self.read_fresh_cache_file().await.map(|raw| parse_language_names(&raw));
        let names = match cached {
            Some(Ok(names)) => names,
            Some(Err(e)) => {
                warn!(error = %e, path = %self.cache_path.display(), "linguist cache unreadable, refetching");
                parse_language_names(&self.fetch_and_store().await?)?
            }
            None => parse_language_names(&self.fetch_and_store().await?)?,
        };
        let names = Arc::new(names);
        info!(languages = names.len(), "linguist language list loaded");

        *memo = Some(Loaded {
            names: Arc::clone(&names),
            at: Instant::now(),
        });
        Ok(names)
    }

    async fn read_fresh_cache_file(&self) -> Option<String> {
        let meta = tokio::fs::metadata(&self.cache_path).await.ok()?;
        let modified = meta.modified().ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age >= self.ttl {
            return None;
        }
        tokio::fs::read_to_string(&self.cache_path)
            .await
            .inspect_err(|e| warn!(error = %e, path = %self.cache_path.display(), "failed to read linguist cache"))
            .ok()
    }

    async fn fetch_and_store(&self) -> Result<String, AppError> {
        let response: ContentsResponse = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::LinguistFetch(format!("request failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::LinguistFetch(format!("invalid response body: {e}")))?;

        let raw = decode_contents(response)?;

        if let Some(parent) = self.cache_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(error = %e, "failed to create linguist cache directory");
            }
        }
        if let Err(e) = tokio::fs::write(&self.cache_path, &raw).await {
            warn!(error = %e, path = %self.cache_path.display(), "failed to write linguist cache");
        }
        Ok(raw)
    }
}

fn decode_contents(response: ContentsResponse) -> Result<String, AppError> {
    let (Some(content), Some("base64")) = (response.content, response.encoding.as_deref()) else {
        return Err(AppError::LinguistFetch(
            "unexpected contents API response: no base64 content".to_string(),
        ));
    };
    // The API wraps base64 content at 60 columns.
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| AppError::LinguistFetch(format!("invalid base64 content: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| AppError::LinguistFetch(format!("content is not utf-8: {e}")))
}

/// Lowercased top-level keys of a Linguist `languages.yml` document.
fn parse_language_names(raw: &str) -> Result<BTreeSet<String>, AppError> {
    let doc: serde_yaml::Value = serde_yaml::from_str(raw)
        .map_err(|e| AppError::LinguistFetch(format!("invalid yaml: {e}")))?;
    let serde_yaml::Value::Mapping(mapping) = doc else {
        return Err(AppError::LinguistFetch(
            "yaml root is not a mapping".to_string(),
        ));
    };
    Ok(mapping
        .keys()
        .filter_map(|k| k.as_str())
        .map(str::to_lowercase)
        .collect())
}
