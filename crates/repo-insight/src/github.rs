/// GitHub REST API client: repository search and per-repository language bytes.
use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use crate::error::AppError;
use crate::model::{LanguageRatio, OrderBy, SortBy};

const GITHUB_API_VERSION: &str = "2022-11-28";

/// HTTP client carrying the GitHub REST headers (and the token, when configured).
pub fn build_http_client(token: Option<&str>, timeout: Duration) -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    headers.insert(
        "x-github-api-version",
        HeaderValue::from_static(GITHUB_API_VERSION),
    );
    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| AppError::Config("GITHUB_TOKEN contains invalid characters".to_string()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    reqwest::Client::builder()
        .user_agent("repo-insight/0.1")
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(AppError::Github)
}

/// The subset of a search result item the pipeline uses.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
    pub html_url: String,
    pub stargazers_count: u64,
    pub languages_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponseBody {
    #[serde(default)]
    items: Vec<SearchItem>,
}

pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
}

impl GithubClient {
    pub fn new(http: reqwest::Client, api_url: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// `GET /search/repositories`. Items come back in GitHub's order.
    pub async fn search_repositories(
        &self,
        query: &str,
        sort: SortBy,
        order: OrderBy,
        per_page: u32,
    ) -> Result<Vec<SearchItem>, AppError> {
        let mut params: Vec<(&str, String)> = vec![("q", query.to_string())];
        if sort != SortBy::BestMatch {
            params.push(("sort", sort.as_str().to_string()));
        }
        params.push(("order", order.as_str().to_string()));
        params.push(("per_page", per_page.to_string()));

        let body: SearchResponseBody = self
            .http
            .get(format!("{}/search/repositories", self.api_url))
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.items)
    }

    /// Language name to byte count, from an item's `languages_url`.
    pub async fn repository_languages(
        &self,
        languages_url: &str,
    ) -> Result<HashMap<String, u64>, AppError> {
        let bytes = self
            .http
            .get(languages_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(bytes)
    }
}

/// Percentages of total bytes, largest first, formatted with `decimals` places.
pub fn language_ratios(bytes: &HashMap<String, u64>, decimals: usize) -> Vec<LanguageRatio> {
    let total: u64 = bytes.values().sum();
    if total == 0 {
        return Vec::new();
    }

    let mut entries: Vec<(&String, &u64)> = bytes.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    entries
        .into_iter()
        .map(|(name, count)| {
            let percent = *count as f64 / total as f64 * 100.0;
            LanguageRatio {
                name: name.clone(),
                ratio: format!("{percent:.decimals$}%"),
            }
        })
        .collect()
}
