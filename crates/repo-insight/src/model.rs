use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub const MAX_KEYWORD_CHARS: usize = 50;

/// Number of bullets in every repository summary.
pub const SUMMARY_BULLETS: usize = 3;

/// Incoming repository search request.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchRequest {
    /// Free-text description of the repositories wanted (at most 50 characters).
    pub keyword: String,
    /// Linguist language names to filter by.
    #[serde(default)]
    pub languages: Vec<String>,
}

impl SearchRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.keyword.trim().is_empty() {
            return Err(AppError::EmptyKeyword);
        }
        if self.keyword.chars().count() > MAX_KEYWORD_CHARS {
            return Err(AppError::KeywordTooLong);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct LanguageSearchParams {
    /// Case-insensitive substring of a language name.
    pub query: String,
}

/// One `##` section of a documentation page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSection {
    /// Assigned when the section is stored in a vector index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub content: String,
    pub metadata: SectionMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionMetadata {
    /// `##` header text; absent for content preceding the first header.
    #[serde(rename = "Topic", default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LanguageRatio {
    pub name: String,
    /// Percentage of the repository's bytes, e.g. "72.41%".
    pub ratio: String,
}

/// Repository metadata handed to the summary generator.
#[derive(Debug, Clone, Serialize)]
pub struct RepositorySummaryRecord {
    pub name: String,
    pub description: String,
    pub languages: Vec<LanguageRatio>,
    pub topics: Vec<String>,
    pub pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct SearchResult {
    pub name: String,
    pub function_summary: [String; SUMMARY_BULLETS],
    pub languages: Vec<LanguageRatio>,
    pub stargazers_count: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct LanguageSearchResponse {
    pub results: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortBy {
    Stars,
    Forks,
    HelpWantedIssues,
    Updated,
    BestMatch,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Stars => "stars",
            SortBy::Forks => "forks",
            SortBy::HelpWantedIssues => "help-wanted-issues",
            SortBy::Updated => "updated",
            SortBy::BestMatch => "best-match",
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortBy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stars" => Ok(SortBy::Stars),
            "forks" => Ok(SortBy::Forks),
            "help-wanted-issues" => Ok(SortBy::HelpWantedIssues),
            "updated" => Ok(SortBy::Updated),
            "best-match" => Ok(SortBy::BestMatch),
            other => Err(AppError::Config(format!("unknown sort: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    Asc,
    Desc,
}

impl OrderBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderBy::Asc => "asc",
            OrderBy::Desc => "desc",
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderBy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(OrderBy::Asc),
            "desc" => Ok(OrderBy::Desc),
            other => Err(AppError::Config(format!("unknown order: {other}"))),
        }
    }
}
