use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use repo_insight_common::openai::OpenAiClientConfig;

use crate::error::AppError;
use crate::model::{OrderBy, SortBy};

const REPOSITORY_SEARCH_DOCS_URL: &str =
    "https://docs.github.com/en/search-github/searching-on-github/searching-for-repositories";
const LINGUIST_LANGUAGES_URL: &str =
    "https://api.github.com/repos/github-linguist/linguist/contents/lib/linguist/languages.yml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    OpenAi,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryMode {
    /// One LLM call per repository, run concurrently.
    PerRepository,
    /// One LLM call for the whole result page.
    Batched,
}

/// Application configuration loaded from environment variables.
///
/// Everything has a default except credentials. `REDIS_URL` and `LANCEDB_PATH` are optional;
/// without them the server runs with no query cache / rate limiting and an in-memory
/// vector index.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    /// Serve MCP over stdio instead of HTTP.
    pub mcp_stdio: bool,
    pub redis_url: Option<String>,
    pub lancedb_path: Option<String>,
    pub cors_allowed_origins: Vec<String>,

    /// `OPENAI_*` settings for chat and embedding calls.
    pub openai: OpenAiClientConfig,
    pub embedding_provider: EmbeddingProvider,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub translate_model: String,
    pub query_model: String,
    pub summary_model: String,
    pub summary_language: String,
    pub summary_mode: SummaryMode,

    pub github_api_url: String,
    pub github_token: Option<String>,
    pub github_timeout: Duration,

    pub search_docs_url: String,
    pub docs_timeout: Duration,
    pub docs_max_retries: u32,
    pub docs_retry_backoff: Duration,
    pub vector_index_name: String,
    pub vector_namespace: String,
    pub retriever_top_k: usize,
    pub docs_refresh_interval: Duration,

    pub linguist_url: String,
    pub linguist_cache_path: PathBuf,
    pub linguist_cache_ttl: Duration,

    pub search_per_page: u32,
    pub search_sort: SortBy,
    pub search_order: OrderBy,
    pub language_ratio_decimals: usize,

    pub rate_limit_max_requests: i64,
    pub rate_limit_window_secs: u64,
    pub query_cache_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let embedding_provider = match env_or("EMBEDDING_PROVIDER", "openai").as_str() {
            "openai" => EmbeddingProvider::OpenAi,
            "local" => EmbeddingProvider::Local,
            other => {
                return Err(AppError::Config(format!(
                    "EMBEDDING_PROVIDER must be 'openai' or 'local', got '{other}'"
                )))
            }
        };

        let summary_mode = match env_or("SUMMARY_MODE", "per-repository").as_str() {
            "per-repository" => SummaryMode::PerRepository,
            "batched" => SummaryMode::Batched,
            other => {
                return Err(AppError::Config(format!(
                    "SUMMARY_MODE must be 'per-repository' or 'batched', got '{other}'"
                )))
            }
        };

        let per_page: u32 = env_parse("SEARCH_PER_PAGE", 5)?;
        if !(1..=100).contains(&per_page) {
            return Err(AppError::Config(
                "SEARCH_PER_PAGE must be between 1 and 100".to_string(),
            ));
        }

        let openai = OpenAiClientConfig {
            api_key: env_opt("OPENAI_API_KEY"),
            default_timeout: Duration::from_secs(env_parse("OPENAI_TIMEOUT_SECS", 30)?),
            max_retries: env_parse("OPENAI_MAX_RETRIES", 0)?,
            initial_backoff: Duration::from_millis(env_parse("OPENAI_RETRY_INITIAL_MS", 200)?),
            max_backoff: Duration::from_millis(env_parse("OPENAI_RETRY_MAX_MS", 5_000)?),
            max_error_body_bytes: env_parse("OPENAI_MAX_ERROR_BODY_BYTES", 8 * 1024)?,
            ..OpenAiClientConfig::for_base_url(&env_or(
                "OPENAI_BASE_URL",
                "https://api.openai.com/v1",
            ))
        };

        Ok(Self {
            listen_addr: env_or("HTTP_LISTEN_ADDR", "0.0.0.0:8000"),
            mcp_stdio: matches!(env_or("MCP_STDIO", "").as_str(), "1" | "true"),
            redis_url: env_opt("REDIS_URL"),
            lancedb_path: env_opt("LANCEDB_PATH"),
            cors_allowed_origins: env_or("CORS_ALLOWED_ORIGINS", "http://localhost:5173")
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),

            openai,
            embedding_provider,
            embedding_model: env_or("EMBEDDING_MODEL", "text-embedding-3-large"),
            embedding_dimensions: env_parse("EMBEDDING_DIMENSIONS", 3072)?,
            translate_model: env_or("TRANSLATE_MODEL", "gpt-4.1-mini"),
            query_model: env_or("QUERY_MODEL", "gpt-4.1"),
            summary_model: env_or("SUMMARY_MODEL", "gpt-4.1-nano"),
            summary_language: env_or("SUMMARY_LANGUAGE", "Korean"),
            summary_mode,

            github_api_url: env_or("GITHUB_API_URL", "https://api.github.com")
                .trim_end_matches('/')
                .to_string(),
            github_token: env_opt("GITHUB_TOKEN"),
            github_timeout: Duration::from_secs(env_parse("GITHUB_TIMEOUT_SECS", 20)?),

            search_docs_url: env_or("SEARCH_DOCS_URL", REPOSITORY_SEARCH_DOCS_URL),
            docs_timeout: Duration::from_secs(env_parse("DOCS_TIMEOUT_SECS", 30)?),
            docs_max_retries: env_parse("DOCS_MAX_RETRIES", 2)?,
            docs_retry_backoff: Duration::from_millis(env_parse("DOCS_RETRY_BACKOFF_MS", 800)?),
            vector_index_name: env_or("VECTOR_INDEX_NAME", "github-search-qualifiers"),
            vector_namespace: env_or("VECTOR_NAMESPACE", "repo-qualifiers"),
            retriever_top_k: env_parse("RETRIEVER_TOP_K", 5)?,
            docs_refresh_interval: env_interval_secs("DOCS_REFRESH_INTERVAL_SECS", 86_400)?,

            linguist_url: env_or("LINGUIST_URL", LINGUIST_LANGUAGES_URL),
            linguist_cache_path: PathBuf::from(env_or(
                "LINGUIST_CACHE_PATH",
                "data/linguist_languages.yml",
            )),
            linguist_cache_ttl: Duration::from_secs(env_parse("LINGUIST_CACHE_TTL_SECS", 86_400)?),

            search_per_page: per_page,
            search_sort: env_parse("SEARCH_SORT", SortBy::Stars)?,
            search_order: env_parse("SEARCH_ORDER", OrderBy::Desc)?,
            language_ratio_decimals: env_parse("LANGUAGE_RATIO_DECIMALS", 2)?,

            rate_limit_max_requests: env_parse("RATE_LIMIT_MAX_REQUESTS", 60)?,
            rate_limit_window_secs: env_parse("RATE_LIMIT_WINDOW_SECS", 3600)?,
            query_cache_ttl_secs: env_parse("QUERY_CACHE_TTL_SECS", 3600)?,
        })
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

/// Parse an optional variable, rejecting present-but-invalid values.
fn env_parse<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::Config(format!("{key} is invalid ({raw}): {e}"))),
        None => Ok(default),
    }
}

/// Like [`env_parse`] for a period in seconds, which must be positive.
fn env_interval_secs(key: &str, default: u64) -> Result<Duration, AppError> {
    match env_parse(key, default)? {
        0 => Err(AppError::Config(format!("{key} must be greater than 0"))),
        secs => Ok(Duration::from_secs(secs)),
    }
}
