/// Application wiring: every long-lived component is built once here and shared by the HTTP
/// and MCP front ends.
use std::sync::Arc;

use repo_insight_common::embedding::{FastEmbedder, OpenAiEmbedder, TextEmbedder};
use repo_insight_common::openai::OpenAiClient;
use repo_insight_common::redis::RedisCache;
use repo_insight_common::vectordb::VectorDb;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::QueryCache;
use crate::chain::{QueryBuilder, QueryTranslator, SearchQueryChain};
use crate::config::{Config, EmbeddingProvider};
use crate::error::AppError;
use crate::fetcher::{DocsFetcher, DocsSource};
use crate::github::{build_http_client, GithubClient};
use crate::lance_store::LanceQualifierStore;
use crate::languages::LanguageCatalog;
use crate::rate_limit::RateLimiter;
use crate::refresh::spawn_refresh_scheduler;
use crate::search::{RepositorySearchService, SearchOptions};
use crate::store::{InMemoryQualifierStore, QualifierStore, SectionSource};
use crate::summary::SummaryGenerator;

pub struct AppContext {
    pub search: Arc<RepositorySearchService>,
    pub rate_limiter: RateLimiter,
    pub search_options: SearchOptions,
    refresh_task: Option<JoinHandle<()>>,
}

impl AppContext {
    pub fn new(
        search: Arc<RepositorySearchService>,
        rate_limiter: RateLimiter,
        search_options: SearchOptions,
    ) -> Self {
        Self {
            search,
            rate_limiter,
            search_options,
            refresh_task: None,
        }
    }

    /// Connect to every dependency, build the qualifier index and start the refresh task.
    pub async fn initialize(config: &Config) -> Result<Self, AppError> {
        // 1. Redis (optional)
        let redis = RedisCache::new(config.redis_url.as_deref());
        if redis.is_available().await {
            info!("redis connected");
        } else {
            info!("redis unavailable, running without query cache or rate limiting");
        }

        // 2. LLM client and embedder
        let llm = Arc::new(OpenAiClient::new(config.openai.clone())?);
        let embedder: Arc<dyn TextEmbedder> = match config.embedding_provider {
            EmbeddingProvider::OpenAi => Arc::new(OpenAiEmbedder::new(
                Arc::clone(&llm),
                &config.embedding_model,
                config.embedding_dimensions,
            )),
            EmbeddingProvider::Local => {
                info!("initializing local embedding model (may download on first run)");
                Arc::new(FastEmbedder::new().await?)
            }
        };
        info!(dimensions = embedder.dimensions(), "embedder ready");

        // 3. Qualifier documentation index
        let fetcher = DocsFetcher::new(
            config.docs_timeout,
            config.docs_max_retries,
            config.docs_retry_backoff,
        )?;
        let source: Arc<dyn SectionSource> =
            Arc::new(DocsSource::new(fetcher, &config.search_docs_url));
        let store: Arc<dyn QualifierStore> = match &config.lancedb_path {
            Some(path) => {
                let db = Arc::new(VectorDb::connect(path).await?);
                info!(path = %path, "lancedb connected");
                Arc::new(LanceQualifierStore::new(
                    db,
                    Arc::clone(&embedder),
                    source,
                    &config.vector_index_name,
                    &config.vector_namespace,
                ))
            }
            None => {
                info!("LANCEDB_PATH not set, using in-memory qualifier index");
                Arc::new(InMemoryQualifierStore::new(Arc::clone(&embedder), source))
            }
        };
        store.initialize().await?;

        // 4. Query chain
        let chain = SearchQueryChain::new(
            QueryTranslator::new(Arc::clone(&llm), &config.translate_model),
            Arc::clone(&store).get_retriever(config.retriever_top_k),
            QueryBuilder::new(Arc::clone(&llm), &config.query_model),
            Arc::new(QueryCache::new(redis.clone(), config.query_cache_ttl_secs)),
        );

        // 5. GitHub and Linguist
        let github_http = build_http_client(config.github_token.as_deref(), config.github_timeout)?;
        let catalog = LanguageCatalog::new(
            github_http.clone(),
            &config.linguist_url,
            config.linguist_cache_path.clone(),
            config.linguist_cache_ttl,
        );
        let github = GithubClient::new(github_http, &config.github_api_url);

        // 6. Search service
        let search = RepositorySearchService::new(
            Arc::new(catalog),
            Arc::new(chain),
            Arc::new(github),
            Arc::new(SummaryGenerator::new(
                llm,
                &config.summary_model,
                &config.summary_language,
            )),
            config.summary_mode,
            config.language_ratio_decimals,
        );

        let mut context = Self::new(
            Arc::new(search),
            RateLimiter::new(
                Arc::new(redis),
                config.rate_limit_max_requests,
                config.rate_limit_window_secs,
            ),
            SearchOptions {
                sort: config.search_sort,
                order: config.search_order,
                per_page: config.search_per_page,
            },
        );
        context.refresh_task = Some(spawn_refresh_scheduler(
            store,
            config.docs_refresh_interval,
        ));
        info!(
            interval_secs = config.docs_refresh_interval.as_secs(),
            "documentation refresh scheduled"
        );
        Ok(context)
    }

    /// Stop background work. Safe to call more than once.
    pub fn shutdown(&self) {
        if let Some(task) = &self.refresh_task {
            task.abort();
            info!("documentation refresh stopped");
        }
    }
}
