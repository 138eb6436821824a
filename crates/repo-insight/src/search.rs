/// Repository search pipeline.
///
/// validate languages -> build query -> GitHub search -> language ratios (concurrent)
/// -> summaries (concurrent or batched) -> results in GitHub's order.
use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use tracing::info;

use crate::chain::SearchQueryChain;
use crate::config::SummaryMode;
use crate::error::AppError;
use crate::github::{language_ratios, GithubClient, SearchItem};
use crate::languages::LanguageCatalog;
use crate::model::{LanguageRatio, OrderBy, RepositorySummaryRecord, SearchResult, SortBy};
use crate::summary::{self, Bullets, SummaryGenerator};

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub sort: SortBy,
    pub order: OrderBy,
    pub per_page: u32,
}

/// One search hit with its language breakdown, carried through to the final result.
#[derive(Debug, Clone)]
pub struct RepositoryCandidate {
    pub item: SearchItem,
    pub languages: Vec<LanguageRatio>,
}

impl RepositoryCandidate {
    pub fn summary_record(&self) -> RepositorySummaryRecord {
        RepositorySummaryRecord {
            name: self.item.name.clone(),
            description: self.item.description.clone().unwrap_or_default(),
            languages: self.languages.clone(),
            topics: self.item.topics.clone(),
            pushed_at: self.item.pushed_at,
        }
    }

    pub fn into_result(self, function_summary: Bullets) -> SearchResult {
        SearchResult {
            name: self.item.name,
            function_summary,
            languages: self.languages,
            stargazers_count: self.item.stargazers_count,
            html_url: self.item.html_url,
        }
    }
}

pub struct RepositorySearchService {
    catalog: Arc<LanguageCatalog>,
    chain: Arc<SearchQueryChain>,
    github: Arc<GithubClient>,
    summaries: Arc<SummaryGenerator>,
    summary_mode: SummaryMode,
    ratio_decimals: usize,
}

impl RepositorySearchService {
    pub fn new(
        catalog: Arc<LanguageCatalog>,
        chain: Arc<SearchQueryChain>,
        github: Arc<GithubClient>,
        summaries: Arc<SummaryGenerator>,
        summary_mode: SummaryMode,
        ratio_decimals: usize,
    ) -> Self {
        Self {
            catalog,
            chain,
            github,
            summaries,
            summary_mode,
            ratio_decimals,
        }
    }

    pub fn catalog(&self) -> &LanguageCatalog {
        &self.catalog
    }

    pub async fn search(
        &self,
        question: &str,
        languages: &[String],
        options: SearchOptions,
    ) -> Result<Vec<SearchResult>, AppError> {
        self.catalog.validate(languages).await?;

        let started = Instant::now();
        let query = self.chain.invoke(question, languages).await?;
        info!(
            query = %query,
            elapsed_ms = started.elapsed().as_millis(),
            "search query generated"
        );

        let started = Instant::now();
        let items = self
            .github
            .search_repositories(&query, options.sort, options.order, options.per_page)
            .await?;
        info!(
            items = items.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "github search complete"
        );

        let started = Instant::now();
        let candidates = try_join_all(items.into_iter().map(|item| self.candidate(item))).await?;
        info!(
            elapsed_ms = started.elapsed().as_millis(),
            "repository languages loaded"
        );

        let started = Instant::now();
        let results = self.summarize(candidates).await?;
        info!(
            elapsed_ms = started.elapsed().as_millis(),
            mode = ?self.summary_mode,
            "repository summaries generated"
        );
        Ok(results)
    }

    async fn candidate(&self, item: SearchItem) -> Result<RepositoryCandidate, AppError> {
        let bytes = self.github.repository_languages(&item.languages_url).await?;
        Ok(RepositoryCandidate {
            languages: language_ratios(&bytes, self.ratio_decimals),
            item,
        })
    }

    /// Attach a summary to every candidate, keeping candidate order.
    async fn summarize(
        &self,
        candidates: Vec<RepositoryCandidate>,
    ) -> Result<Vec<SearchResult>, AppError> {
        match self.summary_mode {
            SummaryMode::PerRepository => {
                try_join_all(candidates.into_iter().map(|candidate| async move {
                    let bullets = self.summaries.summarize(&candidate.summary_record()).await?;
                    Ok::<_, AppError>(candidate.into_result(bullets))
                }))
                .await
            }
            SummaryMode::Batched => {
                let records: Vec<RepositorySummaryRecord> =
                    candidates.iter().map(RepositoryCandidate::summary_record).collect();
                let mut batch = self.summaries.summarize_batch(&records).await?.into_iter();
                Ok(candidates
                    .into_iter()
                    .map(|candidate| {
                        let bullets = batch.next().unwrap_or_else(summary::unavailable);
                        candidate.into_result(bullets)
                    })
                    .collect())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::QueryCache;
    use crate::chain::{QueryBuilder, QueryTranslator};
    use crate::github::build_http_client;
    use crate::store::testing::{qualifier_docs, KeywordEmbedder, StaticSource};
    use crate::store::{InMemoryQualifierStore, QualifierStore};
    use base64::Engine;
    use repo_insight_common::openai::{OpenAiClient, OpenAiClientConfig};
    use repo_insight_common::redis::RedisCache;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) const OPTIONS: SearchOptions = SearchOptions {
        sort: SortBy::Stars,
        order: OrderBy::Desc,
        per_page: 5,
    };

    fn completion(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    /// Mount GitHub, Linguist and LLM mocks for a two-repository search.
    pub(crate) async fn mount_backends(server: &MockServer) {
        let yaml = "Rust:\n  type: programming\nPython:\n  type: programming\n";
        Mock::given(method("GET"))
            .and(path("/linguist/languages.yml"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "encoding": "base64",
                "content": base64::engine::general_purpose::STANDARD.encode(yaml),
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {
                        "name": "zeta",
                        "description": "Terminal chat client",
                        "topics": ["chat", "tui"],
                        "html_url": "https://github.com/octo/zeta",
                        "stargazers_count": 900,
                        "languages_url": format!("{}/repos/octo/zeta/languages", server.uri()),
                        "pushed_at": "2025-02-01T10:00:00Z"
                    },
                    {
                        "name": "alpha",
                        "description": null,
                        "html_url": "https://github.com/octo/alpha",
                        "stargazers_count": 12,
                        "languages_url": format!("{}/repos/octo/alpha/languages", server.uri()),
                        "pushed_at": null
                    }
                ]
            })))
            .mount(server)
            .await;

        // The first repository answers slowly so completion order differs from input order.
        Mock::given(method("GET"))
            .and(path("/repos/octo/zeta/languages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"Rust": 750, "Shell": 250}))
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/alpha/languages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("professional translator"))
            .respond_with(completion("terminal chat client"))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("GitHub search expert"))
            .respond_with(completion("chat client language:rust"))
            .mount(server)
            .await;
        // Batched prompts mention every repository, so this one must win over the per-repo mocks.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("repository_summaries"))
            .respond_with(completion(
                r#"{"summaries": [["bz1", "bz2", "bz3"], ["ba1", "ba2", "ba3"]]}"#,
            ))
            .with_priority(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains(r#"\"name\":\"zeta\""#))
            .respond_with(completion(r#"{"summaries": ["z1", "z2", "z3", "z4"]}"#))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains(r#"\"name\":\"alpha\""#))
            .respond_with(completion(r#"{"summaries": ["a1"]}"#))
            .mount(server)
            .await;
    }

    pub(crate) async fn service(server: &MockServer, mode: SummaryMode) -> RepositorySearchService {
        let llm =
            Arc::new(OpenAiClient::new(OpenAiClientConfig::for_base_url(&server.uri())).unwrap());
        let store: Arc<dyn QualifierStore> = Arc::new(InMemoryQualifierStore::new(
            Arc::new(KeywordEmbedder),
            Arc::new(StaticSource::new(qualifier_docs())),
        ));
        store.initialize().await.unwrap();

        let chain = SearchQueryChain::new(
            QueryTranslator::new(Arc::clone(&llm), "gpt-4.1-mini"),
            store.get_retriever(5),
            QueryBuilder::new(Arc::clone(&llm), "gpt-4.1"),
            Arc::new(QueryCache::new(RedisCache::disabled(), 60)),
        );
        let http = build_http_client(None, Duration::from_secs(5)).unwrap();
        let cache_path = std::env::temp_dir()
            .join(format!("repo-insight-test-{}", uuid::Uuid::new_v4()))
            .join("linguist_languages.yml");
        let catalog = LanguageCatalog::new(
            http.clone(),
            &format!("{}/linguist/languages.yml", server.uri()),
            cache_path,
            Duration::from_secs(86_400),
        );

        RepositorySearchService::new(
            Arc::new(catalog),
            Arc::new(chain),
            Arc::new(GithubClient::new(http, &server.uri())),
            Arc::new(SummaryGenerator::new(llm, "gpt-4.1-nano", "Korean")),
            mode,
            2,
        )
    }

    #[tokio::test]
    async fn results_follow_github_order_with_three_bullets() {
        let server = MockServer::start().await;
        mount_backends(&server).await;
        let service = service(&server, SummaryMode::PerRepository).await;

        let results = service
            .search("터미널 채팅 클라이언트", &["rust".to_string()], OPTIONS)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "zeta");
        assert_eq!(results[0].function_summary, ["z1", "z2", "z3"].map(String::from));
        assert_eq!(results[0].languages[0].ratio, "75.00%");
        assert_eq!(results[0].stargazers_count, 900);

        assert_eq!(results[1].name, "alpha");
        assert!(results[1].languages.is_empty());
        assert_eq!(results[1].function_summary[0], "a1");
        assert_eq!(
            results[1].function_summary[2],
            crate::summary::SUMMARY_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn batched_summaries_keep_result_order() {
        let server = MockServer::start().await;
        mount_backends(&server).await;
        let service = service(&server, SummaryMode::Batched).await;

        let results = service.search("chat client", &[], OPTIONS).await.unwrap();

        assert_eq!(results[0].function_summary[0], "bz1");
        assert_eq!(results[1].function_summary, ["ba1", "ba2", "ba3"].map(String::from));
        let summary_calls = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| String::from_utf8_lossy(&r.body).contains("repository_summar"))
            .count();
        assert_eq!(summary_calls, 1);
    }

    #[tokio::test]
    async fn unsupported_language_stops_before_llm() {
        let server = MockServer::start().await;
        mount_backends(&server).await;
        let service = service(&server, SummaryMode::PerRepository).await;

        let err = service
            .search("chat", &["Rust".to_string(), "Klingon".to_string()], OPTIONS)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedLanguage(ref l) if l == &["Klingon"]));

        let requests = server.received_requests().await.unwrap();
        assert!(requests.iter().all(|r| r.url.path() != "/chat/completions"));
    }

    #[tokio::test]
    async fn language_fetch_failure_fails_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/alpha/languages"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mount_backends(&server).await;
        let service = service(&server, SummaryMode::PerRepository).await;

        let err = service.search("chat", &[], OPTIONS).await.unwrap_err();
        assert!(matches!(err, AppError::Github(_)));
    }
}
