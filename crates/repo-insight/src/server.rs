/// MCP server exposing the repository search over stdio.
///
/// Tools:
/// - `search_repositories`: natural-language GitHub repository search with summaries
/// - `search_languages`: supported language names matching a substring
use std::sync::Arc;

use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use tracing::info;

use crate::context::AppContext;
use crate::model::{LanguageSearchParams, LanguageSearchResponse, SearchRequest, SearchResponse};

#[derive(Clone)]
pub struct RepoInsightServer {
    context: Arc<AppContext>,
    tool_router: ToolRouter<RepoInsightServer>,
}

impl RepoInsightServer {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self {
            context,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl RepoInsightServer {
    #[tool(description = "Search GitHub repositories from a natural-language description (any language, at most 50 characters), optionally filtered by programming languages. Returns each repository with a three-bullet summary, language ratios, stars and URL.")]
    async fn search_repositories(
        &self,
        Parameters(request): Parameters<SearchRequest>,
    ) -> Result<Json<SearchResponse>, String> {
        request.validate().map_err(|e| e.to_string())?;
        info!(keyword = %request.keyword, "search_repositories tool invoked");

        let results = self
            .context
            .search
            .search(&request.keyword, &request.languages, self.context.search_options)
            .await
            .map_err(|e| {
                if e.is_client_error() {
                    e.to_string()
                } else {
                    format!("search failed: {e}")
                }
            })?;

        Ok(Json(SearchResponse { results }))
    }

    #[tool(description = "List GitHub Linguist language names containing the query (case-insensitive), sorted alphabetically. Use it to find valid values for the search_repositories languages filter.")]
    async fn search_languages(
        &self,
        Parameters(params): Parameters<LanguageSearchParams>,
    ) -> Result<Json<LanguageSearchResponse>, String> {
        let results = self
            .context
            .search
            .catalog()
            .find_by_query(&params.query)
            .await
            .map_err(|e| e.to_string())?;

        Ok(Json(LanguageSearchResponse { results }))
    }
}

#[tool_handler]
impl ServerHandler for RepoInsightServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: "repo-insight".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "GitHub repository search assistant. search_repositories turns a short \
                 natural-language request into a GitHub search query, runs it and summarizes \
                 each hit. search_languages looks up valid language filter values."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SummaryMode;
    use crate::rate_limit::RateLimiter;
    use crate::search::tests::{mount_backends, service, OPTIONS};
    use repo_insight_common::redis::RedisCache;
    use wiremock::MockServer;

    async fn server(mock: &MockServer) -> RepoInsightServer {
        let search = service(mock, SummaryMode::PerRepository).await;
        RepoInsightServer::new(Arc::new(AppContext::new(
            Arc::new(search),
            RateLimiter::new(Arc::new(RedisCache::disabled()), 60, 3600),
            OPTIONS,
        )))
    }

    #[tokio::test]
    async fn search_tool_rejects_long_keyword() {
        let mock = MockServer::start().await;
        let err = server(&mock)
            .await
            .search_repositories(Parameters(SearchRequest {
                keyword: "k".repeat(60),
                languages: vec![],
            }))
            .await
            .err().unwrap();
        assert_eq!(err, "keyword must not exceed 50 characters");
    }

    #[tokio::test]
    async fn language_tool_returns_sorted_matches() {
        let mock = MockServer::start().await;
        mount_backends(&mock).await;
        let Json(response) = server(&mock)
            .await
            .search_languages(Parameters(LanguageSearchParams {
                query: "t".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(response.results, vec!["python", "rust"]);
    }
}
