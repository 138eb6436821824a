/// GitHub Docs Markdown fetcher.
///
/// A docs page such as `https://docs.github.com/en/search-github/...` is served as raw
/// Markdown by `https://docs.github.com/api/article/body?pathname=/en/search-github/...`.
/// Requests are retried with exponential backoff (`backoff * 2^attempt`).
use std::time::Duration;

use reqwest::header::ACCEPT;
use tracing::warn;
use url::Url;

use crate::error::AppError;
use crate::model::DocumentSection;
use crate::splitter;

const MARKDOWN_API_PATH: &str = "/api/article/body";

#[derive(Clone)]
pub struct DocsFetcher {
    http: reqwest::Client,
    max_retries: u32,
    backoff: Duration,
}

impl DocsFetcher {
    pub fn new(timeout: Duration, max_retries: u32, backoff: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent("repo-insight/0.1")
            .timeout(timeout)
            .build()
            .map_err(AppError::DocsFetch)?;
        Ok(Self {
            http,
            max_retries,
            backoff,
        })
    }

    /// Fetch a docs page as Markdown.
    ///
    /// Any failure (transport error or non-2xx status) is retried up to `max_retries`
    /// times; the last error is returned once retries are exhausted.
    pub async fn fetch(&self, doc_url: &str) -> Result<String, AppError> {
        let md_url = markdown_api_url(doc_url)?;

        let mut attempt: u32 = 0;
        loop {
            match self.fetch_once(md_url.as_str()).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(AppError::DocsFetch(e));
                    }
                    let delay = self.backoff.saturating_mul(2u32.saturating_pow(attempt));
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "docs fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn fetch_once(&self, md_url: &str) -> Result<String, reqwest::Error> {
        self.http
            .get(md_url)
            .header(ACCEPT, "text/markdown")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

/// Map a docs page URL onto the Markdown article API on the same origin.
pub fn markdown_api_url(doc_url: &str) -> Result<Url, AppError> {
    let page = Url::parse(doc_url).map_err(|e| AppError::DocsUrl(format!("{doc_url}: {e}")))?;
    let mut api = page.clone();
    api.set_path(MARKDOWN_API_PATH);
    api.set_fragment(None);
    api.query_pairs_mut()
        .clear()
        .append_pair("pathname", page.path());
    Ok(api)
}

/// Source of the search-qualifier documentation: one docs page, fetched and split.
#[derive(Clone)]
pub struct DocsSource {
    fetcher: DocsFetcher,
    doc_url: String,
}

impl DocsSource {
    pub fn new(fetcher: DocsFetcher, doc_url: &str) -> Self {
        Self {
            fetcher,
            doc_url: doc_url.to_string(),
        }
    }

    pub async fn load(&self) -> Result<Vec<DocumentSection>, AppError> {
        let markdown = self.fetcher.fetch(&self.doc_url).await?;
        Ok(splitter::split_markdown(&markdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE_PATH: &str = "/en/search-github/searching-on-github/searching-for-repositories";

    fn fetcher(max_retries: u32) -> DocsFetcher {
        DocsFetcher::new(Duration::from_secs(5), max_retries, Duration::from_millis(1)).unwrap()
    }

    #[test]
    fn markdown_url_carries_page_path() {
        let url = markdown_api_url(&format!("https://docs.github.com{PAGE_PATH}#search-by-size"))
            .unwrap();
        assert_eq!(url.path(), "/api/article/body");
        let pathname: Vec<_> = url
            .query_pairs()
            .filter(|(k, _)| k == "pathname")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(pathname, vec![PAGE_PATH.to_string()]);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(matches!(markdown_api_url("not a url"), Err(AppError::DocsUrl(_))));
    }

    #[tokio::test]
    async fn succeeds_after_two_failures_within_retry_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/article/body"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/article/body"))
            .and(query_param("pathname", PAGE_PATH))
            .and(header("accept", "text/markdown"))
            .respond_with(ResponseTemplate::new(200).set_body_string("## Topic\nbody"))
            .expect(1)
            .mount(&server)
            .await;

        let body = fetcher(2)
            .fetch(&format!("{}{PAGE_PATH}", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "## Topic\nbody");
    }

    #[tokio::test]
    async fn exhausting_retries_returns_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/article/body"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetcher(2)
            .fetch(&format!("{}{PAGE_PATH}", server.uri()))
            .await
            .unwrap_err();
        match err {
            AppError::DocsFetch(e) => {
                assert_eq!(e.status(), Some(reqwest::StatusCode::SERVICE_UNAVAILABLE))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn docs_source_splits_fetched_markdown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/article/body"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "# Searching for repositories\n\nIntro.\n\n## Search by name\n\n`in:name`\n\n## Search by size\n\n`size:>=30000`\n",
            ))
            .mount(&server)
            .await;

        let source = DocsSource::new(fetcher(0), &format!("{}{PAGE_PATH}", server.uri()));
        let sections = source.load().await.unwrap();
        let topics: Vec<_> = sections
            .iter()
            .map(|s| s.metadata.topic.clone())
            .collect();
        assert_eq!(
            topics,
            vec![
                None,
                Some("Search by name".to_string()),
                Some("Search by size".to_string())
            ]
        );
    }
}
