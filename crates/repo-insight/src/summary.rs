/// Repository summaries via structured LLM output.
///
/// The model is asked for JSON matching a schemars-generated schema. Whatever comes back is
/// coerced to exactly [`SUMMARY_BULLETS`] bullets: extra bullets are dropped, missing ones are
/// filled with [`SUMMARY_UNAVAILABLE`], and unparseable output becomes all-placeholder.
use std::sync::Arc;

use repo_insight_common::openai::{ChatCompletionRequest, OpenAiClient, ResponseFormat};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::warn;

use crate::error::AppError;
use crate::model::{RepositorySummaryRecord, SUMMARY_BULLETS};
use crate::prompt;

pub const SUMMARY_UNAVAILABLE: &str = "Summary unavailable.";

pub type Bullets = [String; SUMMARY_BULLETS];

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct SummaryList {
    /// Exactly three bullet points, in order: purpose, features, use cases.
    summaries: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct BatchSummaryList {
    /// One entry per repository, in input order; each entry has three bullet points.
    summaries: Vec<Vec<String>>,
}

fn response_format<T: JsonSchema>(name: &str) -> ResponseFormat {
    let mut schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
    }
    ResponseFormat::json_schema(name, schema)
}

/// Trim, drop blanks, then truncate or pad to exactly three bullets.
pub fn normalize_bullets(raw: Vec<String>) -> Bullets {
    let bullets: Vec<String> = raw
        .into_iter()
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .take(SUMMARY_BULLETS)
        .collect();
    std::array::from_fn(|i| {
        bullets
            .get(i)
            .cloned()
            .unwrap_or_else(|| SUMMARY_UNAVAILABLE.to_string())
    })
}

pub fn unavailable() -> Bullets {
    std::array::from_fn(|_| SUMMARY_UNAVAILABLE.to_string())
}

pub struct SummaryGenerator {
    client: Arc<OpenAiClient>,
    model: String,
    language: String,
}

impl SummaryGenerator {
    pub fn new(client: Arc<OpenAiClient>, model: &str, language: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
            language: language.to_string(),
        }
    }

    pub async fn summarize(&self, record: &RepositorySummaryRecord) -> Result<Bullets, AppError> {
        let request = ChatCompletionRequest::single_turn(
            &self.model,
            prompt::summary_prompt(record, &self.language),
        )
        .with_response_format(response_format::<SummaryList>("repository_summary"));

        let content = self.client.complete_text(request).await?;
        match serde_json::from_str::<SummaryList>(&content) {
            Ok(list) => {
                if list.summaries.len() != SUMMARY_BULLETS {
                    warn!(
                        repository = %record.name,
                        bullets = list.summaries.len(),
                        "summary bullet count adjusted"
                    );
                }
                Ok(normalize_bullets(list.summaries))
            }
            Err(e) => {
                warn!(repository = %record.name, error = %e, "unparseable summary output");
                Ok(unavailable())
            }
        }
    }

    /// One LLM call for all records. The output keeps input order and length.
    pub async fn summarize_batch(
        &self,
        records: &[RepositorySummaryRecord],
    ) -> Result<Vec<Bullets>, AppError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let request = ChatCompletionRequest::single_turn(
            &self.model,
            prompt::batch_summary_prompt(records, &self.language),
        )
        .with_response_format(response_format::<BatchSummaryList>("repository_summaries"));

        let content = self.client.complete_text(request).await?;
        let mut lists = match serde_json::from_str::<BatchSummaryList>(&content) {
            Ok(batch) => batch.summaries,
            Err(e) => {
                warn!(error = %e, "unparseable batch summary output");
                Vec::new()
            }
        };
        if lists.len() != records.len() {
            warn!(
                expected = records.len(),
                got = lists.len(),
                "batch summary count adjusted"
            );
        }
        lists.resize_with(records.len(), Vec::new);
        Ok(lists.into_iter().map(normalize_bullets).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repo_insight_common::openai::OpenAiClientConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(name: &str) -> RepositorySummaryRecord {
        RepositorySummaryRecord {
            name: name.to_string(),
            description: String::new(),
            languages: vec![],
            topics: vec![],
            pushed_at: None,
        }
    }

    fn completion(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    async fn generator(server: &MockServer, content: &str) -> SummaryGenerator {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4.1-nano",
                "response_format": {"type": "json_schema", "json_schema": {"strict": true}}
            })))
            .respond_with(completion(content))
            .mount(server)
            .await;
        let client =
            Arc::new(OpenAiClient::new(OpenAiClientConfig::for_base_url(&server.uri())).unwrap());
        SummaryGenerator::new(client, "gpt-4.1-nano", "Korean")
    }

    #[test]
    fn normalize_pads_and_truncates() {
        let padded = normalize_bullets(vec!["one".to_string(), "  ".to_string()]);
        assert_eq!(padded[0], "one");
        assert_eq!(padded[1], SUMMARY_UNAVAILABLE);
        assert_eq!(padded[2], SUMMARY_UNAVAILABLE);

        let truncated = normalize_bullets((1..=5).map(|i| i.to_string()).collect());
        assert_eq!(truncated, ["1", "2", "3"].map(String::from));

        assert_eq!(normalize_bullets(vec![]), unavailable());
    }

    #[test]
    fn schema_is_strict_object() {
        let format = response_format::<SummaryList>("repository_summary");
        let schema = &format.json_schema.schema;
        assert!(schema.get("$schema").is_none());
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["required"], serde_json::json!(["summaries"]));
    }

    #[tokio::test]
    async fn long_output_is_truncated() {
        let server = MockServer::start().await;
        let generator =
            generator(&server, r#"{"summaries": ["a", "b", "c", "d", "e"]}"#).await;
        let bullets = generator.summarize(&record("octo/bot")).await.unwrap();
        assert_eq!(bullets, ["a", "b", "c"].map(String::from));
    }

    #[tokio::test]
    async fn unparseable_output_falls_back() {
        let server = MockServer::start().await;
        let generator = generator(&server, "- a\n- b\n- c").await;
        let bullets = generator.summarize(&record("octo/bot")).await.unwrap();
        assert_eq!(bullets, unavailable());
    }

    #[tokio::test]
    async fn transport_errors_fail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let client =
            Arc::new(OpenAiClient::new(OpenAiClientConfig::for_base_url(&server.uri())).unwrap());
        let generator = SummaryGenerator::new(client, "gpt-4.1-nano", "Korean");

        let err = generator.summarize(&record("octo/bot")).await.unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
    }

    #[tokio::test]
    async fn batch_keeps_input_length() {
        let server = MockServer::start().await;
        let generator =
            generator(&server, r#"{"summaries": [["a1", "a2", "a3"]]}"#).await;
        let summaries = generator
            .summarize_batch(&[record("one"), record("two")])
            .await
            .unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0], ["a1", "a2", "a3"].map(String::from));
        assert_eq!(summaries[1], unavailable());
    }
}
