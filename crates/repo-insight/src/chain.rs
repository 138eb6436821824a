/// Natural language to GitHub search query chain.
///
/// translate (LLM) -> retrieve qualifier docs (vector store) -> build query (LLM).
/// Generated queries are cached per question, language filter and date.
use std::sync::Arc;
use std::time::Instant;

use repo_insight_common::openai::{ChatCompletionRequest, OpenAiClient, OpenAiClientError};
use tracing::info;

use crate::cache::QueryCache;
use crate::error::AppError;
use crate::model::DocumentSection;
use crate::prompt;
use crate::store::Retriever;

pub struct QueryTranslator {
    client: Arc<OpenAiClient>,
    model: String,
}

impl QueryTranslator {
    pub fn new(client: Arc<OpenAiClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    /// English rendering of `question` without search-action verbs.
    pub async fn translate(&self, question: &str) -> Result<String, AppError> {
        let request =
            ChatCompletionRequest::single_turn(&self.model, prompt::translate_prompt(question));
        let text = self.client.complete_text(request).await?;
        Ok(text.trim().to_string())
    }
}

pub struct QueryBuilder {
    client: Arc<OpenAiClient>,
    model: String,
}

impl QueryBuilder {
    pub fn new(client: Arc<OpenAiClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    /// Ask the LLM for a GitHub search query. The output is only trimmed, not validated.
    pub async fn build_query(
        &self,
        question: &str,
        context: &[DocumentSection],
        languages: &[String],
        current_date: &str,
    ) -> Result<String, AppError> {
        let prompt = prompt::search_query_prompt(
            current_date,
            question,
            &prompt::render_context(context),
            languages,
        );
        let request = ChatCompletionRequest::single_turn(&self.model, prompt);
        let query = self.client.complete_text(request).await?.trim().to_string();
        if query.is_empty() {
            return Err(OpenAiClientError::EmptyCompletion.into());
        }
        Ok(query)
    }
}

pub struct SearchQueryChain {
    translator: QueryTranslator,
    retriever: Retriever,
    builder: QueryBuilder,
    cache: Arc<QueryCache>,
}

impl SearchQueryChain {
    pub fn new(
        translator: QueryTranslator,
        retriever: Retriever,
        builder: QueryBuilder,
        cache: Arc<QueryCache>,
    ) -> Self {
        Self {
            translator,
            retriever,
            builder,
            cache,
        }
    }

    pub async fn invoke(&self, question: &str, languages: &[String]) -> Result<String, AppError> {
        let current_date = chrono::Local::now().format("%Y-%m-%d").to_string();
        self.invoke_on(question, languages, &current_date).await
    }

    pub async fn invoke_on(
        &self,
        question: &str,
        languages: &[String],
        current_date: &str,
    ) -> Result<String, AppError> {
        if let Some(cached) = self.cache.get_query(question, languages, current_date).await {
            info!(query = %cached, "search query cache hit");
            return Ok(cached);
        }

        let started = Instant::now();
        let translated = self.translator.translate(question).await?;
        info!(
            translated = %translated,
            elapsed_ms = started.elapsed().as_millis(),
            "question translated"
        );

        let started = Instant::now();
        let context = self.retriever.retrieve(&translated).await?;
        info!(
            topics = ?context.iter().map(|d| d.metadata.topic.as_deref()).collect::<Vec<_>>(),
            elapsed_ms = started.elapsed().as_millis(),
            "qualifier docs retrieved"
        );

        let started = Instant::now();
        let query = self
            .builder
            .build_query(&translated, &context, languages, current_date)
            .await?;
        info!(
            query = %query,
            elapsed_ms = started.elapsed().as_millis(),
            "search query built"
        );

        self.cache
            .set_query(question, languages, current_date, &query)
            .await;
        Ok(query)
    }
}
