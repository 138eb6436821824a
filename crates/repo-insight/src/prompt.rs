/// LLM prompt templates for the query chain and the summary generator.
use crate::model::{DocumentSection, RepositorySummaryRecord, SUMMARY_BULLETS};

pub fn translate_prompt(question: &str) -> String {
    format!(
        "You are a professional translator specializing in user queries written in natural \
language for discovering GitHub repositories.
Translate the following text into concise, clear, and natural English suitable for embedding \
or semantic similarity search.
If the input is already in English, return it unchanged.
Keep the original meaning and terminology, but adjust the phrasing to improve relevance.
Do NOT include or imply any words related to searching actions, such as \"search\", \"find\", \
\"look for\", \"discover\", \"seek\", \"retrieve\", or any of their synonyms.
Focus purely on expressing the user's intent or topic, not the act of searching.
Text to translate: {question}
Return only the English translation with no explanations or additional text."
    )
}

/// Context handed to the query builder: the metadata of each retrieved section.
pub fn render_context(docs: &[DocumentSection]) -> String {
    let metadata: Vec<_> = docs.iter().map(|d| &d.metadata).collect();
    serde_json::to_string(&metadata).unwrap_or_else(|_| "[]".to_string())
}

pub fn search_query_prompt(
    current_date: &str,
    question: &str,
    context: &str,
    languages: &[String],
) -> String {
    let mut prompt = format!(
        "Current Date: {current_date}
You are a GitHub search expert who converts natural language requests into valid GitHub \
Search API queries.

Your task:
- Read the user's natural language request (`question`).
- Refer to the provided `context`, which explains how GitHub search qualifiers (e.g., stars, \
language, good-first-issues, label, topic, repo, sort) are used.
"
    );
    if !languages.is_empty() {
        prompt.push_str(
            "- Use the user's selected `languages` list to include language filters where appropriate.
  For example:
    - language:javascript
    - language:\"regular expression\"
",
        );
    }
    prompt.push_str(&format!(
        "
### Rules
1) If a qualifier value contains one or more spaces, wrap the entire value in double quotes (\" \").
   - Examples: label:\"in progress\", topic:\"machine learning\"
2) GitHub search is case-insensitive; prefer lowercase for consistency.
3) Follow the syntax and examples described in the provided `context`.
4) Output only a single GitHub search query string (no explanations).
5) If intent is unclear, infer the most likely goal using the context.

### Inputs
- question: {question}
- context: {context}
"
    ));
    if !languages.is_empty() {
        prompt.push_str(&format!("- languages: {}\n", languages.join(", ")));
    }
    prompt.push_str(
        "
### Output
Return only the GitHub search query string.",
    );
    prompt
}

const SUMMARY_RULES: &str = "1. Explain what the repository does and what it is used for.
2. Describe important features based only on the description, languages, and topics.
3. Describe typical use cases or why it is useful. Do not mention stars, forks, or other \
popularity metrics.

Do not guess. Use only the information provided.";

pub fn summary_prompt(record: &RepositorySummaryRecord, language: &str) -> String {
    let repo = serde_json::to_string(record).unwrap_or_default();
    format!(
        "You are a GitHub repository summarizer.

You will receive a single GitHub repository metadata object.
Summarize this repository in {language} using exactly {SUMMARY_BULLETS} bullet points.

Follow these rules:
{SUMMARY_RULES}

Repository:
{repo}"
    )
}

pub fn batch_summary_prompt(records: &[RepositorySummaryRecord], language: &str) -> String {
    let repo_list = serde_json::to_string(records).unwrap_or_default();
    format!(
        "You are a GitHub repository summarizer.

Summarize each repository in {language}.
Return an array with one item per repository, in the order given, where each item has exactly \
{SUMMARY_BULLETS} bullet points.

Follow these rules:
{SUMMARY_RULES}

Repository list:
{repo_list}"
    )
}
