/// Redis cache for generated GitHub search queries.
///
/// All operations degrade to no-ops when Redis is unavailable; callers then run the full chain.
///
/// Key schema:
/// - `repo-insight:v1:query:{sha256(question | languages | date)}`: generated query string
use sha2::{Digest, Sha256};
use tracing::debug;

use repo_insight_common::redis::RedisCache;

const KEY_PREFIX: &str = "repo-insight:v1:";

pub struct QueryCache {
    redis: RedisCache,
    ttl_secs: u64,
}

impl QueryCache {
    pub fn new(redis: RedisCache, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }

    pub async fn get_query(&self, question: &str, languages: &[String], date: &str) -> Option<String> {
        let key = query_key(question, languages, date);
        let query = self.redis.get(&key).await?;
        debug!(key, "query cache hit");
        Some(query)
    }

    pub async fn set_query(&self, question: &str, languages: &[String], date: &str, query: &str) {
        let key = query_key(question, languages, date);
        self.redis.set_with_ttl(&key, query, self.ttl_secs).await;
    }
}

/// The date is part of the key because generated queries may embed relative date ranges.
fn query_key(question: &str, languages: &[String], date: &str) -> String {
    let mut normalized: Vec<String> = languages.iter().map(|l| l.to_lowercase()).collect();
    normalized.sort();

    let mut hasher = Sha256::new();
    hasher.update(question.trim().as_bytes());
    hasher.update(b"|");
    hasher.update(normalized.join(",").as_bytes());
    hasher.update(b"|");
    hasher.update(date.as_bytes());
    format!("{KEY_PREFIX}query:{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_language_order_and_case() {
        let a = query_key("chat bot", &["Rust".to_string(), "Go".to_string()], "2025-01-01");
        let b = query_key("chat bot", &["go".to_string(), "rust".to_string()], "2025-01-01");
        assert_eq!(a, b);
        assert!(a.starts_with("repo-insight:v1:query:"));
    }

    #[test]
    fn key_changes_with_date_and_question() {
        let base = query_key("chat bot", &[], "2025-01-01");
        assert_ne!(base, query_key("chat bot", &[], "2025-01-02"));
        assert_ne!(base, query_key("web server", &[], "2025-01-01"));
    }

    #[tokio::test]
    async fn disabled_redis_is_a_cache_miss() {
        let cache = QueryCache::new(RedisCache::disabled(), 60);
        cache.set_query("chat bot", &[], "2025-01-01", "chat bot stars:>100").await;
        assert_eq!(cache.get_query("chat bot", &[], "2025-01-01").await, None);
    }
}
