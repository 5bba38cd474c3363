//! Retrieval facade: embed the query, rank indexed chunks, hand back the
//! top snippets.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::embedding::embed_query;
use crate::index;
use crate::models::RetrievedSnippet;
use crate::prompt;
use crate::provider;

pub async fn retrieve(
    config: &Config,
    pool: &SqlitePool,
    query: &str,
) -> Result<Vec<RetrievedSnippet>> {
    if index::chunk_count(pool).await? == 0 {
        return Ok(Vec::new());
    }
    let query_vec = embed_query(&config.provider, query).await?;
    index::query_similar(pool, &query_vec, config.retrieval.top_k).await
}

/// One full chat turn. File context, when present, replaces retrieval
/// entirely; otherwise the index is consulted for supporting snippets.
pub async fn answer(
    config: &Config,
    pool: &SqlitePool,
    question: &str,
    file_context: &str,
) -> Result<String> {
    let snippets = if file_context.trim().is_empty() {
        retrieve(config, pool, question).await?
    } else {
        Vec::new()
    };

    let messages = prompt::build_messages(
        &config.prompt.language,
        question,
        &snippets,
        file_context,
    );

    provider::chat(&config.provider, &messages, 1024, 0.2).await
}
