//! Persistent vector index over SQLite.
//!
//! Narrow interface consumed by the retrieval facade: [`add_chunks`] stores
//! chunk text and embedding vectors, [`query_similar`] ranks every stored
//! vector by cosine similarity against a query vector, [`remove_source`]
//! purges a document's chunks when its registry entry is deleted.
//!
//! Ranking is computed in Rust over all stored vectors; corpus sizes here are
//! bounded by the upload limit, so a scan beats maintaining an ANN structure.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, RetrievedSnippet};

/// Store chunks and their embedding vectors. Existing rows for the same
/// `(source, chunk_index)` are replaced, so re-ingesting a document is
/// idempotent.
pub async fn add_chunks(
    pool: &SqlitePool,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
) -> Result<usize> {
    debug_assert_eq!(chunks.len(), vectors.len());

    let mut tx = pool.begin().await?;
    let mut added = 0usize;

    for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
        let chunk_id = chunk.chunk_id();

        sqlx::query(
            r#"
            INSERT INTO chunks (id, source, chunk_index, text)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source = excluded.source,
                chunk_index = excluded.chunk_index,
                text = excluded.text
            "#,
        )
        .bind(&chunk_id)
        .bind(&chunk.source_id)
        .bind(chunk.sequence_index)
        .bind(&chunk.text)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, source, embedding)
            VALUES (?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                source = excluded.source,
                embedding = excluded.embedding
            "#,
        )
        .bind(&chunk_id)
        .bind(&chunk.source_id)
        .bind(vec_to_blob(vector))
        .execute(&mut *tx)
        .await?;

        added += 1;
    }

    tx.commit().await?;
    Ok(added)
}

/// Rank all stored chunks by cosine similarity to `query_vec`, descending.
/// Ties keep insertion order (rowid). An empty index returns an empty vec.
pub async fn query_similar(
    pool: &SqlitePool,
    query_vec: &[f32],
    top_k: usize,
) -> Result<Vec<RetrievedSnippet>> {
    let rows = sqlx::query(
        r#"
        SELECT c.text, c.source, c.chunk_index, cv.embedding
        FROM chunk_vectors cv
        JOIN chunks c ON c.id = cv.chunk_id
        ORDER BY cv.rowid
        "#,
    )
    .fetch_all(pool)
    .await?;

    struct Candidate {
        text: String,
        source: String,
        chunk_index: i64,
        score: f32,
        insertion: usize,
    }

    let mut candidates: Vec<Candidate> = rows
        .iter()
        .enumerate()
        .map(|(insertion, row)| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = blob_to_vec(&blob);
            Candidate {
                text: row.get("text"),
                source: row.get("source"),
                chunk_index: row.get("chunk_index"),
                score: cosine_similarity(query_vec, &vec),
                insertion,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.insertion.cmp(&b.insertion))
    });
    candidates.truncate(top_k);

    Ok(candidates
        .into_iter()
        .enumerate()
        .map(|(i, c)| RetrievedSnippet {
            text: c.text,
            source: c.source,
            chunk_index: c.chunk_index,
            rank: i + 1,
        })
        .collect())
}

/// Delete every chunk and vector ingested from `source`.
pub async fn remove_source(pool: &SqlitePool, source: &str) -> Result<u64> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chunk_vectors WHERE source = ?")
        .bind(source)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM chunks WHERE source = ?")
        .bind(source)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    Ok(deleted)
}

/// Number of indexed chunks.
pub async fn chunk_count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
