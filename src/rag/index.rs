//! Persistent vector index over SQLite.
//!
//! Chunks and their embeddings live in two tables; embeddings are stored
//! as little-endian f32 blobs. Search is a brute-force distance scan,
//! which is adequate at the single-deployment scale this service targets.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use serde::Serialize;
use thiserror::Error;

use super::models::{Chunk, RetrievalResult};

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk count ({chunks}) doesn't match embedding count ({embeddings})")]
    LengthMismatch { chunks: usize, embeddings: usize },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: u32, actual: u32 },
}

pub type Result<T> = std::result::Result<T, VectorIndexError>;

/// Statistics about the vector index.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub chunk_count: u64,
    pub document_count: u64,
    pub dimensions: u32,
}

/// Append-only vector index backed by a SQLite database.
pub struct VectorIndex {
    conn: Connection,
    dimensions: Option<u32>,
    db_path: PathBuf,
}

impl VectorIndex {
    /// Open (or create) the index database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            r#"
            -- Chunk text plus provenance metadata
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                page INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            -- Embeddings as little-endian f32 blobs
            CREATE TABLE IF NOT EXISTS embeddings (
                chunk_id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL,
                dimensions INTEGER NOT NULL,
                FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
            );

            -- Index-wide metadata (embedding dimension)
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);
            "#,
        )?;

        let dimensions: Option<u32> = conn
            .query_row("SELECT value FROM meta WHERE key = 'dimensions'", [], |row| {
                row.get::<_, String>(0)
            })
            .ok()
            .and_then(|s| s.parse().ok());

        Ok(Self {
            conn,
            dimensions,
            db_path: db_path.to_path_buf(),
        })
    }

    /// Append a batch of chunks and their embeddings in one transaction.
    ///
    /// The transaction is the durability point: a crash mid-batch leaves
    /// previously committed chunks intact. Returns the number added.
    pub fn add_chunks(&mut self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<usize> {
        if chunks.len() != embeddings.len() {
            return Err(VectorIndexError::LengthMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }

        if let Some(expected) = self.dimensions {
            for emb in embeddings {
                if emb.len() as u32 != expected {
                    return Err(VectorIndexError::DimensionMismatch {
                        expected,
                        actual: emb.len() as u32,
                    });
                }
            }
        }

        let tx = self.conn.transaction()?;

        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            tx.execute(
                "INSERT INTO chunks (id, source, page, chunk_index, start_offset, content)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    chunk.id.to_string(),
                    chunk.source,
                    chunk.page,
                    chunk.chunk_index,
                    chunk.start_offset as i64,
                    chunk.content,
                ],
            )?;

            let embedding_bytes: Vec<u8> =
                embedding.iter().flat_map(|f| f.to_le_bytes()).collect();

            tx.execute(
                "INSERT INTO embeddings (chunk_id, embedding, dimensions) VALUES (?1, ?2, ?3)",
                params![
                    chunk.id.to_string(),
                    embedding_bytes,
                    embedding.len() as i64,
                ],
            )?;
        }

        if self.dimensions.is_none() {
            if let Some(first) = embeddings.first() {
                tx.execute(
                    "INSERT OR REPLACE INTO meta (key, value) VALUES ('dimensions', ?1)",
                    params![first.len().to_string()],
                )?;
            }
        }

        tx.commit()?;

        if self.dimensions.is_none() {
            self.dimensions = embeddings.first().map(|e| e.len() as u32);
        }

        Ok(chunks.len())
    }

    /// Nearest-neighbor search by squared Euclidean distance.
    ///
    /// Results are ordered closest first; ties retain scan order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.source, c.page, c.content, e.embedding
             FROM chunks c
             JOIN embeddings e ON c.id = e.chunk_id
             ORDER BY c.rowid",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut results: Vec<RetrievalResult> = rows
            .into_iter()
            .map(|(source, page, content, embedding_bytes)| {
                let embedding = deserialize_embedding(&embedding_bytes);
                let score = squared_distance(query, &embedding);
                RetrievalResult {
                    content,
                    source: if source.is_empty() {
                        "unknown".to_string()
                    } else {
                        source
                    },
                    page: u32::try_from(page).unwrap_or(0),
                    score,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);
        Ok(results)
    }

    /// Whether the index holds any chunks.
    pub fn is_empty(&self) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count == 0)
    }

    /// Counts over the indexed corpus.
    pub fn stats(&self) -> Result<IndexStats> {
        let chunk_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;

        let document_count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT source) FROM chunks",
            [],
            |row| row.get(0),
        )?;

        Ok(IndexStats {
            chunk_count: chunk_count as u64,
            document_count: document_count as u64,
            dimensions: self.dimensions.unwrap_or(0),
        })
    }

    /// Path of the backing database.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

/// Deserialize an embedding from a little-endian f32 blob.
fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Squared Euclidean distance; lower is closer. Length mismatches score
/// as infinitely far rather than failing the whole scan.
fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::INFINITY;
    }
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, page: u32, index: u32, content: &str) -> Chunk {
        Chunk::new(source.to_string(), page, index, 0, content.to_string())
    }

    fn open_temp() -> (tempfile::TempDir, VectorIndex) {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(&dir.path().join("index.sqlite3")).unwrap();
        (dir, index)
    }

    #[test]
    fn test_squared_distance() {
        assert_eq!(squared_distance(&[1.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(squared_distance(&[1.0, 0.0], &[0.0, 1.0]), 2.0);
        assert_eq!(squared_distance(&[0.0], &[3.0]), 9.0);
        assert!(squared_distance(&[1.0], &[1.0, 2.0]).is_infinite());
    }

    #[test]
    fn test_deserialize_embedding() {
        let values = vec![1.0f32, -2.5, 3.0];
        let bytes: Vec<u8> = values.iter().flat_map(|f| f.to_le_bytes()).collect();
        assert_eq!(deserialize_embedding(&bytes), values);
    }

    #[test]
    fn test_search_orders_by_distance() {
        let (_dir, mut index) = open_temp();
        let chunks = vec![
            chunk("a.pdf", 1, 0, "closest"),
            chunk("a.pdf", 1, 1, "farthest"),
            chunk("a.pdf", 2, 2, "middle"),
        ];
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 3.0], vec![0.0, 1.0]];
        assert_eq!(index.add_chunks(&chunks, &embeddings).unwrap(), 3);

        let results = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].content, "closest");
        assert_eq!(results[1].content, "middle");
        assert_eq!(results[2].content, "farthest");
        for pair in results.windows(2) {
            assert!(pair[0].score <= pair[1].score);
        }
    }

    #[test]
    fn test_search_truncates_to_k() {
        let (_dir, mut index) = open_temp();
        let chunks: Vec<Chunk> = (0..5)
            .map(|i| chunk("a.pdf", 1, i, &format!("chunk {i}")))
            .collect();
        let embeddings: Vec<Vec<f32>> = (0..5).map(|i| vec![i as f32, 0.0]).collect();
        index.add_chunks(&chunks, &embeddings).unwrap();

        assert_eq!(index.search(&[0.0, 0.0], 2).unwrap().len(), 2);
        assert_eq!(index.search(&[0.0, 0.0], 10).unwrap().len(), 5);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let (_dir, mut index) = open_temp();
        index
            .add_chunks(&[chunk("a.pdf", 1, 0, "x")], &[vec![1.0, 0.0]])
            .unwrap();

        let err = index
            .add_chunks(&[chunk("a.pdf", 1, 1, "y")], &[vec![1.0, 0.0, 0.0]])
            .unwrap_err();
        match err {
            VectorIndexError::DimensionMismatch { expected, actual } => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let (_dir, mut index) = open_temp();
        let err = index
            .add_chunks(&[chunk("a.pdf", 1, 0, "x")], &[])
            .unwrap_err();
        assert!(matches!(err, VectorIndexError::LengthMismatch { .. }));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("index.sqlite3");

        {
            let mut index = VectorIndex::open(&db).unwrap();
            index
                .add_chunks(&[chunk("a.pdf", 3, 0, "kept")], &[vec![0.5, 0.5]])
                .unwrap();
        }

        let index = VectorIndex::open(&db).unwrap();
        assert!(!index.is_empty().unwrap());
        let results = index.search(&[0.5, 0.5], 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "kept");
        assert_eq!(results[0].page, 3);
        assert_eq!(results[0].score, 0.0);

        let stats = index.stats().unwrap();
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.dimensions, 2);
    }

    #[test]
    fn test_stats_counts_documents() {
        let (_dir, mut index) = open_temp();
        let chunks = vec![
            chunk("a.pdf", 1, 0, "one"),
            chunk("a.pdf", 2, 1, "two"),
            chunk("b.pdf", 1, 0, "three"),
        ];
        let embeddings = vec![vec![1.0], vec![2.0], vec![3.0]];
        index.add_chunks(&chunks, &embeddings).unwrap();

        let stats = index.stats().unwrap();
        assert_eq!(stats.chunk_count, 3);
        assert_eq!(stats.document_count, 2);
        assert_eq!(stats.dimensions, 1);
    }
}
