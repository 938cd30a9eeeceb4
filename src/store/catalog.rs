//! SQLite chunk catalog with versioned snapshots
//!
//! Every import of a chunk set becomes a new snapshot version unless its content hash
//! matches the latest one. Rows are never updated in place; loading a version always
//! returns exactly the chunks written for it.

use crate::error::{JurixError, Result};
use crate::store::{Chunk, ChunkId};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Result of importing a chunk set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub version: u64,
    /// False when the content matched the latest snapshot and nothing was written
    pub created: bool,
    pub content_hash: String,
}

/// Catalog statistics
#[derive(Debug)]
pub struct CatalogStats {
    pub snapshot_count: usize,
    pub latest_version: Option<u64>,
    pub latest_chunk_count: usize,
    pub latest_dimension: usize,
    pub latest_created_at: Option<String>,
}

/// Persistent store of chunk snapshots
pub struct ChunkCatalog {
    pool: DbPool,
    compression_threshold: usize,
}

impl ChunkCatalog {
    /// Open (or create) a catalog database
    pub fn open(db_path: &Path, compression_threshold: usize) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| JurixError::Io {
                source: e,
                context: format!("Failed to create catalog directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder().max_size(8).build(manager)?;

        {
            let conn = pool.get()?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let catalog = Self {
            pool,
            compression_threshold,
        };
        catalog.migrate()?;

        Ok(catalog)
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i64 + 1;

            if version > current_version {
                tracing::info!("Applying catalog migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Write a chunk set as a new snapshot version
    pub fn import(&self, chunks: &[Chunk]) -> Result<ImportOutcome> {
        let content_hash = content_hash(chunks)?;
        let dimension = chunks.first().map(|c| c.embedding.len()).unwrap_or(0);

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let latest: Option<(i64, String)> = tx
            .query_row(
                "SELECT version, content_hash FROM snapshots ORDER BY version DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((version, hash)) = &latest {
            if *hash == content_hash {
                tracing::info!("Chunk set unchanged, keeping snapshot v{}", version);
                return Ok(ImportOutcome {
                    version: *version as u64,
                    created: false,
                    content_hash,
                });
            }
        }

        let version = latest.map(|(v, _)| v).unwrap_or(0) + 1;
        tx.execute(
            "INSERT INTO snapshots (version, content_hash, chunk_count, dimension, created_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))",
            params![version, content_hash, chunks.len() as i64, dimension as i64],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (snapshot_version, id, source_ref, title, article, token_count,
                                     text_blob, compressed, embedding, term_frequencies)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;

            for chunk in chunks {
                let (text_blob, compressed) = self.encode_text(&chunk.text)?;
                let term_frequencies =
                    serde_json::to_string(&chunk.term_frequencies).map_err(|e| JurixError::Json {
                        source: e,
                        context: format!("Failed to encode term frequencies of chunk {}", chunk.id),
                    })?;

                stmt.execute(params![
                    version,
                    chunk.id as i64,
                    chunk.source_ref,
                    chunk.title,
                    chunk.article,
                    chunk.token_count as i64,
                    text_blob,
                    compressed,
                    encode_embedding(&chunk.embedding),
                    term_frequencies,
                ])?;
            }
        }

        tx.commit()?;
        tracing::info!("Wrote snapshot v{} ({} chunks)", version, chunks.len());

        Ok(ImportOutcome {
            version: version as u64,
            created: true,
            content_hash,
        })
    }

    /// Newest snapshot version, if any
    pub fn latest_version(&self) -> Result<Option<u64>> {
        let conn = self.get_conn()?;
        let version: Option<i64> =
            conn.query_row("SELECT MAX(version) FROM snapshots", [], |row| row.get(0))?;
        Ok(version.map(|v| v as u64))
    }

    /// All chunks of one snapshot version, in id order
    pub fn load(&self, version: u64) -> Result<Vec<Chunk>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, source_ref, title, article, token_count, text_blob, compressed,
                    embedding, term_frequencies
             FROM chunks WHERE snapshot_version = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![version as i64], |row| {
            Ok(StoredChunk {
                id: row.get::<_, i64>(0)? as ChunkId,
                source_ref: row.get(1)?,
                title: row.get(2)?,
                article: row.get(3)?,
                token_count: row.get::<_, i64>(4)? as usize,
                text_blob: row.get(5)?,
                compressed: row.get(6)?,
                embedding: row.get(7)?,
                term_frequencies: row.get(8)?,
            })
        })?;

        let mut chunks = Vec::new();
        for row in rows {
            chunks.push(row?.decode()?);
        }
        Ok(chunks)
    }

    /// Newest snapshot and its chunks
    pub fn load_latest(&self) -> Result<Option<(u64, Vec<Chunk>)>> {
        match self.latest_version()? {
            Some(version) => Ok(Some((version, self.load(version)?))),
            None => Ok(None),
        }
    }

    /// Delete all but the newest `keep` snapshots, returning how many were removed
    pub fn prune(&self, keep: usize) -> Result<usize> {
        let conn = self.get_conn()?;
        let removed = conn.execute(
            "DELETE FROM snapshots WHERE version NOT IN
                (SELECT version FROM snapshots ORDER BY version DESC LIMIT ?1)",
            params![keep as i64],
        )?;
        if removed > 0 {
            tracing::info!("Pruned {} old snapshots", removed);
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        let conn = self.get_conn()?;

        let snapshot_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;

        let latest: Option<(i64, i64, i64, String)> = conn
            .query_row(
                "SELECT version, chunk_count, dimension, created_at
                 FROM snapshots ORDER BY version DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        Ok(match latest {
            Some((version, chunk_count, dimension, created_at)) => CatalogStats {
                snapshot_count: snapshot_count as usize,
                latest_version: Some(version as u64),
                latest_chunk_count: chunk_count as usize,
                latest_dimension: dimension as usize,
                latest_created_at: Some(created_at),
            },
            None => CatalogStats {
                snapshot_count: snapshot_count as usize,
                latest_version: None,
                latest_chunk_count: 0,
                latest_dimension: 0,
                latest_created_at: None,
            },
        })
    }

    fn encode_text(&self, text: &str) -> Result<(Vec<u8>, bool)> {
        let data = text.as_bytes();
        if data.len() < self.compression_threshold {
            return Ok((data.to_vec(), false));
        }

        let compressed = zstd::encode_all(data, 3).map_err(|e| JurixError::Io {
            source: e,
            context: "Failed to compress chunk text".to_string(),
        })?;
        Ok((compressed, true))
    }
}

/// Raw row as stored
struct StoredChunk {
    id: ChunkId,
    source_ref: String,
    title: Option<String>,
    article: Option<u32>,
    token_count: usize,
    text_blob: Vec<u8>,
    compressed: bool,
    embedding: Vec<u8>,
    term_frequencies: String,
}

impl StoredChunk {
    fn decode(self) -> Result<Chunk> {
        let text_bytes = if self.compressed {
            zstd::decode_all(&self.text_blob[..]).map_err(|e| JurixError::Io {
                source: e,
                context: format!("Failed to decompress text of chunk {}", self.id),
            })?
        } else {
            self.text_blob
        };

        let text = String::from_utf8(text_bytes).map_err(|e| {
            JurixError::Config(format!("Chunk {} text is not UTF-8: {}", self.id, e))
        })?;

        let term_frequencies: BTreeMap<String, u32> =
            serde_json::from_str(&self.term_frequencies).map_err(|e| JurixError::Json {
                source: e,
                context: format!("Invalid term frequencies for chunk {}", self.id),
            })?;

        Ok(Chunk {
            id: self.id,
            source_ref: self.source_ref,
            title: self.title,
            article: self.article,
            text,
            token_count: self.token_count,
            embedding: decode_embedding(&self.embedding),
            term_frequencies,
        })
    }
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// BLAKE3 over the canonical JSON of the chunks in id order
fn content_hash(chunks: &[Chunk]) -> Result<String> {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.id);

    let mut hasher = blake3::Hasher::new();
    for chunk in ordered {
        let encoded = serde_json::to_vec(chunk).map_err(|e| JurixError::Json {
            source: e,
            context: format!("Failed to encode chunk {} for hashing", chunk.id),
        })?;
        hasher.update(&encoded);
        hasher.update(b"\n");
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Catalog migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE snapshots (
        version INTEGER PRIMARY KEY,
        content_hash TEXT NOT NULL,
        chunk_count INTEGER NOT NULL,
        dimension INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE chunks (
        snapshot_version INTEGER NOT NULL,
        id INTEGER NOT NULL,
        source_ref TEXT NOT NULL,
        title TEXT,
        article INTEGER,
        token_count INTEGER NOT NULL,
        text_blob BLOB NOT NULL,
        compressed BOOLEAN NOT NULL,
        embedding BLOB NOT NULL,
        term_frequencies TEXT NOT NULL,
        PRIMARY KEY (snapshot_version, id),
        FOREIGN KEY (snapshot_version) REFERENCES snapshots(version) ON DELETE CASCADE
    );

    CREATE INDEX idx_chunks_article ON chunks(snapshot_version, article);
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(id: ChunkId, text: &str) -> Chunk {
        let mut term_frequencies = BTreeMap::new();
        term_frequencies.insert("multa".to_string(), 1);
        Chunk {
            id,
            source_ref: format!("Artículo {}", id),
            title: Some("Título IV".to_string()),
            article: Some(id as u32),
            text: text.to_string(),
            token_count: 12,
            embedding: vec![0.25, -0.5, 1.0],
            term_frequencies,
        }
    }

    #[test]
    fn test_embedding_encoding() {
        let embedding = vec![0.1, -2.5, 3.75];
        assert_eq!(decode_embedding(&encode_embedding(&embedding)), embedding);
    }

    #[test]
    fn test_import_and_load() {
        let temp = TempDir::new().unwrap();
        let catalog = ChunkCatalog::open(&temp.path().join("catalog.sqlite"), 64).unwrap();
        assert_eq!(catalog.latest_version().unwrap(), None);

        let long_text = "multa ".repeat(50);
        let chunks = vec![chunk(2, "texto corto"), chunk(1, &long_text)];
        let outcome = catalog.import(&chunks).unwrap();
        assert_eq!(outcome.version, 1);
        assert!(outcome.created);

        let (version, loaded) = catalog.load_latest().unwrap().unwrap();
        assert_eq!(version, 1);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, 1);
        assert_eq!(loaded[0].text, long_text);
        assert_eq!(loaded[1], chunks[0]);
    }

    #[test]
    fn test_unchanged_import_reuses_version() {
        let temp = TempDir::new().unwrap();
        let catalog = ChunkCatalog::open(&temp.path().join("catalog.sqlite"), 1024).unwrap();

        let chunks = vec![chunk(1, "uno"), chunk(2, "dos")];
        let first = catalog.import(&chunks).unwrap();
        let reordered = vec![chunk(2, "dos"), chunk(1, "uno")];
        let second = catalog.import(&reordered).unwrap();
        assert_eq!(first.version, second.version);
        assert!(!second.created);

        let third = catalog.import(&[chunk(1, "uno"), chunk(3, "tres")]).unwrap();
        assert_eq!(third.version, 2);
        assert!(third.created);

        let stats = catalog.stats().unwrap();
        assert_eq!(stats.snapshot_count, 2);
        assert_eq!(stats.latest_version, Some(2));
        assert_eq!(stats.latest_dimension, 3);
    }

    #[test]
    fn test_prune_keeps_newest() {
        let temp = TempDir::new().unwrap();
        let catalog = ChunkCatalog::open(&temp.path().join("catalog.sqlite"), 1024).unwrap();

        catalog.import(&[chunk(1, "uno")]).unwrap();
        catalog.import(&[chunk(2, "dos")]).unwrap();
        catalog.import(&[chunk(3, "tres")]).unwrap();

        assert_eq!(catalog.prune(1).unwrap(), 2);
        assert!(catalog.load(1).unwrap().is_empty());
        assert_eq!(catalog.load(3).unwrap().len(), 1);
    }
}
