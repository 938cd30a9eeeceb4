//! Configuration management for Jurix
//!
//! Loads the TOML configuration, applies named profiles and `JURIX_SECTION__KEY`
//! environment overrides, and validates the result before anything is built from it.

use crate::error::{JurixError, Result};
use crate::text::DEFAULT_STOP_WORDS;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub lexical: LexicalConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration (chunk catalog)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Chunk texts at least this many bytes long are stored zstd-compressed
    pub compression_threshold: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.jurix"),
            compression_threshold: 1024,
        }
    }
}

/// Embedding provider configuration (used by the CLI adapters only)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Prepended to query text before embedding (e5-style models expect "query: ")
    pub query_prefix: String,
    /// Prepended to passage text before embedding
    pub passage_prefix: String,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            query_prefix: String::new(),
            passage_prefix: String::new(),
            batch_size: 32,
        }
    }
}

/// Which implementation backs the lexical index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LexicalBackend {
    /// In-memory inverted index over precomputed term frequencies
    Bm25,
    /// Tantivy in-RAM index (fixed BM25 constants)
    Tantivy,
}

/// Lexical scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    pub backend: LexicalBackend,
    /// BM25 term-frequency saturation
    pub k1: f32,
    /// BM25 length normalization
    pub b: f32,
    pub stop_words: Vec<String>,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            backend: LexicalBackend::Bm25,
            k1: 1.2,
            b: 0.75,
            stop_words: DEFAULT_STOP_WORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Which implementation backs the vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VectorBackend {
    /// Brute-force inner product, deterministic
    Exact,
    /// HNSW approximate search
    Hnsw,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub backend: VectorBackend,
    /// HNSW M parameter (number of connections per layer)
    pub hnsw_m: usize,
    /// HNSW construction parameter (higher = better recall, slower build)
    pub hnsw_ef_construction: usize,
    /// HNSW search parameter (higher = better recall, slower search)
    pub hnsw_ef_search: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Exact,
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 64,
        }
    }
}

/// How the two candidate streams are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FusionStrategy {
    /// Min-max normalized weighted sum
    Weighted,
    /// Weighted reciprocal rank fusion
    Rrf,
}

/// Hybrid retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates kept per source before fusion, and after fusion
    pub top_k: usize,
    /// Fusion weight for the semantic stream (alpha)
    pub semantic_weight: f32,
    /// Fusion weight for the lexical stream (beta)
    pub lexical_weight: f32,
    pub fusion: FusionStrategy,
    /// RRF K constant (typically 60)
    pub rrf_k: f32,
    /// Raw cosine similarity below which vector candidates are discarded
    pub min_semantic_score: f32,
    /// Pin chunks for articles cited in the query ("art. 12")
    pub direct_reference: bool,
    /// Keep only the best chunk per source reference
    pub dedup_by_source: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 50,
            semantic_weight: 0.5,
            lexical_weight: 0.5,
            fusion: FusionStrategy::Weighted,
            rrf_k: 60.0,
            min_semantic_score: 0.0,
            direct_reference: true,
            dedup_by_source: false,
        }
    }
}

/// Which reranker refines the fused shortlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RerankModel {
    /// Pass-through, fused order is final
    None,
    /// Query-term coverage and proximity scorer
    Coverage,
    /// FastEmbed cross-encoder
    CrossEncoder,
}

/// Reranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub model: RerankModel,
    /// Cross-encoder model name (only used with `cross-encoder`)
    pub cross_encoder_model: String,
    /// Size of the fused shortlist handed to the reranker
    pub depth: usize,
    /// Maximum wait for the reranker before falling back to pass-through
    pub timeout_ms: u64,
}

impl RerankConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            model: RerankModel::Coverage,
            cross_encoder_model: "BAAI/bge-reranker-base".to_string(),
            depth: 10,
            timeout_ms: 2000,
        }
    }
}

/// What to do with a candidate longer than the remaining budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TruncationPolicy {
    /// Skip it and keep scanning
    None,
    /// Keep its most query-relevant sentences that fit
    Sentences,
}

/// Context compression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Default token budget when the caller does not pass one
    pub budget: usize,
    /// Jaccard similarity at or above which a candidate is a near-duplicate
    pub duplicate_threshold: f32,
    pub truncation: TruncationPolicy,
    /// Smallest remaining budget worth filling with a truncated passage
    pub min_partial_tokens: usize,
    /// Terms that mark a sentence as normative (bonus 0.5)
    pub emphasis_terms: Vec<String>,
    /// Modal verbs that mark an obligation or permission (bonus 0.3)
    pub modal_terms: Vec<String>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            budget: 2000,
            duplicate_threshold: 0.8,
            truncation: TruncationPolicy::None,
            min_partial_tokens: 16,
            emphasis_terms: ["multa", "sanción", "infracción", "prohib", "oblig"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            modal_terms: ["debe", "deberá", "podrá", "será"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_model: Option<RerankModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<usize>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(JurixError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| JurixError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| JurixError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| JurixError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| JurixError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        if let Some(weight) = overrides.semantic_weight {
            self.retrieval.semantic_weight = weight;
        }
        if let Some(weight) = overrides.lexical_weight {
            self.retrieval.lexical_weight = weight;
        }
        if let Some(model) = overrides.rerank_model {
            self.rerank.model = model;
        }
        if let Some(budget) = overrides.budget {
            self.compression.budget = budget;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: JURIX_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("JURIX_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    pub(crate) fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "RETRIEVAL__TOP_K" => self.retrieval.top_k = parse_env(path, value)?,
            "RETRIEVAL__SEMANTIC_WEIGHT" => {
                self.retrieval.semantic_weight = parse_env(path, value)?
            }
            "RETRIEVAL__LEXICAL_WEIGHT" => self.retrieval.lexical_weight = parse_env(path, value)?,
            "RETRIEVAL__FUSION" => self.retrieval.fusion = parse_env(path, value)?,
            "LEXICAL__BACKEND" => self.lexical.backend = parse_env(path, value)?,
            "LEXICAL__K1" => self.lexical.k1 = parse_env(path, value)?,
            "LEXICAL__B" => self.lexical.b = parse_env(path, value)?,
            "VECTOR__BACKEND" => self.vector.backend = parse_env(path, value)?,
            "RERANK__MODEL" => self.rerank.model = parse_env(path, value)?,
            "RERANK__TIMEOUT_MS" => self.rerank.timeout_ms = parse_env(path, value)?,
            "COMPRESSION__BUDGET" => self.compression.budget = parse_env(path, value)?,
            "COMPRESSION__DUPLICATE_THRESHOLD" => {
                self.compression.duplicate_threshold = parse_env(path, value)?
            }
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| JurixError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("jurix").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| JurixError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".jurix"))
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            "precise".to_string(),
            ProfileOverrides {
                top_k: Some(100),
                rerank_model: Some(RerankModel::CrossEncoder),
                ..ProfileOverrides::default()
            },
        );
        profiles.insert(
            "fast".to_string(),
            ProfileOverrides {
                top_k: Some(20),
                rerank_model: Some(RerankModel::None),
                ..ProfileOverrides::default()
            },
        );

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            lexical: LexicalConfig::default(),
            vector: VectorConfig::default(),
            retrieval: RetrievalConfig::default(),
            rerank: RerankConfig::default(),
            compression: CompressionConfig::default(),
            profiles,
        }
    }
}

fn parse_env<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| JurixError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

macro_rules! kebab_from_str {
    ($ty:ty { $($text:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Ok($variant),)+
                    other => Err(format!("unknown value '{}'", other)),
                }
            }
        }
    };
}

kebab_from_str!(LexicalBackend { "bm25" => LexicalBackend::Bm25, "tantivy" => LexicalBackend::Tantivy });
kebab_from_str!(VectorBackend { "exact" => VectorBackend::Exact, "hnsw" => VectorBackend::Hnsw });
kebab_from_str!(FusionStrategy { "weighted" => FusionStrategy::Weighted, "rrf" => FusionStrategy::Rrf });
kebab_from_str!(RerankModel {
    "none" => RerankModel::None,
    "coverage" => RerankModel::Coverage,
    "cross-encoder" => RerankModel::CrossEncoder,
});
kebab_from_str!(TruncationPolicy { "none" => TruncationPolicy::None, "sentences" => TruncationPolicy::Sentences });

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.retrieval.top_k = 25;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.retrieval.top_k, 25);
        assert_eq!(loaded.lexical.backend, LexicalBackend::Bm25);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "[_meta]\nschema_version = \"1.0.0\"\n\n[retrieval]\ntop_k = 7\nfusion = \"rrf\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.retrieval.top_k, 7);
        assert_eq!(config.retrieval.fusion, FusionStrategy::Rrf);
        assert_eq!(config.compression.duplicate_threshold, 0.8);
        assert_eq!(config.lexical.k1, 1.2);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/jurix.toml"));
        assert!(matches!(result, Err(JurixError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_apply_profile() {
        let mut config = Config::default();
        config.apply_profile("fast").unwrap();
        assert_eq!(config.retrieval.top_k, 20);
        assert_eq!(config.rerank.model, RerankModel::None);

        assert!(config.apply_profile("nope").is_err());
    }

    #[test]
    fn test_env_value_parsing() {
        let mut config = Config::default();
        config.set_value_from_env("LEXICAL__BACKEND", "tantivy").unwrap();
        config.set_value_from_env("RERANK__MODEL", "cross-encoder").unwrap();
        config.set_value_from_env("RETRIEVAL__TOP_K", "12").unwrap();
        assert_eq!(config.lexical.backend, LexicalBackend::Tantivy);
        assert_eq!(config.rerank.model, RerankModel::CrossEncoder);
        assert_eq!(config.retrieval.top_k, 12);

        assert!(config.set_value_from_env("LEXICAL__K1", "abc").is_err());
    }
}
