//! # Configuration
//!
//! Settings come from four layers, later layers winning:
//!
//! 1. Built-in defaults (the stock card transaction dataset on a local Neo4j)
//! 2. An optional TOML file (`--config`)
//! 3. Environment: `CARDGRAPH_NEO4J_URI`, `CARDGRAPH_NEO4J_USER`,
//!    `CARDGRAPH_NEO4J_PASSWORD`
//! 4. Command line flags
//!
//! ```toml
//! [dataset]
//! path = "fraudTrain.csv"
//!
//! [store]
//! backend = "neo4j"          # neo4j | redb | memory
//! uri = "neo4j://localhost:7687"
//! user = "neo4j"
//! password = "password"
//! database = "cardgraph.db"  # redb file
//! timeout_ms = 30000
//!
//! [pipeline]
//! batch_size = 10000
//! workers = 8
//! relation = "MADE_PURCHASE_AT"
//! max_prompt_attempts = 3
//!
//! [attributes]
//! customer = ["first", "last", "cc_num", "gender", "zip", "state", "job", "city"]
//! merchant = ["merchant", "category"]
//! ```

use cardgraph_core::primitives::DEFAULT_RELATION;
use cardgraph_core::{AttributeMap, CardGraphError, PipelineOptions};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// DEFAULTS
// =============================================================================

pub const DEFAULT_DATASET: &str = "fraudTrain.csv";
pub const DEFAULT_NEO4J_URI: &str = "neo4j://localhost:7687";
pub const DEFAULT_NEO4J_USER: &str = "neo4j";
pub const DEFAULT_NEO4J_PASSWORD: &str = "password";
pub const DEFAULT_DATABASE: &str = "cardgraph.db";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub const ENV_NEO4J_URI: &str = "CARDGRAPH_NEO4J_URI";
pub const ENV_NEO4J_USER: &str = "CARDGRAPH_NEO4J_USER";
pub const ENV_NEO4J_PASSWORD: &str = "CARDGRAPH_NEO4J_PASSWORD";

// =============================================================================
// BACKEND
// =============================================================================

/// Which graph store the pipeline writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Neo4j,
    Redb,
    Memory,
}

impl FromStr for Backend {
    type Err = CardGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neo4j" => Ok(Self::Neo4j),
            "redb" => Ok(Self::Redb),
            "memory" => Ok(Self::Memory),
            other => Err(CardGraphError::Config(format!(
                "unknown backend '{}': expected neo4j, redb or memory",
                other
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Neo4j => "neo4j",
            Self::Redb => "redb",
            Self::Memory => "memory",
        })
    }
}

// =============================================================================
// FILE FORMAT
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub dataset: DatasetSection,
    pub store: StoreSection,
    pub pipeline: PipelineSection,
    pub attributes: AttributeSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub backend: Option<String>,
    pub uri: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub batch_size: Option<usize>,
    pub workers: Option<usize>,
    pub relation: Option<String>,
    pub max_prompt_attempts: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttributeSection {
    pub customer: Option<Vec<String>>,
    pub merchant: Option<Vec<String>>,
}

impl FileConfig {
    /// Parse TOML text.
    pub fn parse(text: &str) -> Result<Self, CardGraphError> {
        toml::from_str(text).map_err(|e| CardGraphError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn read(path: &Path) -> Result<Self, CardGraphError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CardGraphError::Config(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::parse(&text)
    }
}

// =============================================================================
// RESOLVED SETTINGS
// =============================================================================

/// Values given on the command line; `None` leaves lower layers in place.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub dataset: Option<PathBuf>,
    pub backend: Option<String>,
    pub database: Option<PathBuf>,
    pub uri: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub relation: Option<String>,
}

/// Connection settings of the Neo4j backend.
#[derive(Clone, PartialEq, Eq)]
pub struct Neo4jSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
}

impl fmt::Debug for Neo4jSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Neo4jSettings")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Fully resolved run settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub dataset: PathBuf,
    pub backend: Backend,
    pub neo4j: Neo4jSettings,
    /// redb database file.
    pub database: PathBuf,
    pub relation: String,
    pub options: PipelineOptions,
    pub attributes: AttributeMap,
}

fn positive(name: &str, value: Option<usize>, default: usize) -> Result<usize, CardGraphError> {
    match value {
        Some(0) => Err(CardGraphError::Config(format!("{} must be at least 1", name))),
        Some(n) => Ok(n),
        None => Ok(default),
    }
}

impl Settings {
    /// Merge the layers; `env` looks up an environment variable.
    pub fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
        overrides: &Overrides,
    ) -> Result<Self, CardGraphError> {
        let defaults = PipelineOptions::default();
        let standard = AttributeMap::standard();

        let backend = match overrides.backend.as_ref().or(file.store.backend.as_ref()) {
            Some(name) => name.parse()?,
            None => Backend::Neo4j,
        };

        let timeout_ms = file.store.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(CardGraphError::Config("timeout_ms must be at least 1".to_string()));
        }

        let neo4j = Neo4jSettings {
            uri: overrides
                .uri
                .clone()
                .or_else(|| env(ENV_NEO4J_URI))
                .or(file.store.uri)
                .unwrap_or_else(|| DEFAULT_NEO4J_URI.to_string()),
            user: overrides
                .user
                .clone()
                .or_else(|| env(ENV_NEO4J_USER))
                .or(file.store.user)
                .unwrap_or_else(|| DEFAULT_NEO4J_USER.to_string()),
            password: overrides
                .password
                .clone()
                .or_else(|| env(ENV_NEO4J_PASSWORD))
                .or(file.store.password)
                .unwrap_or_else(|| DEFAULT_NEO4J_PASSWORD.to_string()),
            timeout: Duration::from_millis(timeout_ms),
        };

        let options = PipelineOptions {
            batch_size: positive("batch_size", file.pipeline.batch_size, defaults.batch_size)?,
            workers: positive("workers", file.pipeline.workers, defaults.workers)?,
            max_prompt_attempts: positive(
                "max_prompt_attempts",
                file.pipeline.max_prompt_attempts,
                defaults.max_prompt_attempts,
            )?,
        };

        let relation = overrides
            .relation
            .clone()
            .or(file.pipeline.relation)
            .unwrap_or_else(|| DEFAULT_RELATION.to_string());
        if relation.trim().is_empty() {
            return Err(CardGraphError::Config("relation must not be empty".to_string()));
        }

        Ok(Self {
            dataset: overrides
                .dataset
                .clone()
                .or(file.dataset.path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATASET)),
            backend,
            neo4j,
            database: overrides
                .database
                .clone()
                .or(file.store.database)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            relation,
            options,
            attributes: AttributeMap {
                customer: file.attributes.customer.or(standard.customer),
                merchant: file.attributes.merchant.or(standard.merchant),
            },
        })
    }

    /// Load from an optional config file and the process environment.
    pub fn load(config: Option<&Path>, overrides: &Overrides) -> Result<Self, CardGraphError> {
        let file = match config {
            Some(path) => FileConfig::read(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, |name| std::env::var(name).ok(), overrides)
    }
}

// =============================================================================
// TESTS
// =============================================================================
