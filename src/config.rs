use crate::storage::{BackendLocal, StorageManager};
use serde::{Deserialize, Serialize};

/// Default candidate range for the cluster-count search
const DEFAULT_MIN_CLUSTERS: usize = 2;
const DEFAULT_MAX_CLUSTERS: usize = 10;
/// Default cluster cache lifetime (1 hour)
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Configuration for embedding generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Show a progress bar while downloading model weights on first use
    #[serde(default = "default_show_download_progress")]
    pub show_download_progress: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: crate::semantic::DEFAULT_MODEL.to_string(),
            show_download_progress: true,
        }
    }
}

fn default_embedding_model() -> String {
    crate::semantic::DEFAULT_MODEL.to_string()
}

fn default_show_download_progress() -> bool {
    true
}

/// Configuration for the cluster engine and its cache
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Lower bound of the cluster-count search range
    #[serde(default = "default_min_clusters")]
    pub min_clusters: usize,

    /// Upper bound of the cluster-count search range
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,

    /// Cluster cache lifetime in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_clusters: DEFAULT_MIN_CLUSTERS,
            max_clusters: DEFAULT_MAX_CLUSTERS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

fn default_min_clusters() -> usize {
    DEFAULT_MIN_CLUSTERS
}

fn default_max_clusters() -> usize {
    DEFAULT_MAX_CLUSTERS
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Config {
    fn validate(&self) {
        if self.embedding.model.trim().is_empty() {
            panic!("embedding.model must not be empty");
        }

        if self.clustering.min_clusters == 0 {
            panic!("clustering.min_clusters must be at least 1");
        }

        if self.clustering.max_clusters < self.clustering.min_clusters {
            panic!(
                "clustering.max_clusters ({}) must not be below clustering.min_clusters ({})",
                self.clustering.max_clusters, self.clustering.min_clusters
            );
        }

        if self.clustering.cache_ttl_secs == 0 {
            panic!("clustering.cache_ttl_secs must be greater than 0");
        }
    }

    pub fn load_with(base_path: &str) -> Self {
        let store = BackendLocal::new(base_path).expect("couldnt create config directory");

        // create new if does not exist
        if !store.exists("config.yaml") {
            store
                .write(
                    "config.yaml",
                    serde_yml::to_string(&Self::default()).unwrap().as_bytes(),
                )
                .expect("couldnt write default config");
        }

        let config_str = String::from_utf8(store.read("config.yaml").expect("couldnt read config"))
            .expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let store = BackendLocal::new(&self.base_path).expect("couldnt create config directory");

        let config_str = serde_yml::to_string(&self).unwrap();
        store
            .write("config.yaml", config_str.as_bytes())
            .expect("couldnt write config");
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}
