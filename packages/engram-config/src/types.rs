use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub storage: Storage,
	pub providers: Providers,
	pub memory: Memory,
	pub index: Index,
	pub cache: Cache,
	pub queue: Queue,
	pub retrieval: Retrieval,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: Option<RerankProviderConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub max_input_chars: u32,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RerankProviderConfig {
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Memory {
	pub max_content_chars: u32,
	pub default_importance: f32,
	pub max_embed_attempts: u32,
	pub retry_base_backoff_ms: u64,
	pub retry_max_backoff_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Index {
	pub max_links: u32,
	pub ef_construction: u32,
	pub ef_search: u32,
	pub max_layers: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Cache {
	pub capacity: u32,
	pub ttl_seconds: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Queue {
	pub max_concurrency: u32,
	pub high_water_mark: u32,
	pub job_timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Retrieval {
	pub max_k: u32,
	pub overfetch_factor: u32,
	pub decay_half_life_days: f32,
	pub rerank_weight: f32,
	pub deadline_ms: u64,
}
