use std::sync::{Arc, RwLock};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Result, lru::LruCache};
use engram_domain::{BoxFuture, Fingerprint, MemoryScope};

/// One ranked result held for a query fingerprint. Owned exclusively by the
/// cache; mutation happens only on the insert/evict path.
#[derive(Clone, Debug)]
pub struct CachedResult {
	pub scope: MemoryScope,
	pub items: Vec<CachedItem>,
	pub expires_at: OffsetDateTime,
}
impl CachedResult {
	pub fn expired(&self, now: OffsetDateTime) -> bool {
		self.expires_at <= now
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CachedItem {
	pub record_id: Uuid,
	pub similarity: f32,
	pub score: f32,
}

/// Slower backing lookup consulted only on a tier-1 miss.
pub trait CacheBackend
where
	Self: Send + Sync,
{
	fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<CachedResult>>>;

	fn store<'a>(&'a self, key: &'a str, value: &'a CachedResult) -> BoxFuture<'a, Result<()>>;

	fn invalidate_scope<'a>(&'a self, scope: &'a MemoryScope) -> BoxFuture<'a, Result<()>>;
}

/// Tier-1 bounded LRU plus an optional tier-2 backend.
///
/// Reads share the lock; insert, evict, touch, and invalidation take it
/// exclusively, so concurrent inserts can neither overfill the map nor evict a
/// just-inserted key.
pub struct RetrievalCache {
	tier1: RwLock<LruCache<Fingerprint, CachedResult>>,
	tier2: Option<Arc<dyn CacheBackend>>,
	ttl: Duration,
}
impl RetrievalCache {
	pub fn new(cfg: &engram_config::Cache, tier2: Option<Arc<dyn CacheBackend>>) -> Self {
		Self {
			tier1: RwLock::new(LruCache::new(cfg.capacity as usize)),
			tier2,
			ttl: Duration::seconds(cfg.ttl_seconds as i64),
		}
	}

	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	pub fn len(&self) -> usize {
		self.tier1.read().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub async fn get(&self, key: &Fingerprint, now: OffsetDateTime) -> Option<CachedResult> {
		let peeked = {
			let tier1 = self.tier1.read().unwrap_or_else(|err| err.into_inner());

			tier1.peek(key).cloned()
		};

		match peeked {
			Some(entry) if !entry.expired(now) => {
				let mut tier1 = self.tier1.write().unwrap_or_else(|err| err.into_inner());

				tier1.touch(key);

				return Some(entry);
			},
			Some(_) => {
				let mut tier1 = self.tier1.write().unwrap_or_else(|err| err.into_inner());

				tier1.remove(key);
			},
			None => {},
		}

		let tier2 = self.tier2.as_ref()?;

		match tier2.load(key).await {
			Ok(Some(entry)) if !entry.expired(now) => {
				let mut tier1 = self.tier1.write().unwrap_or_else(|err| err.into_inner());

				tier1.insert(key.clone(), entry.clone());

				Some(entry)
			},
			Ok(_) => None,
			Err(err) => {
				tracing::warn!(error = %err, "Tier-2 cache load failed; treating as a miss.");

				None
			},
		}
	}

	pub async fn insert(&self, key: Fingerprint, entry: CachedResult) {
		{
			let mut tier1 = self.tier1.write().unwrap_or_else(|err| err.into_inner());

			tier1.insert(key.clone(), entry.clone());
		}

		if let Some(tier2) = self.tier2.as_ref()
			&& let Err(err) = tier2.store(&key, &entry).await
		{
			tracing::warn!(error = %err, "Tier-2 cache store failed.");
		}
	}

	/// Drops every entry for the scope. Completes before the triggering write
	/// returns, so a subsequent read cannot observe a stale ranked list.
	pub async fn invalidate(&self, scope: &MemoryScope) {
		{
			let mut tier1 = self.tier1.write().unwrap_or_else(|err| err.into_inner());

			tier1.retain(|_, entry| entry.scope != *scope);
		}

		if let Some(tier2) = self.tier2.as_ref()
			&& let Err(err) = tier2.invalidate_scope(scope).await
		{
			tracing::warn!(error = %err, "Tier-2 cache invalidation failed.");
		}
	}
}
