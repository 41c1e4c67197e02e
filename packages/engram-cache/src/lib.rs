mod lru;
mod tiered;

pub use lru::LruCache;
pub use tiered::{CacheBackend, CachedItem, CachedResult, RetrievalCache};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Cache backend error: {message}")]
	Backend { message: String },
}
impl Error {
	pub fn backend(message: impl Into<String>) -> Self {
		Self::Backend { message: message.into() }
	}
}
