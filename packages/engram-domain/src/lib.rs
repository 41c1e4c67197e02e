mod fingerprint;
mod lexical;
mod record;
mod scoring;
mod vector;

pub use fingerprint::{Fingerprint, query_fingerprint};
pub use lexical::{lexical_overlap_ratio, tokenize_query, tokenize_text_terms};
pub use record::{MemoryKind, MemoryRecord, MemoryScope};
pub use scoring::{composite_score, recency_decay};
pub use vector::{cosine_similarity, normalize, normalized};

use std::{future::Future, pin::Pin};

/// Boxed future used by the object-safe provider, cache, and storage seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
