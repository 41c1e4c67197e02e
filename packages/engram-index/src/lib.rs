mod hnsw;
mod linear;
mod partition;
mod snapshot;

pub use hnsw::{HnswIndex, HnswParams};
pub use linear::LinearScanPool;
pub use partition::VectorIndex;
pub use snapshot::{SNAPSHOT_VERSION, decode_snapshot, encode_snapshot};

use uuid::Uuid;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Vector dimension {actual} does not match index dimension {expected}.")]
	DimensionMismatch { expected: usize, actual: usize },
	#[error("Record {record_id} is already indexed.")]
	DuplicateRecord { record_id: Uuid },
	#[error("Vector must be finite and non-zero.")]
	InvalidVector,
	#[error("Index snapshot rejected: {message}")]
	Snapshot { message: String },
}

/// One search result: a record id and its cosine similarity to the query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
	pub record_id: Uuid,
	pub similarity: f32,
}
