pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Embedding service unavailable: {message}")]
	EmbeddingUnavailable { message: String },
	#[error("Embedding service answered with a malformed body: {message}")]
	EmbeddingBadResponse { message: String },
	#[error("Vector index rejected the operation: {message}")]
	IndexUnavailable { message: String },
	#[error("Write queue saturated at depth {depth} (high-water mark {high_water_mark}).")]
	QueueSaturated { depth: usize, high_water_mark: usize },
	#[error("Storage failure: {message}")]
	Storage { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
}
impl Error {
	pub(crate) fn invalid_request(message: impl Into<String>) -> Self {
		Self::InvalidRequest { message: message.into() }
	}
}
impl From<engram_providers::Error> for Error {
	fn from(err: engram_providers::Error) -> Self {
		match err {
			engram_providers::Error::Unavailable { message } => Self::EmbeddingUnavailable { message },
			engram_providers::Error::BadResponse { message } => Self::EmbeddingBadResponse { message },
		}
	}
}
impl From<engram_queue::Error> for Error {
	fn from(err: engram_queue::Error) -> Self {
		match err {
			engram_queue::Error::Saturated { depth, high_water_mark } =>
				Self::QueueSaturated { depth, high_water_mark },
			// The queue only ever carries embedding work, so any other job-level
			// failure is an embedding pipeline failure.
			other => Self::EmbeddingUnavailable { message: other.to_string() },
		}
	}
}
impl From<engram_index::Error> for Error {
	fn from(err: engram_index::Error) -> Self {
		Self::IndexUnavailable { message: err.to_string() }
	}
}
impl From<engram_storage::Error> for Error {
	fn from(err: engram_storage::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
