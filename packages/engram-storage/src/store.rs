use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::IndexSnapshotRow};
use engram_domain::{BoxFuture, MemoryRecord, MemoryScope};

/// Persistence boundary for memory records and index snapshots.
///
/// Every call returns a typed result; the engine never sees the storage
/// technology behind this trait.
pub trait RecordStore
where
	Self: Send + Sync,
{
	/// Checks that the backing schema carries every field the engine relies
	/// on. A [`crate::Error::Schema`] here triggers permanent degradation.
	fn verify(&self) -> BoxFuture<'_, Result<()>>;

	fn insert_record<'a>(&'a self, record: &'a MemoryRecord) -> BoxFuture<'a, Result<()>>;

	/// Writes the embedding and clears the pending flag in one statement.
	fn set_embedding<'a>(
		&'a self,
		record_id: Uuid,
		embedding: &'a [f32],
	) -> BoxFuture<'a, Result<()>>;

	fn records_by_ids<'a>(&'a self, ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<MemoryRecord>>>;

	/// All records in the scope that carry an embedding, for partition
	/// hydration.
	fn embedded_records<'a>(
		&'a self,
		scope: &'a MemoryScope,
	) -> BoxFuture<'a, Result<Vec<MemoryRecord>>>;

	/// Most-recently-accessed records first; the conservative fallback when
	/// the query cannot be embedded.
	fn recent_records<'a>(
		&'a self,
		scope: &'a MemoryScope,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<MemoryRecord>>>;

	/// Increments `access_count` and stamps `last_accessed_at`. The retrieval
	/// path is the only caller.
	fn touch_access<'a>(
		&'a self,
		ids: &'a [Uuid],
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	fn load_snapshots(&self) -> BoxFuture<'_, Result<Vec<IndexSnapshotRow>>>;

	fn save_snapshot<'a>(
		&'a self,
		scope: &'a MemoryScope,
		blob: &'a [u8],
		schema_version: i32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;
}
