use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, Result};
use engram_domain::{MemoryKind, MemoryRecord, MemoryScope};

#[derive(Debug, sqlx::FromRow)]
pub struct MemoryRecordRow {
	pub record_id: Uuid,
	pub owner_id: String,
	pub agent_id: String,
	pub content: String,
	pub kind: String,
	pub embedding: Option<Vec<f32>>,
	pub pending: bool,
	pub importance: f32,
	pub created_at: OffsetDateTime,
	pub last_accessed_at: OffsetDateTime,
	pub access_count: i64,
}
impl MemoryRecordRow {
	pub fn into_record(self) -> Result<MemoryRecord> {
		let kind = MemoryKind::parse(&self.kind).ok_or_else(|| {
			Error::InvalidArgument(format!(
				"Record {} has unknown kind {:?}.",
				self.record_id, self.kind
			))
		})?;

		Ok(MemoryRecord {
			record_id: self.record_id,
			owner_id: self.owner_id,
			agent_id: self.agent_id,
			content: self.content,
			kind,
			embedding: self.embedding,
			pending: self.pending,
			importance: self.importance,
			created_at: self.created_at,
			last_accessed_at: self.last_accessed_at,
			access_count: self.access_count,
		})
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct IndexSnapshotRow {
	pub owner_id: String,
	pub agent_id: String,
	pub blob: Vec<u8>,
	pub schema_version: i32,
	pub updated_at: OffsetDateTime,
}
impl IndexSnapshotRow {
	pub fn scope(&self) -> MemoryScope {
		MemoryScope::new(self.owner_id.clone(), self.agent_id.clone())
	}
}
