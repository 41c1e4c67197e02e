use sqlx::{PgPool, postgres::PgPoolOptions};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{IndexSnapshotRow, MemoryRecordRow},
	schema,
	store::RecordStore,
};
use engram_domain::{BoxFuture, MemoryRecord, MemoryScope};

const RECORD_COLUMNS: &str = "\
record_id, owner_id, agent_id, content, kind, embedding, pending, importance, created_at, \
last_accessed_at, access_count";

pub struct PgStore {
	pub pool: PgPool,
}
impl PgStore {
	pub async fn connect(cfg: &engram_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = schema::render_schema();

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&self.pool).await?;
		}

		tracing::info!("Storage schema is in place.");

		Ok(())
	}

	async fn fetch_records(&self, sql: &str, scope: &MemoryScope) -> Result<Vec<MemoryRecord>> {
		let rows: Vec<MemoryRecordRow> = sqlx::query_as(sql)
			.bind(&scope.owner_id)
			.bind(&scope.agent_id)
			.fetch_all(&self.pool)
			.await?;

		rows.into_iter().map(MemoryRecordRow::into_record).collect()
	}
}
impl RecordStore for PgStore {
	fn verify(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(schema::verify_schema(&self.pool))
	}

	fn insert_record<'a>(&'a self, record: &'a MemoryRecord) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			sqlx::query(
				"\
INSERT INTO memory_records (record_id, owner_id, agent_id, content, kind, embedding, pending, \
importance, created_at, last_accessed_at, access_count)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
			)
			.bind(record.record_id)
			.bind(&record.owner_id)
			.bind(&record.agent_id)
			.bind(&record.content)
			.bind(record.kind.as_str())
			.bind(record.embedding.as_deref())
			.bind(record.pending)
			.bind(record.importance)
			.bind(record.created_at)
			.bind(record.last_accessed_at)
			.bind(record.access_count)
			.execute(&self.pool)
			.await?;

			Ok(())
		})
	}

	fn set_embedding<'a>(
		&'a self,
		record_id: Uuid,
		embedding: &'a [f32],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			sqlx::query(
				"UPDATE memory_records SET embedding = $2, pending = FALSE WHERE record_id = $1",
			)
			.bind(record_id)
			.bind(embedding)
			.execute(&self.pool)
			.await?;

			Ok(())
		})
	}

	fn records_by_ids<'a>(&'a self, ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<MemoryRecord>>> {
		Box::pin(async move {
			let sql = format!(
				"SELECT {RECORD_COLUMNS} FROM memory_records WHERE record_id = ANY($1)"
			);
			let rows: Vec<MemoryRecordRow> =
				sqlx::query_as(&sql).bind(ids).fetch_all(&self.pool).await?;

			rows.into_iter().map(MemoryRecordRow::into_record).collect()
		})
	}

	fn embedded_records<'a>(
		&'a self,
		scope: &'a MemoryScope,
	) -> BoxFuture<'a, Result<Vec<MemoryRecord>>> {
		Box::pin(async move {
			let sql = format!(
				"\
SELECT {RECORD_COLUMNS} FROM memory_records
WHERE owner_id = $1 AND agent_id = $2 AND embedding IS NOT NULL AND pending = FALSE"
			);

			self.fetch_records(&sql, scope).await
		})
	}

	fn recent_records<'a>(
		&'a self,
		scope: &'a MemoryScope,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<MemoryRecord>>> {
		Box::pin(async move {
			let sql = format!(
				"\
SELECT {RECORD_COLUMNS} FROM memory_records
WHERE owner_id = $1 AND agent_id = $2
ORDER BY last_accessed_at DESC
LIMIT {limit}"
			);

			self.fetch_records(&sql, scope).await
		})
	}

	fn touch_access<'a>(
		&'a self,
		ids: &'a [Uuid],
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			sqlx::query(
				"\
UPDATE memory_records
SET access_count = access_count + 1, last_accessed_at = $2
WHERE record_id = ANY($1)",
			)
			.bind(ids)
			.bind(now)
			.execute(&self.pool)
			.await?;

			Ok(())
		})
	}

	fn load_snapshots(&self) -> BoxFuture<'_, Result<Vec<IndexSnapshotRow>>> {
		Box::pin(async move {
			let rows: Vec<IndexSnapshotRow> = sqlx::query_as(
				"SELECT owner_id, agent_id, blob, schema_version, updated_at FROM index_snapshots",
			)
			.fetch_all(&self.pool)
			.await?;

			Ok(rows)
		})
	}

	fn save_snapshot<'a>(
		&'a self,
		scope: &'a MemoryScope,
		blob: &'a [u8],
		schema_version: i32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			sqlx::query(
				"\
INSERT INTO index_snapshots (owner_id, agent_id, blob, schema_version, updated_at)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (owner_id, agent_id)
DO UPDATE SET blob = EXCLUDED.blob, schema_version = EXCLUDED.schema_version, \
updated_at = EXCLUDED.updated_at",
			)
			.bind(&scope.owner_id)
			.bind(&scope.agent_id)
			.bind(blob)
			.bind(schema_version)
			.bind(now)
			.execute(&self.pool)
			.await?;

			Ok(())
		})
	}
}
