use std::collections::HashSet;

use sqlx::PgPool;

use crate::{Error, Result};

pub const RECORDS_TABLE: &str = "memory_records";
pub const SNAPSHOTS_TABLE: &str = "index_snapshots";

const REQUIRED_RECORD_COLUMNS: [&str; 11] = [
	"record_id",
	"owner_id",
	"agent_id",
	"content",
	"kind",
	"embedding",
	"pending",
	"importance",
	"created_at",
	"last_accessed_at",
	"access_count",
];
const REQUIRED_SNAPSHOT_COLUMNS: [&str; 5] =
	["owner_id", "agent_id", "blob", "schema_version", "updated_at"];

pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_memory_records.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_memory_records.sql")),
				"tables/002_index_snapshots.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_index_snapshots.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

/// Compares the live tables against the columns the engine relies on.
///
/// A missing table or column is a typed [`Error::Schema`] so the engine can
/// degrade at initialization instead of failing on some later query.
pub async fn verify_schema(pool: &PgPool) -> Result<()> {
	verify_table(pool, RECORDS_TABLE, &REQUIRED_RECORD_COLUMNS).await?;
	verify_table(pool, SNAPSHOTS_TABLE, &REQUIRED_SNAPSHOT_COLUMNS).await?;

	Ok(())
}

async fn verify_table(pool: &PgPool, table: &str, required: &[&str]) -> Result<()> {
	let rows: Vec<(String,)> = sqlx::query_as(
		"\
SELECT column_name::TEXT
FROM information_schema.columns
WHERE table_schema = current_schema() AND table_name = $1",
	)
	.bind(table)
	.fetch_all(pool)
	.await?;

	if rows.is_empty() {
		return Err(Error::Schema { message: format!("Table {table} does not exist.") });
	}

	let present: HashSet<&str> = rows.iter().map(|(name,)| name.as_str()).collect();

	for column in required {
		if !present.contains(column) {
			return Err(Error::Schema {
				message: format!("Table {table} is missing expected column {column}."),
			});
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rendered_schema_creates_both_tables() {
		let sql = render_schema();

		assert!(sql.contains("CREATE TABLE IF NOT EXISTS memory_records"));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS index_snapshots"));
		assert!(!sql.contains("\\ir"));
	}

	#[test]
	fn rendered_schema_mentions_every_required_record_column() {
		let sql = render_schema();

		for column in REQUIRED_RECORD_COLUMNS {
			assert!(sql.contains(column), "schema is missing {column}");
		}
	}
}
