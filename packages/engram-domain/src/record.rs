use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
	Fact,
	Preference,
	Event,
	Emotion,
}
impl MemoryKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Fact => "fact",
			Self::Preference => "preference",
			Self::Event => "event",
			Self::Emotion => "emotion",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"fact" => Some(Self::Fact),
			"preference" => Some(Self::Preference),
			"event" => Some(Self::Event),
			"emotion" => Some(Self::Emotion),
			_ => None,
		}
	}
}

/// Partition key for index partitions, cache invalidation, and storage queries.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct MemoryScope {
	pub owner_id: String,
	pub agent_id: String,
}
impl MemoryScope {
	pub fn new(owner_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
		Self { owner_id: owner_id.into(), agent_id: agent_id.into() }
	}
}

/// One remembered fact, preference, event, or emotion.
///
/// `embedding` is either a vector of the configured dimensionality or absent with
/// `pending = true`. `access_count` increases only through the retrieval path.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MemoryRecord {
	pub record_id: Uuid,
	pub owner_id: String,
	pub agent_id: String,
	pub content: String,
	pub kind: MemoryKind,
	pub embedding: Option<Vec<f32>>,
	pub pending: bool,
	pub importance: f32,
	pub created_at: OffsetDateTime,
	pub last_accessed_at: OffsetDateTime,
	pub access_count: i64,
}
impl MemoryRecord {
	pub fn new(
		scope: &MemoryScope,
		content: impl Into<String>,
		kind: MemoryKind,
		importance: f32,
		now: OffsetDateTime,
	) -> Self {
		Self {
			record_id: Uuid::new_v4(),
			owner_id: scope.owner_id.clone(),
			agent_id: scope.agent_id.clone(),
			content: content.into(),
			kind,
			embedding: None,
			pending: true,
			importance: importance.clamp(0.0, 1.0),
			created_at: now,
			last_accessed_at: now,
			access_count: 0,
		}
	}

	pub fn scope(&self) -> MemoryScope {
		MemoryScope::new(self.owner_id.clone(), self.agent_id.clone())
	}
}
