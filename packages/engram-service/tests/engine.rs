use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use uuid::Uuid;

use engram_config::Config;
use engram_domain::{MemoryKind, MemoryRecord, MemoryScope, cosine_similarity};
use engram_service::{Engine, EngineMode, Error};
use engram_storage::RecordStore;
use engram_testkit::{MemoryStore, SeededEmbedder, test_config};

struct Harness {
	engine: Engine,
	store: Arc<MemoryStore>,
	embedder: Arc<SeededEmbedder>,
}

async fn harness_with(cfg: Config, store: Arc<MemoryStore>) -> Harness {
	let embedder = Arc::new(SeededEmbedder::new(cfg.providers.embedding.dimensions as usize));
	let engine =
		Engine::init(cfg, store.clone() as Arc<dyn RecordStore>, embedder.clone(), None, None)
			.await;

	Harness { engine, store, embedder }
}

async fn harness() -> Harness {
	harness_with(test_config(), Arc::new(MemoryStore::new())).await
}

async fn wait_embedded(store: &MemoryStore, record_id: Uuid) {
	for _ in 0..400 {
		if let Some(record) = store.record(record_id)
			&& !record.pending
		{
			return;
		}

		tokio::time::sleep(Duration::from_millis(5)).await;
	}

	panic!("record {record_id} never finished embedding");
}

#[tokio::test]
async fn recorded_memory_is_retrievable_at_rank_one() {
	let harness = harness().await;
	let content = "Prefers green tea over coffee in the morning.";
	let record_id = harness
		.engine
		.record("owner-1", "agent-1", content, MemoryKind::Preference)
		.await
		.expect("record failed");

	wait_embedded(&harness.store, record_id).await;

	harness
		.engine
		.record("owner-1", "agent-1", "Has a dentist appointment on Friday.", MemoryKind::Event)
		.await
		.expect("record failed");

	let block = harness.engine.retrieve("owner-1", "agent-1", content, 5).await;

	assert_eq!(block.items[0].record_id, record_id);
	assert!(block.items[0].similarity > 0.99);
}

#[tokio::test]
async fn schema_failure_degrades_to_exact_linear_scan() {
	let store = Arc::new(MemoryStore::new());

	store.set_verify_failing(true);

	let harness = harness_with(test_config(), store).await;

	assert_eq!(harness.engine.mode(), EngineMode::Degraded);

	let contents = [
		"Enjoys long hikes in the mountains.",
		"Allergic to peanuts.",
		"Works as a violin teacher.",
		"Visited Lisbon last summer.",
	];
	let mut ids = Vec::new();

	for content in contents {
		let id = harness
			.engine
			.record("owner-1", "agent-1", content, MemoryKind::Fact)
			.await
			.expect("record failed");

		wait_embedded(&harness.store, id).await;
		ids.push(id);
	}

	let query = "peanut allergy";
	let block = harness.engine.retrieve("owner-1", "agent-1", query, 2).await;

	// The degraded engine is an exact scan, so its top hit must match brute
	// force over the same embeddings.
	let query_vector = harness.embedder.embed_text(query);
	let expected = ids
		.iter()
		.max_by(|a, b| {
			let sim = |id: &Uuid| {
				let record = harness.store.record(*id).unwrap();

				cosine_similarity(&query_vector, record.embedding.as_deref().unwrap())
			};

			sim(a).total_cmp(&sim(b))
		})
		.copied()
		.unwrap();

	assert_eq!(block.items[0].record_id, expected);
}

#[tokio::test]
async fn fresher_access_ranks_first_at_equal_similarity() {
	let store = Arc::new(MemoryStore::new());
	let scope = MemoryScope::new("owner-1", "agent-1");
	let embedder = SeededEmbedder::new(32);
	let content = "Keeps a sourdough starter named Brenda.";
	let now = OffsetDateTime::now_utc();
	let mut stale = MemoryRecord::new(&scope, content, MemoryKind::Fact, 0.5, now);
	let mut fresh = MemoryRecord::new(&scope, content, MemoryKind::Fact, 0.5, now);

	stale.embedding = Some(embedder.embed_text(content));
	stale.pending = false;
	stale.last_accessed_at = now - time::Duration::days(120);
	fresh.embedding = Some(embedder.embed_text(content));
	fresh.pending = false;
	fresh.last_accessed_at = now - time::Duration::hours(1);

	store.insert_record(&stale).await.unwrap();
	store.insert_record(&fresh).await.unwrap();

	let harness = harness_with(test_config(), store).await;
	let block = harness.engine.retrieve("owner-1", "agent-1", content, 2).await;

	assert_eq!(block.items.len(), 2);
	assert_eq!(block.items[0].record_id, fresh.record_id);
	assert_eq!(block.items[1].record_id, stale.record_id);
}

#[tokio::test]
async fn stored_records_survive_a_write_before_the_first_read() {
	let store = Arc::new(MemoryStore::new());
	let scope = MemoryScope::new("owner-1", "agent-1");
	let embedder = SeededEmbedder::new(32);
	let content = "Grew up near the Baltic coast.";
	let mut seeded =
		MemoryRecord::new(&scope, content, MemoryKind::Fact, 0.5, OffsetDateTime::now_utc());

	seeded.embedding = Some(embedder.embed_text(content));
	seeded.pending = false;
	store.insert_record(&seeded).await.unwrap();

	let harness = harness_with(test_config(), store).await;
	// A write lands first, so the scope's partition is created by the write
	// path before any read has backfilled stored records.
	let new_id = harness
		.engine
		.record("owner-1", "agent-1", "Adopted a rescue greyhound.", MemoryKind::Event)
		.await
		.expect("record failed");

	wait_embedded(&harness.store, new_id).await;

	let block = harness.engine.retrieve("owner-1", "agent-1", content, 2).await;

	assert_eq!(block.items[0].record_id, seeded.record_id);
	assert!(block.items[0].similarity > 0.99);
}

#[tokio::test]
async fn records_embedded_after_a_snapshot_survive_a_restart() {
	let store = Arc::new(MemoryStore::new());
	let harness = harness_with(test_config(), store.clone()).await;
	let first_id = harness
		.engine
		.record("owner-1", "agent-1", "Keeps bees on the roof.", MemoryKind::Fact)
		.await
		.expect("record failed");

	wait_embedded(&store, first_id).await;
	harness.engine.persist_index().await.expect("persist failed");

	// Embedded after the snapshot, so the restored partition lacks it.
	let second_content = "Training for a marathon in autumn.";
	let second_id = harness
		.engine
		.record("owner-1", "agent-1", second_content, MemoryKind::Event)
		.await
		.expect("record failed");

	wait_embedded(&store, second_id).await;

	let restarted = harness_with(test_config(), store.clone()).await;

	assert_eq!(restarted.engine.mode(), EngineMode::Approximate);

	let block = restarted.engine.retrieve("owner-1", "agent-1", second_content, 2).await;

	assert_eq!(block.items[0].record_id, second_id);
	assert!(block.items[0].similarity > 0.99);
}

#[tokio::test]
async fn embedding_outage_falls_back_to_recency() {
	let harness = harness().await;
	let record_id = harness
		.engine
		.record("owner-1", "agent-1", "Planning a trip to Kyoto.", MemoryKind::Event)
		.await
		.expect("record failed");

	wait_embedded(&harness.store, record_id).await;
	harness.embedder.set_failing(true);

	let block = harness.engine.retrieve("owner-1", "agent-1", "travel plans", 5).await;

	assert_eq!(block.items.len(), 1);
	assert_eq!(block.items[0].record_id, record_id);
	assert_eq!(block.items[0].similarity, 0.0);
}

#[tokio::test]
async fn cache_hit_skips_the_embedder() {
	let harness = harness().await;
	let record_id = harness
		.engine
		.record("owner-1", "agent-1", "Prefers window seats on flights.", MemoryKind::Preference)
		.await
		.expect("record failed");

	wait_embedded(&harness.store, record_id).await;

	let query = "seating preference on planes";
	let first = harness.engine.retrieve("owner-1", "agent-1", query, 3).await;
	let calls_after_first = harness.embedder.calls();
	let second = harness.engine.retrieve("owner-1", "agent-1", query, 3).await;

	assert!(!first.is_empty());
	assert_eq!(
		first.items.iter().map(|item| item.record_id).collect::<Vec<_>>(),
		second.items.iter().map(|item| item.record_id).collect::<Vec<_>>(),
	);
	assert_eq!(harness.embedder.calls(), calls_after_first);
}

#[tokio::test]
async fn writes_invalidate_cached_results_for_the_scope() {
	let harness = harness().await;
	let first_id = harness
		.engine
		.record("owner-1", "agent-1", "Prefers green tea.", MemoryKind::Preference)
		.await
		.expect("record failed");

	wait_embedded(&harness.store, first_id).await;

	let query = "tea preference";

	harness.engine.retrieve("owner-1", "agent-1", query, 5).await;

	let second_id = harness
		.engine
		.record("owner-1", "agent-1", "Switched to jasmine tea recently.", MemoryKind::Preference)
		.await
		.expect("record failed");

	wait_embedded(&harness.store, second_id).await;

	let block = harness.engine.retrieve("owner-1", "agent-1", query, 5).await;
	let ids: Vec<Uuid> = block.items.iter().map(|item| item.record_id).collect();

	assert!(ids.contains(&second_id));
}

#[tokio::test]
async fn saturated_queue_still_returns_the_record_id() {
	let mut cfg = test_config();

	// One slot, and every job held alive by a failing embedder's retry loop.
	cfg.queue.max_concurrency = 1;
	cfg.queue.high_water_mark = 1;
	cfg.memory.max_embed_attempts = 10;
	cfg.memory.retry_base_backoff_ms = 100;
	cfg.memory.retry_max_backoff_ms = 500;

	let harness = harness_with(cfg, Arc::new(MemoryStore::new())).await;

	harness.embedder.set_failing(true);

	for round in 0..5 {
		let outcome = harness
			.engine
			.record("owner-1", "agent-1", &format!("note {round}"), MemoryKind::Fact)
			.await;

		assert!(outcome.is_ok());
	}

	assert_eq!(harness.store.record_count(), 5);
}

#[tokio::test]
async fn empty_content_is_rejected() {
	let harness = harness().await;
	let outcome = harness.engine.record("owner-1", "agent-1", "   ", MemoryKind::Fact).await;

	assert!(matches!(outcome, Err(Error::InvalidRequest { .. })));
}

#[tokio::test]
async fn persisted_snapshots_survive_a_restart() {
	let store = Arc::new(MemoryStore::new());
	let harness = harness_with(test_config(), store.clone()).await;
	let content = "Collects vintage fountain pens.";
	let record_id = harness
		.engine
		.record("owner-1", "agent-1", content, MemoryKind::Fact)
		.await
		.expect("record failed");

	wait_embedded(&store, record_id).await;

	// Index before persisting so the partition exists.
	harness.engine.retrieve("owner-1", "agent-1", content, 1).await;
	harness.engine.persist_index().await.expect("persist failed");

	let scope = MemoryScope::new("owner-1", "agent-1");

	assert!(store.snapshot_blob(&scope).is_some());

	let restarted = harness_with(test_config(), store.clone()).await;

	assert_eq!(restarted.engine.mode(), EngineMode::Approximate);

	let block = restarted.engine.retrieve("owner-1", "agent-1", content, 1).await;

	assert_eq!(block.items[0].record_id, record_id);
	assert!(block.items[0].similarity > 0.99);
}

#[tokio::test]
async fn corrupt_snapshot_degrades_to_linear_scan() {
	let store = Arc::new(MemoryStore::new());
	let scope = MemoryScope::new("owner-1", "agent-1");

	store.put_snapshot(&scope, b"definitely not a snapshot".to_vec(), 1);

	let harness = harness_with(test_config(), store).await;

	assert_eq!(harness.engine.mode(), EngineMode::Degraded);

	// Degraded retrieval still works end to end.
	let content = "Runs a weekly pub quiz.";
	let record_id = harness
		.engine
		.record("owner-1", "agent-1", content, MemoryKind::Fact)
		.await
		.expect("record failed");

	wait_embedded(&harness.store, record_id).await;

	let block = harness.engine.retrieve("owner-1", "agent-1", content, 1).await;

	assert_eq!(block.items[0].record_id, record_id);
}

#[tokio::test]
async fn retrieval_touches_access_exactly_once_per_call() {
	let harness = harness().await;
	let record_id = harness
		.engine
		.record("owner-1", "agent-1", "Learning to juggle.", MemoryKind::Fact)
		.await
		.expect("record failed");

	wait_embedded(&harness.store, record_id).await;

	let before = harness.store.record(record_id).unwrap().access_count;

	harness.engine.retrieve("owner-1", "agent-1", "juggling practice", 3).await;

	let after = harness.store.record(record_id).unwrap().access_count;

	assert_eq!(after, before + 1);
}
