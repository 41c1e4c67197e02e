use std::{
	collections::{BinaryHeap, HashMap},
	sync::RwLock,
};

use uuid::Uuid;

use crate::{Error, Neighbor, Result};
use engram_domain::{MemoryScope, cosine_similarity};

/// Exact cosine top-k scan, used while the approximate index is unavailable.
///
/// `O(n)` per query but always correct; exposes the same insert/search shape as
/// the approximate engine so the orchestrator does not care which one answers.
pub struct LinearScanPool {
	dim: usize,
	partitions: RwLock<HashMap<MemoryScope, Vec<(Uuid, Vec<f32>)>>>,
}
impl LinearScanPool {
	pub fn new(dim: usize) -> Self {
		Self { dim, partitions: RwLock::new(HashMap::new()) }
	}

	pub fn has_partition(&self, scope: &MemoryScope) -> bool {
		let partitions = self.partitions.read().unwrap_or_else(|err| err.into_inner());

		partitions.contains_key(scope)
	}

	pub fn len(&self, scope: &MemoryScope) -> usize {
		let partitions = self.partitions.read().unwrap_or_else(|err| err.into_inner());

		partitions.get(scope).map(Vec::len).unwrap_or(0)
	}

	/// Creates the partition if needed, even when the scope has no embedded
	/// records yet.
	pub fn ensure_partition(&self, scope: &MemoryScope) {
		let mut partitions = self.partitions.write().unwrap_or_else(|err| err.into_inner());

		partitions.entry(scope.clone()).or_default();
	}

	pub fn insert(&self, scope: &MemoryScope, record_id: Uuid, vector: Vec<f32>) -> Result<()> {
		if vector.len() != self.dim {
			return Err(Error::DimensionMismatch { expected: self.dim, actual: vector.len() });
		}

		let mut partitions = self.partitions.write().unwrap_or_else(|err| err.into_inner());
		let pool = partitions.entry(scope.clone()).or_default();

		if let Some(existing) = pool.iter_mut().find(|(id, _)| *id == record_id) {
			existing.1 = vector;
		} else {
			pool.push((record_id, vector));
		}

		Ok(())
	}

	pub fn search(&self, scope: &MemoryScope, query: &[f32], k: usize) -> Vec<Neighbor> {
		if k == 0 || query.len() != self.dim {
			return Vec::new();
		}

		let partitions = self.partitions.read().unwrap_or_else(|err| err.into_inner());
		let Some(pool) = partitions.get(scope) else {
			return Vec::new();
		};
		let mut heap: BinaryHeap<std::cmp::Reverse<Scored>> = BinaryHeap::with_capacity(k + 1);

		for (record_id, vector) in pool {
			let similarity = cosine_similarity(query, vector);

			heap.push(std::cmp::Reverse(Scored { similarity, record_id: *record_id }));

			if heap.len() > k {
				heap.pop();
			}
		}

		let mut out: Vec<Neighbor> = heap
			.into_iter()
			.map(|std::cmp::Reverse(scored)| Neighbor {
				record_id: scored.record_id,
				similarity: scored.similarity,
			})
			.collect();

		out.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

		out
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Scored {
	similarity: f32,
	record_id: Uuid,
}
impl Eq for Scored {}
impl Ord for Scored {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.similarity
			.total_cmp(&other.similarity)
			.then_with(|| self.record_id.cmp(&other.record_id))
	}
}
impl PartialOrd for Scored {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}
