use crate::MemoryScope;

const FINGERPRINT_SCHEMA_VERSION: u32 = 1;

/// Deterministic hash of (owner, agent, query, k) used as the retrieval cache key.
pub type Fingerprint = String;

pub fn query_fingerprint(scope: &MemoryScope, query: &str, k: usize) -> Fingerprint {
	let mut hasher = blake3::Hasher::new();

	hash_field(&mut hasher, &FINGERPRINT_SCHEMA_VERSION.to_le_bytes());
	hash_field(&mut hasher, scope.owner_id.as_bytes());
	hash_field(&mut hasher, scope.agent_id.as_bytes());
	hash_field(&mut hasher, query.trim().as_bytes());
	hash_field(&mut hasher, &(k as u64).to_le_bytes());

	hasher.finalize().to_hex().to_string()
}

// Length-prefixed so adjacent fields can never collide by concatenation.
fn hash_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
	hasher.update(&(bytes.len() as u64).to_le_bytes());
	hasher.update(bytes);
}

#[cfg(test)]
mod tests {
	use super::*;

	fn scope() -> MemoryScope {
		MemoryScope::new("owner-1", "agent-1")
	}

	#[test]
	fn identical_inputs_produce_identical_fingerprints() {
		assert_eq!(
			query_fingerprint(&scope(), "favorite drink", 5),
			query_fingerprint(&scope(), "favorite drink", 5),
		);
	}

	#[test]
	fn query_is_trimmed_before_hashing() {
		assert_eq!(
			query_fingerprint(&scope(), "  favorite drink  ", 5),
			query_fingerprint(&scope(), "favorite drink", 5),
		);
	}

	#[test]
	fn scope_query_and_k_all_discriminate() {
		let base = query_fingerprint(&scope(), "favorite drink", 5);

		assert_ne!(base, query_fingerprint(&MemoryScope::new("owner-2", "agent-1"), "favorite drink", 5));
		assert_ne!(base, query_fingerprint(&MemoryScope::new("owner-1", "agent-2"), "favorite drink", 5));
		assert_ne!(base, query_fingerprint(&scope(), "favorite meal", 5));
		assert_ne!(base, query_fingerprint(&scope(), "favorite drink", 6));
	}

	#[test]
	fn field_boundaries_do_not_collide() {
		let a = query_fingerprint(&MemoryScope::new("ab", "c"), "q", 1);
		let b = query_fingerprint(&MemoryScope::new("a", "bc"), "q", 1);

		assert_ne!(a, b);
	}
}
