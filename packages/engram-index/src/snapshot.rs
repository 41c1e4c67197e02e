use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
	Error, Result,
	hnsw::{HnswIndex, HnswParams, Node},
};

const SNAPSHOT_MAGIC: u32 = 0x4547_5258; // "EGRX"
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Deserialize, Serialize)]
struct SnapshotV1 {
	magic: u32,
	version: u32,
	dim: u32,
	max_links: u32,
	ef_construction: u32,
	max_layers: u32,
	entry_point: Option<u32>,
	nodes: Vec<SnapshotNode>,
}

#[derive(Deserialize, Serialize)]
struct SnapshotNode {
	record_id: Uuid,
	vector: Vec<f32>,
	layers: Vec<Vec<u32>>,
}

pub fn encode_snapshot(index: &HnswIndex) -> Result<Vec<u8>> {
	let snapshot = SnapshotV1 {
		magic: SNAPSHOT_MAGIC,
		version: SNAPSHOT_VERSION,
		dim: index.dim() as u32,
		max_links: index.params().max_links as u32,
		ef_construction: index.params().ef_construction as u32,
		max_layers: index.params().max_layers as u32,
		entry_point: index.entry_point().map(|index| index as u32),
		nodes: index
			.nodes()
			.iter()
			.map(|node| SnapshotNode {
				record_id: node.record_id,
				vector: node.vector.clone(),
				layers: node
					.layers
					.iter()
					.map(|links| links.iter().map(|&link| link as u32).collect())
					.collect(),
			})
			.collect(),
	};

	bincode::serialize(&snapshot)
		.map_err(|err| Error::Snapshot { message: format!("Failed to encode snapshot: {err}.") })
}

/// Decodes and validates a stored snapshot.
///
/// Every structural claim the blob makes is checked before the index is
/// trusted; anything off is a [`Error::Snapshot`], which the engine treats as
/// index-unavailable rather than silently serving wrong results.
pub fn decode_snapshot(bytes: &[u8], expected_dim: usize) -> Result<HnswIndex> {
	let snapshot: SnapshotV1 = bincode::deserialize(bytes)
		.map_err(|err| Error::Snapshot { message: format!("Failed to decode snapshot: {err}.") })?;

	if snapshot.magic != SNAPSHOT_MAGIC {
		return Err(Error::Snapshot { message: "Unrecognized snapshot magic.".to_string() });
	}
	if snapshot.version != SNAPSHOT_VERSION {
		return Err(Error::Snapshot {
			message: format!("Unsupported snapshot version {}.", snapshot.version),
		});
	}
	if snapshot.dim as usize != expected_dim {
		return Err(Error::Snapshot {
			message: format!(
				"Snapshot dimension {} does not match configured dimensionality {expected_dim}.",
				snapshot.dim
			),
		});
	}
	if snapshot.max_links < 2 || snapshot.max_layers == 0 {
		return Err(Error::Snapshot { message: "Snapshot parameters out of range.".to_string() });
	}

	let node_count = snapshot.nodes.len();

	match snapshot.entry_point {
		None if node_count > 0 => {
			return Err(Error::Snapshot {
				message: "Snapshot has nodes but no entry point.".to_string(),
			});
		},
		Some(entry) if entry as usize >= node_count => {
			return Err(Error::Snapshot { message: "Snapshot entry point out of bounds.".to_string() });
		},
		_ => {},
	}

	let mut nodes = Vec::with_capacity(node_count);

	for snapshot_node in snapshot.nodes {
		if snapshot_node.vector.len() != expected_dim {
			return Err(Error::Snapshot {
				message: format!("Node {} has a malformed vector.", snapshot_node.record_id),
			});
		}
		if snapshot_node.layers.is_empty()
			|| snapshot_node.layers.len() > snapshot.max_layers as usize
		{
			return Err(Error::Snapshot {
				message: format!("Node {} has a malformed layer list.", snapshot_node.record_id),
			});
		}

		let mut layers = Vec::with_capacity(snapshot_node.layers.len());

		for links in snapshot_node.layers {
			let mut decoded = Vec::with_capacity(links.len());

			for link in links {
				if link as usize >= node_count {
					return Err(Error::Snapshot {
						message: format!(
							"Node {} links outside the graph.",
							snapshot_node.record_id
						),
					});
				}

				decoded.push(link as usize);
			}

			layers.push(decoded);
		}

		nodes.push(Node { record_id: snapshot_node.record_id, vector: snapshot_node.vector, layers });
	}

	let params = HnswParams {
		max_links: snapshot.max_links as usize,
		ef_construction: snapshot.ef_construction as usize,
		max_layers: snapshot.max_layers as usize,
	};

	Ok(HnswIndex::from_parts(
		expected_dim,
		params,
		nodes,
		snapshot.entry_point.map(|index| index as usize),
	))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn seeded_index() -> HnswIndex {
		let params = HnswParams { max_links: 8, ef_construction: 32, max_layers: 6 };
		let mut index = HnswIndex::with_seed(8, params, 11);
		let mut rng = fastrand::Rng::with_seed(13);

		for _ in 0..40 {
			let vector: Vec<f32> = (0..8).map(|_| rng.f32() * 2.0 - 1.0).collect();

			index.insert(Uuid::new_v4(), vector).expect("insert failed");
		}

		index
	}

	#[test]
	fn snapshot_round_trips_search_results() {
		let index = seeded_index();
		let bytes = encode_snapshot(&index).expect("encode failed");
		let restored = decode_snapshot(&bytes, 8).expect("decode failed");
		let query = vec![0.3_f32, -0.2, 0.9, 0.1, -0.5, 0.4, 0.0, 0.7];
		let before: Vec<_> = index.search(&query, 5, 32).into_iter().map(|n| n.record_id).collect();
		let after: Vec<_> =
			restored.search(&query, 5, 32).into_iter().map(|n| n.record_id).collect();

		assert_eq!(before, after);
	}

	#[test]
	fn corrupted_magic_is_rejected() {
		let index = seeded_index();
		let mut bytes = encode_snapshot(&index).expect("encode failed");

		bytes[0] ^= 0xFF;

		assert!(matches!(decode_snapshot(&bytes, 8), Err(Error::Snapshot { .. })));
	}

	#[test]
	fn truncated_blob_is_rejected() {
		let index = seeded_index();
		let bytes = encode_snapshot(&index).expect("encode failed");

		assert!(matches!(
			decode_snapshot(&bytes[..bytes.len() / 2], 8),
			Err(Error::Snapshot { .. })
		));
	}

	#[test]
	fn dimension_mismatch_is_rejected() {
		let index = seeded_index();
		let bytes = encode_snapshot(&index).expect("encode failed");

		assert!(matches!(decode_snapshot(&bytes, 16), Err(Error::Snapshot { .. })));
	}

	#[test]
	fn empty_index_round_trips() {
		let params = HnswParams { max_links: 8, ef_construction: 32, max_layers: 6 };
		let index = HnswIndex::with_seed(8, params, 11);
		let bytes = encode_snapshot(&index).expect("encode failed");
		let restored = decode_snapshot(&bytes, 8).expect("decode failed");

		assert!(restored.is_empty());
	}
}
