use std::collections::{BinaryHeap, HashMap, HashSet};

use uuid::Uuid;

use crate::{Error, Neighbor, Result};
use engram_domain::normalized;

#[derive(Clone, Copy, Debug)]
pub struct HnswParams {
	/// Neighbors kept per node and layer (`2 * max_links` at layer zero).
	pub max_links: usize,
	/// Beam width while wiring a new node.
	pub ef_construction: usize,
	pub max_layers: usize,
}
impl From<&engram_config::Index> for HnswParams {
	fn from(cfg: &engram_config::Index) -> Self {
		Self {
			max_links: cfg.max_links as usize,
			ef_construction: cfg.ef_construction as usize,
			max_layers: cfg.max_layers as usize,
		}
	}
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
	pub record_id: Uuid,
	pub vector: Vec<f32>,
	/// Adjacency per layer; `layers.len() - 1` is the node's top layer.
	pub layers: Vec<Vec<usize>>,
}

/// Graph-based approximate nearest-neighbor index over normalized embeddings.
///
/// Layer assignment is geometric (`mL = 1 / ln(M)`), searches descend greedily
/// from the entry point and widen to a beam of `ef` at the target layer.
/// Vectors are normalized on insert, so similarity is a plain dot product.
pub struct HnswIndex {
	dim: usize,
	params: HnswParams,
	level_scale: f64,
	nodes: Vec<Node>,
	by_record: HashMap<Uuid, usize>,
	entry_point: Option<usize>,
	rng: fastrand::Rng,
}
impl HnswIndex {
	pub fn new(dim: usize, params: HnswParams) -> Self {
		Self::with_seed(dim, params, fastrand::u64(..))
	}

	pub fn with_seed(dim: usize, params: HnswParams, seed: u64) -> Self {
		Self {
			dim,
			params,
			level_scale: 1.0 / (params.max_links.max(2) as f64).ln(),
			nodes: Vec::new(),
			by_record: HashMap::new(),
			entry_point: None,
			rng: fastrand::Rng::with_seed(seed),
		}
	}

	pub fn dim(&self) -> usize {
		self.dim
	}

	pub fn params(&self) -> HnswParams {
		self.params
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	pub fn contains(&self, record_id: Uuid) -> bool {
		self.by_record.contains_key(&record_id)
	}

	/// Inserts a node with full multi-layer adjacency.
	///
	/// Every fallible check runs before the first structural mutation, so a
	/// failed insert leaves the graph exactly as it was; a record either has
	/// full adjacency or is absent.
	pub fn insert(&mut self, record_id: Uuid, vector: Vec<f32>) -> Result<()> {
		if vector.len() != self.dim {
			return Err(Error::DimensionMismatch { expected: self.dim, actual: vector.len() });
		}
		if self.by_record.contains_key(&record_id) {
			return Err(Error::DuplicateRecord { record_id });
		}
		if !vector.iter().all(|value| value.is_finite())
			|| vector.iter().all(|value| *value == 0.0)
		{
			return Err(Error::InvalidVector);
		}

		let vector = normalized(vector);
		let level = self.sample_level();
		let new_index = self.nodes.len();

		self.nodes.push(Node {
			record_id,
			vector: vector.clone(),
			layers: vec![Vec::new(); level + 1],
		});
		self.by_record.insert(record_id, new_index);

		let Some(entry) = self.entry_point else {
			self.entry_point = Some(new_index);

			return Ok(());
		};

		let top = self.nodes[entry].layers.len() - 1;
		let mut current = entry;

		// Greedy descent through layers above the new node's level.
		for layer in ((level + 1)..=top).rev() {
			current = self.greedy_closest(&vector, current, layer);
		}

		for layer in (0..=level.min(top)).rev() {
			let candidates =
				self.search_layer(&vector, current, self.params.ef_construction, layer);
			let cap = self.layer_cap(layer);
			let chosen: Vec<usize> =
				candidates.iter().take(cap).map(|candidate| candidate.index).collect();

			for &neighbor in &chosen {
				self.nodes[new_index].layers[layer].push(neighbor);
				self.nodes[neighbor].layers[layer].push(new_index);
				self.prune_links(neighbor, layer);
			}

			if let Some(closest) = chosen.first() {
				current = *closest;
			}
		}

		if level > top {
			self.entry_point = Some(new_index);
		}

		Ok(())
	}

	pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Vec<Neighbor> {
		let Some(entry) = self.entry_point else {
			return Vec::new();
		};

		if query.len() != self.dim || k == 0 {
			return Vec::new();
		}

		let query = normalized(query.to_vec());
		let top = self.nodes[entry].layers.len() - 1;
		let mut current = entry;

		for layer in (1..=top).rev() {
			current = self.greedy_closest(&query, current, layer);
		}

		let beam = ef.max(k);
		let candidates = self.search_layer(&query, current, beam, 0);

		candidates
			.into_iter()
			.take(k)
			.map(|candidate| Neighbor {
				record_id: self.nodes[candidate.index].record_id,
				similarity: 1.0 - candidate.distance,
			})
			.collect()
	}

	pub(crate) fn from_parts(
		dim: usize,
		params: HnswParams,
		nodes: Vec<Node>,
		entry_point: Option<usize>,
	) -> Self {
		let by_record =
			nodes.iter().enumerate().map(|(index, node)| (node.record_id, index)).collect();

		Self {
			dim,
			params,
			level_scale: 1.0 / (params.max_links.max(2) as f64).ln(),
			nodes,
			by_record,
			entry_point,
			rng: fastrand::Rng::with_seed(fastrand::u64(..)),
		}
	}

	pub(crate) fn nodes(&self) -> &[Node] {
		&self.nodes
	}

	pub(crate) fn entry_point(&self) -> Option<usize> {
		self.entry_point
	}

	fn sample_level(&mut self) -> usize {
		let uniform: f64 = loop {
			let value = self.rng.f64();

			if value > 0.0 {
				break value;
			}
		};
		let level = (-uniform.ln() * self.level_scale).floor() as usize;

		level.min(self.params.max_layers - 1)
	}

	fn layer_cap(&self, layer: usize) -> usize {
		if layer == 0 { self.params.max_links * 2 } else { self.params.max_links }
	}

	fn distance(&self, query: &[f32], index: usize) -> f32 {
		let mut dot = 0.0_f32;

		for (a, b) in query.iter().zip(self.nodes[index].vector.iter()) {
			dot += a * b;
		}

		1.0 - dot
	}

	fn greedy_closest(&self, query: &[f32], start: usize, layer: usize) -> usize {
		let mut current = start;
		let mut best = self.distance(query, current);

		loop {
			let mut improved = false;

			if layer < self.nodes[current].layers.len() {
				for &neighbor in &self.nodes[current].layers[layer] {
					let dist = self.distance(query, neighbor);

					if dist < best {
						best = dist;
						current = neighbor;
						improved = true;
					}
				}
			}

			if !improved {
				return current;
			}
		}
	}

	/// Best-first beam search within one layer; results sorted closest first.
	fn search_layer(
		&self,
		query: &[f32],
		entry: usize,
		ef: usize,
		layer: usize,
	) -> Vec<Candidate> {
		let ef = ef.max(1);
		let entry_distance = self.distance(query, entry);
		let mut visited: HashSet<usize> = HashSet::from([entry]);
		// Min-heap of frontier candidates, max-heap of current best `ef`.
		let mut frontier = BinaryHeap::from([std::cmp::Reverse(Candidate {
			distance: entry_distance,
			index: entry,
		})]);
		let mut best = BinaryHeap::from([Candidate { distance: entry_distance, index: entry }]);

		while let Some(std::cmp::Reverse(closest)) = frontier.pop() {
			let worst_kept = best.peek().map(|candidate| candidate.distance).unwrap_or(f32::MAX);

			if closest.distance > worst_kept && best.len() >= ef {
				break;
			}
			if layer >= self.nodes[closest.index].layers.len() {
				continue;
			}

			for &neighbor in &self.nodes[closest.index].layers[layer] {
				if !visited.insert(neighbor) {
					continue;
				}

				let distance = self.distance(query, neighbor);
				let worst_kept =
					best.peek().map(|candidate| candidate.distance).unwrap_or(f32::MAX);

				if best.len() < ef || distance < worst_kept {
					frontier.push(std::cmp::Reverse(Candidate { distance, index: neighbor }));
					best.push(Candidate { distance, index: neighbor });

					if best.len() > ef {
						best.pop();
					}
				}
			}
		}

		let mut out = best.into_vec();

		out.sort();

		out
	}

	fn prune_links(&mut self, index: usize, layer: usize) {
		let cap = self.layer_cap(layer);
		let links = &self.nodes[index].layers[layer];

		if links.len() <= cap {
			return;
		}

		let vector = self.nodes[index].vector.clone();
		let mut ranked: Vec<Candidate> = self.nodes[index].layers[layer]
			.iter()
			.map(|&neighbor| Candidate { distance: self.distance(&vector, neighbor), index: neighbor })
			.collect();

		ranked.sort();
		ranked.truncate(cap);

		self.nodes[index].layers[layer] = ranked.into_iter().map(|candidate| candidate.index).collect();
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Candidate {
	pub distance: f32,
	pub index: usize,
}
impl Eq for Candidate {}
impl Ord for Candidate {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.distance
			.total_cmp(&other.distance)
			.then_with(|| self.index.cmp(&other.index))
	}
}
impl PartialOrd for Candidate {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}
