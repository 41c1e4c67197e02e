use std::{collections::HashMap, hash::Hash};

const NIL: usize = usize::MAX;

struct Slot<K, V> {
	payload: Option<(K, V)>,
	prev: usize,
	next: usize,
}

/// Capacity-bounded LRU over a slot arena.
///
/// Eviction only ever removes the arena tail, and only when the map is at
/// capacity, so evicting a key that does not exist is impossible by
/// construction. Not internally synchronized; callers guard structural
/// mutation with their own lock.
pub struct LruCache<K, V> {
	capacity: usize,
	map: HashMap<K, usize, ahash::RandomState>,
	slots: Vec<Slot<K, V>>,
	free: Vec<usize>,
	head: usize,
	tail: usize,
}
impl<K, V> LruCache<K, V>
where
	K: Clone + Eq + Hash,
{
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity,
			map: HashMap::with_capacity_and_hasher(capacity, ahash::RandomState::new()),
			slots: Vec::with_capacity(capacity),
			free: Vec::new(),
			head: NIL,
			tail: NIL,
		}
	}

	pub fn len(&self) -> usize {
		self.map.len()
	}

	pub fn is_empty(&self) -> bool {
		self.map.is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Reads without touching recency.
	pub fn peek(&self, key: &K) -> Option<&V> {
		let &index = self.map.get(key)?;

		self.slots[index].payload.as_ref().map(|(_, value)| value)
	}

	/// Marks the key most recently used.
	pub fn touch(&mut self, key: &K) -> bool {
		let Some(&index) = self.map.get(key) else {
			return false;
		};

		self.detach(index);
		self.attach_front(index);

		true
	}

	pub fn get(&mut self, key: &K) -> Option<&V> {
		let &index = self.map.get(key)?;

		self.detach(index);
		self.attach_front(index);

		self.slots[index].payload.as_ref().map(|(_, value)| value)
	}

	/// Inserts as most recently used. Eviction of the least-recently-used entry
	/// and insertion of the new one happen as one operation; the evicted pair is
	/// returned so callers can spill it to a slower tier.
	pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
		if self.capacity == 0 {
			// Degenerate cache stores nothing; hand the pair straight back.
			return Some((key, value));
		}

		if let Some(&index) = self.map.get(&key) {
			self.slots[index].payload = Some((key, value));
			self.detach(index);
			self.attach_front(index);

			return None;
		}

		let evicted = if self.map.len() >= self.capacity { self.evict_tail() } else { None };
		let index = match self.free.pop() {
			Some(index) => {
				self.slots[index].payload = Some((key.clone(), value));

				index
			},
			None => {
				self.slots.push(Slot { payload: Some((key.clone(), value)), prev: NIL, next: NIL });

				self.slots.len() - 1
			},
		};

		self.map.insert(key, index);
		self.attach_front(index);

		evicted
	}

	pub fn remove(&mut self, key: &K) -> Option<V> {
		let index = self.map.remove(key)?;

		self.detach(index);
		self.free.push(index);

		self.slots[index].payload.take().map(|(_, value)| value)
	}

	pub fn retain<F>(&mut self, mut keep: F)
	where
		F: FnMut(&K, &V) -> bool,
	{
		let mut cursor = self.head;
		let mut doomed = Vec::new();

		while cursor != NIL {
			let slot = &self.slots[cursor];

			if let Some((key, value)) = slot.payload.as_ref()
				&& !keep(key, value)
			{
				doomed.push(key.clone());
			}

			cursor = slot.next;
		}

		for key in doomed {
			self.remove(&key);
		}
	}

	fn evict_tail(&mut self) -> Option<(K, V)> {
		let tail = self.tail;

		if tail == NIL {
			return None;
		}

		self.detach(tail);
		self.free.push(tail);

		let (key, value) = self.slots[tail].payload.take()?;

		self.map.remove(&key);

		Some((key, value))
	}

	fn detach(&mut self, index: usize) {
		let (prev, next) = (self.slots[index].prev, self.slots[index].next);

		if prev != NIL {
			self.slots[prev].next = next;
		} else if self.head == index {
			self.head = next;
		}
		if next != NIL {
			self.slots[next].prev = prev;
		} else if self.tail == index {
			self.tail = prev;
		}

		self.slots[index].prev = NIL;
		self.slots[index].next = NIL;
	}

	fn attach_front(&mut self, index: usize) {
		self.slots[index].prev = NIL;
		self.slots[index].next = self.head;

		if self.head != NIL {
			self.slots[self.head].prev = index;
		}

		self.head = index;

		if self.tail == NIL {
			self.tail = index;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn size_never_exceeds_capacity() {
		let mut cache = LruCache::new(3);

		for index in 0..10_u32 {
			cache.insert(index, index);

			assert!(cache.len() <= 3);
		}
	}

	#[test]
	fn eviction_removes_exactly_the_least_recently_used_key() {
		let mut cache = LruCache::new(3);

		cache.insert("a", 1);
		cache.insert("b", 2);
		cache.insert("c", 3);

		// Touching "a" leaves "b" as the LRU entry.
		assert_eq!(cache.get(&"a"), Some(&1));

		let evicted = cache.insert("d", 4);

		assert_eq!(evicted, Some(("b", 2)));
		assert_eq!(cache.peek(&"a"), Some(&1));
		assert_eq!(cache.peek(&"c"), Some(&3));
		assert_eq!(cache.peek(&"d"), Some(&4));
	}

	#[test]
	fn reinserting_an_existing_key_replaces_without_eviction() {
		let mut cache = LruCache::new(2);

		cache.insert("a", 1);
		cache.insert("b", 2);

		assert_eq!(cache.insert("a", 10), None);
		assert_eq!(cache.len(), 2);
		assert_eq!(cache.peek(&"a"), Some(&10));
	}

	#[test]
	fn degenerate_capacity_stores_nothing_and_never_panics() {
		let mut cache = LruCache::new(0);

		assert_eq!(cache.insert("a", 1), Some(("a", 1)));
		assert_eq!(cache.len(), 0);
		assert_eq!(cache.remove(&"a"), None);
	}

	#[test]
	fn remove_and_reuse_keeps_the_chain_consistent() {
		let mut cache = LruCache::new(3);

		cache.insert("a", 1);
		cache.insert("b", 2);
		cache.insert("c", 3);

		assert_eq!(cache.remove(&"b"), Some(2));
		assert_eq!(cache.len(), 2);

		cache.insert("d", 4);
		cache.insert("e", 5);

		assert_eq!(cache.len(), 3);
		assert_eq!(cache.peek(&"a"), None);
		assert_eq!(cache.peek(&"c"), Some(&3));
	}

	#[test]
	fn retain_drops_only_non_matching_entries() {
		let mut cache = LruCache::new(4);

		for index in 0..4_u32 {
			cache.insert(index, index);
		}

		cache.retain(|_, value| value % 2 == 0);

		assert_eq!(cache.len(), 2);
		assert_eq!(cache.peek(&0), Some(&0));
		assert_eq!(cache.peek(&1), None);
		assert_eq!(cache.peek(&2), Some(&2));
	}
}
