//! An open-addressing hash set with quadratic probing, Robin Hood
//! displacement and tombstone deletion.
//!
//! The set never looks at the bytes of its values. Hashing and equality go
//! through a [`KeyOps`] implementation supplied by the owner, which must be
//! consistent: two values that compare equal must hash equal. An inconsistent
//! pair makes lookups return arbitrary results; this is not detected.
//!
//! Occupied entries are threaded on a doubly linked chain in insertion order.
//! The chain lives beside the slot table, so Robin Hood swaps and resizes move
//! slot contents without disturbing it.

use std::fmt;

use slab::Slab;

/// A decent small prime to use as the starting table size.
pub const DEFAULT_TABLE_SIZE: u32 = 31;

/// Table size to grow to from `current`, `None` once that no longer fits.
#[inline]
pub const fn grow_table_size(current: u32) -> Option<u32> {
    match current.checked_mul(2) {
        Some(doubled) => doubled.checked_add(1),
        None => None,
    }
}

/// Number of entries a table of `table_size` slots holds before it is grown.
#[inline]
pub const fn resize_threshold(table_size: u32) -> u32 {
    table_size / 2
}

/// Tombstones a single placement may walk past before the table is rebuilt.
#[inline]
pub const fn tombstone_limit(table_size: u32) -> u32 {
    table_size / 2
}

/// Hash function over a value and its size in bytes.
pub type HashFn<V> = fn(&V, u32) -> u32;

/// Comparator over two values and their sizes. Zero means equal.
pub type CompareFn<V> = fn(&V, u32, &V, u32) -> i32;

/// Hashing and equality for the values stored in a [`HashSet`].
pub trait KeyOps<V> {
    fn hash(&self, value: &V, size: u32) -> u32;

    fn compare(&self, a: &V, a_size: u32, b: &V, b_size: u32) -> i32;
}

/// [`KeyOps`] made of two plain functions.
pub struct FnOps<V> {
    pub hash: HashFn<V>,
    pub compare: CompareFn<V>,
}

impl<V> Clone for FnOps<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for FnOps<V> {}

impl<V> KeyOps<V> for FnOps<V> {
    #[inline]
    fn hash(&self, value: &V, size: u32) -> u32 {
        (self.hash)(value, size)
    }

    #[inline]
    fn compare(&self, a: &V, a_size: u32, b: &V, b_size: u32) -> i32 {
        (self.compare)(a, a_size, b, b_size)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    /// Never used.
    Empty,
    /// Used before, removed since. Lookups walk past it.
    Tombstone,
    /// `probes` is the 1-based position in the probe sequence of `hash`.
    Occupied { hash: u32, probes: u32, node: usize },
}

struct Node<V> {
    value: V,
    size: u32,
    hash: u32,
    prev: Option<usize>,
    next: Option<usize>,
}

enum Placement {
    Placed,
    /// Too many tombstones, or the probe sequence ran out of positions.
    Exhausted,
}

#[inline]
fn position(hash: u32, probe: u32, table_size: usize) -> usize {
    let probe = u64::from(probe);
    ((u64::from(hash) + probe * probe) % table_size as u64) as usize
}

/// Places `node` into `table`, displacing entries that have probed less.
///
/// Whatever is carried when the scan gives up is still on the order chain, so
/// a rebuild from the chain recovers it.
fn place(table: &mut [Slot], mut hash: u32, mut node: usize) -> Placement {
    let table_size = table.len();
    let limit = tombstone_limit(table_size as u32);
    let mut probes: u32 = 0;
    let mut tombstones: u32 = 0;
    let mut first_vacant: Option<(usize, u32)> = None;

    loop {
        if probes as usize >= table_size {
            // The quadratic sequence only repeats itself from here on.
            return match first_vacant {
                Some((index, at)) => {
                    table[index] = Slot::Occupied { hash, probes: at, node };
                    Placement::Placed
                }
                None => Placement::Exhausted,
            };
        }

        let index = position(hash, probes, table_size);
        probes += 1;

        match table[index] {
            Slot::Empty => {
                let (index, probes) = first_vacant.unwrap_or((index, probes));
                table[index] = Slot::Occupied { hash, probes, node };
                return Placement::Placed;
            }
            Slot::Tombstone => {
                tombstones += 1;
                if tombstones > limit {
                    return Placement::Exhausted;
                }
                if first_vacant.is_none() {
                    first_vacant = Some((index, probes));
                }
            }
            Slot::Occupied {
                hash: their_hash,
                probes: their_probes,
                node: their_node,
            } => {
                if their_probes < probes {
                    table[index] = Slot::Occupied { hash, probes, node };
                    hash = their_hash;
                    probes = their_probes;
                    node = their_node;
                    first_vacant = None;
                }
            }
        }
    }
}

/// Set of values addressed through caller-supplied hash and compare functions.
pub struct HashSet<V, O = FnOps<V>> {
    ops: O,
    table: Vec<Slot>,
    table_size: u32,
    resize_threshold: u32,
    num_entries: u32,
    nodes: Slab<Node<V>>,
    first: Option<usize>,
    last: Option<usize>,
}

impl<V> HashSet<V, FnOps<V>> {
    pub fn new(hash: HashFn<V>, compare: CompareFn<V>) -> Self {
        Self::with_table_size(DEFAULT_TABLE_SIZE, hash, compare)
    }

    pub fn with_table_size(table_size: u32, hash: HashFn<V>, compare: CompareFn<V>) -> Self {
        Self::with_ops(table_size, FnOps { hash, compare })
    }
}

impl<V, O: KeyOps<V>> HashSet<V, O> {
    /// Creates an empty set. The table itself is allocated on the first insert.
    ///
    /// # Panics
    ///
    /// Panics if `table_size` is zero.
    pub fn with_ops(table_size: u32, ops: O) -> Self {
        assert!(table_size > 0, "hash set table size must be positive");

        HashSet {
            ops,
            table: Vec::new(),
            table_size,
            resize_threshold: resize_threshold(table_size),
            num_entries: 0,
            nodes: Slab::new(),
            first: None,
            last: None,
        }
    }

    /// Inserts `value`, returning true if it was not present yet.
    ///
    /// If an equal value is already stored it is replaced by `value` and the
    /// entry count stays the same.
    pub fn insert(&mut self, value: V, size: u32) -> bool {
        if self.table.is_empty() {
            self.table = vec![Slot::Empty; self.table_size as usize];
        } else if self.num_entries > self.resize_threshold {
            self.resize();
        }

        let hash = self.ops.hash(&value, size);
        if let Some(node) = self.find_node(&value, size, hash) {
            let stored = &mut self.nodes[node];
            stored.value = value;
            stored.size = size;
            return false;
        }

        let node = self.push_node(value, size, hash);
        self.num_entries += 1;

        if let Placement::Exhausted = place(&mut self.table, hash, node) {
            log::debug!(
                "probe limit hit with {} entries in {} slots, rebuilding",
                self.num_entries,
                self.table_size
            );
            self.resize();
        }

        true
    }

    /// Returns the stored value equal to `value`.
    pub fn find(&self, value: &V, size: u32) -> Option<&V> {
        self.find_entry(value, size).map(|(value, _)| value)
    }

    /// Returns the stored value equal to `value` together with its size.
    pub fn find_entry(&self, value: &V, size: u32) -> Option<(&V, u32)> {
        if self.table.is_empty() {
            return None;
        }

        let hash = self.ops.hash(value, size);
        let node = &self.nodes[self.find_node(value, size, hash)?];
        Some((&node.value, node.size))
    }

    pub fn contains(&self, value: &V, size: u32) -> bool {
        self.find_entry(value, size).is_some()
    }

    /// Removes the value equal to `value`, leaving a tombstone in its slot.
    pub fn remove(&mut self, value: &V, size: u32) -> bool {
        if self.table.is_empty() {
            return false;
        }

        let hash = self.ops.hash(value, size);
        let index = match self.find_slot(value, size, hash) {
            Some(index) => index,
            None => return false,
        };

        if let Slot::Occupied { node, .. } = self.table[index] {
            self.unlink_node(node);
        }
        self.table[index] = Slot::Tombstone;
        self.num_entries -= 1;
        true
    }

    pub fn size(&self) -> u32 {
        self.num_entries
    }

    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    /// Number of slots the table has, or will have once it is allocated.
    pub fn table_size(&self) -> u32 {
        self.table_size
    }

    /// Iterates over the stored values and their sizes, oldest first.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            nodes: &self.nodes,
            next: self.first,
            remaining: self.num_entries as usize,
        }
    }

    fn find_slot(&self, value: &V, size: u32, hash: u32) -> Option<usize> {
        let table_size = self.table.len();

        for probe in 0..table_size as u32 {
            let index = position(hash, probe, table_size);
            match self.table[index] {
                Slot::Empty => return None,
                Slot::Tombstone => continue,
                Slot::Occupied {
                    hash: their_hash,
                    node,
                    ..
                } => {
                    if their_hash == hash {
                        let stored = &self.nodes[node];
                        if self.ops.compare(value, size, &stored.value, stored.size) == 0 {
                            return Some(index);
                        }
                    }
                }
            }
        }

        None
    }

    fn find_node(&self, value: &V, size: u32, hash: u32) -> Option<usize> {
        match self.table[self.find_slot(value, size, hash)?] {
            Slot::Occupied { node, .. } => Some(node),
            _ => None,
        }
    }

    fn push_node(&mut self, value: V, size: u32, hash: u32) -> usize {
        let prev = self.last;
        let node = self.nodes.insert(Node {
            value,
            size,
            hash,
            prev,
            next: None,
        });

        match prev {
            Some(prev) => self.nodes[prev].next = Some(node),
            None => self.first = Some(node),
        }
        self.last = Some(node);
        node
    }

    fn unlink_node(&mut self, node: usize) {
        let Node { prev, next, .. } = self.nodes.remove(node);

        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.first = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.last = prev,
        }
    }

    /// Rebuilds the table with `2n + 1` slots by walking the order chain.
    ///
    /// A fresh table holds no tombstones, so a rebuild can only come up short
    /// when some hash's probe sequence covers too few slots. That grows again.
    fn resize(&mut self) {
        let mut new_size = self.table_size;

        'grow: loop {
            new_size = match grow_table_size(new_size) {
                Some(grown) => grown,
                None => panic!("hash set table size overflow past {}", new_size),
            };

            let mut table = vec![Slot::Empty; new_size as usize];
            let mut cursor = self.first;
            while let Some(node) = cursor {
                let stored = &self.nodes[node];
                if let Placement::Exhausted = place(&mut table, stored.hash, node) {
                    continue 'grow;
                }
                cursor = stored.next;
            }

            log::debug!(
                "resized hash set from {} to {} slots ({} entries)",
                self.table_size,
                new_size,
                self.num_entries
            );

            self.table = table;
            self.table_size = new_size;
            self.resize_threshold = resize_threshold(new_size);
            return;
        }
    }
}

impl<V: fmt::Debug, O> fmt::Debug for HashSet<V, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = Iter {
            nodes: &self.nodes,
            next: self.first,
            remaining: self.num_entries as usize,
        };
        f.debug_set().entries(entries.map(|(value, _)| value)).finish()
    }
}

impl<'a, V, O: KeyOps<V>> IntoIterator for &'a HashSet<V, O> {
    type Item = (&'a V, u32);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Iter<'a, V> {
        self.iter()
    }
}

/// Iterator over a [`HashSet`] in insertion order.
pub struct Iter<'a, V> {
    nodes: &'a Slab<Node<V>>,
    next: Option<usize>,
    remaining: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a V, u32);

    fn next(&mut self) -> Option<Self::Item> {
        let node = &self.nodes[self.next?];
        self.next = node.next;
        self.remaining -= 1;
        Some((&node.value, node.size))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, V> ExactSizeIterator for Iter<'a, V> {}
