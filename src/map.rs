// lutra-core - Persistent hash map (hash array mapped trie)
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Immutable, structurally-shared hash map.
//!
//! The trie consumes the key's 32-bit hash five bits per level. Interior
//! nodes come in three shapes: a compact bitmap node holding up to sixteen
//! entries, a full 32-way array node once a bitmap node would overflow, and
//! a collision node for keys sharing an identical full hash. Updates
//! path-copy from the root; unchanged subtrees are shared between versions,
//! and no-op updates return the original map (checked by node identity and
//! by value identity at the leaf).

use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::value::{hash_value, Value};

const BITS: u32 = 5;
const LEVEL_MASK: u32 = 0x1f;
/// A bitmap node past this many live entries converts to an array node.
const MAX_BITMAP_ENTRIES: u32 = 16;
/// An array node at or below this many live children packs back down.
const MIN_ARRAY_CHILDREN: u32 = 8;

fn mask(hash: u32, shift: u32) -> u32 {
    (hash >> shift) & LEVEL_MASK
}

fn bitpos(hash: u32, shift: u32) -> u32 {
    1 << mask(hash, shift)
}

/// One slot of a bitmap node: either an inline key/value pair or a subnode.
#[derive(Clone)]
enum Entry {
    Pair(Value, Value),
    Node(Rc<Node>),
}

enum Node {
    Bitmap {
        bitmap: u32,
        entries: Vec<Entry>,
    },
    Array {
        /// Live (non-empty) children.
        count: u32,
        children: Box<[Option<Rc<Node>>; 32]>,
    },
    Collision {
        hash: u32,
        pairs: Vec<(Value, Value)>,
    },
}

fn empty_node() -> Rc<Node> {
    Rc::new(Node::Bitmap {
        bitmap: 0,
        entries: Vec::new(),
    })
}

/// Slot index of `bit` within a bitmap: the popcount of the bits below it.
fn slot_index(bitmap: u32, bit: u32) -> usize {
    (bitmap & (bit - 1)).count_ones() as usize
}

/// An immutable hash map with structural sharing.
#[derive(Clone)]
pub struct PersistentMap {
    root: Option<Rc<Node>>,
    count: usize,
    meta: Option<Rc<Value>>,
}

impl PersistentMap {
    /// The empty map.
    #[must_use]
    pub fn new() -> Self {
        PersistentMap {
            root: None,
            count: 0,
            meta: None,
        }
    }

    /// Build a map from an even-length flat key/value sequence.
    pub fn from_entries(entries: &[Value]) -> Result<Self> {
        if entries.len() % 2 != 0 {
            return Err(Error::invalid_argument(
                "hashmap requires an even number of arguments",
            ));
        }
        let mut acc = PersistentMap::new();
        for pair in entries.chunks_exact(2) {
            acc = acc.assoc(pair[0].clone(), pair[1].clone());
        }
        Ok(acc)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// A new map with `key` mapped to `val`. Returns `self` unchanged when
    /// the key already maps to an identical value.
    #[must_use]
    pub fn assoc(&self, key: Value, val: Value) -> PersistentMap {
        let hash = hash_value(&key);
        let mut added = false;
        let start = self.root.clone().unwrap_or_else(empty_node);
        let new_root = node_assoc(&start, 0, hash, key, val, &mut added);
        if let Some(root) = &self.root {
            if Rc::ptr_eq(&new_root, root) {
                return self.clone();
            }
        }
        PersistentMap {
            root: Some(new_root),
            count: if added { self.count + 1 } else { self.count },
            meta: self.meta.clone(),
        }
    }

    /// A new map without `key`. Returns `self` unchanged when the key is
    /// absent.
    #[must_use]
    pub fn without(&self, key: &Value) -> PersistentMap {
        let Some(root) = &self.root else {
            return self.clone();
        };
        let hash = hash_value(key);
        match node_without(root, 0, hash, key) {
            Some(n) if Rc::ptr_eq(&n, root) => self.clone(),
            new_root => PersistentMap {
                root: new_root,
                count: self.count - 1,
                meta: self.meta.clone(),
            },
        }
    }

    /// Look up `key`, returning `not_found` when absent.
    #[must_use]
    pub fn val_at(&self, key: &Value, not_found: Value) -> Value {
        self.get(key).cloned().unwrap_or(not_found)
    }

    #[must_use]
    pub fn get(&self, key: &Value) -> Option<&Value> {
        let root = self.root.as_deref()?;
        node_find(root, 0, hash_value(key), key)
    }

    #[must_use]
    pub fn contains(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Depth-first fold over the entries in slot order. `f` receives
    /// `(acc, key, value)`; returning a [`Value::Reduced`] terminates the
    /// fold early, and the final result is unwrapped.
    pub fn reduce<F>(&self, mut f: F, init: Value) -> Result<Value>
    where
        F: FnMut(Value, Value, Value) -> Result<Value>,
    {
        match &self.root {
            None => Ok(init),
            Some(root) => Ok(node_reduce(root, &mut f, init)?.unwrap_reduced()),
        }
    }

    /// Internal iteration over entries; no early exit.
    pub(crate) fn for_each(&self, f: &mut impl FnMut(&Value, &Value)) {
        if let Some(root) = &self.root {
            node_each(root, f);
        }
    }

    #[must_use]
    pub fn with_meta(&self, meta: Value) -> PersistentMap {
        PersistentMap {
            root: self.root.clone(),
            count: self.count,
            meta: Some(Rc::new(meta)),
        }
    }

    #[must_use]
    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_deref()
    }

    /// Identity check: same root node (and therefore the same version).
    #[must_use]
    pub fn same_root(&self, other: &PersistentMap) -> bool {
        match (&self.root, &other.root) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Order-independent entry hash, consistent with content equality.
    #[must_use]
    pub fn hash_unordered(&self) -> u32 {
        let mut h: u32 = 0;
        self.for_each(&mut |k, v| {
            h = h.wrapping_add(hash_value(k) ^ hash_value(v));
        });
        h
    }

    #[cfg(test)]
    fn root_shape(&self) -> &'static str {
        match self.root.as_deref() {
            None => "empty",
            Some(Node::Bitmap { .. }) => "bitmap",
            Some(Node::Array { .. }) => "array",
            Some(Node::Collision { .. }) => "collision",
        }
    }
}

impl Default for PersistentMap {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for PersistentMap {
    fn eq(&self, other: &Self) -> bool {
        if self.count != other.count {
            return false;
        }
        if self.same_root(other) {
            return true;
        }
        let mut equal = true;
        self.for_each(&mut |k, v| {
            if equal {
                equal = other.get(k) == Some(v);
            }
        });
        equal
    }
}

impl Eq for PersistentMap {}

impl fmt::Display for PersistentMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        let mut result = Ok(());
        self.for_each(&mut |k, v| {
            if result.is_err() {
                return;
            }
            if !first {
                result = write!(f, ", ");
            }
            first = false;
            if result.is_ok() {
                result = write!(f, "{} {}", k, v);
            }
        });
        result?;
        write!(f, "}}")
    }
}

impl fmt::Debug for PersistentMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

fn node_assoc(
    node: &Rc<Node>,
    shift: u32,
    hash: u32,
    key: Value,
    val: Value,
    added: &mut bool,
) -> Rc<Node> {
    match node.as_ref() {
        Node::Bitmap { bitmap, entries } => {
            let bit = bitpos(hash, shift);
            let idx = slot_index(*bitmap, bit);
            if bitmap & bit != 0 {
                match &entries[idx] {
                    Entry::Node(child) => {
                        let n = node_assoc(child, shift + BITS, hash, key, val, added);
                        if Rc::ptr_eq(&n, child) {
                            return node.clone();
                        }
                        let mut new_entries = entries.clone();
                        new_entries[idx] = Entry::Node(n);
                        Rc::new(Node::Bitmap {
                            bitmap: *bitmap,
                            entries: new_entries,
                        })
                    }
                    Entry::Pair(k, v) => {
                        if *k == key {
                            if v.identical(&val) {
                                return node.clone();
                            }
                            let mut new_entries = entries.clone();
                            new_entries[idx] = Entry::Pair(k.clone(), val);
                            Rc::new(Node::Bitmap {
                                bitmap: *bitmap,
                                entries: new_entries,
                            })
                        } else {
                            // Two distinct keys landed in one slot: push both
                            // down a level (or into a collision node).
                            *added = true;
                            let sub =
                                join_entries(shift + BITS, k.clone(), v.clone(), hash, key, val);
                            let mut new_entries = entries.clone();
                            new_entries[idx] = Entry::Node(sub);
                            Rc::new(Node::Bitmap {
                                bitmap: *bitmap,
                                entries: new_entries,
                            })
                        }
                    }
                }
            } else {
                let live = bitmap.count_ones();
                if live >= MAX_BITMAP_ENTRIES {
                    // Promote to a full array node. Inline pairs fan out one
                    // level deeper; subnodes carry over at their index.
                    let mut children: Box<[Option<Rc<Node>>; 32]> =
                        Box::new(std::array::from_fn(|_| None));
                    let jdx = mask(hash, shift) as usize;
                    children[jdx] =
                        Some(node_assoc(&empty_node(), shift + BITS, hash, key, val, added));
                    let mut j = 0;
                    for (i, slot) in children.iter_mut().enumerate() {
                        if (bitmap >> i) & 1 != 0 {
                            *slot = Some(match &entries[j] {
                                Entry::Node(child) => child.clone(),
                                Entry::Pair(k, v) => {
                                    let mut reinserted = false;
                                    node_assoc(
                                        &empty_node(),
                                        shift + BITS,
                                        hash_value(k),
                                        k.clone(),
                                        v.clone(),
                                        &mut reinserted,
                                    )
                                }
                            });
                            j += 1;
                        }
                    }
                    Rc::new(Node::Array {
                        count: live + 1,
                        children,
                    })
                } else {
                    *added = true;
                    let mut new_entries = entries.clone();
                    new_entries.insert(idx, Entry::Pair(key, val));
                    Rc::new(Node::Bitmap {
                        bitmap: bitmap | bit,
                        entries: new_entries,
                    })
                }
            }
        }
        Node::Array { count, children } => {
            let idx = mask(hash, shift) as usize;
            match &children[idx] {
                None => {
                    let mut new_children = children.clone();
                    new_children[idx] =
                        Some(node_assoc(&empty_node(), shift + BITS, hash, key, val, added));
                    Rc::new(Node::Array {
                        count: count + 1,
                        children: new_children,
                    })
                }
                Some(child) => {
                    let n = node_assoc(child, shift + BITS, hash, key, val, added);
                    if Rc::ptr_eq(&n, child) {
                        return node.clone();
                    }
                    let mut new_children = children.clone();
                    new_children[idx] = Some(n);
                    Rc::new(Node::Array {
                        count: *count,
                        children: new_children,
                    })
                }
            }
        }
        Node::Collision {
            hash: node_hash,
            pairs,
        } => {
            if hash == *node_hash {
                if let Some(i) = pairs.iter().position(|(k, _)| *k == key) {
                    if pairs[i].1.identical(&val) {
                        return node.clone();
                    }
                    let mut new_pairs = pairs.clone();
                    new_pairs[i].1 = val;
                    Rc::new(Node::Collision {
                        hash: *node_hash,
                        pairs: new_pairs,
                    })
                } else {
                    *added = true;
                    let mut new_pairs = pairs.clone();
                    new_pairs.push((key, val));
                    Rc::new(Node::Collision {
                        hash: *node_hash,
                        pairs: new_pairs,
                    })
                }
            } else {
                // Different full hash: demote into a one-entry bitmap
                // wrapper and reinsert through the normal path.
                let wrapper = Rc::new(Node::Bitmap {
                    bitmap: bitpos(*node_hash, shift),
                    entries: vec![Entry::Node(node.clone())],
                });
                node_assoc(&wrapper, shift, hash, key, val, added)
            }
        }
    }
}

/// Build the subnode joining two entries whose slots collided at the parent
/// level: a collision node when their full hashes match, otherwise a bitmap
/// node fanned out by reinsertion.
fn join_entries(shift: u32, k1: Value, v1: Value, h2: u32, k2: Value, v2: Value) -> Rc<Node> {
    let h1 = hash_value(&k1);
    if h1 == h2 {
        return Rc::new(Node::Collision {
            hash: h1,
            pairs: vec![(k1, v1), (k2, v2)],
        });
    }
    let mut added = false;
    let n = node_assoc(&empty_node(), shift, h1, k1, v1, &mut added);
    node_assoc(&n, shift, h2, k2, v2, &mut added)
}

fn node_find<'a>(node: &'a Node, shift: u32, hash: u32, key: &Value) -> Option<&'a Value> {
    match node {
        Node::Bitmap { bitmap, entries } => {
            let bit = bitpos(hash, shift);
            if bitmap & bit == 0 {
                return None;
            }
            match &entries[slot_index(*bitmap, bit)] {
                Entry::Pair(k, v) => (k == key).then_some(v),
                Entry::Node(child) => node_find(child, shift + BITS, hash, key),
            }
        }
        Node::Array { children, .. } => {
            let child = children[mask(hash, shift) as usize].as_deref()?;
            node_find(child, shift + BITS, hash, key)
        }
        Node::Collision { pairs, .. } => {
            pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
        }
    }
}

/// Remove `key` below `node`. `None` means the node vanished entirely;
/// an identical `Rc` means the key was absent.
fn node_without(node: &Rc<Node>, shift: u32, hash: u32, key: &Value) -> Option<Rc<Node>> {
    match node.as_ref() {
        Node::Bitmap { bitmap, entries } => {
            let bit = bitpos(hash, shift);
            if bitmap & bit == 0 {
                return Some(node.clone());
            }
            let idx = slot_index(*bitmap, bit);
            match &entries[idx] {
                Entry::Node(child) => match node_without(child, shift + BITS, hash, key) {
                    Some(n) if Rc::ptr_eq(&n, child) => Some(node.clone()),
                    Some(n) => {
                        let mut new_entries = entries.clone();
                        new_entries[idx] = Entry::Node(n);
                        Some(Rc::new(Node::Bitmap {
                            bitmap: *bitmap,
                            entries: new_entries,
                        }))
                    }
                    None => {
                        if *bitmap == bit {
                            return None;
                        }
                        let mut new_entries = entries.clone();
                        new_entries.remove(idx);
                        Some(Rc::new(Node::Bitmap {
                            bitmap: bitmap ^ bit,
                            entries: new_entries,
                        }))
                    }
                },
                Entry::Pair(k, _) => {
                    if k != key {
                        return Some(node.clone());
                    }
                    // Removing the last live slot collapses the node.
                    if *bitmap == bit {
                        return None;
                    }
                    let mut new_entries = entries.clone();
                    new_entries.remove(idx);
                    Some(Rc::new(Node::Bitmap {
                        bitmap: bitmap ^ bit,
                        entries: new_entries,
                    }))
                }
            }
        }
        Node::Array { count, children } => {
            let idx = mask(hash, shift) as usize;
            let Some(child) = &children[idx] else {
                return Some(node.clone());
            };
            match node_without(child, shift + BITS, hash, key) {
                Some(n) if Rc::ptr_eq(&n, child) => Some(node.clone()),
                Some(n) => {
                    let mut new_children = children.clone();
                    new_children[idx] = Some(n);
                    Some(Rc::new(Node::Array {
                        count: *count,
                        children: new_children,
                    }))
                }
                None => {
                    if *count <= MIN_ARRAY_CHILDREN {
                        return Some(pack_array(children, idx));
                    }
                    let mut new_children = children.clone();
                    new_children[idx] = None;
                    Some(Rc::new(Node::Array {
                        count: count - 1,
                        children: new_children,
                    }))
                }
            }
        }
        Node::Collision {
            hash: node_hash,
            pairs,
        } => {
            let Some(i) = pairs.iter().position(|(k, _)| k == key) else {
                return Some(node.clone());
            };
            if pairs.len() == 1 {
                return None;
            }
            let mut new_pairs = pairs.clone();
            new_pairs.remove(i);
            Some(Rc::new(Node::Collision {
                hash: *node_hash,
                pairs: new_pairs,
            }))
        }
    }
}

/// Pack an array node's surviving children (skipping `skip`, whose child is
/// being dropped) into a bitmap node.
fn pack_array(children: &[Option<Rc<Node>>; 32], skip: usize) -> Rc<Node> {
    let mut bitmap = 0u32;
    let mut entries = Vec::new();
    for (i, child) in children.iter().enumerate() {
        if i == skip {
            continue;
        }
        if let Some(c) = child {
            bitmap |= 1 << i;
            entries.push(Entry::Node(c.clone()));
        }
    }
    Rc::new(Node::Bitmap { bitmap, entries })
}

fn node_reduce<F>(node: &Node, f: &mut F, mut acc: Value) -> Result<Value>
where
    F: FnMut(Value, Value, Value) -> Result<Value>,
{
    match node {
        Node::Bitmap { entries, .. } => {
            for entry in entries {
                acc = match entry {
                    Entry::Pair(k, v) => f(acc, k.clone(), v.clone())?,
                    Entry::Node(child) => node_reduce(child, f, acc)?,
                };
                if acc.is_reduced() {
                    return Ok(acc);
                }
            }
        }
        Node::Array { children, .. } => {
            for child in children.iter().flatten() {
                acc = node_reduce(child, f, acc)?;
                if acc.is_reduced() {
                    return Ok(acc);
                }
            }
        }
        Node::Collision { pairs, .. } => {
            for (k, v) in pairs {
                acc = f(acc, k.clone(), v.clone())?;
                if acc.is_reduced() {
                    return Ok(acc);
                }
            }
        }
    }
    Ok(acc)
}

fn node_each<'a>(node: &'a Node, f: &mut impl FnMut(&'a Value, &'a Value)) {
    match node {
        Node::Bitmap { entries, .. } => {
            for entry in entries {
                match entry {
                    Entry::Pair(k, v) => f(k, v),
                    Entry::Node(child) => node_each(child, f),
                }
            }
        }
        Node::Array { children, .. } => {
            for child in children.iter().flatten() {
                node_each(child, f);
            }
        }
        Node::Collision { pairs, .. } => {
            for (k, v) in pairs {
                f(k, v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_map(keys: impl IntoIterator<Item = i64>) -> PersistentMap {
        let mut m = PersistentMap::new();
        for k in keys {
            m = m.assoc(Value::Int(k), Value::Int(k * 10));
        }
        m
    }

    #[test]
    fn test_assoc_get_without() {
        let m = PersistentMap::new()
            .assoc(Value::str("a"), Value::Int(1))
            .assoc(Value::str("b"), Value::Int(2));
        assert_eq!(m.count(), 2);
        assert_eq!(m.get(&Value::str("a")), Some(&Value::Int(1)));

        let m2 = m.without(&Value::str("a"));
        assert_eq!(m2.count(), 1);
        assert_eq!(m2.val_at(&Value::str("a"), Value::Nil), Value::Nil);
        assert_eq!(m2.val_at(&Value::str("b"), Value::Nil), Value::Int(2));
        // m unchanged
        assert_eq!(m.count(), 2);
        assert!(m.contains(&Value::str("a")));
    }

    #[test]
    fn test_replace_keeps_count() {
        let m = int_map([1, 2, 3]);
        let m2 = m.assoc(Value::Int(2), Value::str("replaced"));
        assert_eq!(m2.count(), 3);
        assert_eq!(m2.get(&Value::Int(2)), Some(&Value::str("replaced")));
    }

    #[test]
    fn test_identical_assoc_returns_same_map() {
        let m = int_map([1, 2, 3]);
        let m2 = m.assoc(Value::Int(2), Value::Int(20));
        assert!(m.same_root(&m2));
    }

    #[test]
    fn test_without_absent_key_returns_same_map() {
        let m = int_map([1, 2, 3]);
        let m2 = m.without(&Value::Int(99));
        assert!(m.same_root(&m2));
        let empty = PersistentMap::new();
        assert!(empty.same_root(&empty.without(&Value::Int(1))));
    }

    #[test]
    fn test_promotes_to_array_node_past_sixteen() {
        // Ints 0..16 have distinct low 5 bits, filling one bitmap node.
        let m = int_map(0..16);
        assert_eq!(m.root_shape(), "bitmap");
        assert_eq!(m.count(), 16);

        let m = m.assoc(Value::Int(16), Value::Nil);
        assert_eq!(m.root_shape(), "array");
        assert_eq!(m.count(), 17);
        for k in 0..16 {
            assert_eq!(m.get(&Value::Int(k)), Some(&Value::Int(k * 10)));
        }
        assert_eq!(m.get(&Value::Int(16)), Some(&Value::Nil));
    }

    #[test]
    fn test_packs_back_to_bitmap_at_eight() {
        let mut m = int_map(0..17);
        assert_eq!(m.root_shape(), "array");
        // Remove down to 8 live children; the node stays in array form
        // until a removal hits it at the threshold.
        for k in 8..17 {
            m = m.without(&Value::Int(k));
        }
        assert_eq!(m.root_shape(), "array");
        assert_eq!(m.count(), 8);

        let m = m.without(&Value::Int(7));
        assert_eq!(m.root_shape(), "bitmap");
        assert_eq!(m.count(), 7);
        for k in 0..7 {
            assert_eq!(m.get(&Value::Int(k)), Some(&Value::Int(k * 10)));
        }
    }

    #[test]
    fn test_removing_last_entry_collapses_root() {
        let m = int_map([5]).without(&Value::Int(5));
        assert_eq!(m.count(), 0);
        assert_eq!(m.root_shape(), "empty");
        assert_eq!(m, PersistentMap::new());
    }

    #[test]
    fn test_hash_collision_keeps_both_entries() {
        // 1 and 1 << 32 collide under the long hash fold.
        let a = Value::Int(1);
        let b = Value::Int(1i64 << 32);
        assert_eq!(hash_value(&a), hash_value(&b));

        let m = PersistentMap::new()
            .assoc(a.clone(), Value::str("a"))
            .assoc(b.clone(), Value::str("b"));
        assert_eq!(m.count(), 2);
        assert_eq!(m.get(&a), Some(&Value::str("a")));
        assert_eq!(m.get(&b), Some(&Value::str("b")));

        // A third key with a different hash lands beside the collision node
        // without losing either original entry.
        let c = Value::Int(2);
        let m = m.assoc(c.clone(), Value::str("c"));
        assert_eq!(m.count(), 3);
        assert_eq!(m.get(&a), Some(&Value::str("a")));
        assert_eq!(m.get(&b), Some(&Value::str("b")));
        assert_eq!(m.get(&c), Some(&Value::str("c")));
    }

    #[test]
    fn test_collision_node_removal() {
        let a = Value::Int(1);
        let b = Value::Int(1i64 << 32);
        let m = PersistentMap::new()
            .assoc(a.clone(), Value::Int(10))
            .assoc(b.clone(), Value::Int(20));
        let m2 = m.without(&a);
        assert_eq!(m2.count(), 1);
        assert_eq!(m2.get(&b), Some(&Value::Int(20)));
        assert_eq!(m2.get(&a), None);

        let m3 = m2.without(&b);
        assert_eq!(m3.count(), 0);
        assert_eq!(m3.root_shape(), "empty");
    }

    #[test]
    fn test_collision_replace_value() {
        let a = Value::Int(1);
        let b = Value::Int(1i64 << 32);
        let m = PersistentMap::new()
            .assoc(a.clone(), Value::Int(10))
            .assoc(b.clone(), Value::Int(20))
            .assoc(a.clone(), Value::Int(11));
        assert_eq!(m.count(), 2);
        assert_eq!(m.get(&a), Some(&Value::Int(11)));
        assert_eq!(m.get(&b), Some(&Value::Int(20)));
    }

    #[test]
    fn test_deep_descent() {
        // Keys sharing low bits force multi-level descent.
        let keys: Vec<i64> = (0..64).map(|i| i << 5).collect();
        let mut m = PersistentMap::new();
        for &k in &keys {
            m = m.assoc(Value::Int(k), Value::Int(k));
        }
        assert_eq!(m.count(), keys.len());
        for &k in &keys {
            assert_eq!(m.get(&Value::Int(k)), Some(&Value::Int(k)));
        }
    }

    #[test]
    fn test_reduce_sums_entries() {
        let m = int_map(1..=4);
        let total = m
            .reduce(
                |acc, _k, v| match (acc, v) {
                    (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
                    _ => unreachable!(),
                },
                Value::Int(0),
            )
            .unwrap();
        assert_eq!(total, Value::Int(100)); // 10 + 20 + 30 + 40
    }

    #[test]
    fn test_reduce_early_termination() {
        let m = int_map(0..100);
        let mut calls = 0;
        let result = m
            .reduce(
                |_acc, _k, _v| {
                    calls += 1;
                    Ok(Value::reduced(Value::str("stop")))
                },
                Value::Nil,
            )
            .unwrap();
        assert_eq!(result, Value::str("stop"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_content_equality_ignores_structure() {
        // Same content reached through different histories.
        let m1 = int_map(0..20);
        let mut m2 = int_map((0..25).rev());
        for k in 20..25 {
            m2 = m2.without(&Value::Int(k));
        }
        assert_eq!(m1, m2);
        assert_eq!(m1.hash_unordered(), m2.hash_unordered());
    }

    #[test]
    fn test_with_meta_preserves_entries() {
        let m = int_map([1, 2]).with_meta(Value::str("meta"));
        assert_eq!(m.meta(), Some(&Value::str("meta")));
        assert_eq!(m.count(), 2);
        assert_eq!(m.get(&Value::Int(1)), Some(&Value::Int(10)));
        // Metadata does not affect equality.
        assert_eq!(m, int_map([1, 2]));
    }

    #[test]
    fn test_from_entries_rejects_odd_length() {
        let err = PersistentMap::from_entries(&[Value::Int(1)]).unwrap_err();
        assert!(err.to_string().contains("even number"));

        let m =
            PersistentMap::from_entries(&[Value::str("k"), Value::Int(1)]).unwrap();
        assert_eq!(m.count(), 1);
    }
}
