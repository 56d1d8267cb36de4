extern crate alloc;

use alloc::boxed::Box;
use core::{borrow::Borrow, fmt, marker::PhantomPinned, mem, ops::Index, ptr::NonNull};

use cordyceps::Linked;

use crate::{bst::Search, AvlTree, Dir, KeyError, Links, TreeNode};

/// An ordered map based on an [AVL tree].
///
/// Entries are allocated in individual boxes and linked into an intrusive [`AvlTree`].
///
/// [AVL tree]: https://en.wikipedia.org/wiki/AVL_tree
pub struct AvlMap<K: Ord + fmt::Debug, V> {
    tree: AvlTree<MapNode<K, V>>,
}

struct MapNode<K, V> {
    links: Links<MapNode<K, V>>,
    key: K,
    value: V,
    _unpin: PhantomPinned,
}

impl<K, V> MapNode<K, V> {
    fn new(key: K, value: V) -> Box<Self> {
        Box::new(MapNode {
            links: Links::new(),
            key,
            value,
            _unpin: PhantomPinned,
        })
    }
}

unsafe impl<K, V> Linked<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<MapNode<K, V>>> {
        let ptr = ptr.as_ptr();
        // SAFETY: a field of a valid, non-null node is non-null.
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl<K: Ord + fmt::Debug, V> TreeNode<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Key = K;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

impl<K: Ord + fmt::Debug, V> AvlMap<K, V> {
    /// Creates a new, empty `AvlMap`.
    pub const fn new() -> Self {
        Self {
            tree: AvlTree::new(),
        }
    }

    /// Returns `true` if the map contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of elements in the map.
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns the height of the underlying tree.
    pub fn height(&self) -> usize {
        self.tree.height()
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        self.tree.assert_invariants();
    }

    /// Returns `true` if the map contains a value associated with `key`.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.contains_key(key)
    }

    /// Returns a reference to the value associated with `key`.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.get(key).map(|node| &node.get_ref().value)
    }

    /// Returns the key-value pair associated with `key`.
    #[inline]
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.get(key).map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Returns a mutable reference to the value associated with `key`.
    #[inline]
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        // SAFETY: Only the value is handed out; the key and links stay untouched.
        unsafe { self.tree.get_mut(key) }
            // SAFETY: Pinning is not structural for `node.value`.
            .map(|node| unsafe { &mut node.get_unchecked_mut().value })
    }

    /// Returns a reference to the value associated with `key`, or [`KeyError`] if there is none.
    pub fn try_get<Q>(&self, key: &Q) -> Result<&V, KeyError>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).ok_or(KeyError)
    }

    /// Returns a mutable reference to the value associated with `key`, or [`KeyError`] if there
    /// is none.
    pub fn try_get_mut<Q>(&mut self, key: &Q) -> Result<&mut V, KeyError>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get_mut(key).ok_or(KeyError)
    }

    /// Returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.tree.first().map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.tree.pop_first().map(|node| {
            let MapNode { key, value, .. } = *node;
            (key, value)
        })
    }

    /// Returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.tree.last().map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.tree.pop_last().map(|node| {
            let MapNode { key, value, .. } = *node;
            (key, value)
        })
    }

    /// Returns the entry with the greatest key less than `key`.
    ///
    /// `key` does not need to be present in the map.
    pub fn predecessor<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.base.closest(key, Dir::Left).map(|ptr| {
            let node = unsafe { ptr.as_ref() };
            (&node.key, &node.value)
        })
    }

    /// Returns the entry with the least key greater than `key`.
    ///
    /// `key` does not need to be present in the map.
    pub fn successor<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.base.closest(key, Dir::Right).map(|ptr| {
            let node = unsafe { ptr.as_ref() };
            (&node.key, &node.value)
        })
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map already held a value for `key`, it is overwritten in place and returned; the
    /// stored key is not updated and the tree is not restructured.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.tree.base.search(&key) {
            Search::Found(mut node) => {
                // SAFETY: Only the value is replaced; the key and links stay untouched.
                let slot = unsafe { &mut node.as_mut().value };
                Some(mem::replace(slot, value))
            }
            Search::Vacant(insert_as) => {
                let ptr = MapNode::into_ptr(MapNode::new(key, value));
                // SAFETY: `insert_as` comes from a search for this key with no change since.
                unsafe { self.tree.insert_at(insert_as, ptr) };
                None
            }
        }
    }

    /// Removes the value associated with `key` from the map.
    ///
    /// Removing a key that is not present leaves the map untouched.
    #[inline]
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.remove(key).map(|node| node.value)
    }

    /// Removes the entry associated with `key` from the map and returns it.
    #[inline]
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.remove(key).map(|node| {
            let MapNode { key, value, .. } = *node;
            (key, value)
        })
    }

    /// Returns an iterator over the entries of the map, sorted by key.
    ///
    /// The iterator borrows the map and can be recreated at any time to start over.
    pub fn iter(
        &self,
    ) -> impl DoubleEndedIterator<Item = (&K, &V)> + ExactSizeIterator + Clone + '_ {
        self.tree.iter().map(|node| (&node.key, &node.value))
    }

    /// Returns an iterator over the keys of the map, in sorted order.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &K> + ExactSizeIterator + Clone + '_ {
        self.tree.iter().map(|node| &node.key)
    }

    /// Returns an iterator over the values of the map, in order by key.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> + ExactSizeIterator + Clone + '_ {
        self.tree.iter().map(|node| &node.value)
    }

    /// Returns an iterator over the entries of the map, visiting each node of the tree before its
    /// children.
    pub fn iter_preorder(&self) -> impl ExactSizeIterator<Item = (&K, &V)> + Clone + '_ {
        self.tree
            .iter_preorder()
            .map(|node| (&node.key, &node.value))
    }

    /// Returns an iterator over the entries of the map, visiting each node of the tree after its
    /// children.
    pub fn iter_postorder(&self) -> impl ExactSizeIterator<Item = (&K, &V)> + Clone + '_ {
        self.tree
            .iter_postorder()
            .map(|node| (&node.key, &node.value))
    }

    /// Clears the map, removing all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
    }
}

impl<K: Ord + fmt::Debug, V> Default for AvlMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + fmt::Debug, V: fmt::Debug> fmt::Debug for AvlMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, Q, V> Index<&Q> for AvlMap<K, V>
where
    K: Borrow<Q> + Ord + fmt::Debug,
    Q: Ord + ?Sized,
{
    type Output = V;

    /// Returns a reference to the value corresponding to `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not present in the map.
    fn index(&self, key: &Q) -> &V {
        match self.try_get(key) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::{
        format,
        prelude::v1::*,
        sync::{Arc, Mutex},
        thread,
    };

    use super::*;

    fn map_of(keys: &[u32]) -> AvlMap<u32, u32> {
        let mut map = AvlMap::new();
        for &key in keys {
            assert_eq!(map.insert(key, key * 10), None);
            map.assert_invariants();
        }
        map
    }

    #[test]
    fn insert_then_get() {
        let map = map_of(&[4, 2, 6, 1, 3, 5, 7]);

        assert_eq!(map.len(), 7);
        for key in 1..=7 {
            assert_eq!(map.get(&key), Some(&(key * 10)));
        }
        assert_eq!(map.get(&8), None);
    }

    #[test]
    fn insert_existing_overwrites() {
        let mut map = map_of(&[1, 2, 3]);
        let shape: Vec<_> = map.iter_preorder().map(|(&k, _)| k).collect();

        assert_eq!(map.insert(2, 99), Some(20));
        map.assert_invariants();

        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&2), Some(&99));
        assert_eq!(map.iter_preorder().map(|(&k, _)| k).collect::<Vec<_>>(), shape);
    }

    #[test]
    fn insert_mixes_new_and_existing_keys() {
        let mut map = AvlMap::new();

        for round in 0..3u32 {
            for key in 0..64u32 {
                let previous = map.insert(key, key + round);
                assert_eq!(previous, round.checked_sub(1).map(|r| key + r));
            }
            map.assert_invariants();
            assert_eq!(map.len(), 64);
        }

        assert!(map.iter().all(|(&k, &v)| v == k + 2));
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut map = map_of(&[5, 3, 8, 1, 4]);
        let before: Vec<_> = map.iter_preorder().map(|(&k, &v)| (k, v)).collect();

        assert_eq!(map.remove(&6), None);
        map.assert_invariants();

        let after: Vec<_> = map.iter_preorder().map(|(&k, &v)| (k, v)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn remove_builds_expected_set() {
        let mut map = map_of(&[5, 3, 8, 1, 4, 7, 9, 2]);

        assert_eq!(map.remove(&1), Some(10));
        map.assert_invariants();

        assert_eq!(
            map.keys().copied().collect::<Vec<_>>(),
            [2, 3, 4, 5, 7, 8, 9]
        );
    }

    #[test]
    fn remove_only_element() {
        let mut map = map_of(&[42]);

        assert_eq!(map.remove(&42), Some(420));
        assert!(map.is_empty());
        assert_eq!(map.get(&42), None);
        assert_eq!(map.try_get(&42), Err(KeyError));
    }

    #[test]
    fn try_get_reports_key_error() {
        let mut map = map_of(&[1, 2]);

        assert_eq!(map.try_get(&1), Ok(&10));
        assert_eq!(map.try_get(&3), Err(KeyError));

        *map.try_get_mut(&2).unwrap() += 1;
        assert_eq!(map[&2], 21);
        assert_eq!(map.try_get_mut(&3), Err(KeyError));
        assert_eq!(KeyError.to_string(), "key not found");
    }

    #[test]
    #[should_panic(expected = "key not found")]
    fn index_absent_panics() {
        let map = map_of(&[1]);
        let _value: u32 = map[&2];
    }

    #[test]
    fn predecessor_and_successor() {
        let map = map_of(&[10, 20, 30, 40]);

        assert_eq!(map.predecessor(&30), Some((&20, &200)));
        assert_eq!(map.predecessor(&25), Some((&20, &200)));
        assert_eq!(map.predecessor(&10), None);
        assert_eq!(map.successor(&30), Some((&40, &400)));
        assert_eq!(map.successor(&5), Some((&10, &100)));
        assert_eq!(map.successor(&40), None);
    }

    #[test]
    fn first_last_pop() {
        let mut map = map_of(&[3, 1, 2]);

        assert_eq!(map.first_key_value(), Some((&1, &10)));
        assert_eq!(map.last_key_value(), Some((&3, &30)));
        assert_eq!(map.pop_first(), Some((1, 10)));
        assert_eq!(map.pop_last(), Some((3, 30)));
        map.assert_invariants();
        assert_eq!(map.remove_entry(&2), Some((2, 20)));
        assert_eq!(map.pop_first(), None);
    }

    #[test]
    fn iteration_orders() {
        let map = map_of(&[2, 1, 3]);

        fn keys<'a>(it: impl Iterator<Item = (&'a u32, &'a u32)>) -> Vec<u32> {
            it.map(|(&k, _)| k).collect()
        }

        assert_eq!(keys(map.iter()), [1, 2, 3]);
        assert_eq!(keys(map.iter().rev()), [3, 2, 1]);
        assert_eq!(keys(map.iter_preorder()), [2, 1, 3]);
        assert_eq!(keys(map.iter_postorder()), [1, 3, 2]);
        assert_eq!(map.values().copied().collect::<Vec<_>>(), [10, 20, 30]);

        // Iterators restart from scratch.
        assert_eq!(map.iter().count(), 3);
        assert_eq!(map.iter().len(), 3);
    }

    #[test]
    fn debug_output() {
        let map = map_of(&[2, 1]);
        assert_eq!(format!("{map:?}"), "{1: 10, 2: 20}");
    }

    #[test]
    fn height_stays_logarithmic() {
        let mut map = AvlMap::new();
        for key in 0..1024u32 {
            map.insert(key, ());
        }
        map.assert_invariants();

        // 1.44 * log2(1026) is just over 14.4.
        assert!(map.height() <= 14, "height {} too large", map.height());
    }

    #[test]
    fn string_keys_borrow() {
        let mut map = AvlMap::new();
        map.insert(String::from("b"), 2);
        map.insert(String::from("a"), 1);

        assert_eq!(map.get("a"), Some(&1));
        assert!(map.contains_key("b"));
        assert_eq!(map.remove("b"), Some(2));
        assert_eq!(map.get_key_value("a"), Some((&String::from("a"), &1)));
    }

    #[test]
    fn shared_behind_mutex() {
        let map = Arc::new(Mutex::new(AvlMap::new()));

        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for i in 0..100 {
                        map.lock().unwrap().insert(t * 100 + i, t);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let map = map.lock().unwrap();
        map.assert_invariants();
        assert_eq!(map.len(), 400);
    }
}
