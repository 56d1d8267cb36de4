extern crate std;

use std::{format, ops::Range, prelude::v1::*, ptr::NonNull, string::String};

use cordyceps::Linked;
use proptest::prelude::*;

use crate::model::{self, TestNode};

use super::*;

// Every ordering of `0..n`, generated with Heap's algorithm.
fn permutations(n: u32) -> Vec<Vec<u32>> {
    fn generate(k: usize, keys: &mut Vec<u32>, out: &mut Vec<Vec<u32>>) {
        if k <= 1 {
            out.push(keys.clone());
            return;
        }

        for i in 0..k - 1 {
            generate(k - 1, keys, out);
            let j = if k % 2 == 0 { i } else { 0 };
            keys.swap(j, k - 1);
        }

        generate(k - 1, keys, out);
    }

    let mut keys: Vec<u32> = (0..n).collect();
    let mut out = Vec::new();
    generate(keys.len(), &mut keys, &mut out);
    out
}

fn tree_of(keys: &[u32]) -> AvlTree<TestNode> {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        assert!(tree.insert(TestNode::new(key)).is_none());
        tree.assert_invariants();
    }

    tree
}

fn balance_of(node: &TestNode) -> i8 {
    unsafe { TestNode::links(NonNull::from(node)).as_ref().balance() }
}

// Keys and balance factors in pre-order, which pins down the exact shape of the tree.
fn shape(tree: &AvlTree<TestNode>) -> Vec<(u32, i8)> {
    tree.iter_preorder()
        .map(|node| (node.key, balance_of(node)))
        .collect()
}

fn keys(tree: &AvlTree<TestNode>) -> Vec<u32> {
    tree.iter().map(|node| node.key).collect()
}

fn insert_find_all(keys: &[u32]) {
    let tree = tree_of(keys);

    assert_eq!(tree.len(), keys.len());

    for key in keys {
        let node = tree.base.get_raw(key).expect("item not found");
        assert_eq!(unsafe { node.as_ref().key() }, key);
    }
}

fn insert_remove_all(keys: &[u32]) {
    let mut tree = tree_of(keys);

    for key in keys {
        let node = tree.base.get_raw(key).expect("item not found");
        unsafe { tree.remove_at(node) };
        tree.assert_invariants();
    }

    assert!(tree.is_empty());

    for &key in keys {
        tree.insert(TestNode::new(key));
        tree.assert_invariants();
    }

    for key in keys.iter().rev() {
        let removed = tree.remove(key).expect("item not found");
        assert_eq!(removed.key, *key);
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn permutations_find() {
    for n in 1..=6 {
        for keys in permutations(n) {
            insert_find_all(&keys);
        }
    }
}

#[test]
fn permutations_remove() {
    for n in 1..=6 {
        for keys in permutations(n) {
            insert_remove_all(&keys);
        }
    }
}

#[test]
fn ascending_insert_rotates_left() {
    let tree = tree_of(&[10, 20, 30]);
    assert_eq!(shape(&tree), [(20, 0), (10, 0), (30, 0)]);
}

#[test]
fn zig_zag_insert_rotates_twice() {
    let tree = tree_of(&[30, 10, 20]);
    assert_eq!(shape(&tree), [(20, 0), (10, 0), (30, 0)]);

    let tree = tree_of(&[10, 30, 20]);
    assert_eq!(shape(&tree), [(20, 0), (10, 0), (30, 0)]);
}

#[test]
fn sequential_insert_is_perfect() {
    let tree = tree_of(&[1, 2, 3, 4, 5, 6, 7]);

    assert_eq!(
        shape(&tree),
        [(4, 0), (2, 0), (1, 0), (3, 0), (6, 0), (5, 0), (7, 0)]
    );
    assert_eq!(tree.height(), 3);
}

#[test]
fn remove_leaf_shrinks_to_root() {
    let mut tree = tree_of(&[5, 3, 8, 1, 4, 7, 9, 2]);
    assert_eq!(
        shape(&tree),
        [(5, -1), (3, -1), (1, 1), (2, 0), (4, 0), (8, 0), (7, 0), (9, 0)]
    );

    let removed = tree.remove(&1).expect("1 is present");
    assert_eq!(removed.key, 1);
    tree.assert_invariants();

    assert_eq!(keys(&tree), [2, 3, 4, 5, 7, 8, 9]);
    assert_eq!(
        shape(&tree),
        [(5, 0), (3, 0), (2, 0), (4, 0), (8, 0), (7, 0), (9, 0)]
    );
}

#[test]
fn remove_rotates_once() {
    let mut tree = tree_of(&[2, 1, 3, 4]);
    tree.remove(&1);
    tree.assert_invariants();
    assert_eq!(shape(&tree), [(3, 0), (2, 0), (4, 0)]);
}

#[test]
fn remove_rotates_once_and_stops() {
    let mut tree = tree_of(&[2, 1, 4, 3, 5]);
    tree.remove(&1);
    tree.assert_invariants();
    assert_eq!(shape(&tree), [(4, -1), (2, 1), (3, 0), (5, 0)]);
}

#[test]
fn remove_rotates_twice() {
    let mut tree = tree_of(&[2, 1, 4, 3]);
    tree.remove(&1);
    tree.assert_invariants();
    assert_eq!(shape(&tree), [(3, 0), (2, 0), (4, 0)]);
}

#[test]
fn remove_with_two_children_uses_predecessor() {
    let mut tree = tree_of(&[10, 20, 30]);

    let removed = tree.remove(&20).expect("20 is present");
    assert_eq!(removed.key, 20);
    tree.assert_invariants();

    assert_eq!(shape(&tree), [(10, 1), (30, 0)]);
}

#[test]
fn remove_only_element() {
    let mut tree = tree_of(&[7]);

    assert_eq!(tree.remove(&7).map(|node| node.key), Some(7));
    tree.assert_invariants();

    assert!(tree.is_empty());
    assert!(tree.base.root.is_none());
    assert_eq!(tree.height(), 0);
}

#[test]
fn remove_absent_is_noop() {
    let mut tree = tree_of(&[1, 2, 3]);
    let before = shape(&tree);

    assert!(tree.remove(&42).is_none());
    assert!(tree.remove(&42).is_none());

    assert_eq!(tree.len(), 3);
    assert_eq!(shape(&tree), before);
}

#[test]
fn insert_duplicate_replaces() {
    let mut tree = tree_of(&[1, 2, 3]);
    let before = shape(&tree);

    let old = tree
        .insert(TestNode::with_value(2, 20))
        .expect("2 is present");
    assert_eq!((old.key, old.value), (2, 2));
    tree.assert_invariants();

    assert_eq!(tree.len(), 3);
    assert_eq!(tree.get(&2).map(|node| node.value), Some(20));
    assert_eq!(shape(&tree), before);
}

#[test]
fn first_last_and_pop() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3, 5, 7]);

    assert_eq!(tree.first().map(|node| node.key), Some(1));
    assert_eq!(tree.last().map(|node| node.key), Some(7));

    assert_eq!(tree.pop_first().map(|node| node.key), Some(1));
    assert_eq!(tree.pop_last().map(|node| node.key), Some(7));
    tree.assert_invariants();

    assert_eq!(keys(&tree), [2, 3, 4, 5, 6]);

    tree.clear();
    assert!(tree.first().is_none());
    assert!(tree.pop_last().is_none());
}

#[test]
fn traversal_orders() {
    let tree = tree_of(&[1, 2, 3, 4, 5, 6, 7]);

    let in_order: Vec<u32> = tree.iter().map(|node| node.key).collect();
    let reversed: Vec<u32> = tree.iter().rev().map(|node| node.key).collect();
    let preorder: Vec<u32> = tree.iter_preorder().map(|node| node.key).collect();
    let postorder: Vec<u32> = tree.iter_postorder().map(|node| node.key).collect();

    assert_eq!(in_order, [1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(reversed, [7, 6, 5, 4, 3, 2, 1]);
    assert_eq!(preorder, [4, 2, 1, 3, 6, 5, 7]);
    assert_eq!(postorder, [1, 3, 2, 5, 7, 6, 4]);

    assert_eq!(tree.iter().len(), 7);
    assert_eq!(tree.iter_preorder().len(), 7);
    assert_eq!(tree.iter_postorder().len(), 7);
}

#[test]
fn iter_meets_in_the_middle() {
    let tree = tree_of(&[1, 2, 3, 4]);
    let mut iter = tree.iter();

    assert_eq!(iter.next().map(|node| node.key), Some(1));
    assert_eq!(iter.next_back().map(|node| node.key), Some(4));
    assert_eq!(iter.next().map(|node| node.key), Some(2));
    assert_eq!(iter.next_back().map(|node| node.key), Some(3));
    assert!(iter.next().is_none());
    assert!(iter.next_back().is_none());
}

#[test]
fn empty_traversals() {
    let tree: AvlTree<TestNode> = AvlTree::new();

    assert!(tree.iter().next().is_none());
    assert!(tree.iter_preorder().next().is_none());
    assert!(tree.iter_postorder().next().is_none());
    assert!(tree.cursor_first().get().is_none());
}

#[test]
fn cursor_walks_and_wraps() {
    let tree = tree_of(&[1, 2, 3]);

    let mut cursor = tree.cursor_at(&2);
    assert_eq!(cursor.get().map(|node| node.key), Some(2));
    assert_eq!(cursor.peek_prev().map(|node| node.key), Some(1));
    assert_eq!(cursor.peek_next().map(|node| node.key), Some(3));

    cursor.move_next();
    cursor.move_next();
    assert!(cursor.get().is_none());

    cursor.move_next();
    assert_eq!(cursor.get().map(|node| node.key), Some(1));

    cursor.move_prev();
    assert!(cursor.get().is_none());
    assert_eq!(cursor.peek_prev().map(|node| node.key), Some(3));

    assert!(tree.cursor_at(&42).get().is_none());
    assert_eq!(tree.cursor_last().get().map(|node| node.key), Some(3));
}

#[test]
fn cursor_mut_removes() {
    let mut tree = tree_of(&[1, 2, 3, 4, 5]);

    {
        let mut cursor = tree.cursor_at_mut(&3);
        assert_eq!(cursor.remove_current().map(|node| node.key), Some(3));
        assert_eq!(cursor.get().map(|node| node.key), Some(4));

        assert_eq!(
            cursor.remove_current_and_move_prev().map(|node| node.key),
            Some(4)
        );
        assert_eq!(cursor.get().map(|node| node.key), Some(2));
    }

    tree.assert_invariants();
    assert_eq!(keys(&tree), [1, 2, 5]);

    let mut cursor = tree.cursor_last_mut();
    assert_eq!(cursor.remove_current().map(|node| node.key), Some(5));
    assert!(cursor.get().is_none());
    assert!(cursor.remove_current().is_none());
}

#[test]
fn entry_vacant_then_occupied() {
    let mut tree = tree_of(&[1, 3]);

    match tree.entry(&2) {
        Entry::Vacant(entry) => {
            assert_eq!(*entry.key(), 2);
            let node = unsafe { entry.insert(TestNode::with_value(2, 200)) };
            assert_eq!(node.value, 200);
        }
        Entry::Occupied(_) => unreachable!("2 should be vacant"),
    }
    tree.assert_invariants();
    assert_eq!(keys(&tree), [1, 2, 3]);

    match tree.entry(&2) {
        Entry::Occupied(mut entry) => {
            assert_eq!(entry.get().value, 200);

            let old = unsafe { entry.insert(TestNode::with_value(2, 201)) };
            assert_eq!(old.value, 200);
            assert_eq!(entry.get().value, 201);

            assert_eq!(entry.remove().value, 201);
        }
        Entry::Vacant(_) => unreachable!("2 should be occupied"),
    }
    tree.assert_invariants();
    assert_eq!(tree.len(), 2);
    assert!(!tree.entry(&2).is_occupied());
}

#[test]
fn height_is_logarithmic() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for key in 0..1000 {
        tree.insert(TestNode::new(key));
    }
    tree.assert_invariants();

    // 1.44 * log2(1000 + 2) is just under 15.
    assert!(tree.height() <= 14, "height {}", tree.height());
    assert_eq!(tree.height(), tree.as_bst().height());

    for key in (0..1000).step_by(2) {
        tree.remove(&key);
    }
    tree.assert_invariants();
    assert_eq!(tree.height(), tree.as_bst().height());
}

#[test]
fn bst_ascending_insert_degenerates() {
    let mut tree: BsTree<TestNode> = BsTree::new();

    for key in 0..8 {
        tree.insert(TestNode::new(key));
        tree.assert_invariants();
    }

    assert_eq!(tree.height(), 8);
    assert_eq!(tree.len(), 8);
}

#[test]
fn bst_remove_with_two_children() {
    let mut tree: BsTree<TestNode> = BsTree::new();

    for key in [5, 3, 8, 4] {
        tree.insert(TestNode::new(key));
    }

    assert_eq!(tree.remove(&5).map(|node| node.key), Some(5));
    tree.assert_invariants();

    let preorder: Vec<u32> = tree.iter_preorder().map(|node| node.key).collect();
    assert_eq!(preorder, [4, 3, 8]);
    assert!(tree.remove(&5).is_none());
}

#[test]
fn bst_duplicate_insert_replaces() {
    let mut tree: BsTree<TestNode> = BsTree::new();

    tree.insert(TestNode::with_value(1, 10));
    let old = tree.insert(TestNode::with_value(1, 11)).expect("1 is present");

    assert_eq!(old.value, 10);
    assert_eq!(tree.get(&1).map(|node| node.value), Some(11));
    assert_eq!(tree.len(), 1);
}

#[test]
fn debug_lists_elements() {
    let tree = tree_of(&[2, 1]);
    let out = format!("{tree:?}");

    assert!(out.starts_with('['));
    assert!(out.contains("key: 1"));
    assert!(out.contains("key: 2"));
}

#[test]
fn dotgraph_labels_balances() {
    let tree = tree_of(&[2, 1]);
    let mut out = String::new();

    tree.dotgraph("t", &mut out).expect("formatting into a String");

    assert!(out.starts_with("digraph \"graph-t\""));
    assert!(out.contains("[label=\"2:-1\"]"));
    assert!(out.contains("[label=\"1:0\"]"));
    assert!(out.contains("\"grapht-2\" -> \"grapht-1\";"));

    let empty: AvlTree<TestNode> = AvlTree::new();
    let mut out = String::new();
    empty.dotgraph("e", &mut out).expect("formatting into a String");
    assert_eq!(out, "digraph \"graph-e\" {}");
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn map_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_map_equivalence(ops);
    }

    #[test]
    fn cursor_equivalence(
        keys in proptest::collection::vec(0u32..200, 0..100),
        ops in proptest::collection::vec(model::cursor_op_strategy(), FUZZ_RANGE),
    ) {
        model::run_cursor_equivalence(keys, ops);
    }
}
