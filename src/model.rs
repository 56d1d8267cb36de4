//! Model-based checks comparing [`AvlTree`] and [`AvlMap`] against the standard library.
//!
//! The runners here are shared by the unit tests (driven by `proptest`) and the fuzz targets
//! (driven by `arbitrary`).

extern crate std;

use std::{collections::BTreeMap, prelude::v1::*, ptr::NonNull};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

#[cfg(feature = "alloc")]
use crate::AvlMap;
use crate::{AvlTree, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: u32,
    pub value: u32,
}

impl TestNode {
    /// A node whose value equals its key.
    pub fn new(key: u32) -> Box<TestNode> {
        TestNode::with_value(key, key)
    }

    pub fn with_value(key: u32, value: u32) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
            value,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(node: Self::Handle) -> NonNull<Self> {
        NonNull::from(Box::leak(node))
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: `links` is the first field of a #[repr(C)] struct.
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

/// How an operation picks its key.
///
/// Purely random keys rarely hit anything already stored, so half of the generated operations
/// refer to a present key by its rank instead.
#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum KeyChoice {
    Present(usize),
    Any(u32),
}

impl KeyChoice {
    fn resolve(self, present: &[u32]) -> u32 {
        match self {
            KeyChoice::Present(rank) if !present.is_empty() => present[rank % present.len()],
            KeyChoice::Present(rank) => rank as u32,
            KeyChoice::Any(key) => key,
        }
    }
}

fn key_choice_strategy() -> impl Strategy<Value = KeyChoice> {
    proptest::prop_oneof![
        (0usize..1000).prop_map(KeyChoice::Present),
        (0u32..1000).prop_map(KeyChoice::Any),
    ]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(KeyChoice, u32),
    Get(KeyChoice),
    Remove(KeyChoice),
    First,
    PopFirst,
    Last,
    PopLast,
}

// An `Op` with its key fixed against the current contents.
#[derive(Copy, Clone, Debug)]
enum Step {
    Insert(u32, u32),
    Get(u32),
    Remove(u32),
    First,
    PopFirst,
    Last,
    PopLast,
}

impl Op {
    fn resolve(self, present: &[u32]) -> Step {
        match self {
            Op::Insert(key, value) => Step::Insert(key.resolve(present), value),
            Op::Get(key) => Step::Get(key.resolve(present)),
            Op::Remove(key) => Step::Remove(key.resolve(present)),
            Op::First => Step::First,
            Op::PopFirst => Step::PopFirst,
            Op::Last => Step::Last,
            Op::PopLast => Step::PopLast,
        }
    }
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        (key_choice_strategy(), proptest::num::u32::ANY)
            .prop_map(|(key, value)| Op::Insert(key, value)),
        key_choice_strategy().prop_map(Op::Get),
        key_choice_strategy().prop_map(Op::Remove),
        Just(Op::First),
        Just(Op::PopFirst),
        Just(Op::Last),
        Just(Op::PopLast),
    ]
}

/// Runs `ops` against both an [`AvlTree`] and a [`BTreeMap`], asserting that they agree after
/// every step and that the tree stays balanced.
pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut present = Vec::new();
    let mut btree = BTreeMap::new();
    let mut avl: AvlTree<TestNode> = AvlTree::new();

    #[allow(clippy::boxed_local)]
    fn owned(node: Box<TestNode>) -> (u32, u32) {
        (node.key, node.value)
    }

    fn borrowed(node: &TestNode) -> (u32, u32) {
        (node.key, node.value)
    }

    for (i, op) in ops.into_iter().enumerate() {
        let step = op.resolve(&present);

        let (expected, actual) = match step {
            Step::Insert(key, value) => (
                btree.insert(key, value).map(|old| (key, old)),
                avl.insert(TestNode::with_value(key, value)).map(owned),
            ),
            Step::Get(key) => (
                btree.get(&key).map(|&value| (key, value)),
                avl.get(&key).map(|node| borrowed(&node)),
            ),
            Step::Remove(key) => (
                btree.remove(&key).map(|value| (key, value)),
                avl.remove(&key).map(owned),
            ),
            Step::First => (
                btree.first_key_value().map(|(&k, &v)| (k, v)),
                avl.first().map(|node| borrowed(&node)),
            ),
            Step::PopFirst => (btree.pop_first(), avl.pop_first().map(owned)),
            Step::Last => (
                btree.last_key_value().map(|(&k, &v)| (k, v)),
                avl.last().map(|node| borrowed(&node)),
            ),
            Step::PopLast => (btree.pop_last(), avl.pop_last().map(owned)),
        };

        assert_eq!(expected, actual, "step #{i}: {step:?}");

        avl.assert_invariants();
        assert_eq!(btree.len(), avl.len());
        assert!(btree
            .iter()
            .map(|(&k, &v)| (k, v))
            .eq(avl.iter().map(borrowed)));

        present.clear();
        present.extend(btree.keys().copied());
    }
}

/// Runs `ops` against both an [`AvlMap`] and a [`BTreeMap`], asserting that they agree after
/// every step. `Get` also compares the neighbors of the key.
#[cfg(feature = "alloc")]
pub fn run_map_equivalence(ops: Vec<Op>) {
    let mut present = Vec::new();
    let mut btree = BTreeMap::new();
    let mut avl = AvlMap::new();

    for (i, op) in ops.into_iter().enumerate() {
        let step = op.resolve(&present);

        match step {
            Step::Insert(key, value) => {
                assert_eq!(btree.insert(key, value), avl.insert(key, value), "step #{i}: {step:?}");
            }

            Step::Get(key) => {
                assert_eq!(btree.get(&key), avl.get(&key), "step #{i}: {step:?}");
                assert_eq!(
                    btree.range(..key).next_back(),
                    avl.predecessor(&key),
                    "step #{i}: {step:?}"
                );
                assert_eq!(
                    btree
                        .range((std::ops::Bound::Excluded(key), std::ops::Bound::Unbounded))
                        .next(),
                    avl.successor(&key),
                    "step #{i}: {step:?}"
                );
            }

            Step::Remove(key) => {
                assert_eq!(btree.remove(&key), avl.remove(&key), "step #{i}: {step:?}");
            }

            Step::First => {
                assert_eq!(btree.first_key_value(), avl.first_key_value(), "step #{i}: {step:?}");
            }

            Step::PopFirst => {
                assert_eq!(btree.pop_first(), avl.pop_first(), "step #{i}: {step:?}");
            }

            Step::Last => {
                assert_eq!(btree.last_key_value(), avl.last_key_value(), "step #{i}: {step:?}");
            }

            Step::PopLast => {
                assert_eq!(btree.pop_last(), avl.pop_last(), "step #{i}: {step:?}");
            }
        }

        avl.assert_invariants();
        assert_eq!(btree.len(), avl.len());
        assert!(btree.iter().eq(avl.iter()));

        present.clear();
        present.extend(btree.keys().copied());
    }
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum CursorOp {
    MovePrev,
    MoveNext,
    PeekNext,
    PeekPrev,
    RemoveCurrent,
    RemoveCurrentMovePrev,
}

pub fn cursor_op_strategy() -> impl Strategy<Value = CursorOp> {
    proptest::prop_oneof![
        Just(CursorOp::MovePrev),
        Just(CursorOp::MoveNext),
        Just(CursorOp::PeekNext),
        Just(CursorOp::PeekPrev),
        Just(CursorOp::RemoveCurrent),
        Just(CursorOp::RemoveCurrentMovePrev),
    ]
}

#[derive(Clone, Debug)]
pub struct CursorEquivalenceInput {
    pub keys: Vec<u32>,
    pub ops: Vec<CursorOp>,
}

impl<'a> Arbitrary<'a> for CursorEquivalenceInput {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let num_keys = usize::from(u8::arbitrary(u)? % 100);
        let num_ops = usize::from(u16::arbitrary(u)? % 1000);

        // Running out of input yields defaults rather than failing the whole case.
        let keys = (0..num_keys)
            .map(|_| u32::arbitrary(u).unwrap_or(0))
            .collect();
        let ops = (0..num_ops)
            .map(|_| CursorOp::arbitrary(u).unwrap_or(CursorOp::MoveNext))
            .collect();

        Ok(CursorEquivalenceInput { keys, ops })
    }
}

// A cursor over a sorted `Vec`: `Some(index)` or the ghost position.
struct VecCursor {
    keys: Vec<u32>,
    pos: Option<usize>,
}

impl VecCursor {
    fn next_pos(&self) -> Option<usize> {
        match self.pos {
            Some(i) => Some(i + 1).filter(|&j| j < self.keys.len()),
            None => (!self.keys.is_empty()).then_some(0),
        }
    }

    fn prev_pos(&self) -> Option<usize> {
        match self.pos {
            Some(i) => i.checked_sub(1),
            None => self.keys.len().checked_sub(1),
        }
    }

    fn key_at(&self, pos: Option<usize>) -> Option<u32> {
        pos.map(|i| self.keys[i])
    }

    fn remove(&mut self, move_prev: bool) -> Option<u32> {
        let i = self.pos?;
        let new_pos = if move_prev { self.prev_pos() } else { Some(i) };

        let key = self.keys.remove(i);
        self.pos = new_pos.filter(|&j| j < self.keys.len());

        Some(key)
    }
}

/// Walks a [`CursorMut`](crate::CursorMut) over a tree built from `keys` and a cursor over the
/// same keys in a sorted `Vec`, asserting that both see the same element after every op.
pub fn run_cursor_equivalence(mut keys: Vec<u32>, ops: Vec<CursorOp>) {
    keys.sort_unstable();
    keys.dedup();

    let mut avl: AvlTree<TestNode> = AvlTree::new();
    for &key in &keys {
        avl.insert(TestNode::new(key));
    }

    let mut model = VecCursor { keys, pos: None };
    model.pos = model.next_pos();

    let mut cursor = avl.cursor_first_mut();
    assert_eq!(model.key_at(model.pos), cursor.get().map(|node| node.key));

    for (i, op) in ops.into_iter().enumerate() {
        match op {
            CursorOp::MoveNext => {
                model.pos = model.next_pos();
                cursor.move_next();
            }

            CursorOp::MovePrev => {
                model.pos = model.prev_pos();
                cursor.move_prev();
            }

            CursorOp::PeekNext => assert_eq!(
                model.key_at(model.next_pos()),
                cursor.peek_next().map(|node| node.key),
                "op #{i}: {op:?}"
            ),

            CursorOp::PeekPrev => assert_eq!(
                model.key_at(model.prev_pos()),
                cursor.peek_prev().map(|node| node.key),
                "op #{i}: {op:?}"
            ),

            CursorOp::RemoveCurrent => assert_eq!(
                model.remove(false),
                cursor.remove_current().map(|node| node.key),
                "op #{i}: {op:?}"
            ),

            CursorOp::RemoveCurrentMovePrev => assert_eq!(
                model.remove(true),
                cursor.remove_current_and_move_prev().map(|node| node.key),
                "op #{i}: {op:?}"
            ),
        }

        assert_eq!(
            model.key_at(model.pos),
            cursor.get().map(|node| node.key),
            "op #{i}: {op:?}"
        );
    }

    drop(cursor);
    avl.assert_invariants();
    assert!(model.keys.iter().copied().eq(avl.iter().map(|node| node.key)));
}
