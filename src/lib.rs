//! An intrusive AVL tree.
//!
//! Elements carry their own [`Links`]: pointers to their parent and children, plus a balance factor.
//! [`AvlTree`] composes the unbalanced [`BsTree`] and keeps it height-balanced by rotating after
//! every insertion and removal, so lookups, insertions and removals all complete in _O(log(n))_
//! time. [`AvlMap`] wraps the intrusive tree into an owning ordered map.
#![no_std]

#[cfg(any(test, feature = "std"))]
extern crate std;

// Conventions used in comments:
// - The height of a subtree `x` is denoted `h(x)`; a missing subtree has height 0.
// - The balance factor of a node `x` is `b(x) = h(right(x)) - h(left(x))`.
// - A node is `d`-heavy if its balance factor leans toward direction `d`.
//
// The fundamental invariants of an AVL tree are:
// 1. Every node is ordered after all nodes in its left subtree and before all nodes in its right
//    subtree.
// 2. Every stored balance factor is exactly `h(right) - h(left)` and lies in {-1, 0, 1}.
//
// During rebalancing a node may transiently reach a balance of ±2. Such a node is never written
// back; it is resolved by one single rotation (zig-zig, the heavy child leans the same way or not
// at all) or one double rotation (zig-zag, the heavy child leans the other way) before the
// operation returns.

mod bst;
mod cursor;
mod debug;
mod entry;
mod error;
mod iter;
#[cfg(feature = "alloc")]
mod map;

#[cfg(any(test, feature = "model"))]
pub mod model;

#[cfg(test)]
mod tests;

use core::{
    borrow::Borrow, cell::UnsafeCell, fmt, marker::PhantomPinned, mem, ops::Not, pin::Pin,
    ptr::NonNull,
};

use cordyceps::Linked;
use log::trace;

use crate::bst::{find_maximum, find_minimum, which_child, Search};
use crate::entry::InsertAs;

pub use crate::bst::BsTree;
pub use crate::cursor::{Cursor, CursorMut};
pub use crate::entry::{Entry, OccupiedEntry, VacantEntry};
pub use crate::error::KeyError;
pub use crate::iter::{Iter, PostOrderIter, PreOrderIter};
#[cfg(feature = "alloc")]
pub use crate::map::AvlMap;

pub trait TreeNode<L>: Linked<L> {
    type Key: Ord + fmt::Debug;

    fn key(&self) -> &Self::Key;
}

/// An intrusive AVL tree.
///
/// Every node stores its balance factor, the height of its right subtree minus the height of its
/// left subtree. Insertions and removals adjust balance factors on the way back up toward the root
/// and perform at most one rotation per unbalanced node, stopping as soon as a subtree's height is
/// unchanged.
pub struct AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    base: BsTree<T>,
}

/// Tree links embedded in every element of an [`AvlTree`] or [`BsTree`].
pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Dir {
    /// The change in a parent's balance factor when the subtree on this side grows by one.
    #[inline]
    fn balance_delta(self) -> i8 {
        match self {
            Dir::Left => -1,
            Dir::Right => 1,
        }
    }
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

impl fmt::Display for Dir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dir::Left => f.write_str("left"),
            Dir::Right => f.write_str("right"),
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    balance: i8,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T> {
        AvlTree {
            base: BsTree::new(),
        }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.base.len()
    }

    /// Returns the underlying binary search tree.
    pub fn as_bst(&self) -> &BsTree<T> {
        &self.base
    }

    /// Returns the number of nodes on the longest path from the root to a leaf.
    ///
    /// Unlike [`BsTree::height`], this follows balance factors down the taller side of each
    /// subtree and completes in _O(log(n))_ time.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut opt_cur = self.base.root;

        while let Some(cur) = opt_cur {
            height += 1;

            let links = unsafe { T::links(cur).as_ref() };
            opt_cur = if links.balance() < 0 {
                links.left()
            } else {
                links.right()
            };
        }

        height
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        self.base.assert_invariants();

        if let Some(root) = self.base.root {
            unsafe { self.assert_balanced_at(root) };
        }
    }

    // Returns the height of the subtree rooted at `node`.
    #[allow(clippy::only_used_in_recursion)]
    unsafe fn assert_balanced_at(&self, node: NonNull<T>) -> usize {
        unsafe {
            let links = T::links(node).as_ref();

            let left = links.left().map_or(0, |l| self.assert_balanced_at(l));
            let right = links.right().map_or(0, |r| self.assert_balanced_at(r));
            let balance = links.balance();

            assert_eq!(
                right as isize - left as isize,
                balance as isize,
                "balance factor of {:?} disagrees with its subtree heights",
                node.as_ref().key()
            );
            assert!(
                (-1..=1).contains(&balance),
                "{:?} is out of balance",
                node.as_ref().key()
            );

            1 + left.max(right)
        }
    }

    /// Returns a reference to the element corresponding to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.base.get(key)
    }

    /// Returns a pinned mutable reference to the element corresponding to `key`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that neither the links nor the key of the returned element are
    /// modified, as doing so may result in undefined behavior.
    pub unsafe fn get_mut<Q>(&mut self, key: &Q) -> Option<Pin<&mut T>>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut ptr = self.base.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_mut())) }
    }

    /// Returns `true` if the tree contains an element corresponding to `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.base.contains_key(key)
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        self.base.first()
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<Pin<&T>> {
        self.base.last()
    }

    /// Returns an iterator over the elements of the tree in ascending key order.
    pub fn iter(&self) -> Iter<'_, T> {
        self.base.iter()
    }

    /// Returns an iterator visiting every node before its children, left subtree first.
    pub fn iter_preorder(&self) -> PreOrderIter<'_, T> {
        self.base.iter_preorder()
    }

    /// Returns an iterator visiting every node after its children, left subtree first.
    pub fn iter_postorder(&self) -> PostOrderIter<'_, T> {
        self.base.iter_postorder()
    }

    /// Returns a cursor pointing at the minimum element of the tree.
    pub fn cursor_first(&self) -> Cursor<'_, T> {
        self.base.cursor_first()
    }

    /// Returns a cursor pointing at the maximum element of the tree.
    pub fn cursor_last(&self) -> Cursor<'_, T> {
        self.base.cursor_last()
    }

    /// Returns a cursor pointing at the element corresponding to `key`, or at the "ghost"
    /// non-element if there is none.
    pub fn cursor_at<Q>(&self, key: &Q) -> Cursor<'_, T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.base.cursor_at(key)
    }

    /// Returns an editing cursor pointing at the minimum element of the tree.
    pub fn cursor_first_mut(&mut self) -> CursorMut<'_, T> {
        let ptr = self.base.root.map(|root| unsafe { find_minimum(root) });
        CursorMut::new(self, ptr)
    }

    /// Returns an editing cursor pointing at the maximum element of the tree.
    pub fn cursor_last_mut(&mut self) -> CursorMut<'_, T> {
        let ptr = self.base.root.map(|root| unsafe { find_maximum(root) });
        CursorMut::new(self, ptr)
    }

    /// Returns an editing cursor pointing at the element corresponding to `key`, or at the "ghost"
    /// non-element if there is none.
    pub fn cursor_at_mut<Q>(&mut self, key: &Q) -> CursorMut<'_, T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let ptr = self.base.get_raw(key);
        CursorMut::new(self, ptr)
    }

    /// Returns the entry corresponding to `key`, which may be vacant or occupied.
    pub fn entry<'tree, 'key, Q>(&'tree mut self, key: &'key Q) -> Entry<'tree, 'key, T, Q>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match self.base.search(key) {
            Search::Found(node) => Entry::Occupied(OccupiedEntry { tree: self, node }),
            Search::Vacant(insert_as) => Entry::Vacant(VacantEntry {
                tree: self,
                key,
                insert_as,
            }),
        }
    }

    /// Inserts an item into the tree.
    ///
    /// If the tree already holds an element with an equal key, `item` takes over its position and
    /// balance factor, and the old element is returned. The shape of the tree does not change in
    /// that case.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> Option<T::Handle> {
        let ptr = T::into_ptr(item);

        match self.base.search(unsafe { ptr.as_ref() }.key()) {
            Search::Found(existing) => Some(unsafe { self.base.replace_node(existing, ptr) }),
            Search::Vacant(insert_as) => {
                unsafe { self.insert_at(insert_as, ptr) };
                None
            }
        }
    }

    // Links `ptr` at the vacant position `insert_as` and restores balance.
    //
    // # Safety
    //
    // `insert_as` must have been produced by a search for `ptr`'s key with no modification of the
    // tree since.
    pub(crate) unsafe fn insert_at(&mut self, insert_as: InsertAs<T>, ptr: NonNull<T>) {
        unsafe {
            self.base.link_at(insert_as, ptr);

            let InsertAs::Child { parent, dir } = insert_as else {
                return;
            };

            // The parent was a valid insertion point, so it had at most one child. If it leaned
            // toward that child, the new node fills the empty side and the parent's height holds.
            if T::links(parent).as_ref().balance() != 0 {
                T::links(parent).as_mut().set_balance(0);
                return;
            }

            T::links(parent).as_mut().set_balance(dir.balance_delta());
            self.insert_fix(parent, ptr);
        }
    }

    // Performs a bottom-up rebalance after the subtree rooted at `parent` grew by one through its
    // child `child`.
    //
    // Invariants:
    // - `b(parent)` has already been updated and is ±1.
    // - `child` is a child of `parent`.
    fn insert_fix(&mut self, mut parent: NonNull<T>, mut child: NonNull<T>) {
        unsafe {
            while let Some(grandparent) = T::links(parent).as_ref().parent() {
                let dir = which_child(grandparent, parent);
                let balance = T::links(grandparent).as_ref().balance() + dir.balance_delta();

                match balance {
                    // The growth filled the shorter side; h(grandparent) is unchanged.
                    0 => {
                        T::links(grandparent).as_mut().set_balance(0);
                        trace!("insert fix-up absorbed at {:?}", grandparent.as_ref().key());
                        return;
                    }

                    // h(grandparent) grew as well; ascend.
                    -1 | 1 => {
                        T::links(grandparent).as_mut().set_balance(balance);
                        child = parent;
                        parent = grandparent;
                    }

                    // Either rotation returns the subtree to its height before the insertion.
                    _ => {
                        if which_child(parent, child) == dir {
                            self.rotate(grandparent, !dir);
                            T::links(parent).as_mut().set_balance(0);
                            T::links(grandparent).as_mut().set_balance(0);
                        } else {
                            self.rotate_twice(grandparent, parent, dir);
                        }

                        return;
                    }
                }
            }
        }
    }

    /// Removes the element corresponding to `key` from the tree and returns it.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T::Handle>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self.base.get_raw(key)?;
        Some(unsafe { self.remove_at(node) })
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let first = unsafe { find_minimum(self.base.root?) };
        Some(unsafe { self.remove_at(first) })
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let last = unsafe { find_maximum(self.base.root?) };
        Some(unsafe { self.remove_at(last) })
    }

    // Removes `node` from the tree and restores balance.
    //
    // # Safety
    //
    // `node` must be an element of `self`.
    pub(crate) unsafe fn remove_at(&mut self, node: NonNull<T>) -> T::Handle {
        unsafe {
            let (left, right) = {
                let links = T::links(node).as_ref();
                (links.left(), links.right())
            };

            // A node with two children trades places with its predecessor, which has no right
            // child. Afterwards `node` has at most one child.
            if let (Some(left), Some(_)) = (left, right) {
                self.base.swap_positions(node, find_maximum(left));
            }

            if let Some((parent, dir)) = self.base.unlink(node) {
                // The side `node` was removed from shrank, so `parent` now leans the other way.
                self.remove_fix(parent, -dir.balance_delta());
            }

            T::from_ptr(node)
        }
    }

    // Performs a bottom-up rebalance after the subtree on one side of `node` shrank by one.
    //
    // `diff` is the change to `b(node)` and is ±1.
    fn remove_fix(&mut self, node: NonNull<T>, mut diff: i8) {
        let mut opt_node = Some(node);

        unsafe {
            while let Some(node) = opt_node {
                // Decided before any rotation moves `node` away from its parent.
                let parent = T::links(node).as_ref().parent();
                let next_diff = parent.map_or(0, |p| -which_child(p, node).balance_delta());

                let balance = T::links(node).as_ref().balance() + diff;

                match balance {
                    // h(node) is unchanged; stop.
                    -1 | 1 => {
                        T::links(node).as_mut().set_balance(balance);
                        trace!("remove fix-up absorbed at {:?}", node.as_ref().key());
                        return;
                    }

                    // h(node) shrank; ascend.
                    0 => T::links(node).as_mut().set_balance(0),

                    _ => {
                        let heavy = if balance < 0 { Dir::Left } else { Dir::Right };
                        let delta = heavy.balance_delta();

                        let child = T::links(node)
                            .as_ref()
                            .child(heavy)
                            .expect("doubly unbalanced node must have a child on its heavy side");
                        let child_balance = T::links(child).as_ref().balance();

                        if child_balance == -delta {
                            self.rotate_twice(node, child, heavy);
                        } else {
                            self.rotate(node, !heavy);

                            if child_balance == 0 {
                                // The rotated subtree keeps its height; stop.
                                T::links(node).as_mut().set_balance(delta);
                                T::links(child).as_mut().set_balance(-delta);
                                return;
                            }

                            T::links(node).as_mut().set_balance(0);
                            T::links(child).as_mut().set_balance(0);
                        }
                    }
                }

                opt_node = parent;
                diff = next_diff;
            }
        }
    }

    // Performs a rotation, moving `node` down toward `dir` and its `!dir` child up into its place.
    //
    // Does nothing if `node` has no `!dir` child. Balance factors are not updated.
    fn rotate(&mut self, node: NonNull<T>, dir: Dir) {
        unsafe {
            let Some(pivot) = T::links(node).as_ref().child(!dir) else {
                return;
            };

            // The pivot's inner subtree moves across to `node`.
            let inner = T::links(pivot).as_ref().child(dir);
            T::links(node).as_mut().set_child(!dir, inner);
            self.base.maybe_set_parent(inner, Some(node));

            let parent = T::links(node).as_mut().set_parent(Some(pivot));
            T::links(pivot).as_mut().set_child(dir, Some(node));
            T::links(pivot).as_mut().set_parent(parent);
            self.base.replace_child_or_set_root(parent, node, Some(pivot));

            trace!("rotated {:?} {dir}", node.as_ref().key());
        }
    }

    // Resolves a zig-zag: `node` is doubly `heavy`-heavy while its `heavy` child `child` leans the
    // other way. The grandchild on `child`'s inner side rises to the top of the subtree.
    //
    // Balance factors of all three nodes are updated.
    fn rotate_twice(&mut self, node: NonNull<T>, child: NonNull<T>, heavy: Dir) {
        unsafe {
            let grandchild = T::links(child)
                .as_ref()
                .child(!heavy)
                .expect("inner grandchild must exist in a zig-zag");
            let delta = heavy.balance_delta();

            let (node_balance, child_balance) = match T::links(grandchild).as_ref().balance() {
                0 => (0, 0),
                b if b == delta => (-delta, 0),
                _ => (0, delta),
            };

            self.rotate(child, heavy);
            self.rotate(node, !heavy);

            T::links(node).as_mut().set_balance(node_balance);
            T::links(child).as_mut().set_balance(child_balance);
            T::links(grandchild).as_mut().set_balance(0);
        }
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        self.base.clear();
    }
}

impl<T> Default for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AvlTree<T>
where
    T: TreeNode<Links<T>> + fmt::Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                balance: 0,
                _unpin: PhantomPinned,
            }),
        }
    }

    #[inline]
    fn balance(&self) -> i8 {
        unsafe { (*self.inner.get()).balance }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_balance(&mut self, balance: i8) {
        debug_assert!((-1..=1).contains(&balance));
        self.inner.get_mut().balance = balance;
    }

    #[inline]
    fn clear(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = None;
        inner.children = [None; 2];
        inner.balance = 0;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("balance", &self.balance())
            .finish()
    }
}

// SAFETY: Links are only accessed through the tree that owns the element, which is itself only
// `Send`/`Sync` when its elements are.
unsafe impl<T: Send + ?Sized> Send for Links<T> {}
unsafe impl<T: Sync + ?Sized> Sync for Links<T> {}
