use core::{borrow::Borrow, cmp::Ordering, fmt, pin::Pin, ptr::NonNull};

use log::trace;

use crate::{
    cursor::Cursor,
    entry::InsertAs,
    iter::{Iter, PostOrderIter, PreOrderIter},
    Dir, Link, Links, TreeNode,
};

/// An intrusive binary search tree without rebalancing.
///
/// Insertions attach new elements wherever an ordered search ends, so the height of the tree
/// depends on the insertion order. [`AvlTree`](crate::AvlTree) is built on top of this type and
/// adds rebalancing; on its own it is mainly useful where the key distribution is known to be
/// random, or as a baseline.
pub struct BsTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) root: Link<T>,
    pub(crate) len: usize,
}

// The result of an ordered search.
pub(crate) enum Search<T: ?Sized> {
    Found(NonNull<T>),
    Vacant(InsertAs<T>),
}

impl<T> BsTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> BsTree<T> {
        BsTree { root: None, len: 0 }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the number of nodes on the longest path from the root to a leaf.
    ///
    /// This visits every node.
    pub fn height(&self) -> usize {
        let Some(mut cur) = self.root else {
            return 0;
        };

        let mut depth = 1;
        let mut height = 1;

        unsafe {
            loop {
                height = height.max(depth);

                let links = T::links(cur).as_ref();
                if let Some(child) = links.left().or(links.right()) {
                    cur = child;
                    depth += 1;
                    continue;
                }

                // Climb until an unvisited right subtree appears.
                loop {
                    let Some(parent) = T::links(cur).as_ref().parent() else {
                        return height;
                    };
                    depth -= 1;

                    let parent_links = T::links(parent).as_ref();
                    if parent_links.left() == Some(cur) {
                        if let Some(right) = parent_links.right() {
                            cur = right;
                            depth += 1;
                            break;
                        }
                    }

                    cur = parent;
                }
            }
        }
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        let Some(root) = self.root else {
            assert_eq!(self.len, 0);
            return;
        };

        unsafe {
            assert_eq!(
                T::links(root).as_ref().parent(),
                None,
                "root must not have a parent"
            );
            assert_eq!(self.assert_ordered_at(root, None, None), self.len);
        }
    }

    // Returns the number of nodes in the subtree rooted at `node`, whose keys must lie strictly
    // between those of `lower` and `upper`.
    #[allow(clippy::only_used_in_recursion)]
    unsafe fn assert_ordered_at(&self, node: NonNull<T>, lower: Link<T>, upper: Link<T>) -> usize {
        unsafe {
            let key = node.as_ref().key();

            if let Some(lower) = lower {
                assert!(lower.as_ref().key() < key, "{key:?} is out of order");
            }

            if let Some(upper) = upper {
                assert!(key < upper.as_ref().key(), "{key:?} is out of order");
            }

            let mut count = 1;

            for (dir, lower, upper) in [
                (Dir::Left, lower, Some(node)),
                (Dir::Right, Some(node), upper),
            ] {
                if let Some(child) = T::links(node).as_ref().child(dir) {
                    // Ensure child's parent link points to this node.
                    let parent = T::links(child)
                        .as_ref()
                        .parent()
                        .expect("child parent pointer not set");
                    assert_eq!(node, parent);

                    count += self.assert_ordered_at(child, lower, upper);
                }
            }

            count
        }
    }

    /// Returns a reference to the element corresponding to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns `true` if the tree contains an element corresponding to `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get_raw(key).is_some()
    }

    pub(crate) fn get_raw<Q>(&self, key: &Q) -> Link<T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match self.search(key) {
            Search::Found(node) => Some(node),
            Search::Vacant(_) => None,
        }
    }

    // Descends from the root looking for `key`. If it is absent, returns the position where an
    // element with that key would be linked.
    pub(crate) fn search<Q>(&self, key: &Q) -> Search<T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let Some(mut cur) = self.root else {
            return Search::Vacant(InsertAs::Root);
        };

        loop {
            unsafe {
                let dir = match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => Dir::Left,
                    Ordering::Equal => return Search::Found(cur),
                    Ordering::Greater => Dir::Right,
                };

                match T::links(cur).as_ref().child(dir) {
                    Some(child) => cur = child,
                    None => return Search::Vacant(InsertAs::Child { parent: cur, dir }),
                }
            }
        }
    }

    // Returns the closest element strictly beyond `key` in direction `dir`: the greatest element
    // below `key` for `Dir::Left`, the least element above it for `Dir::Right`. `key` itself need
    // not be present.
    pub(crate) fn closest<Q>(&self, key: &Q, dir: Dir) -> Link<T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut best = None;
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            let ordering = key.cmp(unsafe { cur.as_ref() }.key().borrow());

            let is_candidate = match dir {
                Dir::Left => ordering == Ordering::Greater,
                Dir::Right => ordering == Ordering::Less,
            };

            // A candidate is replaced only by closer ones, which lie back toward `key`.
            let next = if is_candidate {
                best = Some(cur);
                !dir
            } else {
                dir
            };

            opt_cur = unsafe { T::links(cur).as_ref().child(next) };
        }

        best
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        let first = unsafe { find_minimum(self.root?) };
        unsafe { Some(Pin::new_unchecked(first.as_ref())) }
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<Pin<&T>> {
        let last = unsafe { find_maximum(self.root?) };
        unsafe { Some(Pin::new_unchecked(last.as_ref())) }
    }

    /// Returns an iterator over the elements of the tree in ascending key order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    /// Returns an iterator visiting every node before its children, left subtree first.
    pub fn iter_preorder(&self) -> PreOrderIter<'_, T> {
        PreOrderIter::new(self)
    }

    /// Returns an iterator visiting every node after its children, left subtree first.
    pub fn iter_postorder(&self) -> PostOrderIter<'_, T> {
        PostOrderIter::new(self)
    }

    /// Returns a cursor pointing at the minimum element of the tree.
    pub fn cursor_first(&self) -> Cursor<'_, T> {
        Cursor::new(self, self.root.map(|root| unsafe { find_minimum(root) }))
    }

    /// Returns a cursor pointing at the maximum element of the tree.
    pub fn cursor_last(&self) -> Cursor<'_, T> {
        Cursor::new(self, self.root.map(|root| unsafe { find_maximum(root) }))
    }

    /// Returns a cursor pointing at the element corresponding to `key`, or at the "ghost"
    /// non-element if there is none.
    pub fn cursor_at<Q>(&self, key: &Q) -> Cursor<'_, T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Cursor::new(self, self.get_raw(key))
    }

    /// Inserts an item into the tree without rebalancing.
    ///
    /// If the tree already holds an element with an equal key, `item` takes its place and the old
    /// element is returned.
    pub fn insert(&mut self, item: T::Handle) -> Option<T::Handle> {
        let ptr = T::into_ptr(item);

        match self.search(unsafe { ptr.as_ref() }.key()) {
            Search::Found(existing) => Some(unsafe { self.replace_node(existing, ptr) }),
            Search::Vacant(insert_as) => {
                unsafe { self.link_at(insert_as, ptr) };
                None
            }
        }
    }

    /// Removes the element corresponding to `key` without rebalancing and returns it.
    ///
    /// An element with two children first trades places with its in-order predecessor.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T::Handle>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self.get_raw(key)?;

        unsafe {
            let (left, right) = {
                let links = T::links(node).as_ref();
                (links.left(), links.right())
            };

            if let (Some(left), Some(_)) = (left, right) {
                self.swap_positions(node, find_maximum(left));
            }

            self.unlink(node);

            Some(T::from_ptr(node))
        }
    }

    // Links the detached node `ptr` into the tree at `insert_as`.
    //
    // # Safety
    //
    // `insert_as` must be a vacant position in `self` where `ptr`'s key belongs.
    pub(crate) unsafe fn link_at(&mut self, insert_as: InsertAs<T>, ptr: NonNull<T>) {
        unsafe {
            T::links(ptr).as_mut().clear();

            match insert_as {
                InsertAs::Root => {
                    debug_assert!(self.root.is_none(), "tree must be empty");
                    self.root = Some(ptr);
                }

                InsertAs::Child { parent, dir } => {
                    let old = T::links(parent).as_mut().set_child(dir, Some(ptr));
                    debug_assert!(old.is_none(), "insertion point must be vacant");
                    T::links(ptr).as_mut().set_parent(Some(parent));
                }
            }
        }

        self.len += 1;
    }

    // Puts the detached node `new` in the place of `old`, which is unlinked and returned. `new`
    // takes over `old`'s balance factor.
    //
    // # Safety
    //
    // `old` must be an element of `self` and `new`'s key must equal `old`'s.
    pub(crate) unsafe fn replace_node(&mut self, old: NonNull<T>, new: NonNull<T>) -> T::Handle {
        unsafe {
            let (parent, left, right, balance) = {
                let links = T::links(old).as_ref();
                (links.parent(), links.left(), links.right(), links.balance())
            };

            self.replace_child_or_set_root(parent, old, Some(new));
            self.maybe_set_parent(left, Some(new));
            self.maybe_set_parent(right, Some(new));

            let new_links = T::links(new).as_mut();
            new_links.set_parent(parent);
            new_links.set_child(Dir::Left, left);
            new_links.set_child(Dir::Right, right);
            new_links.set_balance(balance);

            T::links(old).as_mut().clear();

            trace!("replaced {:?} in place", new.as_ref().key());

            T::from_ptr(old)
        }
    }

    // Exchanges the tree positions of `a` and `b`, including their balance factors. Both nodes
    // keep their identity; only the links around them change.
    //
    // # Safety
    //
    // Both nodes must be elements of `self`. The caller is responsible for the ordering invariant
    // until one of them is unlinked.
    pub(crate) unsafe fn swap_positions(&mut self, a: NonNull<T>, b: NonNull<T>) {
        if a == b {
            return;
        }

        unsafe {
            let read = |node: NonNull<T>| {
                let links = T::links(node).as_ref();
                let parent = links.parent();
                let side = parent.map(|p| which_child(p, node));
                (parent, side, [links.left(), links.right()], links.balance())
            };

            let (a_parent, a_side, a_children, a_balance) = read(a);
            let (b_parent, b_side, b_children, b_balance) = read(b);

            // Where one node is adjacent to the other, the link must point back at the node
            // itself after the exchange.
            let swap_ref = |link: Link<T>| match link {
                Some(n) if n == a => Some(b),
                Some(n) if n == b => Some(a),
                other => other,
            };

            let new_a_parent = swap_ref(b_parent);
            let new_b_parent = swap_ref(a_parent);
            let new_a_children = b_children.map(swap_ref);
            let new_b_children = a_children.map(swap_ref);

            // Re-point the parents' child slots. A parent that is one of the swapped nodes is
            // handled by the children arrays above.
            match (b_parent, b_side) {
                (Some(p), Some(side)) if p != a => {
                    T::links(p).as_mut().set_child(side, Some(a));
                }
                (None, _) => self.root = Some(a),
                _ => {}
            }

            match (a_parent, a_side) {
                (Some(p), Some(side)) if p != b => {
                    T::links(p).as_mut().set_child(side, Some(b));
                }
                (None, _) => self.root = Some(b),
                _ => {}
            }

            for (node, parent, children, balance) in [
                (a, new_a_parent, new_a_children, b_balance),
                (b, new_b_parent, new_b_children, a_balance),
            ] {
                let links = T::links(node).as_mut();
                links.set_parent(parent);
                links.set_child(Dir::Left, children[0]);
                links.set_child(Dir::Right, children[1]);
                links.set_balance(balance);
            }

            for (node, children) in [(a, new_a_children), (b, new_b_children)] {
                for child in children {
                    self.maybe_set_parent(child, Some(node));
                }
            }
        }
    }

    // Splices `node`, which has at most one child, out of the tree. Its child (if any) takes its
    // place.
    //
    // Returns `node`'s former parent and the side of it `node` occupied, or `None` if `node` was
    // the root.
    //
    // # Safety
    //
    // `node` must be an element of `self` with at most one child.
    pub(crate) unsafe fn unlink(&mut self, node: NonNull<T>) -> Option<(NonNull<T>, Dir)> {
        unsafe {
            let (parent, left, right) = {
                let links = T::links(node).as_ref();
                (links.parent(), links.left(), links.right())
            };

            debug_assert!(
                left.is_none() || right.is_none(),
                "only nodes with at most one child can be unlinked"
            );

            let child = left.or(right);
            let side = parent.map(|p| which_child(p, node));

            self.replace_child_or_set_root(parent, node, child);
            self.maybe_set_parent(child, parent);

            T::links(node).as_mut().clear();
            self.len -= 1;

            parent.zip(side)
        }
    }

    pub(crate) unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { T::links(node).as_mut().set_parent(parent) };
    }

    #[inline]
    pub(crate) unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Option<NonNull<T>>,
    ) {
        unsafe {
            let dir = which_child(parent, old_child);

            debug_assert_eq!(
                T::links(parent).as_ref().child(dir),
                Some(old_child),
                "`old_child` must be a child of `parent`"
            );
            if let Some(new_child) = new_child {
                debug_assert_ne!(
                    T::links(parent).as_ref().child(!dir),
                    Some(new_child),
                    "`new_child` must not be a child of `parent`"
                );
            }

            T::links(parent).as_mut().set_child(dir, new_child);
        }
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let cur = find_minimum(cur);
                let parent = T::links(cur).as_ref().parent();
                let right = T::links(cur).as_ref().right();

                // Elevate the node's right child (which may be None).
                self.replace_child_or_set_root(parent, cur, right);
                self.maybe_set_parent(right, parent);

                // Drop the node.
                T::links(cur).as_mut().clear();
                drop(T::from_ptr(cur));
                self.len -= 1;

                // If the node had no right child, climb to the parent. If the node had no parent,
                // the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }
}

impl<T> Drop for BsTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T> Default for BsTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BsTree<T>
where
    T: TreeNode<Links<T>> + fmt::Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

// SAFETY: The tree owns its elements through their handles, so it can move between threads
// whenever those can. Shared access never mutates links.
unsafe impl<T> Send for BsTree<T>
where
    T: TreeNode<Links<T>> + Send + ?Sized,
    T::Handle: Send,
{
}

unsafe impl<T> Sync for BsTree<T> where T: TreeNode<Links<T>> + Sync + ?Sized {}

#[inline]
pub(crate) unsafe fn which_child<T>(parent: NonNull<T>, child: NonNull<T>) -> Dir
where
    T: TreeNode<Links<T>> + ?Sized,
{
    if unsafe { T::links(parent).as_ref().left() } == Some(child) {
        Dir::Left
    } else {
        Dir::Right
    }
}

pub(crate) unsafe fn find_minimum<T>(mut cur: NonNull<T>) -> NonNull<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    while let Some(left) = unsafe { T::links(cur).as_ref().left() } {
        cur = left;
    }

    cur
}

pub(crate) unsafe fn find_maximum<T>(mut cur: NonNull<T>) -> NonNull<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    while let Some(right) = unsafe { T::links(cur).as_ref().right() } {
        cur = right;
    }

    cur
}

/// Returns the in-order successor of `node`.
pub(crate) unsafe fn successor<T>(node: NonNull<T>) -> Link<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    unsafe { neighbor(node, Dir::Right) }
}

/// Returns the in-order predecessor of `node`.
pub(crate) unsafe fn predecessor<T>(node: NonNull<T>) -> Link<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    unsafe { neighbor(node, Dir::Left) }
}

// The nearest node in direction `dir`: the extreme of the `dir` subtree if there is one, otherwise
// the first ancestor reached from its `!dir` side.
unsafe fn neighbor<T>(node: NonNull<T>, dir: Dir) -> Link<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    unsafe {
        if let Some(mut cur) = T::links(node).as_ref().child(dir) {
            while let Some(next) = T::links(cur).as_ref().child(!dir) {
                cur = next;
            }

            return Some(cur);
        }

        let mut cur = node;
        while let Some(parent) = T::links(cur).as_ref().parent() {
            if T::links(parent).as_ref().child(!dir) == Some(cur) {
                return Some(parent);
            }

            cur = parent;
        }

        None
    }
}
