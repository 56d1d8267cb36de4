use core::{iter::FusedIterator, marker::PhantomData, ptr::NonNull};

use crate::{
    bst::{find_maximum, find_minimum, predecessor, successor},
    BsTree, Link, Links, TreeNode,
};

/// An iterator over the elements of a tree in ascending key order.
///
/// Created by [`BsTree::iter`] and [`AvlTree::iter`](crate::AvlTree::iter).
pub struct Iter<'tree, T: TreeNode<Links<T>> + ?Sized> {
    front: Link<T>,
    back: Link<T>,
    len: usize,
    _tree: PhantomData<&'tree BsTree<T>>,
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iter<'tree, T> {
    pub(crate) fn new(tree: &'tree BsTree<T>) -> Self {
        unsafe {
            Iter {
                front: tree.root.map(|root| find_minimum(root)),
                back: tree.root.map(|root| find_maximum(root)),
                len: tree.len(),
                _tree: PhantomData,
            }
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iterator for Iter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        // The front and back ends meet when `len` runs out.
        if self.len == 0 {
            return None;
        }

        let cur = self.front?;
        self.len -= 1;

        unsafe {
            self.front = successor(cur);
            Some(cur.as_ref())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> DoubleEndedIterator for Iter<'tree, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let cur = self.back?;
        self.len -= 1;

        unsafe {
            self.back = predecessor(cur);
            Some(cur.as_ref())
        }
    }
}

impl<T: TreeNode<Links<T>> + ?Sized> ExactSizeIterator for Iter<'_, T> {}

impl<T: TreeNode<Links<T>> + ?Sized> FusedIterator for Iter<'_, T> {}

impl<T: TreeNode<Links<T>> + ?Sized> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Iter {
            front: self.front,
            back: self.back,
            len: self.len,
            _tree: PhantomData,
        }
    }
}

/// An iterator visiting every node of a tree before its children, left subtree first.
///
/// Created by [`BsTree::iter_preorder`] and
/// [`AvlTree::iter_preorder`](crate::AvlTree::iter_preorder).
pub struct PreOrderIter<'tree, T: TreeNode<Links<T>> + ?Sized> {
    next: Link<T>,
    len: usize,
    _tree: PhantomData<&'tree BsTree<T>>,
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> PreOrderIter<'tree, T> {
    pub(crate) fn new(tree: &'tree BsTree<T>) -> Self {
        PreOrderIter {
            next: tree.root,
            len: tree.len(),
            _tree: PhantomData,
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iterator for PreOrderIter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next?;
        self.len -= 1;

        unsafe {
            self.next = preorder_next(cur);
            Some(cur.as_ref())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<T: TreeNode<Links<T>> + ?Sized> ExactSizeIterator for PreOrderIter<'_, T> {}

impl<T: TreeNode<Links<T>> + ?Sized> FusedIterator for PreOrderIter<'_, T> {}

impl<T: TreeNode<Links<T>> + ?Sized> Clone for PreOrderIter<'_, T> {
    fn clone(&self) -> Self {
        PreOrderIter {
            next: self.next,
            len: self.len,
            _tree: PhantomData,
        }
    }
}

/// An iterator visiting every node of a tree after its children, left subtree first.
///
/// Created by [`BsTree::iter_postorder`] and
/// [`AvlTree::iter_postorder`](crate::AvlTree::iter_postorder).
pub struct PostOrderIter<'tree, T: TreeNode<Links<T>> + ?Sized> {
    next: Link<T>,
    len: usize,
    _tree: PhantomData<&'tree BsTree<T>>,
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> PostOrderIter<'tree, T> {
    pub(crate) fn new(tree: &'tree BsTree<T>) -> Self {
        PostOrderIter {
            next: tree.root.map(|root| unsafe { deepest_first(root) }),
            len: tree.len(),
            _tree: PhantomData,
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iterator for PostOrderIter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next?;
        self.len -= 1;

        unsafe {
            self.next = postorder_next(cur);
            Some(cur.as_ref())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<T: TreeNode<Links<T>> + ?Sized> ExactSizeIterator for PostOrderIter<'_, T> {}

impl<T: TreeNode<Links<T>> + ?Sized> FusedIterator for PostOrderIter<'_, T> {}

impl<T: TreeNode<Links<T>> + ?Sized> Clone for PostOrderIter<'_, T> {
    fn clone(&self) -> Self {
        PostOrderIter {
            next: self.next,
            len: self.len,
            _tree: PhantomData,
        }
    }
}

unsafe fn preorder_next<T: TreeNode<Links<T>> + ?Sized>(node: NonNull<T>) -> Link<T> {
    unsafe {
        let links = T::links(node).as_ref();
        if let Some(child) = links.left().or(links.right()) {
            return Some(child);
        }

        // Ascend until a right subtree that hasn't been entered yet shows up.
        let mut cur = node;
        while let Some(parent) = T::links(cur).as_ref().parent() {
            let parent_links = T::links(parent).as_ref();
            if parent_links.left() == Some(cur) {
                if let Some(right) = parent_links.right() {
                    return Some(right);
                }
            }

            cur = parent;
        }

        None
    }
}

unsafe fn postorder_next<T: TreeNode<Links<T>> + ?Sized>(node: NonNull<T>) -> Link<T> {
    unsafe {
        let parent = T::links(node).as_ref().parent()?;
        let parent_links = T::links(parent).as_ref();

        // Coming up from a left child, the right subtree is still pending.
        match parent_links.right() {
            Some(right) if parent_links.left() == Some(node) => Some(deepest_first(right)),
            _ => Some(parent),
        }
    }
}

// The first node of the subtree in post-order: keep descending, preferring left children.
unsafe fn deepest_first<T: TreeNode<Links<T>> + ?Sized>(mut cur: NonNull<T>) -> NonNull<T> {
    unsafe {
        loop {
            let links = T::links(cur).as_ref();
            match links.left().or(links.right()) {
                Some(child) => cur = child,
                None => return cur,
            }
        }
    }
}
