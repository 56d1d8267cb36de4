use core::pin::Pin;

use crate::{
    bst::{find_maximum, find_minimum, predecessor, successor},
    AvlTree, BsTree, Link, Links, TreeNode,
};

/// A cursor over a tree.
///
/// A cursor points either to an element of the tree or to a "ghost" non-element that connects the
/// last element to the first.
pub struct Cursor<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    tree: &'tree BsTree<T>,
    ptr: Link<T>,
}

impl<'tree, T> Cursor<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) fn new(tree: &'tree BsTree<T>, ptr: Link<T>) -> Cursor<'tree, T> {
        Cursor { tree, ptr }
    }

    /// Moves the cursor to the next element of the tree.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method moves it to the first
    /// element. If it is pointing to the last element, this method moves it to the "ghost"
    /// non-element.
    pub fn move_next(&mut self) {
        self.ptr = next_of(self.tree, self.ptr);
    }

    /// Moves the cursor to the previous element of the tree.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method moves it to the last
    /// element. If it is pointing to the first element, this method moves it to the "ghost"
    /// non-element.
    pub fn move_prev(&mut self) {
        self.ptr = prev_of(self.tree, self.ptr);
    }

    /// Returns a reference to the item pointed to by the cursor.
    ///
    /// This returns `None` if the cursor is currently pointing to the "ghost" non-element.
    pub fn get(&self) -> Option<&'tree T> {
        self.ptr.map(|p| unsafe { p.as_ref() })
    }

    /// Returns a reference to the next item.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method returns the first element.
    /// If it is pointing to the last element, this method returns `None`.
    pub fn peek_next(&self) -> Option<&'tree T> {
        next_of(self.tree, self.ptr).map(|p| unsafe { p.as_ref() })
    }

    /// Returns a reference to the previous item, the in-order predecessor of the current one.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method returns the last element.
    /// If it is pointing to the first element, this method returns `None`.
    pub fn peek_prev(&self) -> Option<&'tree T> {
        prev_of(self.tree, self.ptr).map(|p| unsafe { p.as_ref() })
    }
}

impl<T> Clone for Cursor<'_, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn clone(&self) -> Self {
        Cursor {
            tree: self.tree,
            ptr: self.ptr,
        }
    }
}

/// A cursor over an [`AvlTree`] which supports editing operations.
///
/// A cursor points either to an element of the tree or to a "ghost" non-element that connects the
/// last element to the first.
pub struct CursorMut<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    tree: &'tree mut AvlTree<T>,
    ptr: Link<T>,
}

impl<'tree, T> CursorMut<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) fn new(tree: &'tree mut AvlTree<T>, ptr: Link<T>) -> CursorMut<'tree, T> {
        CursorMut { tree, ptr }
    }

    /// Returns a read-only cursor pointing to the current element.
    ///
    /// The `CursorMut` remains immutably borrowed for the lifetime of the returned `Cursor`.
    pub fn as_cursor(&self) -> Cursor<'_, T> {
        Cursor::new(&self.tree.base, self.ptr)
    }

    /// Moves the cursor to the next element of the tree. See [`Cursor::move_next`].
    pub fn move_next(&mut self) {
        self.ptr = next_of(&self.tree.base, self.ptr);
    }

    /// Moves the cursor to the previous element of the tree. See [`Cursor::move_prev`].
    pub fn move_prev(&mut self) {
        self.ptr = prev_of(&self.tree.base, self.ptr);
    }

    /// Returns a reference to the item pointed to by the cursor, or `None` at the "ghost"
    /// non-element.
    pub fn get(&self) -> Option<&T> {
        self.as_cursor().get()
    }

    /// Returns a pinned mutable reference to the item pointed to by the cursor.
    ///
    /// This returns `None` if the cursor is currently pointing to the "ghost" non-element.
    ///
    /// # Safety
    ///
    /// The caller must not modify the links or the key of the returned item.
    pub unsafe fn get_mut(&mut self) -> Option<Pin<&mut T>> {
        self.ptr.map(|mut p| unsafe { Pin::new_unchecked(p.as_mut()) })
    }

    /// Returns a reference to the next item. See [`Cursor::peek_next`].
    pub fn peek_next(&self) -> Option<&T> {
        self.as_cursor().peek_next()
    }

    /// Returns a reference to the previous item. See [`Cursor::peek_prev`].
    pub fn peek_prev(&self) -> Option<&T> {
        self.as_cursor().peek_prev()
    }

    /// Removes the current element from the tree.
    ///
    /// This returns the removed element and moves the cursor to the next element. If the cursor is
    /// pointing to the "ghost" non-element, this method returns `None`, and neither the tree nor
    /// the cursor is modified.
    pub fn remove_current(&mut self) -> Option<T::Handle> {
        let remove = self.ptr?;

        self.move_next();

        Some(unsafe { self.tree.remove_at(remove) })
    }

    /// Removes the current element from the tree.
    ///
    /// This returns the removed element and moves the cursor to the previous element. If the cursor is
    /// pointing to the "ghost" non-element, this method returns `None`, and neither the tree nor
    /// the cursor is modified.
    pub fn remove_current_and_move_prev(&mut self) -> Option<T::Handle> {
        let remove = self.ptr?;

        self.move_prev();

        Some(unsafe { self.tree.remove_at(remove) })
    }
}

// Rebalancing never changes element identity, so a neighbor found before a removal is still an
// element of the tree afterwards.
fn next_of<T>(tree: &BsTree<T>, ptr: Link<T>) -> Link<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    unsafe {
        match ptr {
            Some(p) => successor(p),
            None => tree.root.map(|root| find_minimum(root)),
        }
    }
}

fn prev_of<T>(tree: &BsTree<T>, ptr: Link<T>) -> Link<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    unsafe {
        match ptr {
            Some(p) => predecessor(p),
            None => tree.root.map(|root| find_maximum(root)),
        }
    }
}
