use core::fmt::{self, Write};

use crate::{AvlTree, Dir, Links, TreeNode};

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>>,
    T::Key: fmt::Display,
{
    /// Writes the tree in Graphviz dot format, labelling every node `key:balance`.
    ///
    /// Missing children are drawn as points so that left and right stay distinguishable.
    pub fn dotgraph<W>(&self, name: &str, mut w: W) -> fmt::Result
    where
        W: Write,
    {
        if self.is_empty() {
            return write!(w, "digraph \"graph-{name}\" {{}}");
        }

        writeln!(w, "digraph \"graph-{name}\" {{")?;

        let mut missing = 0;
        for node in self.iter_preorder() {
            let key = node.key();
            let links = unsafe { T::links(node.into()).as_ref() };

            writeln!(
                w,
                "  \"graph{name}-{key}\" [label=\"{key}:{}\"];",
                links.balance()
            )?;

            for dir in [Dir::Left, Dir::Right] {
                match links.child(dir) {
                    Some(child) => {
                        let child_key = unsafe { child.as_ref().key() };
                        writeln!(w, "  \"graph{name}-{key}\" -> \"graph{name}-{child_key}\";")?;
                    }
                    None => {
                        writeln!(w, "  \"graph{name}-missing{missing}\" [shape=point];")?;
                        writeln!(w, "  \"graph{name}-{key}\" -> \"graph{name}-missing{missing}\";")?;
                        missing += 1;
                    }
                }
            }
        }

        w.write_str("}")
    }
}
