use std::ptr::NonNull;

use cordyceps::Linked;
use cordyceps_avl::{AvlMap, AvlTree, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
struct Node {
    links: Links<Node>,
    key: u32,
}

impl Node {
    fn new(key: u32) -> Box<Node> {
        Box::new(Node {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<Node>> for Node {
    type Handle = Box<Node>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<Node>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<Node>> for Node {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

fn keys(tree: &AvlTree<Node>) -> Vec<u32> {
    tree.iter().map(|node| node.key).collect()
}

fn main() {
    let mut tree: AvlTree<Node> = AvlTree::new();

    for key in [5, 3, 8, 1, 4, 7, 9, 2] {
        tree.insert(Node::new(key));
        tree.assert_invariants();
        println!("insert {key}: {:?} (height {})", keys(&tree), tree.height());
    }

    let one = tree.remove(&1).unwrap().key;
    assert_eq!(one, 1);
    tree.assert_invariants();
    println!("remove 1: {:?} (height {})", keys(&tree), tree.height());

    let mut dot = String::new();
    tree.dotgraph("demo", &mut dot).unwrap();
    println!("{dot}");

    let mut map = AvlMap::new();
    for (i, word) in ["pear", "apple", "fig", "plum", "kiwi"].into_iter().enumerate() {
        map.insert(word, i);
    }
    map.insert("fig", 10);

    println!("{map:?}");
    println!(
        "before fig: {:?}, after fig: {:?}",
        map.predecessor("fig"),
        map.successor("fig")
    );
}
