//! Graphviz diagnostic dump, for visualizing a tree's shape while debugging
//! or demonstrating split/merge behavior. Not part of the tree's hot path.

use std::fmt::Display;
use std::io::{self, Write};
use std::ptr::NonNull;

use crate::alloc::PageAllocator;
use crate::comparator::KeyComparator;
use crate::layout::{carve_branch, carve_leaf};
use crate::BPlusTreeMap;

impl<K: Display, V: Display, C: KeyComparator<K>, A: PageAllocator> BPlusTreeMap<K, V, C, A> {
    /// Write a Graphviz `digraph` describing the current page structure:
    /// one record node per page (branch pages in red, leaves in black), and
    /// edges from each branch to its children.
    pub fn to_graph(&self, sink: &mut impl Write) -> io::Result<()> {
        writeln!(sink, "digraph T {{")?;
        writeln!(sink, "    rankdir=LR;")?;
        writeln!(sink, "    node [shape=record];")?;
        if let Some(root) = self.root {
            unsafe { self.write_page(sink, root)? };
        }
        writeln!(sink, "}}")
    }

    unsafe fn write_page(&self, sink: &mut impl Write, page: NonNull<u8>) -> io::Result<()> {
        let id = page.as_ptr() as usize;
        if crate::node::is_leaf(page) {
            let parts = carve_leaf::<K, V>(page, &self.leaf_layout);
            let len = (*parts.hdr).len as usize;
            let keys = std::slice::from_raw_parts(parts.keys_ptr as *const K, len);
            let vals = std::slice::from_raw_parts(parts.vals_ptr as *const V, len);

            let mut label = String::from("<head> leaf");
            for (i, (k, v)) in keys.iter().zip(vals.iter()).enumerate() {
                label.push_str(&format!("|<key_{i}> {{{k}|{v}}}"));
            }
            writeln!(sink, "    p{id} [label=\"{label}\", color=black];")?;
            Ok(())
        } else {
            let parts = carve_branch::<K>(page, &self.branch_layout);
            let len = (*parts.hdr).len as usize;
            let seps = std::slice::from_raw_parts(parts.keys_ptr as *const K, len);
            let children =
                std::slice::from_raw_parts(parts.children_ptr as *const *mut u8, len + 1);

            let mut label = String::from("<head> branch");
            for (i, k) in seps.iter().enumerate() {
                label.push_str(&format!("|<key_{i}> {k}"));
            }
            writeln!(sink, "    p{id} [label=\"{label}\", color=red];")?;
            for (i, child) in children.iter().enumerate() {
                let child = NonNull::new(*child).expect("branch child pointer must be non-null");
                let port = if i == 0 {
                    "head".to_string()
                } else {
                    format!("key_{}", i - 1)
                };
                writeln!(
                    sink,
                    "    p{id}:{port} -> p{}:head;",
                    child.as_ptr() as usize
                )?;
            }
            for child in children {
                let child = NonNull::new(*child).unwrap();
                self.write_page(sink, child)?;
            }
            Ok(())
        }
    }
}
