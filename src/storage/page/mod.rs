mod b_plus_tree_internal_page;
mod b_plus_tree_leaf_page;
mod b_plus_tree_page;
mod header_page;

pub use b_plus_tree_internal_page::{InternalPage, InternalPageMut};
pub use b_plus_tree_leaf_page::{LeafPage, LeafPageMut};
pub use b_plus_tree_page::{BPlusTreePage, BTreePageType};
pub use header_page::{HeaderPage, HeaderPageMut};

pub(crate) use b_plus_tree_page::set_node_parent_page_id;
