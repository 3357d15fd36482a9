//! The page operations the engine performs.
use crate::error::Result;

/// A page the engine can mutate.
///
/// Implementations are handles: cloning a page or a node yields another
/// handle to the same thing.
pub trait Page: Clone + 'static {
    /// A handle to one page node.
    type Node: Clone + 'static;

    fn create_element(&self, tag: &str) -> Result<Self::Node>;

    fn create_text(&self, text: &str) -> Result<Self::Node>;

    fn set_text(&self, node: &Self::Node, text: &str) -> Result<()>;

    /// Insert `child` into `parent` before `before`, or last if `before` is
    /// `None`. An attached `child` is moved.
    fn insert(&self, parent: &Self::Node, child: &Self::Node, before: Option<&Self::Node>)
        -> Result<()>;

    fn remove(&self, parent: &Self::Node, child: &Self::Node) -> Result<()>;

    fn set_attribute(&self, node: &Self::Node, name: &str, value: &str) -> Result<()>;

    fn remove_attribute(&self, node: &Self::Node, name: &str) -> Result<()>;
}

/// A page that can find nodes by selector.
pub trait Document: Page {
    /// The first node matching `selector`, in document order.
    fn query_selector(&self, selector: &str) -> Result<Option<Self::Node>>;

    /// Remove every child of `node`.
    fn clear(&self, node: &Self::Node) -> Result<()>;
}
