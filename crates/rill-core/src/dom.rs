//! DOM capability the reconciler writes through.
//!
//! The browser implementation wraps `web_sys` nodes; [`MemoryDom`](crate::MemoryDom)
//! is an in-process tree used natively and in tests.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
pub enum DomError {
    #[error("dom operation failed: {0}")]
    #[diagnostic(code(rill::dom::operation))]
    Operation(String),

    #[error("node is not attached to its expected parent")]
    #[diagnostic(code(rill::dom::detached))]
    Detached,
}

impl From<&str> for DomError {
    fn from(s: &str) -> Self {
        DomError::Operation(s.to_string())
    }
}

impl From<String> for DomError {
    fn from(s: String) -> Self {
        DomError::Operation(s)
    }
}

/// Node-level DOM operations.
///
/// Handles are cheap clones that compare equal when they refer to the same
/// live node. Child lists include text nodes.
pub trait DomMutator {
    type Node: Clone + PartialEq + std::fmt::Debug;

    fn children(&self, parent: &Self::Node) -> Vec<Self::Node>;

    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    fn is_text(&self, node: &Self::Node) -> bool;

    /// Text content of the node and its descendants.
    fn text_content(&self, node: &Self::Node) -> String;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    /// Descendants of `root` (and `root` itself) carrying attribute `name`,
    /// optionally with an exact `value`, in document order.
    fn find_by_attribute(
        &self,
        root: &Self::Node,
        name: &str,
        value: Option<&str>,
    ) -> Vec<Self::Node>;

    /// Whether `node` is `root` or one of its descendants.
    fn contains(&self, root: &Self::Node, node: &Self::Node) -> bool;

    /// Text node data, or the full text content of an element.
    fn set_text(&mut self, node: &Self::Node, text: &str) -> Result<(), DomError>;

    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str)
    -> Result<(), DomError>;

    fn remove_attribute(&mut self, node: &Self::Node, name: &str) -> Result<(), DomError>;

    fn set_inner_markup(&mut self, node: &Self::Node, markup: &str) -> Result<(), DomError>;

    fn create_text(&mut self, text: &str) -> Result<Self::Node, DomError>;

    /// Build a detached node from a markup fragment. A fragment with several
    /// top-level nodes is wrapped in one `div`.
    fn create_from_markup(&mut self, markup: &str) -> Result<Self::Node, DomError>;

    /// Insert `child` before `reference`, or append when `reference` is `None`.
    fn insert_before(
        &mut self,
        parent: &Self::Node,
        child: &Self::Node,
        reference: Option<&Self::Node>,
    ) -> Result<(), DomError>;

    fn replace_child(
        &mut self,
        parent: &Self::Node,
        new: &Self::Node,
        old: &Self::Node,
    ) -> Result<(), DomError>;

    /// Detach `node` from its parent.
    fn remove(&mut self, node: &Self::Node) -> Result<(), DomError>;

    /// Remove every child of `node`.
    fn clear(&mut self, node: &Self::Node) -> Result<(), DomError> {
        for child in self.children(node) {
            self.remove(&child)?;
        }
        Ok(())
    }
}
