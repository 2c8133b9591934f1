//! `DomMutator` over the live browser DOM.

use rill_core::{DomError, DomMutator};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, HtmlTemplateElement, Node};

fn js_error(error: JsValue) -> DomError {
    DomError::Operation(
        error
            .as_string()
            .unwrap_or_else(|| format!("{error:?}")),
    )
}

fn as_element(node: &Node) -> Result<&Element, DomError> {
    node.dyn_ref::<Element>()
        .ok_or_else(|| DomError::from("expected an element"))
}

/// Browser DOM backend. Markup fragments are parsed through a `<template>`
/// element so scripts never run and nothing touches the live tree until it
/// is inserted.
#[derive(Debug, Clone)]
pub struct BrowserDom {
    document: Document,
}

impl BrowserDom {
    /// Backend for the current window's document.
    pub fn new() -> Result<Self, DomError> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| DomError::from("no document available"))?;
        Ok(Self { document })
    }

    pub fn from_document(document: Document) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }
}

impl DomMutator for BrowserDom {
    type Node = Node;

    fn children(&self, parent: &Node) -> Vec<Node> {
        let list = parent.child_nodes();
        (0..list.length()).filter_map(|i| list.item(i)).collect()
    }

    fn parent(&self, node: &Node) -> Option<Node> {
        node.parent_node()
    }

    fn is_text(&self, node: &Node) -> bool {
        node.node_type() == Node::TEXT_NODE
    }

    fn text_content(&self, node: &Node) -> String {
        node.text_content().unwrap_or_default()
    }

    fn attribute(&self, node: &Node, name: &str) -> Option<String> {
        node.dyn_ref::<Element>()?.get_attribute(name)
    }

    fn find_by_attribute(&self, root: &Node, name: &str, value: Option<&str>) -> Vec<Node> {
        let Some(element) = root.dyn_ref::<Element>() else {
            return Vec::new();
        };
        // Values are compared here rather than in the selector so they never
        // need CSS escaping.
        let matches = |el: &Element| match value {
            Some(value) => el.get_attribute(name).as_deref() == Some(value),
            None => el.has_attribute(name),
        };

        let mut found = Vec::new();
        if matches(element) {
            found.push(root.clone());
        }
        match element.query_selector_all(&format!("[{name}]")) {
            Ok(list) => {
                for i in 0..list.length() {
                    let Some(node) = list.item(i) else { continue };
                    if node.dyn_ref::<Element>().is_some_and(|el| matches(el)) {
                        found.push(node);
                    }
                }
            }
            Err(error) => {
                tracing::warn!(target: "rill::browser", name, ?error, "attribute query failed");
            }
        }
        found
    }

    fn contains(&self, root: &Node, node: &Node) -> bool {
        root.contains(Some(node))
    }

    fn set_text(&mut self, node: &Node, text: &str) -> Result<(), DomError> {
        node.set_text_content(Some(text));
        Ok(())
    }

    fn set_attribute(&mut self, node: &Node, name: &str, value: &str) -> Result<(), DomError> {
        as_element(node)?
            .set_attribute(name, value)
            .map_err(js_error)
    }

    fn remove_attribute(&mut self, node: &Node, name: &str) -> Result<(), DomError> {
        as_element(node)?.remove_attribute(name).map_err(js_error)
    }

    fn set_inner_markup(&mut self, node: &Node, markup: &str) -> Result<(), DomError> {
        as_element(node)?.set_inner_html(markup);
        Ok(())
    }

    fn create_text(&mut self, text: &str) -> Result<Node, DomError> {
        Ok(self.document.create_text_node(text).into())
    }

    fn create_from_markup(&mut self, markup: &str) -> Result<Node, DomError> {
        let template: HtmlTemplateElement = self
            .document
            .create_element("template")
            .map_err(js_error)?
            .dyn_into()
            .map_err(|_| DomError::from("template element unavailable"))?;
        template.set_inner_html(markup);
        let fragment: Node = template.content().into();

        let mut roots = self.children(&fragment);
        if roots.len() > 1 {
            roots.retain(|node| {
                !(self.is_text(node) && self.text_content(node).trim().is_empty())
            });
        }
        if let [only] = roots.as_slice() {
            fragment.remove_child(only).map_err(js_error)?;
            return Ok(only.clone());
        }

        let wrapper: Node = self.document.create_element("div").map_err(js_error)?.into();
        for root in &roots {
            wrapper.append_child(root).map_err(js_error)?;
        }
        Ok(wrapper)
    }

    fn insert_before(
        &mut self,
        parent: &Node,
        child: &Node,
        reference: Option<&Node>,
    ) -> Result<(), DomError> {
        parent
            .insert_before(child, reference)
            .map(|_| ())
            .map_err(js_error)
    }

    fn replace_child(&mut self, parent: &Node, new: &Node, old: &Node) -> Result<(), DomError> {
        parent.replace_child(new, old).map(|_| ()).map_err(js_error)
    }

    fn remove(&mut self, node: &Node) -> Result<(), DomError> {
        match node.parent_node() {
            Some(parent) => parent.remove_child(node).map(|_| ()).map_err(js_error),
            None => Ok(()),
        }
    }

    fn clear(&mut self, node: &Node) -> Result<(), DomError> {
        node.set_text_content(None);
        Ok(())
    }
}
