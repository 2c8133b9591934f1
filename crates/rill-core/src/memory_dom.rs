//! In-process DOM tree.
//!
//! Implements [`DomMutator`] over an arena of nodes. Markup fragments are read
//! with a small tolerant parser: unknown constructs degrade to text, stray end
//! tags are ignored, void elements never take children and anything left open
//! closes at end of input. Every mutating call bumps a counter so callers can
//! assert exactly how much work a reconciliation did.

use html_escape::decode_html_entities;
use pulldown_cmark_escape::{escape_html, escape_html_body_text};
use smol_str::SmolStr;

use crate::dom::{DomError, DomMutator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        tag: SmolStr,
        attrs: Vec<(SmolStr, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Slot {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDom {
    nodes: Vec<Slot>,
    mutations: usize,
}

impl MemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    /// A detached element, typically used as a mount.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element {
            tag: SmolStr::new(tag.to_ascii_lowercase()),
            attrs: Vec::new(),
        })
    }

    /// Number of mutating operations performed so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        match &self.slot(node)?.data {
            NodeData::Element { tag, .. } => Some(tag.as_str()),
            NodeData::Text(_) => None,
        }
    }

    /// Element children only.
    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.slot(node)
            .map(|slot| {
                slot.children
                    .iter()
                    .copied()
                    .filter(|c| !self.is_text_id(*c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Descendant elements with the given tag, in document order.
    pub fn elements_by_tag(&self, root: NodeId, tag: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.visit(root, &mut |id, data| {
            if matches!(data, NodeData::Element { tag: t, .. } if t.eq_ignore_ascii_case(tag)) {
                found.push(id);
            }
        });
        found
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        if let Some(slot) = self.slot(node) {
            for child in &slot.children {
                self.write_html(&mut out, *child);
            }
        }
        out
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(&mut out, node);
        out
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Slot {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn slot(&self, node: NodeId) -> Option<&Slot> {
        self.nodes.get(node.0)
    }

    fn slot_mut(&mut self, node: NodeId) -> Result<&mut Slot, DomError> {
        self.nodes
            .get_mut(node.0)
            .ok_or_else(|| DomError::Operation(format!("unknown node {}", node.0)))
    }

    fn is_text_id(&self, node: NodeId) -> bool {
        matches!(self.slot(node).map(|s| &s.data), Some(NodeData::Text(_)))
    }

    fn visit(&self, node: NodeId, f: &mut impl FnMut(NodeId, &NodeData)) {
        if let Some(slot) = self.slot(node) {
            f(node, &slot.data);
            for child in &slot.children {
                self.visit(*child, f);
            }
        }
    }

    fn detach(&mut self, node: NodeId) -> Result<(), DomError> {
        let Some(parent) = self.slot(node).and_then(|s| s.parent) else {
            return Ok(());
        };
        self.slot_mut(parent)?.children.retain(|c| *c != node);
        self.slot_mut(node)?.parent = None;
        Ok(())
    }

    fn append_raw(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.slot_mut(parent)?.children.push(child);
        self.slot_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn clear_raw(&mut self, node: NodeId) -> Result<(), DomError> {
        let children = std::mem::take(&mut self.slot_mut(node)?.children);
        for child in children {
            self.slot_mut(child)?.parent = None;
        }
        Ok(())
    }

    fn write_html(&self, out: &mut String, node: NodeId) {
        let Some(slot) = self.slot(node) else {
            return;
        };
        match &slot.data {
            // Writing into a String cannot fail.
            NodeData::Text(text) => {
                let _ = escape_html_body_text(&mut *out, text);
            }
            NodeData::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    let _ = escape_html(&mut *out, value);
                    out.push('"');
                }
                out.push('>');
                if is_void_element(tag) {
                    return;
                }
                for child in &slot.children {
                    self.write_html(out, *child);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    /// Parse `markup` into detached top-level nodes.
    fn parse_fragment(&mut self, markup: &str) -> Vec<NodeId> {
        let mut roots = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        for token in tokenize(markup) {
            match token {
                Token::Text(text) => {
                    let id = self.alloc(NodeData::Text(text));
                    self.attach_parsed(&stack, &mut roots, id);
                }
                Token::Start {
                    name,
                    attrs,
                    self_closing,
                } => {
                    if closes_open_paragraph(&name)
                        && stack
                            .last()
                            .is_some_and(|top| self.tag_name(*top) == Some("p"))
                    {
                        stack.pop();
                    }
                    let void = self_closing || is_void_element(&name);
                    let id = self.alloc(NodeData::Element { tag: name, attrs });
                    self.attach_parsed(&stack, &mut roots, id);
                    if !void {
                        stack.push(id);
                    }
                }
                Token::End(name) => {
                    if let Some(pos) = stack
                        .iter()
                        .rposition(|open| self.tag_name(*open) == Some(name.as_str()))
                    {
                        stack.truncate(pos);
                    }
                }
            }
        }
        roots
    }

    fn attach_parsed(&mut self, stack: &[NodeId], roots: &mut Vec<NodeId>, id: NodeId) {
        match stack.last() {
            Some(parent) => {
                if let Some(slot) = self.nodes.get_mut(parent.0) {
                    slot.children.push(id);
                }
                if let Some(slot) = self.nodes.get_mut(id.0) {
                    slot.parent = Some(*parent);
                }
            }
            None => roots.push(id),
        }
    }
}

impl DomMutator for MemoryDom {
    type Node = NodeId;

    fn children(&self, parent: &NodeId) -> Vec<NodeId> {
        self.slot(*parent)
            .map(|s| s.children.clone())
            .unwrap_or_default()
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        self.slot(*node)?.parent
    }

    fn is_text(&self, node: &NodeId) -> bool {
        self.is_text_id(*node)
    }

    fn text_content(&self, node: &NodeId) -> String {
        let mut out = String::new();
        self.visit(*node, &mut |_, data| {
            if let NodeData::Text(text) = data {
                out.push_str(text);
            }
        });
        out
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        match &self.slot(*node)?.data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone()),
            NodeData::Text(_) => None,
        }
    }

    fn find_by_attribute(&self, root: &NodeId, name: &str, value: Option<&str>) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.visit(*root, &mut |id, data| {
            if let NodeData::Element { attrs, .. } = data {
                let hit = attrs
                    .iter()
                    .any(|(n, v)| n.eq_ignore_ascii_case(name) && value.is_none_or(|want| v == want));
                if hit {
                    found.push(id);
                }
            }
        });
        found
    }

    fn contains(&self, root: &NodeId, node: &NodeId) -> bool {
        let mut current = Some(*node);
        while let Some(id) = current {
            if id == *root {
                return true;
            }
            current = self.slot(id).and_then(|s| s.parent);
        }
        false
    }

    fn set_text(&mut self, node: &NodeId, text: &str) -> Result<(), DomError> {
        self.mutations += 1;
        if let NodeData::Text(data) = &mut self.slot_mut(*node)?.data {
            *data = text.to_string();
            return Ok(());
        }
        self.clear_raw(*node)?;
        if !text.is_empty() {
            let child = self.alloc(NodeData::Text(text.to_string()));
            self.append_raw(*node, child)?;
        }
        Ok(())
    }

    fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.mutations += 1;
        match &mut self.slot_mut(*node)?.data {
            NodeData::Element { attrs, .. } => {
                match attrs.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
                    Some((_, existing)) => *existing = value.to_string(),
                    None => attrs.push((SmolStr::new(name.to_ascii_lowercase()), value.to_string())),
                }
                Ok(())
            }
            NodeData::Text(_) => Err(DomError::from("cannot set an attribute on a text node")),
        }
    }

    fn remove_attribute(&mut self, node: &NodeId, name: &str) -> Result<(), DomError> {
        self.mutations += 1;
        if let NodeData::Element { attrs, .. } = &mut self.slot_mut(*node)?.data {
            attrs.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        }
        Ok(())
    }

    fn set_inner_markup(&mut self, node: &NodeId, markup: &str) -> Result<(), DomError> {
        self.mutations += 1;
        if self.is_text_id(*node) {
            return Err(DomError::from("cannot set markup on a text node"));
        }
        self.clear_raw(*node)?;
        for child in self.parse_fragment(markup) {
            self.append_raw(*node, child)?;
        }
        Ok(())
    }

    fn create_text(&mut self, text: &str) -> Result<NodeId, DomError> {
        Ok(self.alloc(NodeData::Text(text.to_string())))
    }

    fn create_from_markup(&mut self, markup: &str) -> Result<NodeId, DomError> {
        let mut roots = self.parse_fragment(markup);
        if roots.len() > 1 {
            roots.retain(|id| {
                !matches!(self.slot(*id).map(|s| &s.data), Some(NodeData::Text(t)) if t.trim().is_empty())
            });
        }
        if roots.len() == 1 {
            return Ok(roots[0]);
        }
        let wrapper = self.create_element("div");
        for root in roots {
            self.append_raw(wrapper, root)?;
        }
        Ok(wrapper)
    }

    fn insert_before(
        &mut self,
        parent: &NodeId,
        child: &NodeId,
        reference: Option<&NodeId>,
    ) -> Result<(), DomError> {
        self.mutations += 1;
        self.detach(*child)?;
        let index = match reference {
            Some(reference) => self
                .children(parent)
                .iter()
                .position(|c| c == reference)
                .ok_or(DomError::Detached)?,
            None => self.children(parent).len(),
        };
        self.slot_mut(*parent)?.children.insert(index, *child);
        self.slot_mut(*child)?.parent = Some(*parent);
        Ok(())
    }

    fn replace_child(&mut self, parent: &NodeId, new: &NodeId, old: &NodeId) -> Result<(), DomError> {
        self.mutations += 1;
        if self.parent(old) != Some(*parent) {
            return Err(DomError::Detached);
        }
        self.detach(*new)?;
        let slot = self.slot_mut(*parent)?;
        let index = slot
            .children
            .iter()
            .position(|c| c == old)
            .ok_or(DomError::Detached)?;
        slot.children[index] = *new;
        self.slot_mut(*new)?.parent = Some(*parent);
        self.slot_mut(*old)?.parent = None;
        Ok(())
    }

    fn remove(&mut self, node: &NodeId) -> Result<(), DomError> {
        self.mutations += 1;
        self.detach(*node)
    }

    fn clear(&mut self, node: &NodeId) -> Result<(), DomError> {
        self.mutations += 1;
        self.clear_raw(*node)
    }
}

fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

/// Block elements whose start tag implicitly ends an open `<p>`.
fn closes_open_paragraph(name: &str) -> bool {
    matches!(
        name,
        "address"
            | "blockquote"
            | "details"
            | "div"
            | "dl"
            | "fieldset"
            | "figure"
            | "footer"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "header"
            | "hr"
            | "ol"
            | "p"
            | "pre"
            | "section"
            | "table"
            | "ul"
    )
}

#[derive(Debug, PartialEq)]
enum Token {
    Text(String),
    Start {
        name: SmolStr,
        attrs: Vec<(SmolStr, String)>,
        self_closing: bool,
    },
    End(SmolStr),
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':'
}

fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let len = bytes.len();
    let mut out = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    // Slices are only cut at ASCII bytes, so every endpoint is a char boundary.
    while i < len {
        if bytes[i] != b'<' {
            let start = i;
            while i < len && bytes[i] != b'<' {
                i += 1;
            }
            text.push_str(&input[start..i]);
            continue;
        }

        if input[i..].starts_with("<!--") {
            i = match input[i + 4..].find("-->") {
                Some(end) => i + 4 + end + 3,
                None => len,
            };
            continue;
        }

        let closing = bytes.get(i + 1) == Some(&b'/');
        let name_start = if closing { i + 2 } else { i + 1 };
        if !bytes.get(name_start).is_some_and(u8::is_ascii_alphabetic) {
            text.push('<');
            i += 1;
            continue;
        }
        let mut j = name_start;
        while j < len && is_name_byte(bytes[j]) {
            j += 1;
        }
        let name = SmolStr::new(input[name_start..j].to_ascii_lowercase());

        if !text.is_empty() {
            out.push(Token::Text(decode_html_entities(&std::mem::take(&mut text)).into_owned()));
        }

        if closing {
            while j < len && bytes[j] != b'>' {
                j += 1;
            }
            out.push(Token::End(name));
            i = (j + 1).min(len);
            continue;
        }

        let mut attrs = Vec::new();
        let mut self_closing = false;
        let mut k = j;
        loop {
            while k < len && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            if k >= len {
                break;
            }
            if bytes[k] == b'>' {
                k += 1;
                break;
            }
            if bytes[k] == b'/' {
                if bytes.get(k + 1) == Some(&b'>') {
                    self_closing = true;
                    k += 2;
                    break;
                }
                k += 1;
                continue;
            }
            let attr_start = k;
            while k < len && is_name_byte(bytes[k]) {
                k += 1;
            }
            if attr_start == k {
                k += 1;
                continue;
            }
            let attr_name = SmolStr::new(input[attr_start..k].to_ascii_lowercase());
            while k < len && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            let mut value = String::new();
            if k < len && bytes[k] == b'=' {
                k += 1;
                while k < len && bytes[k].is_ascii_whitespace() {
                    k += 1;
                }
                if k < len && (bytes[k] == b'"' || bytes[k] == b'\'') {
                    let quote = bytes[k];
                    k += 1;
                    let value_start = k;
                    while k < len && bytes[k] != quote {
                        k += 1;
                    }
                    value = decode_html_entities(&input[value_start..k]).into_owned();
                    k = (k + 1).min(len);
                } else {
                    let value_start = k;
                    while k < len && !bytes[k].is_ascii_whitespace() && bytes[k] != b'>' {
                        k += 1;
                    }
                    value = decode_html_entities(&input[value_start..k]).into_owned();
                }
            }
            attrs.push((attr_name, value));
        }
        out.push(Token::Start {
            name,
            attrs,
            self_closing,
        });
        i = k;
    }

    if !text.is_empty() {
        out.push(Token::Text(decode_html_entities(&text).into_owned()));
    }
    out
}
