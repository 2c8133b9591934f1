//! Custom tags: `<name>…</name>` spans folded into one [`NodeKind::CustomTag`].

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::config::RenderConfig;
use crate::parse::{fallback_tree, parse_markdown};
use crate::types::{Node, NodeKind};
use crate::utils::{escape_text, find_ignore_ascii_case};

/// Renders the accumulated text of a custom tag into markup.
///
/// The text is raw; renderers must escape it. Markup should contain one
/// element marked `data-slot="content"` holding the text, so streaming
/// updates can patch the text without rebuilding the whole block.
pub trait TagRenderer {
    fn render(&self, text: &str) -> String;
}

impl<F> TagRenderer for F
where
    F: Fn(&str) -> String,
{
    fn render(&self, text: &str) -> String {
        self(text)
    }
}

/// Case-insensitive map from tag name to renderer.
///
/// Read by both the extraction pass (which names are tags) and the node
/// renderer (how to draw them), so one registry value drives both.
#[derive(Clone, Default)]
pub struct TagRegistry {
    tags: BTreeMap<SmolStr, Rc<dyn TagRenderer>>,
}

impl fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.tags.keys()).finish()
    }
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `think` block.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("think", render_think);
        registry
    }

    /// Register or replace the renderer for `name`. Returns false for names
    /// that cannot appear in an HTML tag.
    pub fn register(&mut self, name: &str, renderer: impl TagRenderer + 'static) -> bool {
        self.register_rc(name, Rc::new(renderer))
    }

    pub fn register_rc(&mut self, name: &str, renderer: Rc<dyn TagRenderer>) -> bool {
        let Some(name) = normalize_name(name) else {
            tracing::warn!(target: "rill::tags", name, "ignoring invalid tag name");
            return false;
        };
        self.tags.insert(name, renderer);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Rc<dyn TagRenderer>> {
        self.tags.get(name.to_ascii_lowercase().as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(SmolStr::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

fn normalize_name(name: &str) -> Option<SmolStr> {
    let name = name.trim();
    let mut chars = name.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() || !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return None;
    }
    Some(SmolStr::new(name.to_ascii_lowercase()))
}

/// The collapsible "thinking process" block.
pub fn render_think(text: &str) -> String {
    let mut html = String::from(
        r#"<details class="think-block"><summary>Thinking process</summary><div class="think-content" data-slot="content">"#,
    );
    escape_text(&mut html, text);
    html.push_str("</div></details>");
    html
}

/// Fold registered tag spans into `CustomTag` nodes.
///
/// Runs from scratch on every tree. Only one tag is open at a time: the first
/// opening marker wins and the first matching close ends it. Content between
/// the markers is consumed across any number of following nodes, including
/// siblings of the opening node's ancestors. A tag still open at end of input
/// is materialized with whatever it has accumulated.
///
/// An HTML block swallows the lines after a close marker until the next blank
/// line, so that remainder is parsed again as Markdown with `config`.
pub fn extract_custom_tags(mut root: Node, registry: &TagRegistry, config: &RenderConfig) -> Node {
    if registry.is_empty() {
        return root;
    }
    let mut extractor = Extractor {
        registry,
        config,
        open: None,
        finished: Vec::new(),
        trim_next: false,
    };
    root.children = extractor.walk(std::mem::take(&mut root.children));
    if let Some(open) = extractor.open.take() {
        tracing::trace!(target: "rill::tags", name = %open.name, "tag still open at end of input");
        extractor.finished.push(open.text);
    }
    if extractor.finished.is_empty() {
        return root;
    }

    let mut texts = extractor.finished.into_iter();
    root.walk_mut(&mut |node| {
        if let NodeKind::CustomTag { text, .. } = &mut node.kind {
            *text = texts.next().unwrap_or_default().trim().to_string();
        }
    });
    hoist_custom_tags(&mut root);
    root
}

struct OpenTag {
    name: SmolStr,
    text: String,
}

struct Extractor<'a> {
    registry: &'a TagRegistry,
    config: &'a RenderConfig,
    open: Option<OpenTag>,
    /// Accumulated text of closed tags, in the order their placeholders were emitted.
    finished: Vec<String>,
    /// Trim leading whitespace of the next kept text after a close marker.
    trim_next: bool,
}

impl Extractor<'_> {
    fn walk(&mut self, children: Vec<Node>) -> Vec<Node> {
        let mut out = Vec::with_capacity(children.len());
        for node in children {
            self.visit(node, &mut out);
        }
        out
    }

    fn visit(&mut self, mut node: Node, out: &mut Vec<Node>) {
        if let NodeKind::Html { value, block } = node.kind {
            self.scan_html(&value, block, out);
            return;
        }

        if let Some(open) = &mut self.open {
            if node.is_block() {
                push_block_break(&mut open.text);
            }
            if node.children.is_empty() {
                open.text.push_str(&node.plain_text());
                return;
            }
            // The close marker may be inside this container; keep whatever
            // follows it.
            let children = self.walk(std::mem::take(&mut node.children));
            if !children.is_empty() && !children.iter().all(is_blank_text) {
                node.children = children;
                out.push(node);
            }
            return;
        }

        if self.trim_next {
            if let NodeKind::Text(text) = &mut node.kind {
                self.trim_next = false;
                let trimmed = text.trim_start();
                if trimmed.is_empty() {
                    return;
                }
                *text = trimmed.to_string();
            } else if node.children.is_empty() {
                self.trim_next = false;
            }
        }

        if !node.children.is_empty() {
            node.children = self.walk(std::mem::take(&mut node.children));
        }
        out.push(node);
    }

    fn scan_html(&mut self, value: &str, block: bool, out: &mut Vec<Node>) {
        let mut rest = value;
        loop {
            if let Some(open) = &mut self.open {
                let close = format!("</{}>", open.name);
                match find_ignore_ascii_case(rest, &close) {
                    Some(pos) => {
                        open.text.push_str(&rest[..pos]);
                        rest = &rest[pos + close.len()..];
                        if let Some(open) = self.open.take() {
                            self.finished.push(open.text);
                        }
                        self.trim_next = true;
                        if block {
                            self.splice_markdown(rest, out);
                            return;
                        }
                    }
                    None => {
                        open.text.push_str(rest);
                        return;
                    }
                }
            } else {
                let Some((pos, name)) = self.find_open_marker(rest) else {
                    if self.trim_next {
                        rest = rest.trim_start();
                    }
                    if !rest.trim().is_empty() {
                        self.trim_next = false;
                        out.push(Node::new(NodeKind::Html {
                            value: rest.to_string(),
                            block,
                        }));
                    }
                    return;
                };
                let prefix = &rest[..pos];
                if !prefix.trim().is_empty() {
                    out.push(Node::new(NodeKind::Html {
                        value: prefix.to_string(),
                        block,
                    }));
                }
                tracing::trace!(target: "rill::tags", %name, "tag opened");
                rest = &rest[pos + name.len() + 2..];
                out.push(Node::new(NodeKind::CustomTag {
                    name: name.clone(),
                    text: String::new(),
                }));
                self.open = Some(OpenTag {
                    name,
                    text: String::new(),
                });
                self.trim_next = false;
            }
        }
    }

    /// Parse what followed a close marker inside an HTML block and visit the
    /// resulting nodes in its place.
    fn splice_markdown(&mut self, source: &str, out: &mut Vec<Node>) {
        let source = source.trim_start();
        if source.is_empty() {
            return;
        }
        self.trim_next = false;
        let tree = match parse_markdown(source, self.config) {
            Ok(tree) => tree,
            Err(error) => {
                tracing::warn!(target: "rill::tags", %error, "tag remainder kept as plain text");
                fallback_tree(source)
            }
        };
        tracing::trace!(target: "rill::tags", nodes = tree.children.len(), "re-parsed text after close marker");
        for node in tree.children {
            self.visit(node, out);
        }
    }

    /// Earliest `<name>` marker of any registered tag.
    fn find_open_marker(&self, haystack: &str) -> Option<(usize, SmolStr)> {
        self.registry
            .tags
            .keys()
            .filter_map(|name| {
                find_ignore_ascii_case(haystack, &format!("<{name}>")).map(|pos| (pos, name.clone()))
            })
            .min_by_key(|(pos, _)| *pos)
    }
}

fn push_block_break(text: &mut String) {
    if text.trim().is_empty() {
        return;
    }
    while !text.ends_with("\n\n") {
        text.push('\n');
    }
}

fn is_blank_text(node: &Node) -> bool {
    matches!(&node.kind, NodeKind::Text(text) if text.trim().is_empty())
}

/// Custom tags render as blocks, so a paragraph holding one is split around it.
fn hoist_custom_tags(node: &mut Node) {
    if node.children.is_empty() {
        return;
    }
    let needs_split = |child: &Node| {
        child.kind == NodeKind::Paragraph
            && child
                .children
                .iter()
                .any(|c| matches!(c.kind, NodeKind::CustomTag { .. }))
    };
    if node.children.iter().any(needs_split) {
        let children = std::mem::take(&mut node.children);
        for child in children {
            if needs_split(&child) {
                split_paragraph(child, &mut node.children);
            } else {
                node.children.push(child);
            }
        }
    }
    for child in &mut node.children {
        hoist_custom_tags(child);
    }
}

fn split_paragraph(paragraph: Node, out: &mut Vec<Node>) {
    let mut run = Vec::new();
    for child in paragraph.children {
        if matches!(child.kind, NodeKind::CustomTag { .. }) {
            flush_run(&mut run, out);
            out.push(child);
        } else {
            run.push(child);
        }
    }
    flush_run(&mut run, out);
}

fn flush_run(run: &mut Vec<Node>, out: &mut Vec<Node>) {
    let mut children = std::mem::take(run);
    if let Some(Node {
        kind: NodeKind::Text(text),
        ..
    }) = children.first_mut()
    {
        *text = text.trim_start().to_string();
    }
    if let Some(Node {
        kind: NodeKind::Text(text),
        ..
    }) = children.last_mut()
    {
        *text = text.trim_end().to_string();
    }
    children.retain(|c| !matches!(&c.kind, NodeKind::Text(t) if t.is_empty()));
    if !children.is_empty() {
        out.push(Node::with_children(NodeKind::Paragraph, children));
    }
}
