//! Document tree produced by the parse/enrich/extract pipeline.

use smol_str::SmolStr;

/// One typed element of the parsed Markdown tree.
///
/// Leaf payloads live in the [`NodeKind`] variant; `children` is empty for
/// every leaf kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Text(String),
    Paragraph,
    Heading { depth: u8 },
    Strong,
    Emphasis,
    Strikethrough,
    InlineCode(String),
    Code(CodeBlock),
    Blockquote,
    List { ordered: bool, start: Option<u64> },
    ListItem { checked: Option<bool> },
    Link { url: String, title: String },
    Image { url: String, alt: String, title: String },
    Break,
    ThematicBreak,
    /// Raw HTML passthrough. `block` is set for HTML blocks, which render
    /// inside their own wrapper element.
    Html { value: String, block: bool },
    Table,
    TableRow,
    TableCell { header: bool, align: CellAlign },
    InlineMath(String),
    Math(String),
    CustomTag { name: SmolStr, text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    /// First token of the fence info string, if any.
    pub lang: Option<SmolStr>,
    /// Raw code, used for diffing and copy.
    pub value: String,
    /// Pre-escaped markup for the code body, set by the enrichment pass.
    pub enriched: Option<String>,
    /// Rendered asynchronously by the side-effect scheduler instead of highlighted.
    pub diagram: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellAlign {
    #[default]
    None,
    Left,
    Center,
    Right,
}

impl CellAlign {
    pub fn as_css(self) -> Option<&'static str> {
        match self {
            CellAlign::None => None,
            CellAlign::Left => Some("left"),
            CellAlign::Center => Some("center"),
            CellAlign::Right => Some("right"),
        }
    }
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_children(kind: NodeKind, children: Vec<Node>) -> Self {
        Self { kind, children }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(NodeKind::Text(value.into()))
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text(_))
    }

    /// Inline raw HTML, which breaks the one-DOM-node-per-child layout of its parent.
    pub fn is_inline_html(&self) -> bool {
        matches!(self.kind, NodeKind::Html { block: false, .. })
    }

    /// Whether this kind's markup ends up displayed as a block in its parent.
    pub fn is_block(&self) -> bool {
        match &self.kind {
            NodeKind::Paragraph
            | NodeKind::Heading { .. }
            | NodeKind::Code(_)
            | NodeKind::Blockquote
            | NodeKind::List { .. }
            | NodeKind::ListItem { .. }
            | NodeKind::ThematicBreak
            | NodeKind::Table
            | NodeKind::TableRow
            | NodeKind::TableCell { .. }
            | NodeKind::Math(_)
            | NodeKind::CustomTag { .. } => true,
            NodeKind::Html { block, .. } => *block,
            NodeKind::Root
            | NodeKind::Text(_)
            | NodeKind::Strong
            | NodeKind::Emphasis
            | NodeKind::Strikethrough
            | NodeKind::InlineCode(_)
            | NodeKind::Link { .. }
            | NodeKind::Image { .. }
            | NodeKind::Break
            | NodeKind::InlineMath(_) => false,
        }
    }

    /// Plain text of this subtree, as a reader would see it.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.push_plain_text(&mut out);
        out
    }

    fn push_plain_text(&self, out: &mut String) {
        match &self.kind {
            NodeKind::Text(value)
            | NodeKind::InlineCode(value)
            | NodeKind::InlineMath(value)
            | NodeKind::Math(value) => out.push_str(value),
            NodeKind::Html { value, .. } => out.push_str(value),
            NodeKind::Code(code) => out.push_str(&code.value),
            NodeKind::Image { alt, .. } => out.push_str(alt),
            NodeKind::CustomTag { text, .. } => out.push_str(text),
            NodeKind::Break => out.push('\n'),
            _ => {
                for child in &self.children {
                    child.push_plain_text(out);
                }
            }
        }
    }

    /// Visit this node and its descendants in document order.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Node)) {
        f(self);
        for child in &mut self.children {
            child.walk_mut(f);
        }
    }
}
