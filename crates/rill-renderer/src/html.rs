//! Node → markup.
//!
//! Text payloads are escaped. Raw HTML nodes and enriched code markup are
//! produced or vetted upstream and are written verbatim.
//!
//! Every node renders to exactly one DOM node (an element, or a text node
//! for `Text`), with no whitespace between block siblings, so rendered
//! children line up index-for-index with tree children. Inline raw HTML is
//! the one exception and callers re-render its container as a whole.

use crate::config::MathMode;
use crate::math::render_math;
use crate::tags::TagRegistry;
use crate::types::{CodeBlock, Node, NodeKind};
use crate::utils::{escape_text, escaped};

pub const COPY_ICON_SVG: &str = r#"<svg width="16" height="16" fill="currentColor" viewBox="0 0 16 16"><path d="M4 1.5H3a2 2 0 0 0-2 2V14a2 2 0 0 0 2 2h10a2 2 0 0 0 2-2V3.5a2 2 0 0 0-2-2h-1v1h1a1 1 0 0 1 1 1V14a1 1 0 0 1-1 1H3a1 1 0 0 1-1-1V3.5a1 1 0 0 1 1-1h1v-1z"/><path d="M9.5 1a.5.5 0 0 1 .5.5v1a.5.5 0 0 1-.5.5h-3a.5.5 0 0 1-.5-.5v-1a.5.5 0 0 1 .5-.5h3zm-3-1A1.5 1.5 0 0 0 5 1.5v1A1.5 1.5 0 0 0 6.5 4h3A1.5 1.5 0 0 0 11 2.5v-1A1.5 1.5 0 0 0 9.5 0h-3z"/></svg>"#;

/// Attribute marking the slot elements that in-place patches rewrite.
pub const SLOT_ATTR: &str = "data-slot";
/// Attribute marking elements whose content the side-effect renderer fills.
pub const EFFECT_ATTR: &str = "data-effect";
/// Attribute on every code block container.
pub const CODE_BLOCK_ATTR: &str = "data-code-block";

pub const DIAGRAM_LOADING: &str = r#"<div class="diagram-loading">Rendering diagram...</div>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Diagram,
    Math { display: bool },
}

impl EffectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EffectKind::Diagram => "diagram",
            EffectKind::Math { .. } => "math",
        }
    }
}

pub struct NodeRenderer<'a> {
    tags: &'a TagRegistry,
    math: MathMode,
}

impl<'a> NodeRenderer<'a> {
    pub fn new(tags: &'a TagRegistry, math: MathMode) -> Self {
        Self { tags, math }
    }

    pub fn math_mode(&self) -> MathMode {
        self.math
    }

    pub fn render(&self, node: &Node) -> String {
        let mut out = String::new();
        self.write_node(&mut out, node);
        out
    }

    pub fn render_children(&self, children: &[Node]) -> String {
        let mut out = String::new();
        self.write_children(&mut out, children);
        out
    }

    /// Everything inside the node's element: what `innerHTML` should hold
    /// after rendering `node`. Includes fixed decorations such as a task
    /// item's checkbox.
    pub fn render_inner(&self, node: &Node) -> String {
        let mut out = String::new();
        if let NodeKind::ListItem {
            checked: Some(checked),
        } = node.kind
        {
            write_checkbox(&mut out, checked);
        }
        self.write_children(&mut out, &node.children);
        out
    }

    /// Code body markup: enriched if present, else the escaped raw value.
    pub fn code_body(code: &CodeBlock) -> String {
        code.enriched
            .clone()
            .unwrap_or_else(|| escaped(&code.value))
    }

    /// Typeset math markup, or the escaped source when typesetting is external.
    pub fn math_body(&self, expr: &str, display: bool) -> String {
        match self.math {
            MathMode::MathMl => render_math(expr, display).into_html(),
            MathMode::External => escaped(expr),
        }
    }

    /// Side-effect work this node needs once its markup is in the DOM.
    /// Matches the `data-effect` elements of [`render`](Self::render), one each.
    pub fn effect_of(&self, node: &Node) -> Option<(EffectKind, String)> {
        match &node.kind {
            NodeKind::Code(code) if code.diagram => Some((EffectKind::Diagram, code.value.clone())),
            NodeKind::InlineMath(expr) if self.math == MathMode::External => {
                Some((EffectKind::Math { display: false }, expr.clone()))
            }
            NodeKind::Math(expr) if self.math == MathMode::External => {
                Some((EffectKind::Math { display: true }, expr.clone()))
            }
            _ => None,
        }
    }

    /// All effects in `node`'s subtree, in document order.
    pub fn effects_in(&self, node: &Node) -> Vec<(EffectKind, String)> {
        let mut effects = Vec::new();
        node.walk(&mut |n| effects.extend(self.effect_of(n)));
        effects
    }

    fn write_children(&self, out: &mut String, children: &[Node]) {
        for child in children {
            self.write_node(out, child);
        }
    }

    fn write_wrapped(&self, out: &mut String, tag: &str, node: &Node) {
        out.push('<');
        out.push_str(tag);
        out.push('>');
        self.write_children(out, &node.children);
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }

    fn write_node(&self, out: &mut String, node: &Node) {
        match &node.kind {
            NodeKind::Root => self.write_children(out, &node.children),
            NodeKind::Text(value) => escape_text(out, value),
            NodeKind::Paragraph => self.write_wrapped(out, "p", node),
            NodeKind::Heading { depth } => {
                let tag = format!("h{}", (*depth).clamp(1, 6));
                self.write_wrapped(out, &tag, node);
            }
            NodeKind::Strong => self.write_wrapped(out, "strong", node),
            NodeKind::Emphasis => self.write_wrapped(out, "em", node),
            NodeKind::Strikethrough => self.write_wrapped(out, "del", node),
            NodeKind::InlineCode(value) => {
                out.push_str(r#"<code class="inline-code">"#);
                escape_text(out, value);
                out.push_str("</code>");
            }
            NodeKind::Code(code) => self.write_code_block(out, code),
            NodeKind::Blockquote => self.write_wrapped(out, "blockquote", node),
            NodeKind::List { ordered, start } => {
                if *ordered {
                    match start {
                        Some(start) if *start != 1 => {
                            out.push_str(&format!(r#"<ol start="{start}">"#));
                        }
                        _ => out.push_str("<ol>"),
                    }
                    self.write_children(out, &node.children);
                    out.push_str("</ol>");
                } else {
                    self.write_wrapped(out, "ul", node);
                }
            }
            NodeKind::ListItem { checked } => match checked {
                Some(checked) => {
                    out.push_str(if *checked {
                        r#"<li class="task-list-item checked">"#
                    } else {
                        r#"<li class="task-list-item">"#
                    });
                    write_checkbox(out, *checked);
                    self.write_children(out, &node.children);
                    out.push_str("</li>");
                }
                None => self.write_wrapped(out, "li", node),
            },
            NodeKind::Link { url, title } => {
                out.push_str(r#"<a href=""#);
                escape_text(out, url);
                out.push('"');
                if !title.is_empty() {
                    out.push_str(r#" title=""#);
                    escape_text(out, title);
                    out.push('"');
                }
                out.push('>');
                self.write_children(out, &node.children);
                out.push_str("</a>");
            }
            NodeKind::Image { url, alt, title } => {
                out.push_str(r#"<img src=""#);
                escape_text(out, url);
                out.push_str(r#"" alt=""#);
                escape_text(out, alt);
                out.push('"');
                if !title.is_empty() {
                    out.push_str(r#" title=""#);
                    escape_text(out, title);
                    out.push('"');
                }
                out.push('>');
            }
            NodeKind::Break => out.push_str("<br>"),
            NodeKind::ThematicBreak => out.push_str("<hr>"),
            NodeKind::Html { value, block: true } => {
                out.push_str(r#"<div class="html-block">"#);
                out.push_str(value);
                out.push_str("</div>");
            }
            NodeKind::Html { value, block: false } => out.push_str(value),
            NodeKind::Table => {
                out.push_str("<table>");
                let (head, body) = match node.children.split_first() {
                    Some((first, rest)) if is_header_row(first) => (Some(first), rest),
                    _ => (None, node.children.as_slice()),
                };
                if let Some(head) = head {
                    out.push_str("<thead>");
                    self.write_node(out, head);
                    out.push_str("</thead>");
                }
                if !body.is_empty() {
                    out.push_str("<tbody>");
                    self.write_children(out, body);
                    out.push_str("</tbody>");
                }
                out.push_str("</table>");
            }
            NodeKind::TableRow => self.write_wrapped(out, "tr", node),
            NodeKind::TableCell { header, align } => {
                let tag = if *header { "th" } else { "td" };
                out.push('<');
                out.push_str(tag);
                if let Some(align) = align.as_css() {
                    out.push_str(&format!(r#" style="text-align: {align}""#));
                }
                out.push('>');
                self.write_children(out, &node.children);
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            NodeKind::InlineMath(expr) => self.write_math(out, expr, false),
            NodeKind::Math(expr) => self.write_math(out, expr, true),
            NodeKind::CustomTag { name, text } => match self.tags.get(name) {
                Some(renderer) => out.push_str(&renderer.render(text)),
                None => {
                    out.push_str(r#"<div class="unknown-tag" data-tag=""#);
                    escape_text(out, name);
                    out.push_str(r#""><div data-slot="content">"#);
                    escape_text(out, text);
                    out.push_str("</div></div>");
                }
            },
        }
    }

    fn write_code_block(&self, out: &mut String, code: &CodeBlock) {
        let lang = code.lang.as_deref().unwrap_or("plaintext");
        out.push_str(r#"<div class="code-block-container" data-code-block="" data-lang=""#);
        escape_text(out, lang);
        out.push_str(r#""><div class="code-block-header"><span class="code-language" data-slot="language">"#);
        escape_text(out, lang);
        out.push_str(r#"</span><button class="copy-code-btn" type="button">"#);
        out.push_str(COPY_ICON_SVG);
        out.push_str(r#"<span class="copy-text">Copy</span></button></div>"#);
        if code.diagram {
            out.push_str(r#"<div class="diagram" data-effect="diagram">"#);
            out.push_str(DIAGRAM_LOADING);
            out.push_str("</div>");
        } else {
            out.push_str(r#"<pre class="code-block"><code class="language-"#);
            escape_text(out, lang);
            out.push_str(r#"" data-slot="code">"#);
            out.push_str(&Self::code_body(code));
            out.push_str("</code></pre>");
        }
        out.push_str("</div>");
    }

    fn write_math(&self, out: &mut String, expr: &str, display: bool) {
        let class = if display {
            "math math-display"
        } else {
            "math math-inline"
        };
        out.push_str(r#"<span class=""#);
        out.push_str(class);
        out.push('"');
        if self.math == MathMode::External {
            out.push_str(r#" data-effect="math""#);
        }
        out.push('>');
        out.push_str(&self.math_body(expr, display));
        out.push_str("</span>");
    }
}

fn is_header_row(row: &Node) -> bool {
    row.kind == NodeKind::TableRow
        && row
            .children
            .first()
            .is_some_and(|cell| matches!(cell.kind, NodeKind::TableCell { header: true, .. }))
}

fn write_checkbox(out: &mut String, checked: bool) {
    out.push_str(if checked {
        r#"<input type="checkbox" disabled checked>"#
    } else {
        r#"<input type="checkbox" disabled>"#
    });
}
