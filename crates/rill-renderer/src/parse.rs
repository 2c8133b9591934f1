//! Markdown source to [`Node`] tree.
//!
//! Built on the pulldown-cmark event stream. The parser itself never fails;
//! the builder rejects event streams it cannot turn into a well-formed tree
//! and documents nested deeper than the configured limit.

use pulldown_cmark::{Alignment, CodeBlockKind, Event, Parser, Tag, TagEnd};
use smol_str::SmolStr;

use crate::config::RenderConfig;
use crate::error::ParseError;
use crate::types::{CellAlign, CodeBlock, Node, NodeKind};

/// Parse Markdown into a `Root` node.
///
/// Incomplete trailing structures (an unterminated fence, an open list) are
/// closed at end of input by the underlying parser.
pub fn parse_markdown(source: &str, config: &RenderConfig) -> Result<Node, ParseError> {
    let parser = Parser::new_ext(source, config.extensions.to_options());
    let mut builder = TreeBuilder::new(config.max_nesting);
    for event in parser {
        builder.push(event)?;
    }
    let root = builder.finish()?;
    tracing::trace!(
        target: "rill::parse",
        blocks = root.children.len(),
        bytes = source.len(),
        "parsed document"
    );
    Ok(root)
}

/// The tree used when parsing fails: the whole source as one escaped paragraph.
pub fn fallback_tree(source: &str) -> Node {
    let mut root = Node::new(NodeKind::Root);
    if !source.is_empty() {
        root.children.push(Node::with_children(
            NodeKind::Paragraph,
            vec![Node::text(source)],
        ));
    }
    root
}

struct Frame {
    node: Node,
    /// Children are spliced into the parent on close. Used for syntax this
    /// tree has no kind for.
    transparent: bool,
}

struct TreeBuilder {
    stack: Vec<Frame>,
    limit: usize,
    alignments: Vec<Alignment>,
    cell_index: usize,
    in_table_head: bool,
}

impl TreeBuilder {
    fn new(limit: usize) -> Self {
        Self {
            stack: vec![Frame {
                node: Node::new(NodeKind::Root),
                transparent: false,
            }],
            limit,
            alignments: Vec::new(),
            cell_index: 0,
            in_table_head: false,
        }
    }

    fn push(&mut self, event: Event<'_>) -> Result<(), ParseError> {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                match &mut self.top().kind {
                    NodeKind::Code(code) => code.value.push_str(&text),
                    NodeKind::Html { value, block: true } => value.push_str(&text),
                    _ => self.push_text(&text),
                }
                Ok(())
            }
            Event::Code(code) => self.leaf(NodeKind::InlineCode(code.into_string())),
            Event::InlineMath(expr) => self.leaf(NodeKind::InlineMath(expr.into_string())),
            Event::DisplayMath(expr) => self.leaf(NodeKind::Math(expr.into_string())),
            Event::Html(html) => {
                if let NodeKind::Html { value, block: true } = &mut self.top().kind {
                    value.push_str(&html);
                    Ok(())
                } else {
                    self.leaf(NodeKind::Html {
                        value: html.into_string(),
                        block: false,
                    })
                }
            }
            Event::InlineHtml(html) => self.leaf(NodeKind::Html {
                value: html.into_string(),
                block: false,
            }),
            Event::SoftBreak => {
                self.push_text("\n");
                Ok(())
            }
            Event::HardBreak => self.leaf(NodeKind::Break),
            Event::Rule => self.leaf(NodeKind::ThematicBreak),
            Event::TaskListMarker(checked) => {
                let item = self
                    .stack
                    .iter_mut()
                    .rev()
                    .find(|f| matches!(f.node.kind, NodeKind::ListItem { .. }));
                if let Some(frame) = item {
                    frame.node.kind = NodeKind::ListItem {
                        checked: Some(checked),
                    };
                }
                Ok(())
            }
            Event::FootnoteReference(label) => {
                self.push_text(&format!("[^{label}]"));
                Ok(())
            }
        }
    }

    fn start(&mut self, tag: Tag<'_>) -> Result<(), ParseError> {
        let mut transparent = false;
        let kind = match tag {
            Tag::Paragraph => NodeKind::Paragraph,
            Tag::Heading { level, .. } => NodeKind::Heading {
                depth: (level as u8).clamp(1, 6),
            },
            Tag::BlockQuote(_) => NodeKind::Blockquote,
            Tag::CodeBlock(kind) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split(|c: char| c.is_whitespace() || c == ',')
                        .find(|token| !token.is_empty())
                        .map(SmolStr::new),
                    CodeBlockKind::Indented => None,
                };
                NodeKind::Code(CodeBlock {
                    lang,
                    value: String::new(),
                    enriched: None,
                    diagram: false,
                })
            }
            Tag::HtmlBlock => NodeKind::Html {
                value: String::new(),
                block: true,
            },
            Tag::List(start) => NodeKind::List {
                ordered: start.is_some(),
                start,
            },
            Tag::Item => NodeKind::ListItem { checked: None },
            Tag::Table(alignments) => {
                self.alignments = alignments;
                NodeKind::Table
            }
            Tag::TableHead => {
                self.in_table_head = true;
                self.cell_index = 0;
                NodeKind::TableRow
            }
            Tag::TableRow => {
                self.cell_index = 0;
                NodeKind::TableRow
            }
            Tag::TableCell => {
                let align = match self.alignments.get(self.cell_index) {
                    Some(Alignment::Left) => CellAlign::Left,
                    Some(Alignment::Center) => CellAlign::Center,
                    Some(Alignment::Right) => CellAlign::Right,
                    Some(Alignment::None) | None => CellAlign::None,
                };
                self.cell_index += 1;
                NodeKind::TableCell {
                    header: self.in_table_head,
                    align,
                }
            }
            Tag::Emphasis => NodeKind::Emphasis,
            Tag::Strong => NodeKind::Strong,
            Tag::Strikethrough => NodeKind::Strikethrough,
            Tag::Link {
                dest_url, title, ..
            } => NodeKind::Link {
                url: dest_url.into_string(),
                title: title.into_string(),
            },
            Tag::Image {
                dest_url, title, ..
            } => NodeKind::Image {
                url: dest_url.into_string(),
                alt: String::new(),
                title: title.into_string(),
            },
            _ => {
                transparent = true;
                NodeKind::Root
            }
        };

        if self.stack.len() > self.limit {
            return Err(ParseError::TooDeep { limit: self.limit });
        }
        self.stack.push(Frame {
            node: Node::new(kind),
            transparent,
        });
        Ok(())
    }

    fn end(&mut self, tag: TagEnd) -> Result<(), ParseError> {
        if self.stack.len() < 2 {
            return Err(ParseError::UnbalancedEnd);
        }
        let Some(Frame {
            mut node,
            transparent,
        }) = self.stack.pop()
        else {
            return Err(ParseError::UnbalancedEnd);
        };

        match tag {
            TagEnd::TableHead => self.in_table_head = false,
            TagEnd::Table => self.alignments.clear(),
            _ => {}
        }

        if let NodeKind::Image { alt, .. } = &mut node.kind {
            *alt = node.children.iter().map(Node::plain_text).collect();
            node.children.clear();
        }

        if transparent {
            for child in node.children {
                self.append(child);
            }
        } else {
            self.append(node);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Node, ParseError> {
        if self.stack.len() != 1 {
            return Err(ParseError::UnclosedAtEnd {
                open: self.stack.len() - 1,
            });
        }
        self.stack
            .pop()
            .map(|frame| frame.node)
            .ok_or(ParseError::UnbalancedEnd)
    }

    fn leaf(&mut self, kind: NodeKind) -> Result<(), ParseError> {
        self.append(Node::new(kind));
        Ok(())
    }

    fn top(&mut self) -> &mut Node {
        let last = self.stack.len() - 1;
        &mut self.stack[last].node
    }

    fn append(&mut self, node: Node) {
        if let NodeKind::Text(text) = &node.kind {
            self.push_text(text);
            return;
        }
        self.top().children.push(node);
    }

    /// Adjacent text is merged so every text run maps onto one DOM text node.
    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let children = &mut self.top().children;
        if let Some(Node {
            kind: NodeKind::Text(existing),
            ..
        }) = children.last_mut()
        {
            existing.push_str(text);
        } else {
            children.push(Node::text(text));
        }
    }
}
