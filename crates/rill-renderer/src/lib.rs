//! Rill renderer
//!
//! Turns Markdown source into a typed [`Node`] tree and renders nodes to
//! markup. The passes here are pure: parse, syntax enrichment and custom tag
//! extraction run once per update, and [`NodeRenderer`] maps one node to its
//! markup. DOM reconciliation lives in `rill-core`.

pub mod code_pretty;
pub mod config;
pub mod error;
pub mod html;
pub mod math;
pub mod parse;
pub mod tags;
pub mod types;
pub mod utils;

pub use code_pretty::HighlightCache;
pub use config::{MarkdownExtensions, MathMode, RenderConfig};
pub use error::{HighlightError, ParseError};
pub use html::{EffectKind, NodeRenderer};
pub use tags::{TagRegistry, TagRenderer};
pub use types::{CellAlign, CodeBlock, Node, NodeKind};

/// Run the full pipeline: parse, extract custom tags, enrich.
///
/// Never fails. Input the parser cannot turn into a tree becomes a single
/// paragraph holding the raw text, which the renderer escapes.
pub fn process(
    source: &str,
    config: &RenderConfig,
    tags: &TagRegistry,
    cache: Option<&mut HighlightCache>,
) -> Node {
    let mut root = match parse::parse_markdown(source, config) {
        Ok(root) => root,
        Err(error) => {
            tracing::warn!(target: "rill::parse", %error, "falling back to plain text");
            return parse::fallback_tree(source);
        }
    };
    root = tags::extract_custom_tags(root, tags, config);
    match cache {
        Some(cache) => cache.enrich(&mut root, config),
        None => code_pretty::enrich(&mut root, config),
    }
    root
}
