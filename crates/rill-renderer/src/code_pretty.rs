//! Syntax enrichment for code blocks.
//!
//! Highlighted markup is classed rather than inline-styled; themes are
//! supplied by the host stylesheet under [`CSS_PREFIX`].

use std::collections::HashMap;

use smol_str::SmolStr;

use crate::config::RenderConfig;
use crate::error::HighlightError;
use crate::types::{CodeBlock, Node, NodeKind};
use crate::utils::escaped;

pub const CSS_PREFIX: &str = "rill-";

/// Map common fence shorthands onto the tokens syntect knows.
fn syntax_token(lang: &str) -> &str {
    match lang {
        "js" | "jsx" | "mjs" | "ts" | "tsx" | "typescript" => "javascript",
        "py" => "python",
        "rb" => "ruby",
        "sh" | "shell" | "zsh" => "bash",
        "golang" => "go",
        "rs" => "rust",
        "yml" => "yaml",
        "c++" | "hpp" => "cpp",
        "cs" | "csharp" => "cs",
        "md" => "markdown",
        other => other,
    }
}

#[cfg(feature = "syntax-highlighting")]
pub fn highlight(lang: &str, code: &str) -> Result<String, HighlightError> {
    use std::sync::LazyLock;
    use syntect::html::{ClassStyle, ClassedHTMLGenerator};
    use syntect::parsing::SyntaxSet;
    use syntect::util::LinesWithEndings;

    static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);

    let lowered = lang.to_ascii_lowercase();
    let syntax = SYNTAX_SET
        .find_syntax_by_token(syntax_token(&lowered))
        .ok_or_else(|| HighlightError::UnknownLanguage(lang.to_string()))?;

    let mut html_generator = ClassedHTMLGenerator::new_with_class_style(
        syntax,
        &SYNTAX_SET,
        ClassStyle::SpacedPrefixed { prefix: CSS_PREFIX },
    );
    for line in LinesWithEndings::from(code) {
        html_generator.parse_html_for_line_which_includes_newline(line)?;
    }
    Ok(html_generator.finalize())
}

#[cfg(not(feature = "syntax-highlighting"))]
pub fn highlight(lang: &str, _code: &str) -> Result<String, HighlightError> {
    Err(HighlightError::UnknownLanguage(lang.to_string()))
}

/// Highlighted code bodies from the previous enrichment, keyed by language and source.
///
/// Only entries used by the latest tree are retained, so growing a document
/// re-highlights just the code blocks whose text changed.
#[derive(Debug, Default, Clone)]
pub struct HighlightCache {
    entries: HashMap<(SmolStr, String), String>,
}

impl HighlightCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attach enriched markup to every code node and flag diagram blocks.
    ///
    /// Structure and raw values are left untouched.
    pub fn enrich(&mut self, root: &mut Node, config: &RenderConfig) {
        let mut fresh = HashMap::new();
        let previous = &mut self.entries;
        let mut highlighted = 0usize;
        root.walk_mut(&mut |node| {
            if let NodeKind::Code(code) = &mut node.kind {
                if enrich_code(code, config, previous, &mut fresh) {
                    highlighted += 1;
                }
            }
        });
        if highlighted > 0 {
            tracing::debug!(target: "rill::enrich", highlighted, cached = fresh.len(), "enriched code blocks");
        }
        self.entries = fresh;
    }
}

/// Enrich without keeping a cache between calls.
pub fn enrich(root: &mut Node, config: &RenderConfig) {
    HighlightCache::new().enrich(root, config);
}

/// Returns true when markup had to be computed rather than reused.
fn enrich_code(
    code: &mut CodeBlock,
    config: &RenderConfig,
    previous: &mut HashMap<(SmolStr, String), String>,
    fresh: &mut HashMap<(SmolStr, String), String>,
) -> bool {
    let lang = code.lang.clone().unwrap_or_default();
    code.diagram = !lang.is_empty() && config.is_diagram_language(&lang);
    if code.diagram || !config.highlight_code {
        code.enriched = None;
        return false;
    }

    let key = (lang, code.value.clone());
    if let Some(markup) = fresh.get(&key) {
        code.enriched = Some(markup.clone());
        return false;
    }
    let (markup, computed) = match previous.remove(&key) {
        Some(markup) => (markup, false),
        None => (highlight_or_escape(&key.0, &code.value), true),
    };
    code.enriched = Some(markup.clone());
    fresh.insert(key, markup);
    computed
}

fn highlight_or_escape(lang: &str, value: &str) -> String {
    if lang.is_empty() {
        return escaped(value);
    }
    match highlight(lang, value) {
        Ok(markup) => markup,
        Err(HighlightError::UnknownLanguage(_)) => escaped(value),
        Err(error) => {
            tracing::warn!(target: "rill::enrich", %lang, %error, "highlighting failed, using plain text");
            escaped(value)
        }
    }
}
