use bitflags::bitflags;
use pulldown_cmark::Options;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

bitflags! {
    /// Markdown syntax extensions recognised on top of CommonMark.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct MarkdownExtensions: u32 {
        const TABLES = 1 << 0;
        const TASK_LISTS = 1 << 1;
        const STRIKETHROUGH = 1 << 2;
        const MATH = 1 << 3;
        const GFM = Self::TABLES.bits() | Self::TASK_LISTS.bits() | Self::STRIKETHROUGH.bits();
    }
}

impl Default for MarkdownExtensions {
    fn default() -> Self {
        Self::GFM | Self::MATH
    }
}

impl MarkdownExtensions {
    pub fn to_options(self) -> Options {
        let mut options = Options::empty();
        if self.contains(Self::TABLES) {
            options.insert(Options::ENABLE_TABLES);
        }
        if self.contains(Self::TASK_LISTS) {
            options.insert(Options::ENABLE_TASKLISTS);
        }
        if self.contains(Self::STRIKETHROUGH) {
            options.insert(Options::ENABLE_STRIKETHROUGH);
        }
        if self.contains(Self::MATH) {
            options.insert(Options::ENABLE_MATH);
        }
        options
    }
}

/// How math nodes are typeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MathMode {
    /// Synchronous LaTeX to MathML while rendering markup.
    #[default]
    MathMl,
    /// Placeholder markup, typeset later by the side-effect renderer.
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub extensions: MarkdownExtensions,
    pub highlight_code: bool,
    /// Code languages handed to the side-effect renderer instead of highlighted.
    pub diagram_languages: Vec<SmolStr>,
    pub math: MathMode,
    /// Register the built-in `think` tag.
    pub builtin_tags: bool,
    pub max_nesting: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            extensions: MarkdownExtensions::default(),
            highlight_code: true,
            diagram_languages: vec![SmolStr::new_static("mermaid")],
            math: MathMode::default(),
            builtin_tags: true,
            max_nesting: 128,
        }
    }
}

impl RenderConfig {
    pub fn is_diagram_language(&self, lang: &str) -> bool {
        self.diagram_languages
            .iter()
            .any(|d| d.eq_ignore_ascii_case(lang))
    }
}
