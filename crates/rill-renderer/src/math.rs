//! LaTeX math rendering via pulldown-latex → MathML

use pulldown_latex::{
    Parser, Storage, config::DisplayMode, config::RenderConfig, mathml::push_mathml,
};

use crate::utils::escape_text;

/// Result of attempting to render LaTeX math
pub enum MathResult {
    /// Successfully rendered MathML
    Success(String),
    /// Rendering failed - contains fallback HTML with source and error message
    Error { html: String, message: String },
}

impl MathResult {
    /// Markup for either outcome.
    pub fn into_html(self) -> String {
        match self {
            MathResult::Success(mathml) => mathml,
            MathResult::Error { html, message } => {
                tracing::warn!(target: "rill::render", %message, "math typesetting failed");
                html
            }
        }
    }
}

/// Render LaTeX math to MathML
///
/// # Arguments
/// * `latex` - The LaTeX source string (without delimiters like $ or $$)
/// * `display_mode` - If true, render as display math (block); if false, inline
pub fn render_math(latex: &str, display_mode: bool) -> MathResult {
    let storage = Storage::new();
    let parser = Parser::new(latex, &storage);
    let config = RenderConfig {
        display_mode: if display_mode {
            DisplayMode::Block
        } else {
            DisplayMode::Inline
        },
        ..Default::default()
    };

    let mut mathml = String::new();

    let events: Vec<_> = parser.collect();
    let errors: Vec<String> = events
        .iter()
        .filter_map(|e| e.as_ref().err().map(|err| err.to_string()))
        .collect();

    if !errors.is_empty() {
        let error_msg = errors.join("; ");
        return MathResult::Error {
            html: format_error_html(latex, &error_msg),
            message: error_msg,
        };
    }

    match push_mathml(&mut mathml, events.into_iter(), config) {
        Ok(()) => MathResult::Success(mathml),
        Err(e) => MathResult::Error {
            html: format_error_html(latex, &e.to_string()),
            message: e.to_string(),
        },
    }
}

/// Inner markup shown in place of a formula that failed to typeset.
fn format_error_html(latex: &str, error: &str) -> String {
    let mut html = String::from(r#"<code class="math-error" title=""#);
    escape_text(&mut html, error);
    html.push_str(r#"">"#);
    escape_text(&mut html, latex);
    html.push_str("</code>");
    html
}
