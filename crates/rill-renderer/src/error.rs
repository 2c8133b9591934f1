use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum ParseError {
    #[error("end event without a matching start")]
    #[diagnostic(code(rill::parse::unbalanced_end))]
    UnbalancedEnd,

    #[error("{open} block(s) still open at end of input")]
    #[diagnostic(code(rill::parse::unclosed))]
    UnclosedAtEnd { open: usize },

    #[error("document nesting exceeds {limit} levels")]
    #[diagnostic(
        code(rill::parse::too_deep),
        help("raise `max_nesting` in the render config if this document is legitimate")
    )]
    TooDeep { limit: usize },
}

#[derive(Debug, Error, Diagnostic)]
pub enum HighlightError {
    #[cfg(feature = "syntax-highlighting")]
    #[error("syntax highlighting failed: {0}")]
    #[diagnostic(code(rill::enrich::highlight))]
    Syntect(#[from] syntect::Error),

    #[error("no grammar for language {0:?}")]
    #[diagnostic(code(rill::enrich::unknown_language))]
    UnknownLanguage(String),
}
