//! Host capabilities injected into the engine.

/// Writes copied code to the system clipboard.
///
/// Injected by the host at construction; the engine never reaches for a
/// global clipboard itself.
pub trait ClipboardPlatform {
    fn write_text(&self, text: &str);
}

impl<F> ClipboardPlatform for F
where
    F: Fn(&str),
{
    fn write_text(&self, text: &str) {
        self(text)
    }
}
