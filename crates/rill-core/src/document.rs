//! The streaming view: owns the source buffer and runs one reconciliation
//! cycle per update.

use std::rc::Rc;

use rill_renderer::html::CODE_BLOCK_ATTR;
use rill_renderer::{HighlightCache, Node, NodeKind, NodeRenderer, RenderConfig, TagRegistry, TagRenderer};

use crate::dom::{DomError, DomMutator};
use crate::effects::{EffectError, EffectJob, EffectOutcome, EffectScheduler, SideEffectRenderer};
use crate::platform::ClipboardPlatform;
use crate::reconcile::{ReconcileStats, Reconciler};

/// Markdown rendered into a mount element and kept in sync with a growing
/// source text.
///
/// Every update re-parses the whole source, then reconciles the new tree
/// against the previous one so unchanged blocks keep their DOM nodes.
pub struct StreamingMarkdown<D: DomMutator> {
    dom: D,
    mount: D::Node,
    config: RenderConfig,
    tags: TagRegistry,
    source: String,
    /// Tree the mount currently reflects. `None` until the first cycle and
    /// after a cycle failed, which makes the next cycle start from scratch.
    last: Option<Node>,
    cache: HighlightCache,
    effects: EffectScheduler<D::Node>,
    clipboard: Option<Rc<dyn ClipboardPlatform>>,
}

impl<D: DomMutator> StreamingMarkdown<D> {
    pub fn new(dom: D, mount: D::Node, config: RenderConfig) -> Self {
        let tags = if config.builtin_tags {
            TagRegistry::with_builtins()
        } else {
            TagRegistry::new()
        };
        Self {
            dom,
            mount,
            config,
            tags,
            source: String::new(),
            last: None,
            cache: HighlightCache::new(),
            effects: EffectScheduler::new(),
            clipboard: None,
        }
    }

    /// Replace the tag registry wholesale.
    pub fn with_tags(mut self, tags: TagRegistry) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_clipboard(mut self, clipboard: impl ClipboardPlatform + 'static) -> Self {
        self.set_clipboard(clipboard);
        self
    }

    pub fn set_clipboard(&mut self, clipboard: impl ClipboardPlatform + 'static) {
        self.clipboard = Some(Rc::new(clipboard));
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut D {
        &mut self.dom
    }

    pub fn mount(&self) -> &D::Node {
        &self.mount
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The tree the mount currently reflects.
    pub fn tree(&self) -> Option<&Node> {
        self.last.as_ref()
    }

    /// Set the full document text.
    ///
    /// Identical content is a no-op once something has been rendered.
    pub fn set_content(&mut self, content: &str) -> ReconcileStats {
        if self.last.is_some() && content == self.source {
            tracing::trace!(target: "rill::reconcile", "content unchanged");
            return ReconcileStats::default();
        }
        self.source.clear();
        self.source.push_str(content);
        self.render_cycle()
    }

    /// Append streamed text to the document.
    pub fn push_str(&mut self, chunk: &str) -> ReconcileStats {
        if chunk.is_empty() && self.last.is_some() {
            return ReconcileStats::default();
        }
        self.source.push_str(chunk);
        self.render_cycle()
    }

    /// Register a custom tag renderer and re-render the current content with
    /// it. Returns false when the name is not a valid tag name.
    pub fn register_tag(&mut self, name: &str, renderer: impl TagRenderer + 'static) -> bool {
        if !self.tags.register(name, renderer) {
            return false;
        }
        if self.last.is_some() {
            // Unchanged tag nodes compare equal, so a normal cycle would keep
            // markup produced by the previous renderer.
            self.last = None;
            self.effects.reset();
            self.render_cycle();
        }
        true
    }

    fn render_cycle(&mut self) -> ReconcileStats {
        let tree = rill_renderer::process(&self.source, &self.config, &self.tags, Some(&mut self.cache));
        let renderer = NodeRenderer::new(&self.tags, self.config.math);

        let outcome = match run_cycle(
            &mut self.dom,
            &self.mount,
            &mut self.effects,
            &renderer,
            self.last.as_ref(),
            &tree,
        ) {
            Ok(stats) => Ok(stats),
            Err(error) => {
                tracing::warn!(target: "rill::reconcile", %error, "patching failed, rendering from scratch");
                self.effects.reset();
                run_cycle(&mut self.dom, &self.mount, &mut self.effects, &renderer, None, &tree)
            }
        };

        match outcome {
            Ok(stats) => {
                self.last = Some(tree);
                stats
            }
            Err(error) => {
                tracing::error!(target: "rill::reconcile", %error, "could not render content");
                self.last = None;
                ReconcileStats::default()
            }
        }
    }

    /// Side-effect jobs scheduled by past cycles and not yet taken.
    pub fn take_effects(&mut self) -> Vec<EffectJob<D::Node>> {
        self.effects.take_pending()
    }

    pub fn pending_effects(&self) -> usize {
        self.effects.pending_len()
    }

    /// Apply a finished side-effect render.
    pub fn resolve_effect(
        &mut self,
        job: &EffectJob<D::Node>,
        result: Result<String, EffectError>,
    ) -> Result<EffectOutcome, DomError> {
        self.effects.resolve(&mut self.dom, &self.mount, job, result)
    }

    /// Run every pending side-effect job through `renderer` concurrently on
    /// the current task and apply the results.
    pub async fn flush_effects<R>(&mut self, renderer: &R) -> Vec<EffectOutcome>
    where
        R: SideEffectRenderer + ?Sized,
    {
        let jobs = self.effects.take_pending();
        if jobs.is_empty() {
            return Vec::new();
        }
        let results =
            n0_future::join_all(jobs.iter().map(|job| renderer.render(job.kind, &job.source))).await;

        jobs.iter()
            .zip(results)
            .map(|(job, result)| {
                self.resolve_effect(job, result).unwrap_or_else(|error| {
                    tracing::warn!(target: "rill::effects", id = job.id, %error, "could not apply effect result");
                    EffectOutcome::Failed
                })
            })
            .collect()
    }

    /// Raw source of the code block containing `target`.
    ///
    /// Code block containers are matched to `code` nodes by position: the
    /// n-th `data-code-block` element under the mount is the n-th code node
    /// of the tree in pre-order.
    pub fn code_source_for(&self, target: &D::Node) -> Option<&str> {
        let tree = self.last.as_ref()?;
        let mut current = target.clone();
        let block = loop {
            if self.dom.attribute(&current, CODE_BLOCK_ATTR).is_some() {
                break current;
            }
            if current == self.mount {
                return None;
            }
            current = self.dom.parent(&current)?;
        };

        let ordinal = self
            .dom
            .find_by_attribute(&self.mount, CODE_BLOCK_ATTR, None)
            .iter()
            .position(|candidate| *candidate == block)?;

        let mut codes = Vec::new();
        tree.walk(&mut |node| {
            if let NodeKind::Code(code) = &node.kind {
                codes.push(code.value.as_str());
            }
        });
        codes.get(ordinal).copied()
    }

    /// Copy the raw source of the code block containing `target` to the
    /// clipboard. Returns whether anything was written.
    pub fn copy_code(&self, target: &D::Node) -> bool {
        let Some(clipboard) = &self.clipboard else {
            tracing::debug!(target: "rill::reconcile", "no clipboard configured");
            return false;
        };
        match self.code_source_for(target) {
            Some(source) => {
                clipboard.write_text(source);
                true
            }
            None => false,
        }
    }
}

fn run_cycle<D: DomMutator>(
    dom: &mut D,
    mount: &D::Node,
    effects: &mut EffectScheduler<D::Node>,
    renderer: &NodeRenderer<'_>,
    old: Option<&Node>,
    new: &Node,
) -> Result<ReconcileStats, DomError> {
    let old = match old {
        Some(old) => old.children.as_slice(),
        None => {
            dom.clear(mount)?;
            &[]
        }
    };
    Reconciler::new(dom, renderer, effects).reconcile(mount, old, &new.children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_dom::{MemoryDom, NodeId};

    fn view(config: RenderConfig) -> StreamingMarkdown<MemoryDom> {
        let mut dom = MemoryDom::new();
        let mount = dom.create_element("div");
        StreamingMarkdown::new(dom, mount, config)
    }

    #[test]
    fn first_render_clears_foreign_children() {
        let mut dom = MemoryDom::new();
        let mount = dom.create_element("div");
        let stale = dom.create_from_markup("<p>placeholder</p>").unwrap();
        dom.insert_before(&mount, &stale, None).unwrap();

        let mut md = StreamingMarkdown::new(dom, mount, RenderConfig::default());
        md.set_content("hello");
        assert_eq!(md.dom().inner_html(mount), "<p>hello</p>");
    }

    #[test]
    fn builtin_tags_follow_config() {
        let with = view(RenderConfig::default());
        assert!(with.tags().contains("think"));
        let without = view(RenderConfig {
            builtin_tags: false,
            ..Default::default()
        });
        assert!(!without.tags().contains("think"));
    }

    #[test]
    fn push_str_extends_source() {
        let mut md = view(RenderConfig::default());
        md.push_str("Hello");
        md.push_str(" world");
        assert_eq!(md.source(), "Hello world");
        let mount: NodeId = *md.mount();
        assert_eq!(md.dom().text_content(&mount), "Hello world");
    }

    #[test]
    fn rejected_tag_name_leaves_registry_alone() {
        let mut md = view(RenderConfig::default());
        assert!(!md.register_tag("1bad", |_: &str| String::new()));
        assert!(!md.tags().contains("1bad"));
    }
}
