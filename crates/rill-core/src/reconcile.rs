//! Tree diff and DOM patching.
//!
//! Each cycle compares the new tree's top-level children with the previous
//! tree's, index by index, against the mount's current children:
//!
//! - equal nodes keep their DOM node untouched
//! - patchable nodes of the same kind are mutated in place
//! - everything else is rendered fresh and swapped in
//!
//! Removals are applied first, then insertions in index order, and finally
//! any surplus DOM children are trimmed so the mount has exactly one child
//! per top-level node.

use std::mem::discriminant;

use rill_renderer::html::{DIAGRAM_LOADING, EFFECT_ATTR, SLOT_ATTR};
use rill_renderer::{EffectKind, Node, NodeKind, NodeRenderer};

use crate::dom::{DomError, DomMutator};
use crate::effects::EffectScheduler;

/// Counts of top-level decisions made by one reconciliation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub kept: usize,
    pub patched: usize,
    pub replaced: usize,
    pub inserted: usize,
    pub removed: usize,
}

impl ReconcileStats {
    /// True when the cycle left the DOM exactly as it was.
    pub fn is_noop(&self) -> bool {
        self.patched == 0 && self.replaced == 0 && self.inserted == 0 && self.removed == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Patch {
    Applied,
    /// The node cannot be updated in place and must be rendered fresh.
    Replace,
}

/// Structural equality with kind-specific payload comparison.
///
/// Derived data (enriched code markup) is never compared; the raw values it
/// is derived from are.
pub fn nodes_equal(a: &Node, b: &Node) -> bool {
    use NodeKind::*;

    let payload = match &a.kind {
        Root => matches!(b.kind, Root),
        Paragraph => matches!(b.kind, Paragraph),
        Strong => matches!(b.kind, Strong),
        Emphasis => matches!(b.kind, Emphasis),
        Strikethrough => matches!(b.kind, Strikethrough),
        Blockquote => matches!(b.kind, Blockquote),
        Break => matches!(b.kind, Break),
        ThematicBreak => matches!(b.kind, ThematicBreak),
        Table => matches!(b.kind, Table),
        TableRow => matches!(b.kind, TableRow),
        Text(x) => matches!(&b.kind, Text(y) if x == y),
        InlineCode(x) => matches!(&b.kind, InlineCode(y) if x == y),
        InlineMath(x) => matches!(&b.kind, InlineMath(y) if x == y),
        Math(x) => matches!(&b.kind, Math(y) if x == y),
        Heading { depth } => matches!(&b.kind, Heading { depth: d } if d == depth),
        Code(x) => matches!(
            &b.kind,
            Code(y) if x.value == y.value && x.lang == y.lang && x.diagram == y.diagram
        ),
        List { ordered, start } => matches!(
            &b.kind,
            List { ordered: o, start: s } if o == ordered && s == start
        ),
        ListItem { checked } => matches!(&b.kind, ListItem { checked: c } if c == checked),
        Link { url, title } => matches!(
            &b.kind,
            Link { url: u, title: t } if u == url && t == title
        ),
        Image { url, alt, title } => matches!(
            &b.kind,
            Image { url: u, alt: a, title: t } if u == url && a == alt && t == title
        ),
        Html { value, block } => matches!(
            &b.kind,
            Html { value: v, block: k } if v == value && k == block
        ),
        TableCell { header, align } => matches!(
            &b.kind,
            TableCell { header: h, align: al } if h == header && al == align
        ),
        CustomTag { name, text } => matches!(
            &b.kind,
            CustomTag { name: n, text: t } if n == name && t == text
        ),
    };

    payload
        && a.children.len() == b.children.len()
        && a
            .children
            .iter()
            .zip(&b.children)
            .all(|(x, y)| nodes_equal(x, y))
}

/// Kinds whose DOM is worth mutating rather than rebuilding.
fn is_patchable(kind: &NodeKind) -> bool {
    match kind {
        NodeKind::Root
        | NodeKind::Text(_)
        | NodeKind::InlineCode(_)
        | NodeKind::Html { .. }
        | NodeKind::Code(_)
        | NodeKind::Paragraph
        | NodeKind::Heading { .. }
        | NodeKind::Strong
        | NodeKind::Emphasis
        | NodeKind::Strikethrough
        | NodeKind::Blockquote
        | NodeKind::List { .. }
        | NodeKind::ListItem { .. }
        | NodeKind::Link { .. }
        | NodeKind::InlineMath(_)
        | NodeKind::Math(_)
        | NodeKind::CustomTag { .. } => true,
        NodeKind::Table
        | NodeKind::TableRow
        | NodeKind::TableCell { .. }
        | NodeKind::Image { .. }
        | NodeKind::Break
        | NodeKind::ThematicBreak => false,
    }
}

pub fn can_patch_in_place(new: &Node, old: &Node) -> bool {
    discriminant(&new.kind) == discriminant(&old.kind) && is_patchable(&new.kind)
}

/// One reconciliation pass over a mount.
pub struct Reconciler<'a, D: DomMutator> {
    dom: &'a mut D,
    renderer: &'a NodeRenderer<'a>,
    effects: &'a mut EffectScheduler<D::Node>,
    stats: ReconcileStats,
}

impl<'a, D: DomMutator> Reconciler<'a, D> {
    pub fn new(
        dom: &'a mut D,
        renderer: &'a NodeRenderer<'a>,
        effects: &'a mut EffectScheduler<D::Node>,
    ) -> Self {
        Self {
            dom,
            renderer,
            effects,
            stats: ReconcileStats::default(),
        }
    }

    /// Converge `mount`'s children from `old` to `new`.
    pub fn reconcile(
        mut self,
        mount: &D::Node,
        old: &[Node],
        new: &[Node],
    ) -> Result<ReconcileStats, DomError> {
        let dom_children = self.dom.children(mount);
        let mut removals = Vec::new();
        let mut insertions: Vec<(usize, D::Node, &Node)> = Vec::new();

        for i in 0..new.len().max(old.len()) {
            match (new.get(i), old.get(i)) {
                (Some(next), Some(prev)) => {
                    let Some(existing) = dom_children.get(i) else {
                        insertions.push((i, self.create(next)?, next));
                        self.stats.inserted += 1;
                        continue;
                    };
                    if nodes_equal(next, prev) {
                        self.stats.kept += 1;
                        continue;
                    }
                    if can_patch_in_place(next, prev)
                        && self.patch(existing, next, prev)? == Patch::Applied
                    {
                        tracing::trace!(target: "rill::reconcile", index = i, "patched in place");
                        self.stats.patched += 1;
                        continue;
                    }
                    tracing::trace!(target: "rill::reconcile", index = i, "replacing");
                    removals.push(existing.clone());
                    insertions.push((i, self.create(next)?, next));
                    self.stats.replaced += 1;
                }
                (Some(next), None) => {
                    insertions.push((i, self.create(next)?, next));
                    self.stats.inserted += 1;
                }
                (None, Some(_)) => {
                    if let Some(existing) = dom_children.get(i) {
                        removals.push(existing.clone());
                        self.stats.removed += 1;
                    }
                }
                (None, None) => {}
            }
        }

        for node in &removals {
            self.dom.remove(node)?;
        }

        let mut live = self.dom.children(mount);
        for (index, dom_node, node) in insertions {
            let reference = live.get(index).cloned();
            self.dom.insert_before(mount, &dom_node, reference.as_ref())?;
            live.insert(index.min(live.len()), dom_node.clone());
            self.schedule_effects(&dom_node, self.renderer.effects_in(node))?;
        }

        for surplus in live.iter().skip(new.len()) {
            tracing::debug!(target: "rill::reconcile", "trimming untracked mount child");
            self.dom.remove(surplus)?;
        }

        tracing::debug!(
            target: "rill::reconcile",
            kept = self.stats.kept,
            patched = self.stats.patched,
            replaced = self.stats.replaced,
            inserted = self.stats.inserted,
            removed = self.stats.removed,
            "reconciled"
        );
        Ok(self.stats)
    }

    fn create(&mut self, node: &Node) -> Result<D::Node, DomError> {
        match &node.kind {
            NodeKind::Text(value) => self.dom.create_text(value),
            _ => self.dom.create_from_markup(&self.renderer.render(node)),
        }
    }

    /// Pair effect-bearing nodes with the `data-effect` elements under `root`.
    /// Both are in document order and the renderer emits one element per effect.
    fn schedule_effects(
        &mut self,
        root: &D::Node,
        effects: Vec<(EffectKind, String)>,
    ) -> Result<(), DomError> {
        if effects.is_empty() {
            return Ok(());
        }
        let targets = self.dom.find_by_attribute(root, EFFECT_ATTR, None);
        if targets.len() != effects.len() {
            tracing::warn!(
                target: "rill::reconcile",
                expected = effects.len(),
                found = targets.len(),
                "effect placeholders do not line up with the tree"
            );
        }
        for (target, (kind, source)) in targets.iter().zip(effects) {
            self.effects.schedule(self.dom, target, kind, source)?;
        }
        Ok(())
    }

    fn patch(&mut self, el: &D::Node, next: &Node, prev: &Node) -> Result<Patch, DomError> {
        match (&next.kind, &prev.kind) {
            (NodeKind::Text(value), NodeKind::Text(_))
            | (NodeKind::InlineCode(value), NodeKind::InlineCode(_)) => {
                self.dom.set_text(el, value)?;
                Ok(Patch::Applied)
            }
            (NodeKind::Heading { depth }, NodeKind::Heading { depth: old_depth }) => {
                if depth != old_depth {
                    return Ok(Patch::Replace);
                }
                self.patch_children(el, next, prev)
            }
            (
                NodeKind::List { ordered, start },
                NodeKind::List {
                    ordered: old_ordered,
                    start: old_start,
                },
            ) => {
                if ordered != old_ordered {
                    return Ok(Patch::Replace);
                }
                if start != old_start {
                    match start {
                        Some(start) if *ordered && *start != 1 => {
                            self.dom.set_attribute(el, "start", &start.to_string())?
                        }
                        _ => self.dom.remove_attribute(el, "start")?,
                    }
                }
                self.patch_children(el, next, prev)
            }
            (NodeKind::ListItem { checked }, NodeKind::ListItem { checked: old_checked }) => {
                if checked != old_checked {
                    return Ok(Patch::Replace);
                }
                self.patch_children(el, next, prev)
            }
            (
                NodeKind::Link { url, title },
                NodeKind::Link {
                    url: old_url,
                    title: old_title,
                },
            ) => {
                if url != old_url {
                    self.dom.set_attribute(el, "href", url)?;
                }
                if title != old_title {
                    if title.is_empty() {
                        self.dom.remove_attribute(el, "title")?;
                    } else {
                        self.dom.set_attribute(el, "title", title)?;
                    }
                }
                self.patch_children(el, next, prev)
            }
            (NodeKind::Code(code), NodeKind::Code(old_code)) => {
                if code.diagram != old_code.diagram {
                    return Ok(Patch::Replace);
                }
                let lang = code.lang.as_deref().unwrap_or("plaintext");
                let lang_changed = code.lang != old_code.lang;
                if lang_changed {
                    let Some(label) = self.slot(el, "language") else {
                        return Ok(Patch::Replace);
                    };
                    self.dom.set_text(&label, lang)?;
                    self.dom.set_attribute(el, "data-lang", lang)?;
                }
                if code.diagram {
                    if code.value != old_code.value {
                        let target = self.dom.find_by_attribute(el, EFFECT_ATTR, None);
                        let Some(target) = target.first() else {
                            return Ok(Patch::Replace);
                        };
                        self.dom.set_inner_markup(target, DIAGRAM_LOADING)?;
                        self.effects
                            .schedule(self.dom, target, EffectKind::Diagram, code.value.clone())?;
                    }
                    return Ok(Patch::Applied);
                }
                let Some(body) = self.slot(el, "code") else {
                    return Ok(Patch::Replace);
                };
                if lang_changed {
                    self.dom.set_attribute(&body, "class", &format!("language-{lang}"))?;
                }
                self.dom
                    .set_inner_markup(&body, &NodeRenderer::code_body(code))?;
                Ok(Patch::Applied)
            }
            (NodeKind::InlineMath(expr), NodeKind::InlineMath(_)) => {
                self.patch_math(el, next, expr, false)
            }
            (NodeKind::Math(expr), NodeKind::Math(_)) => self.patch_math(el, next, expr, true),
            (NodeKind::Html { value, block: true }, NodeKind::Html { block: true, .. }) => {
                self.dom.set_inner_markup(el, value)?;
                Ok(Patch::Applied)
            }
            (NodeKind::CustomTag { name, .. }, NodeKind::CustomTag { name: old_name, .. }) => {
                if name != old_name {
                    return Ok(Patch::Replace);
                }
                let Some(content) = self.slot(el, "content") else {
                    return Ok(Patch::Replace);
                };
                // The registered renderer decides what the slot holds, so take
                // its content from a fresh render.
                let fresh = self.dom.create_from_markup(&self.renderer.render(next))?;
                let Some(fresh_content) = self.slot(&fresh, "content") else {
                    return Ok(Patch::Replace);
                };
                self.dom.clear(&content)?;
                for child in self.dom.children(&fresh_content) {
                    self.dom.insert_before(&content, &child, None)?;
                }
                Ok(Patch::Applied)
            }
            (NodeKind::Root, NodeKind::Root)
            | (NodeKind::Paragraph, NodeKind::Paragraph)
            | (NodeKind::Strong, NodeKind::Strong)
            | (NodeKind::Emphasis, NodeKind::Emphasis)
            | (NodeKind::Strikethrough, NodeKind::Strikethrough)
            | (NodeKind::Blockquote, NodeKind::Blockquote) => self.patch_children(el, next, prev),
            _ => Ok(Patch::Replace),
        }
    }

    fn slot(&self, el: &D::Node, name: &str) -> Option<D::Node> {
        self.dom
            .find_by_attribute(el, SLOT_ATTR, Some(name))
            .into_iter()
            .next()
    }

    fn patch_math(
        &mut self,
        el: &D::Node,
        next: &Node,
        expr: &str,
        display: bool,
    ) -> Result<Patch, DomError> {
        self.dom
            .set_inner_markup(el, &self.renderer.math_body(expr, display))?;
        if let Some((kind, source)) = self.renderer.effect_of(next) {
            self.effects.schedule(self.dom, el, kind, source)?;
        }
        Ok(Patch::Applied)
    }

    /// After `el` was rebuilt from markup, move the effect elements of
    /// children equal to their old counterpart back over the fresh
    /// placeholders, and schedule effects only for changed children.
    fn carry_effects(
        &mut self,
        el: &D::Node,
        next: &Node,
        prev: &Node,
        resolved: Vec<D::Node>,
    ) -> Result<(), DomError> {
        let effects: Vec<_> = next
            .children
            .iter()
            .map(|child| self.renderer.effects_in(child))
            .collect();
        let mut offsets = vec![0];
        for child in &prev.children {
            let end = offsets[offsets.len() - 1] + self.renderer.effects_in(child).len();
            offsets.push(end);
        }
        let placeholders = self.dom.find_by_attribute(el, EFFECT_ATTR, None);
        let expected: usize = effects.iter().map(Vec::len).sum();
        if placeholders.len() != expected || offsets[offsets.len() - 1] != resolved.len() {
            return self.schedule_effects(el, effects.into_iter().flatten().collect());
        }

        let mut placeholders = placeholders.into_iter();
        for (i, (child, child_effects)) in next.children.iter().zip(effects).enumerate() {
            let fresh: Vec<_> = placeholders.by_ref().take(child_effects.len()).collect();
            let unchanged = prev
                .children
                .get(i)
                .is_some_and(|old| nodes_equal(child, old));
            if unchanged {
                for (placeholder, old) in fresh.iter().zip(&resolved[offsets[i]..offsets[i + 1]]) {
                    if let Some(parent) = self.dom.parent(placeholder) {
                        self.dom.replace_child(&parent, old, placeholder)?;
                    }
                }
                continue;
            }
            for (placeholder, (kind, source)) in fresh.iter().zip(child_effects) {
                self.effects.schedule(self.dom, placeholder, kind, source)?;
            }
        }
        Ok(())
    }

    /// Ordered child reconciliation inside a patched container.
    fn patch_children(&mut self, el: &D::Node, next: &Node, prev: &Node) -> Result<Patch, DomError> {
        // Inline raw HTML does not map onto one DOM node per child, so the
        // container's content is rebuilt as a whole.
        if next
            .children
            .iter()
            .chain(&prev.children)
            .any(Node::is_inline_html)
        {
            let resolved = self.dom.find_by_attribute(el, EFFECT_ATTR, None);
            self.dom
                .set_inner_markup(el, &self.renderer.render_inner(next))?;
            self.carry_effects(el, next, prev, resolved)?;
            return Ok(Patch::Applied);
        }

        // Task items carry a leading checkbox ahead of their content.
        let offset = match next.kind {
            NodeKind::ListItem { checked: Some(_) } => 1,
            _ => 0,
        };
        let dom_children = self.dom.children(el);

        for (i, child) in next.children.iter().enumerate() {
            let existing = dom_children.get(i + offset);
            let old_child = prev.children.get(i);
            let Some(existing) = existing else {
                let fresh = self.create(child)?;
                self.dom.insert_before(el, &fresh, None)?;
                self.schedule_effects(&fresh, self.renderer.effects_in(child))?;
                continue;
            };
            if let Some(old_child) = old_child {
                if nodes_equal(child, old_child) {
                    continue;
                }
                let existing_is_text = self.dom.is_text(existing);
                if let NodeKind::Text(value) = &child.kind {
                    if existing_is_text {
                        self.dom.set_text(existing, value)?;
                        continue;
                    }
                } else if !existing_is_text
                    && can_patch_in_place(child, old_child)
                    && self.patch(existing, child, old_child)? == Patch::Applied
                {
                    continue;
                }
            }
            let fresh = self.create(child)?;
            self.dom.replace_child(el, &fresh, existing)?;
            self.schedule_effects(&fresh, self.renderer.effects_in(child))?;
        }

        for surplus in dom_children.iter().skip(offset + next.children.len()) {
            self.dom.remove(surplus)?;
        }
        Ok(Patch::Applied)
    }
}
