use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use rill_core::{
    DomError, DomMutator, EFFECT_STATE_ATTR, EffectError, EffectKind, EffectOutcome, MemoryDom, NodeId,
    Reconciler, EffectScheduler, SideEffectRenderer, StreamingMarkdown,
};
use rill_renderer::config::MathMode;
use rill_renderer::html::EFFECT_ATTR;
use rill_renderer::utils::escaped;
use rill_renderer::{NodeRenderer, RenderConfig, TagRegistry};

fn view() -> (StreamingMarkdown<MemoryDom>, NodeId) {
    view_with(RenderConfig::default())
}

fn view_with(config: RenderConfig) -> (StreamingMarkdown<MemoryDom>, NodeId) {
    let mut dom = MemoryDom::new();
    let mount = dom.create_element("div");
    (StreamingMarkdown::new(dom, mount, config), mount)
}

fn blocks(md: &StreamingMarkdown<MemoryDom>, mount: NodeId) -> Vec<NodeId> {
    md.dom().children(&mount)
}

#[derive(Default)]
struct CountingRenderer {
    calls: Cell<usize>,
}

#[async_trait(?Send)]
impl SideEffectRenderer for CountingRenderer {
    async fn render(&self, _kind: EffectKind, source: &str) -> Result<String, EffectError> {
        self.calls.set(self.calls.get() + 1);
        Ok(format!("<svg><text>{}</text></svg>", escaped(source.trim())))
    }
}

struct FailingRenderer;

/// `MemoryDom` that fails the next `set_text` call once armed.
#[derive(Default)]
struct FlakyDom {
    inner: MemoryDom,
    fail_next_text: bool,
}

impl DomMutator for FlakyDom {
    type Node = NodeId;

    fn children(&self, parent: &NodeId) -> Vec<NodeId> {
        self.inner.children(parent)
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        self.inner.parent(node)
    }

    fn is_text(&self, node: &NodeId) -> bool {
        self.inner.is_text(node)
    }

    fn text_content(&self, node: &NodeId) -> String {
        self.inner.text_content(node)
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.inner.attribute(node, name)
    }

    fn find_by_attribute(&self, root: &NodeId, name: &str, value: Option<&str>) -> Vec<NodeId> {
        self.inner.find_by_attribute(root, name, value)
    }

    fn contains(&self, root: &NodeId, node: &NodeId) -> bool {
        self.inner.contains(root, node)
    }

    fn set_text(&mut self, node: &NodeId, text: &str) -> Result<(), DomError> {
        if std::mem::take(&mut self.fail_next_text) {
            return Err(DomError::from("text update rejected"));
        }
        self.inner.set_text(node, text)
    }

    fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.inner.set_attribute(node, name, value)
    }

    fn remove_attribute(&mut self, node: &NodeId, name: &str) -> Result<(), DomError> {
        self.inner.remove_attribute(node, name)
    }

    fn set_inner_markup(&mut self, node: &NodeId, markup: &str) -> Result<(), DomError> {
        self.inner.set_inner_markup(node, markup)
    }

    fn create_text(&mut self, text: &str) -> Result<NodeId, DomError> {
        self.inner.create_text(text)
    }

    fn create_from_markup(&mut self, markup: &str) -> Result<NodeId, DomError> {
        self.inner.create_from_markup(markup)
    }

    fn insert_before(
        &mut self,
        parent: &NodeId,
        child: &NodeId,
        reference: Option<&NodeId>,
    ) -> Result<(), DomError> {
        self.inner.insert_before(parent, child, reference)
    }

    fn replace_child(&mut self, parent: &NodeId, new: &NodeId, old: &NodeId) -> Result<(), DomError> {
        self.inner.replace_child(parent, new, old)
    }

    fn remove(&mut self, node: &NodeId) -> Result<(), DomError> {
        self.inner.remove(node)
    }

    fn clear(&mut self, node: &NodeId) -> Result<(), DomError> {
        self.inner.clear(node)
    }
}

#[async_trait(?Send)]
impl SideEffectRenderer for FailingRenderer {
    async fn render(&self, _kind: EffectKind, _source: &str) -> Result<String, EffectError> {
        Err(EffectError::Rejected("Parse error on line 1".into()))
    }
}

#[test]
fn reconciling_the_same_tree_twice_mutates_nothing() {
    let source = "# Title\n\nSome *text* with `code`.\n\n```rust\nfn main() {}\n```\n\n- a\n- [x] b\n\n| h |\n|---|\n| c |\n\n> quoted";
    let config = RenderConfig::default();
    let tags = TagRegistry::with_builtins();
    let tree = rill_renderer::process(source, &config, &tags, None);
    let renderer = NodeRenderer::new(&tags, config.math);

    let mut dom = MemoryDom::new();
    let mount = dom.create_element("div");
    let mut effects = EffectScheduler::new();

    let first = Reconciler::new(&mut dom, &renderer, &mut effects)
        .reconcile(&mount, &[], &tree.children)
        .unwrap();
    assert_eq!(first.inserted, tree.children.len());

    let before = dom.mutation_count();
    let second = Reconciler::new(&mut dom, &renderer, &mut effects)
        .reconcile(&mount, &tree.children, &tree.children)
        .unwrap();
    assert!(second.is_noop());
    assert_eq!(second.kept, tree.children.len());
    assert_eq!(dom.mutation_count(), before);
}

#[test]
fn identical_content_is_a_noop() {
    let (mut md, _mount) = view();
    md.set_content("Hello *there*");
    let before = md.dom().mutation_count();
    assert!(md.set_content("Hello *there*").is_noop());
    assert!(md.push_str("").is_noop());
    assert_eq!(md.dom().mutation_count(), before);
}

#[test]
fn appended_blocks_leave_earlier_blocks_untouched() {
    let (mut md, mount) = view();
    md.set_content("# Title\n\nFirst paragraph.\n\n");
    let before = blocks(&md, mount);
    assert_eq!(before.len(), 2);

    let stats = md.push_str("Second paragraph.\n\n- item");
    let after = blocks(&md, mount);
    assert_eq!(after.len(), 4);
    assert_eq!(&after[..2], &before[..]);
    assert_eq!(stats.kept, 2);
    assert_eq!(stats.inserted, 2);
    assert_eq!(md.dom().tag_name(after[3]), Some("ul"));
}

#[test]
fn heading_text_is_patched_in_place() {
    let (mut md, mount) = view();
    md.set_content("# Hello");
    let heading = blocks(&md, mount)[0];
    assert_eq!(md.dom().tag_name(heading), Some("h1"));
    let text = md.dom().children(&heading)[0];

    let stats = md.set_content("# Hello World");
    assert_eq!(stats.patched, 1);
    assert_eq!(blocks(&md, mount), vec![heading]);
    assert_eq!(md.dom().children(&heading), vec![text]);
    assert_eq!(md.dom().text_content(&heading), "Hello World");
}

#[test]
fn heading_depth_change_replaces_the_element() {
    let (mut md, mount) = view();
    md.set_content("# Hello");
    let h1 = blocks(&md, mount)[0];
    let stats = md.set_content("## Hello");
    let h2 = blocks(&md, mount)[0];
    assert_ne!(h1, h2);
    assert_eq!(stats.replaced, 1);
    assert_eq!(md.dom().tag_name(h2), Some("h2"));
}

#[test]
fn inline_code_paragraph() {
    let (mut md, mount) = view();
    md.set_content("Check `code` here");
    let paragraph = blocks(&md, mount)[0];
    let children = md.dom().children(&paragraph);
    assert_eq!(children.len(), 3);
    assert_eq!(md.dom().text_content(&children[0]), "Check ");
    assert_eq!(md.dom().tag_name(children[1]), Some("code"));
    assert_eq!(
        md.dom().attribute(&children[1], "class").as_deref(),
        Some("inline-code")
    );
    assert_eq!(md.dom().text_content(&children[1]), "code");
    assert_eq!(md.dom().text_content(&children[2]), " here");

    md.set_content("Check `code` there");
    assert_eq!(blocks(&md, mount), vec![paragraph]);
    assert_eq!(md.dom().children(&paragraph), children);
    assert_eq!(md.dom().text_content(&paragraph), "Check code there");
}

#[test]
fn special_characters_display_literally() {
    let (mut md, mount) = view();
    md.set_content(r#"Tom & "Jerry's" \<3 > 2"#);
    let paragraph = blocks(&md, mount)[0];
    assert!(md.dom().element_children(paragraph).is_empty());
    assert_eq!(md.dom().text_content(&mount), r#"Tom & "Jerry's" <3 > 2"#);
}

#[test]
fn unterminated_think_tag_streams_into_place() {
    let (mut md, mount) = view();
    md.set_content("<think>partial");
    let details = blocks(&md, mount);
    assert_eq!(details.len(), 1);
    assert_eq!(md.dom().tag_name(details[0]), Some("details"));
    let slot = md
        .dom()
        .find_by_attribute(&details[0], "data-slot", Some("content"))[0];
    assert_eq!(md.dom().text_content(&slot), "partial");

    md.push_str(" more</think>tail");
    let after = blocks(&md, mount);
    assert_eq!(after.len(), 2);
    assert_eq!(after[0], details[0]);
    assert_eq!(md.dom().text_content(&slot), "partial more");
    assert_eq!(md.dom().tag_name(after[1]), Some("p"));
    assert_eq!(md.dom().text_content(&after[1]), "tail");
}

#[test]
fn registering_a_tag_rerenders_current_content() {
    let (mut md, mount) = view();
    md.set_content("<plan>step one</plan>");
    assert_eq!(md.dom().tag_name(blocks(&md, mount)[0]), Some("p"));

    assert!(md.register_tag("plan", |text: &str| {
        format!(r#"<section class="plan">{}</section>"#, escaped(text))
    }));
    let section = blocks(&md, mount);
    assert_eq!(section.len(), 1);
    assert_eq!(md.dom().tag_name(section[0]), Some("section"));
    assert_eq!(md.dom().text_content(&section[0]), "step one");
}

#[test]
fn empty_content_clears_the_mount() {
    let (mut md, mount) = view();
    md.set_content("a\n\nb");
    assert_eq!(blocks(&md, mount).len(), 2);
    let stats = md.set_content("");
    assert_eq!(stats.removed, 2);
    assert!(blocks(&md, mount).is_empty());
}

#[test]
fn switching_documents_converges() {
    let (mut md, mount) = view();
    md.set_content("# A\n\ntext\n\n---");
    md.set_content("- x\n- y");
    insta::assert_snapshot!(md.dom().inner_html(mount), @"<ul><li>x</li><li>y</li></ul>");
}

#[test]
fn code_language_change_keeps_container() {
    let (mut md, mount) = view();
    md.set_content("```rust\nfn a() {}\n```");
    let container = blocks(&md, mount)[0];
    let button = md
        .dom()
        .find_by_attribute(&container, "class", Some("copy-code-btn"))[0];

    let stats = md.set_content("```python\nfn a() {}\n```");
    assert_eq!(stats.patched, 1);
    assert_eq!(blocks(&md, mount), vec![container]);
    assert!(md.dom().contains(&container, &button));
    assert_eq!(
        md.dom().attribute(&container, "data-lang").as_deref(),
        Some("python")
    );
    let label = md
        .dom()
        .find_by_attribute(&container, "data-slot", Some("language"))[0];
    assert_eq!(md.dom().text_content(&label), "python");
    let code = md
        .dom()
        .find_by_attribute(&container, "data-slot", Some("code"))[0];
    assert_eq!(
        md.dom().attribute(&code, "class").as_deref(),
        Some("language-python")
    );
}

#[test]
fn streamed_code_updates_only_the_body() {
    let (mut md, mount) = view();
    md.set_content("```nosuchlang\nline one\n");
    let container = blocks(&md, mount)[0];
    let code = md
        .dom()
        .find_by_attribute(&container, "data-slot", Some("code"))[0];

    md.push_str("line <two>\n```");
    assert_eq!(blocks(&md, mount), vec![container]);
    assert_eq!(md.dom().text_content(&code), "line one\nline <two>\n");
}

#[test]
fn task_item_toggle_replaces_only_that_item() {
    let (mut md, mount) = view();
    md.set_content("- [ ] one\n- [ ] two");
    let list = blocks(&md, mount)[0];
    let items = md.dom().element_children(list);

    md.set_content("- [ ] one\n- [x] two");
    assert_eq!(blocks(&md, mount), vec![list]);
    let after = md.dom().element_children(list);
    assert_eq!(after[0], items[0]);
    assert_ne!(after[1], items[1]);
    assert_eq!(
        md.dom().attribute(&after[1], "class").as_deref(),
        Some("task-list-item checked")
    );
}

#[test]
fn task_item_text_skips_the_checkbox() {
    let (mut md, mount) = view();
    md.set_content("- [ ] on");
    let list = blocks(&md, mount)[0];
    let item = md.dom().element_children(list)[0];
    let checkbox = md.dom().children(&item)[0];

    md.set_content("- [ ] one");
    let children = md.dom().children(&item);
    assert_eq!(children[0], checkbox);
    assert_eq!(md.dom().tag_name(checkbox), Some("input"));
    assert_eq!(md.dom().text_content(&item), "one");
}

#[test]
fn inline_html_rerenders_its_paragraph() {
    let (mut md, mount) = view();
    md.set_content("a <b>x</b>");
    let paragraph = blocks(&md, mount)[0];
    md.set_content("a <b>xy</b> c");
    assert_eq!(blocks(&md, mount), vec![paragraph]);
    assert_eq!(md.dom().inner_html(paragraph), "a <b>xy</b> c");
}

#[test]
fn copy_writes_the_raw_code_of_the_clicked_block() {
    let copied = Rc::new(RefCell::new(Vec::<String>::new()));
    let log = copied.clone();
    let (md, mount) = view();
    let mut md = md.with_clipboard(move |text: &str| log.borrow_mut().push(text.to_string()));
    md.set_content("intro\n\n```rust\nlet a = 1;\n```\n\n> ```\n> <second>\n> ```");

    let buttons = md
        .dom()
        .find_by_attribute(&mount, "class", Some("copy-code-btn"));
    assert_eq!(buttons.len(), 2);
    assert!(md.copy_code(&buttons[1]));
    assert!(md.copy_code(&buttons[0]));
    assert_eq!(*copied.borrow(), vec!["<second>\n", "let a = 1;\n"]);

    let intro = blocks(&md, mount)[0];
    assert!(!md.copy_code(&intro));
    assert_eq!(copied.borrow().len(), 2);
}

#[test]
fn copy_without_clipboard_does_nothing() {
    let (mut md, mount) = view();
    md.set_content("```\nx\n```");
    let button = md
        .dom()
        .find_by_attribute(&mount, "class", Some("copy-code-btn"))[0];
    assert_eq!(md.code_source_for(&button), Some("x\n"));
    assert!(!md.copy_code(&button));
}

#[tokio::test]
async fn unchanged_diagram_is_rendered_once() {
    let (mut md, mount) = view();
    let renderer = CountingRenderer::default();
    md.set_content("```mermaid\ngraph TD; A-->B\n```\n\nStreaming");
    assert_eq!(md.flush_effects(&renderer).await, vec![EffectOutcome::Rendered]);
    assert_eq!(renderer.calls.get(), 1);

    let diagram = md.dom().find_by_attribute(&mount, EFFECT_ATTR, None)[0];
    assert_eq!(
        md.dom().attribute(&diagram, EFFECT_STATE_ATTR).as_deref(),
        Some("rendered")
    );

    md.push_str(" text keeps arriving");
    md.push_str(", and more.");
    assert!(md.flush_effects(&renderer).await.is_empty());
    assert_eq!(renderer.calls.get(), 1);
    assert_eq!(md.dom().text_content(&diagram), "graph TD; A-->B");
}

#[tokio::test]
async fn changed_diagram_source_rerenders_in_place() {
    let (mut md, mount) = view();
    let renderer = CountingRenderer::default();
    md.set_content("```mermaid\ngraph TD\n```");
    md.flush_effects(&renderer).await;
    let container = blocks(&md, mount)[0];
    let diagram = md.dom().find_by_attribute(&container, EFFECT_ATTR, None)[0];

    md.set_content("```mermaid\ngraph LR\n```");
    assert!(md.dom().text_content(&diagram).contains("Rendering diagram..."));
    assert_eq!(md.flush_effects(&renderer).await, vec![EffectOutcome::Rendered]);
    assert_eq!(renderer.calls.get(), 2);
    assert_eq!(blocks(&md, mount), vec![container]);
    assert_eq!(md.dom().text_content(&diagram), "graph LR");
}

#[tokio::test]
async fn diagram_failure_shows_source() {
    let (mut md, mount) = view();
    md.set_content("```mermaid\nA --> <B>\n```");
    assert_eq!(md.flush_effects(&FailingRenderer).await, vec![EffectOutcome::Failed]);

    let diagram = md.dom().find_by_attribute(&mount, EFFECT_ATTR, None)[0];
    let text = md.dom().text_content(&diagram);
    assert!(text.contains("Failed to render diagram"));
    assert!(text.contains("Parse error on line 1"));
    assert!(text.contains("A --> <B>"));
    assert_eq!(
        md.dom().attribute(&diagram, EFFECT_STATE_ATTR).as_deref(),
        Some("error")
    );
}

#[tokio::test]
async fn result_for_replaced_diagram_is_dropped() {
    let (mut md, _mount) = view();
    md.set_content("```mermaid\ngraph TD\n```");
    let jobs = md.take_effects();
    assert_eq!(jobs.len(), 1);

    md.set_content("plain text now");
    let before = md.dom().mutation_count();
    let outcome = md
        .resolve_effect(&jobs[0], Ok("<svg></svg>".into()))
        .unwrap();
    assert_eq!(outcome, EffectOutcome::Discarded);
    assert_eq!(md.dom().mutation_count(), before);
}

#[test]
fn external_math_is_scheduled_once() {
    let (mut md, mount) = view_with(RenderConfig {
        math: MathMode::External,
        ..Default::default()
    });
    md.set_content("Euler: $e^{i\\pi}$");
    let jobs = md.take_effects();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, EffectKind::Math { display: false });
    assert_eq!(jobs[0].source, "e^{i\\pi}");
    assert_eq!(
        md.resolve_effect(&jobs[0], Ok("<math><mi>e</mi></math>".into()))
            .unwrap(),
        EffectOutcome::Rendered
    );

    md.push_str(" is neat");
    assert_eq!(md.pending_effects(), 0);
    let math = md.dom().find_by_attribute(&mount, EFFECT_ATTR, None)[0];
    assert_eq!(md.dom().text_content(&math), "e");
    assert_eq!(md.dom().text_content(&mount), "Euler: e is neat");
}

#[test]
fn link_attributes_are_patched_in_place() {
    let (mut md, mount) = view();
    md.set_content("See [site](https://a.example).");
    let paragraph = blocks(&md, mount)[0];
    let link = md.dom().elements_by_tag(paragraph, "a")[0];

    md.set_content("See [site](https://b.example \"Bee\").");
    assert_eq!(blocks(&md, mount), vec![paragraph]);
    assert_eq!(md.dom().elements_by_tag(paragraph, "a"), vec![link]);
    assert_eq!(
        md.dom().outer_html(link),
        r#"<a href="https://b.example" title="Bee">site</a>"#
    );

    md.set_content("See [site](https://b.example).");
    assert_eq!(md.dom().elements_by_tag(paragraph, "a"), vec![link]);
    assert_eq!(md.dom().attribute(&link, "title"), None);
}

#[test]
fn list_start_is_patched_and_kind_flip_replaces() {
    let (mut md, mount) = view();
    md.set_content("1. a\n2. b");
    let list = blocks(&md, mount)[0];
    assert_eq!(md.dom().outer_html(list), "<ol><li>a</li><li>b</li></ol>");

    md.set_content("3. a\n4. b");
    assert_eq!(blocks(&md, mount), vec![list]);
    assert_eq!(
        md.dom().outer_html(list),
        r#"<ol start="3"><li>a</li><li>b</li></ol>"#
    );

    md.set_content("1. a\n2. b");
    assert_eq!(blocks(&md, mount), vec![list]);
    assert_eq!(md.dom().attribute(&list, "start"), None);

    let stats = md.set_content("- a\n- b");
    assert_eq!(stats.replaced, 1);
    let bullets = blocks(&md, mount);
    assert_ne!(bullets, vec![list]);
    assert_eq!(md.dom().outer_html(bullets[0]), "<ul><li>a</li><li>b</li></ul>");
}

#[test]
fn failed_patch_rebuilds_the_mount_from_scratch() {
    let mut dom = FlakyDom::default();
    let mount = dom.inner.create_element("div");
    let mut md = StreamingMarkdown::new(dom, mount, RenderConfig::default());
    md.set_content("# Hello\n\nbody");
    let heading = md.dom().children(&mount)[0];

    md.dom_mut().fail_next_text = true;
    md.set_content("# Hello World\n\nbody");
    let rebuilt = md.dom().children(&mount);
    assert_eq!(rebuilt.len(), 2);
    assert_ne!(rebuilt[0], heading);
    assert_eq!(md.dom().inner.inner_html(mount), "<h1>Hello World</h1><p>body</p>");

    md.set_content("# Hello World!\n\nbody");
    assert_eq!(md.dom().children(&mount)[0], rebuilt[0]);
    assert_eq!(md.dom().inner.outer_html(rebuilt[0]), "<h1>Hello World!</h1>");
}

#[test]
fn custom_tag_patch_goes_through_its_renderer() {
    fn shout(text: &str) -> String {
        format!(
            r#"<section class="plan"><div data-slot="content">{}</div></section>"#,
            escaped(&text.to_uppercase())
        )
    }
    let (mut md, mount) = view();
    md.register_tag("plan", shout);
    md.set_content("<plan>ab");
    let section = blocks(&md, mount)[0];

    md.set_content("<plan>abc");
    assert_eq!(blocks(&md, mount), vec![section]);
    let streamed = md.dom().outer_html(section);
    assert_eq!(
        streamed,
        r#"<section class="plan"><div data-slot="content">ABC</div></section>"#
    );

    let (mut fresh, fresh_mount) = view();
    fresh.register_tag("plan", shout);
    fresh.set_content("<plan>abc");
    assert_eq!(fresh.dom().inner_html(fresh_mount), streamed);
}

#[test]
fn answer_after_think_block_renders_as_markdown() {
    let (mut md, mount) = view();
    md.set_content("<think>\nhmm\n</think>\n**Answer**: a < b");
    let children = blocks(&md, mount);
    assert_eq!(children.len(), 2);
    assert_eq!(md.dom().tag_name(children[0]), Some("details"));
    assert_eq!(
        md.dom().outer_html(children[1]),
        "<p><strong>Answer</strong>: a &lt; b</p>"
    );
}

#[test]
fn inline_code_after_think_keeps_following_space() {
    let (mut md, mount) = view();
    md.set_content("<think>a</think>`x` and y");
    let children = blocks(&md, mount);
    assert_eq!(
        md.dom().outer_html(children[1]),
        r#"<p><code class="inline-code">x</code> and y</p>"#
    );
}

#[tokio::test]
async fn resolved_math_survives_inline_html_rebuild() {
    let (mut md, mount) = view_with(RenderConfig {
        math: MathMode::External,
        ..Default::default()
    });
    let renderer = CountingRenderer::default();
    md.set_content("<b>hi</b> $x$ a");
    assert_eq!(md.flush_effects(&renderer).await, vec![EffectOutcome::Rendered]);
    let paragraph = blocks(&md, mount)[0];
    let math = md.dom().find_by_attribute(&mount, EFFECT_ATTR, None)[0];

    md.push_str(" b");
    md.push_str(" c");
    assert_eq!(md.pending_effects(), 0);
    assert!(md.flush_effects(&renderer).await.is_empty());
    assert_eq!(renderer.calls.get(), 1);
    assert_eq!(blocks(&md, mount), vec![paragraph]);
    assert_eq!(md.dom().find_by_attribute(&mount, EFFECT_ATTR, None), vec![math]);
    assert_eq!(md.dom().parent(&math), Some(paragraph));
    assert_eq!(
        md.dom().attribute(&math, EFFECT_STATE_ATTR).as_deref(),
        Some("rendered")
    );
    assert_eq!(md.dom().text_content(&paragraph), "hi x a b c");

    md.push_str(" $y$");
    assert_eq!(md.pending_effects(), 1);
}
