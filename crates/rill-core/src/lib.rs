//! rill-core: incremental DOM reconciliation for streaming Markdown.
//!
//! This crate provides:
//! - `DomMutator` - the DOM capability the engine writes through
//! - `MemoryDom` - an in-process implementation for native hosts and tests
//! - `Reconciler` - per-index diff and patch of a tree against a mount
//! - `EffectScheduler` - deferred diagram and math rendering
//! - `StreamingMarkdown<D>` - source buffer plus one reconciliation cycle per update

pub mod document;
pub mod dom;
pub mod effects;
pub mod memory_dom;
pub mod platform;
pub mod reconcile;

pub use document::StreamingMarkdown;
pub use dom::{DomError, DomMutator};
pub use effects::{
    EFFECT_ID_ATTR, EFFECT_STATE_ATTR, EffectError, EffectJob, EffectOutcome, EffectScheduler,
    SideEffectRenderer,
};
pub use memory_dom::{MemoryDom, NodeId};
pub use platform::ClipboardPlatform;
pub use reconcile::{ReconcileStats, Reconciler, can_patch_in_place, nodes_equal};
pub use rill_renderer::{EffectKind, Node, NodeKind, RenderConfig, TagRegistry, TagRenderer};
