//! Deferred diagram and math rendering.
//!
//! The reconciler schedules a job when it inserts or updates an element that
//! needs asynchronous rendering. Jobs run after the cycle that created them
//! has committed its DOM changes, and results are applied only if the target
//! element is still attached and no newer job for it has been scheduled.

use std::collections::HashMap;

use async_trait::async_trait;
use miette::Diagnostic;
use rill_renderer::html::EffectKind;
use rill_renderer::utils::escape_text;
use thiserror::Error;

use crate::dom::{DomError, DomMutator};

/// Attribute holding the scheduler's id for an effect element.
pub const EFFECT_ID_ATTR: &str = "data-effect-id";
/// Attribute recording the outcome once a job resolves.
pub const EFFECT_STATE_ATTR: &str = "data-effect-state";

#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
pub enum EffectError {
    #[error("{0}")]
    #[diagnostic(code(rill::effects::rejected))]
    Rejected(String),

    #[error("{0} is unavailable")]
    #[diagnostic(code(rill::effects::unavailable))]
    Unavailable(&'static str),
}

/// External renderer for diagrams and typeset math.
///
/// Returns markup for the job's element. Implementations that draw into an
/// element themselves should draw into a detached scratch element and return
/// its markup, so stale results never reach the live view.
#[async_trait(?Send)]
pub trait SideEffectRenderer {
    async fn render(&self, kind: EffectKind, source: &str) -> Result<String, EffectError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectJob<N> {
    pub id: u64,
    pub generation: u64,
    pub kind: EffectKind,
    pub source: String,
    pub target: N,
}

/// How a resolved job was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectOutcome {
    Rendered,
    Failed,
    /// Superseded by a newer job or the element left the document.
    Discarded,
}

#[derive(Debug)]
pub struct EffectScheduler<N> {
    next_id: u64,
    next_generation: u64,
    pending: Vec<EffectJob<N>>,
    /// Newest generation per effect id that has not resolved yet.
    in_flight: HashMap<u64, u64>,
}

impl<N> Default for EffectScheduler<N> {
    fn default() -> Self {
        Self {
            next_id: 0,
            next_generation: 0,
            pending: Vec::new(),
            in_flight: HashMap::new(),
        }
    }
}

impl<N: Clone> EffectScheduler<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a render for `target`, superseding any in-flight job for it.
    pub fn schedule<D>(
        &mut self,
        dom: &mut D,
        target: &N,
        kind: EffectKind,
        source: String,
    ) -> Result<(), DomError>
    where
        D: DomMutator<Node = N>,
    {
        let id = match dom
            .attribute(target, EFFECT_ID_ATTR)
            .and_then(|v| v.parse::<u64>().ok())
        {
            Some(id) => id,
            None => {
                self.next_id += 1;
                dom.set_attribute(target, EFFECT_ID_ATTR, &self.next_id.to_string())?;
                self.next_id
            }
        };
        if dom.attribute(target, EFFECT_STATE_ATTR).is_some() {
            dom.remove_attribute(target, EFFECT_STATE_ATTR)?;
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        self.in_flight.insert(id, generation);
        self.pending.retain(|job| job.id != id);
        tracing::trace!(target: "rill::effects", id, generation, kind = kind.as_str(), "scheduled");
        self.pending.push(EffectJob {
            id,
            generation,
            kind,
            source,
            target: target.clone(),
        });
        Ok(())
    }

    /// Jobs scheduled since the last call, in scheduling order.
    pub fn take_pending(&mut self) -> Vec<EffectJob<N>> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether `job` is still the newest job for its element.
    pub fn is_current(&self, job: &EffectJob<N>) -> bool {
        self.in_flight.get(&job.id) == Some(&job.generation)
    }

    /// Apply a finished job to the DOM.
    ///
    /// Stale or detached jobs are dropped without touching the DOM. Failures
    /// render an error box holding the escaped source and message.
    pub fn resolve<D>(
        &mut self,
        dom: &mut D,
        mount: &N,
        job: &EffectJob<N>,
        result: Result<String, EffectError>,
    ) -> Result<EffectOutcome, DomError>
    where
        D: DomMutator<Node = N>,
    {
        if !self.is_current(job) {
            tracing::trace!(target: "rill::effects", id = job.id, generation = job.generation, "stale result dropped");
            return Ok(EffectOutcome::Discarded);
        }
        self.in_flight.remove(&job.id);
        if !dom.contains(mount, &job.target) {
            tracing::trace!(target: "rill::effects", id = job.id, "target detached, result dropped");
            return Ok(EffectOutcome::Discarded);
        }

        match result {
            Ok(markup) => {
                dom.set_inner_markup(&job.target, &markup)?;
                dom.set_attribute(&job.target, EFFECT_STATE_ATTR, "rendered")?;
                Ok(EffectOutcome::Rendered)
            }
            Err(error) => {
                tracing::warn!(target: "rill::effects", id = job.id, kind = job.kind.as_str(), %error, "side-effect render failed");
                dom.set_inner_markup(&job.target, &error_markup(job.kind, &job.source, &error))?;
                dom.set_attribute(&job.target, EFFECT_STATE_ATTR, "error")?;
                Ok(EffectOutcome::Failed)
            }
        }
    }

    /// Forget all in-flight work, e.g. after the mount was cleared.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.in_flight.clear();
    }
}

/// The inline error box shown when a side-effect render fails.
pub fn error_markup(kind: EffectKind, source: &str, error: &EffectError) -> String {
    let mut html = String::new();
    match kind {
        EffectKind::Diagram => {
            html.push_str(r#"<div class="effect-error"><strong>Failed to render diagram</strong><div class="effect-error-message">"#);
            escape_text(&mut html, &error.to_string());
            html.push_str("</div><pre>");
            escape_text(&mut html, source);
            html.push_str("</pre></div>");
        }
        EffectKind::Math { .. } => {
            html.push_str(r#"<span class="effect-error"><strong>Failed to render math</strong> <span class="effect-error-message">"#);
            escape_text(&mut html, &error.to_string());
            html.push_str("</span> <code>");
            escape_text(&mut html, source);
            html.push_str("</code></span>");
        }
    }
    html
}
