//! Ties the Source Registry, Trigger Engine, and schema together behind one
//! handle any transport binding can share (SPEC_FULL.md §6).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::error::Result;
use crate::expr::{self, negate_tree, PredicateNode};
use crate::protocol::TcpUpstream;
use crate::schema::Schema;
use crate::source::{self, DetachGuard, SourceHandle, SourceRegistry};
use crate::trigger::{Trigger, TriggerEngine, WebhookClient};
use crate::view::{Filter, View, ViewEvent};

pub struct ViewstreamServer {
    schema: Schema,
    upstream_addr: String,
    source_registry: SourceRegistry,
    trigger_engine: Arc<TriggerEngine>,
    /// View names with a running trigger-dispatch task, keyed to the
    /// `DetachGuard` backing that task's Source subscription — so a second
    /// trigger on the same view doesn't spawn a duplicate dispatcher, and
    /// removing the last trigger on a view releases the subscription.
    trigger_dispatchers: Mutex<HashMap<String, DetachGuard>>,
}

impl ViewstreamServer {
    pub fn new(schema: Schema, upstream_addr: String, webhook: Arc<WebhookClient>) -> Self {
        Self {
            schema,
            upstream_addr,
            source_registry: SourceRegistry::new(),
            trigger_engine: Arc::new(TriggerEngine::new(webhook)),
            trigger_dispatchers: Mutex::new(HashMap::new()),
        }
    }

    async fn source_handle(&self, view_name: &str) -> Result<SourceHandle> {
        if let Some(handle) = self.source_registry.get(view_name) {
            return Ok(handle);
        }
        let view_def = self.schema.view(view_name)?.clone();
        let enums = self.schema.enums.clone();
        let upstream = TcpUpstream::connect(&self.upstream_addr).await?;
        Ok(self
            .source_registry
            .get_or_spawn(view_name, || source::spawn(view_def, enums, Box::new(upstream))))
    }

    /// Attaches a new subscriber to `view_name`, filtered by `predicate_tree`
    /// (an empty tree subscribes unfiltered). `delta_mode` selects whether
    /// `Update`/`Delete` payloads carry only changed fields or full rows
    /// (spec.md §4.5). Returns the filtered initial snapshot events, the
    /// live View state the caller keeps feeding subsequent broadcast events
    /// through, and a `DetachGuard` the caller must hold for the
    /// subscription's lifetime — dropping it releases the Source's
    /// subscriber-count slot this attach took (spec.md §4.4/§4.7).
    pub async fn subscribe(
        &self,
        view_name: &str,
        predicate_tree: Option<PredicateNode>,
        delta_mode: bool,
    ) -> Result<(
        Vec<ViewEvent>,
        tokio::sync::broadcast::Receiver<crate::source::UpdateEvent>,
        View,
        DetachGuard,
    )> {
        let view_def = self.schema.view(view_name)?.clone();
        let filter = match predicate_tree {
            Some(tree) => {
                let match_predicate =
                    expr::compile_for_view(&tree, &view_def, &self.schema.enums)?;
                let unmatch_predicate =
                    expr::compile_for_view(&negate_tree(tree), &view_def, &self.schema.enums)?;
                Some(Filter::new(match_predicate, unmatch_predicate))
            }
            None => None,
        };

        let handle = self.source_handle(view_name).await?;
        let subscription = self.source_registry.attach(view_name, &handle).await?;
        let (view, initial_events) = View::new(
            filter,
            delta_mode,
            view_def.primary_key_field.clone(),
            subscription.snapshot,
        );
        Ok((initial_events, subscription.rx, view, subscription.detach))
    }

    /// Registers a trigger with asymmetric fire/clear predicates. `clear`
    /// omitted defaults to the negation of `fire` at the transport layer
    /// (spec.md §9 Open Question (c)) — this method always takes both.
    /// Returns the trigger's definition (spec.md §6: `createTrigger(...) →
    /// Trigger`).
    pub async fn create_trigger(
        &self,
        name: String,
        view_name: String,
        webhook_url: String,
        fire_tree: PredicateNode,
        clear_tree: PredicateNode,
    ) -> Result<Trigger> {
        let view_def = self.schema.view(&view_name)?.clone();
        let fire = expr::compile_for_view(&fire_tree, &view_def, &self.schema.enums)?;
        let clear = expr::compile_for_view(&clear_tree, &view_def, &self.schema.enums)?;

        let handle = self.source_handle(&view_name).await?;
        let already_dispatching = self.trigger_dispatchers.lock().contains_key(&view_name);
        let snapshot = if already_dispatching {
            handle.snapshot().await?
        } else {
            let subscription = self.source_registry.attach(&view_name, &handle).await?;
            let engine = self.trigger_engine.clone();
            tokio::spawn(dispatch_loop(view_name.clone(), subscription.rx, engine));
            self.trigger_dispatchers
                .lock()
                .insert(view_name.clone(), subscription.detach);
            subscription.snapshot
        };

        let view = View::new_suppressed(
            Some(Filter::new(fire, clear)),
            false,
            view_def.primary_key_field.clone(),
            snapshot,
        );
        self.trigger_engine
            .create(name, view_name, webhook_url, view)
            .await
    }

    /// Removes a trigger, returning its prior definition (spec.md §6:
    /// `deleteTrigger(viewName, name) → Trigger`). Releases the view's
    /// dispatcher subscription once no triggers remain on it.
    pub async fn delete_trigger(&self, view_name: &str, name: &str) -> Result<Trigger> {
        let removed = self.trigger_engine.delete(view_name, name).await?;
        if !self.trigger_engine.has_any(view_name).await {
            self.trigger_dispatchers.lock().remove(view_name);
        }
        Ok(removed)
    }

    /// Looks up a trigger's definition without removing it (spec.md §6:
    /// `getTrigger(viewName, name) → Trigger`).
    pub async fn get_trigger(&self, view_name: &str, name: &str) -> Option<Trigger> {
        self.trigger_engine.get(view_name, name).await
    }

    /// Lists every trigger registered on `view_name` (spec.md §6:
    /// `listTriggers(viewName) → [Trigger]`).
    pub async fn list_triggers(&self, view_name: &str) -> Vec<Trigger> {
        self.trigger_engine.list(view_name).await
    }
}

async fn dispatch_loop(
    view_name: String,
    mut rx: tokio::sync::broadcast::Receiver<crate::source::UpdateEvent>,
    engine: Arc<TriggerEngine>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => engine.dispatch(&view_name, &event).await,
            Err(RecvError::Lagged(skipped)) => {
                warn!(view = %view_name, skipped, "trigger dispatcher lagged; some events skipped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
