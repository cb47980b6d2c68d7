//! Filter session: the search-box state machine.
//!
//! ```text
//!              text entered                 rows found
//! Ineligible ─────────────▶ Armed ──commit──────────────▶ Active ◀─┐
//!     ▲                      │  ▲   (Query mode)             │     │ text entered
//!     │                      │  └──────── clear() ───────────┤     │ (Filter mode)
//!     └────── clear(all) ────┴───────────────────────────────┴─────┘
//! ```
//!
//! While Armed, committed text is a broad *query* over the whole store.
//! Once a query has produced rows the session is Active and further typing
//! *filters* that result set.
//!
//! A session is confined to its owner: `set_input_text`, `commit` and
//! `clear` take `&mut self` and return immediately. Evaluation runs on a
//! spawned task; debounce expiries and finished evaluations come back as
//! [`Wakeup`]s, which the owner feeds to [`FilterSession::handle`] (or lets
//! [`FilterSession::run_until_idle`] pump). Each commit bumps a generation
//! counter and a completion from an older generation is dropped, so results
//! always land in commit order.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};

use crate::ast::{Diagnostic, SearchMode};
use crate::compiler::compile;
use crate::config::SessionConfig;
use crate::debounce::Debouncer;
use crate::engine::{RecordId, Store};
use crate::error::StoreError;
use crate::events::{CollectionAction, CollectionChanged, EventBus, PropertyChanged, SessionEvent};
use crate::index::EntityTypeIndex;
use crate::snapshot::ResultSnapshot;
use crate::tokenizer::tokenize;

/// Whether typed text queries the store or filters committed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FilteringState {
    /// Nothing typed.
    Ineligible,
    /// Typed text is a query.
    Armed,
    /// A query has results; typed text filters them.
    Active,
}

/// Progress of the text in the search box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SearchEntryState {
    Cleared,
    QueryEmpty,
    QueryEnteredNotCommitted,
    QueryEnteredCommitting,
    QueryCompleteNoResults,
    QueryCompleteWithResults,
}

/// Result of one evaluation, tagged with the generation that started it.
#[derive(Debug)]
pub struct Completion {
    generation: u64,
    mode: SearchMode,
    outcome: Outcome,
}

impl Completion {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }
}

#[derive(Debug)]
enum Outcome {
    Rows(Vec<RecordId>),
    Unsatisfiable,
    Failed(StoreError),
}

/// Work delivered back to the session owner.
#[derive(Debug)]
pub enum Wakeup {
    /// The debounce timer armed with this ticket expired.
    DebounceElapsed(u64),
    /// A background evaluation finished.
    Completed(Completion),
}

pub struct FilterSession {
    index: Arc<EntityTypeIndex>,
    store: Arc<dyn Store>,
    config: SessionConfig,

    input_text: String,
    committed_text: String,
    filtering: FilteringState,
    entry: SearchEntryState,
    busy: bool,
    snapshot: ResultSnapshot,
    /// Rows of the last Query-mode result; filters refine this.
    base: Vec<RecordId>,
    generation: u64,
    in_flight: usize,
    diagnostics: Vec<Diagnostic>,
    last_error: Option<StoreError>,

    runtime: Handle,
    debouncer: Debouncer,
    wakeup_tx: mpsc::UnboundedSender<Wakeup>,
    wakeups: mpsc::UnboundedReceiver<Wakeup>,
    bus: EventBus,
}

impl FilterSession {
    /// Bind a session to one record type and one store, running background
    /// work on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Outside a runtime context; use [`with_handle`](Self::with_handle) there.
    pub fn new(index: Arc<EntityTypeIndex>, store: Arc<dyn Store>, config: SessionConfig) -> Self {
        Self::with_handle(index, store, config, Handle::current())
    }

    /// Bind a session to one record type and one store, running background
    /// work on `runtime`. The session's methods may then be called from a
    /// thread that is not itself inside a runtime.
    pub fn with_handle(
        index: Arc<EntityTypeIndex>,
        store: Arc<dyn Store>,
        config: SessionConfig,
        runtime: Handle,
    ) -> Self {
        let (wakeup_tx, wakeups) = mpsc::unbounded_channel();
        let timer_tx = wakeup_tx.clone();
        let debouncer = Debouncer::new(runtime.clone(), move |ticket| {
            let _ = timer_tx.send(Wakeup::DebounceElapsed(ticket));
        });

        Self {
            index,
            store,
            bus: EventBus::new(config.event_capacity),
            config,
            input_text: String::new(),
            committed_text: String::new(),
            filtering: FilteringState::Ineligible,
            entry: SearchEntryState::Cleared,
            busy: false,
            snapshot: ResultSnapshot::new(),
            base: Vec::new(),
            generation: 0,
            in_flight: 0,
            diagnostics: Vec::new(),
            last_error: None,
            runtime,
            debouncer,
            wakeup_tx,
            wakeups,
        }
    }

    /// Receive change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    pub fn index(&self) -> &EntityTypeIndex {
        &self.index
    }

    pub fn input_text(&self) -> &str {
        &self.input_text
    }

    /// Text of the query whose results are committed.
    pub fn committed_text(&self) -> &str {
        &self.committed_text
    }

    pub fn filtering_state(&self) -> FilteringState {
        self.filtering
    }

    pub fn search_entry_state(&self) -> SearchEntryState {
        self.entry
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Visible results, in order.
    pub fn results(&self) -> &[RecordId] {
        self.snapshot.items()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Mode the next commit would evaluate in.
    pub fn mode(&self) -> SearchMode {
        match self.filtering {
            FilteringState::Active => SearchMode::Filter,
            _ => SearchMode::Query,
        }
    }

    /// Compiler findings of the latest commit.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The store failure of the latest evaluation, if it failed.
    pub fn last_error(&self) -> Option<&StoreError> {
        self.last_error.as_ref()
    }

    /// Update the search box text and restart the debounce timer.
    pub fn set_input_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text == self.input_text {
            return;
        }
        self.input_text = text;
        self.publish_property(PropertyChanged::InputText(self.input_text.clone()));
        self.set_busy(false);

        let blank = self.input_text.trim().is_empty();
        match self.filtering {
            FilteringState::Ineligible if blank => {}
            FilteringState::Ineligible => {
                self.set_filtering(FilteringState::Armed);
                self.set_entry(SearchEntryState::QueryEnteredNotCommitted);
                self.debouncer.arm(self.config.debounce);
            }
            FilteringState::Armed if blank => {
                // Nothing left to query; supersede any running evaluation.
                self.debouncer.cancel();
                self.generation += 1;
                self.set_entry(SearchEntryState::QueryEmpty);
            }
            FilteringState::Armed | FilteringState::Active => {
                self.set_entry(SearchEntryState::QueryEnteredNotCommitted);
                self.debouncer.arm(self.config.debounce);
            }
        }
    }

    /// Evaluate the current text now, bypassing any pending debounce.
    ///
    /// Returns the generation of the started evaluation, or `None` when
    /// there was nothing to evaluate.
    pub fn commit(&mut self) -> Option<u64> {
        self.debouncer.cancel();
        if self.filtering == FilteringState::Ineligible {
            return None;
        }

        self.generation += 1;
        let generation = self.generation;
        let mode = self.mode();
        let compiled = compile(&tokenize(&self.input_text), &self.index, mode);
        if mode == SearchMode::Query && compiled.is_empty() {
            self.set_busy(false);
            self.set_entry(SearchEntryState::QueryEmpty);
            return None;
        }

        if mode == SearchMode::Query {
            self.committed_text = self.input_text.clone();
        }
        self.diagnostics = compiled.diagnostics.clone();
        self.set_entry(SearchEntryState::QueryEnteredCommitting);
        tracing::debug!(generation, %mode, text = %self.input_text, "commit");

        if !compiled.is_satisfiable() {
            self.complete(Completion {
                generation,
                mode,
                outcome: Outcome::Unsatisfiable,
            });
            return Some(generation);
        }
        if compiled.is_empty() {
            // An empty filter shows the whole query result again.
            let rows = self.base.clone();
            self.complete(Completion {
                generation,
                mode,
                outcome: Outcome::Rows(rows),
            });
            return Some(generation);
        }

        let fragment = compiled.to_sql(self.store.dialect());
        let store = Arc::clone(&self.store);
        let tx = self.wakeup_tx.clone();
        self.in_flight += 1;
        self.set_busy(true);
        self.runtime.spawn(async move {
            let outcome = match store.execute(&fragment).await {
                Ok(rows) => Outcome::Rows(rows),
                Err(e) => Outcome::Failed(e),
            };
            let _ = tx.send(Wakeup::Completed(Completion {
                generation,
                mode,
                outcome,
            }));
        });

        Some(generation)
    }

    /// Drop the committed query.
    ///
    /// `clear(false)` keeps the typed text as the seed of a new query;
    /// `clear(true)` wipes everything. Any in-flight evaluation is
    /// superseded.
    pub fn clear(&mut self, all: bool) {
        self.debouncer.cancel();
        self.generation += 1;
        self.set_busy(false);

        if all {
            if !self.input_text.is_empty() {
                self.input_text.clear();
                self.publish_property(PropertyChanged::InputText(String::new()));
            }
            self.reset_results();
            self.set_filtering(FilteringState::Ineligible);
            self.set_entry(SearchEntryState::Cleared);
            return;
        }

        if self.filtering == FilteringState::Ineligible {
            return;
        }
        self.reset_results();
        self.set_filtering(FilteringState::Armed);
        if self.input_text.trim().is_empty() {
            self.set_entry(SearchEntryState::QueryEmpty);
        } else {
            self.set_entry(SearchEntryState::QueryEnteredNotCommitted);
        }
    }

    /// Wait for the next timer expiry or finished evaluation.
    pub async fn next_wakeup(&mut self) -> Option<Wakeup> {
        self.wakeups.recv().await
    }

    /// A queued wakeup, without waiting.
    pub fn try_next_wakeup(&mut self) -> Option<Wakeup> {
        self.wakeups.try_recv().ok()
    }

    /// Apply a wakeup on the owner's context.
    pub fn handle(&mut self, wakeup: Wakeup) {
        match wakeup {
            Wakeup::DebounceElapsed(ticket) => {
                if self.debouncer.is_current(ticket) {
                    self.debouncer.settle();
                    self.commit();
                }
            }
            Wakeup::Completed(completion) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                self.complete(completion);
            }
        }
    }

    /// Pump wakeups until no timer is armed and no evaluation is running.
    pub async fn run_until_idle(&mut self) {
        while self.in_flight > 0 || self.debouncer.is_armed() {
            match self.next_wakeup().await {
                Some(wakeup) => self.handle(wakeup),
                None => break,
            }
        }
    }

    /// A record matching the committed query appeared in the store.
    ///
    /// Ignored unless a query has produced results.
    pub fn record_added(&mut self, id: RecordId) {
        if self.filtering != FilteringState::Active || self.snapshot.contains(id) {
            return;
        }
        self.base.push(id);
        let change = self.snapshot.push(id);
        self.publish_collection(change);
    }

    /// A record disappeared from the store.
    pub fn record_removed(&mut self, id: RecordId) {
        self.base.retain(|r| *r != id);
        if let Some(change) = self.snapshot.remove(id) {
            self.publish_collection(change);
        }
    }

    /// A record was superseded by another.
    pub fn record_replaced(&mut self, old: RecordId, new: RecordId) {
        for r in self.base.iter_mut().filter(|r| **r == old) {
            *r = new;
        }
        if let Some(change) = self.snapshot.replace(old, new) {
            self.publish_collection(change);
        }
    }

    /// A record changed position in the visible order.
    pub fn record_moved(&mut self, id: RecordId, to: usize) {
        if let Some(change) = self.snapshot.move_item(id, to) {
            self.publish_collection(change);
        }
    }

    fn complete(&mut self, completion: Completion) {
        if completion.generation != self.generation {
            tracing::trace!(
                stale = completion.generation,
                current = self.generation,
                "dropping superseded evaluation"
            );
            return;
        }
        self.set_busy(false);

        let rows = match completion.outcome {
            Outcome::Rows(rows) => {
                self.last_error = None;
                rows
            }
            Outcome::Unsatisfiable => {
                self.last_error = None;
                Vec::new()
            }
            Outcome::Failed(error) => {
                tracing::warn!(%error, generation = completion.generation, "search evaluation failed");
                self.last_error = Some(error.clone());
                self.bus.publish(SessionEvent::Error(error));
                Vec::new()
            }
        };

        match completion.mode {
            SearchMode::Query => self.apply_query(rows),
            SearchMode::Filter => self.apply_filter(rows),
        }
    }

    fn apply_query(&mut self, rows: Vec<RecordId>) {
        self.base = rows.clone();
        let found = !rows.is_empty();
        let change = self.snapshot.replace_all(rows, CollectionAction::QueryResult);
        self.publish_collection(change);

        if found {
            self.set_filtering(FilteringState::Active);
            self.set_entry(SearchEntryState::QueryCompleteWithResults);
        } else {
            self.set_entry(SearchEntryState::QueryCompleteNoResults);
        }
    }

    fn apply_filter(&mut self, rows: Vec<RecordId>) {
        let matched: HashSet<RecordId> = rows.into_iter().collect();
        let kept: Vec<RecordId> = self
            .base
            .iter()
            .copied()
            .filter(|id| matched.contains(id))
            .collect();
        let dropped: Vec<RecordId> = self
            .snapshot
            .items()
            .iter()
            .copied()
            .filter(|id| !matched.contains(id))
            .collect();

        let found = !kept.is_empty();
        let mut change = self.snapshot.replace_all(kept, CollectionAction::ApplyFilter);
        change.old_items = Some(dropped);
        self.publish_collection(change);

        if found {
            self.set_entry(SearchEntryState::QueryCompleteWithResults);
        } else {
            self.set_entry(SearchEntryState::QueryCompleteNoResults);
        }
    }

    fn reset_results(&mut self) {
        if !self.committed_text.is_empty() {
            self.committed_text.clear();
        }
        self.base.clear();
        self.diagnostics.clear();
        self.last_error = None;
        if !self.snapshot.is_empty() {
            let change = self.snapshot.reset();
            self.publish_collection(change);
        }
    }

    fn set_filtering(&mut self, state: FilteringState) {
        if self.filtering != state {
            self.filtering = state;
            self.publish_property(PropertyChanged::FilteringState(state));
        }
    }

    fn set_entry(&mut self, state: SearchEntryState) {
        if self.entry != state {
            self.entry = state;
            self.publish_property(PropertyChanged::SearchEntryState(state));
        }
    }

    fn set_busy(&mut self, busy: bool) {
        if self.busy != busy {
            self.busy = busy;
            self.publish_property(PropertyChanged::Busy(busy));
        }
    }

    fn publish_property(&self, change: PropertyChanged) {
        self.bus.publish(SessionEvent::Property(change));
    }

    fn publish_collection(&self, change: CollectionChanged) {
        self.bus.publish(SessionEvent::Collection(change));
    }
}

impl std::fmt::Debug for FilterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterSession")
            .field("entity", &self.index.name())
            .field("input_text", &self.input_text)
            .field("committed_text", &self.committed_text)
            .field("filtering", &self.filtering)
            .field("entry", &self.entry)
            .field("busy", &self.busy)
            .field("results", &self.snapshot.len())
            .field("generation", &self.generation)
            .finish()
    }
}
