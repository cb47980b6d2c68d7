//! Change notifications published by a filter session.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::engine::RecordId;
use crate::error::StoreError;
use crate::session::{FilteringState, SearchEntryState};

/// What happened to the visible result collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CollectionAction {
    Add,
    Remove,
    Replace,
    Move,
    Reset,
    /// The whole set was replaced by a fresh Query-mode search.
    QueryResult,
    /// The set was narrowed by a Filter-mode refinement.
    ApplyFilter,
}

/// A collection change with the affected items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionChanged {
    pub action: CollectionAction,
    pub new_items: Option<Vec<RecordId>>,
    pub old_items: Option<Vec<RecordId>>,
    /// Position of the change, for single-item actions.
    pub index: Option<usize>,
    /// Previous position, for `Move`.
    pub old_index: Option<usize>,
}

impl CollectionChanged {
    pub fn new(action: CollectionAction) -> Self {
        Self {
            action,
            new_items: None,
            old_items: None,
            index: None,
            old_index: None,
        }
    }

    pub fn with_new(mut self, items: Vec<RecordId>) -> Self {
        self.new_items = Some(items);
        self
    }

    pub fn with_old(mut self, items: Vec<RecordId>) -> Self {
        self.old_items = Some(items);
        self
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn from_index(mut self, old_index: usize) -> Self {
        self.old_index = Some(old_index);
        self
    }
}

/// An observable session property and its new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PropertyChanged {
    InputText(String),
    FilteringState(FilteringState),
    SearchEntryState(SearchEntryState),
    Busy(bool),
}

/// Everything a session publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Collection(CollectionChanged),
    Property(PropertyChanged),
    /// A store failure during evaluation; the session stays usable.
    Error(StoreError),
}

/// Broadcast fan-out to session observers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }
}
