//! Ordered result set with change descriptions.
//!
//! Each mutation returns the [`CollectionChanged`] describing it, so the
//! owner can publish exactly what happened.

use crate::engine::RecordId;
use crate::events::{CollectionAction, CollectionChanged};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSnapshot {
    items: Vec<RecordId>,
}

impl ResultSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[RecordId] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.items.contains(&id)
    }

    pub fn position(&self, id: RecordId) -> Option<usize> {
        self.items.iter().position(|i| *i == id)
    }

    /// Append a record.
    pub fn push(&mut self, id: RecordId) -> CollectionChanged {
        self.items.push(id);
        CollectionChanged::new(CollectionAction::Add)
            .with_new(vec![id])
            .at(self.items.len() - 1)
    }

    /// Remove a record, if present.
    pub fn remove(&mut self, id: RecordId) -> Option<CollectionChanged> {
        let index = self.position(id)?;
        self.items.remove(index);
        Some(
            CollectionChanged::new(CollectionAction::Remove)
                .with_old(vec![id])
                .at(index),
        )
    }

    /// Swap `old` for `new` in place.
    pub fn replace(&mut self, old: RecordId, new: RecordId) -> Option<CollectionChanged> {
        let index = self.position(old)?;
        self.items[index] = new;
        Some(
            CollectionChanged::new(CollectionAction::Replace)
                .with_old(vec![old])
                .with_new(vec![new])
                .at(index),
        )
    }

    /// Move a record to `to`, clamped to the last position.
    pub fn move_item(&mut self, id: RecordId, to: usize) -> Option<CollectionChanged> {
        let from = self.position(id)?;
        let to = to.min(self.items.len() - 1);
        if from == to {
            return None;
        }
        let item = self.items.remove(from);
        self.items.insert(to, item);
        Some(
            CollectionChanged::new(CollectionAction::Move)
                .with_new(vec![id])
                .at(to)
                .from_index(from),
        )
    }

    /// Drop everything.
    pub fn reset(&mut self) -> CollectionChanged {
        let old = std::mem::take(&mut self.items);
        CollectionChanged::new(CollectionAction::Reset).with_old(old)
    }

    /// Replace the whole set, tagging the change with `action`.
    pub fn replace_all(&mut self, items: Vec<RecordId>, action: CollectionAction) -> CollectionChanged {
        let old = std::mem::replace(&mut self.items, items);
        CollectionChanged::new(action)
            .with_new(self.items.clone())
            .with_old(old)
    }
}
