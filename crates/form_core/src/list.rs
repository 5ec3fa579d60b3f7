use serde::{Deserialize, Serialize};
use shared::{
    domain::{ItemId, ListId, ListKind},
    protocol::Fragment,
};
use tracing::warn;

use crate::{
    error::{ListError, ListResult},
    field::FieldRef,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    id: ItemId,
    index: usize,
    fields: Vec<FieldRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fragment: Option<Fragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nested: Option<IndexedList>,
}

impl ListItem {
    pub fn new(index: usize, fields: Vec<FieldRef>) -> Self {
        Self {
            id: ItemId::new(),
            index,
            fields,
            fragment: None,
            nested: None,
        }
    }

    pub fn with_fragment(mut self, fragment: Fragment) -> Self {
        self.fragment = Some(fragment);
        self
    }

    pub fn with_nested(mut self, nested: IndexedList) -> Self {
        self.nested = Some(nested);
        self
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn fields(&self) -> &[FieldRef] {
        &self.fields
    }

    pub fn fragment(&self) -> Option<&Fragment> {
        self.fragment.as_ref()
    }

    pub fn nested(&self) -> Option<&IndexedList> {
        self.nested.as_ref()
    }

    fn set_index(&mut self, new_index: usize) -> Vec<FieldAnomaly> {
        let mut anomalies = Vec::new();
        for field in &mut self.fields {
            if let Err(error) = field.reindex(new_index) {
                anomalies.push(FieldAnomaly {
                    item_id: self.id,
                    identifier: field.identifier().to_string(),
                    error,
                });
            }
        }
        if let Some(nested) = &mut self.nested {
            anomalies.extend(nested.rebase_parent(new_index));
        }
        self.index = new_index;
        anomalies
    }
}

/// A field that could not be rewritten. The field keeps its old identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAnomaly {
    pub item_id: ItemId,
    pub identifier: String,
    pub error: ListError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reindexed {
    pub item_id: ItemId,
    pub old_index: usize,
    pub new_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub item_id: ItemId,
    pub index: usize,
    pub anomalies: Vec<FieldAnomaly>,
    /// New placeholder visibility when the append changed it.
    pub placeholder_changed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub removed: ListItem,
    pub position: usize,
    pub reindexed: Vec<Reindexed>,
    pub anomalies: Vec<FieldAnomaly>,
    pub placeholder_changed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedList {
    id: ListId,
    kind: ListKind,
    items: Vec<ListItem>,
    placeholder_visible: bool,
}

impl IndexedList {
    pub fn new(kind: ListKind) -> Self {
        Self {
            id: ListId::new(),
            kind,
            items: Vec::new(),
            placeholder_visible: true,
        }
    }

    /// Adopts items rendered by the server, rejecting them if their indices
    /// are not already contiguous from zero.
    pub fn from_items(kind: ListKind, items: Vec<ListItem>) -> ListResult<Self> {
        let list = Self {
            id: ListId::new(),
            kind,
            placeholder_visible: items.is_empty(),
            items,
        };
        list.check_invariant()?;
        Ok(list)
    }

    pub fn id(&self) -> ListId {
        self.id
    }

    pub fn kind(&self) -> ListKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ListItem] {
        &self.items
    }

    pub fn get(&self, position: usize) -> Option<&ListItem> {
        self.items.get(position)
    }

    pub fn position_of(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    pub fn placeholder_visible(&self) -> bool {
        self.placeholder_visible
    }

    pub fn nested(&self, position: usize) -> ListResult<&IndexedList> {
        let len = self.items.len();
        let item = self
            .items
            .get(position)
            .ok_or(ListError::OutOfRange { position, len })?;
        item.nested
            .as_ref()
            .ok_or_else(|| ListError::Validation(format!("item {position} has no nested list")))
    }

    pub fn nested_mut(&mut self, position: usize) -> ListResult<&mut IndexedList> {
        let len = self.items.len();
        let item = self
            .items
            .get_mut(position)
            .ok_or(ListError::OutOfRange { position, len })?;
        item.nested
            .as_mut()
            .ok_or_else(|| ListError::Validation(format!("item {position} has no nested list")))
    }

    /// Appends `item` at the end. The index is taken at insertion time, so an
    /// item prepared for a stale position is rebased before it lands.
    pub fn push(&mut self, mut item: ListItem) -> Insertion {
        let index = self.items.len();
        let mut anomalies = Vec::new();
        if item.index != index {
            warn!(
                list = %self.kind,
                prepared_index = item.index,
                index,
                "list: rebasing item prepared for a stale index"
            );
            anomalies = item.set_index(index);
        }
        self.log_anomalies(&anomalies);

        let item_id = item.id;
        self.items.push(item);
        let placeholder_changed = self.sync_placeholder();
        Insertion {
            item_id,
            index,
            anomalies,
            placeholder_changed,
        }
    }

    /// Removes the item at `position` and shifts every later item down by
    /// one. Earlier items are not touched.
    pub fn remove_at(&mut self, position: usize) -> ListResult<Removal> {
        let len = self.items.len();
        if position >= len {
            return Err(ListError::OutOfRange { position, len });
        }

        let removed = self.items.remove(position);
        let mut reindexed = Vec::new();
        let mut anomalies = Vec::new();
        for new_index in position..self.items.len() {
            let old_index = self.items[new_index].index;
            debug_assert_eq!(old_index, new_index + 1);
            anomalies.extend(self.reindex_item(new_index, new_index)?);
            reindexed.push(Reindexed {
                item_id: self.items[new_index].id,
                old_index,
                new_index,
            });
        }
        self.log_anomalies(&anomalies);

        let placeholder_changed = self.sync_placeholder();
        Ok(Removal {
            removed,
            position,
            reindexed,
            anomalies,
            placeholder_changed,
        })
    }

    /// Sets the index of the item at `position`, rewriting its fields and the
    /// parent slot of its nested list.
    pub(crate) fn reindex_item(
        &mut self,
        position: usize,
        new_index: usize,
    ) -> ListResult<Vec<FieldAnomaly>> {
        let len = self.items.len();
        let item = self
            .items
            .get_mut(position)
            .ok_or(ListError::OutOfRange { position, len })?;
        Ok(item.set_index(new_index))
    }

    /// Rewrites the enclosing item's slot in every field of this list.
    pub fn rebase_parent(&mut self, new_parent: usize) -> Vec<FieldAnomaly> {
        let mut anomalies = Vec::new();
        for item in &mut self.items {
            for field in &mut item.fields {
                if let Err(error) = field.reindex_parent(new_parent) {
                    anomalies.push(FieldAnomaly {
                        item_id: item.id,
                        identifier: field.identifier().to_string(),
                        error,
                    });
                }
            }
        }
        anomalies
    }

    pub fn check_invariant(&self) -> ListResult<()> {
        for (position, item) in self.items.iter().enumerate() {
            if item.index != position {
                return Err(ListError::Validation(format!(
                    "{} item at position {position} carries index {}",
                    self.kind, item.index
                )));
            }
            if let Some(field) = item
                .fields
                .iter()
                .find(|field| field.current_index() != position)
            {
                return Err(ListError::Validation(format!(
                    "field '{}' at position {position} encodes index {}",
                    field.identifier(),
                    field.current_index()
                )));
            }
            if let Some(nested) = &item.nested {
                nested.check_invariant()?;
                let stray = nested
                    .items
                    .iter()
                    .flat_map(|child| child.fields.iter())
                    .find(|field| field.parent_index().is_some_and(|p| p != position));
                if let Some(field) = stray {
                    return Err(ListError::Validation(format!(
                        "nested field '{}' does not encode parent {position}",
                        field.identifier()
                    )));
                }
            }
        }
        Ok(())
    }

    fn sync_placeholder(&mut self) -> Option<bool> {
        let visible = self.items.is_empty();
        if visible == self.placeholder_visible {
            return None;
        }
        self.placeholder_visible = visible;
        Some(visible)
    }

    fn log_anomalies(&self, anomalies: &[FieldAnomaly]) {
        for anomaly in anomalies {
            warn!(
                list = %self.kind,
                item_id = %anomaly.item_id,
                identifier = %anomaly.identifier,
                error = %anomaly.error,
                "list: field left unmodified"
            );
        }
    }
}

#[cfg(test)]
#[path = "tests/list_tests.rs"]
mod tests;
