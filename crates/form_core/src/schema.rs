use shared::domain::ListKind;

use crate::{
    error::ListResult,
    field::{FieldPattern, FieldRef},
    list::{IndexedList, ListItem},
};

/// Shape of the items a list holds: which indexed fields each item carries
/// and, for clause-like items, the shape of the list nested inside them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSchema {
    pub kind: ListKind,
    pub fields: Vec<FieldPattern>,
    pub nested: Option<Box<ListSchema>>,
}

impl ListSchema {
    pub fn new(kind: ListKind, fields: Vec<FieldPattern>) -> Self {
        Self {
            kind,
            fields,
            nested: None,
        }
    }

    pub fn with_nested(mut self, nested: ListSchema) -> Self {
        self.nested = Some(Box::new(nested));
        self
    }

    pub fn instantiate(&self, index: usize, parent_index: Option<usize>) -> ListResult<Vec<FieldRef>> {
        self.fields
            .iter()
            .map(|pattern| pattern.instantiate(index, parent_index))
            .collect()
    }

    /// Builds a fresh item at `index`, with an empty nested list when the
    /// schema has one.
    pub fn new_item(&self, index: usize, parent_index: Option<usize>) -> ListResult<ListItem> {
        let item = ListItem::new(index, self.instantiate(index, parent_index)?);
        Ok(match &self.nested {
            Some(nested) => item.with_nested(IndexedList::new(nested.kind)),
            None => item,
        })
    }

    /// Builds a list as the server would have rendered it: `counts[i]` nested
    /// items under item `i`. Counts beyond the nested level are ignored.
    pub fn prepopulate(&self, counts: &[usize], parent_index: Option<usize>) -> ListResult<IndexedList> {
        let mut items = Vec::with_capacity(counts.len());
        for (index, nested_count) in counts.iter().enumerate() {
            let mut item = ListItem::new(index, self.instantiate(index, parent_index)?);
            if let Some(nested) = &self.nested {
                let children = vec![0; *nested_count];
                item = item.with_nested(nested.prepopulate(&children, Some(index))?);
            }
            items.push(item);
        }
        IndexedList::from_items(self.kind, items)
    }
}
