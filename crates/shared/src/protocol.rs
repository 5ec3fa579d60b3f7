use serde::{Deserialize, Serialize};

use crate::domain::{ItemId, ListId, ListKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Clause,
    Statement,
}

impl From<ListKind> for FragmentKind {
    fn from(value: ListKind) -> Self {
        match value {
            ListKind::Clauses => FragmentKind::Clause,
            ListKind::Statements => FragmentKind::Statement,
        }
    }
}

/// Request for the markup of one new list item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRequest {
    pub kind: FragmentKind,
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_index: Option<usize>,
    /// Selection made elsewhere in the form, e.g. the active policy type for
    /// a clause or the chosen base statement for a statement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,
}

impl FragmentRequest {
    /// Parameter pairs in the shape the fragment endpoints accept.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        match self.kind {
            FragmentKind::Clause => {
                pairs.push(("index", self.index.to_string()));
                if let Some(selection) = &self.selection {
                    pairs.push(("type", selection.clone()));
                }
            }
            FragmentKind::Statement => {
                if let Some(parent) = self.parent_index {
                    pairs.push(("clauseIndex", parent.to_string()));
                }
                pairs.push(("statementIndex", self.index.to_string()));
                if let Some(selection) = &self.selection {
                    pairs.push(("baseStatement", selection.clone()));
                }
            }
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub kind: FragmentKind,
    /// Index the fragment was rendered for.
    pub index: usize,
    pub markup: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ListEvent {
    ItemAppended {
        list_id: ListId,
        item_id: ItemId,
        index: usize,
    },
    ItemRemoved {
        list_id: ListId,
        item_id: ItemId,
        position: usize,
    },
    ItemReindexed {
        list_id: ListId,
        item_id: ItemId,
        old_index: usize,
        new_index: usize,
    },
    PlaceholderChanged {
        list_id: ListId,
        visible: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_request_carries_both_indices() {
        let request = FragmentRequest {
            kind: FragmentKind::Statement,
            index: 2,
            parent_index: Some(1),
            selection: Some("has_owner".into()),
        };
        assert_eq!(
            request.query_pairs(),
            vec![
                ("clauseIndex", "1".to_string()),
                ("statementIndex", "2".to_string()),
                ("baseStatement", "has_owner".to_string()),
            ]
        );
    }

    #[test]
    fn list_event_is_tagged() {
        let event = ListEvent::PlaceholderChanged {
            list_id: ListId::new(),
            visible: true,
        };
        let json = serde_json::to_value(&event).expect("json");
        assert_eq!(json["type"], "placeholder_changed");
        assert_eq!(json["payload"]["visible"], true);
    }
}
