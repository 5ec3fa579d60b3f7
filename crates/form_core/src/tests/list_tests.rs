use super::*;
use crate::field::{BindingKind, FieldBinding, FieldPattern};

fn clause_patterns() -> Vec<FieldPattern> {
    vec![
        FieldPattern::parse(BindingKind::Name, "clauses[{index}].negated").expect("pattern"),
        FieldPattern::parse(BindingKind::Paired, "negated-{index}-input").expect("pattern"),
    ]
}

fn statement_patterns() -> Vec<FieldPattern> {
    vec![
        FieldPattern::parse(
            BindingKind::Name,
            "clauses[{parent}].statements[{index}].baseStatementName",
        )
        .expect("pattern"),
        FieldPattern::parse(BindingKind::Paired, "negated-{parent}-{index}").expect("pattern"),
    ]
}

fn item(patterns: &[FieldPattern], index: usize, parent: Option<usize>) -> ListItem {
    let fields = patterns
        .iter()
        .map(|pattern| pattern.instantiate(index, parent).expect("field"))
        .collect();
    ListItem::new(index, fields)
}

fn clauses(count: usize) -> IndexedList {
    let patterns = clause_patterns();
    let mut list = IndexedList::new(ListKind::Clauses);
    for index in 0..count {
        list.push(item(&patterns, index, None));
    }
    list
}

fn names(list: &IndexedList) -> Vec<String> {
    list.items()
        .iter()
        .map(|item| item.fields()[0].identifier().to_string())
        .collect()
}

#[test]
fn mid_list_removal_shifts_only_later_items() {
    let mut list = clauses(5);
    let first_before = list.get(0).cloned().expect("first");
    let later_before: Vec<ListItem> = list.items()[2..].to_vec();

    let removal = list.remove_at(1).expect("remove");

    assert_eq!(removal.position, 1);
    assert_eq!(list.len(), 4);
    assert_eq!(list.get(0), Some(&first_before));
    assert_eq!(
        names(&list),
        vec![
            "clauses[0].negated",
            "clauses[1].negated",
            "clauses[2].negated",
            "clauses[3].negated",
        ]
    );
    for (after, before) in list.items()[1..].iter().zip(&later_before) {
        assert_eq!(after.id(), before.id());
        assert_eq!(after.index() + 1, before.index());
    }
    assert_eq!(removal.reindexed.len(), 3);
    assert!(removal.anomalies.is_empty());
    list.check_invariant().expect("invariant");
}

#[test]
fn removing_last_item_leaves_others_untouched() {
    let mut list = clauses(3);
    let before: Vec<ListItem> = list.items()[..2].to_vec();

    let removal = list.remove_at(2).expect("remove");

    assert!(removal.reindexed.is_empty());
    assert_eq!(list.items(), before.as_slice());
}

#[test]
fn out_of_range_removal_leaves_list_unchanged() {
    let mut list = clauses(2);
    let before = list.clone();

    let err = list.remove_at(2).expect_err("should fail");

    assert_eq!(err, ListError::OutOfRange { position: 2, len: 2 });
    assert_eq!(list, before);
}

#[test]
fn placeholder_tracks_emptiness() {
    let mut list = IndexedList::new(ListKind::Clauses);
    assert!(list.placeholder_visible());

    let insertion = list.push(item(&clause_patterns(), 0, None));
    assert_eq!(insertion.placeholder_changed, Some(false));
    assert!(!list.placeholder_visible());

    let insertion = list.push(item(&clause_patterns(), 1, None));
    assert_eq!(insertion.placeholder_changed, None);

    list.remove_at(0).expect("remove");
    assert!(!list.placeholder_visible());
    let removal = list.remove_at(0).expect("remove");
    assert_eq!(removal.placeholder_changed, Some(true));
    assert!(list.placeholder_visible());
}

#[test]
fn push_rebases_item_prepared_for_stale_index() {
    let mut list = clauses(2);

    let insertion = list.push(item(&clause_patterns(), 4, None));

    assert_eq!(insertion.index, 2);
    let pushed = list.get(2).expect("pushed");
    assert_eq!(pushed.fields()[0].identifier(), "clauses[2].negated");
    assert_eq!(
        pushed.fields()[1].binding(),
        &FieldBinding::paired("negated-2-input", "negated-2-input")
    );
    list.check_invariant().expect("invariant");
}

#[test]
fn malformed_field_is_reported_and_left_alone() {
    let mut list = clauses(2);
    let mut third = item(&clause_patterns(), 2, None);
    third.fields.push(corrupt_field("clauses[9]", 2));
    list.push(third);

    let removal = list.remove_at(0).expect("remove");

    assert_eq!(removal.anomalies.len(), 1);
    let anomaly = &removal.anomalies[0];
    assert_eq!(anomaly.identifier, "clauses[9]");
    assert!(matches!(
        anomaly.error,
        ListError::MalformedIdentifier { .. }
    ));
    let moved = list.get(1).expect("moved");
    assert_eq!(moved.index(), 1);
    assert_eq!(moved.fields()[0].identifier(), "clauses[1].negated");
    assert_eq!(moved.fields()[2].identifier(), "clauses[9]");
}

/// A field whose identifier no longer matches the index the model expects.
fn corrupt_field(identifier: &str, claimed_index: usize) -> FieldRef {
    let json = serde_json::json!({
        "binding": { "binding": "single", "attribute": "name", "value": identifier },
        "codec": { "form": "bracket", "token": "clauses" },
        "parent_codec": null,
        "current_index": claimed_index,
        "current_parent": null,
    });
    serde_json::from_value(json).expect("field")
}

#[test]
fn clause_removal_rewrites_parent_slot_of_nested_statements() {
    let patterns = clause_patterns();
    let mut list = IndexedList::new(ListKind::Clauses);
    for clause in 0..3 {
        let mut statements = IndexedList::new(ListKind::Statements);
        for statement in 0..2 {
            statements.push(item(&statement_patterns(), statement, Some(clause)));
        }
        list.push(item(&patterns, clause, None).with_nested(statements));
    }

    list.remove_at(0).expect("remove");

    let moved = list.get(1).expect("clause");
    let statements = moved.nested().expect("nested");
    let ids: Vec<&str> = statements
        .items()
        .iter()
        .map(|s| s.fields()[1].identifier())
        .collect();
    assert_eq!(ids, vec!["negated-1-0", "negated-1-1"]);
    assert_eq!(
        statements.items()[1].fields()[0].identifier(),
        "clauses[1].statements[1].baseStatementName"
    );
    list.check_invariant().expect("invariant");
}

#[test]
fn statement_removal_leaves_clause_slot_alone() {
    let mut statements = IndexedList::new(ListKind::Statements);
    for statement in 0..3 {
        statements.push(item(&statement_patterns(), statement, Some(3)));
    }
    let mut list = IndexedList::new(ListKind::Clauses);
    for clause in 0..4 {
        let clause_item = item(&clause_patterns(), clause, None);
        let clause_item = if clause == 3 {
            clause_item.with_nested(statements.clone())
        } else {
            clause_item.with_nested(IndexedList::new(ListKind::Statements))
        };
        list.push(clause_item);
    }

    list.nested_mut(3)
        .expect("nested")
        .remove_at(1)
        .expect("remove statement");

    let statements = list.get(3).and_then(ListItem::nested).expect("nested");
    let ids: Vec<&str> = statements
        .items()
        .iter()
        .map(|s| s.fields()[1].identifier())
        .collect();
    assert_eq!(ids, vec!["negated-3-0", "negated-3-1"]);
    list.check_invariant().expect("invariant");
}

#[test]
fn nested_access_validates_position() {
    let mut list = clauses(1);
    assert_eq!(
        list.nested_mut(3).expect_err("out of range"),
        ListError::OutOfRange { position: 3, len: 1 }
    );
    assert!(matches!(
        list.nested_mut(0).expect_err("no nested"),
        ListError::Validation(_)
    ));
}

#[test]
fn from_items_rejects_gaps() {
    let patterns = clause_patterns();
    let items = vec![item(&patterns, 0, None), item(&patterns, 2, None)];
    assert!(matches!(
        IndexedList::from_items(ListKind::Clauses, items),
        Err(ListError::Validation(_))
    ));

    let items = vec![item(&patterns, 0, None), item(&patterns, 1, None)];
    let list = IndexedList::from_items(ListKind::Clauses, items).expect("list");
    assert!(!list.placeholder_visible());
}
