use serde::{Deserialize, Serialize};
use shared::domain::FieldAttribute;

use crate::{
    codec::IdentifierCodec,
    error::{ListError, ListResult},
};

pub const INDEX_TOKEN: &str = "{index}";
pub const PARENT_TOKEN: &str = "{parent}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    Name,
    Id,
    /// A control's `id` together with its label's `for`.
    Paired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "binding", rename_all = "snake_case")]
pub enum FieldBinding {
    Single {
        attribute: FieldAttribute,
        value: String,
    },
    Paired {
        control_id: String,
        label_for: String,
    },
}

impl FieldBinding {
    pub fn name(value: impl Into<String>) -> Self {
        Self::Single {
            attribute: FieldAttribute::Name,
            value: value.into(),
        }
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::Single {
            attribute: FieldAttribute::Id,
            value: value.into(),
        }
    }

    pub fn paired(control_id: impl Into<String>, label_for: impl Into<String>) -> Self {
        Self::Paired {
            control_id: control_id.into(),
            label_for: label_for.into(),
        }
    }

    /// Every attribute value carried by the binding, as `(attribute, value)`.
    pub fn attributes(&self) -> Vec<(FieldAttribute, &str)> {
        match self {
            FieldBinding::Single { attribute, value } => vec![(*attribute, value.as_str())],
            FieldBinding::Paired {
                control_id,
                label_for,
            } => vec![
                (FieldAttribute::Id, control_id.as_str()),
                (FieldAttribute::LabelFor, label_for.as_str()),
            ],
        }
    }

    fn primary(&self) -> &str {
        match self {
            FieldBinding::Single { value, .. } => value,
            FieldBinding::Paired { control_id, .. } => control_id,
        }
    }

    fn map(&self, mut f: impl FnMut(&str) -> ListResult<String>) -> ListResult<Self> {
        Ok(match self {
            FieldBinding::Single { attribute, value } => FieldBinding::Single {
                attribute: *attribute,
                value: f(value)?,
            },
            FieldBinding::Paired {
                control_id,
                label_for,
            } => FieldBinding::Paired {
                control_id: f(control_id)?,
                label_for: f(label_for)?,
            },
        })
    }
}

/// Template for one indexed field of a list item, e.g.
/// `clauses[{parent}].statements[{index}].negated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPattern {
    kind: BindingKind,
    template: String,
    codec: IdentifierCodec,
    parent_codec: Option<IdentifierCodec>,
}

impl FieldPattern {
    pub fn parse(kind: BindingKind, template: impl Into<String>) -> ListResult<Self> {
        let template = template.into();
        let codec = IdentifierCodec::infer(&template, INDEX_TOKEN)?;
        let parent_codec = if template.contains(PARENT_TOKEN) {
            Some(IdentifierCodec::infer(&template, PARENT_TOKEN)?)
        } else {
            None
        };
        let pattern = Self {
            kind,
            template,
            codec,
            parent_codec,
        };

        // Distinct sample values catch templates whose slots cannot be told apart.
        let sample = pattern.render(3, Some(7))?;
        let own = pattern.codec.decode(&sample)?;
        let parent = match &pattern.parent_codec {
            Some(codec) => Some(codec.decode(&sample)?),
            None => None,
        };
        if own != 3 || parent.is_some_and(|p| p != 7) {
            return Err(ListError::malformed(
                pattern.template,
                "index and parent slots are ambiguous",
            ));
        }
        Ok(pattern)
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn is_nested(&self) -> bool {
        self.parent_codec.is_some()
    }

    pub fn instantiate(&self, index: usize, parent_index: Option<usize>) -> ListResult<FieldRef> {
        let identifier = self.render(index, parent_index)?;
        let binding = match self.kind {
            BindingKind::Name => FieldBinding::name(identifier),
            BindingKind::Id => FieldBinding::id(identifier),
            BindingKind::Paired => FieldBinding::paired(identifier.clone(), identifier),
        };
        Ok(FieldRef {
            binding,
            codec: self.codec.clone(),
            parent_codec: self.parent_codec.clone(),
            current_index: index,
            current_parent: parent_index.filter(|_| self.is_nested()),
        })
    }

    fn render(&self, index: usize, parent_index: Option<usize>) -> ListResult<String> {
        let rendered = self.template.replace(INDEX_TOKEN, &index.to_string());
        if !self.is_nested() {
            return Ok(rendered);
        }
        let parent = parent_index.ok_or_else(|| {
            ListError::Validation(format!(
                "field template '{}' needs a parent index",
                self.template
            ))
        })?;
        Ok(rendered.replace(PARENT_TOKEN, &parent.to_string()))
    }
}

/// One index-bearing attribute (or label/control pair) of a list item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    binding: FieldBinding,
    codec: IdentifierCodec,
    parent_codec: Option<IdentifierCodec>,
    current_index: usize,
    current_parent: Option<usize>,
}

impl FieldRef {
    /// Adopts identifiers that were rendered elsewhere (server markup).
    pub fn parse(
        binding: FieldBinding,
        codec: IdentifierCodec,
        parent_codec: Option<IdentifierCodec>,
    ) -> ListResult<Self> {
        let current_index = decode_agreeing(&binding, &codec)?;
        let current_parent = match &parent_codec {
            Some(parent) => Some(decode_agreeing(&binding, parent)?),
            None => None,
        };
        Ok(Self {
            binding,
            codec,
            parent_codec,
            current_index,
            current_parent,
        })
    }

    pub fn binding(&self) -> &FieldBinding {
        &self.binding
    }

    pub fn identifier(&self) -> &str {
        self.binding.primary()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn parent_index(&self) -> Option<usize> {
        self.current_parent
    }

    /// Rewrites the own-index slot. Returns `false` when already at
    /// `new_index`. Paired identifiers are committed together or not at all.
    pub fn reindex(&mut self, new_index: usize) -> ListResult<bool> {
        if new_index == self.current_index {
            return Ok(false);
        }
        let old = self.current_index;
        let codec = &self.codec;
        let binding = self
            .binding
            .map(|identifier| codec.rewrite(identifier, old, new_index))?;
        self.binding = binding;
        self.current_index = new_index;
        Ok(true)
    }

    /// Rewrites only the enclosing item's slot; a no-op for fields that do
    /// not encode a parent.
    pub fn reindex_parent(&mut self, new_parent: usize) -> ListResult<bool> {
        let (Some(codec), Some(old)) = (&self.parent_codec, self.current_parent) else {
            return Ok(false);
        };
        if old == new_parent {
            return Ok(false);
        }
        let binding = self
            .binding
            .map(|identifier| codec.rewrite(identifier, old, new_parent))?;
        self.binding = binding;
        self.current_parent = Some(new_parent);
        Ok(true)
    }
}

fn decode_agreeing(binding: &FieldBinding, codec: &IdentifierCodec) -> ListResult<usize> {
    let mut decoded = None;
    for (_, identifier) in binding.attributes() {
        let index = codec.decode(identifier)?;
        match decoded {
            Some(existing) if existing != index => {
                return Err(ListError::malformed(
                    identifier,
                    format!("paired identifiers disagree ({existing} vs {index})"),
                ));
            }
            _ => decoded = Some(index),
        }
    }
    decoded.ok_or_else(|| ListError::malformed(binding.primary(), "binding has no identifiers"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paired_label_follows_control() {
        let mut field = FieldRef::parse(
            FieldBinding::paired("negated-2-input", "negated-2-input"),
            IdentifierCodec::hyphen_slot(3, 1),
            None,
        )
        .expect("parse");

        assert!(field.reindex(1).expect("reindex"));
        assert_eq!(
            field.binding(),
            &FieldBinding::paired("negated-1-input", "negated-1-input")
        );
    }

    #[test]
    fn paired_rewrite_is_all_or_nothing() {
        let mut field = FieldRef {
            binding: FieldBinding::paired("negated-2-input", "negated-2"),
            codec: IdentifierCodec::hyphen_slot(3, 1),
            parent_codec: None,
            current_index: 2,
            current_parent: None,
        };
        let before = field.clone();

        assert!(matches!(
            field.reindex(1),
            Err(ListError::MalformedIdentifier { .. })
        ));
        assert_eq!(field, before);
    }

    #[test]
    fn parse_rejects_disagreeing_pair() {
        let err = FieldRef::parse(
            FieldBinding::paired("negated-2-input", "negated-3-input"),
            IdentifierCodec::hyphen_slot(3, 1),
            None,
        )
        .expect_err("should fail");
        assert!(matches!(err, ListError::MalformedIdentifier { .. }));
    }

    #[test]
    fn reindex_to_current_is_noop() {
        let mut field = FieldRef::parse(
            FieldBinding::name("clauses[4].value"),
            IdentifierCodec::bracket("clauses"),
            None,
        )
        .expect("parse");
        let before = field.clone();
        assert!(!field.reindex(4).expect("reindex"));
        assert_eq!(field, before);
    }

    #[test]
    fn nested_pattern_keeps_slots_independent() {
        let pattern =
            FieldPattern::parse(BindingKind::Id, "statement-{parent}-{index}-x").expect("pattern");
        let mut field = pattern.instantiate(2, Some(3)).expect("field");
        assert_eq!(field.identifier(), "statement-3-2-x");

        field.reindex(1).expect("reindex");
        assert_eq!(field.identifier(), "statement-3-1-x");
        assert_eq!(field.parent_index(), Some(3));

        field.reindex_parent(2).expect("reindex parent");
        assert_eq!(field.identifier(), "statement-2-1-x");
        assert_eq!(field.current_index(), 1);
    }

    #[test]
    fn nested_pattern_requires_parent() {
        let pattern = FieldPattern::parse(
            BindingKind::Name,
            "clauses[{parent}].statements[{index}].negated",
        )
        .expect("pattern");
        assert!(matches!(
            pattern.instantiate(0, None),
            Err(ListError::Validation(_))
        ));
    }

    #[test]
    fn ambiguous_template_is_rejected() {
        assert!(FieldPattern::parse(BindingKind::Name, "items[{parent}].items[{index}]").is_err());
    }
}
