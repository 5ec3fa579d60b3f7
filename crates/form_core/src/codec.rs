//! Identifier codecs for the two index-embedding conventions seen in form
//! markup: bracket form (`clauses[3].value`) and hyphen-slot form
//! (`negated-3-input`).

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{ListError, ListResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum IdentifierCodec {
    Bracket(BracketCodec),
    HyphenSlot(HyphenSlotCodec),
}

impl IdentifierCodec {
    pub fn bracket(token: impl Into<String>) -> Self {
        Self::Bracket(BracketCodec::new(token))
    }

    pub fn hyphen_slot(slots: usize, index_slot: usize) -> Self {
        Self::HyphenSlot(HyphenSlotCodec::new(slots, index_slot))
    }

    pub fn decode(&self, identifier: &str) -> ListResult<usize> {
        match self {
            IdentifierCodec::Bracket(codec) => codec.decode(identifier),
            IdentifierCodec::HyphenSlot(codec) => codec.decode(identifier),
        }
    }

    /// Replaces the encoded index `old` with `new`. Fails without producing
    /// output if the identifier does not currently encode `old`.
    pub fn rewrite(&self, identifier: &str, old: usize, new: usize) -> ListResult<String> {
        let current = self.decode(identifier)?;
        if current != old {
            return Err(ListError::malformed(
                identifier,
                format!("expected index {old}, found {current}"),
            ));
        }
        if old == new {
            return Ok(identifier.to_string());
        }
        match self {
            IdentifierCodec::Bracket(codec) => codec.encode(identifier, new),
            IdentifierCodec::HyphenSlot(codec) => codec.encode(identifier, new),
        }
    }

    /// Derives the codec addressing `placeholder` inside `template`, e.g.
    /// `{index}` in `clauses[{index}].value` or in `negated-{index}-input`.
    pub fn infer(template: &str, placeholder: &str) -> ListResult<Self> {
        let occurrences: Vec<usize> = template
            .match_indices(placeholder)
            .map(|(pos, _)| pos)
            .collect();
        let [pos] = occurrences.as_slice() else {
            return Err(ListError::malformed(
                template,
                format!(
                    "expected exactly one {placeholder} token, found {}",
                    occurrences.len()
                ),
            ));
        };
        let pos = *pos;
        let before = &template[..pos];
        let after = &template[pos + placeholder.len()..];

        if let (Some(head), true) = (before.strip_suffix('['), after.starts_with(']')) {
            let token = head.rsplit(['.', ']']).next().unwrap_or_default();
            if token.is_empty() {
                return Err(ListError::malformed(
                    template,
                    "bracket index has no collection token",
                ));
            }
            return Ok(Self::bracket(token));
        }

        let parts: Vec<&str> = template.split('-').collect();
        if let Some(slot) = parts.iter().position(|part| *part == placeholder) {
            return Ok(Self::hyphen_slot(parts.len(), slot));
        }

        Err(ListError::malformed(
            template,
            format!("{placeholder} is neither a bracket index nor a whole hyphen slot"),
        ))
    }
}

/// `token[INDEX]`, where `token` starts the identifier or follows a `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BracketCodec {
    pub token: String,
}

impl BracketCodec {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn decode(&self, identifier: &str) -> ListResult<usize> {
        self.locate(identifier).map(|(_, index)| index)
    }

    fn encode(&self, identifier: &str, index: usize) -> ListResult<String> {
        let (digits, _) = self.locate(identifier)?;
        let mut out = String::with_capacity(identifier.len() + 2);
        out.push_str(&identifier[..digits.start]);
        out.push_str(&index.to_string());
        out.push_str(&identifier[digits.end..]);
        Ok(out)
    }

    fn locate(&self, identifier: &str) -> ListResult<(Range<usize>, usize)> {
        let needle = format!("{}[", self.token);
        let mut start = None;
        for (pos, _) in identifier.match_indices(&needle) {
            if pos > 0 && identifier.as_bytes()[pos - 1] != b'.' {
                continue;
            }
            if start.is_some() {
                return Err(ListError::malformed(
                    identifier,
                    format!("'{needle}' appears more than once"),
                ));
            }
            start = Some(pos + needle.len());
        }
        let start = start
            .ok_or_else(|| ListError::malformed(identifier, format!("no '{needle}' segment")))?;

        let len = identifier[start..]
            .find(']')
            .ok_or_else(|| ListError::malformed(identifier, "unterminated bracket index"))?;
        let digits = &identifier[start..start + len];
        let index = parse_index(identifier, digits)?;
        Ok((start..start + len, index))
    }
}

/// `a-b-c` with a fixed slot count, one slot holding the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HyphenSlotCodec {
    pub slots: usize,
    pub index_slot: usize,
}

impl HyphenSlotCodec {
    pub fn new(slots: usize, index_slot: usize) -> Self {
        Self { slots, index_slot }
    }

    pub fn decode(&self, identifier: &str) -> ListResult<usize> {
        let parts = self.split(identifier)?;
        parse_index(identifier, parts[self.index_slot])
    }

    fn encode(&self, identifier: &str, index: usize) -> ListResult<String> {
        let mut parts: Vec<String> = self
            .split(identifier)?
            .into_iter()
            .map(str::to_string)
            .collect();
        parts[self.index_slot] = index.to_string();
        Ok(parts.join("-"))
    }

    fn split<'a>(&self, identifier: &'a str) -> ListResult<Vec<&'a str>> {
        let parts: Vec<&str> = identifier.split('-').collect();
        if parts.len() != self.slots {
            return Err(ListError::malformed(
                identifier,
                format!("expected {} hyphen slots, found {}", self.slots, parts.len()),
            ));
        }
        if self.index_slot >= self.slots {
            return Err(ListError::malformed(
                identifier,
                format!("index slot {} outside {} slots", self.index_slot, self.slots),
            ));
        }
        Ok(parts)
    }
}

fn parse_index(identifier: &str, digits: &str) -> ListResult<usize> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ListError::malformed(
            identifier,
            format!("index '{digits}' is not a decimal number"),
        ));
    }
    digits
        .parse::<usize>()
        .map_err(|err| ListError::malformed(identifier, err.to_string()))
}
