//! Option list for selects that let the user type in new entries.

use serde::{Deserialize, Serialize};

use crate::error::{ListError, ListResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entry", content = "text", rename_all = "snake_case")]
pub enum SelectEntry {
    Option(String),
    Divider,
    AddItem,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicOptions {
    options: Vec<String>,
    selected: Option<usize>,
}

impl DynamicOptions {
    /// Like a plain `<select>`, the first option starts out selected.
    pub fn new(options: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let options: Vec<String> = options.into_iter().map(Into::into).collect();
        let selected = (!options.is_empty()).then_some(0);
        Self { options, selected }
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected
            .and_then(|position| self.options.get(position))
            .map(String::as_str)
    }

    /// Adds user-typed text as a new option and selects it. `|` is not
    /// allowed in option values and is dropped; other text, surrounding
    /// whitespace included, is kept as typed.
    pub fn add_option(&mut self, raw: &str) -> ListResult<usize> {
        let text: String = raw.chars().filter(|c| *c != '|').collect();
        if text.trim().is_empty() {
            return Err(ListError::Validation("option text is blank".into()));
        }
        self.options.push(text);
        let position = self.options.len() - 1;
        self.selected = Some(position);
        Ok(position)
    }

    /// Options followed by the divider and add-item sentinels.
    pub fn entries(&self) -> Vec<SelectEntry> {
        self.options
            .iter()
            .cloned()
            .map(SelectEntry::Option)
            .chain([SelectEntry::Divider, SelectEntry::AddItem])
            .collect()
    }
}
