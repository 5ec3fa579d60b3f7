//! Replays a scripted editing session against a policy form and projects the
//! resulting field identifiers.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use form_core::{
    AppendContext, BindingKind, DynamicOptions, FieldBinding, FieldPattern, FragmentSink,
    FragmentSource, IdentifierCodec, IndexedList, IndexedListController, ListError, ListItem,
    ListSchema,
};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{ItemId, ListId, ListKind},
    error::ApiError,
    protocol::{Fragment, FragmentRequest},
};
use tracing::{debug, info, warn};

use crate::config::Settings;

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub form: InitialForm,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitialForm {
    /// Statements under each clause already on the page.
    #[serde(default)]
    pub initial: Vec<usize>,
    pub policy_type: Option<String>,
    #[serde(default)]
    pub base_statements: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    pub clause_fields: Vec<FieldTemplate>,
    pub statement_fields: Vec<FieldTemplate>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            clause_fields: vec![
                FieldTemplate::new(BindingKind::Name, "clauses[{index}].negated"),
                FieldTemplate::new(BindingKind::Paired, "negated-{index}-clause"),
            ],
            statement_fields: vec![
                FieldTemplate::new(
                    BindingKind::Name,
                    "clauses[{parent}].statements[{index}].baseStatementName",
                ),
                FieldTemplate::new(
                    BindingKind::Name,
                    "clauses[{parent}].statements[{index}].negated",
                ),
                FieldTemplate::new(BindingKind::Paired, "negated-{parent}-{index}"),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldTemplate {
    pub binding: BindingKind,
    pub template: String,
}

impl FieldTemplate {
    fn new(binding: BindingKind, template: &str) -> Self {
        Self {
            binding,
            template: template.into(),
        }
    }
}

impl SchemaConfig {
    pub fn build(&self) -> Result<ListSchema> {
        let parse = |templates: &[FieldTemplate]| -> Result<Vec<FieldPattern>> {
            templates
                .iter()
                .map(|field| {
                    FieldPattern::parse(field.binding, field.template.clone())
                        .with_context(|| format!("bad field template '{}'", field.template))
                })
                .collect()
        };
        Ok(ListSchema::new(ListKind::Clauses, parse(&self.clause_fields)?)
            .with_nested(ListSchema::new(
                ListKind::Statements,
                parse(&self.statement_fields)?,
            )))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    AddClause,
    DeleteClause {
        clause: usize,
    },
    AddStatement {
        clause: usize,
        base_statement: Option<String>,
    },
    DeleteStatement {
        clause: usize,
        statement: usize,
    },
    /// Types a new base statement into the picker and selects it.
    AddBaseStatement {
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormProjection {
    pub clauses_placeholder_visible: bool,
    pub clauses: Vec<ClauseView>,
    pub anomalies: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClauseView {
    pub index: usize,
    pub fields: Vec<String>,
    pub statements: Vec<StatementView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementView {
    pub index: usize,
    pub fields: Vec<String>,
}

/// Produces placeholder markup; the real application renders these on the
/// server.
pub struct CannedSource;

#[async_trait]
impl FragmentSource for CannedSource {
    async fn fetch_fragment(&self, request: FragmentRequest) -> Result<Fragment> {
        let params = request
            .query_pairs()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        Ok(Fragment {
            kind: request.kind,
            index: request.index,
            markup: format!("<!-- fragment {:?} {params} -->", request.kind),
        })
    }
}

pub struct LoggingSink;

impl FragmentSink for LoggingSink {
    fn render_fragment(&self, list_id: ListId, item: &ListItem) -> Result<()> {
        debug!(list_id = %list_id, item_id = %item.id(), index = item.index(), "view: render fragment");
        Ok(())
    }

    fn remove_fragment(&self, list_id: ListId, item_id: ItemId) -> Result<()> {
        debug!(list_id = %list_id, item_id = %item_id, "view: remove fragment");
        Ok(())
    }

    fn refresh_widgets(&self) {
        debug!("view: refresh widgets");
    }
}

pub async fn run_script(script: &Script, settings: &Settings) -> Result<FormProjection> {
    let schema = script.schema.build()?;
    let list = schema
        .prepopulate(&script.form.initial, None)
        .context("failed to build initial form")?;
    let controller = IndexedListController::with_list(
        schema,
        settings.controller_settings(),
        Arc::new(LoggingSink),
        list,
    )?;
    let mut base_statements = DynamicOptions::new(script.form.base_statements.clone());
    let mut anomalies = 0;

    for (number, step) in script.steps.iter().enumerate() {
        info!(step = number, ?step, "script: applying step");
        match step {
            Step::AddClause => {
                let context = AppendContext {
                    selection: script.form.policy_type.clone(),
                };
                controller
                    .append(&CannedSource, context)
                    .await
                    .with_context(|| format!("step {number}: add clause"))?;
            }
            Step::DeleteClause { clause } => {
                let removal = controller
                    .remove_at(*clause)
                    .await
                    .with_context(|| format!("step {number}: delete clause {clause}"))?;
                anomalies += removal.anomalies.len();
            }
            Step::AddStatement {
                clause,
                base_statement,
            } => {
                let selection = base_statement
                    .clone()
                    .or_else(|| base_statements.selected().map(str::to_string));
                let Some(selection) = selection else {
                    bail!("step {number}: no base statement selected for clause {clause}");
                };
                controller
                    .append_nested(*clause, &CannedSource, AppendContext::with_selection(selection))
                    .await
                    .with_context(|| format!("step {number}: add statement to clause {clause}"))?;
            }
            Step::DeleteStatement { clause, statement } => {
                let removal = controller
                    .remove_nested_at(*clause, *statement)
                    .await
                    .with_context(|| {
                        format!("step {number}: delete statement {statement} of clause {clause}")
                    })?;
                anomalies += removal.anomalies.len();
            }
            Step::AddBaseStatement { text } => {
                base_statements
                    .add_option(text)
                    .with_context(|| format!("step {number}: add base statement"))?;
            }
        }
    }

    let list = controller.snapshot().await;
    if let Err(err) = list.check_invariant() {
        warn!("script: final form is inconsistent: {err}");
    }
    Ok(project(&list, anomalies))
}

fn project(list: &IndexedList, anomalies: usize) -> FormProjection {
    let clauses = list
        .items()
        .iter()
        .map(|clause| ClauseView {
            index: clause.index(),
            fields: identifiers(clause),
            statements: clause
                .nested()
                .map(|statements| {
                    statements
                        .items()
                        .iter()
                        .map(|statement| StatementView {
                            index: statement.index(),
                            fields: identifiers(statement),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect();
    FormProjection {
        clauses_placeholder_visible: list.placeholder_visible(),
        clauses,
        anomalies,
    }
}

fn identifiers(item: &ListItem) -> Vec<String> {
    item.fields()
        .iter()
        .flat_map(|field| match field.binding() {
            FieldBinding::Single { value, .. } => vec![value.clone()],
            FieldBinding::Paired {
                control_id,
                label_for,
            } => vec![format!("id={control_id}"), format!("for={label_for}")],
        })
        .collect()
}

/// Structured form of a failure caused by the list itself, carrying the
/// full context chain as its message.
pub fn api_error(err: &anyhow::Error) -> Option<ApiError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ListError>())
        .map(|cause| ApiError::new(cause.code(), format!("{err:#}")))
}

/// Parses `bracket:<token>` or `hyphen:<slots>:<index-slot>`.
pub fn parse_codec(raw: &str) -> Result<IdentifierCodec> {
    let mut parts = raw.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("bracket"), Some(token), None, None) if !token.is_empty() => {
            Ok(IdentifierCodec::bracket(token))
        }
        (Some("hyphen"), Some(slots), Some(slot), None) => {
            let slots: usize = slots.parse().context("hyphen slot count")?;
            let slot: usize = slot.parse().context("hyphen index slot")?;
            if slot >= slots {
                bail!("index slot {slot} outside {slots} slots");
            }
            Ok(IdentifierCodec::hyphen_slot(slots, slot))
        }
        _ => bail!("unrecognized codec '{raw}', expected bracket:<token> or hyphen:<slots>:<slot>"),
    }
}

#[cfg(test)]
#[path = "tests/script_tests.rs"]
mod tests;
