//! Editable, array-backed lists of form fragments whose field names and ids
//! embed the item's position (`clauses[2].value`, `negated-2-input`).
//!
//! [`IndexedList`] is the model and keeps positions contiguous across
//! removals. [`IndexedListController`] wraps one list, fetches markup for new
//! items through a [`FragmentSource`], and reports every change to a
//! [`FragmentSink`] and to event subscribers.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{ItemId, ListId},
    protocol::{Fragment, FragmentRequest, ListEvent},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod codec;
pub mod error;
pub mod field;
pub mod list;
pub mod schema;
pub mod select;

pub use codec::IdentifierCodec;
pub use error::{ListError, ListResult};
pub use field::{BindingKind, FieldBinding, FieldPattern, FieldRef};
pub use list::{FieldAnomaly, IndexedList, Insertion, ListItem, Reindexed, Removal};
pub use schema::ListSchema;
pub use select::{DynamicOptions, SelectEntry};

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[async_trait]
pub trait FragmentSource: Send + Sync {
    async fn fetch_fragment(&self, request: FragmentRequest) -> Result<Fragment>;
}

pub struct MissingFragmentSource;

#[async_trait]
impl FragmentSource for MissingFragmentSource {
    async fn fetch_fragment(&self, request: FragmentRequest) -> Result<Fragment> {
        Err(anyhow!(
            "fragment source is unavailable for {:?} at index {}",
            request.kind,
            request.index
        ))
    }
}

/// Receives list changes so the host can update the live view.
pub trait FragmentSink: Send + Sync {
    fn render_fragment(&self, list_id: ListId, item: &ListItem) -> Result<()>;
    fn remove_fragment(&self, list_id: ListId, item_id: ItemId) -> Result<()>;
    /// Called once after every structural change, after the fragment calls.
    fn refresh_widgets(&self) {}
}

pub struct NoopSink;

impl FragmentSink for NoopSink {
    fn render_fragment(&self, _list_id: ListId, _item: &ListItem) -> Result<()> {
        Ok(())
    }

    fn remove_fragment(&self, _list_id: ListId, _item_id: ItemId) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub fetch_timeout: Duration,
    pub max_items: Option<usize>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_items: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendContext {
    /// Selection elsewhere in the form the new fragment depends on.
    pub selection: Option<String>,
}

impl AppendContext {
    pub fn with_selection(selection: impl Into<String>) -> Self {
        Self {
            selection: Some(selection.into()),
        }
    }
}

/// `None` addresses the top-level list, `Some(id)` the list nested in item `id`.
type ListSlot = Option<ItemId>;

struct ControllerState {
    list: IndexedList,
}

impl ControllerState {
    fn parent_position(&self, parent: ItemId) -> ListResult<usize> {
        self.list.position_of(parent).ok_or_else(|| {
            ListError::Validation(format!("parent item {parent} is no longer in the list"))
        })
    }

    fn target(&self, slot: ListSlot) -> ListResult<(&IndexedList, Option<usize>)> {
        match slot {
            None => Ok((&self.list, None)),
            Some(parent) => {
                let position = self.parent_position(parent)?;
                Ok((self.list.nested(position)?, Some(position)))
            }
        }
    }

    fn target_mut(&mut self, slot: ListSlot) -> ListResult<(&mut IndexedList, Option<usize>)> {
        match slot {
            None => Ok((&mut self.list, None)),
            Some(parent) => {
                let position = self.parent_position(parent)?;
                Ok((self.list.nested_mut(position)?, Some(position)))
            }
        }
    }

    fn slot_for(&self, parent_position: usize) -> ListResult<ListSlot> {
        let parent = self.list.get(parent_position).ok_or(ListError::OutOfRange {
            position: parent_position,
            len: self.list.len(),
        })?;
        if parent.nested().is_none() {
            return Err(ListError::Validation(format!(
                "item {parent_position} has no nested list"
            )));
        }
        Ok(Some(parent.id()))
    }
}

type PendingSlots = StdMutex<HashSet<ListSlot>>;

fn lock_pending(pending: &PendingSlots) -> MutexGuard<'_, HashSet<ListSlot>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a list as having a fetch in flight. The mark is cleared on drop, so
/// an append future that is cancelled mid-fetch does not leave the list busy.
struct PendingFetch<'a> {
    pending: &'a PendingSlots,
    slot: ListSlot,
}

impl<'a> PendingFetch<'a> {
    fn begin(pending: &'a PendingSlots, slot: ListSlot) -> ListResult<Self> {
        if !lock_pending(pending).insert(slot) {
            return Err(ListError::Busy);
        }
        Ok(Self { pending, slot })
    }
}

impl Drop for PendingFetch<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).remove(&self.slot);
    }
}

/// Owns one indexed list and serializes its structural changes.
///
/// A fetch in flight blocks further appends and removals on the same list
/// (they fail with [`ListError::Busy`]). Lists nested in different items are
/// independent of each other and of the top-level list.
pub struct IndexedListController {
    schema: ListSchema,
    settings: ControllerSettings,
    sink: Arc<dyn FragmentSink>,
    state: Mutex<ControllerState>,
    pending: PendingSlots,
    events: broadcast::Sender<ListEvent>,
}

impl IndexedListController {
    pub fn new(schema: ListSchema, settings: ControllerSettings, sink: Arc<dyn FragmentSink>) -> Self {
        let list = IndexedList::new(schema.kind);
        Self::from_parts(schema, settings, sink, list)
    }

    /// Takes over a list that was already rendered.
    pub fn with_list(
        schema: ListSchema,
        settings: ControllerSettings,
        sink: Arc<dyn FragmentSink>,
        list: IndexedList,
    ) -> ListResult<Self> {
        if list.kind() != schema.kind {
            return Err(ListError::Validation(format!(
                "schema is for {} but list holds {}",
                schema.kind,
                list.kind()
            )));
        }
        list.check_invariant()?;
        Ok(Self::from_parts(schema, settings, sink, list))
    }

    fn from_parts(
        schema: ListSchema,
        settings: ControllerSettings,
        sink: Arc<dyn FragmentSink>,
        list: IndexedList,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            schema,
            settings,
            sink,
            state: Mutex::new(ControllerState { list }),
            pending: StdMutex::new(HashSet::new()),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ListEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> IndexedList {
        self.state.lock().await.list.clone()
    }

    pub async fn list_id(&self) -> ListId {
        self.state.lock().await.list.id()
    }

    pub async fn append(
        &self,
        source: &dyn FragmentSource,
        context: AppendContext,
    ) -> ListResult<ItemId> {
        self.append_into(None, source, context).await
    }

    /// Appends to the list nested in the item at `parent_position`.
    pub async fn append_nested(
        &self,
        parent_position: usize,
        source: &dyn FragmentSource,
        context: AppendContext,
    ) -> ListResult<ItemId> {
        let slot = self.state.lock().await.slot_for(parent_position)?;
        self.append_into(slot, source, context).await
    }

    pub async fn remove_at(&self, position: usize) -> ListResult<Removal> {
        let mut state = self.state.lock().await;
        self.remove_locked(&mut state, None, position)
    }

    /// Removes from the list nested in the item at `parent_position`. Only the
    /// own-index slot of later nested items changes.
    pub async fn remove_nested_at(
        &self,
        parent_position: usize,
        position: usize,
    ) -> ListResult<Removal> {
        let mut state = self.state.lock().await;
        let slot = state.slot_for(parent_position)?;
        self.remove_locked(&mut state, slot, position)
    }

    fn schema_at(&self, slot: ListSlot) -> ListResult<&ListSchema> {
        match slot {
            None => Ok(&self.schema),
            Some(_) => self
                .schema
                .nested
                .as_deref()
                .ok_or_else(|| ListError::Validation("schema has no nested list".into())),
        }
    }

    async fn append_into(
        &self,
        slot: ListSlot,
        source: &dyn FragmentSource,
        context: AppendContext,
    ) -> ListResult<ItemId> {
        let schema = self.schema_at(slot)?;
        let (request, pending) = {
            let state = self.state.lock().await;
            let pending = PendingFetch::begin(&self.pending, slot)?;
            let (target, parent_index) = state.target(slot)?;
            let index = target.len();
            if let Some(max) = self.settings.max_items {
                if index >= max {
                    return Err(ListError::Capacity { max });
                }
            }
            let request = FragmentRequest {
                kind: schema.kind.into(),
                index,
                parent_index,
                selection: context.selection,
            };
            (request, pending)
        };

        debug!(
            kind = ?request.kind,
            index = request.index,
            parent_index = ?request.parent_index,
            "list: fetching fragment"
        );
        let fetched = tokio::time::timeout(
            self.settings.fetch_timeout,
            source.fetch_fragment(request.clone()),
        )
        .await;

        let mut state = self.state.lock().await;
        drop(pending);
        let fragment = match fetched {
            Ok(Ok(fragment)) => fragment,
            Ok(Err(err)) => {
                warn!(kind = ?request.kind, index = request.index, "list: fragment fetch failed: {err:#}");
                return Err(ListError::FetchFailed(format!("{err:#}")));
            }
            Err(_) => {
                warn!(
                    kind = ?request.kind,
                    index = request.index,
                    timeout_ms = self.settings.fetch_timeout.as_millis() as u64,
                    "list: fragment fetch timed out"
                );
                return Err(ListError::FetchFailed(format!(
                    "timed out after {:?}",
                    self.settings.fetch_timeout
                )));
            }
        };

        // The index is taken again now; the target may have moved while the
        // fetch was in flight.
        let (target, parent_index) = state.target_mut(slot)?;
        let index = target.len();
        if index != request.index || parent_index != request.parent_index {
            info!(
                requested_index = request.index,
                index,
                requested_parent = ?request.parent_index,
                parent_index = ?parent_index,
                "list: target moved while fragment was in flight"
            );
        }
        let item = schema.new_item(index, parent_index)?.with_fragment(fragment);
        let insertion = target.push(item);
        let list_id = target.id();

        let rendered = match target.get(insertion.index) {
            Some(item) => self.sink.render_fragment(list_id, item),
            None => Ok(()),
        };
        if let Err(err) = rendered {
            // Removing the last item shifts nothing, so this restores the list.
            target.remove_at(insertion.index)?;
            warn!(list_id = %list_id, index, "list: fragment render failed: {err:#}");
            return Err(ListError::RenderFailed(format!("{err:#}")));
        }
        self.sink.refresh_widgets();

        self.emit(ListEvent::ItemAppended {
            list_id,
            item_id: insertion.item_id,
            index: insertion.index,
        });
        if let Some(visible) = insertion.placeholder_changed {
            self.emit(ListEvent::PlaceholderChanged { list_id, visible });
        }
        info!(
            list_id = %list_id,
            item_id = %insertion.item_id,
            index = insertion.index,
            "list: item appended"
        );
        Ok(insertion.item_id)
    }

    fn remove_locked(
        &self,
        state: &mut ControllerState,
        slot: ListSlot,
        position: usize,
    ) -> ListResult<Removal> {
        if lock_pending(&self.pending).contains(&slot) {
            return Err(ListError::Busy);
        }
        let (target, _) = state.target_mut(slot)?;
        let list_id = target.id();
        let removal = target.remove_at(position)?;

        if let Err(err) = self.sink.remove_fragment(list_id, removal.removed.id()) {
            warn!(list_id = %list_id, position, "list: fragment removal failed: {err:#}");
        }
        self.sink.refresh_widgets();

        self.emit(ListEvent::ItemRemoved {
            list_id,
            item_id: removal.removed.id(),
            position,
        });
        for moved in &removal.reindexed {
            self.emit(ListEvent::ItemReindexed {
                list_id,
                item_id: moved.item_id,
                old_index: moved.old_index,
                new_index: moved.new_index,
            });
        }
        if let Some(visible) = removal.placeholder_changed {
            self.emit(ListEvent::PlaceholderChanged { list_id, visible });
        }
        info!(
            list_id = %list_id,
            position,
            shifted = removal.reindexed.len(),
            anomalies = removal.anomalies.len(),
            "list: item removed"
        );
        Ok(removal)
    }

    fn emit(&self, event: ListEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
