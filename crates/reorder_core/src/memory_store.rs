use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use shared::{
    domain::{CollectionId, GiftKind, ItemId},
    error::{StoreError, StoreErrorCode},
    protocol::CanonicalSnapshot,
};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::ItemStore;

#[derive(Debug, Default)]
struct StoreState {
    order: Vec<ItemId>,
    pinned: Vec<ItemId>,
    membership: HashMap<CollectionId, Vec<ItemId>>,
    kinds: HashMap<ItemId, GiftKind>,
    generation: u64,
    fail_next_commit: Option<StoreError>,
}

impl StoreState {
    fn snapshot(&self) -> CanonicalSnapshot {
        CanonicalSnapshot {
            order: self.order.clone(),
            pins: self.pinned.iter().cloned().collect(),
            membership: self.membership.clone(),
            generation: self.generation,
            kinds: self.kinds.clone(),
        }
    }

    fn check_known(&self, ids: &[ItemId]) -> Result<(), StoreError> {
        match ids.iter().find(|id| !self.order.contains(id)) {
            Some(id) => Err(StoreError::new(
                StoreErrorCode::NotFound,
                format!("unknown item {id}"),
            )),
            None => Ok(()),
        }
    }

    /// Pinned ids lead the order in pin order; the rest keep their relative
    /// order.
    fn pin_to_top(&mut self) {
        let pinned = self.pinned.clone();
        let rest: Vec<ItemId> = self
            .order
            .iter()
            .filter(|id| !pinned.contains(id))
            .cloned()
            .collect();
        self.order = pinned.into_iter().chain(rest).collect();
    }
}

/// In-process [`ItemStore`] that applies commits after an optional delay and
/// pushes a fresh snapshot to every subscriber.
pub struct MemoryItemStore {
    state: Mutex<StoreState>,
    updates: broadcast::Sender<CanonicalSnapshot>,
    echo_delay: Duration,
}

impl MemoryItemStore {
    pub fn new(order: Vec<ItemId>, pinned: Vec<ItemId>) -> Self {
        let (updates, _) = broadcast::channel(64);
        let mut state = StoreState {
            order,
            pinned,
            generation: 1,
            ..StoreState::default()
        };
        state.pin_to_top();
        Self {
            state: Mutex::new(state),
            updates,
            echo_delay: Duration::ZERO,
        }
    }

    /// Delay between accepting a commit and publishing its snapshot.
    pub fn with_echo_delay(mut self, echo_delay: Duration) -> Self {
        self.echo_delay = echo_delay;
        self
    }

    pub async fn snapshot(&self) -> CanonicalSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn set_kind(&self, id: ItemId, kind: GiftKind) {
        let mut state = self.state.lock().await;
        state.kinds.insert(id, kind);
        self.publish(&mut state);
    }

    pub async fn set_collection(&self, collection_id: CollectionId, members: Vec<ItemId>) {
        let mut state = self.state.lock().await;
        state.membership.insert(collection_id, members);
        self.publish(&mut state);
    }

    /// Appends a new item at the end of the list, like a gift arriving.
    pub async fn insert_item(&self, id: ItemId) {
        let mut state = self.state.lock().await;
        if !state.order.contains(&id) {
            state.order.push(id);
        }
        self.publish(&mut state);
    }

    pub async fn remove_item(&self, id: &ItemId) {
        let mut state = self.state.lock().await;
        state.order.retain(|other| other != id);
        state.pinned.retain(|other| other != id);
        for members in state.membership.values_mut() {
            members.retain(|other| other != id);
        }
        state.kinds.remove(id);
        self.publish(&mut state);
    }

    /// Makes the next commit fail with `error` without touching state.
    pub async fn fail_next_commit(&self, error: StoreError) {
        self.state.lock().await.fail_next_commit = Some(error);
    }

    /// Pushes `snapshot` as-is, bypassing generation bookkeeping.
    pub fn push_raw_snapshot(&self, snapshot: CanonicalSnapshot) {
        let _ = self.updates.send(snapshot);
    }

    fn publish(&self, state: &mut StoreState) {
        state.generation += 1;
        debug!(generation = state.generation, "store: publishing snapshot");
        let _ = self.updates.send(state.snapshot());
    }

    async fn commit(
        &self,
        apply: impl FnOnce(&mut StoreState) -> Result<(), StoreError> + Send,
    ) -> Result<(), StoreError> {
        if let Some(error) = self.state.lock().await.fail_next_commit.take() {
            return Err(error);
        }
        if !self.echo_delay.is_zero() {
            tokio::time::sleep(self.echo_delay).await;
        }
        let mut state = self.state.lock().await;
        apply(&mut state)?;
        self.publish(&mut state);
        Ok(())
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn subscribe(&self) -> Result<BoxStream<'static, CanonicalSnapshot>, StoreError> {
        let state = self.state.lock().await;
        let updates = BroadcastStream::new(self.updates.subscribe())
            .filter_map(|update| async move { update.ok() });
        Ok(futures::stream::once(futures::future::ready(state.snapshot()))
            .chain(updates)
            .boxed())
    }

    async fn commit_pinned_order(&self, ids: Vec<ItemId>) -> Result<(), StoreError> {
        self.commit(move |state| {
            state.check_known(&ids)?;
            state.pinned = ids;
            state.pin_to_top();
            Ok(())
        })
        .await
    }

    async fn commit_collection_order(
        &self,
        collection_id: CollectionId,
        ids: Vec<ItemId>,
    ) -> Result<(), StoreError> {
        self.commit(move |state| {
            state.check_known(&ids)?;
            let members = state.membership.get(&collection_id).ok_or_else(|| {
                StoreError::new(
                    StoreErrorCode::NotFound,
                    format!("unknown collection {}", collection_id.0),
                )
            })?;
            let mut expected = members.clone();
            let mut given = ids.clone();
            expected.sort();
            given.sort();
            if expected != given {
                return Err(StoreError::validation(
                    "collection order must list every member exactly once",
                ));
            }
            state.membership.insert(collection_id, ids);
            Ok(())
        })
        .await
    }

    async fn set_pinned(&self, id: ItemId, pinned: bool) -> Result<(), StoreError> {
        self.commit(move |state| {
            state.check_known(std::slice::from_ref(&id))?;
            let already = state.pinned.contains(&id);
            if pinned && !already {
                state.pinned.push(id);
            } else if !pinned && already {
                state.pinned.retain(|other| *other != id);
            }
            state.pin_to_top();
            Ok(())
        })
        .await
    }
}
