use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use shared::{
    domain::{CollectionId, ItemId},
    error::StoreError,
    protocol::{CanonicalSnapshot, StoreMutation},
};
use thiserror::Error;

pub mod commit;
pub mod config;
pub mod engine;
pub mod gesture;
mod memory_store;
pub mod pins;
pub mod reconciler;
pub mod runtime;
pub mod snapshot;

pub use config::{load_settings, EngineSettings};
pub use engine::{DisplayItem, DisplayState, DragCandidate, PromoteOutcome, ReorderEngine};
pub use memory_store::MemoryItemStore;
pub use pins::PinError;
pub use runtime::{spawn_engine, EngineHandle, ReorderingModeContext};

/// Remote owner of the canonical item list.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Current snapshot first, then every later push.
    async fn subscribe(&self) -> Result<BoxStream<'static, CanonicalSnapshot>, StoreError>;
    async fn commit_pinned_order(&self, ids: Vec<ItemId>) -> Result<(), StoreError>;
    async fn commit_collection_order(
        &self,
        collection_id: CollectionId,
        ids: Vec<ItemId>,
    ) -> Result<(), StoreError>;
    async fn set_pinned(&self, id: ItemId, pinned: bool) -> Result<(), StoreError>;
}

pub async fn apply_mutation(
    store: &dyn ItemStore,
    mutation: StoreMutation,
) -> Result<(), StoreError> {
    match mutation {
        StoreMutation::SetPinnedOrder { ids } => store.commit_pinned_order(ids).await,
        StoreMutation::SetCollectionOrder { collection_id, ids } => {
            store.commit_collection_order(collection_id, ids).await
        }
        StoreMutation::SetPinned { id, pinned } => store.set_pinned(id, pinned).await,
    }
}

pub struct MissingItemStore;

#[async_trait]
impl ItemStore for MissingItemStore {
    async fn subscribe(&self) -> Result<BoxStream<'static, CanonicalSnapshot>, StoreError> {
        Ok(futures::stream::pending().boxed())
    }

    async fn commit_pinned_order(&self, _ids: Vec<ItemId>) -> Result<(), StoreError> {
        Err(StoreError::unavailable("item store unavailable"))
    }

    async fn commit_collection_order(
        &self,
        collection_id: CollectionId,
        _ids: Vec<ItemId>,
    ) -> Result<(), StoreError> {
        Err(StoreError::unavailable(format!(
            "item store unavailable for collection {}",
            collection_id.0
        )))
    }

    async fn set_pinned(&self, id: ItemId, _pinned: bool) -> Result<(), StoreError> {
        Err(StoreError::unavailable(format!(
            "item store unavailable for item {id}"
        )))
    }
}

/// Change notifications for the rendering surface.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    DisplayChanged {
        order: Vec<ItemId>,
        pinned: Vec<ItemId>,
    },
    /// A provisional move was applied; the surface plays haptic feedback.
    Reordered {
        id: ItemId,
        to_index: usize,
    },
    BeginIntent {
        id: ItemId,
    },
    DragStarted {
        id: ItemId,
    },
    DragFinished {
        id: ItemId,
        committed: bool,
    },
    ReorderingModeChanged(bool),
    PinLimitReached {
        limit: usize,
    },
    CommitDispatched(StoreMutation),
    CommitFailed {
        mutation: StoreMutation,
        error: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Pin(#[from] PinError),
    #[error("reorder engine has stopped")]
    Stopped,
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
