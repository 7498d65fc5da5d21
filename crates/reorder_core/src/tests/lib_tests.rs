use std::sync::Mutex;

use shared::error::StoreErrorCode;

use super::*;

#[derive(Default)]
struct RecordingStore {
    calls: Mutex<Vec<String>>,
}

impl RecordingStore {
    fn record(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ItemStore for RecordingStore {
    async fn subscribe(&self) -> Result<BoxStream<'static, CanonicalSnapshot>, StoreError> {
        Ok(futures::stream::empty().boxed())
    }

    async fn commit_pinned_order(&self, ids: Vec<ItemId>) -> Result<(), StoreError> {
        self.record(format!("pinned_order:{}", ids.len()));
        Ok(())
    }

    async fn commit_collection_order(
        &self,
        collection_id: CollectionId,
        ids: Vec<ItemId>,
    ) -> Result<(), StoreError> {
        self.record(format!("collection_order:{}:{}", collection_id.0, ids.len()));
        Ok(())
    }

    async fn set_pinned(&self, id: ItemId, pinned: bool) -> Result<(), StoreError> {
        self.record(format!("set_pinned:{id}:{pinned}"));
        Ok(())
    }
}

#[tokio::test]
async fn apply_mutation_routes_each_variant() {
    let store = RecordingStore::default();
    let a = ItemId::message(1);
    let b = ItemId::message(2);

    apply_mutation(
        &store,
        StoreMutation::SetPinnedOrder {
            ids: vec![a.clone(), b.clone()],
        },
    )
    .await
    .expect("pinned order");
    apply_mutation(
        &store,
        StoreMutation::SetCollectionOrder {
            collection_id: CollectionId(7),
            ids: vec![b.clone()],
        },
    )
    .await
    .expect("collection order");
    apply_mutation(
        &store,
        StoreMutation::SetPinned {
            id: a,
            pinned: false,
        },
    )
    .await
    .expect("set pinned");

    assert_eq!(
        store.calls(),
        vec![
            "pinned_order:2".to_string(),
            "collection_order:7:1".to_string(),
            "set_pinned:msg:1:false".to_string(),
        ]
    );
}

#[tokio::test]
async fn missing_store_fails_every_commit_as_unavailable() {
    let store = MissingItemStore;
    let error = apply_mutation(
        &store,
        StoreMutation::SetPinned {
            id: ItemId::slug("plush-pepe-12"),
            pinned: true,
        },
    )
    .await
    .expect_err("no store");

    assert_eq!(error.code, StoreErrorCode::Unavailable);
    assert!(error.is_retryable());
    assert!(store.commit_pinned_order(Vec::new()).await.is_err());
}

#[test]
fn pin_errors_convert_into_engine_errors() {
    let error = EngineError::from(PinError::PinLimitExceeded { limit: 6 });
    assert_eq!(error.to_string(), "pin limit of 6 items reached");
    assert_eq!(EngineError::Stopped.to_string(), "reorder engine has stopped");
}
