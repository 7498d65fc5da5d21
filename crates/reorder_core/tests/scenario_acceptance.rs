use std::{sync::Arc, time::Duration};

use reorder_core::{
    spawn_engine, EngineEvent, EngineHandle, EngineSettings, MemoryItemStore, PromoteOutcome,
    ReorderingModeContext,
};
use shared::domain::{CollectionContext, CollectionId, ItemId, Point, Rect, Vector};
use tokio::time::{sleep, timeout};

fn ids(names: &[&str]) -> Vec<ItemId> {
    names.iter().map(|name| ItemId::slug(*name)).collect()
}

async fn lay_out(handle: &EngineHandle) {
    let frames = handle
        .display_order()
        .into_iter()
        .enumerate()
        .map(|(index, id)| (id, Rect::new(index as f64 * 100.0, 0.0, 100.0, 100.0)))
        .collect();
    handle.update_layout(frames).await.expect("layout");
}

async fn settle(handle: &EngineHandle, expected: &[ItemId]) {
    let mut display = handle.watch_display();
    timeout(
        Duration::from_secs(5),
        display.wait_for(|state| state.order == expected),
    )
    .await
    .expect("display settles in time")
    .expect("engine alive");
}

async fn long_press_drag(handle: &EngineHandle, from: usize, to: usize) {
    let at = Point::new(from as f64 * 100.0 + 50.0, 50.0);
    assert!(handle.begin_possible_drag(at).await.expect("begin").eligible);
    sleep(Duration::from_millis(650)).await;
    handle
        .drag_moved(Vector::new((to as f64 - from as f64) * 100.0, 0.0))
        .await
        .expect("move");
}

#[tokio::test(start_paused = true)]
async fn server_removal_mid_drag_keeps_local_position_then_commits() {
    let store = Arc::new(MemoryItemStore::new(
        ids(&["a", "b", "c", "d"]),
        ids(&["a", "b", "c"]),
    ));
    let (handle, _task) = spawn_engine(
        store.clone(),
        EngineSettings::default(),
        CollectionContext::AllItems,
        ReorderingModeContext::new(true),
    );
    settle(&handle, &ids(&["a", "b", "c", "d"])).await;
    lay_out(&handle).await;

    long_press_drag(&handle, 2, 0).await;
    settle(&handle, &ids(&["c", "a", "b", "d"])).await;

    store.remove_item(&ItemId::slug("b")).await;
    settle(&handle, &ids(&["c", "a", "d"])).await;

    handle.drag_ended().await.expect("end");
    sleep(Duration::from_millis(1200)).await;

    assert_eq!(store.snapshot().await.order, ids(&["c", "a", "d"]));
    assert_eq!(handle.display_order(), ids(&["c", "a", "d"]));
}

#[tokio::test(start_paused = true)]
async fn collection_reorder_round_trips_through_the_store() {
    let store = Arc::new(MemoryItemStore::new(ids(&["a", "b", "c", "d"]), Vec::new()));
    store
        .set_collection(CollectionId(3), ids(&["d", "b", "a"]))
        .await;
    let (handle, _task) = spawn_engine(
        store.clone(),
        EngineSettings::default(),
        CollectionContext::Collection(CollectionId(3)),
        ReorderingModeContext::new(true),
    );
    settle(&handle, &ids(&["d", "b", "a"])).await;
    lay_out(&handle).await;

    long_press_drag(&handle, 0, 2).await;
    handle.drag_ended().await.expect("end");
    settle(&handle, &ids(&["b", "a", "d"])).await;

    sleep(Duration::from_millis(1200)).await;
    assert_eq!(
        store.snapshot().await.membership[&CollectionId(3)],
        ids(&["b", "a", "d"])
    );
    assert_eq!(handle.display_order(), ids(&["b", "a", "d"]));
}

#[tokio::test(start_paused = true)]
async fn tap_to_promote_lands_after_the_pinned_block() {
    let store = Arc::new(MemoryItemStore::new(
        ids(&["a", "b", "c", "d"]),
        ids(&["a"]),
    ));
    let (handle, _task) = spawn_engine(
        store.clone(),
        EngineSettings::default().with_max_pinned_count(2),
        CollectionContext::AllItems,
        ReorderingModeContext::new(true),
    );
    let mut events = handle.subscribe_events();
    settle(&handle, &ids(&["a", "b", "c", "d"])).await;

    let outcome = handle
        .promote_to_pinned(ItemId::slug("d"))
        .await
        .expect("promote");
    assert_eq!(outcome, PromoteOutcome::Promoted);
    settle(&handle, &ids(&["a", "d", "b", "c"])).await;

    let refused = handle.promote_to_pinned(ItemId::slug("c")).await;
    assert!(refused.is_err());

    let mut saw_limit = false;
    while let Ok(event) = events.try_recv() {
        saw_limit |= matches!(event, EngineEvent::PinLimitReached { limit: 2 });
    }
    assert!(saw_limit);

    sleep(Duration::from_millis(1200)).await;
    assert_eq!(store.snapshot().await.order, ids(&["a", "d", "b", "c"]));
    assert_eq!(handle.display_order(), ids(&["a", "d", "b", "c"]));
}

#[tokio::test(start_paused = true)]
async fn new_gift_during_grace_appears_without_losing_the_reorder() {
    let store = Arc::new(
        MemoryItemStore::new(ids(&["a", "b", "c"]), ids(&["a", "b"]))
            .with_echo_delay(Duration::from_millis(300)),
    );
    let (handle, _task) = spawn_engine(
        store.clone(),
        EngineSettings::default(),
        CollectionContext::AllItems,
        ReorderingModeContext::new(true),
    );
    settle(&handle, &ids(&["a", "b", "c"])).await;
    lay_out(&handle).await;

    long_press_drag(&handle, 1, 0).await;
    handle.drag_ended().await.expect("end");
    settle(&handle, &ids(&["b", "a", "c"])).await;

    store.insert_item(ItemId::slug("n")).await;
    settle(&handle, &ids(&["b", "a", "c", "n"])).await;

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(handle.display_order(), ids(&["b", "a", "c", "n"]));
}
