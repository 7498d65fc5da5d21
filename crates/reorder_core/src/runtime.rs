//! Owns one [`ReorderEngine`] on a dedicated task and feeds it store pushes,
//! surface commands, mode changes, commit acknowledgements and timer
//! expiries, one at a time.

use std::sync::Arc;

use futures::{stream::BoxStream, StreamExt};
use shared::{
    domain::{CollectionContext, ItemId, Point, Rect, Vector},
    error::StoreError,
    protocol::{CanonicalSnapshot, StoreMutation},
};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    apply_mutation,
    config::EngineSettings,
    engine::{DisplayState, DragCandidate, PromoteOutcome, ReorderEngine},
    pins::PinError,
    EngineError, EngineEvent, ItemStore,
};

/// Shared "currently reordering" flag. Every engine showing the same list
/// gets a clone; toggling it on one screen toggles it everywhere.
#[derive(Debug, Clone)]
pub struct ReorderingModeContext {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for ReorderingModeContext {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ReorderingModeContext {
    pub fn new(reordering: bool) -> Self {
        let (sender, _) = watch::channel(reordering);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn set(&self, reordering: bool) {
        self.sender.send_if_modified(|current| {
            let changed = *current != reordering;
            *current = reordering;
            changed
        });
    }

    pub fn is_reordering(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

#[derive(Debug)]
enum EngineCommand {
    SetContext(CollectionContext),
    UpdateLayout(Vec<(ItemId, Rect)>),
    BeginPossibleDrag {
        at: Point,
        reply: oneshot::Sender<DragCandidate>,
    },
    AdditionalTouch,
    DragMoved(Vector),
    DragEnded,
    DragCancelled,
    RequestPin {
        id: ItemId,
        reply: oneshot::Sender<Result<(), PinError>>,
    },
    RequestUnpin {
        id: ItemId,
        reply: oneshot::Sender<()>,
    },
    ReplacePin {
        evict: ItemId,
        id: ItemId,
        reply: oneshot::Sender<Result<(), PinError>>,
    },
    PromoteToPinned {
        id: ItemId,
        reply: oneshot::Sender<Result<PromoteOutcome, PinError>>,
    },
    DisplayState {
        reply: oneshot::Sender<DisplayState>,
    },
    Shutdown,
}

type CommitResult = (StoreMutation, Result<(), StoreError>);

/// Cloneable front door to a running engine task.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    events: broadcast::Sender<EngineEvent>,
    display: watch::Receiver<DisplayState>,
}

impl EngineHandle {
    /// Last published order; never waits on the engine task.
    pub fn display_order(&self) -> Vec<ItemId> {
        self.display.borrow().order.clone()
    }

    pub fn watch_display(&self) -> watch::Receiver<DisplayState> {
        self.display.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn display_state(&self) -> Result<DisplayState, EngineError> {
        self.request(|reply| EngineCommand::DisplayState { reply }).await
    }

    pub async fn set_context(&self, context: CollectionContext) -> Result<(), EngineError> {
        self.send(EngineCommand::SetContext(context)).await
    }

    pub async fn update_layout(&self, frames: Vec<(ItemId, Rect)>) -> Result<(), EngineError> {
        self.send(EngineCommand::UpdateLayout(frames)).await
    }

    pub async fn begin_possible_drag(&self, at: Point) -> Result<DragCandidate, EngineError> {
        self.request(|reply| EngineCommand::BeginPossibleDrag { at, reply })
            .await
    }

    pub async fn additional_touch(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::AdditionalTouch).await
    }

    pub async fn drag_moved(&self, by: Vector) -> Result<(), EngineError> {
        self.send(EngineCommand::DragMoved(by)).await
    }

    pub async fn drag_ended(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::DragEnded).await
    }

    pub async fn drag_cancelled(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::DragCancelled).await
    }

    pub async fn request_pin(&self, id: ItemId) -> Result<(), EngineError> {
        self.request(|reply| EngineCommand::RequestPin { id, reply })
            .await?
            .map_err(EngineError::from)
    }

    pub async fn request_unpin(&self, id: ItemId) -> Result<(), EngineError> {
        self.request(|reply| EngineCommand::RequestUnpin { id, reply })
            .await
    }

    pub async fn replace_pin(&self, evict: ItemId, id: ItemId) -> Result<(), EngineError> {
        self.request(|reply| EngineCommand::ReplacePin { evict, id, reply })
            .await?
            .map_err(EngineError::from)
    }

    pub async fn promote_to_pinned(&self, id: ItemId) -> Result<PromoteOutcome, EngineError> {
        self.request(|reply| EngineCommand::PromoteToPinned { id, reply })
            .await?
            .map_err(EngineError::from)
    }

    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Shutdown).await
    }

    async fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::Stopped)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, EngineError> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| EngineError::Stopped)
    }
}

/// Starts the engine task. The task subscribes to `store` itself and runs
/// until [`EngineHandle::shutdown`] or until every handle is dropped.
pub fn spawn_engine(
    store: Arc<dyn ItemStore>,
    settings: EngineSettings,
    context: CollectionContext,
    mode: ReorderingModeContext,
) -> (EngineHandle, JoinHandle<()>) {
    let mut engine = ReorderEngine::new(&settings, context);
    engine.set_reordering_mode(mode.is_reordering(), Instant::now());

    let (commands_tx, commands_rx) = mpsc::channel(settings.event_capacity.max(1));
    let (display_tx, display_rx) = watch::channel(engine.display_state());
    let handle = EngineHandle {
        commands: commands_tx,
        events: engine.event_sender(),
        display: display_rx,
    };

    let task = tokio::spawn(run_engine(
        engine,
        store,
        commands_rx,
        display_tx,
        mode.subscribe(),
    ));
    (handle, task)
}

async fn run_engine(
    mut engine: ReorderEngine,
    store: Arc<dyn ItemStore>,
    mut commands: mpsc::Receiver<EngineCommand>,
    display: watch::Sender<DisplayState>,
    mut mode: watch::Receiver<bool>,
) {
    let (completions_tx, mut completions) = mpsc::unbounded_channel::<CommitResult>();

    let mut snapshots = match store.subscribe().await {
        Ok(stream) => Some(stream),
        Err(error) => {
            warn!(%error, "store: subscribe failed; running without canonical updates");
            None
        }
    };
    let mut mode_open = true;
    info!(context = ?engine.context(), "reorder: engine started");

    loop {
        let deadline = engine.next_deadline();
        tokio::select! {
            biased;

            snapshot = next_snapshot(&mut snapshots), if snapshots.is_some() => match snapshot {
                Some(snapshot) => engine.apply_snapshot(snapshot),
                None => {
                    debug!("store: snapshot stream closed");
                    snapshots = None;
                }
            },
            command = commands.recv() => match command {
                Some(EngineCommand::Shutdown) | None => break,
                Some(command) => handle_command(&mut engine, command),
            },
            Some((mutation, result)) = completions.recv() => {
                engine.commit_finished(mutation, result);
            }
            changed = mode.changed(), if mode_open => match changed {
                Ok(()) => {
                    let reordering = *mode.borrow_and_update();
                    engine.set_reordering_mode(reordering, Instant::now());
                }
                Err(_) => mode_open = false,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                engine.fire_timers(Instant::now());
            }
        }

        for mutation in engine.take_mutations() {
            let store = Arc::clone(&store);
            let completions = completions_tx.clone();
            tokio::spawn(async move {
                let result = apply_mutation(store.as_ref(), mutation.clone()).await;
                let _ = completions.send((mutation, result));
            });
        }
        let state = engine.display_state();
        display.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    info!("reorder: engine stopped");
}

async fn next_snapshot(
    snapshots: &mut Option<BoxStream<'static, CanonicalSnapshot>>,
) -> Option<CanonicalSnapshot> {
    match snapshots {
        Some(stream) => stream.next().await,
        None => None,
    }
}

fn handle_command(engine: &mut ReorderEngine, command: EngineCommand) {
    let now = Instant::now();
    match command {
        EngineCommand::SetContext(context) => engine.set_context(context, now),
        EngineCommand::UpdateLayout(frames) => engine.update_layout(frames),
        EngineCommand::BeginPossibleDrag { at, reply } => {
            let _ = reply.send(engine.begin_possible_drag(at, now));
        }
        EngineCommand::AdditionalTouch => engine.additional_touch(now),
        EngineCommand::DragMoved(by) => engine.drag_moved(by, now),
        EngineCommand::DragEnded => engine.drag_ended(now),
        EngineCommand::DragCancelled => engine.drag_cancelled(now),
        EngineCommand::RequestPin { id, reply } => {
            let _ = reply.send(engine.request_pin(&id, now));
        }
        EngineCommand::RequestUnpin { id, reply } => {
            engine.request_unpin(&id, now);
            let _ = reply.send(());
        }
        EngineCommand::ReplacePin { evict, id, reply } => {
            let _ = reply.send(engine.replace_pin(&evict, &id, now));
        }
        EngineCommand::PromoteToPinned { id, reply } => {
            let _ = reply.send(engine.promote_to_pinned(&id, now));
        }
        EngineCommand::DisplayState { reply } => {
            let _ = reply.send(engine.display_state());
        }
        EngineCommand::Shutdown => {}
    }
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
