//! Single-owner reorder state: canonical snapshot, pending order, pin
//! overlay, gesture and commit bookkeeping.
//!
//! Every input is a plain method call carrying `now`; the engine never
//! sleeps. Mutations for the store collect in an outbox that the owner
//! drains with [`ReorderEngine::take_mutations`].

use std::collections::HashMap;

use shared::{
    domain::{CollectionContext, GiftKind, ItemId, Point, Rect, Vector},
    error::StoreError,
    protocol::{CanonicalSnapshot, StoreMutation},
};
use tokio::{sync::broadcast, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    commit::{plan_commit, CommitCoordinator},
    config::EngineSettings,
    gesture::{CancelReason, DragGesture, DragSession, GestureSignal, GestureTimings},
    pins::{PinChange, PinError, PinLedger, PinOverlay},
    reconciler::{self, MovePlan},
    snapshot::{CanonicalOrder, PendingOrder},
    EngineEvent,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragCandidate {
    pub eligible: bool,
    pub candidate: Option<ItemId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteOutcome {
    Promoted,
    AlreadyPinned,
    Rejected,
}

/// Per-item visual state for the rendering surface.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayItem {
    pub id: ItemId,
    pub kind: Option<GiftKind>,
    pub pinned: bool,
    pub jiggling: bool,
    pub drag_position: Option<Point>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisplayState {
    pub generation: u64,
    pub context: CollectionContext,
    pub reordering: bool,
    pub order: Vec<ItemId>,
    pub pinned: Vec<ItemId>,
    pub items: Vec<DisplayItem>,
    pub dragging: Option<ItemId>,
}

#[derive(Debug, Clone)]
struct PreDragState {
    dragged_id: ItemId,
    pending: Option<PendingOrder>,
    overlay: PinOverlay,
    had_grace: bool,
}

pub struct ReorderEngine {
    context: CollectionContext,
    reordering: bool,
    has_snapshot: bool,
    canonical: CanonicalOrder,
    pins: PinLedger,
    pending: Option<PendingOrder>,
    gesture: DragGesture,
    commit: CommitCoordinator,
    layout: HashMap<ItemId, Rect>,
    pre_drag: Option<PreDragState>,
    held_pins: Vec<(ItemId, bool)>,
    limit_notified_for: Option<ItemId>,
    display: Vec<ItemId>,
    published_pins: Vec<ItemId>,
    outbox: Vec<StoreMutation>,
    events: broadcast::Sender<EngineEvent>,
}

impl ReorderEngine {
    pub fn new(settings: &EngineSettings, context: CollectionContext) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        Self {
            context,
            reordering: false,
            has_snapshot: false,
            canonical: CanonicalOrder::default(),
            pins: PinLedger::new(settings.max_pinned_count),
            pending: None,
            gesture: DragGesture::new(GestureTimings::from(settings)),
            commit: CommitCoordinator::new(settings.commit_grace()),
            layout: HashMap::new(),
            pre_drag: None,
            held_pins: Vec::new(),
            limit_notified_for: None,
            display: Vec::new(),
            published_pins: Vec::new(),
            outbox: Vec::new(),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<EngineEvent> {
        self.events.clone()
    }

    pub fn display_order(&self) -> &[ItemId] {
        &self.display
    }

    pub fn pinned(&self) -> Vec<ItemId> {
        self.pins.pinned_in(&self.display)
    }

    pub fn pending_order(&self) -> Option<&[ItemId]> {
        self.pending.as_deref()
    }

    pub fn drag_session(&self) -> Option<&DragSession> {
        self.gesture.session()
    }

    pub fn context(&self) -> CollectionContext {
        self.context
    }

    pub fn is_reordering(&self) -> bool {
        self.reordering
    }

    pub fn in_grace(&self) -> bool {
        self.commit.in_grace()
    }

    pub fn display_state(&self) -> DisplayState {
        let session = self.gesture.session();
        let items = self
            .display
            .iter()
            .map(|id| {
                let pinned = self.pins.is_pinned(id);
                DisplayItem {
                    id: id.clone(),
                    kind: self.canonical.kind(id).cloned(),
                    pinned,
                    jiggling: self.reordering && (self.context.is_collection() || pinned),
                    drag_position: session
                        .filter(|session| &session.dragged_id == id)
                        .map(|session| session.current_target),
                }
            })
            .collect();

        DisplayState {
            generation: self.canonical.generation(),
            context: self.context,
            reordering: self.reordering,
            order: self.display.clone(),
            pinned: self.pinned(),
            items,
            dragging: session.map(|session| session.dragged_id.clone()),
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.gesture.next_deadline(), self.commit.grace_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn take_mutations(&mut self) -> Vec<StoreMutation> {
        std::mem::take(&mut self.outbox)
    }

    pub fn apply_snapshot(&mut self, snapshot: CanonicalSnapshot) {
        if self.has_snapshot && snapshot.generation < self.canonical.generation() {
            debug!(
                generation = snapshot.generation,
                current = self.canonical.generation(),
                "store: ignoring out-of-date snapshot"
            );
            return;
        }

        self.has_snapshot = true;
        self.canonical = CanonicalOrder::from_snapshot(snapshot);
        self.pins
            .apply_canonical(self.canonical.pins(), self.canonical.order(), &self.display);

        if let Some(pending) = self.pending.take() {
            let rethreaded =
                reconciler::rethread(&pending, &self.canonical.ids_for(&self.context));
            if rethreaded.dropped > 0 {
                debug!(
                    dropped = rethreaded.dropped,
                    generation = self.canonical.generation(),
                    "reorder: dropped stale references from pending order"
                );
            }
            self.pending = Some(rethreaded.order);
        }

        self.recompute();
    }

    pub fn set_context(&mut self, context: CollectionContext, now: Instant) {
        if self.context == context {
            return;
        }
        if let Some(signal) = self.gesture.cancel(CancelReason::Interrupted) {
            self.handle_signal(signal, now);
        }
        self.pending = None;
        if !self.pins.has_overlay() {
            self.commit.collapse_grace();
        } else if !self.commit.in_grace() {
            // Unconfirmed pins are global; they still fall back when the window ends.
            self.commit.start_grace(now);
        }
        self.context = context;
        debug!(collection = ?context.collection_id(), "reorder: context switched");
        self.recompute();
    }

    pub fn set_reordering_mode(&mut self, reordering: bool, now: Instant) {
        if self.reordering == reordering {
            return;
        }
        self.reordering = reordering;
        if !reordering {
            if let Some(signal) = self.gesture.cancel(CancelReason::Interrupted) {
                self.handle_signal(signal, now);
            }
        }
        self.emit(EngineEvent::ReorderingModeChanged(reordering));
    }

    pub fn update_layout(&mut self, frames: impl IntoIterator<Item = (ItemId, Rect)>) {
        self.layout = frames.into_iter().collect();
    }

    pub fn begin_possible_drag(&mut self, at: Point, now: Instant) -> DragCandidate {
        if !self.gesture.is_idle() {
            self.additional_touch(now);
            return DragCandidate {
                eligible: false,
                candidate: None,
            };
        }

        let Some((id, frame)) = self.hit_test(at) else {
            return DragCandidate {
                eligible: false,
                candidate: None,
            };
        };
        let eligible = self.reordering && (self.context.is_collection() || self.pins.is_pinned(&id));
        if eligible {
            if let Some(signal) = self.gesture.pointer_down(id.clone(), frame.center(), now) {
                self.handle_signal(signal, now);
            }
        }
        DragCandidate {
            eligible,
            candidate: Some(id),
        }
    }

    pub fn additional_touch(&mut self, now: Instant) {
        if let Some(signal) = self.gesture.additional_touch() {
            self.handle_signal(signal, now);
        }
    }

    pub fn drag_moved(&mut self, by: Vector, now: Instant) {
        if let Some(signal) = self.gesture.pointer_moved(by) {
            self.handle_signal(signal, now);
        }
    }

    pub fn drag_ended(&mut self, now: Instant) {
        if let Some(signal) = self.gesture.pointer_up() {
            self.handle_signal(signal, now);
        }
    }

    pub fn drag_cancelled(&mut self, now: Instant) {
        if let Some(signal) = self.gesture.pointer_cancelled() {
            self.handle_signal(signal, now);
        }
    }

    pub fn fire_timers(&mut self, now: Instant) {
        for signal in self.gesture.fire_timers(now) {
            self.handle_signal(signal, now);
        }

        if !self.gesture.is_dragging() && self.commit.take_expired(now) {
            info!(
                generation = self.canonical.generation(),
                "commit: grace window elapsed; falling back to canonical order"
            );
            self.pending = None;
            self.pins.clear_overlay();
            self.recompute();
        }
    }

    pub fn request_pin(&mut self, id: &ItemId, now: Instant) -> Result<(), PinError> {
        if !self.canonical.contains(id) {
            return Err(PinError::UnknownItem(id.clone()));
        }
        match self.pins.request_pin(id) {
            Err(err) => {
                self.emit(EngineEvent::PinLimitReached {
                    limit: self.pins.max_pinned(),
                });
                Err(err)
            }
            Ok(PinChange::Unchanged) => Ok(()),
            Ok(PinChange::Changed) => {
                self.pin_changed(id, true, now);
                Ok(())
            }
        }
    }

    pub fn request_unpin(&mut self, id: &ItemId, now: Instant) {
        if self.pins.request_unpin(id) == PinChange::Changed {
            self.pin_changed(id, false, now);
        }
    }

    /// Explicit swap offered after a `PinLimitExceeded`.
    pub fn replace_pin(&mut self, evict: &ItemId, id: &ItemId, now: Instant) -> Result<(), PinError> {
        if !self.pins.is_pinned(evict) {
            return Err(PinError::NotPinned(evict.clone()));
        }
        if !self.canonical.contains(id) {
            return Err(PinError::UnknownItem(id.clone()));
        }
        if self.pins.is_pinned(id) {
            return Ok(());
        }
        self.request_unpin(evict, now);
        self.request_pin(id, now)
    }

    /// Tap-to-pin while reordering: pins `id` and slots it right after the
    /// last pinned item.
    pub fn promote_to_pinned(&mut self, id: &ItemId, now: Instant) -> Result<PromoteOutcome, PinError> {
        if !self.canonical.contains(id) {
            return Err(PinError::UnknownItem(id.clone()));
        }
        if !self.reordering || self.context.is_collection() {
            return Ok(PromoteOutcome::Rejected);
        }
        if self.pins.is_pinned(id) {
            return Ok(PromoteOutcome::AlreadyPinned);
        }
        if !self.pins.has_capacity() {
            let limit = self.pins.max_pinned();
            self.emit(EngineEvent::PinLimitReached { limit });
            return Err(PinError::PinLimitExceeded { limit });
        }
        let Some(order) = reconciler::promotion_order(&self.display, id, &self.pins) else {
            debug!(item = %id, "reorder: promotion rejected; nothing pinned yet");
            return Ok(PromoteOutcome::Rejected);
        };

        self.pins.request_pin(id)?;
        let to_index = order.iter().position(|other| other == id).unwrap_or_default();
        self.pending = Some(order);
        self.emit(EngineEvent::Reordered {
            id: id.clone(),
            to_index,
        });
        self.recompute();

        if !self.gesture.is_dragging() {
            self.commit_display(now);
        }
        Ok(PromoteOutcome::Promoted)
    }

    pub fn commit_finished(&mut self, mutation: StoreMutation, result: Result<(), StoreError>) {
        self.commit.acknowledged();
        match result {
            Ok(()) => debug!(
                mutation = mutation.name(),
                in_flight = self.commit.in_flight(),
                "commit: store accepted mutation"
            ),
            Err(error) => {
                warn!(
                    mutation = mutation.name(),
                    %error,
                    "commit: store rejected mutation; keeping local order until grace expires"
                );
                self.emit(EngineEvent::CommitFailed { mutation, error });
            }
        }
    }

    fn handle_signal(&mut self, signal: GestureSignal, now: Instant) {
        match signal {
            GestureSignal::Armed { candidate } => {
                debug!(item = %candidate, "reorder: waiting for long press");
            }
            GestureSignal::BeginIntent { candidate } => {
                self.emit(EngineEvent::BeginIntent { id: candidate });
            }
            GestureSignal::DragBegan(session) => self.begin_session(session),
            GestureSignal::DragMoved { target } => self.drag_to(target),
            GestureSignal::Committing { dragged_id } => self.finish_session(dragged_id, now),
            GestureSignal::Cancelled {
                was_dragging: true, ..
            } => self.cancel_session(now),
            GestureSignal::Cancelled { .. } => {}
        }
    }

    fn begin_session(&mut self, session: DragSession) {
        if !self.canonical.contains(&session.dragged_id) {
            debug!(item = %session.dragged_id, "reorder: dragged item vanished before drag began");
            self.gesture.cancel(CancelReason::Interrupted);
            return;
        }

        let had_grace = self.commit.collapse_grace();
        self.pre_drag = Some(PreDragState {
            dragged_id: session.dragged_id.clone(),
            pending: self.pending.clone(),
            overlay: self.pins.overlay(),
            had_grace,
        });
        self.limit_notified_for = None;
        if self.pending.is_none() {
            self.pending = Some(self.display.clone());
        }
        self.emit(EngineEvent::DragStarted {
            id: session.dragged_id,
        });
    }

    fn drag_to(&mut self, target: Point) {
        let Some(session) = self.gesture.session() else {
            return;
        };
        let dragged = session.dragged_id.clone();
        let Some(target_index) = self.display.iter().position(|id| {
            *id != dragged
                && self
                    .layout
                    .get(id)
                    .is_some_and(|frame| frame.contains(target))
        }) else {
            return;
        };
        let hovered = self.display[target_index].clone();

        let plan = reconciler::plan_move(
            &self.display,
            &dragged,
            target_index,
            &self.context,
            &self.pins,
        );
        let pin_limit_hit = match &plan {
            MovePlan::Rejected => false,
            MovePlan::Unchanged { pin_limit_hit } | MovePlan::Moved { pin_limit_hit, .. } => {
                *pin_limit_hit
            }
        };
        if pin_limit_hit && self.limit_notified_for.as_ref() != Some(&hovered) {
            self.limit_notified_for = Some(hovered);
            self.emit(EngineEvent::PinLimitReached {
                limit: self.pins.max_pinned(),
            });
        }

        let MovePlan::Moved { order, promote, .. } = plan else {
            return;
        };
        if promote && self.pins.request_pin(&dragged).is_err() {
            return;
        }
        if self.pending.as_ref() == Some(&order) {
            return;
        }
        let to_index = order
            .iter()
            .position(|id| *id == dragged)
            .unwrap_or(target_index);
        self.pending = Some(order);
        self.emit(EngineEvent::Reordered {
            id: dragged,
            to_index,
        });
        self.recompute();
    }

    fn finish_session(&mut self, dragged_id: ItemId, now: Instant) {
        let had_grace = self
            .pre_drag
            .take()
            .is_some_and(|pre_drag| pre_drag.had_grace);
        self.emit(EngineEvent::DragFinished {
            id: dragged_id,
            committed: true,
        });

        let released = self.release_held_pins();
        if !self.commit_display(now) {
            if had_grace || released || self.pins.has_overlay() {
                self.commit.start_grace(now);
            } else {
                self.pending = None;
            }
        }
        self.recompute();
    }

    fn cancel_session(&mut self, now: Instant) {
        let Some(pre_drag) = self.pre_drag.take() else {
            return;
        };
        debug!(item = %pre_drag.dragged_id, "reorder: drag cancelled; restoring previous order");
        if !self.held_pins.is_empty() {
            debug!(
                held = self.held_pins.len(),
                "reorder: discarding pin changes made during the drag"
            );
            self.held_pins.clear();
        }
        self.pending = pre_drag.pending.map(|pending| {
            reconciler::rethread(&pending, &self.canonical.ids_for(&self.context)).order
        });
        self.pins.restore_overlay(pre_drag.overlay);
        self.pins
            .apply_canonical(self.canonical.pins(), self.canonical.order(), &self.display);
        if pre_drag.had_grace {
            self.commit.start_grace(now);
        }
        self.emit(EngineEvent::DragFinished {
            id: pre_drag.dragged_id,
            committed: false,
        });
        self.recompute();
    }

    /// Dispatches the mutation matching the current display, if any, and
    /// opens the grace window. Returns whether anything was dispatched.
    fn commit_display(&mut self, now: Instant) -> bool {
        let canonical_ids = self.canonical.ids_for(&self.context);
        let canonical_display =
            reconciler::canonical_display_order(&canonical_ids, &self.context, &self.pins);
        match plan_commit(&self.context, &self.display, &canonical_display, &self.pins) {
            Some(mutation) => {
                self.dispatch(mutation);
                self.commit.start_grace(now);
                true
            }
            None => false,
        }
    }

    fn pin_changed(&mut self, id: &ItemId, pinned: bool, now: Instant) {
        if self.gesture.is_dragging() {
            debug!(item = %id, pinned, "reorder: holding pin change until the drag ends");
            self.held_pins.retain(|(other, _)| other != id);
            self.held_pins.push((id.clone(), pinned));
        } else {
            self.dispatch(StoreMutation::SetPinned {
                id: id.clone(),
                pinned,
            });
            self.commit.start_grace(now);
        }
        self.recompute();
    }

    /// Sends the pin changes held back during a drag that still hold.
    /// Returns whether anything was dispatched.
    fn release_held_pins(&mut self) -> bool {
        let mut released = false;
        for (id, pinned) in std::mem::take(&mut self.held_pins) {
            if self.pins.is_pinned(&id) == pinned {
                self.dispatch(StoreMutation::SetPinned { id, pinned });
                released = true;
            }
        }
        released
    }

    fn dispatch(&mut self, mutation: StoreMutation) {
        info!(
            mutation = mutation.name(),
            generation = self.canonical.generation(),
            "commit: dispatching mutation"
        );
        self.commit.dispatched();
        self.emit(EngineEvent::CommitDispatched(mutation.clone()));
        self.outbox.push(mutation);
    }

    fn hit_test(&self, at: Point) -> Option<(ItemId, Rect)> {
        self.display.iter().find_map(|id| {
            self.layout
                .get(id)
                .filter(|frame| frame.contains(at))
                .map(|frame| (id.clone(), *frame))
        })
    }

    fn recompute(&mut self) {
        let canonical_ids = self.canonical.ids_for(&self.context);
        let order = reconciler::display_order(
            &canonical_ids,
            self.pending.as_deref(),
            &self.context,
            &self.pins,
        );
        let pinned = self.pins.pinned_in(&order);
        if order != self.display || pinned != self.published_pins {
            self.display = order.clone();
            self.published_pins = pinned.clone();
            self.emit(EngineEvent::DisplayChanged { order, pinned });
        }
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
