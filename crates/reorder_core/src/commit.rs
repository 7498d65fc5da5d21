//! Decides which mutation a finished reorder sends to the store and how long
//! the local pending order outlives it.

use std::time::Duration;

use shared::{
    domain::{CollectionContext, ItemId},
    protocol::StoreMutation,
};
use tokio::time::Instant;
use tracing::debug;

use crate::pins::PinLedger;

/// Builds the single mutation that makes the store match `display`, or
/// `None` when the committable part already matches `canonical_display`.
/// In the all-items list only the pinned prefix is committable.
pub fn plan_commit(
    context: &CollectionContext,
    display: &[ItemId],
    canonical_display: &[ItemId],
    pins: &PinLedger,
) -> Option<StoreMutation> {
    match context {
        CollectionContext::AllItems => {
            let pinned: Vec<ItemId> = display
                .iter()
                .filter(|id| pins.is_pinned(id))
                .take(pins.max_pinned())
                .cloned()
                .collect();
            let confirmed: Vec<&ItemId> = canonical_display
                .iter()
                .filter(|id| pins.is_canonically_pinned(id))
                .collect();
            if pinned.iter().eq(confirmed.into_iter()) {
                None
            } else {
                Some(StoreMutation::SetPinnedOrder { ids: pinned })
            }
        }
        CollectionContext::Collection(collection_id) => {
            (display != canonical_display).then(|| StoreMutation::SetCollectionOrder {
                collection_id: *collection_id,
                ids: display.to_vec(),
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommitCoordinator {
    grace: Duration,
    grace_deadline: Option<Instant>,
    in_flight: usize,
}

impl CommitCoordinator {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            grace_deadline: None,
            in_flight: 0,
        }
    }

    pub fn start_grace(&mut self, now: Instant) {
        let deadline = now + self.grace;
        debug!(grace_ms = self.grace.as_millis() as u64, "commit: grace window started");
        self.grace_deadline = Some(deadline);
    }

    /// Stops the grace timer without clearing anything. Returns whether one
    /// was running.
    pub fn collapse_grace(&mut self) -> bool {
        self.grace_deadline.take().is_some()
    }

    pub fn grace_deadline(&self) -> Option<Instant> {
        self.grace_deadline
    }

    pub fn in_grace(&self) -> bool {
        self.grace_deadline.is_some()
    }

    /// True once when the running grace window has elapsed at `now`.
    pub fn take_expired(&mut self, now: Instant) -> bool {
        match self.grace_deadline {
            Some(deadline) if deadline <= now => {
                self.grace_deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn dispatched(&mut self) {
        self.in_flight += 1;
    }

    pub fn acknowledged(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}
