//! Pin/unpin bookkeeping against the capacity bound.
//!
//! The effective pin set is the canonical pins with the local overlay of
//! requests the store has not confirmed yet applied on top. Every capacity
//! check runs against the effective set.

use std::collections::{HashMap, HashSet};

use shared::domain::ItemId;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinError {
    #[error("pin limit of {limit} items reached")]
    PinLimitExceeded { limit: usize },
    #[error("item {0} is not in the current list")]
    UnknownItem(ItemId),
    #[error("item {0} is not pinned")]
    NotPinned(ItemId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinChange {
    Changed,
    Unchanged,
}

/// Saved local overlay, restored when a drag is cancelled.
pub type PinOverlay = HashMap<ItemId, bool>;

#[derive(Debug, Clone)]
pub struct PinLedger {
    max_pinned: usize,
    canonical: HashSet<ItemId>,
    local: PinOverlay,
}

impl PinLedger {
    pub fn new(max_pinned: usize) -> Self {
        Self {
            max_pinned,
            canonical: HashSet::new(),
            local: HashMap::new(),
        }
    }

    pub fn max_pinned(&self) -> usize {
        self.max_pinned
    }

    /// Takes the store's pins, keeping at most `max_pinned` in canonical
    /// order, then prunes overlay entries the store confirmed or no longer
    /// knows about. Local additions that no longer fit are dropped, the ones
    /// latest in `display` first, then any left off screen from the end of
    /// `order`.
    pub fn apply_canonical(
        &mut self,
        pins: &HashSet<ItemId>,
        order: &[ItemId],
        display: &[ItemId],
    ) {
        let mut canonical = HashSet::with_capacity(pins.len().min(self.max_pinned));
        for id in order.iter().filter(|id| pins.contains(*id)) {
            if canonical.len() == self.max_pinned {
                warn!(
                    pinned = pins.len(),
                    limit = self.max_pinned,
                    "store: canonical pins exceed limit; truncating"
                );
                break;
            }
            canonical.insert(id.clone());
        }
        self.canonical = canonical;

        let present: HashSet<&ItemId> = order.iter().collect();
        let canonical = &self.canonical;
        self.local
            .retain(|id, pinned| present.contains(id) && canonical.contains(id) != *pinned);

        let mut overflow = self.pinned_count().saturating_sub(self.max_pinned);
        if overflow > 0 {
            for id in display.iter().rev().chain(order.iter().rev()) {
                if overflow == 0 {
                    break;
                }
                if self.local.get(id) == Some(&true) {
                    debug!(item = %id, "reorder: dropping local pin that no longer fits");
                    self.local.remove(id);
                    overflow -= 1;
                }
            }
        }
    }

    pub fn is_pinned(&self, id: &ItemId) -> bool {
        match self.local.get(id) {
            Some(pinned) => *pinned,
            None => self.canonical.contains(id),
        }
    }

    pub fn is_canonically_pinned(&self, id: &ItemId) -> bool {
        self.canonical.contains(id)
    }

    pub fn pinned_count(&self) -> usize {
        let removed = self
            .local
            .iter()
            .filter(|(id, pinned)| !**pinned && self.canonical.contains(*id))
            .count();
        let added = self
            .local
            .iter()
            .filter(|(id, pinned)| **pinned && !self.canonical.contains(*id))
            .count();
        self.canonical.len() - removed + added
    }

    pub fn has_capacity(&self) -> bool {
        self.pinned_count() < self.max_pinned
    }

    /// Effective pins in the order they appear in `order`.
    pub fn pinned_in(&self, order: &[ItemId]) -> Vec<ItemId> {
        order.iter().filter(|id| self.is_pinned(id)).cloned().collect()
    }

    pub fn request_pin(&mut self, id: &ItemId) -> Result<PinChange, PinError> {
        if self.is_pinned(id) {
            return Ok(PinChange::Unchanged);
        }
        if !self.has_capacity() {
            return Err(PinError::PinLimitExceeded {
                limit: self.max_pinned,
            });
        }
        self.set_local(id, true);
        Ok(PinChange::Changed)
    }

    pub fn request_unpin(&mut self, id: &ItemId) -> PinChange {
        if !self.is_pinned(id) {
            return PinChange::Unchanged;
        }
        self.set_local(id, false);
        PinChange::Changed
    }

    pub fn overlay(&self) -> PinOverlay {
        self.local.clone()
    }

    pub fn restore_overlay(&mut self, overlay: PinOverlay) {
        self.local = overlay;
    }

    pub fn clear_overlay(&mut self) {
        self.local.clear();
    }

    pub fn has_overlay(&self) -> bool {
        !self.local.is_empty()
    }

    fn set_local(&mut self, id: &ItemId, pinned: bool) {
        if self.canonical.contains(id) == pinned {
            self.local.remove(id);
        } else {
            self.local.insert(id.clone(), pinned);
        }
    }
}
