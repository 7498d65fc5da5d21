//! Merges the canonical order with a local pending order and plans
//! provisional moves during a drag.

use std::collections::HashSet;

use shared::domain::{CollectionContext, ItemId};

use crate::pins::PinLedger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rethreaded {
    pub order: Vec<ItemId>,
    pub dropped: usize,
}

/// Keeps pending ids the canonical list still has, in pending order, then
/// appends canonical ids the pending order never saw.
pub fn rethread(pending: &[ItemId], canonical: &[ItemId]) -> Rethreaded {
    let present: HashSet<&ItemId> = canonical.iter().collect();
    let mut seen: HashSet<&ItemId> = HashSet::with_capacity(canonical.len());
    let mut order = Vec::with_capacity(canonical.len());
    let mut dropped = 0;

    for id in pending {
        if !present.contains(id) {
            dropped += 1;
            continue;
        }
        if seen.insert(id) {
            order.push(id.clone());
        }
    }
    for id in canonical {
        if seen.insert(id) {
            order.push(id.clone());
        }
    }

    Rethreaded { order, dropped }
}

/// Stable split: pinned ids first, each group keeping its relative order.
pub fn partition_pinned(order: Vec<ItemId>, is_pinned: impl Fn(&ItemId) -> bool) -> Vec<ItemId> {
    let (mut pinned, unpinned): (Vec<_>, Vec<_>) = order.into_iter().partition(|id| is_pinned(id));
    pinned.extend(unpinned);
    pinned
}

pub fn display_order(
    canonical: &[ItemId],
    pending: Option<&[ItemId]>,
    context: &CollectionContext,
    pins: &PinLedger,
) -> Vec<ItemId> {
    let base = match pending {
        Some(pending) => rethread(pending, canonical).order,
        None => canonical.to_vec(),
    };
    match context {
        CollectionContext::AllItems => partition_pinned(base, |id| pins.is_pinned(id)),
        CollectionContext::Collection(_) => base,
    }
}

/// The order the store would show with no local overlay at all.
pub fn canonical_display_order(
    canonical: &[ItemId],
    context: &CollectionContext,
    pins: &PinLedger,
) -> Vec<ItemId> {
    match context {
        CollectionContext::AllItems => {
            partition_pinned(canonical.to_vec(), |id| pins.is_canonically_pinned(id))
        }
        CollectionContext::Collection(_) => canonical.to_vec(),
    }
}

/// Highest index a pinned item may be moved to: the last pinned slot in the
/// all-items list, or the end of a sub-collection.
pub fn max_allowed_index(
    order: &[ItemId],
    context: &CollectionContext,
    pins: &PinLedger,
) -> Option<usize> {
    match context {
        CollectionContext::AllItems => order.iter().rposition(|id| pins.is_pinned(id)),
        CollectionContext::Collection(_) => order.len().checked_sub(1),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovePlan {
    /// The move is not allowed; keep the previous pending order.
    Rejected,
    /// Allowed, but the resulting order equals the current one.
    Unchanged { pin_limit_hit: bool },
    Moved {
        order: Vec<ItemId>,
        promote: bool,
        pin_limit_hit: bool,
    },
}

/// Plans moving `dragged` towards `target_index` in `order` (the current
/// display order), honouring the pin boundary in the all-items list.
pub fn plan_move(
    order: &[ItemId],
    dragged: &ItemId,
    target_index: usize,
    context: &CollectionContext,
    pins: &PinLedger,
) -> MovePlan {
    let Some(from) = order.iter().position(|id| id == dragged) else {
        return MovePlan::Rejected;
    };
    let Some(max_index) = max_allowed_index(order, context, pins) else {
        return MovePlan::Rejected;
    };

    let mut promote = false;
    let mut pin_limit_hit = false;
    let to = match context {
        CollectionContext::Collection(_) => target_index.min(max_index),
        CollectionContext::AllItems if pins.is_pinned(dragged) => target_index.min(max_index),
        CollectionContext::AllItems => {
            if target_index > max_index {
                return MovePlan::Unchanged {
                    pin_limit_hit: false,
                };
            }
            if pins.has_capacity() {
                promote = true;
                target_index.min(max_index + 1)
            } else {
                pin_limit_hit = true;
                max_index + 1
            }
        }
    };

    if to == from {
        return MovePlan::Unchanged { pin_limit_hit };
    }

    let mut moved = order.to_vec();
    let id = moved.remove(from);
    moved.insert(to.min(moved.len()), id);

    if moved == order && !promote {
        return MovePlan::Unchanged { pin_limit_hit };
    }
    MovePlan::Moved {
        order: moved,
        promote,
        pin_limit_hit,
    }
}

/// Slot an unpinned item takes when it is promoted: right after the last
/// pinned item. `None` while nothing is pinned.
pub fn promotion_order(order: &[ItemId], id: &ItemId, pins: &PinLedger) -> Option<Vec<ItemId>> {
    let last_pinned = order.iter().rposition(|other| pins.is_pinned(other))?;
    let mut promoted: Vec<ItemId> = order.iter().filter(|other| *other != id).cloned().collect();
    let insert_at = if order.iter().position(|other| other == id)? <= last_pinned {
        last_pinned
    } else {
        last_pinned + 1
    };
    promoted.insert(insert_at.min(promoted.len()), id.clone());
    Some(promoted)
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
