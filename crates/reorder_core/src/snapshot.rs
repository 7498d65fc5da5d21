//! Canonical and pending list representations.

use std::collections::{HashMap, HashSet};

use shared::{
    domain::{CollectionContext, CollectionId, GiftKind, ItemId},
    protocol::CanonicalSnapshot,
};
use tracing::warn;

/// Local override of the canonical order while a reorder is in flight.
pub type PendingOrder = Vec<ItemId>;

/// Last server-confirmed state, normalised for lookups.
#[derive(Debug, Clone, Default)]
pub struct CanonicalOrder {
    generation: u64,
    order: Vec<ItemId>,
    present: HashSet<ItemId>,
    pins: HashSet<ItemId>,
    membership: HashMap<CollectionId, Vec<ItemId>>,
    kinds: HashMap<ItemId, GiftKind>,
}

impl CanonicalOrder {
    pub fn from_snapshot(snapshot: CanonicalSnapshot) -> Self {
        let CanonicalSnapshot {
            order: raw_order,
            pins,
            membership,
            generation,
            kinds,
        } = snapshot;

        let mut present = HashSet::with_capacity(raw_order.len());
        let mut order = Vec::with_capacity(raw_order.len());
        for id in raw_order {
            if present.insert(id.clone()) {
                order.push(id);
            } else {
                warn!(generation, item = %id, "store: duplicate id in canonical order collapsed");
            }
        }

        let pins = pins.into_iter().filter(|id| present.contains(id)).collect();

        Self {
            generation,
            order,
            present,
            pins,
            membership,
            kinds,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn order(&self) -> &[ItemId] {
        &self.order
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.present.contains(id)
    }

    pub fn pins(&self) -> &HashSet<ItemId> {
        &self.pins
    }

    pub fn kind(&self, id: &ItemId) -> Option<&GiftKind> {
        self.kinds.get(id)
    }

    /// Ids the given context lists, in canonical order. A sub-collection
    /// lists its membership, restricted to items the store still has.
    pub fn ids_for(&self, context: &CollectionContext) -> Vec<ItemId> {
        match context {
            CollectionContext::AllItems => self.order.clone(),
            CollectionContext::Collection(collection_id) => {
                let Some(members) = self.membership.get(collection_id) else {
                    return Vec::new();
                };
                let mut seen = HashSet::with_capacity(members.len());
                members
                    .iter()
                    .filter(|id| self.present.contains(*id) && seen.insert(*id))
                    .cloned()
                    .collect()
            }
        }
    }
}
