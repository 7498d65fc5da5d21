use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::{CollectionId, GiftKind, ItemId};

/// One push from the item store's update stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSnapshot {
    pub order: Vec<ItemId>,
    pub pins: HashSet<ItemId>,
    #[serde(default)]
    pub membership: HashMap<CollectionId, Vec<ItemId>>,
    pub generation: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub kinds: HashMap<ItemId, GiftKind>,
}

impl CanonicalSnapshot {
    pub fn new(order: Vec<ItemId>, generation: u64) -> Self {
        Self {
            order,
            generation,
            ..Self::default()
        }
    }

    pub fn with_pins(mut self, pins: impl IntoIterator<Item = ItemId>) -> Self {
        self.pins = pins.into_iter().collect();
        self
    }

    pub fn with_collection(mut self, collection_id: CollectionId, members: Vec<ItemId>) -> Self {
        self.membership.insert(collection_id, members);
        self
    }
}

/// Durable change the engine asks the item store to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StoreMutation {
    SetPinnedOrder {
        ids: Vec<ItemId>,
    },
    SetCollectionOrder {
        collection_id: CollectionId,
        ids: Vec<ItemId>,
    },
    SetPinned {
        id: ItemId,
        pinned: bool,
    },
}

impl StoreMutation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetPinnedOrder { .. } => "set_pinned_order",
            Self::SetCollectionOrder { .. } => "set_collection_order",
            Self::SetPinned { .. } => "set_pinned",
        }
    }
}
