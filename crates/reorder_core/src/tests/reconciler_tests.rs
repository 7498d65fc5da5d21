use std::collections::HashSet;

use shared::domain::CollectionId;

use super::*;

fn id(name: &str) -> ItemId {
    ItemId::slug(name)
}

fn ids(names: &[&str]) -> Vec<ItemId> {
    names.iter().map(|name| id(name)).collect()
}

fn ledger(max: usize, pinned: &[&str], order: &[&str]) -> PinLedger {
    let mut ledger = PinLedger::new(max);
    let pins: HashSet<ItemId> = ids(pinned).into_iter().collect();
    ledger.apply_canonical(&pins, &ids(order), &[]);
    ledger
}

fn is_permutation(a: &[ItemId], b: &[ItemId]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

#[test]
fn rethread_keeps_pending_order_and_appends_new_ids() {
    let result = rethread(&ids(&["c", "a", "b"]), &ids(&["a", "b", "c", "d"]));
    assert_eq!(result.order, ids(&["c", "a", "b", "d"]));
    assert_eq!(result.dropped, 0);
}

#[test]
fn rethread_drops_ids_removed_by_the_store() {
    let result = rethread(&ids(&["c", "b", "a", "d"]), &ids(&["a", "c", "d"]));
    assert_eq!(result.order, ids(&["c", "a", "d"]));
    assert_eq!(result.dropped, 1);
}

#[test]
fn display_without_pending_puts_pinned_first() {
    let order = ["a", "b", "c", "d"];
    let pins = ledger(6, &["c", "a"], &order);
    assert_eq!(
        display_order(&ids(&order), None, &CollectionContext::AllItems, &pins),
        ids(&["a", "c", "b", "d"])
    );
}

#[test]
fn collection_display_ignores_pins() {
    let order = ["a", "b", "c"];
    let pins = ledger(6, &["c"], &order);
    let context = CollectionContext::Collection(CollectionId(1));
    assert_eq!(
        display_order(&ids(&order), None, &context, &pins),
        ids(&["a", "b", "c"])
    );
}

#[test]
fn new_pinned_item_lands_at_end_of_pinned_block_under_pending() {
    let order = ["a", "b", "x", "c", "d"];
    let pins = ledger(6, &["a", "b", "x"], &order);
    let pending = ids(&["b", "a", "c", "d"]);
    assert_eq!(
        display_order(&ids(&order), Some(&pending), &CollectionContext::AllItems, &pins),
        ids(&["b", "a", "x", "c", "d"])
    );
}

#[test]
fn display_is_always_a_permutation_of_canonical() {
    let canonical = ids(&["a", "b", "c", "d", "e"]);
    let pins = ledger(2, &["b"], &["a", "b", "c", "d", "e"]);
    let pendings = [
        ids(&[]),
        ids(&["e", "d"]),
        ids(&["z", "a", "a", "y"]),
        ids(&["e", "d", "c", "b", "a"]),
    ];
    for pending in &pendings {
        for context in [
            CollectionContext::AllItems,
            CollectionContext::Collection(CollectionId(3)),
        ] {
            let first = display_order(&canonical, Some(pending), &context, &pins);
            let second = display_order(&canonical, Some(pending), &context, &pins);
            assert!(is_permutation(&first, &canonical), "{pending:?} -> {first:?}");
            assert_eq!(first, second);
        }
    }
}

#[test]
fn pinned_item_cannot_cross_the_pin_boundary() {
    let order = ["a", "b", "c", "d"];
    let pins = ledger(6, &["a", "b"], &order);
    let plan = plan_move(&ids(&order), &id("a"), 3, &CollectionContext::AllItems, &pins);
    assert_eq!(
        plan,
        MovePlan::Moved {
            order: ids(&["b", "a", "c", "d"]),
            promote: false,
            pin_limit_hit: false,
        }
    );
}

#[test]
fn unpinned_item_into_full_pin_block_is_clamped_after_last_pinned() {
    let order = ["a", "b", "c", "d"];
    let pins = ledger(2, &["a", "b"], &order);
    let plan = plan_move(&ids(&order), &id("c"), 0, &CollectionContext::AllItems, &pins);
    assert_eq!(plan, MovePlan::Unchanged { pin_limit_hit: true });

    let plan = plan_move(&ids(&order), &id("d"), 0, &CollectionContext::AllItems, &pins);
    assert_eq!(
        plan,
        MovePlan::Moved {
            order: ids(&["a", "b", "d", "c"]),
            promote: false,
            pin_limit_hit: true,
        }
    );
}

#[test]
fn unpinned_item_into_pin_block_with_capacity_is_promoted() {
    let order = ["a", "b", "c", "d"];
    let pins = ledger(3, &["a", "b"], &order);
    let plan = plan_move(&ids(&order), &id("d"), 1, &CollectionContext::AllItems, &pins);
    assert_eq!(
        plan,
        MovePlan::Moved {
            order: ids(&["a", "d", "b", "c"]),
            promote: true,
            pin_limit_hit: false,
        }
    );
}

#[test]
fn unpinned_item_within_unpinned_region_stays_put() {
    let order = ["a", "b", "c", "d"];
    let pins = ledger(3, &["a"], &order);
    let plan = plan_move(&ids(&order), &id("b"), 3, &CollectionContext::AllItems, &pins);
    assert_eq!(plan, MovePlan::Unchanged { pin_limit_hit: false });
}

#[test]
fn move_without_any_pinned_item_is_rejected() {
    let order = ["a", "b", "c"];
    let pins = ledger(3, &[], &order);
    let plan = plan_move(&ids(&order), &id("c"), 0, &CollectionContext::AllItems, &pins);
    assert_eq!(plan, MovePlan::Rejected);
}

#[test]
fn target_equal_to_current_index_does_nothing() {
    let order = ["a", "b", "c"];
    let pins = ledger(3, &["a", "b", "c"], &order);
    let plan = plan_move(&ids(&order), &id("b"), 1, &CollectionContext::AllItems, &pins);
    assert_eq!(plan, MovePlan::Unchanged { pin_limit_hit: false });
}

#[test]
fn collection_moves_are_bounded_by_list_end() {
    let order = ["a", "b", "c"];
    let pins = ledger(3, &[], &order);
    let context = CollectionContext::Collection(CollectionId(5));
    assert_eq!(
        plan_move(&ids(&order), &id("a"), 10, &context, &pins),
        MovePlan::Moved {
            order: ids(&["b", "c", "a"]),
            promote: false,
            pin_limit_hit: false,
        }
    );
    assert_eq!(
        plan_move(&ids(&order), &id("c"), 0, &context, &pins),
        MovePlan::Moved {
            order: ids(&["c", "a", "b"]),
            promote: false,
            pin_limit_hit: false,
        }
    );
}

#[test]
fn unknown_dragged_item_is_rejected() {
    let order = ["a", "b"];
    let pins = ledger(3, &["a"], &order);
    assert_eq!(
        plan_move(&ids(&order), &id("zz"), 0, &CollectionContext::AllItems, &pins),
        MovePlan::Rejected
    );
}

#[test]
fn promotion_inserts_after_last_pinned() {
    let order = ["a", "b", "c", "d"];
    let pins = ledger(3, &["a", "b"], &order);
    assert_eq!(
        promotion_order(&ids(&order), &id("d"), &pins),
        Some(ids(&["a", "b", "d", "c"]))
    );

    let none_pinned = ledger(3, &[], &order);
    assert_eq!(promotion_order(&ids(&order), &id("d"), &none_pinned), None);
}
