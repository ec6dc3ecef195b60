//! The TTL-guarded cart store.
//!
//! The cart is the sole mutation surface for order lines: no other code path
//! may touch lines directly. Aggregates are always recomputed by full
//! reduction over the lines, never incrementally, so repeated reads are
//! stable regardless of when they land relative to the sweeper.
//!
//! Expiry is lazy-first: every read and write checks the deadline and resets
//! an elapsed cart to empty before proceeding. A periodic sweep is only a
//! backstop. Two reads separated by the expiry boundary can therefore
//! observe a non-monotonic drop to empty; that is the abandoned-cart policy,
//! not a bug.

use crate::clock::Clock;
use crate::event::{CartActionKind, EventPayload};
use crate::tracker::EventTracker;
use crate::types::{Money, Timestamp};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// How long an untouched cart survives. Refreshed on every add.
pub const CART_TTL: Duration = Duration::from_secs(30 * 60);

/// Backstop sweep interval.
pub const CART_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A menu item as handed to the cart by the ordering UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    /// The menu item's id in the restaurant's catalog.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Base price of one unit, before modifiers.
    pub unit_price: Money,
}

/// One chosen modifier, e.g. `size: large`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModifierSelection {
    /// The modifier group, e.g. `"size"`.
    pub group: String,
    /// The chosen option, e.g. `"large"`.
    pub option: String,
    /// Price delta this option adds to one unit.
    #[serde(default)]
    pub price_adjustment: Money,
}

/// One cart line: a menu item in a specific modifier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Composite key derived from the item id and the sorted modifier set.
    pub id: String,
    /// The underlying menu item id.
    pub menu_item_id: u64,
    /// Display name.
    pub name: String,
    /// Price of one unit with modifiers applied.
    pub unit_price: Money,
    /// The modifier selections, sorted.
    pub modifiers: Vec<ModifierSelection>,
    /// How many units of this configuration.
    pub quantity: u32,
    /// `unit_price * quantity`, recomputed from scratch on every mutation.
    pub total_price: Money,
}

/// A read snapshot of the whole cart.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CartSnapshot {
    /// The lines, in insertion order.
    pub lines: Vec<CartLine>,
    /// `Σ line.quantity`.
    pub total_items: u32,
    /// `Σ line.total_price`.
    pub total_price: Money,
    /// When the cart was last mutated.
    pub last_updated: Option<Timestamp>,
    /// When the cart expires; `None` once expired or never touched.
    pub expires_at: Option<Timestamp>,
}

#[derive(Debug, Default)]
struct CartState {
    lines: Vec<CartLine>,
    total_items: u32,
    total_price: Money,
    last_updated: Option<Timestamp>,
    expires_at: Option<Timestamp>,
}

impl CartState {
    /// Recomputes both aggregates by full reduction over the lines.
    fn reduce(&mut self) {
        self.total_items = self.lines.iter().map(|l| l.quantity).sum();
        self.total_price = self.lines.iter().map(|l| l.total_price).sum();
    }
}

/// The cart store.
pub struct CartStore {
    state: Mutex<CartState>,
    clock: Arc<dyn Clock>,
    tracker: RwLock<Option<EventTracker>>,
}

impl CartStore {
    /// Creates an empty cart over the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CartState::default()),
            clock,
            tracker: RwLock::new(None),
        }
    }

    /// Attaches the tracker that observes cart mutations.
    pub fn set_tracker(&self, tracker: EventTracker) {
        *self.tracker.write() = Some(tracker);
    }

    /// Adds `quantity` units of `item` in the given modifier configuration.
    ///
    /// Two selections of the same options in different input order collapse
    /// to the same line; a colliding add merges quantity and recomputes the
    /// line total from the unit price, never by incrementing the old total.
    /// Every add refreshes the cart's expiry deadline.
    pub fn add_item(&self, item: &MenuItem, modifiers: &[ModifierSelection], quantity: u32) {
        if quantity == 0 {
            return;
        }
        let name = item.name.clone();
        let (total_items, total_price, expired) = {
            let mut state = self.state.lock();
            let expired = Self::expire_if_due(&mut state, self.clock.now());

            let mut sorted = modifiers.to_vec();
            sorted.sort();
            let key = line_key(item.id, &sorted);
            let unit_price = sorted
                .iter()
                .fold(item.unit_price, |p, m| p + m.price_adjustment);

            if let Some(line) = state.lines.iter_mut().find(|l| l.id == key) {
                line.quantity = line.quantity.saturating_add(quantity);
                line.total_price = line.unit_price.times(line.quantity);
            } else {
                state.lines.push(CartLine {
                    id: key,
                    menu_item_id: item.id,
                    name: item.name.clone(),
                    unit_price,
                    modifiers: sorted,
                    quantity,
                    total_price: unit_price.times(quantity),
                });
            }

            state.reduce();
            let now = self.clock.now();
            state.last_updated = Some(now);
            state.expires_at = Some(now.plus(CART_TTL));
            (state.total_items, state.total_price, expired)
        };

        if expired {
            self.emit_expired();
        }
        self.emit(CartActionKind::ItemAdded, Some(name), total_items, total_price);
    }

    /// Removes the line with the given composite id, if present.
    pub fn remove_item(&self, id: &str) {
        let (removed, expired) = {
            let mut state = self.state.lock();
            let expired = Self::expire_if_due(&mut state, self.clock.now());

            let position = state.lines.iter().position(|l| l.id == id);
            let removed = position.map(|i| state.lines.remove(i));
            if removed.is_some() {
                state.reduce();
                state.last_updated = Some(self.clock.now());
            }
            (
                removed.map(|line| (line.name, state.total_items, state.total_price)),
                expired,
            )
        };

        if expired {
            self.emit_expired();
        }
        if let Some((name, total_items, total_price)) = removed {
            self.emit(
                CartActionKind::ItemRemoved,
                Some(name),
                total_items,
                total_price,
            );
        }
    }

    /// Sets the quantity of the line with the given id.
    ///
    /// A quantity of zero delegates to [`remove_item`](Self::remove_item);
    /// removal is a degenerate update, not a caller-visible special case.
    pub fn update_quantity(&self, id: &str, quantity: u32) {
        if quantity == 0 {
            self.remove_item(id);
            return;
        }
        let (updated, expired) = {
            let mut state = self.state.lock();
            let expired = Self::expire_if_due(&mut state, self.clock.now());

            let updated = state.lines.iter_mut().find(|l| l.id == id).map(|line| {
                line.quantity = quantity;
                line.total_price = line.unit_price.times(quantity);
                line.name.clone()
            });
            if updated.is_some() {
                state.reduce();
                state.last_updated = Some(self.clock.now());
            }
            (
                updated.map(|name| (name, state.total_items, state.total_price)),
                expired,
            )
        };

        if expired {
            self.emit_expired();
        }
        if let Some((name, total_items, total_price)) = updated {
            self.emit(
                CartActionKind::QuantityChanged,
                Some(name),
                total_items,
                total_price,
            );
        }
    }

    /// A snapshot of the whole cart.
    pub fn cart(&self) -> CartSnapshot {
        self.read(|state| CartSnapshot {
            lines: state.lines.clone(),
            total_items: state.total_items,
            total_price: state.total_price,
            last_updated: state.last_updated,
            expires_at: state.expires_at,
        })
    }

    /// `Σ line.quantity` after expiry enforcement.
    pub fn total_items(&self) -> u32 {
        self.read(|state| state.total_items)
    }

    /// `Σ line.total_price` after expiry enforcement.
    pub fn total_price(&self) -> Money {
        self.read(|state| state.total_price)
    }

    /// The display names of the lines, in insertion order.
    pub fn item_names(&self) -> Vec<String> {
        self.read(|state| state.lines.iter().map(|l| l.name.clone()).collect())
    }

    /// Runs one backstop expiry pass.
    pub fn sweep(&self) {
        let expired = {
            let mut state = self.state.lock();
            Self::expire_if_due(&mut state, self.clock.now())
        };
        if expired {
            self.emit_expired();
        }
    }

    /// Spawns the 60-second backstop sweeper.
    ///
    /// The task holds a weak reference; it exits when the store is dropped.
    pub fn spawn_sweeper(store: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(store);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CART_SWEEP_INTERVAL);
            interval.tick().await; // first tick is immediate
            loop {
                interval.tick().await;
                let Some(store) = weak.upgrade() else {
                    return;
                };
                store.sweep();
            }
        })
    }

    /// Applies lazy expiry, then reads through `f`.
    fn read<T>(&self, f: impl FnOnce(&CartState) -> T) -> T {
        let (value, expired) = {
            let mut state = self.state.lock();
            let expired = Self::expire_if_due(&mut state, self.clock.now());
            (f(&state), expired)
        };
        if expired {
            self.emit_expired();
        }
        value
    }

    /// Resets the cart to empty once the deadline is reached (inclusive).
    fn expire_if_due(state: &mut CartState, now: Timestamp) -> bool {
        let due = state.expires_at.is_some_and(|deadline| now >= deadline);
        if due {
            debug!("cart expired; resetting to empty");
            *state = CartState::default();
        }
        due
    }

    fn emit_expired(&self) {
        self.emit(CartActionKind::CartExpired, None, 0, Money::ZERO);
    }

    fn emit(
        &self,
        action: CartActionKind,
        item_name: Option<String>,
        total_items: u32,
        total_price: Money,
    ) {
        if let Some(tracker) = self.tracker.read().as_ref() {
            tracker.track(EventPayload::CartAction {
                action,
                item_name,
                total_items,
                total_price,
            });
        }
    }
}

/// Composite line key: item id plus the sorted `"group:option"` selections.
fn line_key(menu_item_id: u64, sorted_modifiers: &[ModifierSelection]) -> String {
    if sorted_modifiers.is_empty() {
        return menu_item_id.to_string();
    }
    let parts: Vec<String> = sorted_modifiers
        .iter()
        .map(|m| format!("{}:{}", m.group, m.option))
        .collect();
    format!("{}-{}", menu_item_id, parts.join("|"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    fn store() -> (CartStore, ManualClock) {
        let clock = ManualClock::new();
        (CartStore::new(Arc::new(clock.clone())), clock)
    }

    fn dish(id: u64, cents: u64) -> MenuItem {
        MenuItem {
            id,
            name: format!("dish-{id}"),
            unit_price: Money::from_cents(cents),
        }
    }

    fn modifier(group: &str, option: &str) -> ModifierSelection {
        ModifierSelection {
            group: group.to_string(),
            option: option.to_string(),
            price_adjustment: Money::ZERO,
        }
    }

    #[test]
    fn same_dish_merges_quantity_and_recomputes_total() {
        let (store, _clock) = store();
        let item = dish(5, 1000);

        store.add_item(&item, &[], 1);
        store.add_item(&item, &[], 2);

        let cart = store.cart();
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].quantity, 3);
        assert_eq!(cart.lines[0].total_price, Money::from_cents(3000));
        assert_eq!(cart.total_items, 3);
        assert_eq!(cart.total_price, Money::from_cents(3000));
    }

    #[test]
    fn modifier_order_does_not_affect_the_line_key() {
        let (store, _clock) = store();
        let item = dish(7, 500);
        let a = [modifier("size", "large"), modifier("sauce", "bbq")];
        let b = [modifier("sauce", "bbq"), modifier("size", "large")];

        store.add_item(&item, &a, 1);
        store.add_item(&item, &b, 1);

        let cart = store.cart();
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].quantity, 2);
    }

    #[test]
    fn different_modifier_sets_stay_separate_lines() {
        let (store, _clock) = store();
        let item = dish(7, 500);

        store.add_item(&item, &[modifier("size", "large")], 1);
        store.add_item(&item, &[modifier("size", "small")], 1);

        assert_eq!(store.cart().lines.len(), 2);
    }

    #[test]
    fn modifier_price_adjustments_apply_per_unit() {
        let (store, _clock) = store();
        let item = dish(3, 1000);
        let extra = ModifierSelection {
            group: "extra".to_string(),
            option: "cheese".to_string(),
            price_adjustment: Money::from_cents(150),
        };

        store.add_item(&item, &[extra], 2);

        let cart = store.cart();
        assert_eq!(cart.lines[0].unit_price, Money::from_cents(1150));
        assert_eq!(cart.total_price, Money::from_cents(2300));
    }

    #[test]
    fn update_quantity_zero_removes_the_line() {
        let (store, _clock) = store();
        let item = dish(5, 1000);
        store.add_item(&item, &[], 2);
        let id = store.cart().lines[0].id.clone();

        store.update_quantity(&id, 0);

        assert!(store.cart().lines.is_empty());
        assert_eq!(store.total_items(), 0);
        assert_eq!(store.total_price(), Money::ZERO);
    }

    #[test]
    fn reads_before_the_deadline_see_prior_state() {
        let (store, clock) = store();
        store.add_item(&dish(1, 800), &[], 1);

        clock.advance(CART_TTL - Duration::from_secs(1));
        assert_eq!(store.total_items(), 1);
    }

    #[test]
    fn the_deadline_itself_is_expired() {
        let (store, clock) = store();
        store.add_item(&dish(1, 800), &[], 1);

        // Inclusive boundary: a read at exactly `expires_at` sees nothing.
        clock.advance(CART_TTL);
        assert_eq!(store.total_items(), 0);
        assert!(store.cart().lines.is_empty());
    }

    #[test]
    fn reads_after_the_deadline_observe_an_empty_cart() {
        let (store, clock) = store();
        store.add_item(&dish(1, 800), &[], 1);

        clock.advance(CART_TTL + Duration::from_secs(1));
        let cart = store.cart();
        assert!(cart.lines.is_empty());
        assert_eq!(cart.total_items, 0);
        assert_eq!(cart.expires_at, None);
    }

    #[test]
    fn every_add_refreshes_the_deadline() {
        let (store, clock) = store();
        store.add_item(&dish(1, 800), &[], 1);

        clock.advance(Duration::from_secs(25 * 60));
        store.add_item(&dish(2, 300), &[], 1);

        // 29 minutes past the second add: still alive.
        clock.advance(Duration::from_secs(29 * 60));
        assert_eq!(store.total_items(), 2);

        clock.advance(Duration::from_secs(2 * 60));
        assert_eq!(store.total_items(), 0);
    }

    #[test]
    fn sweep_resets_an_expired_cart() {
        let (store, clock) = store();
        store.add_item(&dish(1, 800), &[], 1);
        clock.advance(CART_TTL + Duration::from_secs(5));

        store.sweep();

        // Inspect without triggering lazy expiry semantics: already swept.
        assert!(store.cart().lines.is_empty());
    }

    proptest! {
        #[test]
        fn aggregates_always_equal_full_reduction(
            ops in prop::collection::vec(
                (0u64..5, 1u32..4, prop_oneof![Just("add"), Just("remove"), Just("update")]),
                1..40,
            )
        ) {
            let (store, _clock) = store();
            for (id, qty, op) in ops {
                match op {
                    "add" => store.add_item(&dish(id, (id + 1) * 100), &[], qty),
                    "remove" => store.remove_item(&id.to_string()),
                    _ => store.update_quantity(&id.to_string(), qty),
                }

                let cart = store.cart();
                let items: u32 = cart.lines.iter().map(|l| l.quantity).sum();
                let price: Money = cart.lines.iter().map(|l| l.total_price).sum();
                prop_assert_eq!(cart.total_items, items);
                prop_assert_eq!(cart.total_price, price);
                for line in &cart.lines {
                    prop_assert_eq!(line.total_price, line.unit_price.times(line.quantity));
                }
            }
        }

        #[test]
        fn colliding_adds_are_commutative_in_quantity(
            quantities in prop::collection::vec(1u32..10, 1..10)
        ) {
            let (store, _clock) = store();
            let item = dish(9, 750);
            for q in &quantities {
                store.add_item(&item, &[], *q);
            }

            let total: u32 = quantities.iter().sum();
            let cart = store.cart();
            prop_assert_eq!(cart.lines.len(), 1);
            prop_assert_eq!(cart.lines[0].quantity, total);
            prop_assert_eq!(cart.total_price, Money::from_cents(750).times(total));
        }
    }
}
