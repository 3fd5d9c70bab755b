use std::collections::HashMap;

use crate::entities::stats::{Modifier, ModifierId, ModifierOp, Stat};
use crate::world::time::Timestamp;

#[derive(Debug, Clone, Default)]
struct StatSlot {
    modifiers: Vec<Modifier>,
    cached: Option<f64>,
    dirty: bool,
    /// Earliest expiry among `modifiers`; the cache is stale from then on.
    next_expiry: Option<Timestamp>,
}

impl StatSlot {
    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.cached = None;
    }

    fn refresh_next_expiry(&mut self) {
        self.next_expiry = self.modifiers.iter().filter_map(|m| m.expires_at).min();
    }

    fn evict_expired(&mut self, now: Timestamp) -> Vec<Modifier> {
        if !self.next_expiry.is_some_and(|at| now >= at) {
            return Vec::new();
        }
        let (expired, live): (Vec<Modifier>, Vec<Modifier>) = self
            .modifiers
            .drain(..)
            .partition(|modifier| modifier.is_expired(now));
        self.modifiers = live;
        self.refresh_next_expiry();
        if !expired.is_empty() {
            self.mark_dirty();
        }
        expired
    }
}

/// Per-character modifier lists with a memoized value per stat.
///
/// Reads take `&mut self`: computing a stat may evict expired modifiers and
/// always refreshes the cache.
#[derive(Debug, Clone, Default)]
pub struct StatModifierStore {
    base: HashMap<Stat, f64>,
    slots: HashMap<Stat, StatSlot>,
}

impl StatModifierStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bases(bases: impl IntoIterator<Item = (Stat, f64)>) -> Self {
        let mut store = Self::new();
        for (stat, value) in bases {
            store.set_base(stat, value);
        }
        store
    }

    pub fn base(&self, stat: Stat) -> f64 {
        self.base.get(&stat).copied().unwrap_or(0.0)
    }

    pub fn set_base(&mut self, stat: Stat, value: f64) {
        self.base.insert(stat, value);
        self.slots.entry(stat).or_default().mark_dirty();
    }

    pub fn add_modifier(&mut self, modifier: Modifier) {
        let slot = self.slots.entry(modifier.stat).or_default();
        if let Some(expires_at) = modifier.expires_at {
            slot.next_expiry = Some(slot.next_expiry.map_or(expires_at, |at| at.min(expires_at)));
        }
        slot.modifiers.push(modifier);
        slot.mark_dirty();
    }

    /// Removes a modifier wherever it lives. Every stat is scanned because a
    /// modifier's stat is not indexed by id.
    pub fn remove_modifier(&mut self, id: ModifierId) -> Option<Modifier> {
        let mut removed = None;
        for slot in self.slots.values_mut() {
            if let Some(index) = slot.modifiers.iter().position(|m| m.id == id) {
                removed = Some(slot.modifiers.remove(index));
                slot.refresh_next_expiry();
                slot.mark_dirty();
            }
        }
        removed
    }

    pub fn contains(&self, id: ModifierId) -> bool {
        self.slots
            .values()
            .any(|slot| slot.modifiers.iter().any(|m| m.id == id))
    }

    /// Effective value of `stat` at `now`.
    ///
    /// OVERRIDE wins outright (highest priority, earliest added on ties);
    /// otherwise `(base + sum(ADD)) * product(MULTIPLY)`. Expired modifiers
    /// are evicted before computing, even when a cached value exists.
    pub fn stat(&mut self, stat: Stat, now: Timestamp) -> f64 {
        let base = self.base(stat);
        let Some(slot) = self.slots.get_mut(&stat) else {
            return base;
        };
        slot.evict_expired(now);
        if !slot.dirty {
            if let Some(cached) = slot.cached {
                return cached;
            }
        }

        let value = compute(base, &slot.modifiers);
        slot.cached = Some(value);
        slot.dirty = false;
        value
    }

    /// Drops every expired modifier across all stats and returns them.
    pub fn evict_expired(&mut self, now: Timestamp) -> Vec<Modifier> {
        let mut evicted = Vec::new();
        for slot in self.slots.values_mut() {
            evicted.extend(slot.evict_expired(now));
        }
        evicted
    }

    pub fn modifiers(&self) -> impl Iterator<Item = &Modifier> {
        self.slots.values().flat_map(|slot| slot.modifiers.iter())
    }

    pub fn modifiers_for(&self, stat: Stat) -> &[Modifier] {
        self.slots
            .get(&stat)
            .map(|slot| slot.modifiers.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.slots.values().map(|slot| slot.modifiers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn compute(base: f64, modifiers: &[Modifier]) -> f64 {
    let mut winner: Option<&Modifier> = None;
    for modifier in modifiers.iter().filter(|m| m.op == ModifierOp::Override) {
        if winner.map_or(true, |best| modifier.priority > best.priority) {
            winner = Some(modifier);
        }
    }
    if let Some(winner) = winner {
        return winner.value;
    }

    let mut added = base;
    let mut factor = 1.0;
    for modifier in modifiers {
        match modifier.op {
            ModifierOp::Add => added += modifier.value,
            ModifierOp::Multiply => factor *= modifier.value,
            ModifierOp::Override => {}
        }
    }
    added * factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(stat: Stat, base: f64) -> StatModifierStore {
        StatModifierStore::with_bases([(stat, base)])
    }

    #[test]
    fn base_value_without_modifiers() {
        let mut store = store_with(Stat::Strength, 14.0);
        assert_eq!(store.stat(Stat::Strength, Timestamp(0)), 14.0);
        assert_eq!(store.stat(Stat::Wisdom, Timestamp(0)), 0.0);
    }

    #[test]
    fn add_then_multiply() {
        let mut store = store_with(Stat::Armor, 10.0);
        store.add_modifier(Modifier::new("bless", Stat::Armor, ModifierOp::Add, 5.0));
        store.add_modifier(Modifier::new("haste", Stat::Armor, ModifierOp::Multiply, 2.0));
        assert_eq!(store.stat(Stat::Armor, Timestamp(0)), 30.0);
    }

    #[test]
    fn highest_priority_override_wins() {
        let mut store = store_with(Stat::Armor, 10.0);
        store.add_modifier(Modifier::new("bless", Stat::Armor, ModifierOp::Add, 5.0).with_priority(1));
        store.add_modifier(Modifier::new("x2", Stat::Armor, ModifierOp::Multiply, 2.0).with_priority(1));
        store.add_modifier(Modifier::new("weak", Stat::Armor, ModifierOp::Override, 3.0).with_priority(2));
        store.add_modifier(Modifier::new("stone", Stat::Armor, ModifierOp::Override, 10.0).with_priority(9));
        assert_eq!(store.stat(Stat::Armor, Timestamp(0)), 10.0);
    }

    #[test]
    fn override_tie_keeps_first_added() {
        let mut store = store_with(Stat::Will, 1.0);
        store.add_modifier(Modifier::new("a", Stat::Will, ModifierOp::Override, 4.0));
        store.add_modifier(Modifier::new("b", Stat::Will, ModifierOp::Override, 8.0));
        assert_eq!(store.stat(Stat::Will, Timestamp(0)), 4.0);
    }

    #[test]
    fn expired_modifier_excluded_even_when_cached() {
        let mut store = store_with(Stat::Dexterity, 10.0);
        store.add_modifier(
            Modifier::new("cat grace", Stat::Dexterity, ModifierOp::Add, 4.0)
                .expiring_at(Timestamp(5_000)),
        );
        assert_eq!(store.stat(Stat::Dexterity, Timestamp(1_000)), 14.0);
        assert_eq!(store.stat(Stat::Dexterity, Timestamp(5_000)), 10.0);
        assert!(store.modifiers_for(Stat::Dexterity).is_empty());
    }

    #[test]
    fn cached_value_reused_until_change() {
        let mut store = store_with(Stat::Reflex, 2.0);
        store.add_modifier(Modifier::new("a", Stat::Reflex, ModifierOp::Add, 1.0));
        assert_eq!(store.stat(Stat::Reflex, Timestamp(0)), 3.0);
        assert_eq!(store.stat(Stat::Reflex, Timestamp(10)), 3.0);
        store.set_base(Stat::Reflex, 5.0);
        assert_eq!(store.stat(Stat::Reflex, Timestamp(10)), 6.0);
    }

    #[test]
    fn remove_modifier_marks_stat_dirty() {
        let mut store = store_with(Stat::Wisdom, 10.0);
        let modifier = Modifier::new("insight", Stat::Wisdom, ModifierOp::Add, 3.0);
        let id = modifier.id;
        store.add_modifier(modifier);
        assert_eq!(store.stat(Stat::Wisdom, Timestamp(0)), 13.0);
        let removed = store.remove_modifier(id).expect("removed");
        assert_eq!(removed.source, "insight");
        assert_eq!(store.stat(Stat::Wisdom, Timestamp(0)), 10.0);
        assert!(store.remove_modifier(id).is_none());
    }

    #[test]
    fn sweep_evicts_across_stats() {
        let mut store = StatModifierStore::new();
        store.add_modifier(Modifier::new("a", Stat::Armor, ModifierOp::Add, 1.0).expiring_at(Timestamp(10)));
        store.add_modifier(Modifier::new("b", Stat::Will, ModifierOp::Add, 1.0).expiring_at(Timestamp(20)));
        store.add_modifier(Modifier::new("c", Stat::Will, ModifierOp::Add, 1.0));
        let evicted = store.evict_expired(Timestamp(15));
        assert_eq!(evicted.len(), 1);
        assert_eq!(store.len(), 2);
        let evicted = store.evict_expired(Timestamp(20));
        assert_eq!(evicted.len(), 1);
        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
    }
}
