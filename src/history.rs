//! Bounded, admission-ordered history backed by a slot arena.
//!
//! Values live in reusable slots; a ring of slot indices records admission
//! order. Eviction is strictly FIFO by admission and never by access.

use std::collections::VecDeque;

/// Handle to a value admitted into a [`SnapshotHistory`]. Stale handles (whose
/// slot was evicted and reused) resolve to `None`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlotHandle {
    index: u32,
    generation: u32,
}

impl SlotHandle {
    pub const fn index(self) -> u32 {
        self.index
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub struct SnapshotHistory<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    order: VecDeque<u32>,
    capacity: usize,
}

impl<T> SnapshotHistory<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Appends `value` at the tail, evicting from the head to stay within
    /// capacity. Evicted values are returned oldest-first.
    pub fn admit(&mut self, value: T) -> (SlotHandle, Vec<T>) {
        let mut evicted = Vec::new();
        while self.order.len() >= self.capacity {
            match self.evict_oldest() {
                Some(value) => evicted.push(value),
                None => break,
            }
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        self.order.push_back(index);

        (
            SlotHandle {
                index,
                generation: slot.generation,
            },
            evicted,
        )
    }

    /// Changes the bound. Shrinking evicts from the head immediately.
    pub fn set_capacity(&mut self, capacity: usize) -> Vec<T> {
        self.capacity = capacity.max(1);
        let mut evicted = Vec::new();
        while self.order.len() > self.capacity {
            match self.evict_oldest() {
                Some(value) => evicted.push(value),
                None => break,
            }
        }
        evicted
    }

    pub fn get(&self, handle: SlotHandle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: SlotHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Removes one value regardless of its position in admission order.
    pub fn remove(&mut self, handle: SlotHandle) -> Option<T> {
        self.get(handle)?;
        let position = self.order.iter().position(|index| *index == handle.index)?;
        self.order.remove(position);
        self.release(handle.index)
    }

    /// Moves a held value to the tail so it becomes current. Its slot and
    /// handle are unchanged.
    pub fn promote(&mut self, handle: SlotHandle) -> bool {
        if self.get(handle).is_none() {
            return false;
        }
        let Some(position) = self.order.iter().position(|index| *index == handle.index) else {
            return false;
        };
        if position + 1 != self.order.len() {
            self.order.remove(position);
            self.order.push_back(handle.index);
        }
        true
    }

    /// The most recently admitted value.
    pub fn current(&self) -> Option<&T> {
        self.order
            .back()
            .and_then(|index| self.slots[*index as usize].value.as_ref())
    }

    pub fn current_handle(&self) -> Option<SlotHandle> {
        self.order.back().map(|index| SlotHandle {
            index: *index,
            generation: self.slots[*index as usize].generation,
        })
    }

    /// Values oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order
            .iter()
            .filter_map(|index| self.slots[*index as usize].value.as_ref())
    }

    /// Drops every held value. Slots stay allocated for reuse.
    pub fn clear(&mut self) {
        while let Some(index) = self.order.pop_front() {
            drop(self.release(index));
        }
    }

    fn evict_oldest(&mut self) -> Option<T> {
        let index = self.order.pop_front()?;
        self.release(index)
    }

    fn release(&mut self, index: u32) -> Option<T> {
        let slot = &mut self.slots[index as usize];
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_past_capacity_evicts_oldest() {
        let mut history = SnapshotHistory::new(3);
        for value in 0..3 {
            let (_, evicted) = history.admit(value);
            assert!(evicted.is_empty());
        }
        let (_, evicted) = history.admit(3);
        assert_eq!(evicted, vec![0]);
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(history.current(), Some(&3));
    }

    #[test]
    fn promoted_value_becomes_current_and_ages_last() {
        let mut history = SnapshotHistory::new(3);
        let (first, _) = history.admit("a");
        history.admit("b");
        history.admit("c");

        assert!(history.promote(first));
        assert_eq!(history.current(), Some(&"a"));
        assert_eq!(history.get(first), Some(&"a"));
        let (_, evicted) = history.admit("d");
        assert_eq!(evicted, vec!["b"]);
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec!["c", "a", "d"]);
    }

    #[test]
    fn stale_handles_do_not_resolve_after_slot_reuse() {
        let mut history = SnapshotHistory::new(1);
        let (first, _) = history.admit("a");
        let (second, evicted) = history.admit("b");
        assert_eq!(evicted, vec!["a"]);
        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());
        assert_eq!(history.get(first), None);
        assert_eq!(history.get(second), Some(&"b"));
    }

    #[test]
    fn shrinking_capacity_evicts_from_head() {
        let mut history = SnapshotHistory::new(4);
        for value in 0..4 {
            history.admit(value);
        }
        let evicted = history.set_capacity(2);
        assert_eq!(evicted, vec![0, 1]);
        assert_eq!(history.len(), 2);

        assert!(history.set_capacity(5).is_empty());
        assert_eq!(history.capacity(), 5);
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut history = SnapshotHistory::new(0);
        assert_eq!(history.capacity(), 1);
        history.admit(1);
        assert!(history.set_capacity(0).is_empty());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn remove_from_middle_keeps_order() {
        let mut history = SnapshotHistory::new(3);
        history.admit(10);
        let (middle, _) = history.admit(20);
        history.admit(30);

        assert_eq!(history.remove(middle), Some(20));
        assert_eq!(history.remove(middle), None);
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![10, 30]);

        // the freed slot is reused without growing the arena
        history.admit(40);
        assert_eq!(history.slots.len(), 3);
        assert_eq!(history.current(), Some(&40));
    }

    #[test]
    fn repeated_access_does_not_change_eviction_order() {
        let mut history = SnapshotHistory::new(2);
        let (oldest, _) = history.admit(1);
        history.admit(2);
        for _ in 0..5 {
            assert_eq!(history.get(oldest), Some(&1));
        }
        let (_, evicted) = history.admit(3);
        assert_eq!(evicted, vec![1]);
    }

    #[test]
    fn clear_releases_everything() {
        let mut history = SnapshotHistory::new(2);
        let (handle, _) = history.admit(String::from("a"));
        history.admit(String::from("b"));
        history.clear();
        assert!(history.is_empty());
        assert!(history.current().is_none());
        assert!(history.current_handle().is_none());
        assert!(history.get(handle).is_none());
    }
}
