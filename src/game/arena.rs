//! Generational slot storage
//!
//! Characters and projectiles reference each other by `Handle<T>` instead of
//! by pointer. A handle stays valid until its slot is removed; reusing the
//! slot bumps the generation so stale handles resolve to `None`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Typed generational index
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    #[inline]
    pub const fn from_raw_parts(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn index(&self) -> usize {
        self.index as usize
    }

    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

// Manual impls so `T` needs no bounds

impl<T> Clone for Handle<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.index, self.generation).cmp(&(other.index, other.generation))
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// Slot arena with a LIFO free list
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let generation = match *slot {
                Slot::Vacant { generation } | Slot::Occupied { generation, .. } => {
                    generation.wrapping_add(1)
                }
            };
            *slot = Slot::Occupied { generation, value };
            return Handle::from_raw_parts(index, generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot::Occupied { generation: 0, value });
        Handle::from_raw_parts(index, 0)
    }

    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        if !self.contains(handle) {
            return None;
        }
        let old = std::mem::replace(
            &mut self.slots[handle.index()],
            Slot::Vacant {
                generation: handle.generation,
            },
        );
        self.free.push(handle.index);
        self.len -= 1;
        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    #[inline]
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        match self.slots.get(handle.index())? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        match self.slots.get_mut(handle.index())? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Occupied { generation, value } => {
                Some((Handle::from_raw_parts(i as u32, *generation), value))
            }
            Slot::Vacant { .. } => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Occupied { generation, value } => {
                Some((Handle::from_raw_parts(i as u32, *generation), value))
            }
            Slot::Vacant { .. } => None,
        })
    }

    /// Snapshot of live handles, safe to iterate while mutating the arena
    pub fn handles(&self) -> Vec<Handle<T>> {
        self.iter().map(|(h, _)| h).collect()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        arena.remove(a);
        let c = arena.insert(3);
        assert_eq!(a.index(), c.index(), "slot is reused");
        assert_ne!(a, c);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(c), Some(&3));
        assert_eq!(arena.remove(a), None, "stale remove is a no-op");
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_double_remove() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        assert!(arena.remove(a).is_some());
        assert!(arena.remove(a).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    fn test_handles_in_slot_order() {
        let mut arena = Arena::new();
        let hs: Vec<_> = (0..5).map(|i| arena.insert(i)).collect();
        arena.remove(hs[2]);
        let live = arena.handles();
        assert_eq!(live, vec![hs[0], hs[1], hs[3], hs[4]]);
        let mut sorted = live.clone();
        sorted.sort();
        assert_eq!(sorted, live);
    }

    #[test]
    fn test_out_of_range_handle() {
        let arena: Arena<u8> = Arena::new();
        assert!(arena.get(Handle::from_raw_parts(99, 0)).is_none());
    }
}
