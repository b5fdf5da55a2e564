//! Slot storage with index reuse, used for bodies and joints.

/// Dense slot arena. Removed slots go on a free list and are handed out again.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
    free_list: Vec<usize>,
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
            free_list: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> usize {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            self.slots[index] = Some(value);
            index
        } else {
            self.slots.push(Some(value));
            self.slots.len() - 1
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        let value = self.slots.get_mut(index)?.take()?;
        self.free_list.push(index);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.as_mut()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Mutable references to two distinct live slots.
    pub fn pair_mut(&mut self, a: usize, b: usize) -> Option<(&mut T, &mut T)> {
        if a == b || a >= self.slots.len() || b >= self.slots.len() {
            return None;
        }
        if a < b {
            let (head, tail) = self.slots.split_at_mut(b);
            Some((head[a].as_mut()?, tail[0].as_mut()?))
        } else {
            let (head, tail) = self.slots.split_at_mut(a);
            Some((tail[0].as_mut()?, head[b].as_mut()?))
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever allocated, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i, v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|v| (i, v)))
    }

    /// Empties the arena, returning live values in slot order.
    pub fn drain(&mut self) -> Vec<T> {
        self.free_list.clear();
        self.len = 0;
        self.slots.drain(..).flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove_reuses_slots() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.remove(a), None);
        let c = arena.insert("c");
        assert_eq!(c, a);
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_pair_mut() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        {
            let (x, y) = arena.pair_mut(b, a).unwrap();
            *x += 10;
            *y += 20;
        }
        assert_eq!(arena.get(a), Some(&21));
        assert_eq!(arena.get(b), Some(&12));
        assert!(arena.pair_mut(a, a).is_none());
        arena.remove(b);
        assert!(arena.pair_mut(a, b).is_none());
    }

    #[test]
    fn test_drain_in_slot_order() {
        let mut arena = Arena::new();
        arena.insert(1);
        let mid = arena.insert(2);
        arena.insert(3);
        arena.remove(mid);
        assert_eq!(arena.drain(), vec![1, 3]);
        assert!(arena.is_empty());
        assert_eq!(arena.insert(9), 0);
    }
}
