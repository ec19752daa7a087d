//! Memory Tier
//!
//! Slot-addressed buffer of compressed payloads. Freed slots are reused
//! before the buffer grows, so slot numbers stay small and stable.

use bytes::Bytes;

/// In-process tier with a byte budget
#[derive(Debug)]
pub struct MemoryTier {
    slots: Vec<Option<Bytes>>,
    free: Vec<usize>,
    used: u64,
    capacity: u64,
}

impl MemoryTier {
    pub fn new(capacity: u64) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            used: 0,
            capacity,
        }
    }

    /// Would `len` more bytes stay within budget?
    pub fn fits(&self, len: u64) -> bool {
        self.used.saturating_add(len) <= self.capacity
    }

    /// Would replacing `outgoing` bytes with `incoming` stay within budget?
    pub fn fits_swap(&self, outgoing: u64, incoming: u64) -> bool {
        self.used
            .saturating_sub(outgoing)
            .saturating_add(incoming)
            <= self.capacity
    }

    /// Store a payload, reusing a freed slot if there is one.
    ///
    /// Returns `None` without side effects when the payload does not fit.
    pub fn insert(&mut self, data: Bytes) -> Option<usize> {
        let len = data.len() as u64;
        if !self.fits(len) {
            return None;
        }
        self.used += len;
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(data);
                slot
            }
            None => {
                self.slots.push(Some(data));
                self.slots.len() - 1
            }
        };
        Some(slot)
    }

    /// Overwrite a live slot in place, returning the old payload.
    ///
    /// Returns `None` without side effects if the slot is not live or the
    /// swap would exceed the budget.
    pub fn replace(&mut self, slot: usize, data: Bytes) -> Option<Bytes> {
        let outgoing = self.get(slot)?.len() as u64;
        if !self.fits_swap(outgoing, data.len() as u64) {
            return None;
        }
        self.used = self.used - outgoing + data.len() as u64;
        self.slots[slot].replace(data)
    }

    /// Free a slot, returning its payload.
    pub fn free(&mut self, slot: usize) -> Option<Bytes> {
        let data = self.slots.get_mut(slot)?.take()?;
        self.used -= data.len() as u64;
        self.free.push(slot);
        Some(data)
    }

    pub fn get(&self, slot: usize) -> Option<&Bytes> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Length of a live slot's payload
    pub fn slot_len(&self, slot: usize) -> Option<u64> {
        self.get(slot).map(|data| data.len() as u64)
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of live slots
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> Bytes {
        Bytes::from(vec![0xAB; len])
    }

    #[test]
    fn test_insert_within_budget() {
        let mut tier = MemoryTier::new(10);
        assert_eq!(tier.insert(payload(4)), Some(0));
        assert_eq!(tier.insert(payload(6)), Some(1));
        assert_eq!(tier.used(), 10);
        assert_eq!(tier.len(), 2);
    }

    #[test]
    fn test_insert_over_budget_has_no_effect() {
        let mut tier = MemoryTier::new(10);
        tier.insert(payload(8));
        assert_eq!(tier.insert(payload(3)), None);
        assert_eq!(tier.used(), 8);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_freed_slot_is_reused() {
        let mut tier = MemoryTier::new(100);
        tier.insert(payload(10));
        tier.insert(payload(10));
        assert_eq!(tier.free(0).map(|b| b.len()), Some(10));
        assert!(tier.get(0).is_none());
        assert_eq!(tier.used(), 10);

        assert_eq!(tier.insert(payload(5)), Some(0));
        assert_eq!(tier.used(), 15);
    }

    #[test]
    fn test_double_free_is_none() {
        let mut tier = MemoryTier::new(100);
        tier.insert(payload(10));
        assert!(tier.free(0).is_some());
        assert!(tier.free(0).is_none());
        assert!(tier.free(42).is_none());
        assert_eq!(tier.used(), 0);
    }

    #[test]
    fn test_replace_checks_swap_budget() {
        let mut tier = MemoryTier::new(10);
        tier.insert(payload(8));

        assert!(tier.fits_swap(8, 10));
        assert!(!tier.fits_swap(8, 11));

        let old = tier.replace(0, payload(9)).unwrap();
        assert_eq!(old.len(), 8);
        assert_eq!(tier.used(), 9);

        assert!(tier.replace(0, payload(11)).is_none());
        assert_eq!(tier.slot_len(0), Some(9));
    }
}
