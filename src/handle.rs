use std::ptr::{self, NonNull};

/// A stable reference to whatever block currently backs an allocation.
///
/// The zone records the handle in the block header and keeps the handle's
/// target in sync when the block moves or is freed, so the holder can always
/// ask the zone where the data lives now.
///
/// ```text
///   Handle ──► slot ──► payload
///                         ▲
///   Block header ─────────┘ user = slot index
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
  index: u32,
  generation: u32,
}

impl Handle {
  pub fn index(&self) -> u32 {
    self.index
  }
}

struct Slot {
  target: *mut u8,
  generation: u32,
  live: bool,
}

/// Slots behind every [`Handle`] handed out by a zone.
pub struct HandleTable {
  slots: Vec<Slot>,
  vacant: Vec<u32>,
}

impl HandleTable {
  pub fn new() -> Self {
    Self {
      slots: Vec::new(),
      vacant: Vec::new(),
    }
  }

  pub fn insert(&mut self) -> Handle {
    if let Some(index) = self.vacant.pop() {
      let slot = &mut self.slots[index as usize];
      slot.live = true;
      slot.target = ptr::null_mut();

      return Handle {
        index,
        generation: slot.generation,
      };
    }

    let index = self.slots.len() as u32;
    self.slots.push(Slot {
      target: ptr::null_mut(),
      generation: 0,
      live: true,
    });

    Handle {
      index,
      generation: 0,
    }
  }

  /// Retires `handle` and returns the payload it pointed at, if any.
  pub fn remove(
    &mut self,
    handle: Handle,
  ) -> Option<*mut u8> {
    if !self.is_live(handle) {
      return None;
    }

    let slot = &mut self.slots[handle.index as usize];
    let target = slot.target;

    slot.live = false;
    slot.target = ptr::null_mut();
    slot.generation = slot.generation.wrapping_add(1);
    self.vacant.push(handle.index);

    (!target.is_null()).then_some(target)
  }

  pub fn is_live(
    &self,
    handle: Handle,
  ) -> bool {
    self
      .slots
      .get(handle.index as usize)
      .is_some_and(|slot| slot.live && slot.generation == handle.generation)
  }

  pub fn resolve(
    &self,
    handle: Handle,
  ) -> Option<NonNull<u8>> {
    if !self.is_live(handle) {
      return None;
    }

    NonNull::new(self.slots[handle.index as usize].target)
  }

  /// Current target of the live slot at `index`, or `None` when the slot is
  /// vacant or does not exist.
  pub fn target_at(
    &self,
    index: u32,
  ) -> Option<*mut u8> {
    self
      .slots
      .get(index as usize)
      .filter(|slot| slot.live)
      .map(|slot| slot.target)
  }

  pub fn set_target(
    &mut self,
    index: u32,
    target: *mut u8,
  ) {
    if let Some(slot) = self.slots.get_mut(index as usize) {
      slot.target = target;
    }
  }

  /// Clears the slot at `index` if it still points at `payload`.
  pub fn clear_if(
    &mut self,
    index: u32,
    payload: *mut u8,
  ) {
    if let Some(slot) = self.slots.get_mut(index as usize) {
      if slot.live && slot.target == payload {
        slot.target = ptr::null_mut();
      }
    }
  }

  pub fn len(&self) -> usize {
    self.slots.len() - self.vacant.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_insert_resolve_remove() {
    let mut table = HandleTable::new();
    let mut byte = 0u8;
    let payload = &mut byte as *mut u8;

    let handle = table.insert();
    assert_eq!(table.resolve(handle), None);

    table.set_target(handle.index(), payload);
    assert_eq!(table.resolve(handle).map(NonNull::as_ptr), Some(payload));
    assert_eq!(table.len(), 1);

    assert_eq!(table.remove(handle), Some(payload));
    assert_eq!(table.resolve(handle), None);
    assert!(!table.is_live(handle));
    assert_eq!(table.len(), 0);
  }

  #[test]
  fn test_reused_slot_rejects_stale_handle() {
    let mut table = HandleTable::new();

    let stale = table.insert();
    table.remove(stale);

    let fresh = table.insert();
    assert_eq!(fresh.index(), stale.index());
    assert_ne!(fresh, stale);
    assert!(table.is_live(fresh));
    assert!(!table.is_live(stale));
    assert_eq!(table.remove(stale), None);
  }

  #[test]
  fn test_clear_if_only_clears_matching_target() {
    let mut table = HandleTable::new();
    let mut bytes = [0u8; 2];
    let first = &mut bytes[0] as *mut u8;
    let second = &mut bytes[1] as *mut u8;

    let handle = table.insert();
    table.set_target(handle.index(), second);

    table.clear_if(handle.index(), first);
    assert_eq!(table.target_at(handle.index()), Some(second));

    table.clear_if(handle.index(), second);
    assert_eq!(table.target_at(handle.index()), Some(ptr::null_mut()));
  }
}
