use std::{io, ptr::NonNull};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, mmap, munmap};

use crate::error::ZoneError;

/// The single memory reservation backing a zone.
///
/// Obtained once with an anonymous private mapping and handed back to the
/// OS on drop. The mapping is zero-filled and page aligned.
pub struct Arena {
  base: NonNull<u8>,
  size: usize,
}

impl Arena {
  pub fn reserve(size: usize) -> Result<Self, ZoneError> {
    let address = unsafe {
      mmap(
        std::ptr::null_mut(),
        size,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      let reason = io::Error::last_os_error();

      return Err(ZoneError::ReservationFailed {
        size,
        reason: reason.to_string(),
      });
    }

    let base = NonNull::new(address as *mut u8).ok_or_else(|| ZoneError::ReservationFailed {
      size,
      reason: "mapping returned a null address".to_string(),
    })?;

    log::debug!("zone: reserved {} bytes at {:p}", size, base);

    Ok(Self { base, size })
  }

  pub fn base(&self) -> *mut u8 {
    self.base.as_ptr()
  }

  pub fn size(&self) -> usize {
    self.size
  }

  pub fn end(&self) -> *mut u8 {
    unsafe { self.base.as_ptr().add(self.size) }
  }

  pub fn contains(
    &self,
    address: *const u8,
  ) -> bool {
    let address = address as usize;
    let base = self.base.as_ptr() as usize;

    address >= base && address < base + self.size
  }

  /// Byte offset of `address` from the arena base. Addresses below the base
  /// wrap around to huge offsets.
  pub fn offset_of(
    &self,
    address: *const u8,
  ) -> usize {
    (address as usize).wrapping_sub(self.base.as_ptr() as usize)
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    let result = unsafe { munmap(self.base.as_ptr() as *mut c_void, self.size) };

    if result != 0 {
      log::error!(
        "zone: failed to release {} bytes at {:p}: {}",
        self.size,
        self.base,
        io::Error::last_os_error()
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_reserve_is_zeroed_and_writable() {
    let arena = Arena::reserve(64 * 1024).unwrap();

    unsafe {
      let bytes = std::slice::from_raw_parts_mut(arena.base(), arena.size());

      assert!(bytes.iter().all(|byte| *byte == 0));

      bytes[0] = 0xAB;
      bytes[arena.size() - 1] = 0xCD;

      assert_eq!(*arena.base(), 0xAB);
      assert_eq!(*arena.end().sub(1), 0xCD);
    }
  }

  #[test]
  fn test_contains() {
    let arena = Arena::reserve(4096).unwrap();

    assert!(arena.contains(arena.base()));
    assert!(unsafe { arena.contains(arena.base().add(4095)) });
    assert!(!arena.contains(arena.end()));
    assert!(!arena.contains(std::ptr::null()));
    assert_eq!(unsafe { arena.offset_of(arena.base().add(100)) }, 100);
  }

  #[test]
  fn test_reserve_failure_is_reported() {
    let result = Arena::reserve(usize::MAX);

    assert!(matches!(result, Err(ZoneError::ReservationFailed { .. })));
  }
}
