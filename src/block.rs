use std::{mem, ptr};

use crate::tag::PurgeTag;

/// Alignment of every block header and payload.
pub const ZONE_ALIGN: usize = 16;

/// Bytes taken by a block header, rounded to [`ZONE_ALIGN`].
pub const HEADER_SIZE: usize = crate::align_to!(mem::size_of::<Block>(), ZONE_ALIGN);

/// Smallest remainder worth splitting off as its own free block.
pub const MIN_FRAGMENT: usize = HEADER_SIZE + 2 * ZONE_ALIGN;

/// Magic written into every used block header.
pub const ZONE_ID: u32 = 0x001d_4a11;

/// Magic written into every free block header.
pub const FREE_ID: u32 = 0x00f7_ee00;

/// Tag byte of a free block. Never a valid [`PurgeTag`].
pub const FREE_TAG: u8 = u8::MAX;

const USER_NONE: usize = 0;
const USER_ANONYMOUS: usize = 1;
const USER_HANDLE_BASE: usize = 2;

/// Who holds the payload of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner {
  /// Free block.
  None,
  /// Used block nobody tracks.
  Anonymous,
  /// Used block tracked by the handle slot at this index.
  Handle(u32),
}

/// Header placed in front of every payload in the zone.
///
/// Fields are kept as raw integers so a damaged header can be inspected
/// without creating invalid values.
#[repr(C)]
pub struct Block {
  pub size: usize,
  pub next: *mut Block,
  pub prev: *mut Block,
  pub user: usize,
  pub id: u32,
  pub tag: u8,
}

impl Block {
  pub fn new_free(
    size: usize,
    next: *mut Block,
    prev: *mut Block,
  ) -> Self {
    Self {
      size,
      next,
      prev,
      user: USER_NONE,
      id: FREE_ID,
      tag: FREE_TAG,
    }
  }

  pub fn is_free(&self) -> bool {
    self.tag == FREE_TAG
  }

  pub fn tag(&self) -> Option<PurgeTag> {
    PurgeTag::from_raw(self.tag)
  }

  pub fn owner(&self) -> Owner {
    match self.user {
      USER_NONE => Owner::None,
      USER_ANONYMOUS => Owner::Anonymous,
      index => Owner::Handle((index - USER_HANDLE_BASE) as u32),
    }
  }

  pub fn set_owner(
    &mut self,
    owner: Owner,
  ) {
    self.user = match owner {
      Owner::None => USER_NONE,
      Owner::Anonymous => USER_ANONYMOUS,
      Owner::Handle(index) => index as usize + USER_HANDLE_BASE,
    };
  }

  pub fn mark_used(
    &mut self,
    tag: PurgeTag,
    owner: Owner,
  ) {
    self.id = ZONE_ID;
    self.tag = tag.as_raw();
    self.set_owner(owner);
  }

  pub fn mark_free(&mut self) {
    self.id = FREE_ID;
    self.tag = FREE_TAG;
    self.user = USER_NONE;
  }

  /// Bytes available to the caller.
  pub fn capacity(&self) -> usize {
    self.size - HEADER_SIZE
  }

  /// Address of the payload that follows `block`.
  ///
  /// # Safety
  ///
  /// `block` must point at a header inside the zone.
  pub unsafe fn payload(block: *mut Block) -> *mut u8 {
    unsafe { (block as *mut u8).add(HEADER_SIZE) }
  }

  /// Header in front of `payload`.
  ///
  /// # Safety
  ///
  /// `payload` must be at least [`HEADER_SIZE`] bytes past the zone base.
  pub unsafe fn from_payload(payload: *mut u8) -> *mut Block {
    unsafe { payload.sub(HEADER_SIZE) as *mut Block }
  }

  /// Address one past the end of `block`.
  ///
  /// # Safety
  ///
  /// `block` must point at a valid header.
  pub unsafe fn end(block: *mut Block) -> *mut u8 {
    unsafe { (block as *mut u8).add((*block).size) }
  }

  /// Carves `block` down to `size` bytes and links the remainder after it as
  /// a free block. Returns the remainder, or null when it would be smaller
  /// than [`MIN_FRAGMENT`] and the block keeps its full size.
  ///
  /// # Safety
  ///
  /// `block` must be a valid header of at least `size` bytes and `size` a
  /// multiple of [`ZONE_ALIGN`].
  pub unsafe fn split(
    block: *mut Block,
    size: usize,
  ) -> *mut Block {
    unsafe {
      let extra = (*block).size - size;

      if extra < MIN_FRAGMENT {
        return ptr::null_mut();
      }

      let next = (*block).next;
      let rest = (block as *mut u8).add(size) as *mut Block;

      rest.write(Block::new_free(extra, next, block));
      (*next).prev = rest;
      (*block).next = rest;
      (*block).size = size;

      rest
    }
  }

  /// Folds `block.next` into `block`. The absorbed header is left as a stale
  /// free header inside the grown block.
  ///
  /// # Safety
  ///
  /// `block.next` must be address-adjacent to `block`.
  pub unsafe fn absorb_next(block: *mut Block) {
    unsafe {
      let next = (*block).next;

      (*block).size += (*next).size;
      (*block).next = (*next).next;
      (*(*next).next).prev = block;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[repr(C, align(16))]
  struct Backing([u8; 1024]);

  #[test]
  fn test_header_is_aligned() {
    assert_eq!(HEADER_SIZE % ZONE_ALIGN, 0);
    assert!(HEADER_SIZE >= mem::size_of::<Block>());
    assert!(MIN_FRAGMENT > HEADER_SIZE);
  }

  #[test]
  fn test_owner_encoding() {
    let mut block = Block::new_free(HEADER_SIZE, ptr::null_mut(), ptr::null_mut());

    assert_eq!(block.owner(), Owner::None);
    assert!(block.is_free());
    assert_eq!(block.tag(), None);

    block.mark_used(PurgeTag::Level, Owner::Handle(7));
    assert_eq!(block.owner(), Owner::Handle(7));
    assert_eq!(block.tag(), Some(PurgeTag::Level));
    assert_eq!(block.id, ZONE_ID);

    block.set_owner(Owner::Anonymous);
    assert_eq!(block.owner(), Owner::Anonymous);

    block.mark_free();
    assert_eq!(block.owner(), Owner::None);
    assert_eq!(block.id, FREE_ID);
  }

  #[test]
  fn test_split_and_absorb() {
    let mut backing = Backing([0; 1024]);

    unsafe {
      let block = backing.0.as_mut_ptr() as *mut Block;
      block.write(Block::new_free(1024, block, block));

      let rest = Block::split(block, 128);
      assert!(!rest.is_null());
      assert_eq!((*block).size, 128);
      assert_eq!((*rest).size, 1024 - 128);
      assert_eq!((*block).next, rest);
      assert_eq!((*rest).next, block);
      assert_eq!((*block).prev, rest);
      assert_eq!(Block::end(block), rest as *mut u8);

      Block::absorb_next(block);
      assert_eq!((*block).size, 1024);
      assert_eq!((*block).next, block);
      assert_eq!((*block).prev, block);
    }
  }

  #[test]
  fn test_split_keeps_small_remainder() {
    let mut backing = Backing([0; 1024]);

    unsafe {
      let block = backing.0.as_mut_ptr() as *mut Block;
      block.write(Block::new_free(1024, block, block));

      let rest = Block::split(block, 1024 - ZONE_ALIGN);
      assert!(rest.is_null());
      assert_eq!((*block).size, 1024);
    }
  }

  #[test]
  fn test_payload_round_trip() {
    let mut backing = Backing([0; 1024]);

    unsafe {
      let block = backing.0.as_mut_ptr() as *mut Block;
      let payload = Block::payload(block);

      assert_eq!(payload as usize - block as usize, HEADER_SIZE);
      assert_eq!(Block::from_payload(payload), block);
      assert_eq!(payload as usize % ZONE_ALIGN, 0);
    }
  }
}
