use std::ptr::{self, NonNull};

use crate::{
  align::align_down,
  arena::Arena,
  block::{Block, FREE_ID, FREE_TAG, HEADER_SIZE, MIN_FRAGMENT, Owner, ZONE_ALIGN, ZONE_ID},
  config::{SCRIBBLE_BYTE, ZoneConfig},
  error::{Corruption, ZoneError, fatal},
  handle::{Handle, HandleTable},
  tag::PurgeTag,
};

/// A fixed-size arena carved into tagged blocks.
///
/// Every operation has a `try_` form that reports failure as a
/// [`ZoneError`] and a plain form that treats failure as fatal: it logs the
/// error and panics with the same message.
pub struct Zone {
  pub(crate) arena: Arena,
  pub(crate) rover: *mut Block,
  pub(crate) handles: HandleTable,
  pub(crate) config: ZoneConfig,
}

impl Zone {
  /// Reserves the arena and lays a single free block over all of it.
  pub fn new(config: ZoneConfig) -> Result<Self, ZoneError> {
    let size = align_down(config.size, ZONE_ALIGN);
    let minimum = HEADER_SIZE + MIN_FRAGMENT;

    if size < minimum {
      return Err(ZoneError::ZoneTooSmall {
        size: config.size,
        minimum,
      });
    }

    let arena = Arena::reserve(size)?;
    let head = arena.base() as *mut Block;

    unsafe { head.write(Block::new_free(size, head, head)) };

    Ok(Self {
      arena,
      rover: head,
      handles: HandleTable::new(),
      config,
    })
  }

  /// Like [`Zone::new`], but a zone that cannot be reserved is fatal.
  pub fn init(config: ZoneConfig) -> Self {
    Self::new(config).unwrap_or_else(|error| fatal(error))
  }

  pub fn with_size(size: usize) -> Result<Self, ZoneError> {
    Self::new(ZoneConfig::with_size(size))
  }

  pub fn config(&self) -> &ZoneConfig {
    &self.config
  }

  /// Bytes managed by the zone, headers included.
  pub fn size(&self) -> usize {
    self.arena.size()
  }

  /// Whether `address` lies inside the zone.
  pub fn contains(
    &self,
    address: *const u8,
  ) -> bool {
    self.arena.contains(address)
  }

  pub(crate) fn head(&self) -> *mut Block {
    self.arena.base() as *mut Block
  }

  // Allocation

  /// Allocates `size` bytes tagged [`PurgeTag::Static`], stopping the
  /// program if the zone is exhausted.
  pub fn malloc(
    &mut self,
    size: usize,
  ) -> NonNull<u8> {
    self.malloc_tag(size, PurgeTag::Static, None)
  }

  pub fn malloc_tag(
    &mut self,
    size: usize,
    tag: PurgeTag,
    owner: Option<Handle>,
  ) -> NonNull<u8> {
    self
      .try_malloc_tag(size, tag, owner)
      .unwrap_or_else(|error| fatal(error))
  }

  /// Allocates at least `size` bytes aligned to [`ZONE_ALIGN`].
  ///
  /// When `owner` is given, the handle is bound to the new payload and
  /// follows it from then on. Purgable tags require an owner.
  pub fn try_malloc_tag(
    &mut self,
    size: usize,
    tag: PurgeTag,
    owner: Option<Handle>,
  ) -> Result<NonNull<u8>, ZoneError> {
    let owner = self.check_owner(owner, tag)?;

    let payload = unsafe {
      let block = self.allocate_block(size, tag, owner, ptr::null_mut())?;

      if let Owner::Handle(index) = owner {
        self.bind(index, block);
      }

      Block::payload(block)
    };

    log::trace!("zone: malloc {} bytes tagged {} at {:p}", size, tag, payload);

    self.after_mutation();

    Ok(unsafe { NonNull::new_unchecked(payload) })
  }

  pub fn calloc(
    &mut self,
    count: usize,
    size: usize,
  ) -> NonNull<u8> {
    self.calloc_tag(count, size, PurgeTag::Static, None)
  }

  pub fn calloc_tag(
    &mut self,
    count: usize,
    size: usize,
    tag: PurgeTag,
    owner: Option<Handle>,
  ) -> NonNull<u8> {
    self
      .try_calloc_tag(count, size, tag, owner)
      .unwrap_or_else(|error| fatal(error))
  }

  /// Allocates room for `count` elements of `size` bytes, zero-filled.
  pub fn try_calloc_tag(
    &mut self,
    count: usize,
    size: usize,
    tag: PurgeTag,
    owner: Option<Handle>,
  ) -> Result<NonNull<u8>, ZoneError> {
    let total = count
      .checked_mul(size)
      .ok_or(ZoneError::SizeOverflow { count, size })?;

    let payload = self.try_malloc_tag(total, tag, owner)?;

    unsafe { ptr::write_bytes(payload.as_ptr(), 0, total) };

    Ok(payload)
  }

  pub fn strdup(
    &mut self,
    text: &str,
  ) -> NonNull<u8> {
    self.strdup_tag(text, PurgeTag::Static, None)
  }

  pub fn strdup_tag(
    &mut self,
    text: &str,
    tag: PurgeTag,
    owner: Option<Handle>,
  ) -> NonNull<u8> {
    self
      .try_strdup_tag(text, tag, owner)
      .unwrap_or_else(|error| fatal(error))
  }

  /// Copies `text` into the zone followed by a NUL terminator.
  pub fn try_strdup_tag(
    &mut self,
    text: &str,
    tag: PurgeTag,
    owner: Option<Handle>,
  ) -> Result<NonNull<u8>, ZoneError> {
    let bytes = text.as_bytes();
    let payload = self.try_malloc_tag(bytes.len() + 1, tag, owner)?;

    unsafe {
      ptr::copy_nonoverlapping(bytes.as_ptr(), payload.as_ptr(), bytes.len());
      payload.as_ptr().add(bytes.len()).write(0);
    }

    Ok(payload)
  }

  // Reallocation

  /// Resizes the allocation at `address`, keeping its tag.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live payload returned by this zone. On
  /// success the old address must no longer be used unless it is returned
  /// again.
  pub unsafe fn realloc(
    &mut self,
    address: *mut u8,
    size: usize,
  ) -> Option<NonNull<u8>> {
    unsafe { self.try_realloc(address, size) }.unwrap_or_else(|error| fatal(error))
  }

  /// # Safety
  ///
  /// See [`Zone::realloc`].
  pub unsafe fn try_realloc(
    &mut self,
    address: *mut u8,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, ZoneError> {
    unsafe { self.reallocate(address, size, None, None) }
  }

  /// # Safety
  ///
  /// See [`Zone::realloc`].
  pub unsafe fn realloc_tag(
    &mut self,
    address: *mut u8,
    size: usize,
    tag: PurgeTag,
    owner: Option<Handle>,
  ) -> Option<NonNull<u8>> {
    unsafe { self.try_realloc_tag(address, size, tag, owner) }
      .unwrap_or_else(|error| fatal(error))
  }

  /// Resizes the allocation at `address` and retags it.
  ///
  /// A null `address` allocates; a zero `size` frees and yields `None`. The
  /// block grows in place when the following block is free and big enough,
  /// otherwise it moves and the old block is released. Bytes past the old
  /// capacity read as zero. The owner handle of the old block (or `owner`,
  /// when given) is updated to the returned address. On error the original
  /// allocation is left untouched.
  ///
  /// # Safety
  ///
  /// See [`Zone::realloc`].
  pub unsafe fn try_realloc_tag(
    &mut self,
    address: *mut u8,
    size: usize,
    tag: PurgeTag,
    owner: Option<Handle>,
  ) -> Result<Option<NonNull<u8>>, ZoneError> {
    unsafe { self.reallocate(address, size, Some(tag), owner) }
  }

  unsafe fn reallocate(
    &mut self,
    address: *mut u8,
    size: usize,
    tag: Option<PurgeTag>,
    owner: Option<Handle>,
  ) -> Result<Option<NonNull<u8>>, ZoneError> {
    if address.is_null() {
      if size == 0 {
        return Ok(None);
      }

      let tag = tag.unwrap_or(PurgeTag::Static);

      return self.try_malloc_tag(size, tag, owner).map(Some);
    }

    if size == 0 {
      unsafe { self.try_free(address)? };

      return Ok(None);
    }

    unsafe {
      let block = self.used_block(address)?;
      let previous = (*block).owner();
      let tag = tag.unwrap_or_else(|| Self::tag_of(block));

      let owner = match owner {
        Some(_) => self.check_owner(owner, tag)?,
        None => match previous {
          Owner::Handle(index) => Owner::Handle(index),
          _ => self.check_owner(None, tag)?,
        },
      };

      let needed = self.block_size(size)?;
      let old_capacity = (*block).capacity();

      let result = if needed <= (*block).size {
        self.shrink_in_place(block, needed);
        block
      } else if self.grow_in_place(block, needed) {
        block
      } else {
        let fresh = self.allocate_block(size, tag, Owner::Anonymous, block)?;

        ptr::copy_nonoverlapping(address, Block::payload(fresh), old_capacity);
        self.release(block);

        log::trace!(
          "zone: realloc moved {:p} to {:p} ({} -> {} bytes)",
          address,
          Block::payload(fresh),
          old_capacity,
          size
        );

        fresh
      };

      let payload = Block::payload(result);
      let capacity = (*result).capacity();

      if capacity > old_capacity {
        ptr::write_bytes(payload.add(old_capacity), 0, capacity - old_capacity);
      }

      if let Owner::Handle(index) = previous {
        if owner != previous {
          self.handles.clear_if(index, payload);
        }
      }

      (*result).mark_used(tag, owner);

      if let Owner::Handle(index) = owner {
        self.bind(index, result);
      }

      self.after_mutation();

      Ok(Some(NonNull::new_unchecked(payload)))
    }
  }

  unsafe fn shrink_in_place(
    &mut self,
    block: *mut Block,
    size: usize,
  ) {
    unsafe {
      let rest = Block::split(block, size);

      if rest.is_null() {
        return;
      }

      if self.config.scribble {
        ptr::write_bytes(Block::payload(rest), SCRIBBLE_BYTE, (*rest).capacity());
      }

      self.coalesce(rest);
    }
  }

  unsafe fn grow_in_place(
    &mut self,
    block: *mut Block,
    size: usize,
  ) -> bool {
    unsafe {
      let next = (*block).next;

      if next == self.head() || !(*next).is_free() || (*block).size + (*next).size < size {
        return false;
      }

      if self.rover == next {
        self.rover = block;
      }

      Block::absorb_next(block);
      Block::split(block, size);

      true
    }
  }

  // Release

  /// Frees the allocation at `address`. Null is ignored; anything else that
  /// is not a live allocation of this zone is fatal.
  ///
  /// # Safety
  ///
  /// `address` must be null or a payload returned by this zone, and must
  /// not be used after this call.
  pub unsafe fn free(
    &mut self,
    address: *mut u8,
  ) {
    unsafe { self.try_free(address) }.unwrap_or_else(|error| fatal(error))
  }

  /// Frees the allocation at `address`, clearing its owner handle and
  /// merging it with free neighbors.
  ///
  /// # Safety
  ///
  /// See [`Zone::free`].
  pub unsafe fn try_free(
    &mut self,
    address: *mut u8,
  ) -> Result<(), ZoneError> {
    if address.is_null() {
      return Ok(());
    }

    unsafe {
      let block = self.used_block(address)?;

      log::trace!(
        "zone: free {:p} ({} bytes tagged {})",
        address,
        (*block).capacity(),
        Self::tag_of(block)
      );

      self.release(block);
    }

    self.after_mutation();

    Ok(())
  }

  /// Frees every block tagged `tag`.
  pub fn free_tag(
    &mut self,
    tag: PurgeTag,
  ) {
    self.free_tags(tag, tag);
  }

  /// Frees every block whose tag lies in `low..=high`.
  pub fn free_tags(
    &mut self,
    low: PurgeTag,
    high: PurgeTag,
  ) {
    let freed = unsafe { self.sweep(|tag| low <= tag && tag <= high, ptr::null_mut()) };

    log::debug!("zone: freed {} blocks tagged {}..={}", freed, low, high);

    self.after_mutation();
  }

  /// Retags a live allocation.
  ///
  /// # Safety
  ///
  /// `address` must be a live payload returned by this zone.
  pub unsafe fn change_tag(
    &mut self,
    address: *mut u8,
    tag: PurgeTag,
  ) {
    unsafe { self.try_change_tag(address, tag) }.unwrap_or_else(|error| fatal(error))
  }

  /// # Safety
  ///
  /// See [`Zone::change_tag`].
  pub unsafe fn try_change_tag(
    &mut self,
    address: *mut u8,
    tag: PurgeTag,
  ) -> Result<(), ZoneError> {
    unsafe {
      let block = self.used_block(address)?;

      if tag.is_purgable() && !matches!((*block).owner(), Owner::Handle(_)) {
        return Err(ZoneError::UnownedPurgable { tag });
      }

      (*block).tag = tag.as_raw();
    }

    self.after_mutation();

    Ok(())
  }

  /// Payload bytes available at `address`.
  ///
  /// # Safety
  ///
  /// `address` must be a live payload returned by this zone.
  pub unsafe fn usable_size(
    &self,
    address: *mut u8,
  ) -> Result<usize, ZoneError> {
    unsafe { self.used_block(address).map(|block| (*block).capacity()) }
  }

  // Handles

  /// Creates an owner handle that is not bound to any allocation yet.
  pub fn new_handle(&mut self) -> Handle {
    self.handles.insert()
  }

  /// Where the allocation owned by `handle` currently lives. `None` once the
  /// allocation was freed, purged, or the handle released.
  pub fn resolve(
    &self,
    handle: Handle,
  ) -> Option<NonNull<u8>> {
    self.handles.resolve(handle)
  }

  /// Retires `handle`. The block it owned, if any, stays allocated with no
  /// owner, unless its tag is purgable: a purgable block nobody owns is
  /// freed.
  pub fn release_handle(
    &mut self,
    handle: Handle,
  ) {
    if let Some(target) = self.handles.remove(handle) {
      unsafe {
        let block = Block::from_payload(target);

        if (*block).owner() == Owner::Handle(handle.index()) {
          self.disown(block);
        }
      }

      self.after_mutation();
    }
  }

  // Internals

  fn check_owner(
    &self,
    owner: Option<Handle>,
    tag: PurgeTag,
  ) -> Result<Owner, ZoneError> {
    match owner {
      Some(handle) if !self.handles.is_live(handle) => Err(ZoneError::StaleHandle {
        index: handle.index(),
      }),
      Some(handle) => Ok(Owner::Handle(handle.index())),
      None if tag.is_purgable() => Err(ZoneError::UnownedPurgable { tag }),
      None => Ok(Owner::Anonymous),
    }
  }

  /// Total block size needed for a payload of `size` bytes.
  fn block_size(
    &self,
    size: usize,
  ) -> Result<usize, ZoneError> {
    if size > self.arena.size() {
      return Err(self.exhausted(size));
    }

    let payload = size.max(1);

    Ok(HEADER_SIZE + crate::align_to!(payload, ZONE_ALIGN))
  }

  fn exhausted(
    &self,
    requested: usize,
  ) -> ZoneError {
    let stats = self.stats();

    ZoneError::Exhausted {
      requested,
      free: stats.free,
      largest_free: stats.largest_free,
      total: stats.total,
    }
  }

  /// Next-fit search: starts at the rover and wraps around the sequence
  /// once. Returns null when no free block holds `size` bytes.
  unsafe fn find_fit(
    &self,
    size: usize,
  ) -> *mut Block {
    unsafe {
      let start = self.rover;
      let mut current = start;

      loop {
        if (*current).is_free() && (*current).size >= size {
          return current;
        }

        current = (*current).next;

        if current == start {
          return ptr::null_mut();
        }
      }
    }
  }

  /// Finds, splits and marks a block for a `size` byte payload. `protect`
  /// is exempt from the cache purge.
  unsafe fn allocate_block(
    &mut self,
    size: usize,
    tag: PurgeTag,
    owner: Owner,
    protect: *mut Block,
  ) -> Result<*mut Block, ZoneError> {
    unsafe {
      let needed = self.block_size(size)?;
      let mut block = self.find_fit(needed);

      if block.is_null() && self.config.purge_cache {
        let purged = self.sweep(PurgeTag::is_purgable, protect);

        if purged > 0 {
          log::warn!(
            "zone: purged {} cached blocks to satisfy {} bytes",
            purged,
            size
          );

          block = self.find_fit(needed);
        }
      }

      if block.is_null() {
        return Err(self.exhausted(size));
      }

      Block::split(block, needed);
      (*block).mark_used(tag, owner);
      self.rover = (*block).next;

      Ok(block)
    }
  }

  /// Points handle slot `index` at `block`. A block the slot owned before
  /// is disowned.
  unsafe fn bind(
    &mut self,
    index: u32,
    block: *mut Block,
  ) {
    unsafe {
      let payload = Block::payload(block);

      if let Some(previous) = self.handles.target_at(index) {
        if !previous.is_null() && previous != payload {
          let stale = Block::from_payload(previous);

          if (*stale).owner() == Owner::Handle(index) {
            self.disown(stale);
          }
        }
      }

      self.handles.set_target(index, payload);
      (*block).set_owner(Owner::Handle(index));
    }
  }

  /// Drops the owner of the used `block`. Purgable blocks cannot live
  /// without one and are freed instead.
  unsafe fn disown(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      (*block).set_owner(Owner::Anonymous);

      if Self::tag_of(block).is_purgable() {
        log::debug!(
          "zone: freed ownerless cached block at {:p}",
          Block::payload(block)
        );

        self.release(block);
      }
    }
  }

  /// Marks `block` free and merges it with its neighbors. Returns the block
  /// that now covers its space.
  unsafe fn release(
    &mut self,
    block: *mut Block,
  ) -> *mut Block {
    unsafe {
      let payload = Block::payload(block);

      if let Owner::Handle(index) = (*block).owner() {
        self.handles.clear_if(index, payload);
      }

      if self.config.scribble {
        ptr::write_bytes(payload, SCRIBBLE_BYTE, (*block).capacity());
      }

      (*block).mark_free();

      self.coalesce(block)
    }
  }

  /// Merges the free `block` with a free predecessor and successor.
  unsafe fn coalesce(
    &mut self,
    block: *mut Block,
  ) -> *mut Block {
    unsafe {
      let head = self.head();
      let mut block = block;

      let prev = (*block).prev;
      if block != head && (*prev).is_free() {
        if self.rover == block {
          self.rover = prev;
        }

        Block::absorb_next(prev);
        block = prev;
      }

      let next = (*block).next;
      if next != head && (*next).is_free() {
        if self.rover == next {
          self.rover = block;
        }

        Block::absorb_next(block);
      }

      block
    }
  }

  /// Frees every used block whose tag satisfies `matches`, except `protect`.
  /// Returns the number of blocks freed.
  unsafe fn sweep<F>(
    &mut self,
    matches: F,
    protect: *mut Block,
  ) -> usize
  where
    F: Fn(PurgeTag) -> bool,
  {
    unsafe {
      let head = self.head();
      let mut current = head;
      let mut freed = 0;

      loop {
        let mut block = current;

        if block != protect && !(*block).is_free() && (*block).tag().is_some_and(&matches) {
          // The survivor may be an earlier block; its successor is the next
          // one not yet visited.
          block = self.release(block);
          freed += 1;
        }

        let next = (*block).next;

        if next == head {
          return freed;
        }

        current = next;
      }
    }
  }

  /// Validates `address` as the payload of a used block.
  pub(crate) unsafe fn used_block(
    &self,
    address: *mut u8,
  ) -> Result<*mut Block, ZoneError> {
    let offset = self.arena.offset_of(address);

    if !self.arena.contains(address) || offset < HEADER_SIZE || offset % ZONE_ALIGN != 0 {
      return Err(ZoneError::Foreign {
        address: address as usize,
      });
    }

    unsafe {
      let block = Block::from_payload(address);
      let header = &*block;

      if header.id == FREE_ID && header.tag == FREE_TAG {
        return Err(ZoneError::DoubleFree {
          address: address as usize,
        });
      }

      if header.id != ZONE_ID {
        return Err(ZoneError::corrupted(
          block as *const u8,
          Corruption::BadMagic {
            expected: ZONE_ID,
            found: header.id,
          },
        ));
      }

      if header.tag().is_none() {
        return Err(ZoneError::corrupted(
          block as *const u8,
          Corruption::BadTag(header.tag),
        ));
      }

      let room = self.arena.size() - (offset - HEADER_SIZE);
      if header.size < HEADER_SIZE + ZONE_ALIGN || header.size % ZONE_ALIGN != 0 || header.size > room {
        return Err(ZoneError::corrupted(
          block as *const u8,
          Corruption::BadSize { size: header.size },
        ));
      }

      if self.config.paranoid && !self.is_linked(block) {
        return Err(ZoneError::Foreign {
          address: address as usize,
        });
      }

      Ok(block)
    }
  }

  /// Whether `target` is a block of the sequence.
  unsafe fn is_linked(
    &self,
    target: *mut Block,
  ) -> bool {
    unsafe {
      let head = self.head();
      let mut current = head;

      loop {
        if current == target {
          return true;
        }

        current = (*current).next;

        if current == head || current > target {
          return false;
        }
      }
    }
  }

  unsafe fn tag_of(block: *mut Block) -> PurgeTag {
    unsafe { (*block).tag() }.unwrap_or(PurgeTag::Static)
  }

  fn after_mutation(&self) {
    if !self.config.paranoid {
      return;
    }

    if let Err(error) = self.check_heap() {
      fatal(error);
    }
  }
}
