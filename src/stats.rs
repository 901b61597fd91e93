use std::fmt;

use crate::{
  block::{Block, HEADER_SIZE, Owner},
  tag::PurgeTag,
  zone::Zone,
};

/// Occupancy snapshot of a zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoneStats {
  /// Bytes managed by the zone.
  pub total: usize,
  /// Bytes in free blocks, headers included.
  pub free: usize,
  /// Bytes in used blocks, headers included.
  pub used: usize,
  /// Payload capacity of the largest free block.
  pub largest_free: usize,
  pub blocks: usize,
  pub free_blocks: usize,
  /// Bytes in used blocks, per raw tag value.
  pub by_tag: [usize; PurgeTag::MAX as usize],
}

impl ZoneStats {
  pub fn tagged(
    &self,
    tag: PurgeTag,
  ) -> usize {
    self.by_tag[tag.as_raw() as usize]
  }

  /// Fraction of the zone held by used blocks.
  pub fn occupancy(&self) -> f64 {
    self.used as f64 / self.total as f64
  }
}

/// One block as seen by [`Zone::blocks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  /// Offset of the header from the zone base.
  pub offset: usize,
  /// Total size, header included.
  pub size: usize,
  /// `None` for a free block.
  pub tag: Option<PurgeTag>,
  /// Whether an owner handle tracks the block.
  pub owned: bool,
}

impl BlockInfo {
  pub fn is_free(&self) -> bool {
    self.tag.is_none()
  }
}

/// Address-order iterator over the blocks of a zone.
pub struct Blocks<'a> {
  zone: &'a Zone,
  next: *mut Block,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    if self.next.is_null() {
      return None;
    }

    let block = self.next;

    unsafe {
      let header = &*block;

      self.next = if header.next == self.zone.head() {
        std::ptr::null_mut()
      } else {
        header.next
      };

      Some(BlockInfo {
        offset: self.zone.arena.offset_of(block as *const u8),
        size: header.size,
        tag: if header.is_free() { None } else { header.tag() },
        owned: matches!(header.owner(), Owner::Handle(_)),
      })
    }
  }
}

impl Zone {
  /// Walks the blocks in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      zone: self,
      next: self.head(),
    }
  }

  pub fn stats(&self) -> ZoneStats {
    let mut stats = ZoneStats {
      total: self.arena.size(),
      free: 0,
      used: 0,
      largest_free: 0,
      blocks: 0,
      free_blocks: 0,
      by_tag: [0; PurgeTag::MAX as usize],
    };

    for block in self.blocks() {
      stats.blocks += 1;

      match block.tag {
        None => {
          stats.free += block.size;
          stats.free_blocks += 1;
          stats.largest_free = stats.largest_free.max(block.size - HEADER_SIZE);
        }
        Some(tag) => {
          stats.used += block.size;
          stats.by_tag[tag.as_raw() as usize] += block.size;
        }
      }
    }

    stats
  }

  /// Logs every block at debug level.
  pub fn dump(&self) {
    for block in self.blocks() {
      let state = block.tag.map_or("free", PurgeTag::name);

      log::debug!(
        "zone: {:>10} {:>10} {:<6}{}",
        block.offset,
        block.size,
        state,
        if block.owned { " owned" } else { "" }
      );
    }
  }
}

impl fmt::Debug for Zone {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let stats = self.stats();

    f.debug_struct("Zone")
      .field("base", &self.arena.base())
      .field("size", &stats.total)
      .field("used", &stats.used)
      .field("free", &stats.free)
      .field("blocks", &stats.blocks)
      .field("handles", &self.handles.len())
      .finish()
  }
}
